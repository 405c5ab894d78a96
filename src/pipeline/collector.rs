//! Caller-owned result containers written by sinks.

use crate::element::TypeTag;
use crate::error::{Error, Result};
use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Shared handle to a sink's result container.
///
/// The caller keeps one clone and passes another to the pipeline builder.
/// Only the sink writes to it; read it once the run has completed.
///
/// # Example
///
/// ```rust
/// use filterflow::pipeline::Collector;
/// use std::collections::HashMap;
///
/// let counts: Collector<HashMap<String, usize>> = Collector::default();
/// counts.lock().insert("cat".to_string(), 2);
/// assert_eq!(counts.lock()["cat"], 2);
/// ```
pub struct Collector<C> {
    inner: Arc<Mutex<C>>,
}

impl<C> Collector<C> {
    /// Wrap an initial container value.
    pub fn new(container: C) -> Self {
        Self {
            inner: Arc::new(Mutex::new(container)),
        }
    }

    /// Lock the container.
    ///
    /// A sink that panicked while holding the lock does not make the
    /// container unreadable.
    pub fn lock(&self) -> MutexGuard<'_, C> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Unwrap the container if this is the last handle.
    pub fn into_inner(self) -> std::result::Result<C, Self> {
        match Arc::try_unwrap(self.inner) {
            Ok(mutex) => Ok(mutex.into_inner().unwrap_or_else(PoisonError::into_inner)),
            Err(inner) => Err(Self { inner }),
        }
    }

    /// Move the container out, leaving its default in place.
    pub fn take(&self) -> C
    where
        C: Default,
    {
        std::mem::take(&mut *self.lock())
    }
}

impl<C> Clone for Collector<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Default> Default for Collector<C> {
    fn default() -> Self {
        Self::new(C::default())
    }
}

impl<C: fmt::Debug> fmt::Debug for Collector<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Collector").field(&*self.lock()).finish()
    }
}

/// A [`Collector`] with its container type erased, as handed to a sink's
/// constructor.
pub struct ResultTarget {
    tag: TypeTag,
    inner: Box<dyn Any + Send>,
}

impl ResultTarget {
    /// Erase a collector.
    pub fn new<C: Send + 'static>(collector: Collector<C>) -> Self {
        Self {
            tag: TypeTag::of::<C>(),
            inner: Box::new(collector),
        }
    }

    /// Container type carried.
    pub fn tag(&self) -> TypeTag {
        self.tag
    }

    /// Recover the typed collector.
    pub fn downcast<C: Send + 'static>(self) -> Result<Collector<C>> {
        let tag = self.tag;
        self.inner
            .downcast::<Collector<C>>()
            .map(|collector| *collector)
            .map_err(|_| {
                Error::InvalidAssembly(format!(
                    "result container is {} but {} was requested",
                    tag.name(),
                    TypeTag::of::<C>().name()
                ))
            })
    }
}

impl fmt::Debug for ResultTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultTarget")
            .field("tag", &self.tag)
            .finish_non_exhaustive()
    }
}
