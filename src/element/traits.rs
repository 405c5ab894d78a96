//! Stage logic traits.
//!
//! These traits hold the per-item behaviour of a stage and know nothing about
//! channels, tasks or cancellation. The drivers in [`super::stage`] run them
//! against a pipeline's links.

use crate::error::Result;

/// Output from a transform.
///
/// A transform may drop an item, pass one item on, or expand it into several.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output<T> {
    /// No output (item was filtered/consumed).
    None,
    /// Single output item.
    Single(T),
    /// Multiple output items, emitted in order.
    Multiple(Vec<T>),
}

impl<T> Output<T> {
    /// Create a single item output.
    #[inline]
    pub fn single(item: T) -> Self {
        Self::Single(item)
    }

    /// Create an empty output.
    #[inline]
    pub fn none() -> Self {
        Self::None
    }

    /// Create an output from several items.
    #[inline]
    pub fn multiple(items: Vec<T>) -> Self {
        Self::Multiple(items)
    }

    /// Check if there is no output.
    #[inline]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Get the number of output items.
    #[inline]
    pub fn len(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Single(_) => 1,
            Self::Multiple(v) => v.len(),
        }
    }

    /// Check if empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Convert to a Vec of items.
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::None => vec![],
            Self::Single(item) => vec![item],
            Self::Multiple(v) => v,
        }
    }
}

impl<T> Default for Output<T> {
    fn default() -> Self {
        Self::None
    }
}

impl<T> From<T> for Output<T> {
    fn from(item: T) -> Self {
        Self::Single(item)
    }
}

impl<T> FromIterator<T> for Output<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut items: Vec<T> = iter.into_iter().collect();
        match items.len() {
            0 => Self::None,
            1 => items.pop().map_or(Self::None, Self::Single),
            _ => Self::Multiple(items),
        }
    }
}

impl<T> IntoIterator for Output<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.into_vec().into_iter()
    }
}

/// A source stage that produces items.
///
/// Sources are the entry points of a pipeline. They read an external input
/// (a file, a string, ...) and turn it into a stream.
///
/// # Example
///
/// ```rust
/// use filterflow::element::Source;
/// use filterflow::Result;
///
/// struct Countdown(u32);
///
/// impl Source for Countdown {
///     type Output = u32;
///
///     fn produce(&mut self) -> Result<Option<u32>> {
///         if self.0 == 0 {
///             return Ok(None);
///         }
///         self.0 -= 1;
///         Ok(Some(self.0))
///     }
/// }
/// ```
pub trait Source: Send + 'static {
    /// Item type produced.
    type Output: Send + 'static;

    /// Produce the next item.
    ///
    /// Returns `Ok(None)` when the source is exhausted (end of stream).
    fn produce(&mut self) -> Result<Option<Self::Output>>;

    /// Get the name of this source (for debugging/logging).
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// A transform stage that maps each input item to zero or more outputs.
pub trait Transform: Send + 'static {
    /// Item type consumed.
    type Input: Send + 'static;
    /// Item type produced.
    type Output: Send + 'static;

    /// Transform an input item into output(s).
    fn transform(&mut self, item: Self::Input) -> Result<Output<Self::Output>>;

    /// Emit whatever the transform still holds once its input has ended.
    ///
    /// Called exactly once, before end-of-stream is forwarded.
    fn flush(&mut self) -> Result<Output<Self::Output>> {
        Ok(Output::None)
    }

    /// Get the name of this transform (for debugging/logging).
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// A sink stage that consumes items.
///
/// Sinks are the exit points of a pipeline and usually write into a shared
/// result container.
pub trait Sink: Send + 'static {
    /// Item type consumed.
    type Input: Send + 'static;

    /// Consume an item.
    fn consume(&mut self, item: Self::Input) -> Result<()>;

    /// Called once after end-of-stream.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }

    /// Get the name of this sink (for debugging/logging).
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_variants() {
        let none: Output<u32> = Output::none();
        assert!(none.is_none());
        assert!(none.is_empty());

        let single = Output::single(1);
        assert_eq!(single.len(), 1);
        assert_eq!(single.into_vec(), vec![1]);

        let multiple = Output::multiple(vec![1, 2, 3]);
        assert_eq!(multiple.len(), 3);
        assert_eq!(multiple.into_iter().collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn test_output_from_iterator() {
        let empty: Output<u32> = std::iter::empty().collect();
        assert_eq!(empty, Output::None);

        let one: Output<u32> = std::iter::once(5).collect();
        assert_eq!(one, Output::Single(5));

        let many: Output<u32> = (0..3).collect();
        assert_eq!(many, Output::Multiple(vec![0, 1, 2]));
    }
}
