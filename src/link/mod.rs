//! Links between pipeline stages.
//!
//! A link is a bounded FIFO carrying [`Message`]s from exactly one producer
//! to exactly one consumer. The fan-out and fan-in adapters are the only
//! tasks that hold more than one end.
//!
//! ## Link Types
//!
//! - [`Channel`]: typed bounded channel (using kanal), the "pipe"
//! - [`AnySender`]/[`AnyReceiver`]: type-erased ends handed through the
//!   stage factory and downcast back by the stage that owns them
//!
//! ## Termination
//!
//! End-of-stream is an explicit [`Message::Eos`] variant, never an in-band
//! payload value. Every stage forwards exactly one `Eos` per `Eos` it reads.

mod erased;
mod local;

pub use erased::{AnyReceiver, AnySender};
pub use local::{Channel, ChannelReceiver, ChannelSender};

use crate::error::Error;

/// Message passed between pipeline stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message<T> {
    /// A stream item.
    Item(T),
    /// End of stream signal.
    Eos,
}

impl<T> Message<T> {
    /// Check whether this is the end-of-stream marker.
    #[inline]
    pub fn is_eos(&self) -> bool {
        matches!(self, Self::Eos)
    }

    /// Take the item out, if any.
    #[inline]
    pub fn into_item(self) -> Option<T> {
        match self {
            Self::Item(item) => Some(item),
            Self::Eos => None,
        }
    }
}

impl<T> From<T> for Message<T> {
    fn from(item: T) -> Self {
        Self::Item(item)
    }
}

/// Failure of a blocking channel operation.
///
/// Channel ends do not know which stage owns them; drivers attach the stage
/// name with [`LinkError::for_stage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    /// The pipeline's cancel token fired while blocked.
    #[error("operation cancelled")]
    Cancelled,
    /// The peer end was dropped.
    #[error("channel closed")]
    Closed,
}

impl LinkError {
    /// Convert into a crate error attributed to `stage`.
    pub fn for_stage(self, stage: &str) -> Error {
        match self {
            Self::Cancelled => Error::Interrupted {
                stage: stage.to_string(),
            },
            Self::Closed => Error::Disconnected {
                stage: stage.to_string(),
            },
        }
    }
}
