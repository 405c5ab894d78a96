//! Type-erased channel ends.
//!
//! The stage factory wires stages whose element types are only known to the
//! registry at runtime. Ends travel through it as `AnySender`/`AnyReceiver`
//! and are downcast by the stage that finally owns them.

use super::{ChannelReceiver, ChannelSender};
use crate::element::DataType;
use crate::error::{Error, Result};
use std::any::Any;
use std::fmt;

/// A [`ChannelSender`] with its element type erased.
pub struct AnySender {
    inner: Box<dyn Any + Send>,
    data_type: DataType,
}

impl AnySender {
    /// Erase a typed sender.
    pub fn new<T: Send + 'static>(sender: ChannelSender<T>) -> Self {
        Self {
            inner: Box::new(sender),
            data_type: DataType::of::<T>(),
        }
    }

    /// The element type carried by the channel.
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Recover the typed sender.
    pub fn downcast<T: Send + 'static>(self) -> Result<ChannelSender<T>> {
        let expected = DataType::of::<T>();
        let carried = self.data_type;
        self.inner
            .downcast::<ChannelSender<T>>()
            .map(|sender| *sender)
            .map_err(|_| downcast_error("sender", carried, expected))
    }
}

impl fmt::Debug for AnySender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnySender")
            .field("data_type", &self.data_type)
            .finish_non_exhaustive()
    }
}

/// A [`ChannelReceiver`] with its element type erased.
pub struct AnyReceiver {
    inner: Box<dyn Any + Send>,
    data_type: DataType,
}

impl AnyReceiver {
    /// Erase a typed receiver.
    pub fn new<T: Send + 'static>(receiver: ChannelReceiver<T>) -> Self {
        Self {
            inner: Box::new(receiver),
            data_type: DataType::of::<T>(),
        }
    }

    /// The element type carried by the channel.
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Recover the typed receiver.
    pub fn downcast<T: Send + 'static>(self) -> Result<ChannelReceiver<T>> {
        let expected = DataType::of::<T>();
        let carried = self.data_type;
        self.inner
            .downcast::<ChannelReceiver<T>>()
            .map(|receiver| *receiver)
            .map_err(|_| downcast_error("receiver", carried, expected))
    }
}

impl fmt::Debug for AnyReceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyReceiver")
            .field("data_type", &self.data_type)
            .finish_non_exhaustive()
    }
}

fn downcast_error(end: &str, carried: DataType, expected: DataType) -> Error {
    Error::InvalidAssembly(format!(
        "channel {end} carries {} but {} was requested",
        carried.name(),
        expected.name()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CancelToken;
    use crate::link::{Channel, Message};

    #[tokio::test]
    async fn test_erased_ends_roundtrip() {
        let cancel = CancelToken::new();
        let (tx, rx) = Channel::bounded::<String>(4, &cancel);
        let tx = AnySender::new(tx);
        let rx = AnyReceiver::new(rx);
        assert_eq!(tx.data_type(), DataType::of::<String>());

        let tx = tx.downcast::<String>().unwrap();
        let rx = rx.downcast::<String>().unwrap();
        tx.put(Message::Item("x".into())).await.unwrap();
        assert_eq!(rx.take().await.unwrap(), Message::Item("x".to_string()));
    }

    #[test]
    fn test_wrong_downcast_is_rejected() {
        let cancel = CancelToken::new();
        let (_tx, rx) = Channel::bounded::<String>(4, &cancel);
        let err = AnyReceiver::new(rx).downcast::<u64>().unwrap_err();
        assert!(matches!(err, Error::InvalidAssembly(_)));
        assert!(err.to_string().contains("String"));
    }
}
