//! Bounded in-process channels using kanal.

use super::{LinkError, Message};
use crate::cancel::CancelToken;
use kanal::{AsyncReceiver, AsyncSender};

/// A bounded channel between two stages.
///
/// This is a thin wrapper around kanal's async channels that carries
/// [`Message`]s and observes a [`CancelToken`] at every blocking point.
///
/// # Example
///
/// ```rust
/// use filterflow::CancelToken;
/// use filterflow::link::{Channel, Message};
///
/// # tokio_test();
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn tokio_test() {
/// let cancel = CancelToken::new();
/// let (tx, rx) = Channel::bounded::<String>(16, &cancel);
///
/// tx.put(Message::Item("hello".to_string())).await.unwrap();
/// tx.put(Message::Eos).await.unwrap();
///
/// assert_eq!(rx.take().await.unwrap(), Message::Item("hello".to_string()));
/// assert!(rx.take().await.unwrap().is_eos());
/// # }
/// ```
pub struct Channel;

impl Channel {
    /// Create a bounded channel holding at most `capacity` messages.
    ///
    /// A capacity of zero produces a rendezvous channel; pipeline
    /// configuration rejects it before channels are created.
    pub fn bounded<T: Send>(
        capacity: usize,
        cancel: &CancelToken,
    ) -> (ChannelSender<T>, ChannelReceiver<T>) {
        let (tx, rx) = kanal::bounded_async(capacity);
        (
            ChannelSender {
                inner: tx,
                cancel: cancel.clone(),
                capacity,
            },
            ChannelReceiver {
                inner: rx,
                cancel: cancel.clone(),
                capacity,
            },
        )
    }
}

/// Producer half of a channel.
pub struct ChannelSender<T> {
    inner: AsyncSender<Message<T>>,
    cancel: CancelToken,
    capacity: usize,
}

impl<T> ChannelSender<T> {
    /// Enqueue a message.
    ///
    /// Waits while the channel is full. Fails with [`LinkError::Cancelled`]
    /// if the cancel token fires first, or [`LinkError::Closed`] if the
    /// receiver is gone.
    pub async fn put(&self, message: Message<T>) -> Result<(), LinkError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(LinkError::Cancelled),
            sent = self.inner.send(message) => sent.map_err(|_| LinkError::Closed),
        }
    }

    /// Number of messages waiting in the channel.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Check if the channel is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// The configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Check if the receiver has been dropped.
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed() || self.inner.is_disconnected()
    }
}

/// Consumer half of a channel.
#[derive(Debug)]
pub struct ChannelReceiver<T> {
    inner: AsyncReceiver<Message<T>>,
    cancel: CancelToken,
    capacity: usize,
}

impl<T> ChannelReceiver<T> {
    /// Dequeue the next message.
    ///
    /// Waits while the channel is empty. Fails with [`LinkError::Cancelled`]
    /// if the cancel token fires first, or [`LinkError::Closed`] if the
    /// sender is gone and nothing is left to read.
    pub async fn take(&self) -> Result<Message<T>, LinkError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(LinkError::Cancelled),
            received = self.inner.recv() => received.map_err(|_| LinkError::Closed),
        }
    }

    /// Number of messages waiting in the channel.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Check if the channel is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// The configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
