//! Cooperative cancellation shared by every task of a pipeline.

use std::sync::Arc;
use tokio::sync::watch;

/// A cloneable cancellation signal.
///
/// Every channel end holds a clone and races its blocking operation against
/// [`CancelToken::cancelled`]. Cancelling is idempotent and cannot be undone.
///
/// # Example
///
/// ```rust
/// use filterflow::CancelToken;
///
/// let token = CancelToken::new();
/// let observer = token.clone();
/// assert!(!observer.is_cancelled());
/// token.cancel();
/// assert!(observer.is_cancelled());
/// ```
#[derive(Clone, Debug)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// Create a token in the not-cancelled state.
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Signal cancellation to every clone of this token.
    ///
    /// Returns `true` if this call flipped the token.
    pub fn cancel(&self) -> bool {
        !self.tx.send_replace(true)
    }

    /// Check whether cancellation has been signalled.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until cancellation is signalled.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // The sender lives as long as any clone of the token, so an error
        // here cannot happen while `self` is alive.
        let signalled = rx.wait_for(|cancelled| *cancelled).await.is_ok();
        if !signalled {
            std::future::pending::<()>().await;
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
