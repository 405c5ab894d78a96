//! Round-robin fan-out in front of a replicated stage.

use crate::element::{Stage, StageKind, StageStats};
use crate::error::{Error, Result};
use crate::link::{ChannelReceiver, ChannelSender, Message};
use crate::pipeline::CompletionHandle;
use futures::future::BoxFuture;

/// Distributes one input stream over K replica channels.
///
/// Item `n` goes to output `n mod K`. On end-of-stream every output receives
/// one `Eos`, so each replica terminates on its own.
pub struct Parallelizer<T> {
    name: String,
    input: ChannelReceiver<T>,
    outputs: Vec<ChannelSender<T>>,
    completion: CompletionHandle,
}

impl<T: Send + 'static> Parallelizer<T> {
    /// Create a fan-out over `outputs`.
    ///
    /// Fails if `outputs` is empty.
    pub fn new(
        name: impl Into<String>,
        input: ChannelReceiver<T>,
        outputs: Vec<ChannelSender<T>>,
        completion: CompletionHandle,
    ) -> Result<Self> {
        let name = name.into();
        if outputs.is_empty() {
            return Err(Error::InvalidAssembly(format!(
                "fan-out '{name}' needs at least one output"
            )));
        }
        Ok(Self {
            name,
            input,
            outputs,
            completion,
        })
    }

    async fn drive(&mut self, stats: &mut StageStats) -> Result<()> {
        let name = self.name.as_str();
        let mut next = 0;
        loop {
            match stats.take(&self.input, name).await? {
                Message::Item(item) => {
                    stats.put(&self.outputs[next], Message::Item(item), name).await?;
                    next = (next + 1) % self.outputs.len();
                }
                Message::Eos => {
                    tracing::debug!(
                        "fan-out '{}' received EOS, closing {} branches",
                        name,
                        self.outputs.len()
                    );
                    for tx in &self.outputs {
                        stats.put(tx, Message::Eos, name).await?;
                    }
                    return Ok(());
                }
            }
        }
    }
}

impl<T: Send + 'static> Stage for Parallelizer<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StageKind {
        StageKind::FanOut
    }

    fn run(self: Box<Self>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let mut this = *self;
            tracing::debug!("fan-out task '{}' started", this.name);
            this.completion.started();

            let mut stats = StageStats::default();
            let result = this.drive(&mut stats).await;

            tracing::debug!("fan-out task '{}' finished", this.name);
            let Self {
                input,
                outputs,
                completion,
                ..
            } = this;
            completion.finish(result, stats);
            drop((input, outputs));
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::Channel;
    use crate::pipeline::CompletionTracker;
    use crate::CancelToken;

    #[tokio::test]
    async fn test_round_robin_distribution() {
        let cancel = CancelToken::new();
        let tracker = CompletionTracker::new(1, cancel.clone());
        let (in_tx, in_rx) = Channel::bounded::<&'static str>(16, &cancel);
        let mut senders = Vec::new();
        let mut receivers = Vec::new();
        for _ in 0..3 {
            let (tx, rx) = Channel::bounded::<&'static str>(16, &cancel);
            senders.push(tx);
            receivers.push(rx);
        }

        for word in ["a", "b", "c", "d", "e", "f", "g"] {
            in_tx.put(Message::Item(word)).await.unwrap();
        }
        in_tx.put(Message::Eos).await.unwrap();

        let fan_out = Parallelizer::new(
            "words/parallelizer",
            in_rx,
            senders,
            tracker.handle("words/parallelizer", StageKind::FanOut).unwrap(),
        )
        .unwrap();
        tokio::spawn(Box::new(fan_out).run());
        tracker.wait().await;

        let mut branches = Vec::new();
        for rx in &receivers {
            let mut items = Vec::new();
            loop {
                match rx.take().await.unwrap() {
                    Message::Item(item) => items.push(item),
                    Message::Eos => break,
                }
            }
            assert!(rx.is_empty(), "exactly one EOS per branch");
            branches.push(items);
        }
        assert_eq!(branches[0], vec!["a", "d", "g"]);
        assert_eq!(branches[1], vec!["b", "e"]);
        assert_eq!(branches[2], vec!["c", "f"]);
    }

    #[test]
    fn test_requires_outputs() {
        let cancel = CancelToken::new();
        let tracker = CompletionTracker::new(1, cancel.clone());
        let (_tx, rx) = Channel::bounded::<u8>(1, &cancel);
        let handle = tracker.handle("empty", StageKind::FanOut).unwrap();
        let err = Parallelizer::new("empty", rx, Vec::new(), handle).err().unwrap();
        assert!(matches!(err, Error::InvalidAssembly(_)));
    }
}
