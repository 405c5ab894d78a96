//! Fan-in behind a replicated stage.

use crate::element::{Stage, StageKind, StageStats};
use crate::error::{Error, Result};
use crate::link::{ChannelReceiver, ChannelSender, LinkError, Message};
use crate::pipeline::CompletionHandle;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use std::time::Instant;

/// Merges K replica channels back into one stream.
///
/// All live branches are awaited together and items are forwarded in the
/// order they become available, so a branch that produces more items than
/// its siblings never stalls the others. Items from the same branch keep
/// their order. A branch is retired when its `Eos` arrives; once every
/// branch is retired exactly one `Eos` is forwarded.
pub struct Serializer<T> {
    name: String,
    inputs: Vec<ChannelReceiver<T>>,
    output: ChannelSender<T>,
    completion: CompletionHandle,
}

type BranchRead<T> = (usize, ChannelReceiver<T>, std::result::Result<Message<T>, LinkError>);

impl<T: Send + 'static> Serializer<T> {
    /// Create a fan-in over `inputs`.
    ///
    /// Fails if `inputs` is empty.
    pub fn new(
        name: impl Into<String>,
        inputs: Vec<ChannelReceiver<T>>,
        output: ChannelSender<T>,
        completion: CompletionHandle,
    ) -> Result<Self> {
        let name = name.into();
        if inputs.is_empty() {
            return Err(Error::InvalidAssembly(format!(
                "fan-in '{name}' needs at least one input"
            )));
        }
        Ok(Self {
            name,
            inputs,
            output,
            completion,
        })
    }
}

fn read_branch<T: Send + 'static>(
    index: usize,
    rx: ChannelReceiver<T>,
) -> BoxFuture<'static, BranchRead<T>> {
    Box::pin(async move {
        let result = rx.take().await;
        (index, rx, result)
    })
}

async fn drive_serializer<T: Send + 'static>(
    name: &str,
    inputs: Vec<ChannelReceiver<T>>,
    output: &ChannelSender<T>,
    stats: &mut StageStats,
) -> Result<()> {
    let total = inputs.len();
    let mut live: FuturesUnordered<_> = inputs
        .into_iter()
        .enumerate()
        .map(|(index, rx)| read_branch(index, rx))
        .collect();

    loop {
        let start = Instant::now();
        let Some((index, rx, result)) = live.next().await else {
            break;
        };
        stats.input_wait += start.elapsed();

        match result.map_err(|e| e.for_stage(name))? {
            Message::Item(item) => {
                stats.items_in += 1;
                live.push(read_branch(index, rx));
                stats.put(output, Message::Item(item), name).await?;
            }
            Message::Eos => {
                tracing::debug!(
                    "fan-in '{}' branch {} finished ({} of {} still live)",
                    name,
                    index,
                    live.len(),
                    total
                );
            }
        }
    }

    tracing::debug!("fan-in '{}' received EOS from all branches", name);
    stats.put(output, Message::Eos, name).await
}

impl<T: Send + 'static> Stage for Serializer<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StageKind {
        StageKind::FanIn
    }

    fn run(self: Box<Self>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let Self {
                name,
                inputs,
                output,
                mut completion,
            } = *self;
            tracing::debug!("fan-in task '{}' started", name);
            completion.started();

            let mut stats = StageStats::default();
            let result = drive_serializer(&name, inputs, &output, &mut stats).await;

            tracing::debug!("fan-in task '{}' finished", name);
            completion.finish(result, stats);
            drop(output);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::Channel;
    use crate::pipeline::CompletionTracker;
    use crate::CancelToken;
    use std::time::Duration;

    async fn collect(rx: &ChannelReceiver<u32>) -> (Vec<u32>, usize) {
        let mut items = Vec::new();
        loop {
            match rx.take().await.unwrap() {
                Message::Item(item) => items.push(item),
                Message::Eos => break,
            }
        }
        (items, rx.len())
    }

    #[tokio::test]
    async fn test_uneven_branches_drain_completely() {
        let cancel = CancelToken::new();
        let tracker = CompletionTracker::new(1, cancel.clone());
        let (b1_tx, b1_rx) = Channel::bounded::<u32>(8, &cancel);
        let (b2_tx, b2_rx) = Channel::bounded::<u32>(8, &cancel);
        let (out_tx, out_rx) = Channel::bounded::<u32>(16, &cancel);

        for item in [10, 11] {
            b1_tx.put(Message::Item(item)).await.unwrap();
        }
        b1_tx.put(Message::Eos).await.unwrap();
        for item in [20, 21, 22, 23, 24] {
            b2_tx.put(Message::Item(item)).await.unwrap();
        }
        b2_tx.put(Message::Eos).await.unwrap();

        let fan_in = Serializer::new(
            "words/serializer",
            vec![b1_rx, b2_rx],
            out_tx,
            tracker.handle("words/serializer", StageKind::FanIn).unwrap(),
        )
        .unwrap();
        tokio::spawn(Box::new(fan_in).run());
        tracker.wait().await;

        let (items, leftover) = collect(&out_rx).await;
        assert_eq!(leftover, 0, "exactly one EOS forwarded");
        assert_eq!(items.len(), 7);

        let first: Vec<_> = items.iter().copied().filter(|i| *i < 20).collect();
        let second: Vec<_> = items.iter().copied().filter(|i| *i >= 20).collect();
        assert_eq!(first, vec![10, 11]);
        assert_eq!(second, vec![20, 21, 22, 23, 24]);
    }

    #[tokio::test]
    async fn test_silent_branch_does_not_block_others() {
        let cancel = CancelToken::new();
        let tracker = CompletionTracker::new(1, cancel.clone());
        let (quiet_tx, quiet_rx) = Channel::bounded::<u32>(4, &cancel);
        let (busy_tx, busy_rx) = Channel::bounded::<u32>(4, &cancel);
        let (out_tx, out_rx) = Channel::bounded::<u32>(4, &cancel);

        let fan_in = Serializer::new(
            "merge",
            vec![quiet_rx, busy_rx],
            out_tx,
            tracker.handle("merge", StageKind::FanIn).unwrap(),
        )
        .unwrap();
        tokio::spawn(Box::new(fan_in).run());

        busy_tx.put(Message::Item(1)).await.unwrap();
        let first = tokio::time::timeout(Duration::from_secs(1), out_rx.take())
            .await
            .expect("busy branch must flow while the quiet one is idle")
            .unwrap();
        assert_eq!(first, Message::Item(1));

        busy_tx.put(Message::Eos).await.unwrap();
        quiet_tx.put(Message::Eos).await.unwrap();
        assert_eq!(out_rx.take().await.unwrap(), Message::Eos);
        tracker.wait().await;
    }

    #[tokio::test]
    async fn test_cancel_interrupts_fan_in() {
        let cancel = CancelToken::new();
        let tracker = CompletionTracker::new(1, cancel.clone());
        let (_tx, rx) = Channel::bounded::<u32>(4, &cancel);
        let (out_tx, _out_rx) = Channel::bounded::<u32>(4, &cancel);

        let fan_in = Serializer::new(
            "merge",
            vec![rx],
            out_tx,
            tracker.handle("merge", StageKind::FanIn).unwrap(),
        )
        .unwrap();
        tokio::spawn(Box::new(fan_in).run());

        cancel.cancel();
        tracker.wait().await;
        let failures = tracker.take_failures();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].1.is_interruption());
    }
}
