//! Runnable stages.
//!
//! A [`Stage`] owns its channel ends and its [`CompletionHandle`] and runs
//! as one task. The drivers here adapt the [`Source`], [`Transform`] and
//! [`Sink`] traits; the fan-out/fan-in adapters in
//! [`crate::elements::flow`] implement [`Stage`] directly.

use super::{Sink, Source, Transform};
use crate::error::Result;
use crate::link::{ChannelReceiver, ChannelSender, Message};
use crate::pipeline::CompletionHandle;
use futures::future::BoxFuture;
use std::fmt;
use std::time::{Duration, Instant};

/// Role of a stage task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    /// Produces items from an external input.
    Source,
    /// Maps items.
    Transform,
    /// Consumes items into a result container.
    Sink,
    /// Round-robin distributor in front of parallel replicas.
    FanOut,
    /// Merger behind parallel replicas.
    FanIn,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Source => "source",
            Self::Transform => "transform",
            Self::Sink => "sink",
            Self::FanOut => "fan-out",
            Self::FanIn => "fan-in",
        })
    }
}

/// Per-task counters collected while a stage runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageStats {
    /// Items read from input channels (end-of-stream excluded).
    pub items_in: u64,
    /// Items written to output channels (end-of-stream excluded).
    pub items_out: u64,
    /// Time spent blocked on input channels.
    pub input_wait: Duration,
    /// Time spent blocked on output channels.
    pub output_wait: Duration,
    /// Time from start to completion, filled in by the completion handle.
    pub elapsed: Duration,
}

impl StageStats {
    /// Take one message from `rx`, accounting for the wait.
    pub(crate) async fn take<T>(
        &mut self,
        rx: &ChannelReceiver<T>,
        stage: &str,
    ) -> Result<Message<T>> {
        let start = Instant::now();
        let message = rx.take().await.map_err(|e| e.for_stage(stage));
        self.input_wait += start.elapsed();
        if let Ok(Message::Item(_)) = &message {
            self.items_in += 1;
        }
        message
    }

    /// Put one message into `tx`, accounting for the wait.
    pub(crate) async fn put<T>(
        &mut self,
        tx: &ChannelSender<T>,
        message: Message<T>,
        stage: &str,
    ) -> Result<()> {
        let is_item = !message.is_eos();
        let start = Instant::now();
        let sent = tx.put(message).await.map_err(|e| e.for_stage(stage));
        self.output_wait += start.elapsed();
        if is_item && sent.is_ok() {
            self.items_out += 1;
        }
        sent
    }
}

/// A unit of work that runs as one pipeline task.
///
/// `run` must call [`CompletionHandle::finish`] exactly once, after every
/// message the stage will send has been sent.
pub trait Stage: Send {
    /// Instance name (replicas carry an index suffix).
    fn name(&self) -> &str;

    /// Role of this task.
    fn kind(&self) -> StageKind;

    /// Run to completion.
    fn run(self: Box<Self>) -> BoxFuture<'static, ()>;
}

impl fmt::Debug for dyn Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .finish()
    }
}

/// Runs a [`Source`] into one output channel.
pub struct SourceStage<S: Source> {
    name: String,
    source: S,
    output: ChannelSender<S::Output>,
    completion: CompletionHandle,
}

impl<S: Source> SourceStage<S> {
    /// Create a driver for `source`.
    pub fn new(
        name: impl Into<String>,
        source: S,
        output: ChannelSender<S::Output>,
        completion: CompletionHandle,
    ) -> Self {
        Self {
            name: name.into(),
            source,
            output,
            completion,
        }
    }
}

impl<S: Source> Stage for SourceStage<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StageKind {
        StageKind::Source
    }

    fn run(self: Box<Self>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let Self {
                name,
                mut source,
                output,
                mut completion,
            } = *self;
            tracing::debug!("source task '{}' started", name);
            completion.started();

            let mut stats = StageStats::default();
            let result = drive_source(&name, &mut source, &output, &mut stats).await;

            tracing::debug!("source task '{}' finished", name);
            // Report before the output end drops so the root cause is
            // recorded ahead of any disconnect it triggers downstream.
            completion.finish(result, stats);
            drop(output);
        })
    }
}

async fn drive_source<S: Source>(
    name: &str,
    source: &mut S,
    output: &ChannelSender<S::Output>,
    stats: &mut StageStats,
) -> Result<()> {
    loop {
        match source.produce() {
            Ok(Some(item)) => stats.put(output, Message::Item(item), name).await?,
            Ok(None) => {
                tracing::debug!("source '{}' reached EOS", name);
                return stats.put(output, Message::Eos, name).await;
            }
            Err(e) => {
                tracing::error!("source '{}' error: {}", name, e);
                return Err(e);
            }
        }
    }
}

/// Runs a [`Transform`] between two channels.
pub struct TransformStage<T: Transform> {
    name: String,
    transform: T,
    input: ChannelReceiver<T::Input>,
    output: ChannelSender<T::Output>,
    completion: CompletionHandle,
}

impl<T: Transform> TransformStage<T> {
    /// Create a driver for `transform`.
    pub fn new(
        name: impl Into<String>,
        transform: T,
        input: ChannelReceiver<T::Input>,
        output: ChannelSender<T::Output>,
        completion: CompletionHandle,
    ) -> Self {
        Self {
            name: name.into(),
            transform,
            input,
            output,
            completion,
        }
    }
}

impl<T: Transform> Stage for TransformStage<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StageKind {
        StageKind::Transform
    }

    fn run(self: Box<Self>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let Self {
                name,
                mut transform,
                input,
                output,
                mut completion,
            } = *self;
            tracing::debug!("transform task '{}' started", name);
            completion.started();

            let mut stats = StageStats::default();
            let result = drive_transform(&name, &mut transform, &input, &output, &mut stats).await;

            tracing::debug!("transform task '{}' finished", name);
            completion.finish(result, stats);
            drop((input, output));
        })
    }
}

async fn drive_transform<T: Transform>(
    name: &str,
    transform: &mut T,
    input: &ChannelReceiver<T::Input>,
    output: &ChannelSender<T::Output>,
    stats: &mut StageStats,
) -> Result<()> {
    loop {
        match stats.take(input, name).await? {
            Message::Item(item) => {
                let produced = transform.transform(item).inspect_err(|e| {
                    tracing::error!("transform '{}' error: {}", name, e);
                })?;
                if produced.is_none() {
                    tracing::trace!("transform '{}' filtered out item", name);
                }
                for out in produced {
                    stats.put(output, Message::Item(out), name).await?;
                }
            }
            Message::Eos => {
                tracing::debug!("transform '{}' received EOS", name);
                for out in transform.flush()? {
                    stats.put(output, Message::Item(out), name).await?;
                }
                return stats.put(output, Message::Eos, name).await;
            }
        }
    }
}

/// Runs a [`Sink`] off one input channel.
pub struct SinkStage<K: Sink> {
    name: String,
    sink: K,
    input: ChannelReceiver<K::Input>,
    completion: CompletionHandle,
}

impl<K: Sink> SinkStage<K> {
    /// Create a driver for `sink`.
    pub fn new(
        name: impl Into<String>,
        sink: K,
        input: ChannelReceiver<K::Input>,
        completion: CompletionHandle,
    ) -> Self {
        Self {
            name: name.into(),
            sink,
            input,
            completion,
        }
    }
}

impl<K: Sink> Stage for SinkStage<K> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StageKind {
        StageKind::Sink
    }

    fn run(self: Box<Self>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let Self {
                name,
                mut sink,
                input,
                mut completion,
            } = *self;
            tracing::debug!("sink task '{}' started", name);
            completion.started();

            let mut stats = StageStats::default();
            let result = drive_sink(&name, &mut sink, &input, &mut stats).await;

            tracing::debug!("sink task '{}' finished", name);
            completion.finish(result, stats);
            drop(input);
        })
    }
}

async fn drive_sink<K: Sink>(
    name: &str,
    sink: &mut K,
    input: &ChannelReceiver<K::Input>,
    stats: &mut StageStats,
) -> Result<()> {
    loop {
        match stats.take(input, name).await? {
            Message::Item(item) => sink.consume(item).inspect_err(|e| {
                tracing::error!("sink '{}' error: {}", name, e);
            })?,
            Message::Eos => {
                tracing::debug!("sink '{}' received EOS", name);
                return sink.finish();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Output;
    use crate::error::Error;
    use crate::link::Channel;
    use crate::pipeline::CompletionTracker;
    use crate::CancelToken;

    struct Numbers(std::ops::Range<u32>);

    impl Source for Numbers {
        type Output = u32;

        fn produce(&mut self) -> Result<Option<u32>> {
            Ok(self.0.next())
        }
    }

    /// Emits each item twice and a trailing marker on flush.
    struct Twice;

    impl Transform for Twice {
        type Input = u32;
        type Output = u32;

        fn transform(&mut self, item: u32) -> Result<Output<u32>> {
            Ok(Output::multiple(vec![item, item]))
        }

        fn flush(&mut self) -> Result<Output<u32>> {
            Ok(Output::single(999))
        }
    }

    struct Collect(std::sync::Arc<std::sync::Mutex<Vec<u32>>>);

    impl Sink for Collect {
        type Input = u32;

        fn consume(&mut self, item: u32) -> Result<()> {
            if item == 13 {
                return Err(Error::processing("unlucky"));
            }
            self.0.lock().unwrap().push(item);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_source_transform_sink_chain() {
        let cancel = CancelToken::new();
        let tracker = CompletionTracker::new(3, cancel.clone());
        let (tx1, rx1) = Channel::bounded::<u32>(2, &cancel);
        let (tx2, rx2) = Channel::bounded::<u32>(2, &cancel);
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));

        let stages: Vec<Box<dyn Stage>> = vec![
            Box::new(SourceStage::new(
                "numbers",
                Numbers(0..3),
                tx1,
                tracker.handle("numbers", StageKind::Source).unwrap(),
            )),
            Box::new(TransformStage::new(
                "twice",
                Twice,
                rx1,
                tx2,
                tracker.handle("twice", StageKind::Transform).unwrap(),
            )),
            Box::new(SinkStage::new(
                "collect",
                Collect(seen.clone()),
                rx2,
                tracker.handle("collect", StageKind::Sink).unwrap(),
            )),
        ];
        for stage in stages {
            tokio::spawn(stage.run());
        }

        tracker.wait().await;
        assert!(tracker.take_failures().is_empty());
        assert_eq!(*seen.lock().unwrap(), vec![0, 0, 1, 1, 2, 2, 999]);

        let reports = tracker.reports();
        let twice = reports.iter().find(|r| r.name == "twice").unwrap();
        assert_eq!(twice.stats.items_in, 3);
        assert_eq!(twice.stats.items_out, 7);
    }

    #[tokio::test]
    async fn test_sink_failure_cancels_source() {
        let cancel = CancelToken::new();
        let tracker = CompletionTracker::new(2, cancel.clone());
        let (tx, rx) = Channel::bounded::<u32>(1, &cancel);
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));

        let source = Box::new(SourceStage::new(
            "numbers",
            Numbers(0..1_000_000),
            tx,
            tracker.handle("numbers", StageKind::Source).unwrap(),
        ));
        let sink = Box::new(SinkStage::new(
            "collect",
            Collect(seen.clone()),
            rx,
            tracker.handle("collect", StageKind::Sink).unwrap(),
        ));
        tokio::spawn(source.run());
        tokio::spawn(sink.run());

        tracker.wait().await;
        assert!(cancel.is_cancelled());

        let failures = tracker.take_failures();
        let root = failures.iter().find(|(_, e)| !e.is_interruption()).unwrap();
        assert_eq!(root.0, "collect");
        assert_eq!(*seen.lock().unwrap(), (0..13).collect::<Vec<_>>());
    }
}
