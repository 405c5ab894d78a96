//! Completion tracking for the tasks of a running pipeline.
//!
//! The tracker is sized to the exact number of tasks the composer realizes
//! (stages, replicas and fan-out/fan-in adapters). Each task holds one
//! [`CompletionHandle`] and reports through it exactly once, after it has
//! forwarded its end-of-stream. [`CompletionTracker::wait`] returns when the
//! count reaches zero.

use super::events::{EventSender, PipelineEvent};
use crate::cancel::CancelToken;
use crate::element::{StageKind, StageStats};
use crate::error::{Error, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::Notify;

/// How a task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// Finished after forwarding end-of-stream.
    Completed,
    /// Unwound because the pipeline was cancelled.
    Interrupted,
    /// Failed with the given message.
    Failed(String),
}

/// Final statistics of one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    /// Instance name.
    pub name: String,
    /// Role of the task.
    pub kind: StageKind,
    /// Counters and timings.
    pub stats: StageStats,
    /// How the task ended.
    pub outcome: StageOutcome,
}

struct TrackerInner {
    expected: usize,
    remaining: AtomicUsize,
    issued: AtomicUsize,
    all_done: Notify,
    cancel: CancelToken,
    failures: Mutex<Vec<(String, Error)>>,
    reports: Mutex<Vec<StageReport>>,
    events: EventSender,
}

/// Shared countdown barrier over every task of a realized pipeline.
///
/// The first failure reported through any handle cancels the pipeline's
/// [`CancelToken`], so neighbours blocked on a channel unwind instead of
/// waiting for an end-of-stream that will never come.
#[derive(Clone)]
pub struct CompletionTracker {
    inner: Arc<TrackerInner>,
}

impl CompletionTracker {
    /// Create a tracker expecting `expected` tasks.
    pub fn new(expected: usize, cancel: CancelToken) -> Self {
        Self::with_events(expected, cancel, EventSender::default())
    }

    /// Create a tracker that publishes stage events on `events`.
    pub fn with_events(expected: usize, cancel: CancelToken, events: EventSender) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                expected,
                remaining: AtomicUsize::new(expected),
                issued: AtomicUsize::new(0),
                all_done: Notify::new(),
                cancel,
                failures: Mutex::new(Vec::new()),
                reports: Mutex::new(Vec::new()),
                events,
            }),
        }
    }

    /// Issue the completion handle for one task.
    ///
    /// Fails once `expected` handles have been issued.
    pub fn handle(&self, stage: impl Into<String>, kind: StageKind) -> Result<CompletionHandle> {
        let stage = stage.into();
        let expected = self.inner.expected;
        self.inner
            .issued
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |issued| {
                (issued < expected).then_some(issued + 1)
            })
            .map_err(|_| {
                Error::InvalidAssembly(format!(
                    "completion tracker sized for {expected} tasks cannot track '{stage}'"
                ))
            })?;

        Ok(CompletionHandle {
            inner: Arc::clone(&self.inner),
            stage,
            kind,
            created: Instant::now(),
            started: None,
            finished: false,
        })
    }

    /// Number of tasks the tracker was sized for.
    pub fn expected(&self) -> usize {
        self.inner.expected
    }

    /// Number of handles issued so far.
    pub fn issued(&self) -> usize {
        self.inner.issued.load(Ordering::Acquire)
    }

    /// Number of tasks that have not reported yet.
    pub fn remaining(&self) -> usize {
        self.inner.remaining.load(Ordering::Acquire)
    }

    /// The cancel token shared by the pipeline.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.inner.cancel
    }

    /// Wait until every task has reported.
    pub async fn wait(&self) {
        loop {
            let notified = self.inner.all_done.notified();
            tokio::pin!(notified);
            // Register before checking so a wake between the check and the
            // await is not lost.
            notified.as_mut().enable();
            if self.remaining() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Drain the recorded failures, in the order they were reported.
    pub fn take_failures(&self) -> Vec<(String, Error)> {
        std::mem::take(&mut *lock(&self.inner.failures))
    }

    /// Reports of the tasks that have finished so far, in completion order.
    pub fn reports(&self) -> Vec<StageReport> {
        lock(&self.inner.reports).clone()
    }
}

impl std::fmt::Debug for CompletionTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionTracker")
            .field("expected", &self.inner.expected)
            .field("issued", &self.issued())
            .field("remaining", &self.remaining())
            .finish()
    }
}

impl TrackerInner {
    fn complete(&self, stage: &str, kind: StageKind, result: Result<()>, stats: StageStats) {
        let outcome = match result {
            Ok(()) => {
                self.events
                    .send_stage_finished(stage, stats.items_in, stats.items_out);
                StageOutcome::Completed
            }
            Err(error) => {
                let outcome = if error.is_interruption() {
                    tracing::debug!("stage '{}' interrupted", stage);
                    StageOutcome::Interrupted
                } else {
                    tracing::error!("stage '{}' failed: {}", stage, error);
                    StageOutcome::Failed(error.to_string())
                };
                self.events.send_error(error.to_string(), Some(stage.to_string()));
                lock(&self.failures).push((stage.to_string(), error));
                if self.cancel.cancel() {
                    tracing::debug!("pipeline cancelled after failure in '{}'", stage);
                    self.events.send(PipelineEvent::Cancelled);
                }
                outcome
            }
        };

        lock(&self.reports).push(StageReport {
            name: stage.to_string(),
            kind,
            stats,
            outcome,
        });

        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            tracing::debug!("all {} stage tasks finished", self.expected);
            self.all_done.notify_waiters();
        }
    }
}

/// One task's obligation to report completion.
///
/// Dropping a handle without calling [`finish`](Self::finish) still counts
/// the task down; if the task had started, a failure is recorded too.
pub struct CompletionHandle {
    inner: Arc<TrackerInner>,
    stage: String,
    kind: StageKind,
    created: Instant,
    started: Option<Instant>,
    finished: bool,
}

impl CompletionHandle {
    /// Instance name of the task.
    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// Role of the task.
    pub fn kind(&self) -> StageKind {
        self.kind
    }

    /// The cancel token shared by the pipeline.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.inner.cancel
    }

    /// Mark the task as running.
    pub fn started(&mut self) {
        self.started = Some(Instant::now());
        self.inner.events.send_stage_started(&self.stage, self.kind);
    }

    /// Report the task's result. Call after end-of-stream was forwarded,
    /// or on failure.
    pub fn finish(mut self, result: Result<()>, mut stats: StageStats) {
        self.finished = true;
        stats.elapsed = self.started.unwrap_or(self.created).elapsed();
        self.inner.complete(&self.stage, self.kind, result, stats);
    }
}

impl Drop for CompletionHandle {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if self.started.is_some() {
            tracing::warn!("stage '{}' exited without reporting completion", self.stage);
            let error = Error::processing("task exited without reporting completion");
            self.inner
                .complete(&self.stage, self.kind, Err(error), StageStats::default());
        } else if self.inner.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.all_done.notify_waiters();
        }
    }
}

impl std::fmt::Debug for CompletionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionHandle")
            .field("stage", &self.stage)
            .field("kind", &self.kind)
            .field("finished", &self.finished)
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_returns_after_all_finish() {
        let tracker = CompletionTracker::new(3, CancelToken::new());
        let handles: Vec<_> = (0..3)
            .map(|i| tracker.handle(format!("t{i}"), StageKind::Transform).unwrap())
            .collect();

        for mut handle in handles {
            tokio::spawn(async move {
                handle.started();
                tokio::time::sleep(Duration::from_millis(2)).await;
                handle.finish(Ok(()), StageStats::default());
            });
        }

        tokio::time::timeout(Duration::from_secs(1), tracker.wait())
            .await
            .expect("tracker should reach zero");
        assert_eq!(tracker.remaining(), 0);
        assert_eq!(tracker.reports().len(), 3);
        assert!(tracker.take_failures().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_decrements_are_not_lost() {
        let count = 256;
        let tracker = CompletionTracker::new(count, CancelToken::new());
        let mut tasks = Vec::new();
        for i in 0..count {
            let mut handle = tracker.handle(format!("t{i}"), StageKind::Transform).unwrap();
            tasks.push(tokio::spawn(async move {
                handle.started();
                handle.finish(Ok(()), StageStats::default());
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        tracker.wait().await;
        assert_eq!(tracker.remaining(), 0);
    }

    #[test]
    fn test_refuses_extra_handles() {
        let tracker = CompletionTracker::new(1, CancelToken::new());
        let _first = tracker.handle("a", StageKind::Source).unwrap();
        let err = tracker.handle("b", StageKind::Sink).unwrap_err();
        assert!(err.to_string().contains("'b'"));
        assert_eq!(tracker.issued(), 1);
    }

    #[tokio::test]
    async fn test_first_failure_cancels() {
        let cancel = CancelToken::new();
        let tracker = CompletionTracker::new(2, cancel.clone());
        let mut failing = tracker.handle("bad", StageKind::Transform).unwrap();
        let ok = tracker.handle("good", StageKind::Sink).unwrap();

        failing.started();
        failing.finish(Err(Error::processing("malformed item")), StageStats::default());
        assert!(cancel.is_cancelled());
        assert_eq!(tracker.remaining(), 1);

        ok.finish(Ok(()), StageStats::default());
        tracker.wait().await;

        let failures = tracker.take_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "bad");

        let reports = tracker.reports();
        let bad = reports.iter().find(|r| r.name == "bad").unwrap();
        assert_eq!(bad.outcome, StageOutcome::Failed("malformed item".into()));
    }

    #[tokio::test]
    async fn test_dropped_handle_still_counts_down() {
        let cancel = CancelToken::new();
        let tracker = CompletionTracker::new(2, cancel.clone());
        let mut started = tracker.handle("panicky", StageKind::Transform).unwrap();
        let unstarted = tracker.handle("never-ran", StageKind::Sink).unwrap();

        started.started();
        drop(started);
        drop(unstarted);

        tokio::time::timeout(Duration::from_secs(1), tracker.wait())
            .await
            .expect("dropped handles must not hang the tracker");
        assert!(cancel.is_cancelled());
        let failures = tracker.take_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "panicky");
    }

    #[tokio::test]
    async fn test_events_published() {
        let events = EventSender::new(16);
        let mut rx = events.subscribe();
        let tracker = CompletionTracker::with_events(1, CancelToken::new(), events);

        let mut handle = tracker.handle("src", StageKind::Source).unwrap();
        handle.started();
        let stats = StageStats {
            items_out: 3,
            ..StageStats::default()
        };
        handle.finish(Ok(()), stats);

        assert_eq!(
            rx.recv().await.unwrap(),
            PipelineEvent::StageStarted {
                stage: "src".into(),
                kind: StageKind::Source
            }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            PipelineEvent::StageFinished {
                stage: "src".into(),
                items_in: 0,
                items_out: 3
            }
        );
    }
}
