//! Pipeline runner.
//!
//! Spawns one tokio task per realized stage, waits on the completion
//! tracker, joins every task and re-raises the first failure.

use super::events::{EventReceiver, EventSender, PipelineEvent};
use super::tracker::{CompletionTracker, StageReport};
use crate::cancel::CancelToken;
use crate::element::{DataType, Stage};
use crate::error::{Error, Result};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::Instrument;

/// A channel created by the composer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkInfo {
    /// Producing task.
    pub from: String,
    /// Consuming task.
    pub to: String,
    /// Element type carried.
    pub data_type: DataType,
    /// Channel capacity.
    pub capacity: usize,
}

/// A fully wired pipeline, ready to run.
///
/// Built by [`PipelineBuilder`](super::PipelineBuilder). Running consumes it.
pub struct Pipeline {
    tasks: Vec<Box<dyn Stage>>,
    links: Vec<LinkInfo>,
    tracker: CompletionTracker,
    cancel: CancelToken,
    events: EventSender,
}

impl Pipeline {
    pub(crate) fn new(
        tasks: Vec<Box<dyn Stage>>,
        links: Vec<LinkInfo>,
        tracker: CompletionTracker,
        cancel: CancelToken,
        events: EventSender,
    ) -> Self {
        Self {
            tasks,
            links,
            tracker,
            cancel,
            events,
        }
    }

    /// Number of tasks that will be spawned.
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Task names, in realization order.
    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.iter().map(|task| task.name()).collect()
    }

    /// Every channel, in creation order.
    pub fn links(&self) -> &[LinkInfo] {
        &self.links
    }

    /// The token that cancels this pipeline.
    ///
    /// Cancelling it before or during the run makes every blocked task
    /// unwind with [`Error::Interrupted`].
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Subscribe to pipeline events.
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// Spawn every task on the current tokio runtime.
    ///
    /// Fails if called outside a runtime.
    pub fn start(self) -> Result<PipelineHandle> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            Error::InvalidConfig("a pipeline must be started inside a tokio runtime".into())
        })?;

        if self.tracker.issued() != self.tracker.expected() {
            return Err(Error::InvalidAssembly(format!(
                "completion tracker expects {} tasks but {} were realized",
                self.tracker.expected(),
                self.tracker.issued()
            )));
        }

        let order: Vec<String> = self.tasks.iter().map(|t| t.name().to_string()).collect();
        tracing::debug!("starting pipeline with {} tasks", order.len());
        self.events.send(PipelineEvent::Started { tasks: order.len() });

        let started = Instant::now();
        let tasks = self
            .tasks
            .into_iter()
            .map(|task| {
                let span = tracing::debug_span!("stage", name = task.name(), kind = %task.kind());
                runtime.spawn(task.run().instrument(span))
            })
            .collect();

        Ok(PipelineHandle {
            tasks,
            order,
            tracker: self.tracker,
            cancel: self.cancel,
            events: self.events,
            started,
        })
    }

    /// Run the pipeline to completion.
    ///
    /// On success the sink's result container is complete and no task is
    /// still running.
    pub async fn run(self) -> Result<RunReport> {
        self.start()?.wait().await
    }

    /// Run on a dedicated multi-threaded runtime, blocking the caller.
    ///
    /// Fails if called from within a tokio runtime.
    pub fn run_blocking(self) -> Result<RunReport> {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(Error::InvalidConfig(
                "run_blocking cannot be called from within an async runtime; use run().await"
                    .into(),
            ));
        }
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("filterflow-worker")
            .build()?;
        runtime.block_on(self.run())
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("tasks", &self.task_names())
            .field("links", &self.links.len())
            .finish()
    }
}

/// Handle to a running pipeline.
///
/// Allows waiting for completion or cancelling the pipeline. Dropping the
/// handle before every task has finished cancels the run, so abandoning
/// [`Pipeline::run`] (for example under a timeout) stops its stages too.
pub struct PipelineHandle {
    tasks: Vec<JoinHandle<()>>,
    order: Vec<String>,
    tracker: CompletionTracker,
    cancel: CancelToken,
    events: EventSender,
    started: Instant,
}

impl PipelineHandle {
    /// Wait for every task to finish.
    ///
    /// Returns the run report, or the first failure: the root cause wrapped
    /// in [`Error::StageFailed`], or [`Error::Interrupted`] if the run was
    /// cancelled without a stage failing.
    pub async fn wait(mut self) -> Result<RunReport> {
        self.tracker.wait().await;

        for task in std::mem::take(&mut self.tasks) {
            if let Err(e) = task.await {
                // The task's completion handle already recorded the failure.
                tracing::error!("stage task panicked: {}", e);
            }
        }

        let elapsed = self.started.elapsed();
        let mut stages = self.tracker.reports();
        stages.sort_by_key(|report| {
            self.order
                .iter()
                .position(|name| *name == report.name)
                .unwrap_or(usize::MAX)
        });

        if let Some(error) = first_failure(self.tracker.take_failures()) {
            return Err(error);
        }

        tracing::debug!("pipeline completed in {:?}", elapsed);
        self.events.send(PipelineEvent::Completed { elapsed });
        Ok(RunReport { elapsed, stages })
    }

    /// Cancel the pipeline. Blocked tasks unwind with
    /// [`Error::Interrupted`]; call [`wait`](Self::wait) to join them.
    pub fn cancel(&self) {
        if self.cancel.cancel() {
            tracing::debug!("pipeline cancelled by caller");
            self.events.send(PipelineEvent::Cancelled);
        }
    }

    /// Check whether every task has reported completion.
    pub fn is_finished(&self) -> bool {
        self.tracker.remaining() == 0
    }

    /// Subscribe to pipeline events.
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        if self.tracker.remaining() > 0 && self.cancel.cancel() {
            tracing::debug!("pipeline handle dropped while running, cancelling");
            self.events.send(PipelineEvent::Cancelled);
        }
    }
}

/// The root cause wins over the interruptions it triggered.
fn first_failure(failures: Vec<(String, Error)>) -> Option<Error> {
    let mut interruption = None;
    for (stage, error) in failures {
        if error.is_interruption() {
            interruption.get_or_insert(error);
        } else {
            return Some(Error::StageFailed {
                stage,
                source: Box::new(error),
            });
        }
    }
    interruption
}

/// Statistics of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Wall-clock time from start to the last task finishing.
    pub elapsed: Duration,
    /// One report per task, in realization order.
    pub stages: Vec<StageReport>,
}

impl RunReport {
    /// Find a task's report by instance name.
    pub fn stage(&self, name: &str) -> Option<&StageReport> {
        self.stages.iter().find(|report| report.name == name)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<32} {:<9} {:>10} {:>10} {:>12} {:>12} {:>12}",
            "stage", "kind", "in", "out", "input wait", "output wait", "elapsed"
        )?;
        for report in &self.stages {
            let stats = &report.stats;
            writeln!(
                f,
                "{:<32} {:<9} {:>10} {:>10} {:>12} {:>12} {:>12}",
                report.name,
                report.kind.to_string(),
                stats.items_in,
                stats.items_out,
                format_duration(stats.input_wait),
                format_duration(stats.output_wait),
                format_duration(stats.elapsed),
            )?;
        }
        write!(f, "total elapsed: {}", format_duration(self.elapsed))
    }
}

fn format_duration(duration: Duration) -> String {
    format!("{:.3}ms", duration.as_secs_f64() * 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{StageKind, StageStats};
    use crate::pipeline::tracker::StageOutcome;

    #[test]
    fn test_root_cause_preferred() {
        let failures = vec![
            (
                "upper".to_string(),
                Error::Interrupted {
                    stage: "upper".into(),
                },
            ),
            ("count".to_string(), Error::processing("bad item")),
        ];
        match first_failure(failures) {
            Some(Error::StageFailed { stage, source }) => {
                assert_eq!(stage, "count");
                assert!(matches!(*source, Error::Processing(_)));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_interruption_only() {
        let failures = vec![(
            "upper".to_string(),
            Error::Interrupted {
                stage: "upper".into(),
            },
        )];
        assert!(matches!(
            first_failure(failures),
            Some(Error::Interrupted { .. })
        ));
        assert!(first_failure(Vec::new()).is_none());
    }

    #[test]
    fn test_report_table() {
        let report = RunReport {
            elapsed: Duration::from_millis(12),
            stages: vec![StageReport {
                name: "tokenizer[0]".into(),
                kind: StageKind::Transform,
                stats: StageStats {
                    items_in: 4,
                    items_out: 9,
                    ..StageStats::default()
                },
                outcome: StageOutcome::Completed,
            }],
        };
        let table = report.to_string();
        assert!(table.starts_with("stage"));
        assert!(table.contains("tokenizer[0]"));
        assert!(table.contains("transform"));
        assert!(table.ends_with("total elapsed: 12.000ms"));
        assert_eq!(report.stage("tokenizer[0]").unwrap().stats.items_out, 9);
    }

    #[test]
    fn test_start_requires_runtime() {
        let cancel = CancelToken::new();
        let tracker = CompletionTracker::new(0, cancel.clone());
        let pipeline = Pipeline::new(
            Vec::new(),
            Vec::new(),
            tracker,
            cancel,
            EventSender::default(),
        );
        let err = pipeline.start().err().unwrap();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }
}
