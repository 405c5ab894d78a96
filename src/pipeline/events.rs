//! Pipeline event system for async event handling.
//!
//! Events are emitted while a pipeline runs and can be received
//! asynchronously by the caller. Subscribe before starting the run; a
//! receiver only sees events sent after it was created.

use crate::element::StageKind;
use std::fmt;
use std::time::Duration;
use tokio::sync::broadcast;

/// Events emitted by the pipeline during execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    /// Pipeline execution started.
    Started {
        /// Number of tasks spawned.
        tasks: usize,
    },

    /// A stage task started processing.
    StageStarted {
        /// Instance name of the task.
        stage: String,
        /// Role of the task.
        kind: StageKind,
    },

    /// A stage task finished successfully (end-of-stream forwarded).
    StageFinished {
        /// Instance name of the task.
        stage: String,
        /// Items read.
        items_in: u64,
        /// Items written.
        items_out: u64,
    },

    /// A stage task failed.
    Error {
        /// The error message.
        message: String,
        /// The stage where the error occurred (if known).
        stage: Option<String>,
    },

    /// The run was cancelled, either by a failure or by the caller.
    Cancelled,

    /// Every task has finished.
    Completed {
        /// Wall-clock time of the run.
        elapsed: Duration,
    },
}

impl fmt::Display for PipelineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineEvent::Started { tasks } => write!(f, "Pipeline started ({} tasks)", tasks),
            PipelineEvent::StageStarted { stage, kind } => {
                write!(f, "Stage {} ({}) started", stage, kind)
            }
            PipelineEvent::StageFinished {
                stage,
                items_in,
                items_out,
            } => write!(
                f,
                "Stage {} finished ({} in, {} out)",
                stage, items_in, items_out
            ),
            PipelineEvent::Error { message, stage } => {
                if let Some(s) = stage {
                    write!(f, "Error in {}: {}", s, message)
                } else {
                    write!(f, "Error: {}", message)
                }
            }
            PipelineEvent::Cancelled => write!(f, "Pipeline cancelled"),
            PipelineEvent::Completed { elapsed } => {
                write!(f, "Pipeline completed in {:?}", elapsed)
            }
        }
    }
}

/// Sender for pipeline events.
///
/// Held by the completion tracker and the runner.
#[derive(Clone, Debug)]
pub struct EventSender {
    sender: broadcast::Sender<PipelineEvent>,
}

impl EventSender {
    /// Create a new event sender with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Send an event.
    ///
    /// Returns the number of receivers that received the event.
    /// Returns 0 if there are no receivers (which is fine).
    pub fn send(&self, event: PipelineEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Send an error event.
    pub fn send_error(&self, message: impl Into<String>, stage: Option<String>) {
        self.send(PipelineEvent::Error {
            message: message.into(),
            stage,
        });
    }

    /// Send a stage started event.
    pub fn send_stage_started(&self, stage: impl Into<String>, kind: StageKind) {
        self.send(PipelineEvent::StageStarted {
            stage: stage.into(),
            kind,
        });
    }

    /// Send a stage finished event.
    pub fn send_stage_finished(&self, stage: impl Into<String>, items_in: u64, items_out: u64) {
        self.send(PipelineEvent::StageFinished {
            stage: stage.into(),
            items_in,
            items_out,
        });
    }

    /// Create a receiver for events.
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }
}

impl Default for EventSender {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Receiver for pipeline events.
///
/// Multiple receivers can be created from a single sender.
pub struct EventReceiver {
    receiver: broadcast::Receiver<PipelineEvent>,
}

impl EventReceiver {
    /// Receive the next event.
    ///
    /// Returns `None` if the sender has been dropped.
    pub async fn recv(&mut self) -> Option<PipelineEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::trace!("event receiver lagged, skipped {} events", skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Try to receive an event without blocking.
    ///
    /// Returns `None` if no event is available or the sender has been dropped.
    pub fn try_recv(&mut self) -> Option<PipelineEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_send_recv() {
        let sender = EventSender::new(16);
        let mut receiver = sender.subscribe();

        sender.send(PipelineEvent::Cancelled);

        let event = receiver.recv().await.unwrap();
        assert_eq!(event, PipelineEvent::Cancelled);
    }

    #[tokio::test]
    async fn test_multiple_receivers() {
        let sender = EventSender::new(16);
        let mut receiver1 = sender.subscribe();
        let mut receiver2 = sender.subscribe();

        sender.send_stage_started("tokenizer[0]", StageKind::Transform);

        let e1 = receiver1.recv().await.unwrap();
        let e2 = receiver2.recv().await.unwrap();

        assert!(matches!(e1, PipelineEvent::StageStarted { .. }));
        assert_eq!(e1, e2);
    }

    #[test]
    fn test_event_display() {
        let event = PipelineEvent::Error {
            message: "test error".to_string(),
            stage: Some("node1".to_string()),
        };
        assert_eq!(format!("{}", event), "Error in node1: test error");

        let event = PipelineEvent::StageFinished {
            stage: "sink".to_string(),
            items_in: 4,
            items_out: 0,
        };
        assert_eq!(format!("{}", event), "Stage sink finished (4 in, 0 out)");
    }
}
