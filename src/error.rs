//! Error types for filterflow.

use thiserror::Error;

/// Result type alias using filterflow's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for pipeline assembly and execution.
///
/// Build-time variants (`UnknownStage`, `DuplicateStage`, `TypeMismatch`,
/// `InstantiationFailure`, `SourceUnavailable`, `InvalidAssembly`,
/// `InvalidConfig`) are returned before any stage task is spawned. Runtime
/// failures are re-raised by the runner once every task has unwound.
#[derive(Error, Debug)]
pub enum Error {
    /// A stage name is absent from the registry.
    #[error("unknown stage '{name}': not in the registry")]
    UnknownStage {
        /// The offending name.
        name: String,
    },

    /// A stage name was registered twice.
    #[error("stage '{name}' is already registered")]
    DuplicateStage {
        /// The offending name.
        name: String,
    },

    /// Two adjacent stages disagree on the element type of their channel.
    #[error(
        "type mismatch: '{upstream}' produces {produced} but '{downstream}' expects {expected}"
    )]
    TypeMismatch {
        /// The producing side.
        upstream: String,
        /// Type produced by `upstream`.
        produced: &'static str,
        /// The consuming side.
        downstream: String,
        /// Type expected by `downstream`.
        expected: &'static str,
    },

    /// A stage constructor failed.
    #[error("failed to instantiate stage '{name}': {reason}")]
    InstantiationFailure {
        /// The stage being built.
        name: String,
        /// Human-readable cause.
        reason: String,
    },

    /// The external input of a source could not be opened.
    #[error("source '{name}' cannot open its input: {reason}")]
    SourceUnavailable {
        /// The source stage.
        name: String,
        /// Human-readable cause.
        reason: String,
    },

    /// A blocking channel operation was cancelled.
    #[error("stage '{stage}' was interrupted while blocked on a channel")]
    Interrupted {
        /// The stage that observed the cancellation.
        stage: String,
    },

    /// A channel peer went away without sending end-of-stream.
    #[error("stage '{stage}' lost its channel peer before end-of-stream")]
    Disconnected {
        /// The stage that observed the closed channel.
        stage: String,
    },

    /// The assembly is structurally invalid (too short, wrong roles, ...).
    #[error("invalid assembly: {0}")]
    InvalidAssembly(String),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Stage logic rejected an item.
    #[error("{0}")]
    Processing(String),

    /// A running stage failed; wraps the stage's own error.
    #[error("stage '{stage}' failed: {source}")]
    StageFailed {
        /// The failing stage instance.
        stage: String,
        /// What went wrong.
        #[source]
        source: Box<Error>,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a processing error for a malformed item.
    pub fn processing(message: impl Into<String>) -> Self {
        Self::Processing(message.into())
    }

    /// Whether this error is a consequence of cancellation rather than a
    /// root cause.
    pub fn is_interruption(&self) -> bool {
        match self {
            Self::Interrupted { .. } => true,
            Self::StageFailed { source, .. } => source.is_interruption(),
            _ => false,
        }
    }

    /// The stage name carried by this error, if any.
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::UnknownStage { name }
            | Self::DuplicateStage { name }
            | Self::InstantiationFailure { name, .. }
            | Self::SourceUnavailable { name, .. } => Some(name),
            Self::Interrupted { stage }
            | Self::Disconnected { stage }
            | Self::StageFailed { stage, .. } => Some(stage),
            Self::TypeMismatch { downstream, .. } => Some(downstream),
            _ => None,
        }
    }
}
