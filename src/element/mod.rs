//! Stage traits and the drivers that run them.
//!
//! # Stage Types
//!
//! - [`Source`]: Produces items (no input)
//! - [`Transform`]: Maps each item to zero or more items
//! - [`Sink`]: Consumes items (no output)
//!
//! Each is run by a driver ([`SourceStage`], [`TransformStage`],
//! [`SinkStage`]) implementing the object-safe [`Stage`] trait, which is what
//! the stage factory hands to the runner.
//!
//! Channel element types are described at runtime by [`DataType`]; the
//! container a sink writes into by [`TypeTag`].

mod data_type;
mod stage;
mod traits;

pub use data_type::{DataType, TypeTag};
pub use stage::{SinkStage, SourceStage, Stage, StageKind, StageStats, TransformStage};
pub use traits::{Output, Sink, Source, Transform};
