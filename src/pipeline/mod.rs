//! Pipeline construction and execution.
//!
//! This module provides the engine around the stages:
//!
//! - [`StageRegistry`]: named stage constructors and their descriptors
//! - [`StageFactory`]: instantiates a named stage bound to its ports
//! - [`PipelineBuilder`]: validates an assembly and realizes it, serial or
//!   parallel
//! - [`CompletionTracker`]: countdown barrier over every realized task
//! - [`Pipeline`]: runs the tasks and reports the outcome
//! - [`PipelineEvent`]: async events emitted during execution
//!
//! # Example
//!
//! ```rust
//! use filterflow::pipeline::{
//!     Collector, ExecutionMode, PipelineBuilder, PipelineConfig, SourceInput, StageRegistry,
//! };
//! use std::collections::HashMap;
//!
//! let registry = StageRegistry::with_builtins()?;
//! let counts: Collector<HashMap<String, usize>> = Collector::default();
//!
//! let report = PipelineBuilder::new(&registry)
//!     .config(PipelineConfig::default().with_mode(ExecutionMode::Parallel))
//!     .stages(["text-streamer", "tokenizer", "term-counter"])
//!     .build(SourceInput::text("the cat sat on the mat the cat ran"), counts.clone())?
//!     .run_blocking()?;
//!
//! assert_eq!(counts.lock()["cat"], 2);
//! assert!(report.stage("tokenizer/serializer").is_some());
//! # Ok::<(), filterflow::Error>(())
//! ```

mod builder;
mod collector;
mod config;
mod events;
mod executor;
mod factory;
mod registry;
mod tracker;

pub use builder::PipelineBuilder;
pub use collector::{Collector, ResultTarget};
pub use config::{ExecutionMode, PipelineConfig};
pub use events::{EventReceiver, EventSender, PipelineEvent};
pub use executor::{LinkInfo, Pipeline, PipelineHandle, RunReport};
pub use factory::StageFactory;
pub use registry::{
    Inlet, Outlet, SourceInput, StageConstructor, StageDescriptor, StagePorts, StageRegistry,
    StageRole,
};
pub use tracker::{CompletionHandle, CompletionTracker, StageOutcome, StageReport};
