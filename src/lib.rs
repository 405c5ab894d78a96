//! # Filterflow
//!
//! A pipe-and-filter streaming engine.
//!
//! A source produces items, an ordered chain of transforms rewrites them and a
//! sink drains them into a caller-owned container. Stages are looked up by
//! name in a registry, type-checked against their neighbours and wired with
//! bounded channels. In parallel mode each stateless stage is replicated
//! behind a round-robin fan-out and a fan-in merge.
//!
//! ## Features
//!
//! - **Bounded channels**: backpressure with a fixed memory ceiling
//! - **Typed end-of-stream**: `Message::Eos` instead of sentinel values
//! - **Build-time validation**: unknown names and type mismatches fail before
//!   anything runs
//! - **Completion tracking**: one countdown over every task, first failure
//!   re-raised to the caller
//!
//! ## Quick Start
//!
//! ```rust
//! use filterflow::prelude::*;
//! use std::collections::HashMap;
//!
//! let registry = StageRegistry::with_builtins()?;
//! let counts: Collector<HashMap<String, usize>> = Collector::default();
//!
//! PipelineBuilder::new(&registry)
//!     .stages(["text-streamer", "tokenizer", "term-counter"])
//!     .build(SourceInput::text("the cat sat on the mat the cat ran"), counts.clone())?
//!     .run_blocking()?;
//!
//! assert_eq!(counts.lock()["the"], 3);
//! # Ok::<(), filterflow::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cancel;
pub mod element;
pub mod elements;
pub mod error;
pub mod link;
pub mod pipeline;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::cancel::CancelToken;
    pub use crate::element::{Output, Sink, Source, Transform};
    pub use crate::error::{Error, Result};
    pub use crate::pipeline::{
        Collector, ExecutionMode, Pipeline, PipelineBuilder, PipelineConfig, RunReport,
        SourceInput, StageRegistry,
    };
}

pub use cancel::CancelToken;
pub use error::{Error, Result};
