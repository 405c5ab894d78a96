//! Built-in stages.
//!
//! ## Flow
//! - [`Parallelizer`]: Distributes a stream round-robin over K replicas
//! - [`Serializer`]: Merges K replica streams back into one
//!
//! ## Text
//! - [`text::TextStreamer`]: Reads lines from a file or string
//! - Word transforms: tokenizers, filters, [`text::TermFrequencyCounter`]
//! - Frequency sinks: [`text::TermCounter`], [`text::FrequencyTermInverter`]

pub mod flow;
pub mod text;

pub use flow::{Parallelizer, Serializer};
