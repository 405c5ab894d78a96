//! Flow control adapters for parallel stages.
//!
//! - [`Parallelizer`]: 1-to-K round-robin distribution
//! - [`Serializer`]: K-to-1 merge
//!
//! The composer places one of each around the K replicas of a parallelized
//! stage. Both are generic over the element type; [`crate::element::DataType`]
//! instantiates them for the type of the surrounding channels.

mod parallelizer;
mod serializer;

pub use parallelizer::Parallelizer;
pub use serializer::Serializer;
