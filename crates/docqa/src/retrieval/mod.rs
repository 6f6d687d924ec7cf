//! Vector index: exact similarity search and bundle persistence

mod index;
mod persist;

pub use index::{DistanceMetric, SearchHit, VectorIndex, VectorRecord};
pub use persist::{IndexManifest, FORMAT_VERSION};
