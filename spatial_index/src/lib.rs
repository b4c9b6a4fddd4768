//! A static, arena-backed spatial index over `D`-dimensional point and
//! axis-aligned box keys.
//!
//! A [`Tree`] is built once from a slice of elements and a key-extraction
//! closure and never mutated afterwards; queries are served by
//! [`Tree::range_query`] (a lazy iterator over keys overlapping a box) and
//! [`Tree::nearest_query`] (a pruned k-nearest search). Point keys split the
//! way a classic k-d tree does; box keys that straddle a split plane are
//! routed into a dedicated middle bucket instead of being duplicated into
//! both children.
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod geometry;
pub mod key;
mod query;
mod tree;

pub use config::BuildConfig;
pub use error::TreeError;
pub use geometry::{AabbBox, GeometryOps, Vector};
pub use key::{BoxKey, PointKey, SpatialKey};
pub use query::RangeIter;
pub use tree::{ElementIndex, NodeIndex, Tree};
