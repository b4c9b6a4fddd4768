//! Errors returned by tree construction and queries.
//!
//! Hand-rolled rather than pulled from a crate like `thiserror`: the
//! workspace's other crates don't carry one either, and the error surface
//! here is small enough that a plain enum with a manual `Display` reads no
//! worse.
use std::fmt;

/// Everything that can go wrong building or querying a [`crate::Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeError {
    /// A nearest query was given neither a positive `k` nor a positive
    /// `max_distance`.
    InvalidQueryBounds,
    /// An argument was out of range: `max_elements_per_node == 0` at build
    /// time, or a query box with `max < min` on some axis.
    InvalidArgument,
    /// Reserving space for the node arena failed.
    AllocationFailed,
}

impl fmt::Display for TreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeError::InvalidQueryBounds => write!(f, "nearest query given neither a positive k nor a positive max_distance"),
            TreeError::InvalidArgument => write!(f, "argument out of range (build config, or a query box with max < min)"),
            TreeError::AllocationFailed => write!(f, "failed to allocate the node arena"),
        }
    }
}

impl std::error::Error for TreeError {}
