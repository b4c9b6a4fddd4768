//! Build-time tuning knobs.

/// Parameters controlling how a [`crate::Tree`] is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildConfig {
    /// A node stops splitting once it holds this many elements or fewer.
    ///
    /// Also the threshold below which a straddling middle bucket is kept
    /// directly on its parent instead of being promoted to its own node.
    pub max_elements_per_node: usize,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self { max_elements_per_node: 64 }
    }
}
