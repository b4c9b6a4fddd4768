//! Typed integer handles.
//!
//! The spatial index refers to nodes and elements only by their position in
//! a backing `Vec`. Passing plain `usize`/`u32` around for both would make it
//! trivially easy to hand a node index to a function expecting an element
//! index (or vice versa). [`create_simple_key!`] mints a newtype that implements
//! [`SimpleKey`] so each index space gets its own type.
#![warn(missing_docs)]

/// Trait for typed indices backed by a plain `u32`.
pub trait SimpleKey: Copy {
    #[doc(hidden)]
    /// Creates a new key. Not meant to be called directly by users of a key type.
    fn new(key: u32) -> Self;
    #[doc(hidden)]
    /// Returns the underlying key value.
    fn key(&self) -> u32;

    /// Returns the key as a `usize`, for indexing into a `Vec`.
    #[inline]
    fn index(&self) -> usize {
        self.key() as usize
    }
}

impl SimpleKey for u32 {
    fn new(key: u32) -> Self {
        key
    }

    fn key(&self) -> u32 {
        *self
    }
}

/// Mints a typed index newtype backed by a `u32`.
///
/// ```
/// spatial_container::create_simple_key!(NodeIndex, "Index of a node in the arena.");
/// let index = NodeIndex::new(3);
/// assert_eq!(index.index(), 3);
/// ```
#[macro_export]
macro_rules! create_simple_key {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(u32);

        impl $crate::SimpleKey for $name {
            fn new(key: u32) -> Self {
                Self(key)
            }

            fn key(&self) -> u32 {
                self.0
            }
        }
    };
    ($name:ident) => {
        $crate::create_simple_key!($name, "no documentation");
    };
}

#[cfg(test)]
mod tests {
    use crate::SimpleKey;

    create_simple_key!(TestIndex, "index used only by tests");

    #[test]
    fn round_trips_through_u32() {
        let index = TestIndex::new(7);
        assert_eq!(index.key(), 7);
        assert_eq!(index.index(), 7usize);
    }

    #[test]
    fn distinct_key_types_do_not_mix() {
        create_simple_key!(OtherIndex, "a different index space");

        let a = TestIndex::new(1);
        let b = OtherIndex::new(1);
        // This wouldn't compile: `a == b` — the whole point of separate types.
        assert_eq!(a.key(), b.key());
    }
}
