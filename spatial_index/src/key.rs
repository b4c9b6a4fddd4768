//! The keys a tree can be built over: points and axis-aligned boxes.

use crate::geometry::{AabbBox, Vector};

/// A key the tree can index: either a point or a box, projected onto each
/// axis by a low and a high bound.
///
/// Point keys have `low_bound == high_bound` on every axis; box keys don't.
/// `IS_BOX` lets the builder pick the right partition scheme at compile time
/// rather than branching on a runtime tag.
pub trait SpatialKey<const D: usize>: Copy {
    /// Whether this key kind needs the three-way (Low/Middle/High) partition.
    const IS_BOX: bool;

    /// The lower bound of the key's extent along `axis`.
    fn low_bound(&self, axis: usize) -> f64;

    /// The upper bound of the key's extent along `axis`.
    fn high_bound(&self, axis: usize) -> f64;

    /// The smallest box enclosing the key.
    fn bounding_box(&self) -> AabbBox<D>;

    /// Whether the key overlaps `query` (a point test for point keys, a box
    /// intersection test for box keys).
    fn overlaps(&self, query: &AabbBox<D>) -> bool;

    /// Squared distance from `target` to the nearest point of the key.
    fn distance_squared_to(&self, target: Vector<D>) -> f64;
}

/// A single point in `D`-dimensional space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointKey<const D: usize>(pub Vector<D>);

impl<const D: usize> SpatialKey<D> for PointKey<D> {
    const IS_BOX: bool = false;

    fn low_bound(&self, axis: usize) -> f64 {
        self.0.get(axis)
    }

    fn high_bound(&self, axis: usize) -> f64 {
        self.0.get(axis)
    }

    fn bounding_box(&self) -> AabbBox<D> {
        AabbBox::from_point(self.0)
    }

    fn overlaps(&self, query: &AabbBox<D>) -> bool {
        query.overlap_point(self.0)
    }

    fn distance_squared_to(&self, target: Vector<D>) -> f64 {
        use crate::geometry::GeometryOps;
        target.distance_squared(self.0)
    }
}

/// An axis-aligned box in `D`-dimensional space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxKey<const D: usize>(pub AabbBox<D>);

impl<const D: usize> SpatialKey<D> for BoxKey<D> {
    const IS_BOX: bool = true;

    fn low_bound(&self, axis: usize) -> f64 {
        self.0.min.get(axis)
    }

    fn high_bound(&self, axis: usize) -> f64 {
        self.0.max.get(axis)
    }

    fn bounding_box(&self) -> AabbBox<D> {
        self.0
    }

    fn overlaps(&self, query: &AabbBox<D>) -> bool {
        query.overlap_box(&self.0)
    }

    fn distance_squared_to(&self, target: Vector<D>) -> f64 {
        use crate::geometry::GeometryOps;
        target.distance_squared(self.0.closest_point_on_box(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_key_bounds_collapse_to_the_point() {
        let key = PointKey(Vector([1.0, 2.0]));
        assert_eq!(key.low_bound(0), 1.0);
        assert_eq!(key.high_bound(0), 1.0);
        assert_eq!(key.low_bound(1), key.high_bound(1));
        assert!(!PointKey::<2>::IS_BOX);
    }

    #[test]
    fn box_key_distance_is_zero_when_target_inside() {
        let key = BoxKey(AabbBox::new(Vector([0.0, 0.0]), Vector([2.0, 2.0])));
        assert_eq!(key.distance_squared_to(Vector([1.0, 1.0])), 0.0);
        assert_eq!(key.distance_squared_to(Vector([3.0, 0.0])), 1.0);
        assert!(BoxKey::<2>::IS_BOX);
    }
}
