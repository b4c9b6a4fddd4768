//! Range queries and nearest-neighbour search over a built [`Tree`].

use crate::error::TreeError;
use crate::geometry::{AabbBox, GeometryOps, Vector};
use crate::key::SpatialKey;
use crate::tree::{ElementIndex, NodeIndex, Tree};
use spatial_container::SimpleKey;

impl<K, T, const D: usize> Tree<K, T, D>
where
    K: SpatialKey<D>,
{
    /// Every element whose key overlaps `query`, as a lazy iterator.
    ///
    /// Walks the tree with parent back-pointers rather than a call stack or
    /// an eagerly collected buffer, so iterating partway through (or not at
    /// all) does no more work than it has to.
    pub fn range_query(&self, query: AabbBox<D>) -> Result<RangeIter<'_, K, T, D>, TreeError> {
        if !query.is_empty() && (0..D).any(|axis| query.max.get(axis) < query.min.get(axis)) {
            return Err(TreeError::InvalidArgument);
        }

        let state = match self.root_index() {
            Some(root) if self.node(root).bounds.overlap_box(&query) => Some(IterState {
                node: root,
                element: self.node(root).elements.map(|(begin, _)| begin.index()).unwrap_or(0),
                going_down: true,
            }),
            _ => None,
        };

        Ok(RangeIter { tree: self, query, state })
    }

    /// The `k` elements nearest to `target`, within `max_distance` if it is
    /// positive, sorted by ascending squared distance.
    ///
    /// `k == 0` means "no cap", in which case `max_distance` must be
    /// positive or the query is meaningless and rejected.
    pub fn nearest_query(&self, target: Vector<D>, k: usize, max_distance: f64) -> Result<Vec<(ElementIndex, f64)>, TreeError> {
        if k == 0 && max_distance <= 0.0 {
            return Err(TreeError::InvalidQueryBounds);
        }

        let mut results: Vec<(ElementIndex, f64)> = Vec::new();
        let Some(root) = self.root_index() else {
            return Ok(results);
        };

        let mut worst_sq = if max_distance > 0.0 { max_distance * max_distance } else { f64::INFINITY };
        let mut node = root;
        let mut going_down = true;

        loop {
            // A node's own held elements are scanned exactly once, on the visit that
            // first arrives at it (descending from its parent or a sibling). Ascending
            // back to a node after its children are exhausted must not re-enter this
            // block, or a box-keyed node holding both a middle bucket and a low/high
            // child would have its own elements rescanned and double-counted.
            if going_down {
                if let Some((begin, end)) = self.node(node).elements {
                    for element in begin.index()..end.index() {
                        let key = self.keys[element];
                        let distance_sq = key.distance_squared_to(target);
                        if distance_sq <= worst_sq {
                            let position = results.partition_point(|&(_, d)| d <= distance_sq);
                            results.insert(position, (ElementIndex::new(element as u32), distance_sq));
                            if k > 0 && results.len() > k {
                                results.pop();
                            }
                            if k > 0 && results.len() == k {
                                worst_sq = results.last().unwrap().1;
                            }
                        }
                    }
                }
            }

            if going_down {
                if let Some(child) = self.first_child_near(node, target, worst_sq) {
                    node = child;
                    going_down = true;
                    continue;
                }
            }

            if let Some(sibling) = self.next_sibling_near(node, target, worst_sq) {
                node = sibling;
                going_down = true;
                continue;
            }

            match self.node(node).parent {
                Some(parent) => {
                    node = parent;
                    going_down = false;
                }
                None => break,
            }
        }

        Ok(results)
    }

    /// `(middle, near, far)` children of `node`, ordered the way a nearest
    /// search should prefer to visit them given query point `p`. `near` is
    /// the side `p` falls on; `far` is pruned by the caller via the
    /// split-plane distance, not here.
    fn near_order(&self, node_index: NodeIndex, p: Vector<D>) -> (Option<NodeIndex>, Option<NodeIndex>, Option<NodeIndex>) {
        let node = self.node(node_index);
        match node.split_axis {
            Some(axis) if p.get(axis) < node.split_position => (node.middle_child, node.low_child, node.high_child),
            Some(_) => (node.middle_child, node.high_child, node.low_child),
            None => (node.middle_child, None, None),
        }
    }

    fn plane_distance_sq(&self, node_index: NodeIndex, p: Vector<D>) -> f64 {
        match self.node(node_index).split_axis {
            Some(axis) => {
                let delta = p.get(axis) - self.node(node_index).split_position;
                delta * delta
            }
            None => f64::INFINITY,
        }
    }

    fn first_child_near(&self, node_index: NodeIndex, p: Vector<D>, worst_sq: f64) -> Option<NodeIndex> {
        let (middle, near, far) = self.near_order(node_index, p);
        if middle.is_some() {
            return middle;
        }
        if near.is_some() {
            return near;
        }
        if far.is_some() && self.plane_distance_sq(node_index, p) < worst_sq {
            return far;
        }
        None
    }

    fn next_sibling_near(&self, current: NodeIndex, p: Vector<D>, worst_sq: f64) -> Option<NodeIndex> {
        let parent_index = self.node(current).parent?;
        let (middle, near, far) = self.near_order(parent_index, p);

        if middle == Some(current) {
            if near.is_some() {
                return near;
            }
            if far.is_some() && self.plane_distance_sq(parent_index, p) < worst_sq {
                return far;
            }
            return None;
        }

        if near == Some(current) {
            if far.is_some() && self.plane_distance_sq(parent_index, p) < worst_sq {
                return far;
            }
            return None;
        }

        None
    }
}

struct IterState {
    node: NodeIndex,
    element: usize,
    going_down: bool,
}

/// A lazy, stack-free iterator over the elements overlapping a query box.
///
/// Produced by [`Tree::range_query`]. Holds no heap allocation of its own;
/// position is a single `(node, element, going_down)` triple, advanced one
/// step at a time using each node's parent pointer.
pub struct RangeIter<'t, K, T, const D: usize> {
    tree: &'t Tree<K, T, D>,
    query: AabbBox<D>,
    state: Option<IterState>,
}

impl<'t, K, T, const D: usize> Iterator for RangeIter<'t, K, T, D>
where
    K: SpatialKey<D>,
{
    type Item = ElementIndex;

    fn next(&mut self) -> Option<ElementIndex> {
        loop {
            let state = self.state.as_mut()?;
            let node = self.tree.node(state.node);

            if let Some((_, end)) = node.elements {
                if state.element < end.index() {
                    let element = state.element;
                    state.element += 1;
                    let key = self.tree.keys[element];
                    if key.overlaps(&self.query) {
                        return Some(ElementIndex::new(element as u32));
                    }
                    continue;
                }
            }

            if state.going_down {
                if let Some(child) = self.tree.first_child_overlap(state.node, &self.query) {
                    state.node = child;
                    state.element = self.tree.node(child).elements.map(|(begin, _)| begin.index()).unwrap_or(0);
                    state.going_down = true;
                    continue;
                }
            }

            if let Some(sibling) = self.tree.next_sibling_overlap(state.node, &self.query) {
                state.node = sibling;
                state.element = self.tree.node(sibling).elements.map(|(begin, _)| begin.index()).unwrap_or(0);
                state.going_down = true;
                continue;
            }

            match self.tree.node(state.node).parent {
                Some(parent) => {
                    state.node = parent;
                    // The parent's own elements (if any) were already drained
                    // on our first visit, before we ever descended; jump the
                    // cursor to its end so step one above is a no-op rather
                    // than re-yielding them.
                    state.element = self.tree.node(parent).elements.map(|(_, end)| end.index()).unwrap_or(0);
                    state.going_down = false;
                }
                None => {
                    self.state = None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildConfig;
    use crate::key::{BoxKey, PointKey};

    fn collect_points(points: &[[f64; 2]], query: AabbBox<2>) -> Vec<[f64; 2]> {
        let elements: Vec<[f64; 2]> = points.to_vec();
        let tree: Tree<PointKey<2>, [f64; 2], 2> = Tree::build(elements, |p| PointKey(Vector(*p)), BuildConfig { max_elements_per_node: 4 }).unwrap();
        tree.range_query(query)
            .unwrap()
            .map(|index| *tree.get(index))
            .collect()
    }

    #[test]
    fn range_query_returns_exactly_the_points_inside() {
        let mut points = Vec::new();
        for x in 0..10 {
            for y in 0..10 {
                points.push([x as f64, y as f64]);
            }
        }
        let query = AabbBox::new(Vector([2.0, 2.0]), Vector([4.0, 4.0]));
        let mut found = collect_points(&points, query);
        found.sort_by(|a, b| a.partial_cmp(b).unwrap());

        let mut expected: Vec<[f64; 2]> = points.into_iter().filter(|p| query.overlap_point(Vector(*p))).collect();
        expected.sort_by(|a, b| a.partial_cmp(b).unwrap());

        assert_eq!(found, expected);
    }

    #[test]
    fn range_query_over_empty_tree_yields_nothing() {
        let tree: Tree<PointKey<2>, [f64; 2], 2> = Tree::build(Vec::new(), |p: &[f64; 2]| PointKey(Vector(*p)), BuildConfig::default()).unwrap();
        let query = AabbBox::new(Vector([0.0, 0.0]), Vector([1.0, 1.0]));
        assert_eq!(tree.range_query(query).unwrap().count(), 0);
    }

    #[test]
    fn malformed_query_box_is_rejected() {
        let tree: Tree<PointKey<2>, [f64; 2], 2> = Tree::build(vec![[0.0, 0.0]], |p| PointKey(Vector(*p)), BuildConfig::default()).unwrap();
        let inverted = AabbBox { min: Vector([1.0, 0.0]), max: Vector([0.0, 1.0]) };
        assert_eq!(tree.range_query(inverted).unwrap_err(), TreeError::InvalidArgument);
    }

    #[test]
    fn straddling_box_keys_are_found_through_the_middle_bucket() {
        // A cross of boxes all straddling the centre split plane on one axis
        // or the other, forcing middle buckets on both splits.
        let mut boxes = Vec::new();
        for i in 0..20 {
            let offset = i as f64;
            boxes.push(AabbBox::new(Vector([-1.0 + offset * 0.01, -0.1]), Vector([1.0 + offset * 0.01, 0.1])));
            boxes.push(AabbBox::new(Vector([-0.1, -1.0 + offset * 0.01]), Vector([0.1, 1.0 + offset * 0.01])));
        }
        let tree: Tree<BoxKey<2>, AabbBox<2>, 2> = Tree::build(boxes.clone(), |b| BoxKey(*b), BuildConfig { max_elements_per_node: 2 }).unwrap();

        let query = AabbBox::new(Vector([-0.05, -0.05]), Vector([0.05, 0.05]));
        let found: Vec<_> = tree.range_query(query).unwrap().map(|index| *tree.get(index)).collect();
        assert_eq!(found.len(), boxes.iter().filter(|b| b.overlap_box(&query)).count());
    }

    #[test]
    fn nearest_query_on_a_diagonal_line_orders_by_distance() {
        let points: Vec<[f64; 2]> = (0..50).map(|i| [i as f64, i as f64]).collect();
        let tree: Tree<PointKey<2>, [f64; 2], 2> = Tree::build(points, |p| PointKey(Vector(*p)), BuildConfig { max_elements_per_node: 4 }).unwrap();

        let results = tree.nearest_query(Vector([10.3, 10.3]), 3, 0.0).unwrap();
        assert_eq!(results.len(), 3);
        let found: Vec<[f64; 2]> = results.iter().map(|&(index, _)| *tree.get(index)).collect();
        assert_eq!(found, vec![[10.0, 10.0], [11.0, 11.0], [9.0, 9.0]]);
        for pair in results.windows(2) {
            assert!(pair[0].1 <= pair[1].1);
        }
    }

    #[test]
    fn nearest_query_respects_max_distance() {
        let points: Vec<[f64; 2]> = (0..50).map(|i| [i as f64, 0.0]).collect();
        let tree: Tree<PointKey<2>, [f64; 2], 2> = Tree::build(points, |p| PointKey(Vector(*p)), BuildConfig { max_elements_per_node: 4 }).unwrap();

        let results = tree.nearest_query(Vector([0.0, 0.0]), 0, 2.5).unwrap();
        let found: Vec<f64> = results.iter().map(|&(index, _)| tree.get(index)[0]).collect();
        assert_eq!(found, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn nearest_query_rejects_no_cap_and_no_radius() {
        let tree: Tree<PointKey<2>, [f64; 2], 2> = Tree::build(vec![[0.0, 0.0]], |p| PointKey(Vector(*p)), BuildConfig::default()).unwrap();
        assert_eq!(tree.nearest_query(Vector([0.0, 0.0]), 0, 0.0).unwrap_err(), TreeError::InvalidQueryBounds);
    }

    #[test]
    fn seventeen_equal_points_all_match_a_point_query() {
        let points = vec![[3.0, 3.0]; 17];
        let tree: Tree<PointKey<2>, [f64; 2], 2> = Tree::build(points, |p| PointKey(Vector(*p)), BuildConfig { max_elements_per_node: 4 }).unwrap();
        let query = AabbBox::from_point(Vector([3.0, 3.0]));
        assert_eq!(tree.range_query(query).unwrap().count(), 17);

        let nearest = tree.nearest_query(Vector([3.0, 3.0]), 5, 0.0).unwrap();
        assert_eq!(nearest.len(), 5);
        assert!(nearest.iter().all(|&(_, d)| d == 0.0));
    }

    #[test]
    fn nearest_query_with_box_keys_does_not_double_count_an_embedded_middle_bucket() {
        // Plenty of boxes clearly to one side or the other, plus two small
        // boxes straddling the split plane that stay small enough to be kept
        // directly on the splitting node (`own_elements`) rather than promoted
        // to their own middle child, so that node ends up with a low child,
        // a high child, *and* held elements all at once.
        let mut boxes = Vec::new();
        for i in 0..30 {
            let offset = i as f64;
            boxes.push(AabbBox::new(Vector([-31.0 + offset, 0.0]), Vector([-30.5 + offset, 0.5])));
            boxes.push(AabbBox::new(Vector([1.0 + offset, 0.0]), Vector([1.5 + offset, 0.5])));
        }
        boxes.push(AabbBox::new(Vector([-3.0, 0.0]), Vector([3.0, 0.5])));
        boxes.push(AabbBox::new(Vector([-2.0, 0.0]), Vector([4.0, 0.5])));

        let tree: Tree<BoxKey<2>, AabbBox<2>, 2> = Tree::build(boxes.clone(), |b| BoxKey(*b), BuildConfig { max_elements_per_node: 4 }).unwrap();
        assert!(tree.nodes.iter().any(|node| node.elements.is_some() && (node.low_child.is_some() || node.high_child.is_some())));

        let target = Vector([0.0, 0.0]);
        let k = boxes.len();
        let results = tree.nearest_query(target, k, 0.0).unwrap();

        let mut seen = std::collections::HashSet::new();
        for &(index, _) in &results {
            assert!(seen.insert(index.index()), "element {} was yielded more than once", index.index());
        }
        assert_eq!(results.len(), k);

        let mut expected: Vec<f64> = boxes.iter().map(|b| BoxKey(*b).distance_squared_to(target)).collect();
        expected.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let found: Vec<f64> = results.iter().map(|&(_, d)| d).collect();
        assert_eq!(found, expected);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn point_strategy() -> impl Strategy<Value = (f64, f64)> {
            (-50.0f64..50.0, -50.0f64..50.0)
        }

        fn box_strategy() -> impl Strategy<Value = ((f64, f64), (f64, f64))> {
            ((-50.0f64..40.0, -50.0f64..40.0), (0.1f64..10.0, 0.1f64..10.0))
        }

        fn build_point_tree(points: Vec<(f64, f64)>) -> Tree<PointKey<2>, (f64, f64), 2> {
            Tree::build(points, |p| PointKey(Vector([p.0, p.1])), BuildConfig { max_elements_per_node: 6 }).unwrap()
        }

        proptest! {
            #[test]
            fn range_query_is_sound_and_complete(
                points in prop::collection::vec(point_strategy(), 0..150),
                query_corner_a in point_strategy(),
                query_corner_b in point_strategy(),
            ) {
                let expected: Vec<(f64, f64)> = points
                    .iter()
                    .copied()
                    .filter(|&(x, y)| {
                        let query = AabbBox::new(Vector([query_corner_a.0, query_corner_a.1]), Vector([query_corner_b.0, query_corner_b.1]));
                        query.overlap_point(Vector([x, y]))
                    })
                    .collect();

                let tree = build_point_tree(points);
                let query = AabbBox::new(Vector([query_corner_a.0, query_corner_a.1]), Vector([query_corner_b.0, query_corner_b.1]));
                let mut found: Vec<(f64, f64)> = tree.range_query(query).unwrap().map(|index| *tree.get(index)).collect();
                let mut expected_sorted = expected;
                found.sort_by(|a, b| a.partial_cmp(b).unwrap());
                expected_sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
                prop_assert_eq!(found, expected_sorted);
            }

            #[test]
            fn nearest_query_matches_brute_force_for_any_k(
                points in prop::collection::vec(point_strategy(), 1..150),
                target in point_strategy(),
                k in 1usize..20,
            ) {
                let k = k.min(points.len());
                let tree = build_point_tree(points.clone());

                let mut brute_force: Vec<(f64, (f64, f64))> = points
                    .iter()
                    .map(|&(x, y)| {
                        let dx = x - target.0;
                        let dy = y - target.1;
                        (dx * dx + dy * dy, (x, y))
                    })
                    .collect();
                brute_force.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
                let expected: Vec<f64> = brute_force.iter().take(k).map(|&(d, _)| d).collect();

                let results = tree.nearest_query(Vector([target.0, target.1]), k, 0.0).unwrap();
                prop_assert_eq!(results.len(), k);
                let found: Vec<f64> = results.iter().map(|&(_, d)| d).collect();
                prop_assert_eq!(found, expected);
            }

            #[test]
            fn building_twice_from_the_same_input_yields_the_same_query_results(
                points in prop::collection::vec(point_strategy(), 0..150),
                target in point_strategy(),
            ) {
                let tree_a = build_point_tree(points.clone());
                let tree_b = build_point_tree(points);

                let query = AabbBox::new(Vector([target.0 - 10.0, target.1 - 10.0]), Vector([target.0 + 10.0, target.1 + 10.0]));
                let mut a: Vec<(f64, f64)> = tree_a.range_query(query).unwrap().map(|index| *tree_a.get(index)).collect();
                let mut b: Vec<(f64, f64)> = tree_b.range_query(query).unwrap().map(|index| *tree_b.get(index)).collect();
                a.sort_by(|x, y| x.partial_cmp(y).unwrap());
                b.sort_by(|x, y| x.partial_cmp(y).unwrap());
                prop_assert_eq!(a, b);

                let nearest_a = tree_a.nearest_query(Vector([target.0, target.1]), 5, 0.0).unwrap();
                let nearest_b = tree_b.nearest_query(Vector([target.0, target.1]), 5, 0.0).unwrap();
                let distances_a: Vec<f64> = nearest_a.iter().map(|&(_, d)| d).collect();
                let distances_b: Vec<f64> = nearest_b.iter().map(|&(_, d)| d).collect();
                prop_assert_eq!(distances_a, distances_b);
            }

            #[test]
            fn nearest_query_over_box_keys_matches_brute_force_for_any_k(
                boxes in prop::collection::vec(box_strategy(), 1..150),
                target in point_strategy(),
                k in 1usize..20,
            ) {
                let elements: Vec<AabbBox<2>> = boxes
                    .into_iter()
                    .map(|((x, y), (w, h))| AabbBox::new(Vector([x, y]), Vector([x + w, y + h])))
                    .collect();
                let k = k.min(elements.len());
                let target = Vector([target.0, target.1]);
                let tree: Tree<BoxKey<2>, AabbBox<2>, 2> =
                    Tree::build(elements.clone(), |b| BoxKey(*b), BuildConfig { max_elements_per_node: 6 }).unwrap();

                let mut expected: Vec<f64> = elements.iter().map(|b| BoxKey(*b).distance_squared_to(target)).collect();
                expected.sort_by(|a, b| a.partial_cmp(b).unwrap());
                let expected: Vec<f64> = expected.into_iter().take(k).collect();

                let results = tree.nearest_query(target, k, 0.0).unwrap();
                prop_assert_eq!(results.len(), k);

                let mut seen = std::collections::HashSet::new();
                for &(index, _) in &results {
                    prop_assert!(seen.insert(index.index()));
                }

                let found: Vec<f64> = results.iter().map(|&(_, d)| d).collect();
                prop_assert_eq!(found, expected);
            }
        }
    }
}
