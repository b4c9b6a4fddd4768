//! The arena-backed tree: construction and the node shape it is built from.

use spatial_container::{create_simple_key, SimpleKey};
#[cfg(feature = "debug")]
use spatial_debug::print_debug;

use crate::config::BuildConfig;
use crate::error::TreeError;
use crate::geometry::AabbBox;
use crate::key::SpatialKey;

create_simple_key!(NodeIndex, "Index of a node in the tree's arena.");
create_simple_key!(ElementIndex, "Index of an element in the tree's permuted element buffer.");

/// One node of the arena. Children are always appended after their parent,
/// so indices only ever grow going down the tree; the root is always 0.
///
/// A node either holds elements directly (`elements.is_some()`) or has split
/// (`split_axis.is_some()`), or both at once: a box-keyed node with a small
/// straddling middle bucket keeps those elements on itself rather than
/// promoting them to a dedicated child, so the clean two-variant
/// node/leaf enum the partition-free version of this tree could use doesn't
/// fit here.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Node<const D: usize> {
    pub parent: Option<NodeIndex>,
    pub low_child: Option<NodeIndex>,
    pub middle_child: Option<NodeIndex>,
    pub high_child: Option<NodeIndex>,
    pub elements: Option<(ElementIndex, ElementIndex)>,
    pub bounds: AabbBox<D>,
    pub split_axis: Option<usize>,
    pub split_position: f64,
    pub locked_axes_mask: u32,
}

/// A static spatial index over `D`-dimensional keys of type `K`, each
/// associated with a payload of type `T`.
///
/// Built once from a `Vec<T>` and a key-extraction function; neither
/// insertion nor removal is supported afterwards. Elements are permuted into
/// tree order during construction and referred to everywhere else only by
/// their [`ElementIndex`] into that order, via [`Tree::get`].
pub struct Tree<K, T, const D: usize> {
    pub(crate) nodes: Vec<Node<D>>,
    pub(crate) keys: Vec<K>,
    elements: Vec<T>,
    root_bounds: AabbBox<D>,
    config: BuildConfig,
}

impl<K, T, const D: usize> Tree<K, T, D>
where
    K: SpatialKey<D>,
{
    /// Builds a tree over `elements`, projecting each one to a key with
    /// `key_of`.
    ///
    /// `elements` is permuted in place into tree order; the resulting
    /// [`ElementIndex`] values index into that permuted order, not the
    /// caller's original order.
    pub fn build(mut elements: Vec<T>, key_of: impl Fn(&T) -> K, config: BuildConfig) -> Result<Self, TreeError> {
        if config.max_elements_per_node == 0 {
            return Err(TreeError::InvalidArgument);
        }

        let mut keys: Vec<K> = elements.iter().map(&key_of).collect();
        let count = elements.len();

        if count == 0 {
            return Ok(Self {
                nodes: Vec::new(),
                keys,
                elements,
                root_bounds: AabbBox::empty(),
                config,
            });
        }

        let root_bounds = keys.iter().fold(AabbBox::empty(), |acc, key| acc.merge(&key.bounding_box()));

        let estimated_nodes = (count / config.max_elements_per_node.max(1)).max(1) * 2 + 1;
        let mut nodes: Vec<Node<D>> = Vec::new();
        nodes.try_reserve(estimated_nodes).map_err(|_| TreeError::AllocationFailed)?;
        nodes.push(Node {
            parent: None,
            low_child: None,
            middle_child: None,
            high_child: None,
            elements: Some((ElementIndex::new(0), ElementIndex::new(count as u32))),
            bounds: root_bounds,
            split_axis: None,
            split_position: 0.0,
            locked_axes_mask: 0,
        });

        #[cfg(feature = "debug")]
        let start = std::time::Instant::now();
        #[cfg(feature = "debug")]
        let _scope = spatial_debug::DebugScope::enter();

        let mut worklist = vec![NodeIndex::new(0)];
        while let Some(node_index) = worklist.pop() {
            Self::process_node(node_index, &mut nodes, &mut elements, &mut keys, &config, &mut worklist);
        }

        #[cfg(feature = "debug")]
        print_debug!(
            "built tree: {} elements, {} nodes in {}",
            count,
            nodes.len(),
            spatial_debug::format_elapsed(start.elapsed())
        );

        Ok(Self { nodes, keys, elements, root_bounds, config })
    }

    /// The number of elements held in the tree.
    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    /// The number of nodes in the arena.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree holds no elements.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// A read-only view of every element, in tree (permuted) order.
    pub fn elements(&self) -> &[T] {
        &self.elements
    }

    /// The build configuration the tree was constructed with.
    pub fn config(&self) -> BuildConfig {
        self.config
    }

    /// The bounding box of every key in the tree, or the empty box if the
    /// tree holds no elements.
    pub fn root_bounds(&self) -> AabbBox<D> {
        self.root_bounds
    }

    /// Looks up the payload at a given element index.
    pub fn get(&self, index: ElementIndex) -> &T {
        &self.elements[index.index()]
    }

    /// Looks up the key at a given element index.
    pub fn key_at(&self, index: ElementIndex) -> &K {
        &self.keys[index.index()]
    }

    fn process_node(
        node_index: NodeIndex,
        nodes: &mut Vec<Node<D>>,
        elements: &mut [T],
        keys: &mut [K],
        config: &BuildConfig,
        worklist: &mut Vec<NodeIndex>,
    ) {
        let node = nodes[node_index.index()];
        let (begin, end) = match node.elements {
            Some((b, e)) => (b.index(), e.index()),
            None => return,
        };
        let count = end - begin;
        if count <= config.max_elements_per_node {
            return;
        }

        let extent = node.bounds.max - node.bounds.min;
        let mut axis = None;
        let mut best_extent = 0.0;
        for candidate in 0..D {
            if node.locked_axes_mask & (1 << candidate) != 0 {
                continue;
            }
            let candidate_extent = extent.get(candidate);
            if candidate_extent > best_extent {
                best_extent = candidate_extent;
                axis = Some(candidate);
            }
        }
        let axis = match axis {
            Some(axis) => axis,
            None => return,
        };
        let split_position = node.bounds.min.get(axis) + best_extent * 0.5;

        let (low_count, middle_count, high_count) = if K::IS_BOX {
            partition_three_way(&mut elements[begin..end], &mut keys[begin..end], axis, split_position)
        } else {
            let low_count = partition_two_way(&mut elements[begin..end], &mut keys[begin..end], axis, split_position);
            (low_count, 0, count - low_count)
        };

        if K::IS_BOX && low_count + high_count < (count + 3) / 4 {
            return;
        }

        let low_range = (begin, begin + low_count);
        let middle_range = (low_range.1, low_range.1 + middle_count);
        let high_range = (middle_range.1, end);

        let mut low_child = None;
        let mut middle_child = None;
        let mut high_child = None;
        let mut own_elements = None;

        if low_range.1 > low_range.0 {
            let tight_max = keys[low_range.0..low_range.1]
                .iter()
                .map(|key| key.high_bound(axis))
                .fold(f64::NEG_INFINITY, f64::max);
            let bounds = AabbBox { min: node.bounds.min, max: node.bounds.max.with(axis, tight_max) };
            low_child = Some(push_child(nodes, node_index, low_range, bounds, node.locked_axes_mask));
            worklist.push(low_child.unwrap());
        }

        if high_range.1 > high_range.0 {
            let tight_min = keys[high_range.0..high_range.1]
                .iter()
                .map(|key| key.low_bound(axis))
                .fold(f64::INFINITY, f64::min);
            let bounds = AabbBox { min: node.bounds.min.with(axis, tight_min), max: node.bounds.max };
            high_child = Some(push_child(nodes, node_index, high_range, bounds, node.locked_axes_mask));
            worklist.push(high_child.unwrap());
        }

        if middle_range.1 > middle_range.0 {
            if middle_count <= config.max_elements_per_node {
                own_elements = Some((ElementIndex::new(middle_range.0 as u32), ElementIndex::new(middle_range.1 as u32)));
            } else {
                let tight_min = keys[middle_range.0..middle_range.1]
                    .iter()
                    .map(|key| key.low_bound(axis))
                    .fold(f64::INFINITY, f64::min);
                let tight_max = keys[middle_range.0..middle_range.1]
                    .iter()
                    .map(|key| key.high_bound(axis))
                    .fold(f64::NEG_INFINITY, f64::max);
                let bounds = AabbBox {
                    min: node.bounds.min.with(axis, tight_min),
                    max: node.bounds.max.with(axis, tight_max),
                };
                let locked = node.locked_axes_mask | (1 << axis);
                middle_child = Some(push_child(nodes, node_index, middle_range, bounds, locked));
                worklist.push(middle_child.unwrap());
            }
        }

        let slot = &mut nodes[node_index.index()];
        slot.split_axis = Some(axis);
        slot.split_position = split_position;
        slot.low_child = low_child;
        slot.middle_child = middle_child;
        slot.high_child = high_child;
        slot.elements = own_elements;

        #[cfg(feature = "debug")]
        print_debug!(
            "node {}: split axis {} at {}, {} low / {} middle / {} high",
            node_index.index(),
            axis,
            split_position,
            low_count,
            middle_count,
            high_count
        );
    }
}

fn push_child<const D: usize>(
    nodes: &mut Vec<Node<D>>,
    parent: NodeIndex,
    range: (usize, usize),
    bounds: AabbBox<D>,
    locked_axes_mask: u32,
) -> NodeIndex {
    let index = NodeIndex::new(nodes.len() as u32);
    nodes.push(Node {
        parent: Some(parent),
        low_child: None,
        middle_child: None,
        high_child: None,
        elements: Some((ElementIndex::new(range.0 as u32), ElementIndex::new(range.1 as u32))),
        bounds,
        split_axis: None,
        split_position: 0.0,
        locked_axes_mask,
    });
    index
}

/// Lomuto-style in-place partition: elements whose key lies strictly below
/// `split` on `axis` move to the front. Returns the count that did.
fn partition_two_way<K: SpatialKey<D>, T, const D: usize>(elements: &mut [T], keys: &mut [K], axis: usize, split: f64) -> usize {
    let mut low_end = 0;
    for i in 0..elements.len() {
        if keys[i].low_bound(axis) < split {
            elements.swap(i, low_end);
            keys.swap(i, low_end);
            low_end += 1;
        }
    }
    low_end
}

/// Three-way (Dutch national flag) in-place partition for box keys: a key is
/// Low if its box doesn't reach `split`, High if it starts at or past
/// `split`, Middle if it straddles. Returns `(low_count, middle_count,
/// high_count)`; the buffer ends up arranged as `[Low | Middle | High]`.
fn partition_three_way<K: SpatialKey<D>, T, const D: usize>(elements: &mut [T], keys: &mut [K], axis: usize, split: f64) -> (usize, usize, usize) {
    let len = elements.len();
    let mut low_end = 0;
    let mut high_begin = len;
    let mut current = 0;

    while current < high_begin {
        let key = keys[current];
        if key.high_bound(axis) < split {
            elements.swap(current, low_end);
            keys.swap(current, low_end);
            low_end += 1;
            current += 1;
        } else if key.low_bound(axis) >= split {
            high_begin -= 1;
            elements.swap(current, high_begin);
            keys.swap(current, high_begin);
        } else {
            current += 1;
        }
    }

    (low_end, high_begin - low_end, len - high_begin)
}

impl<K, T, const D: usize> Tree<K, T, D> {
    /// The first child to descend into from `node` whose box overlaps
    /// `query`, in low/middle/high order.
    pub(crate) fn first_child_overlap(&self, node_index: NodeIndex, query: &AabbBox<D>) -> Option<NodeIndex> {
        let node = &self.nodes[node_index.index()];
        [node.low_child, node.middle_child, node.high_child]
            .into_iter()
            .flatten()
            .find(|&child| self.nodes[child.index()].bounds.overlap_box(query))
    }

    /// The next sibling of `current` (under its parent, in low/middle/high
    /// order) whose box overlaps `query`.
    pub(crate) fn next_sibling_overlap(&self, current: NodeIndex, query: &AabbBox<D>) -> Option<NodeIndex> {
        let parent_index = self.nodes[current.index()].parent?;
        let parent = &self.nodes[parent_index.index()];
        let siblings = [parent.low_child, parent.middle_child, parent.high_child];
        let position = siblings.iter().position(|&sibling| sibling == Some(current))?;
        siblings[position + 1..]
            .iter()
            .flatten()
            .find(|&&child| self.nodes[child.index()].bounds.overlap_box(query))
            .copied()
    }

    pub(crate) fn node(&self, index: NodeIndex) -> &Node<D> {
        &self.nodes[index.index()]
    }

    pub(crate) fn root_index(&self) -> Option<NodeIndex> {
        if self.nodes.is_empty() {
            None
        } else {
            Some(NodeIndex::new(0))
        }
    }
}
