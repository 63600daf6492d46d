//! Flat BVH node representation, GPU layout, and structural validation.

use bytemuck::{Pod, Zeroable};

use crate::bounds::{Aabb, Vec3};
use crate::error::{BvhError, Result};

/// Child/triangle sentinel meaning "none".
pub const NO_INDEX: i32 = -1;

/// Largest triangle count whose full tree (`2n - 1` nodes) still fits in `i32`.
pub const MAX_TRIANGLES: usize = 1 << 30;

/// A node of the flattened hierarchy.
///
/// Nodes refer to each other by index into the same array; index 0 is the
/// root. A node is either a leaf (`triangle_count >= 1`, no children) or
/// interior (`triangle_count == 0`, two children, `first_triangle == -1`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BvhNode {
    /// Minimum corner of the node bounds.
    pub min: Vec3,
    /// Maximum corner of the node bounds.
    pub max: Vec3,
    /// Left child index, or [`NO_INDEX`].
    pub left: i32,
    /// Right child index, or [`NO_INDEX`].
    pub right: i32,
    /// First triangle owned by a leaf, or [`NO_INDEX`].
    pub first_triangle: i32,
    /// Number of triangles owned by a leaf, 0 for interior nodes.
    pub triangle_count: i32,
}

impl BvhNode {
    /// A leaf owning a single triangle.
    pub fn leaf(bounds: Aabb, triangle: u32) -> Self {
        Self {
            min: bounds.min,
            max: bounds.max,
            left: NO_INDEX,
            right: NO_INDEX,
            first_triangle: triangle as i32,
            triangle_count: 1,
        }
    }

    /// An interior node whose children are filled in later.
    pub fn interior(bounds: Aabb) -> Self {
        Self {
            min: bounds.min,
            max: bounds.max,
            left: NO_INDEX,
            right: NO_INDEX,
            first_triangle: NO_INDEX,
            triangle_count: 0,
        }
    }

    /// True if this node owns triangles.
    pub fn is_leaf(&self) -> bool {
        self.triangle_count > 0
    }

    /// Bounds of this node.
    pub fn aabb(&self) -> Aabb {
        Aabb::new(self.min, self.max)
    }

    /// Child indices of an interior node.
    pub fn children(&self) -> Option<(usize, usize)> {
        if self.is_leaf() || self.left < 0 || self.right < 0 {
            return None;
        }
        Some((self.left as usize, self.right as usize))
    }

    /// Range of triangles owned by a leaf.
    pub fn triangles(&self) -> std::ops::Range<u32> {
        if !self.is_leaf() || self.first_triangle < 0 {
            return 0..0;
        }
        let first = self.first_triangle as u32;
        first..first.saturating_add(self.triangle_count as u32)
    }
}

/// GPU-compatible BVH node.
///
/// Each `vec3` is padded to 16 bytes to satisfy storage-buffer alignment.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct GpuBvhNode {
    /// AABB min.
    pub aabb_min: [f32; 3],
    /// Padding.
    pub _pad0: f32,
    /// AABB max.
    pub aabb_max: [f32; 3],
    /// Padding.
    pub _pad1: f32,
    /// Left child index, -1 for leaves.
    pub left: i32,
    /// Right child index, -1 for leaves.
    pub right: i32,
    /// First triangle for leaves, -1 for interior nodes.
    pub first_triangle: i32,
    /// Triangle count for leaves, 0 for interior nodes.
    pub triangle_count: i32,
}

impl From<&BvhNode> for GpuBvhNode {
    fn from(node: &BvhNode) -> Self {
        Self {
            aabb_min: [node.min.x, node.min.y, node.min.z],
            _pad0: 0.0,
            aabb_max: [node.max.x, node.max.y, node.max.z],
            _pad1: 0.0,
            left: node.left,
            right: node.right,
            first_triangle: node.first_triangle,
            triangle_count: node.triangle_count,
        }
    }
}

/// Convert a node array to its GPU layout.
///
/// `bytemuck::cast_slice(&gpu_nodes(..))` gives the bytes to upload.
pub fn gpu_nodes(nodes: &[BvhNode]) -> Vec<GpuBvhNode> {
    nodes.iter().map(GpuBvhNode::from).collect()
}

/// Original triangle indices in leaf order.
///
/// Nodes are laid out in pre-order, so leaves appear in the array in the
/// same order a depth-first traversal visits them.
pub fn triangle_order_from_nodes(nodes: &[BvhNode]) -> Vec<u32> {
    nodes.iter().flat_map(BvhNode::triangles).collect()
}

/// Check that a node array forms a single well-formed tree rooted at 0.
///
/// Every node must satisfy the leaf/interior invariant, child indices must
/// be in range, every node must be reachable from the root exactly once,
/// and no triangle may be owned by two leaves. An interior node may name
/// the same child on both sides; that child still counts as reached once.
pub fn validate_nodes(nodes: &[BvhNode]) -> Result<()> {
    if nodes.is_empty() {
        return Ok(());
    }
    let len = nodes.len();
    let in_range = |i: i32| i >= 0 && (i as usize) < len;

    let mut ranges = Vec::new();
    for (i, node) in nodes.iter().enumerate() {
        if node.triangle_count > 0 {
            if node.left != NO_INDEX || node.right != NO_INDEX {
                return Err(BvhError::InvalidTree(format!("leaf {i} has children")));
            }
            if node.first_triangle < 0 {
                return Err(BvhError::InvalidTree(format!("leaf {i} has no first triangle")));
            }
            let start = node.first_triangle as u64;
            ranges.push((start, start + node.triangle_count as u64));
        } else if node.triangle_count == 0 {
            if node.first_triangle != NO_INDEX {
                return Err(BvhError::InvalidTree(format!("interior node {i} owns triangles")));
            }
            if !in_range(node.left) || !in_range(node.right) {
                return Err(BvhError::InvalidTree(format!(
                    "interior node {i} has child out of range ({}, {})",
                    node.left, node.right
                )));
            }
        } else {
            return Err(BvhError::InvalidTree(format!(
                "node {i} has negative triangle count {}",
                node.triangle_count
            )));
        }
    }

    let mut visited = vec![false; len];
    let mut stack = vec![0usize];
    let mut reached = 0;
    while let Some(i) = stack.pop() {
        if visited[i] {
            return Err(BvhError::InvalidTree(format!("node {i} is reachable twice")));
        }
        visited[i] = true;
        reached += 1;
        if let Some((l, r)) = nodes[i].children() {
            stack.push(r);
            if l != r {
                stack.push(l);
            }
        }
    }
    if reached != len {
        return Err(BvhError::InvalidTree(format!(
            "{} of {len} nodes are unreachable from the root",
            len - reached
        )));
    }

    ranges.sort_unstable();
    for pair in ranges.windows(2) {
        if pair[1].0 < pair[0].1 {
            return Err(BvhError::InvalidTree(format!(
                "triangle {} is owned by more than one leaf",
                pair[1].0
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{align_of, size_of};

    fn unit_box() -> Aabb {
        Aabb::new(Vec3::zeros(), Vec3::new(1.0, 1.0, 1.0))
    }

    fn three_node_tree() -> Vec<BvhNode> {
        let mut root = BvhNode::interior(unit_box());
        root.left = 1;
        root.right = 2;
        vec![root, BvhNode::leaf(unit_box(), 1), BvhNode::leaf(unit_box(), 0)]
    }

    #[test]
    fn test_gpu_layout() {
        assert_eq!(size_of::<GpuBvhNode>(), 48);
        assert_eq!(align_of::<GpuBvhNode>(), 4);
        assert_eq!(std::mem::offset_of!(GpuBvhNode, aabb_max), 16);
        assert_eq!(std::mem::offset_of!(GpuBvhNode, left), 32);
        assert_eq!(std::mem::offset_of!(GpuBvhNode, triangle_count), 44);
    }

    #[test]
    fn test_gpu_conversion() {
        let gpu = gpu_nodes(&three_node_tree());
        assert_eq!(gpu.len(), 3);
        assert_eq!(gpu[0].left, 1);
        assert_eq!(gpu[0].first_triangle, -1);
        assert_eq!(gpu[1].aabb_max, [1.0, 1.0, 1.0]);
        assert_eq!(gpu[1]._pad0, 0.0);
        assert_eq!(bytemuck::cast_slice::<GpuBvhNode, u8>(&gpu).len(), 144);
    }

    #[test]
    fn test_leaf_and_interior_constructors() {
        let leaf = BvhNode::leaf(unit_box(), 7);
        assert!(leaf.is_leaf());
        assert_eq!(leaf.triangles(), 7..8);
        assert_eq!(leaf.children(), None);

        let interior = BvhNode::interior(unit_box());
        assert!(!interior.is_leaf());
        assert_eq!(interior.triangles(), 0..0);
    }

    #[test]
    fn test_triangle_order_from_nodes() {
        assert_eq!(triangle_order_from_nodes(&three_node_tree()), vec![1, 0]);
        assert!(triangle_order_from_nodes(&[]).is_empty());
    }

    #[test]
    fn test_validate_accepts_tree() {
        assert!(validate_nodes(&three_node_tree()).is_ok());
        assert!(validate_nodes(&[]).is_ok());
        assert!(validate_nodes(&[BvhNode::leaf(unit_box(), 0)]).is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_child() {
        let mut nodes = three_node_tree();
        nodes[0].right = 3;
        assert!(matches!(validate_nodes(&nodes), Err(BvhError::InvalidTree(_))));
    }

    #[test]
    fn test_validate_accepts_same_child_on_both_sides() {
        let mut root = BvhNode::interior(unit_box());
        root.left = 1;
        root.right = 1;
        assert!(validate_nodes(&[root, BvhNode::leaf(unit_box(), 0)]).is_ok());
    }

    #[test]
    fn test_validate_rejects_unreachable_node() {
        let mut nodes = three_node_tree();
        nodes[0].right = 1;
        assert!(validate_nodes(&nodes).is_err());
    }

    #[test]
    fn test_validate_rejects_node_with_two_parents() {
        // Root -> (1, 2), node 1 -> (3, 3), node 2 -> (3, 4): node 3 has two parents.
        let mut root = BvhNode::interior(unit_box());
        root.left = 1;
        root.right = 2;
        let mut a = BvhNode::interior(unit_box());
        a.left = 3;
        a.right = 3;
        let mut b = BvhNode::interior(unit_box());
        b.left = 3;
        b.right = 4;
        let nodes = [root, a, b, BvhNode::leaf(unit_box(), 0), BvhNode::leaf(unit_box(), 1)];
        assert!(validate_nodes(&nodes).is_err());
    }

    #[test]
    fn test_validate_rejects_cycle() {
        let mut nodes = three_node_tree();
        nodes[0].left = 0;
        assert!(validate_nodes(&nodes).is_err());
    }

    #[test]
    fn test_validate_rejects_duplicate_triangle() {
        let mut nodes = three_node_tree();
        nodes[2].first_triangle = 1;
        assert!(validate_nodes(&nodes).is_err());
    }

    #[test]
    fn test_validate_rejects_leaf_with_children() {
        let mut nodes = three_node_tree();
        nodes[1].left = 2;
        assert!(validate_nodes(&nodes).is_err());
    }
}
