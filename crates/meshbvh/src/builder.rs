//! Top-down hierarchy construction.
//!
//! The tree is built from an explicit work stack rather than native
//! recursion, so fully degenerate inputs (every centroid in one spot, which
//! forces median splits all the way down) cannot overflow the call stack.
//! Tasks are popped left-first, which reproduces the pre-order layout a
//! recursive builder would produce: every interior node is followed by its
//! entire left subtree, then its right subtree.

use crate::bounds::{compute_triangle_bounds, Aabb, Triangle};
use crate::config::SahConfig;
use crate::error::Result;
use crate::node::{triangle_order_from_nodes, BvhNode};
use crate::sah::split_slice;

/// Output of a build: the node array plus the triangle permutation it implies.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BvhBuild {
    /// Flat node array, root at index 0. Empty for empty input.
    pub nodes: Vec<BvhNode>,
    /// Original triangle indices in leaf (pre-order) order.
    pub triangle_order: Vec<u32>,
}

impl BvhBuild {
    /// Wrap an existing node array, deriving the triangle order from its leaves.
    pub fn from_nodes(nodes: Vec<BvhNode>) -> Self {
        let triangle_order = triangle_order_from_nodes(&nodes);
        Self {
            nodes,
            triangle_order,
        }
    }

    /// True if the build has no root.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of triangles referenced by the tree.
    pub fn triangle_count(&self) -> usize {
        self.triangle_order.len()
    }

    /// True if the leaves reference each of `0..triangle_count` exactly once.
    pub fn covers_triangles(&self, triangle_count: usize) -> bool {
        if self.triangle_order.len() != triangle_count {
            return false;
        }
        let mut seen = vec![false; triangle_count];
        for &tri in &self.triangle_order {
            match seen.get_mut(tri as usize) {
                Some(slot) if !*slot => *slot = true,
                _ => return false,
            }
        }
        true
    }

    /// Rewrite an index buffer so triangles appear in leaf order.
    ///
    /// `indices` must be the buffer the tree was built from.
    pub fn reorder_indices(&self, indices: &[u32]) -> Vec<u32> {
        let mut sorted = Vec::with_capacity(self.triangle_order.len() * 3);
        for &tri in &self.triangle_order {
            let base = tri as usize * 3;
            sorted.extend_from_slice(&indices[base..base + 3]);
        }
        sorted
    }
}

#[derive(Debug, Clone, Copy)]
enum Side {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy)]
struct Task {
    start: usize,
    end: usize,
    depth: usize,
    parent: Option<(usize, Side)>,
}

/// Build a BVH over an indexed triangle soup with the default settings.
///
/// # Errors
///
/// Returns an error if the buffers are malformed (see
/// [`compute_triangle_bounds`]).
pub fn build_bvh(positions: &[f32], indices: &[u32]) -> Result<BvhBuild> {
    build_bvh_with_config(positions, indices, &SahConfig::default())
}

/// Build a BVH over an indexed triangle soup.
///
/// Every leaf owns exactly one triangle and stores its original index in
/// `first_triangle`.
pub fn build_bvh_with_config(
    positions: &[f32],
    indices: &[u32],
    config: &SahConfig,
) -> Result<BvhBuild> {
    config.validate()?;
    let triangles = compute_triangle_bounds(positions, indices)?;
    Ok(build_from_triangles(&triangles, config))
}

/// Build a BVH from precomputed triangle data.
pub fn build_from_triangles(triangles: &[Triangle], config: &SahConfig) -> BvhBuild {
    let _span = tracing::debug_span!("bvh_build", triangles = triangles.len()).entered();

    let n = triangles.len();
    if n == 0 {
        return BvhBuild::default();
    }

    let mut tri_indices: Vec<u32> = (0..n as u32).collect();
    let mut nodes: Vec<BvhNode> = Vec::with_capacity(2 * n - 1);
    let mut stack = vec![Task {
        start: 0,
        end: n,
        depth: 0,
        parent: None,
    }];
    let mut max_depth = 0;

    while let Some(task) = stack.pop() {
        max_depth = max_depth.max(task.depth);

        let slice = &mut tri_indices[task.start..task.end];
        let mut bounds = Aabb::empty();
        let mut centroid_bounds = Aabb::empty();
        for &tri in slice.iter() {
            let t = &triangles[tri as usize];
            bounds.include_aabb(&t.bounds);
            centroid_bounds.include_point(&t.centroid);
        }

        let node_idx = nodes.len();
        if slice.len() == 1 {
            nodes.push(BvhNode::leaf(bounds, slice[0]));
        } else {
            let mid = task.start + split_slice(triangles, slice, &bounds, &centroid_bounds, config);
            nodes.push(BvhNode::interior(bounds));

            // Right first so the left subtree is laid out directly after its parent.
            stack.push(Task {
                start: mid,
                end: task.end,
                depth: task.depth + 1,
                parent: Some((node_idx, Side::Right)),
            });
            stack.push(Task {
                start: task.start,
                end: mid,
                depth: task.depth + 1,
                parent: Some((node_idx, Side::Left)),
            });
        }

        if let Some((parent, side)) = task.parent {
            match side {
                Side::Left => nodes[parent].left = node_idx as i32,
                Side::Right => nodes[parent].right = node_idx as i32,
            }
        }
    }

    tracing::debug!(
        triangles = n,
        nodes = nodes.len(),
        depth = max_depth,
        "built BVH"
    );

    BvhBuild {
        nodes,
        triangle_order: tri_indices,
    }
}
