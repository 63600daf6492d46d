//! Tree quality statistics.

use serde::Serialize;

use crate::config::SahConfig;
use crate::node::BvhNode;

/// Summary of a built tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BvhStats {
    /// Total number of nodes.
    pub node_count: usize,
    /// Number of leaf nodes.
    pub leaf_count: usize,
    /// Number of interior nodes.
    pub interior_count: usize,
    /// Number of triangles referenced by leaves.
    pub triangle_count: usize,
    /// Length of the longest root-to-leaf path, in edges.
    pub max_depth: usize,
    /// Expected ray cost under the SAH, relative to the root's surface area.
    pub sah_cost: f32,
}

impl BvhStats {
    /// Compute statistics for a validated node array.
    pub fn compute(nodes: &[BvhNode], config: &SahConfig) -> Self {
        let mut stats = Self {
            node_count: nodes.len(),
            ..Self::default()
        };
        let Some(root) = nodes.first() else {
            return stats;
        };
        let root_area = root.aabb().surface_area();

        let mut stack = vec![(0usize, 0usize)];
        while let Some((i, depth)) = stack.pop() {
            let node = &nodes[i];
            stats.max_depth = stats.max_depth.max(depth);

            let area_ratio = if root_area > 0.0 {
                node.aabb().surface_area() / root_area
            } else {
                1.0
            };

            match node.children() {
                Some((l, r)) => {
                    stats.interior_count += 1;
                    stats.sah_cost += config.traversal_cost * area_ratio;
                    stack.push((r, depth + 1));
                    stack.push((l, depth + 1));
                }
                None => {
                    stats.leaf_count += 1;
                    stats.triangle_count += node.triangle_count.max(0) as usize;
                    stats.sah_cost +=
                        config.intersection_cost * node.triangle_count as f32 * area_ratio;
                }
            }
        }

        stats
    }
}
