//! Binned surface area heuristic split selection.
//!
//! Each axis with a usable centroid spread is divided into
//! [`SahConfig::bin_count`] equal-width bins. Triangles are bucketed by
//! centroid, the bins are swept in both directions to get the bounds and
//! counts of every candidate left/right pair, and the cheapest candidate
//! across all axes wins. When no candidate separates the slice, the caller
//! falls back to [`median_split`].

use crate::bounds::{Aabb, Triangle};
use crate::config::SahConfig;

/// A candidate partition plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitPlane {
    /// Axis index: 0 = x, 1 = y, 2 = z.
    pub axis: usize,
    /// World-space coordinate; centroids strictly below it go left.
    pub position: f32,
}

#[derive(Debug, Clone, Copy, Default)]
struct Bin {
    bounds: Aabb,
    count: usize,
}

fn bin_index(centroid: f32, axis_min: f32, extent: f32, bin_count: usize) -> usize {
    let b = ((centroid - axis_min) * bin_count as f32 / extent).floor();
    if b <= 0.0 {
        0
    } else {
        (b as usize).min(bin_count - 1)
    }
}

/// Find the cheapest binned SAH split plane for a slice of triangles.
///
/// `bounds` is the union of the slice's triangle bounds and `centroid_bounds`
/// the box around their centroids. Returns `None` when every axis is
/// degenerate or no bin boundary has triangles on both sides.
pub fn find_sah_split(
    triangles: &[Triangle],
    tri_indices: &[u32],
    bounds: &Aabb,
    centroid_bounds: &Aabb,
    config: &SahConfig,
) -> Option<SplitPlane> {
    let n = config.bin_count;
    let parent_area = bounds.surface_area();
    let extent = centroid_bounds.extent();

    let mut best_cost = f32::INFINITY;
    let mut best: Option<(usize, usize)> = None;

    for axis in 0..3 {
        let axis_extent = extent[axis];
        if axis_extent <= config.degenerate_extent {
            continue;
        }
        let axis_min = centroid_bounds.min[axis];

        let mut bins = vec![Bin::default(); n];
        for &tri in tri_indices {
            let t = &triangles[tri as usize];
            let b = bin_index(t.centroid[axis], axis_min, axis_extent, n);
            bins[b].count += 1;
            bins[b].bounds.include_aabb(&t.bounds);
        }

        // left[i] covers bins 0..=i, right[i] covers bins i..n
        let mut left = vec![Bin::default(); n];
        let mut acc = Bin::default();
        for i in 0..n {
            acc.count += bins[i].count;
            acc.bounds.include_aabb(&bins[i].bounds);
            left[i] = acc;
        }
        let mut right = vec![Bin::default(); n];
        let mut acc = Bin::default();
        for i in (0..n).rev() {
            acc.count += bins[i].count;
            acc.bounds.include_aabb(&bins[i].bounds);
            right[i] = acc;
        }

        for split in 0..n - 1 {
            let l = &left[split];
            let r = &right[split + 1];
            if l.count == 0 || r.count == 0 {
                continue;
            }

            let cost = if parent_area > 0.0 {
                config.intersection_cost
                    * (l.bounds.surface_area() * l.count as f32
                        + r.bounds.surface_area() * r.count as f32)
                    / parent_area
                    + config.traversal_cost
            } else {
                // Coplanar or otherwise flat parents: fall back to counts.
                (l.count + r.count) as f32
            };

            if cost < best_cost {
                best_cost = cost;
                best = Some((axis, split));
            }
        }
    }

    let (axis, split) = best?;
    let axis_extent = extent[axis];
    if axis_extent <= config.degenerate_extent {
        return None;
    }
    Some(SplitPlane {
        axis,
        position: centroid_bounds.min[axis] + axis_extent * (split + 1) as f32 / n as f32,
    })
}

/// Partition `tri_indices` in place so centroids below the plane come first.
///
/// Returns the number of triangles on the low side.
pub fn partition_by_plane(
    triangles: &[Triangle],
    tri_indices: &mut [u32],
    plane: SplitPlane,
) -> usize {
    let mut left = 0;
    let mut right = tri_indices.len();

    while left < right {
        let c = triangles[tri_indices[left] as usize].centroid[plane.axis];
        if c < plane.position {
            left += 1;
        } else {
            right -= 1;
            tri_indices.swap(left, right);
        }
    }

    left
}

/// Split a slice in half along the axis with the widest centroid spread.
///
/// Uses linear-time selection, so the halves are only partially ordered.
/// Returns `len / 2`, which is interior for any slice of 2 or more.
pub fn median_split(
    triangles: &[Triangle],
    tri_indices: &mut [u32],
    centroid_bounds: &Aabb,
) -> usize {
    let extent = centroid_bounds.extent();
    let mut axis = 0;
    for a in 1..3 {
        if extent[a] > extent[axis] {
            axis = a;
        }
    }

    let mid = tri_indices.len() / 2;
    if mid > 0 {
        tri_indices.select_nth_unstable_by(mid, |&a, &b| {
            let ca = triangles[a as usize].centroid[axis];
            let cb = triangles[b as usize].centroid[axis];
            ca.total_cmp(&cb)
        });
    }
    mid
}

/// Partition a slice of two or more triangles and return the split point.
///
/// Tries the SAH plane first; if it would leave either side empty, falls
/// back to [`median_split`]. The result is always in `1..tri_indices.len()`.
pub fn split_slice(
    triangles: &[Triangle],
    tri_indices: &mut [u32],
    bounds: &Aabb,
    centroid_bounds: &Aabb,
    config: &SahConfig,
) -> usize {
    debug_assert!(tri_indices.len() > 1, "cannot split fewer than 2 triangles");

    if let Some(plane) = find_sah_split(triangles, tri_indices, bounds, centroid_bounds, config) {
        let mid = partition_by_plane(triangles, tri_indices, plane);
        if mid > 0 && mid < tri_indices.len() {
            return mid;
        }
    }
    median_split(triangles, tri_indices, centroid_bounds)
}
