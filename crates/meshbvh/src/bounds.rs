//! Axis-aligned bounding boxes and per-triangle build data.

use nalgebra::Vector3;

use crate::error::{BvhError, Result};
use crate::node::MAX_TRIANGLES;

/// A vector in 3D space, single precision to match the GPU node layout.
pub type Vec3 = Vector3<f32>;

/// Axis-aligned bounding box in 3D.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Minimum corner.
    pub min: Vec3,
    /// Maximum corner.
    pub max: Vec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}

impl Aabb {
    /// Create an AABB from min and max corners.
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create an empty (inverted) AABB suitable for expansion.
    pub fn empty() -> Self {
        Self {
            min: Vec3::repeat(f32::INFINITY),
            max: Vec3::repeat(f32::NEG_INFINITY),
        }
    }

    /// Expand this AABB to include a point.
    pub fn include_point(&mut self, p: &Vec3) {
        self.min = self.min.inf(p);
        self.max = self.max.sup(p);
    }

    /// Expand this AABB to include another box. Merging an empty box is a no-op.
    pub fn include_aabb(&mut self, other: &Aabb) {
        self.min = self.min.inf(&other.min);
        self.max = self.max.sup(&other.max);
    }

    /// True if `max < min` on any axis.
    pub fn is_empty(&self) -> bool {
        self.max.x < self.min.x || self.max.y < self.min.y || self.max.z < self.min.z
    }

    /// Size along each axis.
    pub fn extent(&self) -> Vec3 {
        self.max - self.min
    }

    /// Test if `other` lies entirely inside this box (touching counts).
    pub fn contains(&self, other: &Aabb) -> bool {
        self.min.x <= other.min.x
            && self.min.y <= other.min.y
            && self.min.z <= other.min.z
            && self.max.x >= other.max.x
            && self.max.y >= other.max.y
            && self.max.z >= other.max.z
    }

    /// Surface area of the box.
    ///
    /// Empty boxes report `0`, which the SAH treats as "no meaningful cost".
    pub fn surface_area(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        let e = self.extent();
        2.0 * (e.x * e.y + e.x * e.z + e.y * e.z)
    }
}

/// Build-time data for a single input triangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    /// Bounds of the three vertices.
    pub bounds: Aabb,
    /// Mean of the three vertices.
    pub centroid: Vec3,
}

/// Compute bounds and centroids for every triangle of an indexed soup.
///
/// `positions` holds packed `x, y, z` triples and every 3 consecutive
/// entries of `indices` form one triangle.
///
/// # Errors
///
/// Returns an error if either buffer length is not a multiple of 3, an
/// index is out of range, or a referenced vertex is not finite.
pub fn compute_triangle_bounds(positions: &[f32], indices: &[u32]) -> Result<Vec<Triangle>> {
    if indices.len() % 3 != 0 {
        return Err(BvhError::IndexCountNotTriangles(indices.len()));
    }
    if positions.len() % 3 != 0 {
        return Err(BvhError::PositionCountNotVertices(positions.len()));
    }
    let vertex_count = positions.len() / 3;
    let tri_count = indices.len() / 3;
    if tri_count > MAX_TRIANGLES {
        return Err(BvhError::TooManyTriangles(tri_count));
    }

    let vertex = |triangle: usize, index: u32| -> Result<Vec3> {
        let v = index as usize;
        if v >= vertex_count {
            return Err(BvhError::IndexOutOfRange {
                triangle,
                index,
                vertex_count,
            });
        }
        let p = Vec3::new(positions[v * 3], positions[v * 3 + 1], positions[v * 3 + 2]);
        if !(p.x.is_finite() && p.y.is_finite() && p.z.is_finite()) {
            return Err(BvhError::NonFiniteVertex { vertex: v });
        }
        Ok(p)
    };

    let mut triangles = Vec::with_capacity(tri_count);
    for (i, tri) in indices.chunks_exact(3).enumerate() {
        let v0 = vertex(i, tri[0])?;
        let v1 = vertex(i, tri[1])?;
        let v2 = vertex(i, tri[2])?;

        let mut bounds = Aabb::empty();
        bounds.include_point(&v0);
        bounds.include_point(&v1);
        bounds.include_point(&v2);

        // Scale before summing so coordinates near f32::MAX stay finite.
        triangles.push(Triangle {
            bounds,
            centroid: v0 / 3.0 + v1 / 3.0 + v2 / 3.0,
        });
    }

    Ok(triangles)
}
