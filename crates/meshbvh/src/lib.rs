#![warn(missing_docs)]

//! Binned-SAH bounding volume hierarchies for triangle meshes.
//!
//! This crate builds a flat, pre-order BVH over an indexed triangle mesh and
//! persists it to disk so later runs can skip the build while the source
//! asset is unchanged.
//!
//! # Architecture
//!
//! - [`bounds`] - AABBs and per-triangle bounds/centroids
//! - [`sah`] - Binned surface area heuristic split search and partitioning
//! - [`builder`] - Top-down tree construction into a flat node array
//! - [`node`] - Node layout, GPU upload format and structural validation
//! - [`stats`] - Tree quality statistics
//! - [`cache`] - Versioned on-disk cache keyed on source identity
//!
//! # Example
//!
//! ```
//! use meshbvh::build_bvh;
//!
//! let positions = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
//! let build = build_bvh(&positions, &[0, 1, 2]).unwrap();
//!
//! assert_eq!(build.nodes.len(), 1);
//! assert!(build.nodes[0].is_leaf());
//! ```

pub mod bounds;
pub mod builder;
pub mod cache;
pub mod config;
mod error;
pub mod node;
pub mod sah;
pub mod stats;

pub use bounds::{compute_triangle_bounds, Aabb, Triangle, Vec3};
pub use builder::{build_bvh, build_bvh_with_config, build_from_triangles, BvhBuild};
pub use cache::{
    load, load_or_build, save, try_load, try_save, BvhCacheMetadata, CacheError, Staleness,
};
pub use config::SahConfig;
pub use error::{BvhError, Result};
pub use node::{
    gpu_nodes, triangle_order_from_nodes, validate_nodes, BvhNode, GpuBvhNode, MAX_TRIANGLES,
    NO_INDEX,
};
pub use stats::BvhStats;
