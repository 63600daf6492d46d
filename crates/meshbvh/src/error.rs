//! Error types for BVH construction.

use thiserror::Error;

/// Errors that can occur while building or validating a BVH.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BvhError {
    /// Index buffer length is not a multiple of 3.
    #[error("index count {0} is not a multiple of 3")]
    IndexCountNotTriangles(usize),

    /// Position buffer length is not a multiple of 3.
    #[error("position count {0} is not a multiple of 3")]
    PositionCountNotVertices(usize),

    /// A triangle references a vertex that does not exist.
    #[error("triangle {triangle} references vertex {index} of {vertex_count}")]
    IndexOutOfRange {
        /// Triangle containing the bad index.
        triangle: usize,
        /// The offending vertex index.
        index: u32,
        /// Number of vertices in the position buffer.
        vertex_count: usize,
    },

    /// A referenced vertex has a NaN or infinite coordinate.
    #[error("vertex {vertex} has a non-finite coordinate")]
    NonFiniteVertex {
        /// Index of the vertex.
        vertex: usize,
    },

    /// Triangle count exceeds what the `i32` node indices can address.
    #[error("too many triangles: {0} (max {max})", max = crate::node::MAX_TRIANGLES)]
    TooManyTriangles(usize),

    /// Invalid builder settings.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// A node array violates the tree invariants.
    #[error("invalid tree: {0}")]
    InvalidTree(String),
}

/// Result type for BVH operations.
pub type Result<T> = std::result::Result<T, BvhError>;
