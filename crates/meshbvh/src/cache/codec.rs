//! Binary cache file encoding.
//!
//! Layout, all scalars in host byte order (caches are per-machine artifacts):
//!
//! | field             | encoding                         |
//! |-------------------|----------------------------------|
//! | `cache_version`   | `u32`                            |
//! | `source_relative` | `u32` byte length + UTF-8        |
//! | `cache_relative`  | `u32` byte length + UTF-8        |
//! | `source_size`     | `u64`                            |
//! | `source_mtime_ns` | `u64`                            |
//! | node count        | `u64`                            |
//! | nodes             | [`CacheNodeRecord`] × count      |

use std::mem::size_of;

use bytemuck::{Pod, Zeroable};

use super::validate::{check_version, CACHE_VERSION};
use super::{BvhCacheMetadata, CacheError};
use crate::bounds::Vec3;
use crate::node::BvhNode;

/// On-disk image of one node: six `f32` bounds then four `i32` fields.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct CacheNodeRecord {
    /// AABB min.
    pub min: [f32; 3],
    /// AABB max.
    pub max: [f32; 3],
    /// Left child index.
    pub left: i32,
    /// Right child index.
    pub right: i32,
    /// First triangle of a leaf.
    pub first_triangle: i32,
    /// Triangle count of a leaf.
    pub triangle_count: i32,
}

impl From<&BvhNode> for CacheNodeRecord {
    fn from(node: &BvhNode) -> Self {
        Self {
            min: [node.min.x, node.min.y, node.min.z],
            max: [node.max.x, node.max.y, node.max.z],
            left: node.left,
            right: node.right,
            first_triangle: node.first_triangle,
            triangle_count: node.triangle_count,
        }
    }
}

impl From<&CacheNodeRecord> for BvhNode {
    fn from(r: &CacheNodeRecord) -> Self {
        Self {
            min: Vec3::new(r.min[0], r.min[1], r.min[2]),
            max: Vec3::new(r.max[0], r.max[1], r.max[2]),
            left: r.left,
            right: r.right,
            first_triangle: r.first_triangle,
            triangle_count: r.triangle_count,
        }
    }
}

/// Decoded contents of a cache file.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRecord {
    /// Format version.
    pub version: u32,
    /// Normalized source path.
    pub source_relative: String,
    /// Normalized cache path.
    pub cache_relative: String,
    /// Source size in bytes at build time.
    pub source_size: u64,
    /// Source mtime in nanoseconds at build time.
    pub source_mtime_ns: u64,
    /// Flat node array.
    pub nodes: Vec<BvhNode>,
}

impl CacheRecord {
    /// A current-version record for `nodes` built from the asset in `metadata`.
    pub fn new(metadata: &BvhCacheMetadata, nodes: Vec<BvhNode>) -> Self {
        Self {
            version: CACHE_VERSION,
            source_relative: metadata.source_relative.clone(),
            cache_relative: metadata.cache_relative.clone(),
            source_size: metadata.source_size,
            source_mtime_ns: metadata.source_mtime_ns,
            nodes,
        }
    }
}

fn put_str(out: &mut Vec<u8>, s: &str) -> Result<(), CacheError> {
    let len = u32::try_from(s.len()).map_err(|_| CacheError::BadString)?;
    out.extend_from_slice(&len.to_ne_bytes());
    out.extend_from_slice(s.as_bytes());
    Ok(())
}

/// Serialize a record.
pub fn encode(record: &CacheRecord) -> Result<Vec<u8>, CacheError> {
    let nodes: Vec<CacheNodeRecord> = record.nodes.iter().map(CacheNodeRecord::from).collect();
    let node_bytes: &[u8] = bytemuck::cast_slice(&nodes);

    let mut out = Vec::with_capacity(
        36 + record.source_relative.len() + record.cache_relative.len() + node_bytes.len(),
    );
    out.extend_from_slice(&record.version.to_ne_bytes());
    put_str(&mut out, &record.source_relative)?;
    put_str(&mut out, &record.cache_relative)?;
    out.extend_from_slice(&record.source_size.to_ne_bytes());
    out.extend_from_slice(&record.source_mtime_ns.to_ne_bytes());
    out.extend_from_slice(&(nodes.len() as u64).to_ne_bytes());
    out.extend_from_slice(node_bytes);
    Ok(out)
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], CacheError> {
        let end = self.pos.checked_add(n).ok_or(CacheError::Truncated)?;
        let slice = self.bytes.get(self.pos..end).ok_or(CacheError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32, CacheError> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(u32::from_ne_bytes(buf))
    }

    fn u64(&mut self) -> Result<u64, CacheError> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_ne_bytes(buf))
    }

    fn string(&mut self) -> Result<String, CacheError> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CacheError::BadString)
    }

    fn rest(&self) -> &'a [u8] {
        &self.bytes[self.pos..]
    }
}

/// Parse a record.
///
/// The version is checked before anything else, since other versions may
/// lay out the remaining fields differently.
pub fn decode(bytes: &[u8]) -> Result<CacheRecord, CacheError> {
    let mut r = Reader { bytes, pos: 0 };

    let version = r.u32()?;
    check_version(version).map_err(CacheError::Stale)?;

    let source_relative = r.string()?;
    let cache_relative = r.string()?;
    let source_size = r.u64()?;
    let source_mtime_ns = r.u64()?;
    let count = usize::try_from(r.u64()?).map_err(|_| CacheError::Truncated)?;

    let expected = count
        .checked_mul(size_of::<CacheNodeRecord>())
        .ok_or(CacheError::Truncated)?;
    let payload = r.rest();
    if payload.len() < expected {
        return Err(CacheError::Truncated);
    }
    if payload.len() > expected {
        return Err(CacheError::TrailingBytes(payload.len() - expected));
    }

    let records: Vec<CacheNodeRecord> = bytemuck::pod_collect_to_vec(payload);
    let nodes = records.iter().map(BvhNode::from).collect();

    Ok(CacheRecord {
        version,
        source_relative,
        cache_relative,
        source_size,
        source_mtime_ns,
        nodes,
    })
}
