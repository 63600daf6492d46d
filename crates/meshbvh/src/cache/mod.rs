//! Persistent BVH cache keyed on source-asset identity.
//!
//! A cache entry is reusable only while the source asset keeps the exact
//! size, mtime and relative path it had when the tree was built. Caching is
//! strictly an optimization: [`load`] turns every failure into a miss and
//! [`save`] only logs, so neither can fail a caller that just wants a tree.
//! The fallible [`try_load`] and [`try_save`] are available for callers that
//! want to see why.

pub mod codec;
pub mod validate;

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

use thiserror::Error;

use crate::builder::{build_bvh_with_config, BvhBuild};
use crate::config::SahConfig;
use crate::error::{BvhError, Result};
use crate::node::{validate_nodes, BvhNode};

pub use codec::{CacheNodeRecord, CacheRecord};
pub use validate::{Staleness, CACHE_VERSION};

/// File extension appended to source file names by [`BvhCacheMetadata::cache_path_for`].
pub const CACHE_EXTENSION: &str = "bvh";

/// Errors from the fallible cache paths.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Filesystem error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// File ended before the record was complete.
    #[error("cache file is truncated")]
    Truncated,

    /// File has bytes after the node table.
    #[error("cache file has {0} trailing bytes")]
    TrailingBytes(usize),

    /// A path field is not valid UTF-8 or is too long to encode.
    #[error("cache file has an invalid path string")]
    BadString,

    /// Entry does not match the current source asset.
    #[error("stale cache: {0}")]
    Stale(Staleness),

    /// Node table is not a valid tree.
    #[error("corrupt cache: {0}")]
    Corrupt(BvhError),
}

/// Identity of a source asset and where its cached tree lives.
///
/// Build a fresh value from the current on-disk state before every load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BvhCacheMetadata {
    /// Where the cache file is read from and written to. Empty disables caching.
    pub cache_path: PathBuf,
    /// Normalized cache path, relative to the project root.
    pub cache_relative: String,
    /// Normalized source path, relative to the project root.
    pub source_relative: String,
    /// Source file size in bytes.
    pub source_size: u64,
    /// Source modification time in nanoseconds since the Unix epoch.
    pub source_mtime_ns: u64,
}

impl BvhCacheMetadata {
    /// Describe `source` as it currently exists on disk.
    ///
    /// Relative paths are computed against `root` and normalized to `/`
    /// separators, so moving the whole project does not invalidate caches.
    ///
    /// # Errors
    ///
    /// Returns an error if the source file's metadata cannot be read.
    pub fn for_source(source: &Path, cache_path: &Path, root: &Path) -> io::Result<Self> {
        let meta = fs::metadata(source)?;
        let mtime = meta
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map_err(io::Error::other)?;

        Ok(Self {
            cache_path: cache_path.to_path_buf(),
            cache_relative: normalize_relative(cache_path, root),
            source_relative: normalize_relative(source, root),
            source_size: meta.len(),
            source_mtime_ns: u64::try_from(mtime.as_nanos()).unwrap_or(u64::MAX),
        })
    }

    /// Default cache location for `source` inside `cache_dir`: `<file name>.bvh`.
    pub fn cache_path_for(source: &Path, cache_dir: &Path) -> PathBuf {
        let mut name = source
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "mesh".into());
        name.push(".");
        name.push(CACHE_EXTENSION);
        cache_dir.join(name)
    }

    /// True if this metadata has no cache location.
    pub fn is_disabled(&self) -> bool {
        self.cache_path.as_os_str().is_empty()
    }
}

/// `path` relative to `root` with `/` separators and `.` segments removed.
///
/// Paths outside `root` are kept as given.
pub fn normalize_relative(path: &Path, root: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let mut parts: Vec<String> = Vec::new();
    for component in rel.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => parts.push("..".into()),
            Component::RootDir => parts.push(String::new()),
            Component::Prefix(p) => parts.push(p.as_os_str().to_string_lossy().into_owned()),
            Component::Normal(s) => parts.push(s.to_string_lossy().into_owned()),
        }
    }
    parts.join("/")
}

/// Load a cached tree, reporting why it could not be used.
///
/// `Ok(None)` is a plain miss: caching disabled or no file.
pub fn try_load(
    metadata: &BvhCacheMetadata,
) -> std::result::Result<Option<Vec<BvhNode>>, CacheError> {
    if metadata.is_disabled() {
        return Ok(None);
    }
    let bytes = match fs::read(&metadata.cache_path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let record = codec::decode(&bytes)?;
    validate::check_identity(&record, metadata).map_err(CacheError::Stale)?;
    validate_nodes(&record.nodes).map_err(CacheError::Corrupt)?;
    Ok(Some(record.nodes))
}

/// Load a cached tree if it is fresh.
///
/// Missing, stale and corrupt caches all return `None` and are logged.
pub fn load(metadata: &BvhCacheMetadata) -> Option<Vec<BvhNode>> {
    match try_load(metadata) {
        Ok(Some(nodes)) => {
            tracing::info!(
                path = %metadata.cache_path.display(),
                nodes = nodes.len(),
                "BVH cache hit"
            );
            Some(nodes)
        }
        Ok(None) => {
            tracing::info!(path = %metadata.cache_path.display(), "BVH cache miss");
            None
        }
        Err(CacheError::Stale(reason)) => {
            tracing::info!(
                path = %metadata.cache_path.display(),
                %reason,
                "ignoring stale BVH cache"
            );
            None
        }
        Err(e) => {
            tracing::warn!(
                path = %metadata.cache_path.display(),
                error = %e,
                "ignoring unreadable BVH cache"
            );
            None
        }
    }
}

/// Write a tree to `metadata.cache_path`, replacing any existing file.
pub fn try_save(
    metadata: &BvhCacheMetadata,
    nodes: &[BvhNode],
) -> std::result::Result<(), CacheError> {
    if let Some(parent) = metadata.cache_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let bytes = codec::encode(&CacheRecord::new(metadata, nodes.to_vec()))?;
    fs::write(&metadata.cache_path, bytes)?;
    Ok(())
}

/// Write a tree to the cache, logging instead of failing.
///
/// Returns whether the file was written.
pub fn save(metadata: &BvhCacheMetadata, nodes: &[BvhNode]) -> bool {
    if metadata.is_disabled() {
        tracing::debug!("BVH caching disabled, not saving");
        return false;
    }
    match try_save(metadata, nodes) {
        Ok(()) => {
            tracing::debug!(
                path = %metadata.cache_path.display(),
                nodes = nodes.len(),
                "saved BVH cache"
            );
            true
        }
        Err(e) => {
            tracing::warn!(
                path = %metadata.cache_path.display(),
                error = %e,
                "failed to save BVH cache"
            );
            false
        }
    }
}

/// Return the cached tree for an asset, building and caching it on a miss.
///
/// A cached tree whose leaves do not reference every triangle of `indices`
/// exactly once is discarded and rebuilt. Only malformed input or settings
/// produce an error.
pub fn load_or_build(
    metadata: &BvhCacheMetadata,
    positions: &[f32],
    indices: &[u32],
    config: &SahConfig,
) -> Result<BvhBuild> {
    if let Some(nodes) = load(metadata) {
        let cached = BvhBuild::from_nodes(nodes);
        if cached.covers_triangles(indices.len() / 3) {
            return Ok(cached);
        }
        tracing::warn!(
            path = %metadata.cache_path.display(),
            cached = cached.triangle_count(),
            current = indices.len() / 3,
            "cached BVH triangles do not match mesh, rebuilding"
        );
    }

    let build = build_bvh_with_config(positions, indices, config)?;
    save(metadata, &build.nodes);
    Ok(build)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build_bvh;

    /// Scratch directory under the system temp dir, removed on drop.
    struct TempDir(PathBuf);

    impl TempDir {
        fn new(name: &str) -> Self {
            let dir = std::env::temp_dir().join(format!("meshbvh-{}-{}", name, std::process::id()));
            let _ = fs::remove_dir_all(&dir);
            fs::create_dir_all(&dir).unwrap();
            Self(dir)
        }
    }

    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }

    fn mesh() -> (Vec<f32>, Vec<u32>) {
        let positions = vec![
            0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0, //
            2.0, 0.0, 0.0, 3.0, 0.0, 0.0, 3.0, 1.0, 0.0, 2.0, 1.0, 0.0,
        ];
        (positions, vec![0, 1, 2, 0, 2, 3, 4, 5, 6, 4, 6, 7])
    }

    fn metadata_in(dir: &Path) -> BvhCacheMetadata {
        BvhCacheMetadata {
            cache_path: dir.join("nested/cache/mesh.obj.bvh"),
            cache_relative: "nested/cache/mesh.obj.bvh".into(),
            source_relative: "mesh.obj".into(),
            source_size: 321,
            source_mtime_ns: 99,
        }
    }

    #[test]
    fn test_save_then_load() {
        let tmp = TempDir::new("roundtrip");
        let metadata = metadata_in(&tmp.0);
        let (positions, indices) = mesh();
        let build = build_bvh(&positions, &indices).unwrap();

        assert!(save(&metadata, &build.nodes));
        assert_eq!(load(&metadata), Some(build.nodes));
    }

    #[test]
    fn test_missing_file_is_miss() {
        let tmp = TempDir::new("missing");
        let metadata = metadata_in(&tmp.0);
        assert!(matches!(try_load(&metadata), Ok(None)));
        assert_eq!(load(&metadata), None);
    }

    #[test]
    fn test_empty_path_is_miss() {
        let metadata = BvhCacheMetadata {
            cache_path: PathBuf::new(),
            cache_relative: String::new(),
            source_relative: "mesh.obj".into(),
            source_size: 1,
            source_mtime_ns: 1,
        };
        assert_eq!(load(&metadata), None);
        assert!(!save(&metadata, &[]));
    }

    #[test]
    fn test_any_changed_field_is_stale() {
        let tmp = TempDir::new("stale");
        let metadata = metadata_in(&tmp.0);
        let (positions, indices) = mesh();
        let build = build_bvh(&positions, &indices).unwrap();
        assert!(save(&metadata, &build.nodes));

        let mut changed = Vec::new();
        let mut m = metadata.clone();
        m.source_size += 1;
        changed.push(m);
        let mut m = metadata.clone();
        m.source_mtime_ns += 1;
        changed.push(m);
        let mut m = metadata.clone();
        m.source_relative = "other.obj".into();
        changed.push(m);
        let mut m = metadata.clone();
        m.cache_relative = "moved/mesh.obj.bvh".into();
        changed.push(m);

        for m in &changed {
            assert!(matches!(try_load(m), Err(CacheError::Stale(_))));
            assert_eq!(load(m), None);
        }
        assert!(load(&metadata).is_some());
    }

    #[test]
    fn test_corrupt_file_is_miss() {
        let tmp = TempDir::new("corrupt");
        let metadata = metadata_in(&tmp.0);
        fs::create_dir_all(metadata.cache_path.parent().unwrap()).unwrap();
        fs::write(&metadata.cache_path, b"not a cache").unwrap();
        assert!(try_load(&metadata).is_err());
        assert_eq!(load(&metadata), None);
    }

    #[test]
    fn test_invalid_tree_is_corrupt() {
        let tmp = TempDir::new("invalid-tree");
        let metadata = metadata_in(&tmp.0);
        let (positions, indices) = mesh();
        let mut nodes = build_bvh(&positions, &indices).unwrap().nodes;
        nodes[0].left = 100;
        try_save(&metadata, &nodes).unwrap();
        assert!(matches!(try_load(&metadata), Err(CacheError::Corrupt(_))));
        assert_eq!(load(&metadata), None);
    }

    #[test]
    fn test_save_overwrites() {
        let tmp = TempDir::new("overwrite");
        let metadata = metadata_in(&tmp.0);
        let (positions, indices) = mesh();
        let full = build_bvh(&positions, &indices).unwrap();
        let single = build_bvh(&positions, &indices[..3]).unwrap();

        assert!(save(&metadata, &full.nodes));
        assert!(save(&metadata, &single.nodes));
        assert_eq!(load(&metadata), Some(single.nodes));
    }

    #[test]
    fn test_save_failure_is_swallowed() {
        let tmp = TempDir::new("unwritable");
        // A regular file where the cache directory should be.
        let blocker = tmp.0.join("blocker");
        fs::write(&blocker, b"x").unwrap();
        let mut metadata = metadata_in(&tmp.0);
        metadata.cache_path = blocker.join("mesh.obj.bvh");

        assert!(!save(&metadata, &[]));
        assert!(try_save(&metadata, &[]).is_err());
    }

    #[test]
    fn test_load_or_build() {
        let tmp = TempDir::new("load-or-build");
        let metadata = metadata_in(&tmp.0);
        let (positions, indices) = mesh();

        let first = load_or_build(&metadata, &positions, &indices, &SahConfig::default()).unwrap();
        assert!(metadata.cache_path.exists());

        // Second call is served from the cache, so bogus geometry is never read.
        let second = load_or_build(&metadata, &[], &indices, &SahConfig::default()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_load_or_build_rejects_mismatched_cache() {
        let tmp = TempDir::new("mismatch");
        let metadata = metadata_in(&tmp.0);
        let (positions, indices) = mesh();
        let single = build_bvh(&positions, &indices[..3]).unwrap();
        assert!(save(&metadata, &single.nodes));

        let build = load_or_build(&metadata, &positions, &indices, &SahConfig::default()).unwrap();
        assert_eq!(build.triangle_count(), 4);
        assert_eq!(load(&metadata), Some(build.nodes));
    }

    #[test]
    fn test_load_or_build_rejects_foreign_triangle_ids() {
        let tmp = TempDir::new("foreign-ids");
        let metadata = metadata_in(&tmp.0);
        let (positions, indices) = mesh();
        let mut nodes = build_bvh(&positions, &indices).unwrap().nodes;
        for node in nodes.iter_mut().filter(|n| n.is_leaf()) {
            node.first_triangle += 100;
        }
        // Structurally valid, so it loads, but the ids are not this mesh's.
        assert!(save(&metadata, &nodes));
        assert!(load(&metadata).is_some());

        let build = load_or_build(&metadata, &positions, &indices, &SahConfig::default()).unwrap();
        assert!(build.covers_triangles(4));
        assert_eq!(build.reorder_indices(&indices).len(), indices.len());
        assert_eq!(load(&metadata), Some(build.nodes));
    }

    #[test]
    fn test_same_child_on_both_sides_round_trips() {
        let tmp = TempDir::new("shared-child");
        let metadata = metadata_in(&tmp.0);
        let (positions, indices) = mesh();
        let leaf = build_bvh(&positions, &indices[..3]).unwrap().nodes[0];
        let mut root = leaf;
        root.left = 1;
        root.right = 1;
        root.first_triangle = crate::node::NO_INDEX;
        root.triangle_count = 0;
        let nodes = vec![root, leaf];

        assert!(save(&metadata, &nodes));
        assert_eq!(load(&metadata), Some(nodes));
    }

    #[test]
    fn test_load_or_build_propagates_bad_input() {
        let tmp = TempDir::new("bad-input");
        let metadata = metadata_in(&tmp.0);
        let result = load_or_build(&metadata, &[0.0; 9], &[0, 1, 7], &SahConfig::default());
        assert!(result.is_err());
        assert!(!metadata.cache_path.exists());
    }

    #[test]
    fn test_for_source_reads_disk() {
        let tmp = TempDir::new("for-source");
        let source = tmp.0.join("assets/mesh.obj");
        fs::create_dir_all(source.parent().unwrap()).unwrap();
        fs::write(&source, b"v 0 0 0\n").unwrap();
        let cache_path = BvhCacheMetadata::cache_path_for(&source, &tmp.0.join("cache"));

        let metadata = BvhCacheMetadata::for_source(&source, &cache_path, &tmp.0).unwrap();
        assert_eq!(metadata.source_relative, "assets/mesh.obj");
        assert_eq!(metadata.cache_relative, "cache/mesh.obj.bvh");
        assert_eq!(metadata.source_size, 8);
        assert!(metadata.source_mtime_ns > 0);

        let missing = tmp.0.join("nope.obj");
        assert!(BvhCacheMetadata::for_source(&missing, &cache_path, &tmp.0).is_err());
    }

    #[test]
    fn test_normalize_relative() {
        let root = Path::new("/project");
        assert_eq!(normalize_relative(Path::new("/project/a/./b.obj"), root), "a/b.obj");
        assert_eq!(normalize_relative(Path::new("/elsewhere/b.obj"), root), "/elsewhere/b.obj");
        assert_eq!(normalize_relative(Path::new("a/../b.obj"), root), "a/../b.obj");
    }

    #[test]
    fn test_cache_path_for() {
        assert_eq!(
            BvhCacheMetadata::cache_path_for(Path::new("assets/ship.obj"), Path::new("cache")),
            PathBuf::from("cache/ship.obj.bvh")
        );
    }
}
