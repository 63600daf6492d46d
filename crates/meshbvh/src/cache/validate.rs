//! Freshness checks for cached trees.
//!
//! Size and mtime are only a proxy for content identity, so every field is
//! compared exactly. The path fields keep an entry from being reused for an
//! unrelated asset that happens to share size and mtime.

use std::fmt;

use super::codec::CacheRecord;
use super::BvhCacheMetadata;

/// Current on-disk format version.
pub const CACHE_VERSION: u32 = 1;

/// Why a cache entry cannot be reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Staleness {
    /// Written by a different format version.
    Version {
        /// Version found in the file.
        found: u32,
    },
    /// Source file size changed.
    SourceSize {
        /// Size recorded in the cache.
        cached: u64,
        /// Current size.
        current: u64,
    },
    /// Source modification time changed.
    SourceMtime {
        /// Mtime recorded in the cache.
        cached: u64,
        /// Current mtime.
        current: u64,
    },
    /// Cache was written for a different source path.
    SourceRelative {
        /// Path recorded in the cache.
        cached: String,
    },
    /// Cache was written to a different location.
    CacheRelative {
        /// Path recorded in the cache.
        cached: String,
    },
}

impl fmt::Display for Staleness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Version { found } => {
                write!(f, "format version {found} (expected {CACHE_VERSION})")
            }
            Self::SourceSize { cached, current } => {
                write!(f, "source size {cached} != {current}")
            }
            Self::SourceMtime { cached, current } => {
                write!(f, "source mtime {cached} != {current}")
            }
            Self::SourceRelative { cached } => write!(f, "built for source {cached:?}"),
            Self::CacheRelative { cached } => write!(f, "written as {cached:?}"),
        }
    }
}

/// Check a file's format version.
pub fn check_version(found: u32) -> Result<(), Staleness> {
    if found != CACHE_VERSION {
        return Err(Staleness::Version { found });
    }
    Ok(())
}

/// Check that a cache record was built from exactly the asset described by `metadata`.
pub fn check_identity(record: &CacheRecord, metadata: &BvhCacheMetadata) -> Result<(), Staleness> {
    check_version(record.version)?;
    if record.source_size != metadata.source_size {
        return Err(Staleness::SourceSize {
            cached: record.source_size,
            current: metadata.source_size,
        });
    }
    if record.source_mtime_ns != metadata.source_mtime_ns {
        return Err(Staleness::SourceMtime {
            cached: record.source_mtime_ns,
            current: metadata.source_mtime_ns,
        });
    }
    if record.source_relative != metadata.source_relative {
        return Err(Staleness::SourceRelative {
            cached: record.source_relative.clone(),
        });
    }
    if record.cache_relative != metadata.cache_relative {
        return Err(Staleness::CacheRelative {
            cached: record.cache_relative.clone(),
        });
    }
    Ok(())
}
