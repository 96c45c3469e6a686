//! On-disk cache manifest.
//!
//! One JSON file per working directory:
//!
//! ```json
//! {
//!   "version": "1.0.0",
//!   "entries": {
//!     "3f2a9c81d0e4": {
//!       "hash": "3f2a9c81d0e4",
//!       "sourceCode": "package playground.autogen ...",
//!       "compiledPath": "out/demos/autogen/h3f2a9c81d0e4/fullLinkJS.dest/main.js",
//!       "timestamp": 1760000000000
//!     }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CacheIoError;

/// Manifest format version. A mismatch on load discards the manifest.
pub const CACHE_VERSION: &str = "1.0.0";

/// File name of the manifest inside the cache directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// One compiled snippet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Content hash, also the map key.
    pub hash: String,
    /// Exact template-expanded source that was compiled.
    pub source_code: String,
    /// Artifact path, relative to the working directory when possible.
    pub compiled_path: String,
    /// Milliseconds since the Unix epoch when the entry was recorded.
    pub timestamp: i64,
}

/// All entries for one working directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheManifest {
    /// Format version.
    pub version: String,
    /// Entries keyed by hash.
    pub entries: BTreeMap<String, CacheEntry>,
}

impl Default for CacheManifest {
    fn default() -> Self {
        Self {
            version: CACHE_VERSION.to_string(),
            entries: BTreeMap::new(),
        }
    }
}

impl CacheManifest {
    /// Read a manifest.
    ///
    /// A missing file is an empty manifest, not an error.
    pub fn load(path: &Path) -> Result<Self, CacheIoError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(CacheIoError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let manifest: Self =
            serde_json::from_str(&content).map_err(|source| CacheIoError::Corrupt {
                path: path.to_path_buf(),
                source,
            })?;

        if manifest.version != CACHE_VERSION {
            return Err(CacheIoError::VersionMismatch {
                found: manifest.version,
                expected: CACHE_VERSION.to_string(),
            });
        }

        Ok(manifest)
    }

    /// Read a manifest, falling back to an empty one on any error.
    pub fn load_or_reset(path: &Path) -> Self {
        Self::load(path).unwrap_or_else(|err| {
            tracing::warn!(%err, "resetting compile cache manifest");
            Self::default()
        })
    }

    /// Serialize for writing.
    pub fn to_json(&self) -> String {
        // Maps of strings and integers always serialize.
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Write serialized manifest content, creating the cache directory.
    pub fn write(path: &Path, content: &str) -> Result<(), CacheIoError> {
        let io_err = |source| CacheIoError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(io_err)?;
        }
        fs::write(path, content).map_err(io_err)
    }

    /// Smallest and largest entry timestamps.
    pub fn timestamp_range(&self) -> Option<(i64, i64)> {
        let mut stamps = self.entries.values().map(|e| e.timestamp);
        let first = stamps.next()?;
        Some(stamps.fold((first, first), |(lo, hi), t| (lo.min(t), hi.max(t))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(hash: &str, timestamp: i64) -> CacheEntry {
        CacheEntry {
            hash: hash.into(),
            source_code: "src".into(),
            compiled_path: "out/main.js".into(),
            timestamp,
        }
    }

    #[test]
    fn test_missing_manifest_is_empty() {
        let dir = TempDir::new().unwrap();
        let manifest = CacheManifest::load(&dir.path().join(MANIFEST_FILE)).unwrap();
        assert_eq!(manifest, CacheManifest::default());
    }

    #[test]
    fn test_write_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(MANIFEST_FILE);

        let mut manifest = CacheManifest::default();
        manifest.entries.insert("abc".into(), entry("abc", 7));
        CacheManifest::write(&path, &manifest.to_json()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"sourceCode\""));
        assert!(content.contains("\"compiledPath\""));
        assert_eq!(CacheManifest::load(&path).unwrap(), manifest);
    }

    #[test]
    fn test_corrupt_manifest_resets() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(MANIFEST_FILE);
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            CacheManifest::load(&path),
            Err(CacheIoError::Corrupt { .. })
        ));
        assert_eq!(CacheManifest::load_or_reset(&path), CacheManifest::default());
    }

    #[test]
    fn test_version_mismatch_resets() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(MANIFEST_FILE);
        fs::write(&path, r#"{"version":"0.1.0","entries":{}}"#).unwrap();

        assert!(matches!(
            CacheManifest::load(&path),
            Err(CacheIoError::VersionMismatch { .. })
        ));
        assert!(CacheManifest::load_or_reset(&path).entries.is_empty());
    }

    #[test]
    fn test_timestamp_range() {
        let mut manifest = CacheManifest::default();
        assert_eq!(manifest.timestamp_range(), None);
        manifest.entries.insert("a".into(), entry("a", 30));
        manifest.entries.insert("b".into(), entry("b", 10));
        manifest.entries.insert("c".into(), entry("c", 20));
        assert_eq!(manifest.timestamp_range(), Some((10, 30)));
    }
}
