//! Content-addressed compile cache.
//!
//! # Caching Strategy
//!
//! ```text
//! CompileCache (one per working directory, passed by reference)
//! ├── manifest: OnceLock<RwLock<CacheManifest>>   loaded on first use
//! └── flush_lock: Mutex<()>                        single writer per manifest file
//!
//! lookup / should_recompile → read lock on the in-memory snapshot
//! record / remove / clear   → flush_lock, mutate under write lock, write file
//! ```
//!
//! A hash identifies `(template, template params, expanded source)`. A cached
//! artifact is reused only if the stored source matches byte for byte and the
//! artifact file still exists on disk.

mod manifest;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use parking_lot::{Mutex, RwLock};
use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::error::CacheIoError;
use crate::template::{TemplateKind, TemplateParams};

pub use manifest::{CacheEntry, CacheManifest, CACHE_VERSION, MANIFEST_FILE};

/// Hex digits kept from the SHA-256 digest.
pub const HASH_LEN: usize = 12;

// =============================================================================
// Hashing
// =============================================================================

/// Content hash of an expanded compile unit.
///
/// Covers the template identity and parameters as well as the source, so
/// switching templates invalidates the entry even when the user code is
/// unchanged.
pub fn compute_hash(wrapped_source: &str, template: TemplateKind, params: &TemplateParams) -> String {
    let mut hasher = Sha256::new();
    hasher.update(template.as_str().as_bytes());
    hasher.update(b"\0");
    hasher.update(params.fingerprint().as_bytes());
    hasher.update(b"\0");
    hasher.update(wrapped_source.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..HASH_LEN].to_string()
}

// =============================================================================
// CompileCache
// =============================================================================

/// Summary of the manifest contents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of entries.
    pub total_entries: usize,
    /// Oldest entry timestamp (ms since epoch).
    pub oldest_entry: Option<i64>,
    /// Newest entry timestamp (ms since epoch).
    pub newest_entry: Option<i64>,
}

/// Compile cache for one working directory.
pub struct CompileCache {
    cwd: PathBuf,
    manifest_path: PathBuf,
    manifest: OnceLock<RwLock<CacheManifest>>,
    flush_lock: Mutex<()>,
}

impl CompileCache {
    /// Create a cache for `cwd`. Nothing is read until first use.
    pub fn new(cwd: impl Into<PathBuf>, config: &Config) -> Self {
        let cwd = cwd.into();
        let manifest_path = cwd.join(&config.cache_dir).join(MANIFEST_FILE);
        Self {
            cwd,
            manifest_path,
            manifest: OnceLock::new(),
            flush_lock: Mutex::new(()),
        }
    }

    /// Working directory this cache belongs to.
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Location of the manifest file.
    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    fn state(&self) -> &RwLock<CacheManifest> {
        self.manifest.get_or_init(|| {
            let manifest = CacheManifest::load_or_reset(&self.manifest_path);
            tracing::debug!(
                path = %self.manifest_path.display(),
                entries = manifest.entries.len(),
                "loaded compile cache manifest"
            );
            RwLock::new(manifest)
        })
    }

    /// Entry for `hash`, if recorded.
    pub fn lookup(&self, hash: &str) -> Option<CacheEntry> {
        self.state().read().entries.get(hash).cloned()
    }

    /// Whether `hash` has to be compiled again.
    ///
    /// True if there is no entry, the recorded source differs from
    /// `exact_source`, or `expected_output` is missing on disk.
    pub fn should_recompile(&self, hash: &str, exact_source: &str, expected_output: &Path) -> bool {
        let state = self.state().read();
        let Some(entry) = state.entries.get(hash) else {
            return true;
        };
        entry.source_code != exact_source || !self.resolve(expected_output).is_file()
    }

    /// Record a successful compilation and flush the manifest.
    pub fn record(&self, hash: &str, exact_source: &str, output_path: &Path) -> Result<(), CacheIoError> {
        let entry = CacheEntry {
            hash: hash.to_string(),
            source_code: exact_source.to_string(),
            compiled_path: self.relativize(output_path),
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        self.mutate(|manifest| {
            manifest.entries.insert(hash.to_string(), entry);
        })
    }

    /// Drop one entry and flush the manifest.
    pub fn remove(&self, hash: &str) -> Result<Option<CacheEntry>, CacheIoError> {
        let mut removed = None;
        self.mutate(|manifest| removed = manifest.entries.remove(hash))?;
        Ok(removed)
    }

    /// Drop every entry and flush the manifest.
    pub fn clear(&self) -> Result<(), CacheIoError> {
        self.mutate(|manifest| manifest.entries.clear())
    }

    /// All recorded hashes, sorted.
    pub fn hashes(&self) -> Vec<String> {
        self.state().read().entries.keys().cloned().collect()
    }

    /// Entry count and timestamp range.
    pub fn stats(&self) -> CacheStats {
        let state = self.state().read();
        let range = state.timestamp_range();
        CacheStats {
            total_entries: state.entries.len(),
            oldest_entry: range.map(|(lo, _)| lo),
            newest_entry: range.map(|(_, hi)| hi),
        }
    }

    /// Absolute path of a recorded artifact.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd.join(path)
        }
    }

    /// Apply a mutation and write the manifest.
    ///
    /// The flush lock is held from mutation to write so that writes land in
    /// the same order as mutations. Readers are only blocked while the
    /// in-memory map is changed and serialized.
    fn mutate(&self, apply: impl FnOnce(&mut CacheManifest)) -> Result<(), CacheIoError> {
        let _writer = self.flush_lock.lock();
        let content = {
            let mut manifest = self.state().write();
            apply(&mut manifest);
            manifest.to_json()
        };
        CacheManifest::write(&self.manifest_path, &content)
    }

    fn relativize(&self, path: &Path) -> String {
        path.strip_prefix(&self.cwd)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }
}

impl std::fmt::Debug for CompileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompileCache")
            .field("cwd", &self.cwd)
            .field("manifest_path", &self.manifest_path)
            .field("loaded", &self.manifest.get().is_some())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
