//! Virtual file sets.
//!
//! A [`FileSet`] is the insertion-ordered `path → file` map shown in the
//! playground's tab view and embedded into the preview document.
//!
//! # Invariants
//!
//! - Every path starts with `/`.
//! - Paths are unique; a later insert for the same path replaces the earlier
//!   file in place ("last annotation wins").
//! - At most one file is implicitly active (see [`resolve_active`]).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

// =============================================================================
// VirtualFile
// =============================================================================

/// One file of a playground.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualFile {
    /// Rooted path (`/index.js`).
    pub path: String,
    /// File contents.
    pub code: String,
    /// Hidden from the tab strip.
    pub hidden: bool,
    /// Default focus of the editor.
    pub active: bool,
    /// Language used for highlighting.
    pub language: String,
}

/// A file before active resolution: `active` may still be undecided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFile {
    /// Rooted path.
    pub path: String,
    /// File contents.
    pub code: String,
    /// Hidden from the tab strip.
    pub hidden: bool,
    /// Explicit focus request, `None` if the author did not say.
    pub active: Option<bool>,
    /// Language used for highlighting.
    pub language: String,
}

impl PendingFile {
    /// Create a visible file with undecided focus.
    pub fn new(path: impl Into<String>, code: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            path: rooted(path.into()),
            code: code.into(),
            hidden: false,
            active: None,
            language: language.into(),
        }
    }

    /// Set the hidden flag.
    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    /// Set an explicit focus request.
    pub fn active(mut self, active: Option<bool>) -> Self {
        self.active = active;
        self
    }
}

// =============================================================================
// FileSet
// =============================================================================

/// Insertion-ordered map of virtual files, serialized as a JSON object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileSet {
    files: IndexMap<String, VirtualFile>,
}

impl FileSet {
    /// Create an empty file set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve focus flags and collect pending files in document order.
    ///
    /// Writes to an already-present path replace that file without moving it.
    pub fn from_pending(pending: Vec<PendingFile>) -> Self {
        let mut merged: IndexMap<String, PendingFile> = IndexMap::new();
        for file in pending {
            merged.insert(file.path.clone(), file);
        }

        let flags: Vec<Option<bool>> = merged.values().map(|f| f.active).collect();
        let resolved = resolve_active(&flags);

        let mut set = Self::new();
        for (file, active) in merged.into_values().zip(resolved) {
            set.insert(VirtualFile {
                path: file.path,
                code: file.code,
                hidden: file.hidden,
                active,
                language: file.language,
            });
        }
        set
    }

    /// Insert a file, replacing any file with the same path in place.
    pub fn insert(&mut self, mut file: VirtualFile) -> Option<VirtualFile> {
        file.path = rooted(file.path);
        self.files.insert(file.path.clone(), file)
    }

    /// Look up a file by path.
    pub fn get(&self, path: &str) -> Option<&VirtualFile> {
        self.files.get(path)
    }

    /// Contents of a file, if present.
    pub fn code(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(|f| f.code.as_str())
    }

    /// Contents of the first present path among `candidates`.
    pub fn first_code(&self, candidates: &[&str]) -> Option<&str> {
        candidates.iter().find_map(|path| self.code(path))
    }

    /// Whether a path is present.
    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    /// Iterate over files in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &VirtualFile> {
        self.files.values()
    }

    /// Iterate over paths in insertion order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Paths of all active files.
    pub fn active_paths(&self) -> Vec<&str> {
        self.iter()
            .filter(|f| f.active)
            .map(|f| f.path.as_str())
            .collect()
    }

    /// Number of files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Serialize to the JSON object consumed by the tab view.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl<'a> IntoIterator for &'a FileSet {
    type Item = &'a VirtualFile;
    type IntoIter = indexmap::map::Values<'a, String, VirtualFile>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.values()
    }
}

// =============================================================================
// Active Resolution
// =============================================================================

/// Resolve focus flags for files in document order.
///
/// - An explicit value is always honored.
/// - If no file asked for focus explicitly, the first undecided file becomes
///   active and every later undecided file inactive.
/// - If some file asked for focus explicitly, undecided files stay inactive.
pub fn resolve_active(flags: &[Option<bool>]) -> Vec<bool> {
    let mut claimed = flags.contains(&Some(true));
    flags
        .iter()
        .map(|flag| match flag {
            Some(explicit) => *explicit,
            None if !claimed => {
                claimed = true;
                true
            }
            None => false,
        })
        .collect()
}

/// Prefix a path with `/` unless it already has one.
pub(crate) fn rooted(path: String) -> String {
    if path.starts_with('/') {
        path
    } else {
        format!("/{path}")
    }
}

// =============================================================================
// Tests
// =============================================================================
