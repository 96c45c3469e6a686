//! Error types for the playground pipeline.
//!
//! Every failure is scoped to the block or cache operation that produced it.
//! Only [`BuildError`] aborts a whole file-set build.

use std::path::PathBuf;

use thiserror::Error;

/// A meta token that could not be interpreted.
///
/// Never fatal: the parser records the token as an opaque flag and keeps going.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetaError {
    /// `key=value` token with an empty key, e.g. `=foo`.
    #[error("meta token `{token}` has an empty key")]
    EmptyKey {
        /// The offending token.
        token: String,
    },

    /// A known boolean key (`hidden`, `active`) given a non-boolean value.
    #[error("meta token `{token}` expects `true` or `false`")]
    InvalidBoolean {
        /// The offending token.
        token: String,
    },
}

/// A `file=` attribute pointed at a path that could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("referenced file not found: {}", path.display())]
pub struct FileNotFoundError {
    /// Absolute path that was looked up (`cwd` joined with the attribute).
    pub path: PathBuf,
}

/// Failure of the external compiler for a single snippet.
///
/// `Clone` so that every waiter coalesced onto one in-flight compilation
/// receives the same failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompilationError {
    /// Writing the module tree failed.
    #[error("failed to scaffold module {module}: {message}")]
    Scaffold {
        /// Module identifier (`h<hash>`).
        module: String,
        /// I/O error text.
        message: String,
    },

    /// The compiler executable could not be started.
    #[error("failed to spawn `{program}`: {message}")]
    Spawn {
        /// Executable name.
        program: String,
        /// I/O error text.
        message: String,
    },

    /// The compiler exited unsuccessfully.
    #[error("compiler exited with {status} for {target}")]
    Failed {
        /// Target argument passed to the compiler.
        target: String,
        /// Exit status description.
        status: String,
        /// Captured standard output (bounded).
        stdout: String,
        /// Captured standard error (bounded).
        stderr: String,
    },

    /// The compiler ran longer than the configured timeout and was killed.
    #[error("compiler timed out after {seconds}s for {target}")]
    Timeout {
        /// Target argument passed to the compiler.
        target: String,
        /// Configured limit in seconds.
        seconds: u64,
    },

    /// Polling the running compiler process failed; it was killed.
    #[error("failed to wait for compiler on {target}: {message}")]
    Wait {
        /// Target argument passed to the compiler.
        target: String,
        /// I/O error text.
        message: String,
    },

    /// Exit code was zero but the expected artifact does not exist.
    #[error("compiled output not found: {}", path.display())]
    MissingOutput {
        /// Expected artifact path.
        path: PathBuf,
    },

    /// A generated module's source could not be read during batch precompilation.
    #[error("failed to read module source {}: {message}", path.display())]
    ReadSource {
        /// Source path.
        path: PathBuf,
        /// I/O error text.
        message: String,
    },

    /// The artifact exists but could not be read back.
    #[error("failed to read compiled output {}: {message}", path.display())]
    ReadOutput {
        /// Artifact path.
        path: PathBuf,
        /// I/O error text.
        message: String,
    },
}

impl CompilationError {
    /// Captured compiler output, stderr first, if any was collected.
    pub fn captured_output(&self) -> Option<String> {
        match self {
            Self::Failed { stdout, stderr, .. } => {
                let mut out = String::new();
                for stream in [stderr, stdout] {
                    let trimmed = stream.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    if !out.is_empty() {
                        out.push('\n');
                    }
                    out.push_str(trimmed);
                }
                (!out.is_empty()).then_some(out)
            }
            _ => None,
        }
    }
}

/// The cache manifest could not be read, parsed, or written.
///
/// Recovered by resetting to an empty manifest on load, and by logging on flush.
#[derive(Debug, Error)]
pub enum CacheIoError {
    /// Reading or writing the manifest file failed.
    #[error("cache manifest I/O error at {}: {source}", path.display())]
    Io {
        /// Manifest path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The manifest file is not valid JSON for the expected shape.
    #[error("cache manifest at {} is corrupt: {source}", path.display())]
    Corrupt {
        /// Manifest path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// The manifest was written by an incompatible cache version.
    #[error("cache manifest version {found} does not match {expected}")]
    VersionMismatch {
        /// Version found on disk.
        found: String,
        /// Version this crate writes.
        expected: String,
    },
}

/// Unknown dialect selector string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown playground dialect `{0}` (expected vanilla, tailwind, react or sjs)")]
pub struct DialectError(pub String);

/// A recovered failure of one code block.
///
/// Collected next to the file set; the block still contributes what it can.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockError {
    /// Malformed meta token.
    #[error(transparent)]
    Meta(#[from] MetaError),

    /// Missing `file=` reference.
    #[error(transparent)]
    FileNotFound(#[from] FileNotFoundError),

    /// The compiled-language snippet did not compile.
    #[error(transparent)]
    Compilation(#[from] CompilationError),
}

/// Directory-level failure that aborts a whole file-set build.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The generated-modules root could not be created.
    #[error("cannot create generated modules root {}: {source}", path.display())]
    ModulesRoot {
        /// Root directory path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}
