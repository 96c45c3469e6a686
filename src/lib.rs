//! # playground-batch
//!
//! Build pipeline for documentation playgrounds: annotated code fences in,
//! a virtual file set and a self-contained preview document out.
//!
//! Snippets in a compiled language (Scala.js) have no interpreter in the
//! browser, so they are compiled out of process. The expensive parts are
//! shared across builds:
//!
//! - **Compile cache**: content-addressed manifest, one compiler run per
//!   distinct snippet
//! - **In-flight coalescing**: concurrent requests for the same snippet wait
//!   on one compilation
//! - **Generated modules**: scaffolded once per hash, reused by batch
//!   precompilation
//!
//! ## Quick Start
//!
//! ```ignore
//! use playground_batch::prelude::*;
//!
//! let blocks = [
//!     CodeBlock::new("scala", "preview", r#"div("Hello")"#),
//!     CodeBlock::new("css", "styles.css hidden", "#root { color: teal; }"),
//! ];
//!
//! let result = FileSetBuilder::new(".").dialect(Dialect::ScalaJs).build(&blocks)?;
//! for failure in &result.failures {
//!     eprintln!("block {}: {}", failure.index, failure.error);
//! }
//! let html = assemble(&result.files, Dialect::ScalaJs);
//! ```
//!
//! ## Modules
//!
//! - [`meta`]: fence meta parsing
//! - [`builder`]: file-set assembly across blocks
//! - [`template`]: compile-unit wrapping
//! - [`cache`]: compile cache and manifest
//! - [`compiler`]: external compiler adapters and module scaffolding
//! - [`compile`]: the end-to-end snippet compile path
//! - [`document`]: preview document assembly
//! - [`diagnostic`]: failure formatting
//! - [`config`]: runtime configuration

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod builder;
pub mod cache;
pub mod compile;
pub mod compiler;
pub mod config;
pub mod diagnostic;
pub mod dialect;
pub mod document;
pub mod error;
pub mod fileset;
pub mod meta;
pub mod template;

// =============================================================================
// Prelude - import commonly used items with a single `use`
// =============================================================================

/// Prelude module for convenient imports.
///
/// ```ignore
/// use playground_batch::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        assemble, assemble_with, build_file_set, AssembleOptions, BuildResult, CodeBlock,
        CompiledSnippet, Config, ConfigBuilder, Dialect, FileSet, FileSetBuilder,
        SnippetCompiler, TemplateParams, VirtualFile,
    };

    pub use crate::{BlockError, BuildError, CompilationError};
}

// =============================================================================
// High-Level API
// =============================================================================

pub use builder::{build_file_set, BlockFailure, BuildResult, CodeBlock, FileSetBuilder};
pub use compile::{CompiledSnippet, PrecompileReport, SnippetCompiler};
pub use document::{assemble, assemble_with, AssembleOptions};

// =============================================================================
// Data Model
// =============================================================================

pub use dialect::Dialect;
pub use fileset::{FileSet, PendingFile, VirtualFile};
pub use meta::{FileMeta, MetaValue};
pub use template::{TemplateKind, TemplateParams};

// =============================================================================
// Infrastructure
// =============================================================================

pub use cache::{CacheEntry, CacheManifest, CacheStats, CompileCache};
pub use compiler::{CompiledArtifact, ExternalCompiler, MillCompiler, ModuleLayout, ScaffoldedModule};
pub use config::{Config, ConfigBuilder};
pub use diagnostic::{format_compile_failure, DiagnosticOptions};
pub use error::{
    BlockError, BuildError, CacheIoError, CompilationError, DialectError, FileNotFoundError,
    MetaError,
};
