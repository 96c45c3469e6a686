//! External compiler adapters.
//!
//! - [`ExternalCompiler`] - the seam between the pipeline and a toolchain
//! - [`MillCompiler`] - subprocess adapter for the Mill build tool
//! - [`ModuleLayout`] - where generated modules and artifacts live
//!
//! Tests and alternative toolchains implement [`ExternalCompiler`] directly;
//! scaffolding comes for free through the trait's default method.

mod mill;
pub mod scaffold;

use std::fs;
use std::path::PathBuf;

use crate::error::CompilationError;

pub use mill::MillCompiler;
pub use scaffold::{ModuleLayout, ScaffoldedModule, discover_modules};

/// Compiler output read back into memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledArtifact {
    /// Source file that was compiled.
    pub source_path: PathBuf,
    /// Artifact file on disk.
    pub output_path: PathBuf,
    /// Artifact contents.
    pub code: String,
}

impl CompiledArtifact {
    /// Read an artifact from disk.
    pub fn read(source_path: PathBuf, output_path: PathBuf) -> Result<Self, CompilationError> {
        if !output_path.is_file() {
            return Err(CompilationError::MissingOutput { path: output_path });
        }
        let code = fs::read_to_string(&output_path).map_err(|e| CompilationError::ReadOutput {
            path: output_path.clone(),
            message: e.to_string(),
        })?;
        Ok(Self {
            source_path,
            output_path,
            code,
        })
    }
}

/// An out-of-process compiler for snippet modules.
pub trait ExternalCompiler: Send + Sync {
    /// Module layout under the working directory.
    fn layout(&self) -> &ModuleLayout;

    /// Write the module tree for `module_id`.
    ///
    /// Idempotent for identical content; different content overwrites.
    fn scaffold(
        &self,
        module_id: &str,
        wrapped_source: &str,
        deps: &[String],
    ) -> Result<ScaffoldedModule, CompilationError> {
        scaffold::scaffold_module(self.layout(), module_id, wrapped_source, deps)
    }

    /// Compile a scaffolded module and read the artifact back.
    ///
    /// Never retried by callers.
    fn compile(&self, module: &ScaffoldedModule) -> Result<CompiledArtifact, CompilationError>;
}
