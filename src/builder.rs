//! Virtual file-set builder.
//!
//! Turns the code blocks of one playground into a [`FileSet`]:
//!
//! 1. parse every block's meta
//! 2. process blocks independently (parallel with the `batch` feature):
//!    read `file=` references, compile compiled-language previews
//! 3. merge in document order: allocate names, add generated files, resolve
//!    focus
//!
//! Per-block problems are collected as [`BlockFailure`]s. Only a failure to
//! create the generated-modules root aborts the build.
//!
//! # Example
//!
//! ```ignore
//! use playground_batch::{CodeBlock, Dialect, FileSetBuilder};
//!
//! let result = FileSetBuilder::new(cwd)
//!     .dialect(Dialect::ScalaJs)
//!     .build(&[CodeBlock::new("scala", "preview", r#"div("hello")"#)])?;
//! println!("{}", result.files.to_json());
//! ```

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::compile::SnippetCompiler;
use crate::config::Config;
use crate::diagnostic::{as_line_comments, format_compile_failure, DiagnosticOptions};
use crate::dialect::Dialect;
use crate::error::{BlockError, BuildError, FileNotFoundError};
use crate::fileset::{rooted, FileSet, PendingFile};
use crate::meta::{self, FileMeta};
use crate::template::{self, TemplateKind, TemplateParams};

/// Path of the compiled script.
pub const SCRIPT_PATH: &str = "/index.js";

/// Path of the compilation error marker.
pub const ERROR_PATH: &str = "/error.js";

/// Path of the generated default stylesheet.
pub const STYLES_PATH: &str = "/styles.css";

/// Stylesheet paths that suppress the default one.
const STYLE_PATHS: [&str; 2] = ["/styles.css", "/index.css"];

/// Centered layout added next to compiled previews.
pub const DEFAULT_STYLESHEET: &str = "html, body {
  width: 100%;
  height: 100%;
  margin: 0;
}

body {
  display: flex;
  justify-content: center;
  align-items: center;
  font-family: system-ui, -apple-system, sans-serif;
}

#root {
  padding: 2rem;
}
";

// =============================================================================
// Input and Output
// =============================================================================

/// One fenced code block, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeBlock {
    /// Language tag of the fence.
    pub language: String,
    /// Meta string after the language tag.
    pub meta: String,
    /// Inline source.
    pub source: String,
}

impl CodeBlock {
    /// Create a code block.
    pub fn new(language: impl Into<String>, meta: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            meta: meta.into(),
            source: source.into(),
        }
    }
}

/// A recovered failure, tagged with the block it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockFailure {
    /// Index of the block in the input.
    pub index: usize,
    /// What went wrong.
    pub error: BlockError,
}

/// Result of [`FileSetBuilder::build`].
#[derive(Debug, Clone, Default)]
pub struct BuildResult {
    /// The resolved file set.
    pub files: FileSet,
    /// Recovered per-block failures, in block order.
    pub failures: Vec<BlockFailure>,
}

impl BuildResult {
    /// Whether every block was processed without failure.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

// =============================================================================
// FileSetBuilder
// =============================================================================

/// Builds the file set of one playground.
#[derive(Debug, Clone)]
pub struct FileSetBuilder {
    cwd: PathBuf,
    dialect: Dialect,
    config: Config,
    compiler: Option<Arc<SnippetCompiler>>,
}

impl FileSetBuilder {
    /// Create a builder resolving `file=` references and modules against `cwd`.
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            dialect: Dialect::default(),
            config: Config::default(),
            compiler: None,
        }
    }

    /// Set the preview dialect.
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Set the configuration used when no compiler is attached.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Share a snippet compiler (and its cache) across builds.
    ///
    /// Without one, a Mill-backed compiler is created per build when a block
    /// needs compiling.
    pub fn with_compiler(mut self, compiler: Arc<SnippetCompiler>) -> Self {
        self.compiler = Some(compiler);
        self
    }

    /// Build the file set for `blocks`.
    pub fn build(&self, blocks: &[CodeBlock]) -> Result<BuildResult, BuildError> {
        let metas: Vec<FileMeta> = blocks
            .iter()
            .map(|block| meta::parse(&block.language, &block.meta))
            .collect();

        let owned;
        let compiler = match &self.compiler {
            _ if !metas.iter().any(|m| self.dialect.requires_compilation(m)) => None,
            Some(shared) => Some(shared.as_ref()),
            None => {
                owned = SnippetCompiler::mill(self.cwd.clone(), &self.config);
                Some(&owned)
            }
        };

        if let Some(compiler) = compiler {
            let layout = compiler.layout();
            layout.ensure_root().map_err(|source| BuildError::ModulesRoot {
                path: layout.modules_root(),
                source,
            })?;
        }

        let process = |(index, (block, meta)): (usize, (&CodeBlock, &FileMeta))| {
            self.process_block(index, block, meta, compiler)
        };

        #[cfg(feature = "batch")]
        let outputs: Vec<BlockOutput> = {
            use rayon::prelude::*;
            blocks.par_iter().zip(&metas).enumerate().map(process).collect()
        };
        #[cfg(not(feature = "batch"))]
        let outputs: Vec<BlockOutput> = blocks.iter().zip(&metas).enumerate().map(process).collect();

        let result = merge(outputs);
        tracing::debug!(
            files = result.files.len(),
            failures = result.failures.len(),
            dialect = %self.dialect,
            "built playground file set"
        );
        Ok(result)
    }

    fn process_block(
        &self,
        index: usize,
        block: &CodeBlock,
        meta: &FileMeta,
        compiler: Option<&SnippetCompiler>,
    ) -> BlockOutput {
        let mut failures: Vec<BlockError> = meta.errors.iter().cloned().map(Into::into).collect();
        let mut code = block.source.clone();
        let mut name = meta.name.clone();
        let mut readable = true;

        if let Some(file) = &meta.file {
            let path = self.cwd.join(file);
            match fs::read_to_string(&path) {
                Ok(text) => code = text,
                Err(err) => {
                    tracing::warn!(block = index, path = %path.display(), %err, "referenced file unreadable");
                    code.clear();
                    readable = false;
                    failures.push(FileNotFoundError { path: path.clone() }.into());
                }
            }
            if name.is_none() {
                name = path.file_name().map(|n| n.to_string_lossy().into_owned());
            }
        }

        let mut artifact = None;
        let mut display = code;
        if let Some(compiler) = compiler.filter(|_| readable && self.dialect.requires_compilation(meta)) {
            let params = TemplateParams {
                imports: meta.attr_list("imports"),
                deps: meta.attr_list("deps"),
            };
            let template_name = meta.attr_str("template");
            match compiler.compile_snippet(&display, template_name, &params) {
                Ok(snippet) => {
                    if meta.flag("show-imports") {
                        display = snippet.wrapped;
                    }
                    artifact = Some(Artifact::Script(snippet.artifact.code));
                }
                Err(err) => {
                    tracing::warn!(block = index, %err, "snippet compilation failed");
                    if meta.flag("show-imports") {
                        let kind = TemplateKind::select(template_name, &display);
                        display = template::apply(&display, kind, &params);
                    }
                    let text = format_compile_failure(&err, &DiagnosticOptions::plain());
                    artifact = Some(Artifact::Error(text));
                    failures.push(err.into());
                }
            }
        }

        BlockOutput {
            display: Draft {
                dir: meta.dir.clone().filter(|d| !d.is_empty()),
                name,
                extension: extension_for(&meta.language),
                code: display,
                hidden: meta.hidden,
                active: meta.active,
                language: meta.language.clone(),
            },
            artifact,
            failures,
        }
    }
}

/// Build the file set of one playground with a Mill-backed compiler.
///
/// Shorthand for `FileSetBuilder::new(cwd).dialect(dialect).build(blocks)`.
pub fn build_file_set(
    blocks: &[CodeBlock],
    cwd: impl Into<PathBuf>,
    dialect: Dialect,
) -> Result<BuildResult, BuildError> {
    FileSetBuilder::new(cwd).dialect(dialect).build(blocks)
}

// =============================================================================
// Merge
// =============================================================================

/// A display file whose path is not decided yet.
struct Draft {
    dir: Option<String>,
    name: Option<String>,
    extension: String,
    code: String,
    hidden: bool,
    active: Option<bool>,
    language: String,
}

impl Draft {
    fn explicit_path(&self) -> Option<String> {
        self.name.as_deref().map(|name| join_dir(self.dir.as_deref(), name))
    }
}

enum Artifact {
    Script(String),
    Error(String),
}

struct BlockOutput {
    display: Draft,
    artifact: Option<Artifact>,
    failures: Vec<BlockError>,
}

fn merge(outputs: Vec<BlockOutput>) -> BuildResult {
    let mut taken: FxHashSet<String> = outputs
        .iter()
        .filter_map(|out| out.display.explicit_path())
        .collect();
    let mut counters: FxHashMap<String, usize> = FxHashMap::default();
    let mut pending = Vec::with_capacity(outputs.len() + 1);
    let mut failures = Vec::new();
    let mut scripts = 0usize;

    for (index, out) in outputs.into_iter().enumerate() {
        let draft = out.display;
        let path = match draft.explicit_path() {
            Some(path) => path,
            None => allocate(draft.dir.as_deref(), &draft.extension, &mut taken, &mut counters),
        };
        pending.push(
            PendingFile::new(path, draft.code, draft.language)
                .hidden(draft.hidden)
                .active(draft.active),
        );

        match out.artifact {
            Some(Artifact::Script(code)) => {
                scripts += 1;
                if scripts > 1 {
                    tracing::warn!(block = index, "several compiled previews, the last script wins");
                }
                pending.push(PendingFile::new(SCRIPT_PATH, code, "js").hidden(true).active(Some(false)));
            }
            Some(Artifact::Error(text)) => {
                let code = as_line_comments(&format!("Compilation failed\n{text}"));
                pending.push(PendingFile::new(ERROR_PATH, code, "js").active(Some(true)));
            }
            None => {}
        }

        failures.extend(out.failures.into_iter().map(|error| BlockFailure { index, error }));
    }

    if scripts > 0 && !pending.iter().any(|f| STYLE_PATHS.contains(&f.path.as_str())) {
        pending.push(PendingFile::new(STYLES_PATH, DEFAULT_STYLESHEET, "css").active(Some(false)));
    }

    BuildResult {
        files: FileSet::from_pending(pending),
        failures,
    }
}

/// Next free `file.<ext>`, `file2.<ext>`, ... for an anonymous block.
fn allocate(
    dir: Option<&str>,
    extension: &str,
    taken: &mut FxHashSet<String>,
    counters: &mut FxHashMap<String, usize>,
) -> String {
    let counter = counters.entry(extension.to_string()).or_insert(0);
    loop {
        *counter += 1;
        let name = match *counter {
            1 => format!("file.{extension}"),
            n => format!("file{n}.{extension}"),
        };
        let path = join_dir(dir, &name);
        if taken.insert(path.clone()) {
            return path;
        }
    }
}

fn join_dir(dir: Option<&str>, name: &str) -> String {
    let name = name.trim_start_matches('/');
    match dir {
        Some(dir) => rooted(format!("{dir}/{name}")),
        None => rooted(name.to_string()),
    }
}

/// File extension for a fence language.
pub fn extension_for(language: &str) -> String {
    let lower = language.to_ascii_lowercase();
    let ext = match lower.as_str() {
        "js" | "javascript" | "mjs" => "js",
        "jsx" => "jsx",
        "ts" | "typescript" => "ts",
        "tsx" => "tsx",
        "css" => "css",
        "html" | "htm" => "html",
        "scala" | "sc" => "scala",
        "json" => "json",
        "md" | "markdown" | "mdx" => "md",
        "sh" | "bash" | "shell" | "zsh" => "sh",
        "" => "txt",
        other if other.chars().all(|c| c.is_ascii_alphanumeric()) => other,
        _ => "txt",
    };
    ext.to_string()
}

// =============================================================================
// Tests
// =============================================================================
