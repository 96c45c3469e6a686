//! End-to-end compile path for compiled-language snippets.
//!
//! ```text
//! user code ─▶ template::apply ─▶ compute_hash ─▶ cache check
//!                                                   │
//!                      hit + artifact on disk ◀─────┤
//!                                                   ▼ miss
//!                              scaffold ─▶ compile ─▶ record
//! ```
//!
//! # Example
//!
//! ```ignore
//! use playground_batch::{Config, SnippetCompiler, TemplateParams};
//!
//! let compiler = SnippetCompiler::mill(cwd, &Config::default());
//! let snippet = compiler.compile_snippet(r#"div("hi")"#, None, &TemplateParams::default())?;
//! println!("{} ({} bytes)", snippet.hash, snippet.artifact.code.len());
//! ```
//!
//! # Coalescing
//!
//! Concurrent requests for the same hash share one in-flight compilation.
//! The first caller runs the compiler; the others block on the same
//! [`OnceLock`] and receive a clone of its result. Entries are removed once
//! the result is available, so the map only holds running compilations.

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::cache::{compute_hash, CompileCache};
use crate::compiler::{
    discover_modules, CompiledArtifact, ExternalCompiler, MillCompiler, ModuleLayout,
    ScaffoldedModule,
};
use crate::config::Config;
use crate::error::CompilationError;
use crate::template::{self, TemplateKind, TemplateParams};

type Outcome = Result<CompiledArtifact, CompilationError>;
type InFlight = Arc<OnceLock<Outcome>>;

// =============================================================================
// Result Types
// =============================================================================

/// A compiled snippet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledSnippet {
    /// Content hash (also names the module, `h<hash>`).
    pub hash: String,
    /// Template that was applied.
    pub template: TemplateKind,
    /// Template-expanded source that was compiled.
    pub wrapped: String,
    /// Linked script.
    pub artifact: CompiledArtifact,
    /// `true` if the artifact came from the cache without invoking the compiler.
    pub cache_hit: bool,
}

/// Outcome of [`SnippetCompiler::precompile_all`].
#[derive(Debug, Default)]
pub struct PrecompileReport {
    /// Modules whose cached artifact was still valid.
    pub up_to_date: Vec<String>,
    /// Modules compiled in this run.
    pub compiled: Vec<String>,
    /// Modules whose compilation failed.
    pub failed: Vec<(String, CompilationError)>,
}

impl PrecompileReport {
    /// Whether every module is usable.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

// =============================================================================
// SnippetCompiler
// =============================================================================

/// Template, cache and external compiler wired together for one working
/// directory.
pub struct SnippetCompiler {
    compiler: Arc<dyn ExternalCompiler>,
    cache: CompileCache,
    in_flight: Mutex<FxHashMap<String, InFlight>>,
}

impl SnippetCompiler {
    /// Wire an adapter to a cache.
    pub fn new(compiler: Arc<dyn ExternalCompiler>, cache: CompileCache) -> Self {
        Self {
            compiler,
            cache,
            in_flight: Mutex::new(FxHashMap::default()),
        }
    }

    /// Mill adapter and cache for `cwd`.
    pub fn mill(cwd: impl Into<PathBuf>, config: &Config) -> Self {
        let cwd = cwd.into();
        Self::new(
            Arc::new(MillCompiler::new(cwd.clone(), config)),
            CompileCache::new(cwd, config),
        )
    }

    /// Module layout of the adapter.
    pub fn layout(&self) -> &ModuleLayout {
        self.compiler.layout()
    }

    /// The compile cache.
    pub fn cache(&self) -> &CompileCache {
        &self.cache
    }

    /// Template-expand, hash, and compile a snippet, reusing cached output.
    ///
    /// `template` is the explicit template name from the fence meta; `None`
    /// falls back to content detection.
    pub fn compile_snippet(
        &self,
        code: &str,
        template: Option<&str>,
        params: &TemplateParams,
    ) -> Result<CompiledSnippet, CompilationError> {
        let kind = TemplateKind::select(template, code);
        let wrapped = template::apply(code, kind, params);
        let hash = compute_hash(&wrapped, kind, params);
        let module = ScaffoldedModule::locate(self.layout(), &ModuleLayout::module_id(&hash));

        if let Some(artifact) = self.cached(&hash, &wrapped, &module) {
            tracing::debug!(%hash, template = %kind, "compile cache hit");
            return Ok(CompiledSnippet {
                hash,
                template: kind,
                wrapped,
                artifact,
                cache_hit: true,
            });
        }

        tracing::debug!(%hash, template = %kind, "compile cache miss");
        let artifact = self.coalesced(&hash, || {
            // Another caller may have finished this hash since the check above.
            if let Some(artifact) = self.cached(&hash, &wrapped, &module) {
                return Ok(artifact);
            }
            let module = self
                .compiler
                .scaffold(&module.module_id, &wrapped, &params.deps)?;
            let artifact = self.compiler.compile(&module)?;
            self.record(&hash, &wrapped, &artifact);
            Ok(artifact)
        })?;

        Ok(CompiledSnippet {
            hash,
            template: kind,
            wrapped,
            artifact,
            cache_hit: false,
        })
    }

    /// Compile every scaffolded module under the generated-modules root that
    /// is not up to date in the cache.
    ///
    /// With the `batch` feature, modules compile in parallel. A module whose
    /// source cannot be read is reported in `failed` and the batch continues.
    pub fn precompile_all(&self) -> std::io::Result<PrecompileReport> {
        let layout = self.layout();
        let mut report = PrecompileReport::default();
        let mut pending = Vec::new();

        for module_id in discover_modules(layout)? {
            let module = ScaffoldedModule::locate(layout, &module_id);
            let source = match fs::read_to_string(&module.source_path) {
                Ok(source) => source,
                Err(err) => {
                    tracing::warn!(module = %module_id, %err, "module source unreadable");
                    let error = CompilationError::ReadSource {
                        path: module.source_path,
                        message: err.to_string(),
                    };
                    report.failed.push((module_id, error));
                    continue;
                }
            };
            let hash = module_id.trim_start_matches('h').to_string();
            if self.cache.should_recompile(&hash, &source, &module.output_path) {
                pending.push((hash, source, module));
            } else {
                report.up_to_date.push(module_id);
            }
        }

        tracing::info!(
            pending = pending.len(),
            up_to_date = report.up_to_date.len(),
            "precompiling modules"
        );

        let compile_one = |(hash, source, module): &(String, String, ScaffoldedModule)| {
            let result = self.coalesced(hash, || {
                let artifact = self.compiler.compile(module)?;
                self.record(hash, source, &artifact);
                Ok(artifact)
            });
            (module.module_id.clone(), result)
        };

        #[cfg(feature = "batch")]
        let results: Vec<_> = {
            use rayon::prelude::*;
            pending.par_iter().map(compile_one).collect()
        };
        #[cfg(not(feature = "batch"))]
        let results: Vec<_> = pending.iter().map(compile_one).collect();

        for (module_id, result) in results {
            match result {
                Ok(_) => report.compiled.push(module_id),
                Err(err) => {
                    tracing::warn!(module = %module_id, %err, "precompile failed");
                    report.failed.push((module_id, err));
                }
            }
        }
        Ok(report)
    }

    /// Cached artifact for `hash`, if the entry and the file are both valid.
    fn cached(&self, hash: &str, wrapped: &str, module: &ScaffoldedModule) -> Option<CompiledArtifact> {
        if self.cache.should_recompile(hash, wrapped, &module.output_path) {
            return None;
        }
        match CompiledArtifact::read(module.source_path.clone(), module.output_path.clone()) {
            Ok(artifact) => Some(artifact),
            Err(err) => {
                tracing::debug!(%hash, %err, "cached artifact unreadable, recompiling");
                None
            }
        }
    }

    fn record(&self, hash: &str, source: &str, artifact: &CompiledArtifact) {
        if let Err(err) = self.cache.record(hash, source, &artifact.output_path) {
            tracing::warn!(%hash, %err, "failed to persist compile cache entry");
        }
    }

    /// Run `compile` once per hash across concurrent callers.
    fn coalesced(&self, hash: &str, compile: impl FnOnce() -> Outcome) -> Outcome {
        let cell = Arc::clone(self.in_flight.lock().entry(hash.to_string()).or_default());
        let outcome = cell.get_or_init(compile).clone();

        let mut in_flight = self.in_flight.lock();
        if in_flight.get(hash).is_some_and(|current| Arc::ptr_eq(current, &cell)) {
            in_flight.remove(hash);
        }
        outcome
    }
}

impl std::fmt::Debug for SnippetCompiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnippetCompiler")
            .field("layout", self.layout())
            .field("cache", &self.cache)
            .field("in_flight", &self.in_flight.lock().len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    /// In-memory stand-in for the external compiler.
    ///
    /// "Compiles" by writing the source back out as a comment; sources
    /// containing `FAIL` produce a compiler error.
    pub(crate) struct FakeCompiler {
        layout: ModuleLayout,
        pub(crate) calls: AtomicUsize,
        delay: Duration,
    }

    impl FakeCompiler {
        pub(crate) fn new(cwd: &std::path::Path) -> Self {
            Self {
                layout: ModuleLayout::new(cwd, &Config::default()),
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            }
        }

        pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ExternalCompiler for FakeCompiler {
        fn layout(&self) -> &ModuleLayout {
            &self.layout
        }

        fn compile(&self, module: &ScaffoldedModule) -> Result<CompiledArtifact, CompilationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            let source = fs::read_to_string(&module.source_path).unwrap();
            if source.contains("FAIL") {
                return Err(CompilationError::Failed {
                    target: module.target.clone(),
                    status: "exit status: 1".into(),
                    stdout: String::new(),
                    stderr: "[error] Main.scala:8:5: Not found: FAIL".into(),
                });
            }
            fs::create_dir_all(module.output_path.parent().unwrap()).unwrap();
            let lines: Vec<_> = source.lines().map(|l| format!("// {l}")).collect();
            fs::write(&module.output_path, lines.join("\n")).unwrap();
            CompiledArtifact::read(module.source_path.clone(), module.output_path.clone())
        }
    }

    fn setup(dir: &TempDir, fake: FakeCompiler) -> (Arc<FakeCompiler>, SnippetCompiler) {
        let fake = Arc::new(fake);
        let compiler = SnippetCompiler::new(
            fake.clone(),
            CompileCache::new(dir.path(), &Config::default()),
        );
        (fake, compiler)
    }

    #[test]
    fn test_second_compile_hits_cache() {
        let dir = TempDir::new().unwrap();
        let (fake, compiler) = setup(&dir, FakeCompiler::new(dir.path()));
        let params = TemplateParams::default();

        let first = compiler.compile_snippet(r#"div("hi")"#, None, &params).unwrap();
        assert!(!first.cache_hit);
        assert_eq!(fake.calls(), 1);

        let second = compiler.compile_snippet(r#"div("hi")"#, None, &params).unwrap();
        assert!(second.cache_hit);
        assert_eq!(fake.calls(), 1);
        assert_eq!(first.artifact.code, second.artifact.code);
        assert_eq!(first.hash, second.hash);
    }

    #[test]
    fn test_cache_survives_new_process() {
        let dir = TempDir::new().unwrap();
        let params = TemplateParams::default();
        {
            let (_, compiler) = setup(&dir, FakeCompiler::new(dir.path()));
            compiler.compile_snippet("p(\"x\")", None, &params).unwrap();
        }
        let (fake, compiler) = setup(&dir, FakeCompiler::new(dir.path()));
        assert!(compiler.compile_snippet("p(\"x\")", None, &params).unwrap().cache_hit);
        assert_eq!(fake.calls(), 0);
    }

    #[test]
    fn test_template_change_invalidates() {
        let dir = TempDir::new().unwrap();
        let (fake, compiler) = setup(&dir, FakeCompiler::new(dir.path()));
        let params = TemplateParams::default();

        let basic = compiler.compile_snippet("p(\"x\")", Some("basic"), &params).unwrap();
        let component = compiler.compile_snippet("p(\"x\")", Some("component"), &params).unwrap();
        assert_ne!(basic.hash, component.hash);
        assert_eq!(fake.calls(), 2);
    }

    #[test]
    fn test_deleted_output_recompiles() {
        let dir = TempDir::new().unwrap();
        let (fake, compiler) = setup(&dir, FakeCompiler::new(dir.path()));
        let params = TemplateParams::default();

        let first = compiler.compile_snippet("p(\"x\")", None, &params).unwrap();
        fs::remove_file(&first.artifact.output_path).unwrap();

        let second = compiler.compile_snippet("p(\"x\")", None, &params).unwrap();
        assert!(!second.cache_hit);
        assert_eq!(fake.calls(), 2);
    }

    #[test]
    fn test_failure_is_not_cached() {
        let dir = TempDir::new().unwrap();
        let (fake, compiler) = setup(&dir, FakeCompiler::new(dir.path()));
        let params = TemplateParams::default();

        let err = compiler.compile_snippet("div(FAIL)", None, &params).unwrap_err();
        assert!(err.captured_output().unwrap().contains("Not found"));
        assert!(compiler.cache().hashes().is_empty());

        compiler.compile_snippet("div(FAIL)", None, &params).unwrap_err();
        assert_eq!(fake.calls(), 2);
    }

    #[test]
    fn test_concurrent_requests_are_coalesced() {
        let dir = TempDir::new().unwrap();
        let fake = FakeCompiler::new(dir.path()).with_delay(Duration::from_millis(200));
        let (fake, compiler) = setup(&dir, fake);
        let params = TemplateParams::default();

        let codes: Vec<String> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| compiler.compile_snippet("p(\"same\")", None, &params).unwrap()))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap().artifact.code)
                .collect()
        });

        assert_eq!(fake.calls(), 1);
        assert!(codes.windows(2).all(|w| w[0] == w[1]));
        assert!(compiler.in_flight.lock().is_empty());
    }

    #[test]
    fn test_precompile_all() {
        let dir = TempDir::new().unwrap();
        let (fake, compiler) = setup(&dir, FakeCompiler::new(dir.path()));
        let layout = compiler.layout().clone();

        compiler.compile_snippet("p(\"cached\")", None, &TemplateParams::default()).unwrap();
        layout.ensure_root().unwrap();
        crate::compiler::scaffold::scaffold_module(&layout, "h000000000001", "package a\n", &[]).unwrap();
        crate::compiler::scaffold::scaffold_module(&layout, "h000000000002", "FAIL\n", &[]).unwrap();

        let report = compiler.precompile_all().unwrap();
        assert_eq!(report.up_to_date.len(), 1);
        assert_eq!(report.compiled, ["h000000000001"]);
        assert_eq!(report.failed.len(), 1);
        assert!(!report.is_success());
        assert_eq!(fake.calls(), 3);

        let again = compiler.precompile_all().unwrap();
        assert_eq!(again.up_to_date.len(), 2);
        assert!(again.compiled.is_empty());
    }

    #[test]
    fn test_unwritable_cache_dir_still_compiles() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join(".cache")).unwrap();
        fs::write(dir.path().join(".cache/playground"), "not a directory").unwrap();
        let (fake, compiler) = setup(&dir, FakeCompiler::new(dir.path()));
        let params = TemplateParams::default();

        let first = compiler.compile_snippet("p(\"x\")", None, &params).unwrap();
        assert!(!first.cache_hit);

        let second = compiler.compile_snippet("p(\"x\")", None, &params).unwrap();
        assert!(second.cache_hit);
        assert_eq!(fake.calls(), 1);
        assert!(dir.path().join(".cache/playground").is_file());
    }

    #[test]
    fn test_precompile_continues_past_unreadable_source() {
        let dir = TempDir::new().unwrap();
        let (fake, compiler) = setup(&dir, FakeCompiler::new(dir.path()));
        let layout = compiler.layout().clone();

        layout.ensure_root().unwrap();
        crate::compiler::scaffold::scaffold_module(&layout, "h000000000001", "package a\n", &[]).unwrap();
        crate::compiler::scaffold::scaffold_module(&layout, "h000000000002", "package b\n", &[]).unwrap();
        let broken = ScaffoldedModule::locate(&layout, "h000000000002");
        fs::write(&broken.source_path, [0xff, 0xfe, 0x00]).unwrap();

        let report = compiler.precompile_all().unwrap();
        assert_eq!(report.compiled, ["h000000000001"]);
        assert_eq!(report.failed.len(), 1);
        let (module_id, err) = &report.failed[0];
        assert_eq!(module_id, "h000000000002");
        assert!(matches!(err, CompilationError::ReadSource { path, .. } if *path == broken.source_path));
        assert_eq!(fake.calls(), 1);
    }
}
