//! On-disk module tree for the external compiler.
//!
//! ```text
//! <modules_root>/
//! ├── package.mill                 parent package, written once if absent
//! └── h<hash>/
//!     ├── package.mill             build descriptor
//!     └── src/Main.scala           expanded compile unit
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::CompilationError;

/// File name of the build descriptor.
pub const DESCRIPTOR_FILE: &str = "package.mill";

/// Source file inside a module.
pub const SOURCE_FILE: &str = "src/Main.scala";

/// Compiler task producing the linked script.
pub const LINK_TASK: &str = "fullLinkJS";

/// Artifact produced by the link task.
pub const OUTPUT_FILE: &str = "fullLinkJS.dest/main.js";

// =============================================================================
// ModuleLayout
// =============================================================================

/// Paths and names of generated modules under one working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleLayout {
    cwd: PathBuf,
    modules_dir: PathBuf,
    out_dir: PathBuf,
}

impl ModuleLayout {
    /// Layout for `cwd` using the configured directories.
    pub fn new(cwd: impl Into<PathBuf>, config: &Config) -> Self {
        Self {
            cwd: cwd.into(),
            modules_dir: config.modules_dir.clone(),
            out_dir: config.out_dir.clone(),
        }
    }

    /// Working directory.
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Absolute generated-modules root.
    pub fn modules_root(&self) -> PathBuf {
        self.cwd.join(&self.modules_dir)
    }

    /// Module identifier for a content hash.
    pub fn module_id(hash: &str) -> String {
        format!("h{hash}")
    }

    /// Directory of one module.
    pub fn module_dir(&self, module_id: &str) -> PathBuf {
        self.modules_root().join(module_id)
    }

    /// Build descriptor of one module.
    pub fn descriptor_path(&self, module_id: &str) -> PathBuf {
        self.module_dir(module_id).join(DESCRIPTOR_FILE)
    }

    /// Source file of one module.
    pub fn source_path(&self, module_id: &str) -> PathBuf {
        self.module_dir(module_id).join(SOURCE_FILE)
    }

    /// Where the compiler leaves the linked script.
    pub fn output_path(&self, module_id: &str) -> PathBuf {
        self.cwd
            .join(&self.out_dir)
            .join(&self.modules_dir)
            .join(module_id)
            .join(OUTPUT_FILE)
    }

    /// Dotted module path (`demos.autogen.h<hash>`).
    pub fn module_path(&self, module_id: &str) -> String {
        self.package_segments()
            .chain(std::iter::once(module_id.to_string()))
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Target argument for the compiler (`demos.autogen.h<hash>.fullLinkJS`).
    pub fn target(&self, module_id: &str) -> String {
        format!("{}.{LINK_TASK}", self.module_path(module_id))
    }

    fn package_segments(&self) -> impl Iterator<Item = String> + '_ {
        self.modules_dir
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
    }

    /// Create the modules root and its parent package descriptor.
    ///
    /// An existing parent descriptor is left untouched.
    pub fn ensure_root(&self) -> io::Result<PathBuf> {
        let root = self.modules_root();
        fs::create_dir_all(&root)?;
        let parent = root.join(DESCRIPTOR_FILE);
        if !parent.exists() {
            let package = self.package_segments().collect::<Vec<_>>().join(".");
            fs::write(
                &parent,
                format!("package build.{package}\n\nobject `package` extends mill.Module\n"),
            )?;
        }
        Ok(root)
    }
}

// =============================================================================
// Scaffolding
// =============================================================================

/// A module written to disk and ready to compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaffoldedModule {
    /// Module identifier (`h<hash>`).
    pub module_id: String,
    /// Module directory.
    pub dir: PathBuf,
    /// Source file path.
    pub source_path: PathBuf,
    /// Expected artifact path.
    pub output_path: PathBuf,
    /// Compiler target argument.
    pub target: String,
}

impl ScaffoldedModule {
    /// Paths for a module without touching the disk.
    pub fn locate(layout: &ModuleLayout, module_id: &str) -> Self {
        Self {
            module_id: module_id.to_string(),
            dir: layout.module_dir(module_id),
            source_path: layout.source_path(module_id),
            output_path: layout.output_path(module_id),
            target: layout.target(module_id),
        }
    }
}

/// Build descriptor content for a module.
pub fn descriptor(layout: &ModuleLayout, module_id: &str, deps: &[String]) -> String {
    let package = layout.module_path(module_id);
    if deps.is_empty() {
        return format!("package build.{package}\n\nobject `package` extends build.WebModule\n");
    }
    let deps = deps
        .iter()
        .map(|dep| format!("    mvn\"{dep}\""))
        .collect::<Vec<_>>()
        .join(",\n");
    format!(
        "package build.{package}\n\nobject `package` extends build.WebModule {{\n  override def mvnDeps = super.mvnDeps() ++ Seq(\n{deps}\n  )\n}}\n"
    )
}

/// Write a module's descriptor and source.
///
/// Idempotent: files whose content already matches are not rewritten, files
/// with different content are overwritten.
pub fn scaffold_module(
    layout: &ModuleLayout,
    module_id: &str,
    wrapped_source: &str,
    deps: &[String],
) -> Result<ScaffoldedModule, CompilationError> {
    let module = ScaffoldedModule::locate(layout, module_id);
    let scaffold_err = |e: io::Error| CompilationError::Scaffold {
        module: module_id.to_string(),
        message: e.to_string(),
    };

    write_if_changed(
        &layout.descriptor_path(module_id),
        &descriptor(layout, module_id, deps),
    )
    .map_err(scaffold_err)?;
    write_if_changed(&module.source_path, wrapped_source).map_err(scaffold_err)?;

    Ok(module)
}

/// Returns `true` if the file was written.
fn write_if_changed(path: &Path, content: &str) -> io::Result<bool> {
    if fs::read_to_string(path).is_ok_and(|existing| existing == content) {
        return Ok(false);
    }
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(path, content)?;
    Ok(true)
}

/// Module identifiers of every scaffolded module under the root, sorted.
pub fn discover_modules(layout: &ModuleLayout) -> io::Result<Vec<String>> {
    let root = layout.modules_root();
    let entries = match fs::read_dir(&root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut ids = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if entry.file_type()?.is_dir()
            && name.starts_with('h')
            && layout.source_path(&name).is_file()
        {
            ids.push(name);
        }
    }
    ids.sort();
    Ok(ids)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;
    use tempfile::TempDir;

    fn layout(dir: &TempDir) -> ModuleLayout {
        ModuleLayout::new(dir.path(), &Config::default())
    }

    #[test]
    fn test_layout_paths() {
        let dir = TempDir::new().unwrap();
        let layout = layout(&dir);
        let id = ModuleLayout::module_id("abc123");

        assert_eq!(id, "habc123");
        assert_eq!(layout.module_path(&id), "demos.autogen.habc123");
        assert_eq!(layout.target(&id), "demos.autogen.habc123.fullLinkJS");
        assert_eq!(
            layout.output_path(&id),
            dir.path().join("out/demos/autogen/habc123/fullLinkJS.dest/main.js")
        );
        assert_eq!(
            layout.source_path(&id),
            dir.path().join("demos/autogen/habc123/src/Main.scala")
        );
    }

    #[test]
    fn test_ensure_root_keeps_existing_parent() {
        let dir = TempDir::new().unwrap();
        let layout = layout(&dir);

        let root = layout.ensure_root().unwrap();
        let parent = root.join(DESCRIPTOR_FILE);
        assert!(fs::read_to_string(&parent).unwrap().starts_with("package build.demos.autogen"));

        fs::write(&parent, "custom").unwrap();
        layout.ensure_root().unwrap();
        assert_eq!(fs::read_to_string(&parent).unwrap(), "custom");
    }

    #[test]
    fn test_descriptor_with_deps() {
        let dir = TempDir::new().unwrap();
        let out = descriptor(&layout(&dir), "h1", &["com.raquo::laminar::17.2.1".into()]);
        assert!(out.starts_with("package build.demos.autogen.h1\n"));
        assert!(out.contains("mvn\"com.raquo::laminar::17.2.1\""));
    }

    #[test]
    fn test_scaffold_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let layout = layout(&dir);

        let module = scaffold_module(&layout, "h1", "package a\n", &[]).unwrap();
        let mtime = |p: &Path| -> SystemTime { fs::metadata(p).unwrap().modified().unwrap() };
        let first = mtime(&module.source_path);

        let again = scaffold_module(&layout, "h1", "package a\n", &[]).unwrap();
        assert_eq!(again, module);
        assert_eq!(mtime(&module.source_path), first);

        scaffold_module(&layout, "h1", "package b\n", &[]).unwrap();
        assert_eq!(fs::read_to_string(&module.source_path).unwrap(), "package b\n");
    }

    #[test]
    fn test_discover_modules() {
        let dir = TempDir::new().unwrap();
        let layout = layout(&dir);
        assert!(discover_modules(&layout).unwrap().is_empty());

        scaffold_module(&layout, "hbbb", "b", &[]).unwrap();
        scaffold_module(&layout, "haaa", "a", &[]).unwrap();
        fs::create_dir_all(layout.modules_root().join("notes")).unwrap();
        fs::create_dir_all(layout.modules_root().join("hempty")).unwrap();

        assert_eq!(discover_modules(&layout).unwrap(), ["haaa", "hbbb"]);
    }
}
