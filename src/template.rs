//! Compile-unit templates for compiled-language snippets.
//!
//! A snippet in an article is rarely a complete program. Templates wrap it in
//! the boilerplate the compiler needs: a package header, imports, and an entry
//! point that mounts the result on the `#root` element.
//!
//! | Kind        | Wrapping                                                 |
//! |-------------|----------------------------------------------------------|
//! | `basic`     | snippet is an element expression rendered into `#root`   |
//! | `component` | snippet becomes the body of `AppComponent.apply()`       |
//! | `custom`    | package header only, the author writes the entry point   |
//!
//! Output never depends on the content hash, so the hash can be taken over the
//! expanded source itself.

use std::fmt;
use std::str::FromStr;

/// Package every generated compile unit lives in.
pub const PACKAGE: &str = "playground.autogen";

/// Imports added by the `basic` and `component` templates.
pub const DEFAULT_IMPORTS: &[&str] = &["org.scalajs.dom", "com.raquo.laminar.api.L.*"];

/// Selector of the DOM anchor the entry point mounts to.
pub const MOUNT_SELECTOR: &str = "#root";

// =============================================================================
// TemplateKind
// =============================================================================

/// Wrapping strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TemplateKind {
    /// Render the snippet expression into the mount point.
    #[default]
    Basic,
    /// Wrap the snippet as a named unit, instantiate it, then mount.
    Component,
    /// Emit the snippet verbatim after the package header.
    Custom,
}

impl TemplateKind {
    /// Stable template identity, part of the cache key.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Component => "component",
            Self::Custom => "custom",
        }
    }

    /// Best-effort guess from the snippet's content.
    ///
    /// - an entry-point marker or a top-level declaration keyword → `custom`
    /// - no statement separator → `basic` (looks like one expression)
    /// - anything else → `component`
    ///
    /// Ambiguous snippets can be misclassified; an explicit `template=` always
    /// takes precedence.
    pub fn detect(code: &str) -> Self {
        let trimmed = code.trim();
        if trimmed.contains("@main") {
            return Self::Custom;
        }
        if ["def ", "class ", "object ", "trait "]
            .iter()
            .any(|kw| trimmed.contains(kw))
        {
            return Self::Custom;
        }
        if !trimmed.contains(';') {
            return Self::Basic;
        }
        Self::Component
    }

    /// Explicit name if it is known, otherwise [`detect`](Self::detect).
    pub fn select(name: Option<&str>, code: &str) -> Self {
        match name.map(str::parse::<Self>) {
            Some(Ok(kind)) => kind,
            Some(Err(unknown)) => {
                tracing::warn!(template = %unknown, "unknown template, falling back to detection");
                Self::detect(code)
            }
            None => Self::detect(code),
        }
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TemplateKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "basic" | "expression" | "default" => Ok(Self::Basic),
            "component" => Ok(Self::Component),
            "custom" | "standalone" => Ok(Self::Custom),
            other => Err(other.to_string()),
        }
    }
}

// =============================================================================
// TemplateParams
// =============================================================================

/// Extra knobs taken from the fence meta.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TemplateParams {
    /// Additional imports (`scala.util.Random` or `import scala.util.Random`).
    pub imports: Vec<String>,
    /// Additional build dependencies (`org::name::version`).
    pub deps: Vec<String>,
}

impl TemplateParams {
    /// Stable textual form for hashing.
    pub fn fingerprint(&self) -> String {
        format!("imports={}\ndeps={}", self.imports.join(";"), self.deps.join(";"))
    }

    fn import_lines(&self) -> String {
        DEFAULT_IMPORTS
            .iter()
            .map(|s| s.to_string())
            .chain(self.imports.iter().cloned())
            .map(import_line)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// =============================================================================
// Application
// =============================================================================

/// Wrap `user_code` with the given template.
///
/// Pure and deterministic.
pub fn apply(user_code: &str, kind: TemplateKind, params: &TemplateParams) -> String {
    match kind {
        TemplateKind::Basic => format!(
            "package {PACKAGE}\n\n{imports}\n\n@main def app = {{\n  val container = dom.document.querySelector(\"{MOUNT_SELECTOR}\")\n  render(container, {{\n    {body}\n  }})\n}}\n",
            imports = params.import_lines(),
            body = indent(user_code, "    "),
        ),
        TemplateKind::Component => format!(
            "package {PACKAGE}\n\n{imports}\n\nobject AppComponent {{\n  def apply() = {{\n    {body}\n  }}\n}}\n\n@main def app = {{\n  val container = dom.document.querySelector(\"{MOUNT_SELECTOR}\")\n  render(container, AppComponent())\n}}\n",
            imports = params.import_lines(),
            body = indent(user_code, "    "),
        ),
        TemplateKind::Custom => {
            let extra: Vec<String> = params.imports.iter().cloned().map(import_line).collect();
            if extra.is_empty() {
                format!("package {PACKAGE}\n\n{user_code}\n")
            } else {
                format!("package {PACKAGE}\n\n{}\n\n{user_code}\n", extra.join("\n"))
            }
        }
    }
}

fn import_line(import: String) -> String {
    if import.starts_with("import ") {
        import
    } else {
        format!("import {import}")
    }
}

/// Re-indent continuation lines; the first line sits after the template's own indent.
fn indent(code: &str, prefix: &str) -> String {
    code.trim_end()
        .lines()
        .collect::<Vec<_>>()
        .join(&format!("\n{prefix}"))
}

// =============================================================================
// Tests
// =============================================================================
