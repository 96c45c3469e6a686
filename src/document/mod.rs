//! Preview document assembly.
//!
//! Renders a [`FileSet`] into one self-contained HTML document for the
//! sandboxed preview surface.
//!
//! # Role Resolution
//!
//! | Role   | Candidates (first present wins)          | Fallback                    |
//! |--------|------------------------------------------|-----------------------------|
//! | markup | `/index.html`                            | mount point `<div id=root>` |
//! | style  | `/index.css`, `/styles.css`              | empty                       |
//! | script | `/index.js` (react: also `.jsx`, `.tsx`) | empty                       |
//!
//! Missing roles are never an error. Output is a pure function of the file
//! set, dialect and options: no timestamps or random identifiers.
//!
//! Style and script content is embedded as raw text, so a closing
//! `</style` or `</script` inside it is written as `<\/style` or `<\/script`.

mod transpile;

use std::fmt::Write;

use crate::builder::ERROR_PATH;
use crate::diagnostic::strip_line_comments;
use crate::dialect::Dialect;
use crate::fileset::FileSet;

pub use transpile::{transpile, TranspileError};

/// Utility-CSS browser runtime.
pub const UTILITY_CSS_RUNTIME: &str = "https://cdn.jsdelivr.net/npm/@tailwindcss/browser@4";

/// Module import aliases for the component dialect.
pub const IMPORT_MAP: &[(&str, &str)] = &[
    ("react", "https://esm.sh/react@19"),
    ("react-dom", "https://esm.sh/react-dom@19"),
    ("react-dom/client", "https://esm.sh/react-dom@19/client"),
];

const MARKUP_PATHS: &[&str] = &["/index.html"];
const STYLE_PATHS: &[&str] = &["/index.css", "/styles.css"];
const SCRIPT_PATHS: &[&str] = &["/index.js"];
const COMPONENT_SCRIPT_PATHS: &[&str] = &["/index.js", "/index.jsx", "/index.tsx"];

const MOUNT_POINT: &str = r#"<div id="root"></div>"#;

// =============================================================================
// Options
// =============================================================================

/// Extra document customization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssembleOptions {
    /// Raw HTML appended to `<head>` after the dialect's own injections.
    pub head: Vec<String>,
    /// Attributes on the `<html>` element. Values are escaped; names must be
    /// ASCII letters, digits, `-`, `_` or `:` and are skipped otherwise.
    pub html_attrs: Vec<(String, String)>,
}

impl AssembleOptions {
    /// Create empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw HTML to `<head>`.
    pub fn head(mut self, html: impl Into<String>) -> Self {
        self.head.push(html.into());
        self
    }

    /// Add an attribute to `<html>`.
    pub fn html_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.html_attrs.push((name.into(), value.into()));
        self
    }
}

// =============================================================================
// Assembly
// =============================================================================

/// Assemble the preview document with default options.
///
/// # Example
///
/// ```
/// use playground_batch::{assemble, Dialect, FileSet};
///
/// let html = assemble(&FileSet::new(), Dialect::Vanilla);
/// assert!(html.contains("<div id=\"root\"></div>"));
/// ```
pub fn assemble(files: &FileSet, dialect: Dialect) -> String {
    assemble_with(files, dialect, &AssembleOptions::default())
}

/// Assemble the preview document.
pub fn assemble_with(files: &FileSet, dialect: Dialect, options: &AssembleOptions) -> String {
    let css = files.first_code(STYLE_PATHS).unwrap_or_default();
    let markup = files.first_code(MARKUP_PATHS);

    let mut head = String::new();
    if dialect.uses_utility_css() {
        let _ = write!(head, "<script src=\"{UTILITY_CSS_RUNTIME}\"></script>");
    }
    if dialect.transpiles_script() {
        head.push_str(&import_map());
    }
    for extra in &options.head {
        head.push_str(extra);
    }

    let mut body = match (dialect, markup) {
        (Dialect::Vanilla | Dialect::ScalaJs, Some(markup)) => markup.to_string(),
        (Dialect::Vanilla | Dialect::ScalaJs, None) => MOUNT_POINT.to_string(),
        (Dialect::Tailwind | Dialect::React, markup) => {
            format!("{}{MOUNT_POINT}", markup.unwrap_or_default())
        }
    };

    if let Some(error) = files.code(ERROR_PATH) {
        body.insert_str(0, &error_block(&strip_line_comments(error)));
    }

    let script = match dialect {
        Dialect::React => {
            let source = files.first_code(COMPONENT_SCRIPT_PATHS).unwrap_or_default();
            match transpile(source) {
                Ok(code) => code,
                Err(err) => {
                    tracing::warn!(%err, "component script failed to transpile");
                    body.insert_str(0, &error_block(&err.0));
                    String::new()
                }
            }
        }
        _ => files.first_code(SCRIPT_PATHS).unwrap_or_default().to_string(),
    };

    render(&html_attrs(options), css, &head, &body, &script)
}

fn render(attrs: &str, css: &str, head: &str, body: &str, script: &str) -> String {
    let css = guard_raw_text(css, "style");
    let script = guard_raw_text(script, "script");
    format!(
        r#"<!DOCTYPE html>
<html{attrs}>
  <head>
    <meta charset="UTF-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1.0" />
    <style>
      * {{
        box-sizing: border-box;
      }}
      body {{
        margin: 0;
      }}
    </style>
    <style>{css}</style>
    {head}
  </head>
  <body>
    {body}
    <script type="module">{script}</script>
  </body>
</html>
"#
    )
}

fn import_map() -> String {
    let entries = IMPORT_MAP
        .iter()
        .map(|(name, url)| format!("\"{name}\": \"{url}\""))
        .collect::<Vec<_>>()
        .join(", ");
    format!("<script type=\"importmap\">{{\"imports\": {{{entries}}}}}</script>")
}

fn html_attrs(options: &AssembleOptions) -> String {
    options
        .html_attrs
        .iter()
        .filter(|(name, _)| {
            let valid = is_attr_name(name);
            if !valid {
                tracing::warn!(name = %name, "skipping invalid html attribute name");
            }
            valid
        })
        .map(|(name, value)| format!(" {name}=\"{}\"", escape_html(value)))
        .collect()
}

fn is_attr_name(name: &str) -> bool {
    name.starts_with(|c: char| c.is_ascii_alphabetic())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':'))
}

/// Rewrite `</tag` (any case) to `<\/tag` so raw text cannot close its element.
fn guard_raw_text(text: &str, tag: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut copied = 0;
    let mut from = 0;
    while let Some(pos) = text[from..].find("</") {
        let name_start = from + pos + 2;
        let name_end = name_start + tag.len();
        if name_end <= bytes.len()
            && bytes[name_start..name_end].eq_ignore_ascii_case(tag.as_bytes())
        {
            out.push_str(&text[copied..from + pos]);
            out.push_str("<\\/");
            copied = name_start;
        }
        from = name_start;
    }
    out.push_str(&text[copied..]);
    out
}

/// Inline error artifact shown in place of a broken preview.
fn error_block(message: &str) -> String {
    format!(
        "<pre class=\"playground-error\" style=\"color:#b91c1c;background:#fef2f2;padding:1rem;margin:0;white-space:pre-wrap\">{}</pre>",
        escape_html(message)
    )
}

/// Escape text for HTML content and attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fileset::PendingFile;

    fn files(entries: &[(&str, &str)]) -> FileSet {
        FileSet::from_pending(
            entries
                .iter()
                .map(|(path, code)| PendingFile::new(*path, *code, "txt"))
                .collect(),
        )
    }

    #[test]
    fn test_vanilla_defaults() {
        let html = assemble(&FileSet::new(), Dialect::Vanilla);
        assert!(html.starts_with("<!DOCTYPE html>\n<html>"));
        assert!(html.contains(MOUNT_POINT));
        assert!(html.contains("<style></style>"));
        assert!(html.contains("<script type=\"module\"></script>"));
        assert!(!html.contains(UTILITY_CSS_RUNTIME));
    }

    #[test]
    fn test_roles_resolved() {
        let set = files(&[
            ("/index.html", "<main></main>"),
            ("/styles.css", "p{}"),
            ("/index.css", "main{}"),
            ("/index.js", "console.log(1)"),
        ]);
        let html = assemble(&set, Dialect::Vanilla);
        assert!(html.contains("<style>main{}</style>"));
        assert!(html.contains("<main></main>"));
        assert!(!html.contains(MOUNT_POINT));
        assert!(html.contains("<script type=\"module\">console.log(1)</script>"));
    }

    #[test]
    fn test_deterministic() {
        let set = files(&[("/index.js", "x()"), ("/styles.css", "a{}")]);
        for dialect in Dialect::ALL {
            assert_eq!(assemble(&set, dialect), assemble(&set, dialect));
        }
    }

    #[test]
    fn test_tailwind_head_and_mount() {
        let set = files(&[("/index.html", "<p class=\"p-4\">x</p>")]);
        let html = assemble(&set, Dialect::Tailwind);
        assert!(html.contains(UTILITY_CSS_RUNTIME));
        assert!(html.contains("<p class=\"p-4\">x</p><div id=\"root\"></div>"));
        assert!(!html.contains("importmap"));
    }

    #[cfg(feature = "jsx")]
    #[test]
    fn test_react_transpiles_and_maps_imports() {
        let set = files(&[(
            "/index.js",
            "import React from 'react';\nimport { createRoot } from 'react-dom/client';\ncreateRoot(document.getElementById('root')).render(<h1>Hi</h1>);",
        )]);
        let html = assemble(&set, Dialect::React);
        assert!(html.contains("<script type=\"importmap\">"));
        assert!(html.contains("\"react-dom/client\": \"https://esm.sh/react-dom@19/client\""));
        assert!(html.contains("React.createElement"));
        assert!(html.contains(UTILITY_CSS_RUNTIME));
    }

    #[cfg(feature = "jsx")]
    #[test]
    fn test_react_transpile_failure_is_inline() {
        let set = files(&[("/index.js", "const = <div>;")]);
        let html = assemble(&set, Dialect::React);
        assert!(html.contains("class=\"playground-error\""));
        assert!(html.contains("<script type=\"module\"></script>"));
    }

    #[test]
    fn test_compile_error_rendered_escaped() {
        let set = files(&[
            ("/file.scala", "div(<oops>)"),
            (ERROR_PATH, "// Compilation failed\n// error: <bad> & worse"),
        ]);
        let html = assemble(&set, Dialect::ScalaJs);
        assert!(html.contains("Compilation failed\nerror: &lt;bad&gt; &amp; worse</pre>"));
        assert!(html.contains(MOUNT_POINT));
    }

    #[test]
    fn test_options() {
        let options = AssembleOptions::new()
            .head("<meta name=\"x\" />")
            .html_attr("class", "dark \"mode\"");
        let html = assemble_with(&FileSet::new(), Dialect::Vanilla, &options);
        assert!(html.contains("<html class=\"dark &quot;mode&quot;\">"));
        assert!(html.contains("<meta name=\"x\" />"));
    }

    #[test]
    fn test_invalid_attr_names_skipped() {
        let options = AssembleOptions::new()
            .html_attr("data-theme", "dark")
            .html_attr("onload=\"alert(1)\" x", "y")
            .html_attr("", "z")
            .html_attr("xml:lang", "en");
        let html = assemble_with(&FileSet::new(), Dialect::Vanilla, &options);
        assert!(html.contains("<html data-theme=\"dark\" xml:lang=\"en\">"));
        assert!(!html.contains("onload"));
    }

    #[test]
    fn test_script_close_tag_is_neutralized() {
        let set = files(&[(
            "/index.js",
            "document.body.textContent = '</script><b>x</b>';\nlet s = '</SCRIPT>';",
        )]);
        let html = assemble(&set, Dialect::Vanilla);
        assert!(html.contains("textContent = '<\\/script><b>x</b>'"));
        assert!(html.contains("'<\\/SCRIPT>'"));
        assert!(!html.contains("'</script><b>"));
        assert_eq!(html.matches("</script>").count(), 1);
    }

    #[test]
    fn test_style_close_tag_is_neutralized() {
        let set = files(&[("/styles.css", "p::after { content: '</style><h1>injected</h1>'; }")]);
        let html = assemble(&set, Dialect::Vanilla);
        assert!(html.contains("content: '<\\/style><h1>injected</h1>'"));
        assert!(!html.contains("'</style><h1>"));
    }

    #[test]
    fn test_guard_raw_text() {
        assert_eq!(guard_raw_text("a</StYlE>b", "style"), "a<\\/StYlE>b");
        assert_eq!(guard_raw_text("</div></scr", "script"), "</div></scr");
        assert_eq!(guard_raw_text("é</script", "script"), "é<\\/script");
    }
}
