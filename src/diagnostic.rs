//! Human-readable rendering of compilation failures.
//!
//! The same text ends up in three places: terminal logs (colored), the
//! visible `/error.js` marker file, and the inline error artifact of the
//! preview document (both plain).
//!
//! # Example Output
//!
//! ```text
//! error: compiler exited with exit status: 1 for demos.autogen.h3f2a9c01b7de.fullLinkJS
//!   │ [error] Main.scala:8:5: Not found: dvi
//!   │ [error]     dvi("hello")
//!   │ ... 14 more lines
//! ```

use std::fmt::Write;

use crate::error::CompilationError;

// ============================================================================
// Diagnostic Options
// ============================================================================

/// Default number of captured output lines shown.
pub const DEFAULT_MAX_LINES: usize = 40;

/// Options for controlling failure formatting.
///
/// # Example
///
/// ```
/// use playground_batch::diagnostic::DiagnosticOptions;
///
/// // Plain text for files and HTML
/// let opts = DiagnosticOptions::plain().with_max_lines(10);
/// assert!(!opts.colored);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagnosticOptions {
    /// Whether to use ANSI colors in output.
    pub colored: bool,
    /// Captured output lines kept before eliding the rest.
    pub max_lines: usize,
}

impl Default for DiagnosticOptions {
    fn default() -> Self {
        Self {
            colored: true,
            max_lines: DEFAULT_MAX_LINES,
        }
    }
}

impl DiagnosticOptions {
    /// Create options for colored terminal output.
    pub fn colored() -> Self {
        Self::default()
    }

    /// Create options for plain text output (no ANSI colors).
    pub fn plain() -> Self {
        Self {
            colored: false,
            ..Self::default()
        }
    }

    /// Set whether to use colors.
    pub fn with_colored(mut self, colored: bool) -> Self {
        self.colored = colored;
        self
    }

    /// Set the captured output line limit.
    pub fn with_max_lines(mut self, max_lines: usize) -> Self {
        self.max_lines = max_lines;
        self
    }
}

// ============================================================================
// Coloring
// ============================================================================

#[derive(Clone, Copy)]
enum Tone {
    Error,
    Help,
    Dim,
}

#[cfg(feature = "colored-diagnostics")]
fn colorize(text: &str, tone: Tone) -> String {
    use owo_colors::OwoColorize;
    match tone {
        Tone::Error => text.red().bold().to_string(),
        Tone::Help => text.cyan().to_string(),
        Tone::Dim => text.dimmed().to_string(),
    }
}

#[cfg(not(feature = "colored-diagnostics"))]
fn colorize(text: &str, _tone: Tone) -> String {
    text.to_owned()
}

fn paint(options: &DiagnosticOptions, text: &str, tone: Tone) -> String {
    if options.colored {
        colorize(text, tone)
    } else {
        text.to_owned()
    }
}

// ============================================================================
// Formatting
// ============================================================================

/// Format a compilation failure for display.
pub fn format_compile_failure(error: &CompilationError, options: &DiagnosticOptions) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}: {error}", paint(options, "error", Tone::Error));

    if let Some(captured) = error.captured_output() {
        let bar = paint(options, "│", Tone::Dim);
        let lines: Vec<&str> = captured.lines().collect();
        for line in lines.iter().take(options.max_lines) {
            let _ = writeln!(out, "  {bar} {line}");
        }
        if lines.len() > options.max_lines {
            let more = format!("... {} more lines", lines.len() - options.max_lines);
            let _ = writeln!(out, "  {bar} {}", paint(options, &more, Tone::Dim));
        }
    }

    if let Some(hint) = hint(error) {
        let _ = writeln!(out, "{}: {hint}", paint(options, "help", Tone::Help));
    }

    out.truncate(out.trim_end().len());
    out
}

fn hint(error: &CompilationError) -> Option<&'static str> {
    match error {
        CompilationError::Spawn { .. } => {
            Some("install mill, put a `mill` launcher in the working directory, or set `Config::compiler`")
        }
        CompilationError::Timeout { .. } => Some("raise `Config::timeout` for slow first builds"),
        CompilationError::MissingOutput { .. } => {
            Some("the link task succeeded without writing main.js; check the module's build descriptor")
        }
        _ => None,
    }
}

/// Prefix every line with `// ` so the text is a valid script.
pub fn as_line_comments(text: &str) -> String {
    text.lines()
        .map(|line| {
            if line.is_empty() {
                "//".to_string()
            } else {
                format!("// {line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Inverse of [`as_line_comments`]; lines without the prefix are kept as is.
pub fn strip_line_comments(code: &str) -> String {
    code.lines()
        .map(|line| {
            line.strip_prefix("// ")
                .or_else(|| line.strip_prefix("//"))
                .unwrap_or(line)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(stderr: &str) -> CompilationError {
        CompilationError::Failed {
            target: "demos.autogen.h1.fullLinkJS".into(),
            status: "exit status: 1".into(),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    #[test]
    fn test_plain_has_no_ansi() {
        let text = format_compile_failure(&failed("[error] boom"), &DiagnosticOptions::plain());
        assert!(!text.contains('\x1b'));
        assert!(text.starts_with("error: compiler exited with exit status: 1"));
        assert!(text.contains("│ [error] boom"));
    }

    #[test]
    fn test_long_output_is_elided() {
        let stderr: String = (0..10).map(|i| format!("line {i}\n")).collect();
        let options = DiagnosticOptions::plain().with_max_lines(3);
        let text = format_compile_failure(&failed(&stderr), &options);
        assert!(text.contains("line 2"));
        assert!(!text.contains("line 3"));
        assert!(text.ends_with("... 7 more lines"));
    }

    #[test]
    fn test_hint_for_spawn_failure() {
        let err = CompilationError::Spawn {
            program: "mill".into(),
            message: "No such file or directory".into(),
        };
        let text = format_compile_failure(&err, &DiagnosticOptions::plain());
        assert!(text.contains("\nhelp: install mill"));
    }

    #[cfg(feature = "colored-diagnostics")]
    #[test]
    fn test_colored_output() {
        let text = format_compile_failure(&failed("x"), &DiagnosticOptions::colored());
        assert!(text.contains('\x1b'));
    }

    #[test]
    fn test_line_comments_round_trip() {
        let text = "error: boom\n\n  │ detail";
        let commented = as_line_comments(text);
        assert!(commented.lines().all(|l| l.starts_with("//")));
        assert_eq!(strip_line_comments(&commented), text);
    }
}
