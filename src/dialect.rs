//! Preview dialects (presets).
//!
//! The dialect decides which blocks are sent to the external compiler and how
//! the preview document is assembled.

use std::fmt;
use std::str::FromStr;

use crate::error::DialectError;
use crate::meta::FileMeta;

/// Language tag of the ahead-of-time compiled dialect.
pub const COMPILED_LANGUAGE: &str = "scala";

/// Flag that marks a compiled-language block as a runnable preview.
pub const PREVIEW_FLAG: &str = "preview";

/// Flavor of preview document assembly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// Plain HTML, CSS and module script.
    #[default]
    Vanilla,
    /// Vanilla plus the utility-CSS browser runtime.
    Tailwind,
    /// JSX/TSX transpiled to plain script, with an import map for the framework.
    React,
    /// Snippets compiled ahead of time by the external compiler.
    ScalaJs,
}

impl Dialect {
    /// All dialects, in selector order.
    pub const ALL: [Dialect; 4] = [Self::Vanilla, Self::Tailwind, Self::React, Self::ScalaJs];

    /// Canonical selector string.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Vanilla => "vanilla",
            Self::Tailwind => "tailwind",
            Self::React => "react",
            Self::ScalaJs => "sjs",
        }
    }

    /// Whether a block must go through out-of-process compilation.
    ///
    /// True for compiled-language blocks carrying the preview flag, in every
    /// dialect: a compiled snippet embedded in a vanilla playground still needs
    /// its script artifact.
    pub fn requires_compilation(self, meta: &FileMeta) -> bool {
        meta.language.eq_ignore_ascii_case(COMPILED_LANGUAGE) && meta.flag(PREVIEW_FLAG)
    }

    /// Whether the preview loads the utility-CSS runtime.
    pub const fn uses_utility_css(self) -> bool {
        matches!(self, Self::Tailwind | Self::React)
    }

    /// Whether the script is transpiled from JSX/TSX before embedding.
    pub const fn transpiles_script(self) -> bool {
        matches!(self, Self::React)
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = DialectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "vanilla" | "plain" | "html" => Ok(Self::Vanilla),
            "tailwind" | "utility" => Ok(Self::Tailwind),
            "react" | "jsx" => Ok(Self::React),
            "sjs" | "scalajs" | "scala" => Ok(Self::ScalaJs),
            _ => Err(DialectError(s.to_string())),
        }
    }
}
