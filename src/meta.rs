//! Code fence metadata parsing.
//!
//! A fence such as
//!
//! ```text
//! ```scala preview template=component imports="scala.util.Random"
//! ```
//!
//! is turned into a [`FileMeta`]: the language tag is token zero, the rest of
//! the meta string is split on runs of whitespace and commas.
//!
//! # Token Grammar
//!
//! | Token            | Effect                                              |
//! |------------------|-----------------------------------------------------|
//! | `index.js`       | sets `name` (last filename token wins)              |
//! | `hidden`         | sets a known boolean field to `true`                |
//! | `key=true/false` | boolean attribute                                   |
//! | `key=value`      | string attribute, surrounding quotes removed        |
//! | anything else    | opaque flag set to `true`                           |
//!
//! Parsing never fails. Malformed tokens are kept as opaque flags and the
//! problem is recorded in [`FileMeta::errors`].

use rustc_hash::FxHashMap;

use crate::error::MetaError;

// =============================================================================
// MetaValue
// =============================================================================

/// Value of an open `key=value` attribute or a bare flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaValue {
    /// `key=true`, `key=false`, or a bare flag (`true`).
    Bool(bool),
    /// Any other literal, kept verbatim. Numbers are not coerced.
    Str(String),
}

impl MetaValue {
    /// Coerce the two boolean literals, keep everything else as a string.
    fn from_literal(raw: &str) -> Self {
        match raw {
            "true" => Self::Bool(true),
            "false" => Self::Bool(false),
            other => Self::Str(other.to_string()),
        }
    }

    /// Truthiness: `Bool(b)` is `b`, a string is truthy when non-empty.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Str(s) => !s.is_empty(),
        }
    }

    /// The string payload, if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            Self::Bool(_) => None,
        }
    }
}

// =============================================================================
// FileMeta
// =============================================================================

/// Structured attributes of one code fence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileMeta {
    /// Language tag, or a `lang=`/`language=` override.
    pub language: String,
    /// Explicit filename (may contain directory segments).
    pub name: Option<String>,
    /// External path to read the code from, relative to the working directory.
    pub file: Option<String>,
    /// Directory prefix for the virtual path.
    pub dir: Option<String>,
    /// Hide the file from the tab strip.
    pub hidden: bool,
    /// Explicit focus request; `None` means "let resolution decide".
    pub active: Option<bool>,
    /// Open attributes and unrecognized flags.
    pub attrs: FxHashMap<String, MetaValue>,
    /// Tokens that were recovered as opaque flags.
    pub errors: Vec<MetaError>,
}

impl FileMeta {
    /// Look up an open attribute.
    pub fn attr(&self, key: &str) -> Option<&MetaValue> {
        self.attrs.get(key)
    }

    /// Whether an open attribute is present and truthy.
    pub fn flag(&self, key: &str) -> bool {
        self.attrs.get(key).is_some_and(MetaValue::is_truthy)
    }

    /// String value of an open attribute.
    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).and_then(MetaValue::as_str)
    }

    /// List attribute. Commas split tokens before they get here, so items are
    /// separated by `;` or `|` (`imports=scala.util.Random;scala.math.*`).
    pub fn attr_list(&self, key: &str) -> Vec<String> {
        self.attr_str(key)
            .map(|raw| {
                raw.split([',', ';', '|'])
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn assign(&mut self, key: &str, raw: &str, token: &str) {
        let value = MetaValue::from_literal(raw);
        match key {
            "name" => self.name = Some(raw.to_string()),
            "file" => self.file = Some(raw.to_string()),
            "dir" => self.dir = Some(raw.trim_matches('/').to_string()),
            "lang" | "language" => self.language = raw.to_string(),
            "hidden" | "active" => match value {
                MetaValue::Bool(b) if key == "hidden" => self.hidden = b,
                MetaValue::Bool(b) => self.active = Some(b),
                MetaValue::Str(_) => {
                    self.errors.push(MetaError::InvalidBoolean {
                        token: token.to_string(),
                    });
                    self.attrs.insert(token.to_string(), MetaValue::Bool(true));
                }
            },
            _ => {
                self.attrs.insert(key.to_string(), value);
            }
        }
    }

    fn set_flag(&mut self, token: &str) {
        match token {
            "hidden" => self.hidden = true,
            "active" => self.active = Some(true),
            _ => {
                self.attrs.insert(token.to_string(), MetaValue::Bool(true));
            }
        }
    }
}

// =============================================================================
// Parsing
// =============================================================================

/// Parse a language tag and meta string into a [`FileMeta`].
///
/// Pure: parsing the same input twice yields equal results.
///
/// # Example
///
/// ```
/// use playground_batch::meta::parse;
///
/// let meta = parse("css", "styles.css hidden");
/// assert_eq!(meta.language, "css");
/// assert_eq!(meta.name.as_deref(), Some("styles.css"));
/// assert!(meta.hidden);
/// ```
pub fn parse(language_tag: &str, meta_text: &str) -> FileMeta {
    let mut meta = FileMeta::default();
    let mut tokens = tokenize(language_tag).chain(tokenize(meta_text));

    if let Some(language) = tokenize(language_tag).next() {
        meta.language = language.to_string();
        tokens.next();
    }

    for token in tokens {
        match token.split_once('=') {
            Some(("", _)) => {
                meta.errors.push(MetaError::EmptyKey {
                    token: token.to_string(),
                });
                meta.attrs.insert(token.to_string(), MetaValue::Bool(true));
            }
            Some((key, "")) => meta.set_flag(key),
            Some((key, value)) => meta.assign(key, strip_quotes(value), token),
            None if is_filename(token) => meta.name = Some(token.to_string()),
            None => meta.set_flag(token),
        }
    }

    meta
}

fn tokenize(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
}

fn strip_quotes(value: &str) -> &str {
    let value = value.strip_prefix(['"', '\'']).unwrap_or(value);
    value.strip_suffix(['"', '\'']).unwrap_or(value)
}

/// `stem.ext`, optionally under directory segments (`src/App.tsx`).
pub(crate) fn is_filename(token: &str) -> bool {
    let base = token.rsplit('/').next().unwrap_or(token);
    let Some((stem, ext)) = base.rsplit_once('.') else {
        return false;
    };
    let word = |c: char| c.is_alphanumeric() || c == '_';
    !stem.is_empty()
        && !ext.is_empty()
        && stem.chars().all(|c| word(c) || c == '-' || c == '.')
        && ext.chars().all(word)
}

// =============================================================================
// Tests
// =============================================================================
