//! Runtime configuration for the playground pipeline.
//!
//! Use [`ConfigBuilder`] to override the compiler executable, timeouts, or the
//! on-disk layout. [`Config::default`] matches the conventional project layout:
//!
//! ```text
//! <cwd>/
//! ├── .cache/playground/manifest.json      compile cache manifest
//! ├── demos/autogen/h<hash>/               one generated module per snippet
//! │   ├── package.mill
//! │   └── src/Main.scala
//! └── out/demos/autogen/h<hash>/fullLinkJS.dest/main.js
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default subprocess timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Default cap on captured stdout/stderr, per stream.
pub const DEFAULT_OUTPUT_LIMIT: usize = 64 * 1024;

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Compiler executable. `None` picks the `mill` launcher script in the
    /// working directory if there is one, `mill` from `PATH` otherwise.
    pub compiler: Option<PathBuf>,
    /// Arguments placed before the target (`--no-server`, `-i`).
    pub compiler_args: Vec<String>,
    /// Kill the compiler after this long and report a timeout.
    pub timeout: Duration,
    /// Maximum bytes kept from each of stdout and stderr.
    pub output_limit: usize,
    /// Generated-modules root, relative to the working directory.
    pub modules_dir: PathBuf,
    /// Compiler output root, relative to the working directory.
    pub out_dir: PathBuf,
    /// Cache directory holding the manifest, relative to the working directory.
    pub cache_dir: PathBuf,
    /// Extra environment variables for the compiler process.
    pub env: Vec<(String, String)>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            compiler: None,
            compiler_args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            output_limit: DEFAULT_OUTPUT_LIMIT,
            modules_dir: PathBuf::from("demos/autogen"),
            out_dir: PathBuf::from("out"),
            cache_dir: PathBuf::from(".cache/playground"),
            env: Vec::new(),
        }
    }
}

impl Config {
    /// Resolve the compiler executable for a working directory.
    pub fn compiler_for(&self, cwd: &Path) -> PathBuf {
        match &self.compiler {
            Some(path) => path.clone(),
            None if cwd.join("mill").is_file() => cwd.join("mill"),
            None => PathBuf::from("mill"),
        }
    }
}

/// Configuration builder for fluent API.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    compiler: Option<PathBuf>,
    compiler_args: Vec<String>,
    timeout: Option<Duration>,
    output_limit: Option<usize>,
    modules_dir: Option<PathBuf>,
    out_dir: Option<PathBuf>,
    cache_dir: Option<PathBuf>,
    env: Vec<(String, String)>,
}

impl ConfigBuilder {
    /// Create a new configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the compiler executable.
    ///
    /// # Example
    ///
    /// ```
    /// use playground_batch::config::ConfigBuilder;
    ///
    /// let config = ConfigBuilder::new().compiler("/opt/mill/bin/mill").build();
    /// assert!(config.compiler.is_some());
    /// ```
    pub fn compiler(mut self, path: impl Into<PathBuf>) -> Self {
        self.compiler = Some(path.into());
        self
    }

    /// Add an argument placed before the target.
    pub fn compiler_arg(mut self, arg: impl Into<String>) -> Self {
        self.compiler_args.push(arg.into());
        self
    }

    /// Set the subprocess timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the per-stream captured output limit in bytes.
    pub fn output_limit(mut self, bytes: usize) -> Self {
        self.output_limit = Some(bytes);
        self
    }

    /// Set the generated-modules root (relative to the working directory).
    pub fn modules_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.modules_dir = Some(dir.into());
        self
    }

    /// Set the compiler output root (relative to the working directory).
    pub fn out_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.out_dir = Some(dir.into());
        self
    }

    /// Set the cache directory (relative to the working directory).
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Add an environment variable for the compiler process.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Build the configuration, filling unset fields with defaults.
    pub fn build(self) -> Config {
        let default = Config::default();
        Config {
            compiler: self.compiler.or(default.compiler),
            compiler_args: self.compiler_args,
            timeout: self.timeout.unwrap_or(default.timeout),
            output_limit: self.output_limit.unwrap_or(default.output_limit),
            modules_dir: self.modules_dir.unwrap_or(default.modules_dir),
            out_dir: self.out_dir.unwrap_or(default.out_dir),
            cache_dir: self.cache_dir.unwrap_or(default.cache_dir),
            env: self.env,
        }
    }
}
