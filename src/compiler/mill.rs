//! Mill subprocess adapter.
//!
//! Runs `<mill> [args..] <module path>.fullLinkJS` in the working directory.
//! Success means exit code 0 and the linked script present at the expected
//! path; anything else is a [`CompilationError`].

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::scaffold::{ModuleLayout, ScaffoldedModule};
use super::{CompiledArtifact, ExternalCompiler};
use crate::config::Config;
use crate::error::CompilationError;

/// Interval between exit checks while the compiler runs.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// How long to wait for output readers after the process exits.
///
/// A daemon spawned by the compiler may inherit the pipes and keep them open.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Adapter invoking the Mill launcher.
#[derive(Debug, Clone)]
pub struct MillCompiler {
    layout: ModuleLayout,
    program: PathBuf,
    args: Vec<String>,
    env: Vec<(String, String)>,
    timeout: Duration,
    output_limit: usize,
}

impl MillCompiler {
    /// Adapter for `cwd` using `config`.
    pub fn new(cwd: impl Into<PathBuf>, config: &Config) -> Self {
        let cwd = cwd.into();
        Self {
            program: config.compiler_for(&cwd),
            layout: ModuleLayout::new(cwd, config),
            args: config.compiler_args.clone(),
            env: config.env.clone(),
            timeout: config.timeout,
            output_limit: config.output_limit,
        }
    }

    /// Executable that will be invoked.
    pub fn program(&self) -> &Path {
        &self.program
    }

    fn command(&self, target: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(target)
            .current_dir(self.layout.cwd())
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

impl ExternalCompiler for MillCompiler {
    fn layout(&self) -> &ModuleLayout {
        &self.layout
    }

    fn compile(&self, module: &ScaffoldedModule) -> Result<CompiledArtifact, CompilationError> {
        let started = Instant::now();
        tracing::info!(target = %module.target, "invoking compiler");

        let mut child = self
            .command(&module.target)
            .spawn()
            .map_err(|e| CompilationError::Spawn {
                program: self.program.display().to_string(),
                message: e.to_string(),
            })?;

        let stdout = child.stdout.take().map(|s| BoundedCapture::spawn(s, self.output_limit));
        let stderr = child.stderr.take().map(|s| BoundedCapture::spawn(s, self.output_limit));

        let status = match wait_with_timeout(|| child.try_wait(), self.timeout) {
            Wait::Exited(status) => status,
            Wait::TimedOut => {
                stop(&mut child);
                tracing::warn!(target = %module.target, timeout = ?self.timeout, "compiler timed out");
                return Err(CompilationError::Timeout {
                    target: module.target.clone(),
                    seconds: self.timeout.as_secs(),
                });
            }
            Wait::PollFailed(err) => {
                stop(&mut child);
                tracing::warn!(target = %module.target, %err, "failed to poll compiler process");
                return Err(CompilationError::Wait {
                    target: module.target.clone(),
                    message: err.to_string(),
                });
            }
        };

        let stdout = stdout.map(BoundedCapture::finish).unwrap_or_default();
        let stderr = stderr.map(BoundedCapture::finish).unwrap_or_default();

        if !status.success() {
            tracing::warn!(target = %module.target, %status, "compiler failed");
            return Err(CompilationError::Failed {
                target: module.target.clone(),
                status: status.to_string(),
                stdout,
                stderr,
            });
        }

        let artifact = CompiledArtifact::read(module.source_path.clone(), module.output_path.clone())?;
        tracing::info!(
            target = %module.target,
            elapsed_ms = started.elapsed().as_millis() as u64,
            bytes = artifact.code.len(),
            "compiled module"
        );
        Ok(artifact)
    }
}

/// How waiting on the compiler process ended.
#[derive(Debug)]
enum Wait {
    Exited(ExitStatus),
    TimedOut,
    PollFailed(io::Error),
}

/// Poll until the process exits, `timeout` elapses, or polling itself fails.
fn wait_with_timeout(
    mut poll: impl FnMut() -> io::Result<Option<ExitStatus>>,
    timeout: Duration,
) -> Wait {
    let deadline = Instant::now() + timeout;
    loop {
        match poll() {
            Ok(Some(status)) => return Wait::Exited(status),
            Ok(None) if Instant::now() >= deadline => return Wait::TimedOut,
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(err) => return Wait::PollFailed(err),
        }
    }
}

fn stop(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

// =============================================================================
// Output Capture
// =============================================================================

/// Drains a pipe on a background thread, keeping only the last `limit` bytes.
struct BoundedCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
    truncated: Arc<Mutex<bool>>,
    done: mpsc::Receiver<()>,
}

impl BoundedCapture {
    fn spawn<R: Read + Send + 'static>(mut reader: R, limit: usize) -> Self {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let truncated = Arc::new(Mutex::new(false));
        let (tx, done) = mpsc::channel();

        let (buf, trunc) = (Arc::clone(&buffer), Arc::clone(&truncated));
        thread::spawn(move || {
            let mut chunk = [0u8; 8192];
            while let Ok(n) = reader.read(&mut chunk) {
                if n == 0 {
                    break;
                }
                let mut buf = buf.lock();
                buf.extend_from_slice(&chunk[..n]);
                if buf.len() > limit {
                    let excess = buf.len() - limit;
                    buf.drain(..excess);
                    *trunc.lock() = true;
                }
            }
            let _ = tx.send(());
        });

        Self {
            buffer,
            truncated,
            done,
        }
    }

    fn finish(self) -> String {
        let _ = self.done.recv_timeout(DRAIN_GRACE);
        let text = String::from_utf8_lossy(&self.buffer.lock()).into_owned();
        if *self.truncated.lock() {
            format!("[output truncated]\n{text}")
        } else {
            text
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::ConfigBuilder;
    use std::fs;
    use tempfile::TempDir;

    /// A `sh` script standing in for the launcher, run as `sh <script> <target>`.
    fn fake_mill(dir: &TempDir, script: &str, timeout: Duration) -> MillCompiler {
        let path = dir.path().join("fake-mill.sh");
        fs::write(&path, script).unwrap();
        let config = ConfigBuilder::new()
            .compiler("sh")
            .compiler_arg(path.to_string_lossy())
            .timeout(timeout)
            .output_limit(64)
            .build();
        MillCompiler::new(dir.path(), &config)
    }

    fn scaffold(compiler: &MillCompiler) -> ScaffoldedModule {
        compiler.scaffold("h1", "package x\n", &[]).unwrap()
    }

    #[test]
    fn test_successful_compile() {
        let dir = TempDir::new().unwrap();
        let script = r#"
case "$1" in
  demos.autogen.h1.fullLinkJS) ;;
  *) echo "unexpected target $1" >&2; exit 9 ;;
esac
mkdir -p out/demos/autogen/h1/fullLinkJS.dest
echo 'console.log("linked")' > out/demos/autogen/h1/fullLinkJS.dest/main.js
"#;
        let compiler = fake_mill(&dir, script, Duration::from_secs(30));
        let module = scaffold(&compiler);

        let artifact = compiler.compile(&module).unwrap();
        assert_eq!(artifact.code.trim(), r#"console.log("linked")"#);
        assert_eq!(artifact.output_path, module.output_path);
    }

    #[test]
    fn test_nonzero_exit_captures_stderr() {
        let dir = TempDir::new().unwrap();
        let compiler = fake_mill(&dir, "echo 'type mismatch' >&2\nexit 3\n", Duration::from_secs(30));
        let module = scaffold(&compiler);

        match compiler.compile(&module).unwrap_err() {
            CompilationError::Failed { stderr, target, .. } => {
                assert!(stderr.contains("type mismatch"));
                assert_eq!(target, "demos.autogen.h1.fullLinkJS");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_success_without_output_is_failure() {
        let dir = TempDir::new().unwrap();
        let compiler = fake_mill(&dir, "exit 0\n", Duration::from_secs(30));
        let module = scaffold(&compiler);

        assert!(matches!(
            compiler.compile(&module).unwrap_err(),
            CompilationError::MissingOutput { .. }
        ));
    }

    #[test]
    fn test_timeout_kills_compiler() {
        let dir = TempDir::new().unwrap();
        let compiler = fake_mill(&dir, "exec sleep 10\n", Duration::from_millis(200));
        let module = scaffold(&compiler);

        let started = Instant::now();
        let err = compiler.compile(&module).unwrap_err();
        assert!(matches!(err, CompilationError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_output_is_bounded() {
        let dir = TempDir::new().unwrap();
        let script = "i=0\nwhile [ $i -lt 200 ]; do echo \"line $i\" >&2; i=$((i+1)); done\nexit 1\n";
        let compiler = fake_mill(&dir, script, Duration::from_secs(30));
        let module = scaffold(&compiler);

        match compiler.compile(&module).unwrap_err() {
            CompilationError::Failed { stderr, .. } => {
                assert!(stderr.starts_with("[output truncated]"));
                assert!(stderr.contains("line 199"));
                assert!(!stderr.contains("line 0\n"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_executable() {
        let dir = TempDir::new().unwrap();
        let config = ConfigBuilder::new().compiler("definitely-not-a-compiler-binary").build();
        let compiler = MillCompiler::new(dir.path(), &config);
        let module = scaffold(&compiler);

        assert!(matches!(
            compiler.compile(&module).unwrap_err(),
            CompilationError::Spawn { .. }
        ));
    }

    #[test]
    fn test_poll_failure_is_not_a_timeout() {
        let mut polls = 0;
        let outcome = wait_with_timeout(
            || {
                polls += 1;
                if polls < 3 {
                    Ok(None)
                } else {
                    Err(io::Error::other("wait interrupted"))
                }
            },
            Duration::from_secs(60),
        );
        match outcome {
            Wait::PollFailed(err) => assert_eq!(err.to_string(), "wait interrupted"),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(polls, 3);
    }

    #[test]
    fn test_wait_times_out_when_never_exited() {
        let outcome = wait_with_timeout(|| Ok(None), Duration::ZERO);
        assert!(matches!(outcome, Wait::TimedOut));
    }
}
