//! Command runner: the only place that talks to the `git` process.
//!
//! Everything above this module sees git as "a run yields a payload or an error"
//! ([`CommandRunner::run`]) or "a run delivers successive byte chunks"
//! ([`CommandRunner::run_streaming`]). Both shapes honour a [`CancelToken`].
//!
//! ## Cancellation
//!
//! [`CancelSignal::cancel_all`] bumps a generation counter. A token snapshots the
//! generation when it is taken and reports cancelled once the counter moves on,
//! so one signal stops every run that was outstanding at that moment while
//! runs started afterwards proceed normally.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, mpsc};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::RevCacheError;

/// Read size for streamed stdout.
const CHUNK_SIZE: usize = 64 * 1024;

/// How often a waiting run re-checks its cancel token.
const CANCEL_POLL: Duration = Duration::from_millis(20);

// ─── Cancellation ───────────────────────────────────────────────────

/// Process-wide "cancel all outstanding runs" signal of one session.
#[derive(Clone, Debug, Default)]
pub struct CancelSignal {
    generation: Arc<AtomicU64>,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel every token taken before this call.
    pub fn cancel_all(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Snapshot a token for a run that starts now.
    pub fn token(&self) -> CancelToken {
        CancelToken {
            generation: Arc::clone(&self.generation),
            start: self.generation.load(Ordering::Acquire),
        }
    }
}

/// Per-run view of a [`CancelSignal`].
#[derive(Clone, Debug)]
pub struct CancelToken {
    generation: Arc<AtomicU64>,
    start: u64,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        self.generation.load(Ordering::Acquire) != self.start
    }
}

// ─── Runner seam ────────────────────────────────────────────────────

/// Transport to the external version-control tool.
///
/// `args` are passed to the tool verbatim (no shell, no quoting).
pub trait CommandRunner: Send + Sync {
    /// Run to completion and return stdout.
    fn run(&self, args: &[&str], cancel: &CancelToken) -> Result<String, RevCacheError>;

    /// Run and hand stdout to `on_chunk` as it arrives, in order.
    fn run_streaming(
        &self,
        args: &[&str],
        cancel: &CancelToken,
        on_chunk: &mut dyn FnMut(Vec<u8>),
    ) -> Result<(), RevCacheError>;

    /// Repository git dir, when known. Used to locate `info/exclude`.
    fn git_dir(&self) -> Option<&Path> {
        None
    }
}

/// Decode tool output, replacing invalid UTF-8 instead of failing.
pub fn decode_lossy(raw: Vec<u8>) -> String {
    match String::from_utf8(raw) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

// ─── git CLI implementation ─────────────────────────────────────────

/// [`CommandRunner`] that spawns `git` in a repository work tree.
#[derive(Clone, Debug)]
pub struct GitCli {
    program: String,
    work_dir: PathBuf,
    git_dir: Option<PathBuf>,
}

impl GitCli {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: "git".to_string(),
            work_dir: work_dir.into(),
            git_dir: None,
        }
    }

    /// Use a specific git binary instead of the one on PATH.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Resolve the repository containing `path`: its git dir and work-tree root.
    pub fn discover(path: &Path, program: &str) -> Result<Self, RevCacheError> {
        let probe = GitCli::new(path).with_program(program);
        let token = CancelSignal::new().token();

        let git_dir = probe
            .run(&["rev-parse", "--git-dir"], &token)
            .map_err(|e| match e {
                RevCacheError::CommandFailed { .. } => {
                    RevCacheError::NotARepository(path.display().to_string())
                }
                other => other,
            })?;
        let git_dir = PathBuf::from(git_dir.trim());
        let git_dir = if git_dir.is_absolute() { git_dir } else { path.join(git_dir) };

        // Empty when `path` already is the top level
        let cdup = probe.run(&["rev-parse", "--show-cdup"], &token)?;
        let cdup = cdup.trim();
        let work_dir = if cdup.is_empty() { path.to_path_buf() } else { path.join(cdup) };

        debug!(work_dir = %work_dir.display(), git_dir = %git_dir.display(), "Resolved repository");

        Ok(Self {
            program: program.to_string(),
            work_dir,
            git_dir: Some(git_dir),
        })
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    fn spawn(&self, args: &[&str]) -> Result<Child, RevCacheError> {
        Command::new(&self.program)
            .args(["-c", "core.quotePath=false"]) // raw UTF-8 paths
            .args(args)
            .current_dir(&self.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| RevCacheError::Spawn {
                program: self.program.clone(),
                source,
            })
    }

    /// Spawn git, forward stdout chunks, and poll the cancel token until the
    /// process exits. A cancelled run kills the child.
    fn drive(
        &self,
        args: &[&str],
        cancel: &CancelToken,
        on_chunk: &mut dyn FnMut(Vec<u8>),
    ) -> Result<(), RevCacheError> {
        let command = args.join(" ");
        if cancel.is_cancelled() {
            return Err(RevCacheError::Cancelled { command });
        }

        let mut child = self.spawn(args)?;
        let mut stdout = child.stdout.take().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "git stdout not captured")
        })?;
        let mut stderr = child.stderr.take().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "git stderr not captured")
        })?;

        let stderr_reader = std::thread::spawn(move || {
            let mut text = String::new();
            let _ = stderr.read_to_string(&mut text);
            text
        });

        let (tx, rx) = mpsc::channel::<std::io::Result<Vec<u8>>>();
        std::thread::spawn(move || {
            let mut buf = vec![0u8; CHUNK_SIZE];
            loop {
                match stdout.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(Ok(buf[..n].to_vec())).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        let _ = tx.send(Err(e));
                        break;
                    }
                }
            }
        });

        loop {
            if cancel.is_cancelled() {
                if let Err(e) = child.kill() {
                    warn!(error = %e, command = %command, "Failed to kill cancelled git process");
                }
                let _ = child.wait();
                debug!(command = %command, "git run cancelled");
                return Err(RevCacheError::Cancelled { command });
            }
            match rx.recv_timeout(CANCEL_POLL) {
                Ok(Ok(chunk)) => on_chunk(chunk),
                Ok(Err(e)) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(RevCacheError::Io(e));
                }
                Err(mpsc::RecvTimeoutError::Timeout) => continue,
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }

        let status = child.wait()?;
        let stderr_text = stderr_reader.join().unwrap_or_default();

        if !status.success() {
            return Err(RevCacheError::CommandFailed {
                command,
                stderr: stderr_text.trim().to_string(),
            });
        }
        Ok(())
    }
}

impl CommandRunner for GitCli {
    fn run(&self, args: &[&str], cancel: &CancelToken) -> Result<String, RevCacheError> {
        let mut out = Vec::new();
        self.drive(args, cancel, &mut |chunk| out.extend_from_slice(&chunk))?;
        Ok(decode_lossy(out))
    }

    fn run_streaming(
        &self,
        args: &[&str],
        cancel: &CancelToken,
        on_chunk: &mut dyn FnMut(Vec<u8>),
    ) -> Result<(), RevCacheError> {
        self.drive(args, cancel, on_chunk)
    }

    /// Set when resolved through [`GitCli::discover`].
    fn git_dir(&self) -> Option<&Path> {
        self.git_dir.as_deref()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
