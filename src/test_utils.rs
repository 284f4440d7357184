//! Shared test helpers: a scripted [`CommandRunner`] and a throwaway git repository.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;

use crate::error::RevCacheError;
use crate::runner::{CancelToken, CommandRunner};

// ─── Scripted runner ────────────────────────────────────────────────

/// Streaming script: chunks handed out one by one, optionally gated.
struct StreamScript {
    chunks: Vec<Vec<u8>>,
    gate: Option<Receiver<()>>,
    failure: Option<String>,
}

/// [`CommandRunner`] that answers from a table keyed by the space-joined args.
///
/// Unscripted commands fail with `CommandFailed`, which is what a real git does
/// for an unknown revision, so tests notice unexpected calls.
#[derive(Default)]
pub(crate) struct ScriptedRunner {
    responses: Mutex<HashMap<String, Result<String, String>>>,
    calls: Mutex<Vec<String>>,
    stream: Mutex<Option<StreamScript>>,
}

impl ScriptedRunner {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Answer `args` with `stdout`.
    pub(crate) fn on(self, args: &str, stdout: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(args.to_string(), Ok(stdout.to_string()));
        self
    }

    /// Fail `args` with `stderr`.
    pub(crate) fn fail(self, args: &str, stderr: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(args.to_string(), Err(stderr.to_string()));
        self
    }

    /// Stream `chunks` to the next `run_streaming` call without waiting.
    pub(crate) fn stream(self, chunks: Vec<Vec<u8>>) -> Self {
        *self.stream.lock().unwrap() = Some(StreamScript { chunks, gate: None, failure: None });
        self
    }

    /// Stream `chunks`, releasing one per message sent on the returned gate.
    /// Dropping the sender releases nothing further.
    pub(crate) fn gated_stream(self, chunks: Vec<Vec<u8>>) -> (Self, Sender<()>) {
        let (tx, rx) = mpsc::channel();
        *self.stream.lock().unwrap() = Some(StreamScript { chunks, gate: Some(rx), failure: None });
        (self, tx)
    }

    /// Stream `chunks`, then exit unsuccessfully with `stderr`.
    pub(crate) fn failing_stream(self, chunks: Vec<Vec<u8>>, stderr: &str) -> Self {
        *self.stream.lock().unwrap() = Some(StreamScript {
            chunks,
            gate: None,
            failure: Some(stderr.to_string()),
        });
        self
    }

    /// Every command run so far, space-joined, in call order.
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn call_count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, args: &[&str], cancel: &CancelToken) -> Result<String, RevCacheError> {
        let command = args.join(" ");
        self.calls.lock().unwrap().push(command.clone());
        if cancel.is_cancelled() {
            return Err(RevCacheError::Cancelled { command });
        }
        match self.responses.lock().unwrap().get(&command) {
            Some(Ok(stdout)) => Ok(stdout.clone()),
            Some(Err(stderr)) => Err(RevCacheError::CommandFailed { command, stderr: stderr.clone() }),
            None => Err(RevCacheError::CommandFailed { command, stderr: "unscripted".to_string() }),
        }
    }

    fn run_streaming(
        &self,
        args: &[&str],
        cancel: &CancelToken,
        on_chunk: &mut dyn FnMut(Vec<u8>),
    ) -> Result<(), RevCacheError> {
        let command = args.join(" ");
        self.calls.lock().unwrap().push(command.clone());
        let script = self.stream.lock().unwrap().take();
        let Some(script) = script else {
            return Ok(());
        };

        for chunk in script.chunks {
            if let Some(gate) = &script.gate {
                // A dropped sender means no further chunk will be released
                if gate.recv().is_err() {
                    return Err(RevCacheError::Cancelled { command });
                }
            }
            if cancel.is_cancelled() {
                return Err(RevCacheError::Cancelled { command });
            }
            on_chunk(chunk);
        }
        match script.failure {
            Some(stderr) => Err(RevCacheError::CommandFailed { command, stderr }),
            None => Ok(()),
        }
    }
}

// ─── Real git repository ────────────────────────────────────────────

pub(crate) fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Temporary repository with a fixed identity, removed on drop.
pub(crate) struct TestRepo {
    dir: tempfile::TempDir,
}

impl TestRepo {
    /// `None` when git is not installed; callers return early.
    pub(crate) fn init() -> Option<Self> {
        if !git_available() {
            eprintln!("[test] git not found in PATH, skipping");
            return None;
        }
        let repo = TestRepo { dir: tempfile::tempdir().unwrap() };
        repo.git(&["init", "-q"]);
        repo.git(&["config", "user.email", "test@test.com"]);
        repo.git(&["config", "user.name", "Test"]);
        repo.git(&["config", "commit.gpgsign", "false"]);
        Some(repo)
    }

    pub(crate) fn path(&self) -> &Path {
        self.dir.path()
    }

    pub(crate) fn join(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    /// Run git in the repository and return trimmed stdout; panics on failure.
    pub(crate) fn git(&self, args: &[&str]) -> String {
        let output = Command::new("git")
            .args(args)
            .current_dir(self.dir.path())
            .output()
            .expect("Failed to run git");
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    pub(crate) fn write(&self, rel: &str, content: &str) {
        let path = self.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    /// Stage everything and commit; returns the new HEAD id.
    pub(crate) fn commit_all(&self, message: &str) -> String {
        self.git(&["add", "-A"]);
        self.git(&["commit", "-q", "-m", message]);
        self.git(&["rev-parse", "HEAD"])
    }
}
