//! Incremental history ingestion.
//!
//! [`IngestionController::start`] clears the session and launches two threads:
//!
//! - **producer**: runs the streamed `git log -z` and forwards each stdout chunk
//!   over a channel as it arrives;
//! - **consumer**: the single writer of the cache during a load. It splits
//!   chunks into NUL-separated records, carrying a record that straddles two
//!   chunks over to the next one, parses each into a [`CommitMeta`], and inserts
//!   it.
//!
//! Progress is reported as [`LoadEvent`]s on the handle's channel, ending with
//! exactly one terminal event. Commits inserted before a cancel or failure stay
//! in the cache.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::commit::{parse_log_record, GIT_LOG_FORMAT, RECORD_SEP};
use crate::error::RevCacheError;
use crate::runner::{decode_lossy, CancelToken};
use crate::session::RepoSession;

/// Commits to reserve room for before the first chunk arrives.
const EXPECTED_COMMITS: usize = 4096;

/// Arguments of the streamed history run.
pub fn log_args() -> Vec<String> {
    [
        "log",
        "--date-order",
        "--no-color",
        "--parents",
        "--boundary",
        "-z",
    ]
    .into_iter()
    .map(str::to_string)
    .chain([format!("--pretty=format:{}", GIT_LOG_FORMAT), "--all".to_string()])
    .collect()
}

// ─── Events ─────────────────────────────────────────────────────────

/// Load lifecycle notifications, in order: `Started`, any number of
/// `Progress`, then one of `Finished`, `Cancelled` or `Failed`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LoadEvent {
    Started,
    Progress { chunks: usize, commits: usize },
    Finished { commits: usize },
    Cancelled { commits: usize },
    Failed { commits: usize, message: String },
}

impl LoadEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LoadEvent::Finished { .. } | LoadEvent::Cancelled { .. } | LoadEvent::Failed { .. }
        )
    }
}

/// Final state of one load, returned by [`LoadHandle::wait`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub chunks: usize,
    pub commits: usize,
    /// The terminal event that was emitted.
    pub outcome: LoadEvent,
}

// ─── Controller ─────────────────────────────────────────────────────

/// Starts streamed loads for one session. The in-progress flag lives on the
/// session, so at most one load runs per session however many controllers
/// share it.
pub struct IngestionController {
    session: Arc<RepoSession>,
}

/// Clears the session's load flag when the consumer exits, panics included.
struct RunningGuard(Arc<RepoSession>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.end_load();
    }
}

impl IngestionController {
    pub fn new(session: Arc<RepoSession>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Arc<RepoSession> {
        &self.session
    }

    pub fn is_running(&self) -> bool {
        self.session.is_loading()
    }

    /// Begin a full reload. Fails with [`RevCacheError::LoadInProgress`] and
    /// changes nothing when a load is already running.
    pub fn start(&self) -> Result<LoadHandle, RevCacheError> {
        if !self.session.try_begin_load() {
            return Err(RevCacheError::LoadInProgress);
        }
        let guard = RunningGuard(Arc::clone(&self.session));

        self.session.reset();
        let token = self.session.cancel_token();
        let (event_tx, event_rx) = mpsc::channel();
        let (chunk_tx, chunk_rx) = mpsc::channel::<Vec<u8>>();

        let producer = {
            let runner = Arc::clone(self.session.runner());
            let token = token.clone();
            std::thread::spawn(move || {
                let args = log_args();
                let args: Vec<&str> = args.iter().map(String::as_str).collect();
                runner.run_streaming(&args, &token, &mut |chunk| {
                    // Consumer gone means nobody wants the rest
                    let _ = chunk_tx.send(chunk);
                })
            })
        };

        let session = Arc::clone(&self.session);
        let worker = std::thread::spawn(move || {
            let _guard = guard;
            Consumer::new(session, token, event_tx).run(chunk_rx, producer)
        });

        Ok(LoadHandle {
            events: event_rx,
            worker,
            session: Arc::clone(&self.session),
        })
    }
}

// ─── Handle ─────────────────────────────────────────────────────────

/// A running load.
pub struct LoadHandle {
    events: Receiver<LoadEvent>,
    worker: JoinHandle<LoadSummary>,
    session: Arc<RepoSession>,
}

impl LoadHandle {
    /// Event stream; closes after the terminal event.
    pub fn events(&self) -> &Receiver<LoadEvent> {
        &self.events
    }

    /// Cancel this load (and every other outstanding run of the session).
    pub fn cancel(&self) {
        self.session.cancel_all();
    }

    /// Block until the load ends.
    pub fn wait(self) -> LoadSummary {
        match self.worker.join() {
            Ok(summary) => summary,
            Err(_) => {
                let commits = self.session.read_cache().commits().len();
                LoadSummary {
                    chunks: 0,
                    commits,
                    outcome: LoadEvent::Failed { commits, message: "ingestion thread panicked".to_string() },
                }
            }
        }
    }
}

// ─── Consumer ───────────────────────────────────────────────────────

struct Consumer {
    session: Arc<RepoSession>,
    token: CancelToken,
    events: Sender<LoadEvent>,
    /// Bytes of a record whose terminating NUL has not arrived yet.
    carry: Vec<u8>,
    chunks: usize,
    commits: usize,
    wip_done: bool,
}

impl Consumer {
    fn new(session: Arc<RepoSession>, token: CancelToken, events: Sender<LoadEvent>) -> Self {
        Self {
            session,
            token,
            events,
            carry: Vec::new(),
            chunks: 0,
            commits: 0,
            wip_done: false,
        }
    }

    fn emit(&self, event: LoadEvent) {
        // Receiver dropped: the caller stopped listening, keep loading anyway
        let _ = self.events.send(event);
    }

    fn run(
        mut self,
        chunks: Receiver<Vec<u8>>,
        producer: JoinHandle<Result<(), RevCacheError>>,
    ) -> LoadSummary {
        let start = Instant::now();
        info!("History load started");
        self.emit(LoadEvent::Started);
        self.session.configure(EXPECTED_COMMITS);

        for chunk in chunks.iter() {
            if self.token.is_cancelled() {
                break;
            }
            self.ensure_wip();
            self.chunks += 1;
            self.consume_chunk(&chunk);
            self.emit(LoadEvent::Progress { chunks: self.chunks, commits: self.commits });
        }

        let result = producer
            .join()
            .unwrap_or_else(|_| Err(RevCacheError::Io(std::io::Error::other("git log reader panicked"))));

        if result.is_ok() && !self.token.is_cancelled() {
            self.ensure_wip();
        }
        // git puts the NUL before a record, so the tail holds the newest delivered commit
        self.flush_carry();

        let outcome = match result {
            _ if self.token.is_cancelled() => LoadEvent::Cancelled { commits: self.commits },
            Err(e) if e.is_cancelled() => LoadEvent::Cancelled { commits: self.commits },
            Err(e) => LoadEvent::Failed { commits: self.commits, message: e.to_string() },
            Ok(()) => LoadEvent::Finished { commits: self.commits },
        };

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        match &outcome {
            LoadEvent::Finished { commits } => info!(
                commits,
                chunks = self.chunks,
                elapsed_ms = format_args!("{:.1}", elapsed_ms),
                "History load finished"
            ),
            LoadEvent::Cancelled { commits } => info!(
                commits,
                chunks = self.chunks,
                elapsed_ms = format_args!("{:.1}", elapsed_ms),
                "History load cancelled"
            ),
            LoadEvent::Failed { commits, message } => warn!(
                commits,
                error = %message,
                elapsed_ms = format_args!("{:.1}", elapsed_ms),
                "History load failed"
            ),
            _ => {}
        }

        self.emit(outcome.clone());
        LoadSummary { chunks: self.chunks, commits: self.commits, outcome }
    }

    /// Synthesize the pseudo-commit once, ahead of the first real commit.
    /// A failure is logged and the load goes on without it.
    fn ensure_wip(&mut self) {
        if self.wip_done {
            return;
        }
        self.wip_done = true;
        if let Err(e) = self.session.update_wip_revision() {
            warn!(error = %e, "Working directory state unavailable");
        }
    }

    /// Insert every complete record of `chunk`; keep the trailing partial one.
    fn consume_chunk(&mut self, chunk: &[u8]) {
        let Some(last_sep) = chunk.iter().rposition(|b| *b == RECORD_SEP) else {
            self.carry.extend_from_slice(chunk);
            return;
        };

        let mut complete = std::mem::take(&mut self.carry);
        complete.extend_from_slice(&chunk[..last_sep]);
        self.carry.extend_from_slice(&chunk[last_sep + 1..]);

        for record in complete.split(|b| *b == RECORD_SEP) {
            if !self.insert_record(record) {
                // Rest of this chunk is dropped; the carried tail still starts a fresh record
                break;
            }
        }
    }

    /// Parse the last record, which git does not terminate with a NUL. Runs on
    /// every outcome; a tail that does not parse is dropped.
    fn flush_carry(&mut self) {
        if self.carry.is_empty() {
            return;
        }
        let record = std::mem::take(&mut self.carry);
        self.insert_record(&record);
    }

    /// False when the record does not parse. Empty records are skipped.
    fn insert_record(&mut self, raw: &[u8]) -> bool {
        if raw.is_empty() {
            return true;
        }
        let text = decode_lossy(raw.to_vec());
        let Some(meta) = parse_log_record(&text, self.commits + 1) else {
            debug!(
                bytes = raw.len(),
                inserted = self.commits,
                "Invalid log record, skipping rest of chunk"
            );
            return false;
        };
        if self.session.insert_commit(meta) {
            self.commits += 1;
        }
        true
    }
}

#[cfg(test)]
#[path = "ingest_tests.rs"]
mod tests;
