//! # revcache: git history ingestion and change-record cache
//!
//! Turns the machine-readable output of `git log` and `git diff-tree` /
//! `git diff-index` into an in-memory model of a repository: commits in display
//! order, per-commit file change records with interned paths, and a synthetic
//! working-directory pseudo-commit for uncommitted changes.
//!
//! ## Library usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use revcache::{GitCli, IngestionController, RepoSession, SessionOptions};
//!
//! let git = GitCli::discover(std::path::Path::new("."), "git")?;
//! let session = Arc::new(RepoSession::new(Arc::new(git), SessionOptions::default()));
//! let summary = IngestionController::new(Arc::clone(&session)).start()?.wait();
//! println!("{} commits", summary.commits);
//! # Ok::<(), revcache::RevCacheError>(())
//! ```
//!
//! The binary in `main.rs` is a thin command-line front end over the same API.

pub mod cache;
pub mod commit;
pub mod diff;
pub mod error;
pub mod ingest;
pub mod paths;
pub mod revision;
pub mod runner;
pub mod session;
pub mod workdir;

#[cfg(test)]
pub(crate) mod test_utils;

pub use cache::{CacheKey, RevisionCache};
pub use commit::{parse_log_record, CommitId, CommitMeta, GIT_LOG_FORMAT, ZERO_SHA};
pub use diff::parse_diff_format;
pub use error::RevCacheError;
pub use ingest::{IngestionController, LoadEvent, LoadHandle, LoadSummary};
pub use paths::{InternedPath, PathInternTable};
pub use revision::{ChangeEntry, ChangeRecord, ChangeStatus};
pub use runner::{CancelSignal, CancelToken, CommandRunner, GitCli};
pub use session::{RepoSession, SessionOptions};
pub use workdir::WorkingDirInfo;
