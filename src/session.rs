//! Repository session: owns everything loaded for one repository.
//!
//! A [`RepoSession`] holds the path intern table, the revision cache, the cancel
//! signal and the command runner. History loading is driven from outside by the
//! ingestion controller; everything here is a synchronous query that costs at
//! most a couple of git round trips on the calling thread and caches its result.
//!
//! ## Locking
//!
//! The intern table and the cache sit behind separate `RwLock`s, always taken
//! in table then cache order. Storing a change record holds the table's write
//! lock from the parse until the record is in the cache, so a concurrent
//! [`RepoSession::reset`] sees either none of it or all of it. Commit inserts
//! touch the cache only.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::cache::{CacheKey, RevisionCache};
use crate::commit::{CommitId, CommitMeta};
use crate::diff::parse_diff_format;
use crate::error::RevCacheError;
use crate::paths::{InternedPath, PathInternTable};
use crate::revision::{ChangeRecord, ChangeStatus};
use crate::runner::{CancelSignal, CancelToken, CommandRunner};
use crate::workdir;

/// Context lines for single-file diffs; large enough to show whole files.
const FILE_DIFF_CONTEXT: &str = "-U15000";

/// Tunables of a session.
#[derive(Clone, Debug)]
pub struct SessionOptions {
    /// Ask git for rename/copy detection (`-C`) on diff-tree queries.
    pub rename_detection: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self { rename_detection: true }
    }
}

pub struct RepoSession {
    runner: Arc<dyn CommandRunner>,
    options: SessionOptions,
    paths: RwLock<PathInternTable>,
    cache: RwLock<RevisionCache>,
    cancel: CancelSignal,
    /// Set while a streamed history load owns the cache.
    loading: AtomicBool,
}

impl RepoSession {
    pub fn new(runner: Arc<dyn CommandRunner>, options: SessionOptions) -> Self {
        Self {
            runner,
            options,
            paths: RwLock::new(PathInternTable::new()),
            cache: RwLock::new(RevisionCache::new()),
            cancel: CancelSignal::new(),
            loading: AtomicBool::new(false),
        }
    }

    pub fn runner(&self) -> &Arc<dyn CommandRunner> {
        &self.runner
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    // ─── Lock helpers ───────────────────────────────────────────────
    // A panic while a lock is held leaves valid data behind (every mutation is a
    // single push or insert), so poisoning is ignored.

    pub(crate) fn read_paths(&self) -> RwLockReadGuard<'_, PathInternTable> {
        self.paths.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write_paths(&self) -> RwLockWriteGuard<'_, PathInternTable> {
        self.paths.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn read_cache(&self) -> RwLockReadGuard<'_, RevisionCache> {
        self.cache.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write_cache(&self) -> RwLockWriteGuard<'_, RevisionCache> {
        self.cache.write().unwrap_or_else(PoisonError::into_inner)
    }

    // ─── Lifecycle ──────────────────────────────────────────────────

    /// Forget everything loaded. Used on (re)load and repository switch.
    pub fn reset(&self) {
        let mut paths = self.write_paths();
        let mut cache = self.write_cache();
        cache.clear();
        paths.clear();
        debug!("Session reset");
    }

    /// Cancel every git run started before this call, streamed loads included.
    pub fn cancel_all(&self) {
        info!("Cancelling outstanding git runs");
        self.cancel.cancel_all();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.token()
    }

    /// True while a streamed history load is running.
    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    /// Claim the load slot. False when another load already holds it.
    pub(crate) fn try_begin_load(&self) -> bool {
        self.loading
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn end_load(&self) {
        self.loading.store(false, Ordering::Release);
    }

    // ─── Commits ────────────────────────────────────────────────────

    /// Display rows, pseudo-commit included.
    pub fn total_commits(&self) -> usize {
        self.read_cache().count()
    }

    pub fn commit(&self, id: &CommitId) -> Option<CommitMeta> {
        self.read_cache().commit(id).cloned()
    }

    pub fn commit_by_row(&self, row: usize) -> Option<CommitMeta> {
        self.read_cache().commit_by_row(row).cloned()
    }

    /// Clones of the rows in `[start, start + len)`, clamped to what is loaded.
    pub fn commit_rows(&self, start: usize, len: usize) -> Vec<CommitMeta> {
        let cache = self.read_cache();
        (start..start.saturating_add(len))
            .map_while(|row| cache.commit_by_row(row).cloned())
            .collect()
    }

    pub(crate) fn insert_commit(&self, meta: CommitMeta) -> bool {
        self.write_cache().insert_commit(meta)
    }

    pub(crate) fn configure(&self, expected: usize) {
        self.write_cache().configure(expected);
    }

    /// `(subject, trimmed body)` of a loaded commit.
    pub fn split_commit_msg(&self, id: &CommitId) -> Option<(String, String)> {
        let cache = self.read_cache();
        let (subject, body) = cache.commit(id)?.split_message();
        Some((subject.to_string(), body.to_string()))
    }

    // ─── Paths ──────────────────────────────────────────────────────

    pub fn resolve(&self, path: InternedPath) -> String {
        self.read_paths().resolve(path)
    }

    /// Full path of entry `idx` of `record`.
    pub fn file_path(&self, record: &ChangeRecord, idx: usize) -> Option<String> {
        record.file_path(&self.read_paths(), idx)
    }

    /// Index of `path` in `record`. Empty names never match.
    pub fn find_file_index(&self, record: &ChangeRecord, path: &str) -> Option<usize> {
        record.find(&self.read_paths(), path)
    }

    // ─── Change records ─────────────────────────────────────────────

    /// Parse a raw diff payload and store it under `key`.
    pub fn insert_new_files(&self, key: CacheKey, payload: &str) -> Arc<ChangeRecord> {
        // The table stays locked until the record is stored, so a reset cannot
        // clear the indices the record points at in between
        let mut paths = self.write_paths();
        let record = parse_diff_format(payload, &mut paths);
        self.write_cache().insert_change_record(key, record)
    }

    pub fn change_record(&self, key: &CacheKey) -> Option<Arc<ChangeRecord>> {
        self.read_cache().change_record(key)
    }

    /// Files changed by `id` against its parent(s). Merges get the combined view.
    pub fn commit_files(&self, id: &CommitId) -> Result<Arc<ChangeRecord>, RevCacheError> {
        self.diff_files(id, None, false)
    }

    /// Files changed by `id`.
    ///
    /// - `diff_to`: compare against that commit instead of the parents.
    /// - `all_files`: for a merge, list every file against each parent rather
    ///   than the combined view. Ignored when `diff_to` is given.
    ///
    /// The zero id returns the working-directory record, refreshing it first if
    /// none exists yet. Results are cached per key.
    pub fn diff_files(
        &self,
        id: &CommitId,
        diff_to: Option<&CommitId>,
        all_files: bool,
    ) -> Result<Arc<ChangeRecord>, RevCacheError> {
        if id.is_zero() && diff_to.is_none() {
            if let Some(record) = self.wip_files() {
                return Ok(record);
            }
            self.update_wip_revision()?;
            return Ok(self.wip_files().unwrap_or_default());
        }

        let parents = self.parents_of(id)?;
        let key = match diff_to {
            Some(to) if !parents.is_empty() => CacheKey::Range { from: to.clone(), to: id.clone() },
            None if all_files && parents.len() > 1 => CacheKey::AllMergeFiles(id.clone()),
            _ => CacheKey::Commit(id.clone()),
        };
        if let Some(record) = self.change_record(&key) {
            return Ok(record);
        }

        let (flag, revs) = match &key {
            CacheKey::Range { from, to } => (None, vec![from.as_str(), to.as_str()]),
            CacheKey::AllMergeFiles(id) => (Some("-m"), vec![id.as_str()]),
            CacheKey::Commit(id) if parents.is_empty() => (Some("--root"), vec![id.as_str()]),
            CacheKey::Commit(id) if parents.len() > 1 => (Some("-c"), vec![id.as_str()]),
            CacheKey::Commit(id) => (None, vec![id.as_str()]),
        };

        let start = Instant::now();
        let payload = self.diff_tree_with_rename_fallback(flag, &revs)?;
        let record = self.insert_new_files(key, strip_commit_header(&payload));
        debug!(
            commit = %id.short(),
            files = record.len(),
            elapsed_ms = format_args!("{:.1}", start.elapsed().as_secs_f64() * 1000.0),
            "Diff files loaded"
        );
        Ok(record)
    }

    /// Patch text with diffstat for `id` (or between `diff_to` and `id`).
    /// The zero id diffs the working tree against HEAD.
    pub fn commit_diff(&self, id: &CommitId, diff_to: Option<&CommitId>) -> Result<String, RevCacheError> {
        let token = self.cancel_token();
        if id.is_zero() {
            return self
                .runner
                .run(&["diff-index", "--no-color", "-r", "-m", "--patch-with-stat", "HEAD"], &token);
        }

        let parents = self.parents_of(id)?;
        let mut args = vec!["diff-tree", "--no-color", "-r", "--patch-with-stat"];
        if self.options.rename_detection {
            args.push("-C");
        }
        args.push("-m");
        if let Some(to) = diff_to {
            args.push(to.as_str());
        }
        args.push(id.as_str());
        if parents.is_empty() {
            args.push("--root");
        }
        self.runner.run(&args, &token)
    }

    /// Full-context diff of one file between two commits. A zero `current`
    /// compares `previous` with the working tree.
    pub fn file_diff(
        &self,
        current: &CommitId,
        previous: &CommitId,
        file: &str,
    ) -> Result<String, RevCacheError> {
        let mut args = vec!["diff", "--no-color", FILE_DIFF_CONTEXT, previous.as_str()];
        if !current.is_zero() {
            args.push(current.as_str());
        }
        args.push("--");
        args.push(file);
        self.runner.run(&args, &self.cancel_token())
    }

    /// Commits that touched `file`, newest first, following renames.
    pub fn file_history(&self, file: &str) -> Result<Vec<CommitId>, RevCacheError> {
        let out = self
            .runner
            .run(&["log", "--follow", "--pretty=%H", "--", file], &self.cancel_token())?;
        Ok(out.lines().filter_map(|line| CommitId::parse(line.trim())).collect())
    }

    /// Resolve a user-supplied revision (`HEAD`, a branch, a short hash) to a
    /// commit id. The full zero id names the pseudo-commit and is returned as is.
    pub fn resolve_revision(&self, rev: &str) -> Result<CommitId, RevCacheError> {
        if let Some(id) = CommitId::parse(rev).filter(CommitId::is_zero) {
            return Ok(id);
        }
        let spec = format!("{}^{{commit}}", rev);
        let out = match self
            .runner
            .run(&["rev-parse", "--verify", "--quiet", &spec], &self.cancel_token())
        {
            Ok(out) => out,
            Err(RevCacheError::CommandFailed { .. }) => {
                return Err(RevCacheError::UnknownRevision(rev.to_string()));
            }
            Err(e) => return Err(e),
        };
        CommitId::parse(out.trim()).ok_or_else(|| RevCacheError::UnknownRevision(rev.to_string()))
    }

    // ─── Working directory ──────────────────────────────────────────

    /// Re-read uncommitted state and replace the pseudo-commit and its record.
    /// On failure nothing in the cache changes.
    pub fn update_wip_revision(&self) -> Result<(), RevCacheError> {
        let start = Instant::now();
        let info = workdir::collect(self.runner.as_ref(), &self.cancel_token())?;

        let files = {
            let mut paths = self.write_paths();
            let (record, meta) = workdir::synthesize(&info, &mut paths, workdir::unix_now());
            let files = record.len();
            let mut cache = self.write_cache();
            cache.insert_change_record(CacheKey::wip(), record);
            cache.update_wip_commit(meta);
            files
        };

        info!(
            files,
            untracked = info.other_files.len(),
            elapsed_ms = format_args!("{:.1}", start.elapsed().as_secs_f64() * 1000.0),
            "Working directory refreshed"
        );
        Ok(())
    }

    pub fn wip_files(&self) -> Option<Arc<ChangeRecord>> {
        self.change_record(&CacheKey::wip())
    }

    /// True when there is no pseudo-commit record, or it lists untracked files only.
    pub fn is_nothing_to_commit(&self) -> bool {
        match self.wip_files() {
            None => true,
            Some(record) => {
                let untracked = record
                    .entries()
                    .iter()
                    .filter(|e| e.status.contains(ChangeStatus::UNKNOWN))
                    .count();
                record.len() == untracked
            }
        }
    }

    // ─── Internals ──────────────────────────────────────────────────

    /// Parents of a loaded commit, or asked from git for one that is not loaded.
    fn parents_of(&self, id: &CommitId) -> Result<Vec<CommitId>, RevCacheError> {
        if let Some(meta) = self.read_cache().commit(id) {
            return Ok(meta.parents.clone());
        }
        let out = self
            .runner
            .run(&["rev-list", "--parents", "-n", "1", id.as_str()], &self.cancel_token())?;
        Ok(out
            .split_whitespace()
            .skip(1)
            .filter_map(CommitId::parse)
            .collect())
    }

    /// Run `diff-tree -r` with `-C` first, retrying once without it when git
    /// fails (rename detection gives up on very large changes).
    fn diff_tree_with_rename_fallback(&self, flag: Option<&str>, revs: &[&str]) -> Result<String, RevCacheError> {
        let token = self.cancel_token();
        let build = |renames: bool| {
            let mut args = vec!["diff-tree", "--no-color", "-r"];
            args.extend(flag);
            if renames {
                args.push("-C");
            }
            args.extend_from_slice(revs);
            args
        };

        if !self.options.rename_detection {
            return self.runner.run(&build(false), &token);
        }
        match self.runner.run(&build(true), &token) {
            Err(RevCacheError::CommandFailed { command, stderr }) => {
                warn!(command = %command, stderr = %stderr, "Rename detection failed, retrying without -C");
                self.runner.run(&build(false), &token)
            }
            other => other,
        }
    }
}

/// Drop the commit id line diff-tree prints before the file list of a single
/// commit, so parent numbering starts at 1.
fn strip_commit_header(payload: &str) -> &str {
    if payload.starts_with(':') {
        return payload;
    }
    match payload.split_once('\n') {
        Some((_, rest)) => rest,
        None => "",
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
