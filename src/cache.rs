//! Revision cache: ordered commit list plus change records keyed by commit or range.
//!
//! Row 0 is the working-directory pseudo-commit when one has been synthesized;
//! real commits follow in ingestion order. Change records are stored as
//! `Arc<ChangeRecord>` so readers can hold one without keeping the cache locked.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::commit::{CommitId, CommitMeta};
use crate::revision::ChangeRecord;

/// Key of a stored change record.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum CacheKey {
    /// Changes of one commit against its parent(s), or the pseudo-commit.
    Commit(CommitId),
    /// Changes between two explicit commits.
    Range { from: CommitId, to: CommitId },
    /// Full per-parent file list of a merge commit.
    AllMergeFiles(CommitId),
}

impl CacheKey {
    pub fn wip() -> Self {
        CacheKey::Commit(CommitId::zero())
    }
}

/// Owns every [`CommitMeta`] and [`ChangeRecord`] of one loaded repository.
#[derive(Debug, Default)]
pub struct RevisionCache {
    commits: Vec<CommitMeta>,
    by_id: HashMap<CommitId, usize>,
    wip: Option<CommitMeta>,
    records: HashMap<CacheKey, Arc<ChangeRecord>>,
}

impl RevisionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve room for `expected` more commits ahead of a bulk insert.
    pub fn configure(&mut self, expected: usize) {
        self.commits.reserve(expected);
        self.by_id.reserve(expected);
    }

    /// Append a commit. A second insert of the same id is ignored and returns false.
    pub fn insert_commit(&mut self, meta: CommitMeta) -> bool {
        if self.by_id.contains_key(&meta.id) {
            return false;
        }
        self.by_id.insert(meta.id.clone(), self.commits.len());
        self.commits.push(meta);
        true
    }

    /// Replace the pseudo-commit shown at row 0.
    pub fn update_wip_commit(&mut self, meta: CommitMeta) {
        self.wip = Some(meta);
    }

    pub fn wip_commit(&self) -> Option<&CommitMeta> {
        self.wip.as_ref()
    }

    /// Store (or overwrite) the change record for `key`.
    pub fn insert_change_record(&mut self, key: CacheKey, record: ChangeRecord) -> Arc<ChangeRecord> {
        let record = Arc::new(record);
        self.records.insert(key, Arc::clone(&record));
        record
    }

    pub fn change_record(&self, key: &CacheKey) -> Option<Arc<ChangeRecord>> {
        self.records.get(key).cloned()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.records.contains_key(key)
    }

    /// Look up a commit by id. The zero id resolves to the pseudo-commit.
    pub fn commit(&self, id: &CommitId) -> Option<&CommitMeta> {
        if id.is_zero() {
            return self.wip.as_ref();
        }
        self.by_id.get(id).and_then(|&idx| self.commits.get(idx))
    }

    /// Commit shown at display row `row`.
    pub fn commit_by_row(&self, row: usize) -> Option<&CommitMeta> {
        match (&self.wip, row) {
            (Some(wip), 0) => Some(wip),
            (Some(_), _) => self.commits.get(row - 1),
            (None, _) => self.commits.get(row),
        }
    }

    /// Number of display rows, pseudo-commit included.
    pub fn count(&self) -> usize {
        self.commits.len() + usize::from(self.wip.is_some())
    }

    /// Real commits only, in ingestion order.
    pub fn commits(&self) -> &[CommitMeta] {
        &self.commits
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Empty commits and change records. The path intern table is separate and
    /// must be reset by the caller on repository switch.
    pub fn clear(&mut self) {
        self.commits.clear();
        self.by_id.clear();
        self.wip = None;
        self.records.clear();
    }
}
