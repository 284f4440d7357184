//! Per-commit change records.

use serde::Serialize;

use crate::paths::{InternedPath, PathInternTable};

// ─── Status flags ───────────────────────────────────────────────────

/// Status flag set of one changed path.
///
/// Flags are not mutually exclusive: `IN_INDEX` and `CONFLICT` are set on top of
/// a primary status (`MODIFIED`, `NEW`, `DELETED`, `UNKNOWN`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub struct ChangeStatus(u8);

impl ChangeStatus {
    pub const MODIFIED: ChangeStatus = ChangeStatus(1);
    pub const NEW: ChangeStatus = ChangeStatus(1 << 1);
    pub const DELETED: ChangeStatus = ChangeStatus(1 << 2);
    pub const CONFLICT: ChangeStatus = ChangeStatus(1 << 3);
    pub const UNKNOWN: ChangeStatus = ChangeStatus(1 << 4);
    pub const IN_INDEX: ChangeStatus = ChangeStatus(1 << 5);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn union(self, other: ChangeStatus) -> ChangeStatus {
        ChangeStatus(self.0 | other.0)
    }

    pub const fn contains(self, other: ChangeStatus) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: ChangeStatus) {
        self.0 |= other.0;
    }

    /// Map a raw git status letter to its flags.
    ///
    /// `T` (type change) counts as a modification; `U` (unmerged) is a modified
    /// path in conflict. Unrecognised letters fall back to `MODIFIED`.
    pub fn from_letter(letter: u8) -> ChangeStatus {
        match letter {
            b'A' | b'C' | b'R' => ChangeStatus::NEW,
            b'D' => ChangeStatus::DELETED,
            b'U' => ChangeStatus::MODIFIED.union(ChangeStatus::CONFLICT),
            b'?' => ChangeStatus::UNKNOWN,
            _ => ChangeStatus::MODIFIED,
        }
    }

    /// Single display letter of the primary status.
    pub fn letter(self) -> char {
        if self.contains(ChangeStatus::CONFLICT) {
            'U'
        } else if self.contains(ChangeStatus::NEW) {
            'A'
        } else if self.contains(ChangeStatus::DELETED) {
            'D'
        } else if self.contains(ChangeStatus::UNKNOWN) {
            '?'
        } else {
            'M'
        }
    }
}

impl std::ops::BitOr for ChangeStatus {
    type Output = ChangeStatus;

    fn bitor(self, rhs: ChangeStatus) -> ChangeStatus {
        self.union(rhs)
    }
}

// ─── Entries ────────────────────────────────────────────────────────

/// One changed path within one commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChangeEntry {
    pub path: InternedPath,
    pub status: ChangeStatus,
    /// `"<orig> --> <dest> (<similarity>%)"` for renames and copies.
    pub ext_status: Option<String>,
    /// 1-based parent this entry was reported against (merges list a path once per parent).
    pub parent: u32,
}

/// Ordered change list of a commit or of the working-directory pseudo-commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChangeRecord {
    entries: Vec<ChangeEntry>,
    only_modified: bool,
}

impl Default for ChangeRecord {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            only_modified: true,
        }
    }
}

impl ChangeRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. Structural statuses (`NEW`, `DELETED`) latch
    /// `only_modified` to false.
    pub fn push(&mut self, entry: ChangeEntry) {
        if entry.status.contains(ChangeStatus::NEW) || entry.status.contains(ChangeStatus::DELETED) {
            self.only_modified = false;
        }
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[ChangeEntry] {
        &self.entries
    }

    pub fn get(&self, idx: usize) -> Option<&ChangeEntry> {
        self.entries.get(idx)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True while the record holds nothing but in-place modifications.
    pub fn only_modified(&self) -> bool {
        self.only_modified
    }

    /// Only ever lowers the flag in practice; raising it again is left to callers
    /// that build a record from scratch.
    pub fn set_only_modified(&mut self, value: bool) {
        self.only_modified = value;
    }

    /// Add flags to the entry at `idx`. Out-of-range indices are ignored.
    pub fn append_status(&mut self, idx: usize, status: ChangeStatus) {
        if let Some(entry) = self.entries.get_mut(idx) {
            entry.status.insert(status);
        }
    }

    /// Position of the first entry with this interned path.
    pub fn position(&self, path: InternedPath) -> Option<usize> {
        self.entries.iter().position(|e| e.path == path)
    }

    /// Position of the first entry whose resolved path equals `full_path`.
    ///
    /// Empty names never match.
    pub fn find(&self, paths: &PathInternTable, full_path: &str) -> Option<usize> {
        if full_path.is_empty() {
            return None;
        }
        let interned = paths.lookup(full_path)?;
        self.position(interned)
    }

    /// Resolved full path of the entry at `idx`.
    pub fn file_path(&self, paths: &PathInternTable, idx: usize) -> Option<String> {
        self.entries.get(idx).map(|e| paths.resolve(e.path))
    }
}
