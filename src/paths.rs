//! Path interning: directory and file-name pools shared by every change record.
//!
//! A repository with 50K commits touches the same few thousand directories over
//! and over. Each changed path is split at its last `/` and both halves are stored
//! once; change records keep only the two `u32` indices.
//!
//! Both pools are append-only while a repository is loaded. An index handed out
//! by [`PathInternTable::intern`] stays valid until [`PathInternTable::clear`],
//! which only happens on repository switch.

use std::collections::HashMap;

use serde::Serialize;

/// A path stored as (directory index, name index) into a [`PathInternTable`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct InternedPath {
    pub dir_idx: u32,
    pub name_idx: u32,
}

/// Two dense string pools: directory prefixes (with trailing `/`) and file names.
#[derive(Debug, Default)]
pub struct PathInternTable {
    dirs: Vec<String>,
    names: Vec<String>,
    dir_map: HashMap<String, u32>,
    name_map: HashMap<String, u32>,
}

/// Split a repo-relative path into `(dir, name)`. The directory keeps its
/// trailing slash and is empty for top-level files.
pub fn split_path(full_path: &str) -> (&str, &str) {
    let idx = full_path.rfind('/').map(|i| i + 1).unwrap_or(0);
    full_path.split_at(idx)
}

fn intern_into(pool: &mut Vec<String>, map: &mut HashMap<String, u32>, value: &str) -> u32 {
    if let Some(&idx) = map.get(value) {
        return idx;
    }
    let idx = pool.len() as u32;
    pool.push(value.to_string());
    map.insert(value.to_string(), idx);
    idx
}

impl PathInternTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a full path, growing the pools only for unseen halves.
    pub fn intern(&mut self, full_path: &str) -> InternedPath {
        let (dir, name) = split_path(full_path);
        let dir_idx = intern_into(&mut self.dirs, &mut self.dir_map, dir);
        let name_idx = intern_into(&mut self.names, &mut self.name_map, name);
        InternedPath { dir_idx, name_idx }
    }

    /// Find an already-interned path without inserting anything.
    pub fn lookup(&self, full_path: &str) -> Option<InternedPath> {
        let (dir, name) = split_path(full_path);
        Some(InternedPath {
            dir_idx: *self.dir_map.get(dir)?,
            name_idx: *self.name_map.get(name)?,
        })
    }

    /// Rebuild the full path. Exact inverse of the split done by [`intern`](Self::intern).
    ///
    /// Returns an empty string for indices from another table (never happens for
    /// paths interned into this one).
    pub fn resolve(&self, path: InternedPath) -> String {
        let dir = self.dir(path.dir_idx).unwrap_or("");
        let name = self.name(path.name_idx).unwrap_or("");
        let mut full = String::with_capacity(dir.len() + name.len());
        full.push_str(dir);
        full.push_str(name);
        full
    }

    pub fn dir(&self, idx: u32) -> Option<&str> {
        self.dirs.get(idx as usize).map(String::as_str)
    }

    pub fn name(&self, idx: u32) -> Option<&str> {
        self.names.get(idx as usize).map(String::as_str)
    }

    pub fn dir_count(&self) -> usize {
        self.dirs.len()
    }

    pub fn name_count(&self) -> usize {
        self.names.len()
    }

    /// Drop every interned string. Only valid when no change record survives,
    /// i.e. together with a full cache clear on repository switch.
    pub fn clear(&mut self) {
        self.dirs.clear();
        self.names.clear();
        self.dir_map.clear();
        self.name_map.clear();
    }
}


// ─── Property-based tests (proptest) ─────────────────────────────────
