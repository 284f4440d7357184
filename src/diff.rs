//! Raw diff parser: turns `git diff-tree` / `git diff-index` raw output into a
//! [`ChangeRecord`].
//!
//! ## Line shapes
//!
//! ```text
//! :100644 100644 <sha> <sha> M\tsrc/main.rs            single parent, fast path
//! :100644 100644 <sha> <sha> R090\told.rs\tnew.rs      rename (C for copy)
//! ::100644 100644 100644 <sha> <sha> <sha> MM\tfile    combined merge
//! <sha>                                                parent boundary
//! ```
//!
//! With full 40-char ids the status letter sits at byte 97 and byte 98 is either
//! the tab (fast path) or the first digit of a similarity score. The parser
//! finds the status as the last space-separated token before the first tab, so
//! it classifies lines the same way without depending on id width.

use tracing::debug;

use crate::paths::PathInternTable;
use crate::revision::{ChangeEntry, ChangeRecord, ChangeStatus};

/// Parse one raw diff payload.
///
/// Never fails: lines that match no known shape contribute nothing. Every path
/// found is interned into `paths`; callers that share the table across threads
/// hold its write lock for the whole call.
pub fn parse_diff_format(payload: &str, paths: &mut PathInternTable) -> ChangeRecord {
    let mut rf = ChangeRecord::new();
    let mut parent: u32 = 1;

    for line in payload.split('\n') {
        if line.is_empty() {
            continue;
        }
        if line.starts_with(':') {
            parse_diff_line(&mut rf, line, parent, paths);
        } else {
            // Commit id header in `-m` output: following lines are against the next parent
            parent += 1;
        }
    }

    rf
}

/// Parse a single `:`-prefixed line into zero, one or two entries.
fn parse_diff_line(rf: &mut ChangeRecord, line: &str, parent: u32, paths: &mut PathInternTable) {
    if line.as_bytes().get(1) == Some(&b':') {
        // Combined merge: statuses like "RM" carry no origin or score, so the
        // file is shown as modified.
        let Some((_, path)) = line.rsplit_once('\t') else {
            debug!(line = %truncate(line), "Skipping combined diff line without path");
            return;
        };
        push(rf, paths, path, ChangeStatus::MODIFIED, None, parent);
        return;
    }

    let Some(tab) = line.find('\t') else {
        debug!(line = %truncate(line), "Skipping diff line without path");
        return;
    };
    let header = &line[..tab];
    let status = header.rsplit(' ').next().unwrap_or_default();

    match status.len() {
        0 => debug!(line = %truncate(line), "Skipping diff line without status"),
        1 => {
            let path = &line[tab + 1..];
            push(rf, paths, path, ChangeStatus::from_letter(status.as_bytes()[0]), None, parent);
        }
        // Status with a similarity score: rename or copy
        _ => set_ext_status(rf, &line[tab - status.len()..], parent, paths),
    }
}

/// Handle `R<NN>\t<orig>\t<dest>` / `C<NN>\t<orig>\t<dest>`.
///
/// The destination is recorded as a new file; for renames the origin is also
/// recorded as deleted. Both share the `"orig --> dest (NN%)"` annotation.
fn set_ext_status(rf: &mut ChangeRecord, row: &str, parent: u32, paths: &mut PathInternTable) {
    let fields: Vec<&str> = row.split('\t').filter(|f| !f.is_empty()).collect();
    if fields.len() != 3 {
        debug!(fields = fields.len(), row = %truncate(row), "Skipping malformed rename/copy line");
        return;
    }

    let (code, orig, dest) = (fields[0], fields[1], fields[2]);
    let kind = code.as_bytes()[0];
    if kind != b'R' && kind != b'C' {
        debug!(code = %code, "Skipping extended status that is neither rename nor copy");
        return;
    }
    let Ok(similarity) = code[1..].parse::<u32>() else {
        debug!(code = %code, "Skipping rename/copy with unparseable similarity");
        return;
    };

    let ext = format!("{} --> {} ({}%)", orig, dest, similarity);

    if kind == b'R' {
        push(rf, paths, dest, ChangeStatus::NEW, Some(ext.clone()), parent);
        push(rf, paths, orig, ChangeStatus::DELETED, Some(ext), parent);
    } else {
        push(rf, paths, dest, ChangeStatus::NEW, Some(ext), parent);
    }
    rf.set_only_modified(false);
}

fn push(
    rf: &mut ChangeRecord,
    paths: &mut PathInternTable,
    path: &str,
    status: ChangeStatus,
    ext_status: Option<String>,
    parent: u32,
) {
    let path = paths.intern(path);
    rf.push(ChangeEntry { path, status, ext_status, parent });
}

fn truncate(line: &str) -> &str {
    let mut end = line.len().min(100);
    while !line.is_char_boundary(end) {
        end -= 1;
    }
    &line[..end]
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
#[path = "diff_tests.rs"]
mod tests;
