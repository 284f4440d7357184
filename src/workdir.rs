//! Working-directory pseudo-commit.
//!
//! Uncommitted state is gathered with four git round trips ([`collect`]) and then
//! folded into one [`ChangeRecord`] plus a synthetic [`CommitMeta`] with the zero
//! id ([`synthesize`]). Collection and synthesis are split so synthesis can be
//! tested on canned payloads.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::commit::{CommitId, CommitMeta};
use crate::diff::parse_diff_format;
use crate::error::RevCacheError;
use crate::paths::PathInternTable;
use crate::revision::{ChangeEntry, ChangeRecord, ChangeStatus};
use crate::runner::{CancelToken, CommandRunner};

pub const NO_LOCAL_CHANGES: &str = "No local changes";
pub const LOCAL_CHANGES: &str = "Local changes";

/// Author and committer shown on the pseudo-commit.
const WIP_IDENTITY: &str = "-";

/// Raw payloads describing uncommitted state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkingDirInfo {
    /// `git status` text, shown verbatim.
    pub status: String,
    /// `None` in a repository without commits.
    pub head: Option<CommitId>,
    /// Working tree vs HEAD, raw format.
    pub diff_index: String,
    /// Index vs HEAD, raw format.
    pub diff_index_cached: String,
    /// Untracked paths, ignore rules applied.
    pub other_files: Vec<String>,
}

/// Run the git commands that describe uncommitted state.
///
/// Any failed run aborts the whole collection. A HEAD that does not resolve is
/// not a failure: both diffs stay empty.
pub fn collect(runner: &dyn CommandRunner, cancel: &CancelToken) -> Result<WorkingDirInfo, RevCacheError> {
    // Also refreshes stat info in the index so diff-index skips touched-but-equal files
    let status = runner.run(&["status"], cancel)?;

    let head = match runner.run(&["rev-parse", "--revs-only", "HEAD"], cancel) {
        Ok(out) => CommitId::parse(out.trim()),
        Err(RevCacheError::CommandFailed { stderr, .. }) => {
            debug!(stderr = %stderr, "HEAD does not resolve, treating as empty base");
            None
        }
        Err(e) => return Err(e),
    };

    let (diff_index, diff_index_cached) = match &head {
        Some(head) => (
            runner.run(&["diff-index", head.as_str()], cancel)?,
            runner.run(&["diff-index", "--cached", head.as_str()], cancel)?,
        ),
        None => (String::new(), String::new()),
    };

    let exclude_from = runner
        .git_dir()
        .and_then(info_exclude)
        .map(|path| format!("--exclude-from={}", path.display()));
    let mut args = vec!["ls-files", "--others"];
    if let Some(arg) = &exclude_from {
        args.push(arg);
    }
    args.push("--exclude-per-directory=.gitignore");
    let others = runner.run(&args, cancel)?;
    let other_files = others
        .lines()
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    Ok(WorkingDirInfo { status, head, diff_index, diff_index_cached, other_files })
}

/// `<git dir>/info/exclude`, when the file exists.
fn info_exclude(git_dir: &Path) -> Option<PathBuf> {
    let path = git_dir.join("info").join("exclude");
    path.is_file().then_some(path)
}

/// Fold collected payloads into the pseudo-commit's change record and metadata.
///
/// Entries come from the working-tree diff, then every untracked path as
/// `UNKNOWN`. An entry that also appears in the index diff gets `IN_INDEX`, and
/// `CONFLICT` when the index reports it unmerged.
pub fn synthesize(info: &WorkingDirInfo, paths: &mut PathInternTable, now: i64) -> (ChangeRecord, CommitMeta) {
    let mut rf = parse_diff_format(&info.diff_index, paths);
    rf.set_only_modified(false);

    for file in &info.other_files {
        rf.push(ChangeEntry {
            path: paths.intern(file),
            status: ChangeStatus::UNKNOWN,
            ext_status: None,
            parent: 1,
        });
    }

    let cached = parse_diff_format(&info.diff_index_cached, paths);
    for idx in 0..rf.len() {
        let Some(path) = rf.get(idx).map(|e| e.path) else { continue };
        if let Some(cached_entry) = cached.position(path).and_then(|pos| cached.get(pos)) {
            let mut flags = ChangeStatus::IN_INDEX;
            if cached_entry.status.contains(ChangeStatus::CONFLICT) {
                flags.insert(ChangeStatus::CONFLICT);
            }
            rf.append_status(idx, flags);
        }
    }

    // Literal rule: a tree whose only changes are untracked files reads as clean
    let short_log = if rf.len() == info.other_files.len() {
        NO_LOCAL_CHANGES
    } else {
        LOCAL_CHANGES
    };

    let meta = CommitMeta {
        id: CommitId::zero(),
        parents: info.head.iter().cloned().collect(),
        author_name: WIP_IDENTITY.to_string(),
        author_email: String::new(),
        committer_name: WIP_IDENTITY.to_string(),
        committer_email: String::new(),
        timestamp: now,
        short_log: short_log.to_string(),
        long_log: String::new(),
        status: info.status.clone(),
        is_wip: true,
        is_boundary: false,
        order_idx: 0,
    };

    (rf, meta)
}

/// Seconds since the Unix epoch; 0 if the clock is before it.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::CancelSignal;
    use crate::test_utils::{ScriptedRunner, TestRepo};

    const HEAD: &str = "abcdefabcdefabcdefabcdefabcdefabcdefabcd";
    const OLD: &str = "1111111111111111111111111111111111111111";
    const ZERO: &str = "0000000000000000000000000000000000000000";

    fn raw(status: &str, path: &str) -> String {
        format!(":100644 100644 {} {} {}\t{}\n", OLD, ZERO, status, path)
    }

    fn info(diff: &str, cached: &str, others: &[&str]) -> WorkingDirInfo {
        WorkingDirInfo {
            status: "On branch main\n".to_string(),
            head: CommitId::parse(HEAD),
            diff_index: diff.to_string(),
            diff_index_cached: cached.to_string(),
            other_files: others.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_single_untracked_file_reads_as_no_local_changes() {
        let mut paths = PathInternTable::new();
        let (rf, meta) = synthesize(&info("", "", &["new.txt"]), &mut paths, 42);

        assert_eq!(rf.len(), 1);
        assert_eq!(rf.entries()[0].status, ChangeStatus::UNKNOWN);
        assert_eq!(rf.entries()[0].parent, 1);
        assert_eq!(rf.file_path(&paths, 0).as_deref(), Some("new.txt"));
        assert_eq!(meta.short_log, NO_LOCAL_CHANGES);
        assert!(!rf.only_modified());
    }

    #[test]
    fn test_modified_file_reads_as_local_changes() {
        let mut paths = PathInternTable::new();
        let (rf, meta) = synthesize(&info(&raw("M", "src/a.rs"), "", &["tmp.log"]), &mut paths, 42);

        assert_eq!(rf.len(), 2);
        assert_eq!(rf.entries()[0].status, ChangeStatus::MODIFIED);
        assert_eq!(rf.entries()[1].status, ChangeStatus::UNKNOWN);
        assert_eq!(meta.short_log, LOCAL_CHANGES);
    }

    #[test]
    fn test_only_modified_is_false_even_without_structural_changes() {
        let mut paths = PathInternTable::new();
        let (rf, _) = synthesize(&info(&raw("M", "a"), "", &[]), &mut paths, 0);
        assert!(!rf.only_modified());
    }

    #[test]
    fn test_staged_entry_gets_in_index() {
        let diff = format!("{}{}", raw("M", "staged.rs"), raw("M", "unstaged.rs"));
        let cached = raw("M", "staged.rs");
        let mut paths = PathInternTable::new();
        let (rf, _) = synthesize(&info(&diff, &cached, &[]), &mut paths, 0);

        assert!(rf.entries()[0].status.contains(ChangeStatus::IN_INDEX));
        assert!(rf.entries()[0].status.contains(ChangeStatus::MODIFIED));
        assert!(!rf.entries()[1].status.contains(ChangeStatus::IN_INDEX));
    }

    #[test]
    fn test_conflict_comes_from_matching_cached_entry() {
        let diff = format!("{}{}", raw("M", "ok.rs"), raw("U", "clash.rs"));
        let cached = format!("{}{}", raw("M", "ok.rs"), raw("U", "clash.rs"));
        let mut paths = PathInternTable::new();
        let (rf, _) = synthesize(&info(&diff, &cached, &[]), &mut paths, 0);

        let ok = rf.find(&paths, "ok.rs").unwrap();
        let clash = rf.find(&paths, "clash.rs").unwrap();
        assert!(!rf.entries()[ok].status.contains(ChangeStatus::CONFLICT));
        assert!(rf.entries()[clash].status.contains(ChangeStatus::CONFLICT));
        assert!(rf.entries()[clash].status.contains(ChangeStatus::IN_INDEX));
    }

    #[test]
    fn test_meta_fields() {
        let mut paths = PathInternTable::new();
        let (_, meta) = synthesize(&info("", "", &[]), &mut paths, 1_700_000_123);

        assert!(meta.id.is_zero());
        assert!(meta.is_wip);
        assert_eq!(meta.parents, vec![CommitId::parse(HEAD).unwrap()]);
        assert_eq!(meta.author_name, "-");
        assert_eq!(meta.committer_name, "-");
        assert_eq!(meta.timestamp, 1_700_000_123);
        assert_eq!(meta.status, "On branch main\n");
        assert_eq!(meta.order_idx, 0);
        // Empty record, zero untracked: the count rule says clean
        assert_eq!(meta.short_log, NO_LOCAL_CHANGES);
    }

    #[test]
    fn test_unborn_head_has_no_parent() {
        let mut paths = PathInternTable::new();
        let unborn = WorkingDirInfo { head: None, ..info("", "", &["a"]) };
        let (_, meta) = synthesize(&unborn, &mut paths, 0);
        assert!(meta.parents.is_empty());
    }

    #[test]
    fn test_collect_with_scripted_runner() {
        let runner = ScriptedRunner::new()
            .on("status", "On branch main\n")
            .on("rev-parse --revs-only HEAD", &format!("{}\n", HEAD))
            .on(&format!("diff-index {}", HEAD), &raw("M", "a.rs"))
            .on(&format!("diff-index --cached {}", HEAD), "")
            .on("ls-files --others --exclude-per-directory=.gitignore", "x.tmp\ny.tmp\n");

        let got = collect(&runner, &CancelSignal::new().token()).expect("all commands scripted");
        assert_eq!(got.head, CommitId::parse(HEAD));
        assert_eq!(got.other_files, vec!["x.tmp", "y.tmp"]);
        assert_eq!(got.diff_index, raw("M", "a.rs"));
    }

    #[test]
    fn test_collect_unresolvable_head_skips_diffs() {
        let runner = ScriptedRunner::new()
            .on("status", "No commits yet\n")
            .fail("rev-parse --revs-only HEAD", "fatal: ambiguous argument 'HEAD'")
            .on("ls-files --others --exclude-per-directory=.gitignore", "first.txt\n");

        let got = collect(&runner, &CancelSignal::new().token()).expect("empty base is not an error");
        assert!(got.head.is_none());
        assert!(got.diff_index.is_empty());
        assert_eq!(runner.call_count("diff-index"), 0);
    }

    #[test]
    fn test_collect_transport_failure_aborts() {
        let runner = ScriptedRunner::new()
            .on("status", "")
            .on("rev-parse --revs-only HEAD", HEAD)
            .fail(&format!("diff-index {}", HEAD), "fatal: index file corrupt");

        let err = collect(&runner, &CancelSignal::new().token()).unwrap_err();
        assert!(matches!(err, RevCacheError::CommandFailed { .. }));
        assert_eq!(runner.call_count("ls-files"), 0);
    }

    #[test]
    fn test_collect_against_real_repository() {
        let Some(repo) = TestRepo::init() else { return };
        repo.write("tracked.txt", "v1\n");
        repo.write(".gitignore", "*.log\n");
        repo.commit_all("init");

        repo.write("tracked.txt", "v2\n");
        repo.write("staged.txt", "s\n");
        repo.git(&["add", "staged.txt"]);
        repo.write("untracked.txt", "u\n");
        repo.write("ignored.log", "i\n");

        let git = crate::runner::GitCli::discover(repo.path(), "git").unwrap();
        let got = collect(&git, &CancelSignal::new().token()).unwrap();
        assert_eq!(got.other_files, vec!["untracked.txt"]);

        let mut paths = PathInternTable::new();
        let (rf, meta) = synthesize(&got, &mut paths, unix_now());
        assert_eq!(meta.short_log, LOCAL_CHANGES);

        let staged = rf.find(&paths, "staged.txt").expect("staged file listed");
        assert!(rf.entries()[staged].status.contains(ChangeStatus::NEW));
        assert!(rf.entries()[staged].status.contains(ChangeStatus::IN_INDEX));
        let tracked = rf.find(&paths, "tracked.txt").expect("modified file listed");
        assert!(!rf.entries()[tracked].status.contains(ChangeStatus::IN_INDEX));
        assert!(rf.find(&paths, "ignored.log").is_none());
    }
}
