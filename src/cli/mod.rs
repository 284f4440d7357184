//! CLI layer: argument parsing, command dispatch, and subcommand implementations.

pub mod args;

pub use args::*;

use std::path::Path;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, info, warn};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

use revcache::{
    ChangeRecord, ChangeStatus, CommitId, CommitMeta, GitCli, IngestionController, LoadEvent,
    RepoSession, RevCacheError, SessionOptions,
};

// ─── CLI ─────────────────────────────────────────────────────────────

/// Load git history and per-commit file changes into an in-memory cache
#[derive(Parser, Debug)]
#[command(name = "revcache", version, about, after_help = "\
Run 'revcache <COMMAND> --help' for detailed options.\n\
Common options: -d <DIR> (repository), --json (machine-readable output), --log-level debug")]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    /// Stream the full history (all refs, date order) and print the newest rows
    Log(LogArgs),

    /// List files changed by a commit
    Files(FilesArgs),

    /// Show uncommitted changes as a pseudo-commit
    Wip(WipArgs),

    /// Print the patch of a commit, or the full-context diff of one file
    Diff(DiffArgs),

    /// List commits that touched a file, following renames
    History(HistoryArgs),
}

impl Commands {
    fn repo(&self) -> &RepoArgs {
        match self {
            Commands::Log(a) => &a.repo,
            Commands::Files(a) => &a.repo,
            Commands::Wip(a) => &a.repo,
            Commands::Diff(a) => &a.repo,
            Commands::History(a) => &a.repo,
        }
    }
}

// ─── Main entry point ───────────────────────────────────────────────

pub fn run() {
    let cli = Cli::parse();
    init_logging(&cli.command.repo().log_level);

    let result = match cli.command {
        Commands::Log(args) => cmd_log(args),
        Commands::Files(args) => cmd_files(args),
        Commands::Wip(args) => cmd_wip(args),
        Commands::Diff(args) => cmd_diff(args),
        Commands::History(args) => cmd_history(args),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn parse_log_level(level: &str) -> tracing::Level {
    match level {
        "error" => tracing::Level::ERROR,
        "info" => tracing::Level::INFO,
        "debug" => tracing::Level::DEBUG,
        "trace" => tracing::Level::TRACE,
        _ => tracing::Level::WARN,
    }
}

/// `RUST_LOG` directives when given, else `--log-level` for everything.
fn log_filter(level: &str, directives: Option<&str>) -> EnvFilter {
    let builder = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(parse_log_level(level)).into());
    match directives {
        Some(d) if !d.trim().is_empty() => builder.parse_lossy(d),
        _ => builder.parse_lossy(""),
    }
}

fn init_logging(level: &str) {
    let env = std::env::var("RUST_LOG").ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(level, env.as_deref()))
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Discover the repository, build a session, and route Ctrl-C to `cancel_all`.
fn open_session(repo: &RepoArgs) -> Result<Arc<RepoSession>, RevCacheError> {
    let git = GitCli::discover(Path::new(&repo.dir), &repo.git)?;
    info!(work_dir = %git.work_dir().display(), "Opened repository");

    let options = SessionOptions { rename_detection: !repo.no_renames };
    let session = Arc::new(RepoSession::new(Arc::new(git), options));

    let on_signal = Arc::clone(&session);
    if let Err(e) = ctrlc::set_handler(move || on_signal.cancel_all()) {
        warn!(error = %e, "Could not install Ctrl-C handler");
    }
    Ok(session)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), RevCacheError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ─── Formatting ─────────────────────────────────────────────────────

/// One changed path, resolved for output.
#[derive(Serialize, Debug, PartialEq, Eq)]
pub(crate) struct FileRow {
    pub path: String,
    pub status: char,
    pub staged: bool,
    pub conflict: bool,
    pub parent: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext_status: Option<String>,
}

pub(crate) fn file_rows(session: &RepoSession, record: &ChangeRecord) -> Vec<FileRow> {
    record
        .entries()
        .iter()
        .map(|e| FileRow {
            path: session.resolve(e.path),
            status: e.status.letter(),
            staged: e.status.contains(ChangeStatus::IN_INDEX),
            conflict: e.status.contains(ChangeStatus::CONFLICT),
            parent: e.parent,
            ext_status: e.ext_status.clone(),
        })
        .collect()
}

pub(crate) fn format_file_row(row: &FileRow) -> String {
    let mut line = format!("{}\t{}", row.status, row.path);
    if row.staged {
        line.push_str("  [staged]");
    }
    if row.parent > 1 {
        line.push_str(&format!("  (parent {})", row.parent));
    }
    if let Some(ext) = &row.ext_status {
        line.push_str(&format!("  {}", ext));
    }
    line
}

pub(crate) fn format_commit_row(meta: &CommitMeta) -> String {
    let mark = if meta.is_wip {
        '*'
    } else if meta.is_boundary {
        '-'
    } else if meta.is_merge() {
        'M'
    } else {
        ' '
    };
    let id = if meta.is_wip { "working " } else { meta.id.short() };
    format!(
        "{} {} {}  {:<20} {}",
        mark,
        id,
        format_utc_date(meta.timestamp),
        meta.author_name,
        meta.short_log
    )
}

/// Format a Unix timestamp as "YYYY-MM-DD HH:MM" (UTC).
pub(crate) fn format_utc_date(timestamp: i64) -> String {
    let secs_per_day: i64 = 86400;
    let days = timestamp.div_euclid(secs_per_day);
    let time_of_day = timestamp.rem_euclid(secs_per_day);
    let hours = time_of_day / 3600;
    let minutes = (time_of_day % 3600) / 60;

    // Civil-from-days (proleptic Gregorian)
    let days_civil = days + 719468;
    let era = if days_civil >= 0 { days_civil } else { days_civil - 146096 } / 146097;
    let doe = (days_civil - era * 146097) as u32;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };

    format!("{:04}-{:02}-{:02} {:02}:{:02}", y, m, d, hours, minutes)
}

// ─── Commands ───────────────────────────────────────────────────────

fn cmd_log(args: LogArgs) -> Result<(), RevCacheError> {
    let session = open_session(&args.repo)?;
    let controller = IngestionController::new(Arc::clone(&session));
    let handle = controller.start()?;

    for event in handle.events().iter() {
        if let LoadEvent::Progress { chunks, commits } = &event {
            debug!(chunks, commits, "Load progress");
        }
        if event.is_terminal() {
            break;
        }
    }

    let summary = handle.wait();
    match summary.outcome {
        LoadEvent::Failed { commits, message } => {
            return Err(RevCacheError::LoadFailed { commits, message });
        }
        LoadEvent::Cancelled { commits } => {
            warn!(commits, "Load cancelled, printing partial history");
        }
        _ => {}
    }

    let rows = session.commit_rows(0, args.limit);
    if args.repo.json {
        return print_json(&rows);
    }
    for meta in &rows {
        println!("{}", format_commit_row(meta));
    }
    eprintln!("{} of {} rows", rows.len(), session.total_commits());
    Ok(())
}

fn cmd_files(args: FilesArgs) -> Result<(), RevCacheError> {
    let session = open_session(&args.repo)?;
    let id = session.resolve_revision(&args.commit)?;
    let to = args.to.as_deref().map(|rev| session.resolve_revision(rev)).transpose()?;

    let record = session.diff_files(&id, to.as_ref(), args.all_merge_files)?;
    let rows = file_rows(&session, &record);
    if args.repo.json {
        return print_json(&rows);
    }
    for row in &rows {
        println!("{}", format_file_row(row));
    }
    Ok(())
}

#[derive(Serialize)]
struct WipReport<'a> {
    commit: &'a CommitMeta,
    nothing_to_commit: bool,
    files: Vec<FileRow>,
}

fn cmd_wip(args: WipArgs) -> Result<(), RevCacheError> {
    let session = open_session(&args.repo)?;
    session.update_wip_revision()?;

    let meta = session
        .commit(&CommitId::zero())
        .ok_or_else(|| RevCacheError::UnknownRevision(CommitId::zero().to_string()))?;
    let files = session.wip_files().map(|r| file_rows(&session, &r)).unwrap_or_default();

    if args.repo.json {
        return print_json(&WipReport {
            commit: &meta,
            nothing_to_commit: session.is_nothing_to_commit(),
            files,
        });
    }
    println!("{}", meta.short_log);
    for row in &files {
        println!("{}", format_file_row(row));
    }
    Ok(())
}

fn cmd_diff(args: DiffArgs) -> Result<(), RevCacheError> {
    let session = open_session(&args.repo)?;
    let id = session.resolve_revision(&args.commit)?;
    let to = args.to.as_deref().map(|rev| session.resolve_revision(rev)).transpose()?;

    let text = match &args.file {
        Some(file) => {
            let previous = match to {
                Some(to) => to,
                None if id.is_zero() => session.resolve_revision("HEAD")?,
                None => session.resolve_revision(&format!("{}^", id))?,
            };
            session.file_diff(&id, &previous, file)?
        }
        None => session.commit_diff(&id, to.as_ref())?,
    };

    if args.repo.json {
        return print_json(&serde_json::json!({ "commit": id, "diff": text }));
    }
    print!("{}", text);
    Ok(())
}

fn cmd_history(args: HistoryArgs) -> Result<(), RevCacheError> {
    let session = open_session(&args.repo)?;
    let ids = session.file_history(&args.file)?;
    if args.repo.json {
        return print_json(&ids);
    }
    for id in &ids {
        println!("{}", id);
    }
    Ok(())
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_utc_date() {
        assert_eq!(format_utc_date(0), "1970-01-01 00:00");
        assert_eq!(format_utc_date(1_700_000_000), "2023-11-14 22:13");
        assert_eq!(format_utc_date(951_782_400), "2000-02-29 00:00");
        assert_eq!(format_utc_date(-60), "1969-12-31 23:59");
    }

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("debug"), tracing::Level::DEBUG);
        assert_eq!(parse_log_level("error"), tracing::Level::ERROR);
        assert_eq!(parse_log_level("bogus"), tracing::Level::WARN);
    }

    #[test]
    fn test_log_filter_level_and_env_override() {
        assert_eq!(log_filter("debug", None).max_level_hint(), Some(LevelFilter::DEBUG));
        assert_eq!(log_filter("error", Some("  ")).max_level_hint(), Some(LevelFilter::ERROR));
        assert_eq!(log_filter("warn", Some("trace")).max_level_hint(), Some(LevelFilter::TRACE));
    }

    #[test]
    fn test_format_file_row() {
        let row = FileRow {
            path: "src/new.rs".to_string(),
            status: 'A',
            staged: true,
            conflict: false,
            parent: 2,
            ext_status: Some("src/old.rs --> src/new.rs (90%)".to_string()),
        };
        assert_eq!(
            format_file_row(&row),
            "A\tsrc/new.rs  [staged]  (parent 2)  src/old.rs --> src/new.rs (90%)"
        );
    }

    #[test]
    fn test_format_commit_row_marks() {
        let meta = revcache::parse_log_record(
            &format!(
                ">{}X{} {}\nC<c@x>\nAlice<a@x>\n1700000000\nMerge branch\n",
                "a".repeat(40),
                "b".repeat(40),
                "c".repeat(40)
            ),
            1,
        )
        .unwrap();
        let line = format_commit_row(&meta);
        assert!(line.starts_with("M aaaaaaaa 2023-11-14 22:13"));
        assert!(line.ends_with("Merge branch"));
    }
}
