//! CLI argument structs for all subcommands.

use clap::{Args, Parser};

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct RepoArgs {
    /// Repository directory (any path inside the work tree)
    #[arg(short, long, default_value = ".")]
    pub dir: String,

    /// git binary to run
    #[arg(long, default_value = "git")]
    pub git: String,

    /// Log level for stderr diagnostics: error, warn, info, debug, trace.
    /// RUST_LOG directives take precedence when set
    #[arg(long, default_value = "warn")]
    pub log_level: String,

    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,

    /// Disable rename/copy detection in diff queries
    #[arg(long)]
    pub no_renames: bool,
}

#[derive(Parser, Debug)]
pub struct LogArgs {
    #[command(flatten)]
    pub repo: RepoArgs,

    /// Maximum rows to print (the whole history is still loaded)
    #[arg(short = 'n', long, default_value = "50")]
    pub limit: usize,
}

#[derive(Parser, Debug)]
pub struct FilesArgs {
    /// Commit to list (hash, branch, HEAD~2, ... or 40 zeros for the working directory)
    pub commit: String,

    /// Compare against this commit instead of the parents
    #[arg(long)]
    pub to: Option<String>,

    /// For merges, list files against every parent instead of the combined view
    #[arg(long)]
    pub all_merge_files: bool,

    #[command(flatten)]
    pub repo: RepoArgs,
}

#[derive(Parser, Debug)]
pub struct WipArgs {
    #[command(flatten)]
    pub repo: RepoArgs,
}

#[derive(Parser, Debug)]
pub struct DiffArgs {
    /// Commit whose patch to print
    pub commit: String,

    /// Compare against this commit instead of the parents
    #[arg(long)]
    pub to: Option<String>,

    /// Limit to one file, shown with full context (needs a base: --to or the first parent)
    #[arg(long)]
    pub file: Option<String>,

    #[command(flatten)]
    pub repo: RepoArgs,
}

#[derive(Parser, Debug)]
pub struct HistoryArgs {
    /// Repository-relative file path
    pub file: String,

    #[command(flatten)]
    pub repo: RepoArgs,
}
