//! Commit identifiers, commit metadata, and the `git log -z` record parser.

use std::fmt;

use serde::Serialize;

// ─── Constants ──────────────────────────────────────────────────────

/// Sentinel id of the working-directory pseudo-commit.
pub const ZERO_SHA: &str = "0000000000000000000000000000000000000000";

/// Pretty format requested from `git log`; one record per commit, records
/// separated by NUL (`-z`).
///
/// ```text
/// <mark><hash>X<parent> <parent>...
/// <committer name><<committer email>>
/// <author name><<author email>>
/// <unix timestamp>
/// <subject>
/// <body...>
/// ```
pub const GIT_LOG_FORMAT: &str = "%m%HX%P%n%cn<%ce>%n%an<%ae>%n%at%n%s%n%b";

/// Record separator in `git log -z` output.
pub const RECORD_SEP: u8 = b'\0';

/// Prefix git prints before each record when `--log-size` is passed.
const LOG_SIZE_PREFIX: &str = "log size ";

// ─── Commit identifiers ─────────────────────────────────────────────

/// Opaque commit hash (40 hex chars for SHA-1 repos, 64 for SHA-256).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CommitId(String);

impl CommitId {
    /// Parse a hex hash. Returns `None` for anything that is not 40 or 64 hex chars.
    pub fn parse(hex: &str) -> Option<Self> {
        let valid_len = hex.len() == 40 || hex.len() == 64;
        if valid_len && hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            Some(CommitId(hex.to_ascii_lowercase()))
        } else {
            None
        }
    }

    /// The working-directory pseudo-commit id.
    pub fn zero() -> Self {
        CommitId(ZERO_SHA.to_string())
    }

    pub fn is_zero(&self) -> bool {
        self.0 == ZERO_SHA
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 8 characters, for display and logs.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(8)]
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ─── Commit metadata ────────────────────────────────────────────────

/// Everything the history view needs about one commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CommitMeta {
    pub id: CommitId,
    /// Empty only for root commits; two or more for merges.
    pub parents: Vec<CommitId>,
    pub author_name: String,
    pub author_email: String,
    pub committer_name: String,
    pub committer_email: String,
    /// Unix timestamp (seconds since epoch).
    pub timestamp: i64,
    pub short_log: String,
    pub long_log: String,
    /// Raw `git status` text; only set on the working-directory pseudo-commit.
    pub status: String,
    /// True for the working-directory pseudo-commit.
    pub is_wip: bool,
    /// Boundary commit of a limited walk (`-` mark).
    pub is_boundary: bool,
    /// Display row; 0 is reserved for the pseudo-commit.
    pub order_idx: usize,
}

impl CommitMeta {
    pub fn parent_count(&self) -> usize {
        self.parents.len()
    }

    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    /// `(subject, trimmed body)`.
    pub fn split_message(&self) -> (&str, &str) {
        (&self.short_log, self.long_log.trim())
    }
}

/// Split `Name<email>` into its two halves. A missing `<` yields an empty email.
fn split_identity(field: &str) -> (String, String) {
    match field.rfind('<') {
        Some(lt) => {
            let name = field[..lt].trim_end();
            let email = field[lt + 1..].trim_end_matches('>');
            (name.to_string(), email.to_string())
        }
        None => (field.trim().to_string(), String::new()),
    }
}

// ─── Record parser ──────────────────────────────────────────────────

/// Parse one NUL-separated `git log` record into a [`CommitMeta`].
///
/// Returns `None` when a required field is missing or malformed: hash line,
/// committer, author, numeric timestamp and subject line must all be present.
/// The body is optional.
pub fn parse_log_record(record: &str, order_idx: usize) -> Option<CommitMeta> {
    let mut record = record.trim_start_matches('\n');
    if record.starts_with(LOG_SIZE_PREFIX) {
        record = record.split_once('\n')?.1;
    }

    let mut lines = record.splitn(6, '\n');
    let header = lines.next()?;
    let committer = lines.next()?;
    let author = lines.next()?;
    let timestamp = lines.next()?;
    let subject = lines.next()?;
    let body = lines.next().unwrap_or_default();

    // Boundary mark is one ASCII char: '-', '<', '>' or ' '
    let mark = header.as_bytes().first().copied()?;
    if !mark.is_ascii() {
        return None;
    }
    let (hash, parents) = header[1..].split_once('X').unwrap_or((&header[1..], ""));
    let id = CommitId::parse(hash)?;
    let parents = parents
        .split(' ')
        .filter(|p| !p.is_empty())
        .map(CommitId::parse)
        .collect::<Option<Vec<_>>>()?;

    if committer.is_empty() || author.is_empty() {
        return None;
    }
    let timestamp: i64 = timestamp.trim().parse().ok()?;
    let (committer_name, committer_email) = split_identity(committer);
    let (author_name, author_email) = split_identity(author);

    Some(CommitMeta {
        id,
        parents,
        author_name,
        author_email,
        committer_name,
        committer_email,
        timestamp,
        short_log: subject.to_string(),
        long_log: body.to_string(),
        status: String::new(),
        is_wip: false,
        is_boundary: mark == b'-',
        order_idx,
    })
}
