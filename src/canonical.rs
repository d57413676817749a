//! Canonical list header and the entry-count sidecar.
//!
//! The canonical list is the merged download of every enabled source. Its
//! first line records when it was fetched and from which URLs, so a change
//! in the configured source set is detectable without re-downloading. The
//! sidecar caches the entry count so a rebuild can skip the sizing pass, and
//! carries the canonical file's mtime so a stale count is never trusted.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::Result;

const HEADER_PREFIX: &str = "# Downloaded by ";
const URLS_MARKER: &str = " from URLs: ";

fn agent() -> String {
    format!("hostblock/{}", env!("CARGO_PKG_VERSION"))
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Render the canonical list header line (without trailing newline).
pub fn header_line(urls: &[String]) -> String {
    format!(
        "{}{} at: {}{}{}",
        HEADER_PREFIX,
        agent(),
        unix_now(),
        URLS_MARKER,
        urls.join(", ")
    )
}

/// Extract the source URL list from a canonical header line.
///
/// Returns `None` for anything that is not a well-formed header, including
/// lists written by hand or by an incompatible version.
pub fn parse_header_urls(line: &str) -> Option<Vec<String>> {
    let rest = line.strip_prefix(HEADER_PREFIX)?;
    let (_, urls) = rest.split_once(URLS_MARKER)?;
    Some(
        urls.split(", ")
            .map(str::to_string)
            .filter(|u| !u.is_empty())
            .collect(),
    )
}

/// Read just the header line of a canonical list file.
pub fn read_header_urls(path: &Path) -> Option<Vec<String>> {
    use std::io::BufRead;
    let file = fs::File::open(path).ok()?;
    let mut line = String::new();
    std::io::BufReader::new(file).read_line(&mut line).ok()?;
    parse_header_urls(line.trim_end())
}

/// Whether the canonical list at `path` was fetched from exactly `urls`,
/// in order. A missing or unparsable header counts as drift.
pub fn matches_sources(path: &Path, urls: &[String]) -> bool {
    match read_header_urls(path) {
        Some(recorded) => recorded == urls,
        None => false,
    }
}

/// Entry-count sidecar for a canonical list.
///
/// Two lines: the raw (pre-dedup) entry count, then the unix mtime of the
/// canonical file at the moment the sidecar was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sidecar {
    pub entry_count: u64,
    pub list_modified: i64,
}

impl Sidecar {
    /// Build a sidecar for the canonical list currently at `canonical`.
    pub fn for_list(canonical: &Path, entry_count: u64) -> Result<Self> {
        Ok(Self {
            entry_count,
            list_modified: file_mtime(canonical)?,
        })
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let mut file = fs::File::create(path)?;
        write!(file, "{}\n{}\n", self.entry_count, self.list_modified)?;
        Ok(())
    }

    /// Read a sidecar, returning `None` if missing or malformed.
    pub fn read(path: &Path) -> Option<Self> {
        let content = fs::read_to_string(path).ok()?;
        let mut lines = content.lines();
        let entry_count = lines.next()?.trim().parse().ok()?;
        let list_modified = lines.next()?.trim().parse().ok()?;
        Some(Self {
            entry_count,
            list_modified,
        })
    }

    /// Whether this sidecar still describes the canonical list at `canonical`.
    pub fn valid_for(&self, canonical: &Path) -> bool {
        matches!(file_mtime(canonical), Ok(mtime) if mtime == self.list_modified)
    }
}

/// Unix mtime of a file in whole seconds.
pub fn file_mtime(path: &Path) -> Result<i64> {
    let modified = fs::metadata(path)?.modified()?;
    Ok(modified
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64)
}
