//! User overrides file.
//!
//! One directive per line:
//!
//! ```text
//! ads.example.com          # block
//! !cdn.example.com         # allow, overriding any block list
//! >internal.corp 10.0.0.5  # resolve to a fixed address
//! *.tracker.net            # wildcard form of any of the above hosts
//! ```
//!
//! Comments and blank lines are ignored, as is `localhost` in any form.

use std::fs;
use std::io::Write;
use std::net::IpAddr;
use std::path::Path;

use crate::index::{decision_for_ip, OverruleSet};
use crate::{Decision, Result};

/// One parsed override directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Override {
    pub host: String,
    pub decision: Decision,
    pub wildcard: bool,
}

/// Parse a single overrides-file line. Returns `None` for blanks, comments,
/// localhost, and lines that do not form a valid directive.
pub fn parse_line(line: &str) -> Option<Override> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let (decision, host) = if let Some(rest) = line.strip_prefix('!') {
        (Decision::Allowed, rest.trim())
    } else if let Some(rest) = line.strip_prefix('>') {
        let (host, ip) = rest.trim().split_once(char::is_whitespace)?;
        let ip: IpAddr = ip.trim().parse().ok()?;
        (decision_for_ip(ip), host)
    } else {
        (Decision::Blocked, line)
    };

    let (host, wildcard) = match host.strip_prefix("*.") {
        Some(stripped) if !stripped.is_empty() => (stripped, true),
        Some(_) => return None,
        None => (host, false),
    };

    if host.is_empty() || host.contains('*') || host.contains(char::is_whitespace) {
        return None;
    }
    let host = host.to_ascii_lowercase();
    if host == "localhost" {
        return None;
    }

    Some(Override {
        host,
        decision,
        wildcard,
    })
}

/// Render a directive back into its file form.
pub fn render(entry: &Override) -> String {
    let host = if entry.wildcard {
        format!("*.{}", entry.host)
    } else {
        entry.host.clone()
    };
    match &entry.decision {
        Decision::Blocked => host,
        Decision::Allowed => format!("!{}", host),
        Decision::MappedTo(ip) => format!(">{} {}", host, ip),
    }
}

/// Load an overrides file into an overrule set. A missing file yields an
/// empty set; unparsable lines are logged and skipped.
pub fn load(path: &Path) -> Result<OverruleSet> {
    let mut set = OverruleSet::new();
    for entry in load_entries(path)? {
        set.insert(&entry.host, entry.decision, entry.wildcard);
    }
    Ok(set)
}

/// Load the directives of an overrides file in file order, preserving
/// duplicates' last-wins semantics via the caller. A missing file yields an
/// empty list; unparsable lines are logged and skipped.
pub fn load_entries(path: &Path) -> Result<Vec<Override>> {
    let mut entries = Vec::new();
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
        Err(e) => return Err(e.into()),
    };

    for (lineno, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        match parse_line(line) {
            Some(entry) => entries.push(entry),
            None => log::warn!(
                "Skipping malformed override at {:?}:{}: {}",
                path,
                lineno + 1,
                trimmed
            ),
        }
    }
    Ok(entries)
}

/// Write the given directives, replacing the file content.
pub fn store(path: &Path, entries: &[Override]) -> Result<()> {
    let mut file = fs::File::create(path)?;
    for entry in entries {
        writeln!(file, "{}", render(entry))?;
    }
    Ok(())
}

/// Create an empty overrides file if none exists yet.
pub fn ensure_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::write(path, "# hostblock overrides\n")?;
    }
    Ok(())
}
