//! Index rebuild pipeline.
//!
//! Rebuilds the binary index from the canonical list (plus the optional
//! extra-hosts file) in two passes: a sizing pass that a valid sidecar can
//! replace, then the insert pass that also deduplicates. The outdated
//! marker file is present from the moment a rebuild starts until the new
//! index is persisted and live, so a crash anywhere in between is detected
//! at the next startup.

use std::fs;
use std::io::{BufRead, BufWriter, Write};
use std::path::Path;

use crate::canonical::Sidecar;
use crate::config::{EngineConfig, EnginePaths};
use crate::index::{check_index_version, BlockedIndex, IndexBuilder, IndexReader};
use crate::tokenizer::{strip_supported_wildcard, HostTokenizer};
use crate::{AbortToken, Result};

const PROGRESS_EVERY: u64 = 100_000;

/// Counters from a completed rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuildReport {
    /// Entries read from the canonical list and extra-hosts file.
    pub processed: u64,
    /// Entries that made it into the index after deduplication.
    pub unique_entries: u64,
}

/// Result of a rebuild run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildOutcome {
    Completed(RebuildReport),
    /// Cancellation observed. The outdated marker is left in place so the
    /// next startup rebuilds from the canonical list.
    Aborted,
}

/// Whether the persisted index must be rebuilt before it can be trusted:
/// either a previous rebuild never finished, or the file is missing,
/// corrupt, or from an incompatible version.
pub fn needs_rebuild(paths: &EnginePaths) -> bool {
    paths.outdated_marker.exists() || !check_index_version(&paths.index)
}

/// Rebuild the index from the canonical list and swap it live.
///
/// Overrules are held outside the bulk index and stay in force across the
/// swap. When `remove_duplicates` is set and the insert pass found any, the
/// canonical list is rewritten without them, keeping its header line, and
/// the sidecar is corrected to the unique count.
pub fn rebuild_index(
    config: &EngineConfig,
    paths: &EnginePaths,
    index: &BlockedIndex,
    abort: &AbortToken,
) -> Result<RebuildOutcome> {
    fs::write(&paths.outdated_marker, b"rebuild in progress\n")?;
    let mut builder = IndexBuilder::new();

    // sizing pass, skipped when the sidecar still matches the list
    match Sidecar::read(&paths.sidecar).filter(|s| s.valid_for(&paths.canonical)) {
        Some(sidecar) => {
            log::debug!(
                "Sizing from sidecar: {} entries, sizing pass skipped",
                sidecar.entry_count
            );
            builder.final_prepare_with(sidecar.entry_count as usize);
        }
        None => {
            for path in [&paths.canonical, &paths.extra_hosts] {
                if !scan_hosts(path, abort, |host| builder.prepare_insert(host))? {
                    return Ok(RebuildOutcome::Aborted);
                }
            }
            builder.final_prepare();
        }
    }

    // insert pass; duplicates are filtered here and optionally streamed
    // into a rewritten canonical list
    let mut rewrite = if config.remove_duplicates {
        Some(DedupRewrite::begin(&paths.canonical)?)
    } else {
        None
    };

    let mut processed = 0u64;
    let mut canonical_processed = 0u64;
    let mut canonical_unique = 0u64;
    let completed = scan_hosts(&paths.canonical, abort, |host| {
        processed += 1;
        canonical_processed += 1;
        if processed % PROGRESS_EVERY == 0 {
            log::debug!("Indexing: {} entries processed", processed);
        }
        if builder.add(host) {
            canonical_unique += 1;
            if let Some(rewrite) = rewrite.as_mut() {
                rewrite.push(host);
            }
        }
    })?;
    if !completed {
        if let Some(rewrite) = rewrite {
            rewrite.discard();
        }
        return Ok(RebuildOutcome::Aborted);
    }

    let completed = scan_hosts(&paths.extra_hosts, abort, |host| {
        processed += 1;
        builder.add(host);
    })?;
    if !completed {
        if let Some(rewrite) = rewrite {
            rewrite.discard();
        }
        return Ok(RebuildOutcome::Aborted);
    }

    if let Some(rewrite) = rewrite {
        if canonical_unique < canonical_processed {
            rewrite.commit()?;
            Sidecar::for_list(&paths.canonical, canonical_unique)?.write(&paths.sidecar)?;
            log::info!(
                "Rewrote canonical list without duplicates: {} unique of {} entries",
                canonical_unique,
                canonical_processed
            );
        } else {
            rewrite.discard();
        }
    }

    let report = RebuildReport {
        processed,
        unique_entries: builder.len() as u64,
    };

    builder.persist(&paths.index)?;
    let reader = IndexReader::open(&paths.index, config.eager_index_load)?;
    index.migrate_to(reader);
    fs::remove_file(&paths.outdated_marker)?;

    log::info!(
        "Rebuild complete: {} processed, {} unique",
        report.processed,
        report.unique_entries
    );
    Ok(RebuildOutcome::Completed(report))
}

/// Stream the normalized hosts of a list file into `f`.
///
/// Missing files count as empty. Returns `false` if the abort token fired
/// before the file was fully scanned.
fn scan_hosts(path: &Path, abort: &AbortToken, mut f: impl FnMut(&str)) -> Result<bool> {
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(e.into()),
    };

    let mut tokenizer = HostTokenizer::new(file);
    loop {
        if abort.is_aborted() {
            return Ok(false);
        }
        let entry = match tokenizer.next_entry()? {
            Some(entry) => entry,
            None => return Ok(true),
        };

        let host = if entry.wildcard {
            match strip_supported_wildcard(entry.host) {
                Some(stripped) => stripped,
                None => continue,
            }
        } else {
            entry.host
        };

        let host = String::from_utf8_lossy(host).to_ascii_lowercase();
        if host == "localhost" {
            continue;
        }
        f(&host);
    }
}

/// Deduplicated rewrite of the canonical list, built alongside the insert
/// pass and committed only when duplicates were actually found.
struct DedupRewrite {
    tmp: std::path::PathBuf,
    target: std::path::PathBuf,
    out: BufWriter<fs::File>,
}

impl DedupRewrite {
    fn begin(canonical: &Path) -> Result<Self> {
        let tmp = canonical.with_extension("canonical.dedup");
        let mut out = BufWriter::new(fs::File::create(&tmp)?);
        if let Some(header) = read_header_line(canonical)? {
            writeln!(out, "{}", header)?;
        }
        Ok(Self {
            tmp,
            target: canonical.to_path_buf(),
            out,
        })
    }

    fn push(&mut self, host: &str) {
        // deferred error check: commit() surfaces any write failure via flush
        let _ = self.out.write_all(host.as_bytes());
        let _ = self.out.write_all(b"\n");
    }

    fn commit(mut self) -> Result<()> {
        self.out.flush()?;
        drop(self.out);
        fs::rename(&self.tmp, &self.target)?;
        Ok(())
    }

    fn discard(self) {
        drop(self.out);
        let _ = fs::remove_file(&self.tmp);
    }
}

fn read_header_line(path: &Path) -> Result<Option<String>> {
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut line = String::new();
    std::io::BufReader::new(file).read_line(&mut line)?;
    let line = line.trim_end();
    if line.starts_with('#') {
        Ok(Some(line.to_string()))
    } else {
        Ok(None)
    }
}
