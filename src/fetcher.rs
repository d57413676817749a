//! Block-list source fetcher.
//!
//! Downloads every enabled source in order, streams each body through the
//! tokenizer, and merges the normalized entries into the canonical list.
//! The canonical list is written to a temp file and renamed into place only
//! after every source succeeded; an abort or a failing source leaves the
//! previous canonical list untouched.

use flate2::read::{GzDecoder, ZlibDecoder};
use std::fs;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use crate::canonical::{self, Sidecar};
use crate::config::EnginePaths;
use crate::tokenizer::{strip_supported_wildcard, HostTokenizer};
use crate::{AbortToken, Error, Result};

/// Result of a fetch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// All sources merged into a fresh canonical list.
    Completed {
        /// Entries written, duplicates included.
        entries: u64,
        /// Entries dropped for an unsupported wildcard shape.
        skipped_wildcards: u64,
    },
    /// Cancellation observed; no files were replaced.
    Aborted,
}

/// Fetch all `urls` and replace the canonical list and its sidecar.
///
/// On any source error the temp file is removed and the error is returned
/// tagged with the offending URL.
pub fn fetch_sources(
    urls: &[String],
    paths: &EnginePaths,
    abort: &AbortToken,
) -> Result<FetchOutcome> {
    let tmp = paths.canonical.with_extension("canonical.tmp");
    let outcome = write_canonical(urls, &tmp, abort);

    match outcome {
        Ok(FetchOutcome::Completed {
            entries,
            skipped_wildcards,
        }) => {
            let committed = fs::rename(&tmp, &paths.canonical).map_err(Error::from).and_then(
                |()| Sidecar::for_list(&paths.canonical, entries)?.write(&paths.sidecar),
            );
            if let Err(e) = committed {
                let _ = fs::remove_file(&tmp);
                return Err(e);
            }
            log::info!(
                "Fetched {} sources: {} entries ({} unsupported wildcards skipped)",
                urls.len(),
                entries,
                skipped_wildcards
            );
            Ok(FetchOutcome::Completed {
                entries,
                skipped_wildcards,
            })
        }
        Ok(FetchOutcome::Aborted) => {
            let _ = fs::remove_file(&tmp);
            log::info!("Fetch aborted, canonical list unchanged");
            Ok(FetchOutcome::Aborted)
        }
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            Err(e)
        }
    }
}

fn write_canonical(urls: &[String], tmp: &Path, abort: &AbortToken) -> Result<FetchOutcome> {
    let file = fs::File::create(tmp)?;
    let mut out = BufWriter::new(file);
    writeln!(out, "{}", canonical::header_line(urls))?;

    let mut entries = 0u64;
    let mut skipped_wildcards = 0u64;

    for url in urls {
        let body = open_source(url).map_err(|e| e.for_source(url))?;
        let mut tokenizer = HostTokenizer::new(body);
        let mut source_entries = 0u64;

        loop {
            if abort.is_aborted() {
                return Ok(FetchOutcome::Aborted);
            }
            let entry = match tokenizer.next_entry().map_err(|e| e.for_source(url))? {
                Some(entry) => entry,
                None => break,
            };

            let host = if entry.wildcard {
                match strip_supported_wildcard(entry.host) {
                    Some(stripped) => stripped,
                    None => {
                        skipped_wildcards += 1;
                        continue;
                    }
                }
            } else {
                entry.host
            };

            let host = String::from_utf8_lossy(host).to_ascii_lowercase();
            // the resolver's own name never belongs in a block list
            if host == "localhost" {
                continue;
            }

            out.write_all(host.as_bytes())?;
            out.write_all(b"\n")?;
            entries += 1;
            source_entries += 1;
        }

        log::debug!("Fetched {}: {} entries", url, source_entries);
    }

    let file = out
        .into_inner()
        .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;
    file.sync_all()?;

    Ok(FetchOutcome::Completed {
        entries,
        skipped_wildcards,
    })
}

/// Open a source URL as a decoded byte stream.
///
/// `file://` URLs read the local path directly and exist mainly so fetch
/// paths can be exercised without a network. HTTP bodies are decoded
/// according to the Content-Encoding header; any encoding beyond gzip,
/// deflate, and identity is a hard error.
fn open_source(url: &str) -> Result<Box<dyn Read>> {
    if let Some(path) = url.strip_prefix("file://") {
        let file = fs::File::open(path)?;
        return Ok(wrap_by_suffix(url, Box::new(file)));
    }

    let response = ureq::get(url)
        .set("Accept-Encoding", "gzip, deflate, identity")
        .call()
        .map_err(|e| match e {
            ureq::Error::Status(code, _) => Error::Download {
                url: url.to_string(),
                reason: format!("HTTP status {}", code),
            },
            ureq::Error::Transport(t) => Error::Download {
                url: url.to_string(),
                reason: t.to_string(),
            },
        })?;

    let encoding = response
        .header("Content-Encoding")
        .unwrap_or("identity")
        .to_ascii_lowercase();
    let body = response.into_reader();

    match encoding.as_str() {
        "identity" => Ok(wrap_by_suffix(url, Box::new(body))),
        "gzip" | "x-gzip" => Ok(Box::new(GzDecoder::new(body))),
        "deflate" => Ok(Box::new(ZlibDecoder::new(body))),
        other => Err(Error::UnsupportedEncoding(other.to_string())),
    }
}

/// Lists served as plain `.gz` files arrive with an identity encoding; the
/// suffix is the only signal that the payload itself is compressed.
fn wrap_by_suffix(url: &str, body: Box<dyn Read>) -> Box<dyn Read> {
    if url.ends_with(".gz") {
        Box::new(GzDecoder::new(body))
    } else {
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical;

    fn paths_in(dir: &Path) -> EnginePaths {
        EnginePaths::new(dir)
    }

    fn file_url(path: &Path) -> String {
        format!("file://{}", path.display())
    }

    #[test]
    fn test_fetch_merges_sources_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        fs::write(&a, "ads.example.com\n127.0.0.1 tracker.net\n").unwrap();
        fs::write(&b, "# comment\nmore.ads.net\n").unwrap();

        let paths = paths_in(dir.path());
        let urls = vec![file_url(&a), file_url(&b)];
        let outcome = fetch_sources(&urls, &paths, &AbortToken::new()).unwrap();
        assert_eq!(
            outcome,
            FetchOutcome::Completed {
                entries: 3,
                skipped_wildcards: 0
            }
        );

        let content = fs::read_to_string(&paths.canonical).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(canonical::parse_header_urls(lines[0]), Some(urls));
        assert_eq!(&lines[1..], &["ads.example.com", "tracker.net", "more.ads.net"]);

        let sidecar = Sidecar::read(&paths.sidecar).unwrap();
        assert_eq!(sidecar.entry_count, 3);
        assert!(sidecar.valid_for(&paths.canonical));
    }

    #[test]
    fn test_wildcards_stripped_or_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.txt");
        fs::write(&src, "*.ads.example.com\nads.*.example.com\nplain.com\n").unwrap();

        let paths = paths_in(dir.path());
        let outcome =
            fetch_sources(&[file_url(&src)], &paths, &AbortToken::new()).unwrap();
        assert_eq!(
            outcome,
            FetchOutcome::Completed {
                entries: 2,
                skipped_wildcards: 1
            }
        );

        let content = fs::read_to_string(&paths.canonical).unwrap();
        assert!(content.contains("\nads.example.com\n"));
        assert!(!content.contains('*'));
    }

    #[test]
    fn test_localhost_and_case_normalization() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.txt");
        fs::write(&src, "127.0.0.1 localhost\n0.0.0.0 ADS.Example.COM\n").unwrap();

        let paths = paths_in(dir.path());
        let outcome =
            fetch_sources(&[file_url(&src)], &paths, &AbortToken::new()).unwrap();
        assert_eq!(
            outcome,
            FetchOutcome::Completed {
                entries: 1,
                skipped_wildcards: 0
            }
        );
        let content = fs::read_to_string(&paths.canonical).unwrap();
        assert!(content.contains("\nads.example.com\n"));
        assert!(!content.contains("localhost"));
    }

    #[test]
    fn test_failing_source_keeps_previous_list() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.txt");
        fs::write(&good, "first.com\n").unwrap();

        let paths = paths_in(dir.path());
        fetch_sources(&[file_url(&good)], &paths, &AbortToken::new()).unwrap();
        let before = fs::read_to_string(&paths.canonical).unwrap();

        let missing = file_url(&dir.path().join("missing.txt"));
        let result = fetch_sources(
            &[file_url(&good), missing.clone()],
            &paths,
            &AbortToken::new(),
        );
        match result {
            Err(Error::Source { url, .. }) => assert_eq!(url, missing),
            other => panic!("expected source error, got {:?}", other),
        }

        assert_eq!(fs::read_to_string(&paths.canonical).unwrap(), before);
        assert!(!paths.canonical.with_extension("canonical.tmp").exists());
    }

    #[test]
    fn test_commit_failure_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.txt");
        fs::write(&src, "a.com\n").unwrap();

        let paths = paths_in(dir.path());
        // a directory at the canonical path makes the rename fail
        fs::create_dir(&paths.canonical).unwrap();

        let result = fetch_sources(&[file_url(&src)], &paths, &AbortToken::new());
        assert!(result.is_err());
        assert!(!paths.canonical.with_extension("canonical.tmp").exists());
    }

    #[test]
    fn test_abort_leaves_previous_list() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.txt");
        fs::write(&src, "a.com\nb.com\n").unwrap();

        let paths = paths_in(dir.path());
        fetch_sources(&[file_url(&src)], &paths, &AbortToken::new()).unwrap();
        let before = fs::read_to_string(&paths.canonical).unwrap();

        let token = AbortToken::new();
        token.abort();
        let outcome = fetch_sources(&[file_url(&src)], &paths, &token).unwrap();
        assert_eq!(outcome, FetchOutcome::Aborted);
        assert_eq!(fs::read_to_string(&paths.canonical).unwrap(), before);
    }

    #[test]
    fn test_gzip_file_source() {
        use flate2::write::GzEncoder;
        use flate2::Compression;

        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("hosts.txt.gz");
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"packed.example.com\n").unwrap();
        fs::write(&src, encoder.finish().unwrap()).unwrap();

        let paths = paths_in(dir.path());
        let outcome =
            fetch_sources(&[file_url(&src)], &paths, &AbortToken::new()).unwrap();
        assert_eq!(
            outcome,
            FetchOutcome::Completed {
                entries: 1,
                skipped_wildcards: 0
            }
        );
        let content = fs::read_to_string(&paths.canonical).unwrap();
        assert!(content.contains("packed.example.com"));
    }

    #[test]
    fn test_zero_sources_writes_header_only_list() {
        let dir = tempfile::tempdir().unwrap();
        let paths = paths_in(dir.path());
        let outcome = fetch_sources(&[], &paths, &AbortToken::new()).unwrap();
        assert_eq!(
            outcome,
            FetchOutcome::Completed {
                entries: 0,
                skipped_wildcards: 0
            }
        );
        let content = fs::read_to_string(&paths.canonical).unwrap();
        assert_eq!(content.lines().count(), 1);
    }
}
