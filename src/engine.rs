//! Filter engine facade.
//!
//! Owns the runtime index, the counters, and the auto-update thread, and
//! exposes the query and control surface the resolver embeds.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::canonical;
use crate::config::{EngineConfig, EnginePaths};
use crate::fetcher::{self, FetchOutcome};
use crate::index::BlockedIndex;
use crate::overrides::{self, Override};
use crate::rebuild::{self, RebuildOutcome};
use crate::scheduler::AutoUpdater;
use crate::{AbortToken, Decision, Result};

/// Counters exposed by [`FilterEngine::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStats {
    pub allowed: u64,
    pub blocked: u64,
    pub mapped: u64,
    /// Unique entries in the live bulk index.
    pub index_entries: u32,
    /// Bumped each time a rebuilt index goes live.
    pub index_generation: u64,
    pub overrules: usize,
}

/// The block-list engine.
///
/// Queries are lock-free against a hot-swappable index; a background
/// thread refreshes the block lists on the configured interval. Dropping
/// the engine stops that thread.
pub struct FilterEngine {
    paths: EnginePaths,
    index: Arc<BlockedIndex>,
    allowed: AtomicU64,
    blocked: AtomicU64,
    mapped: AtomicU64,
    updater: AutoUpdater,
}

impl FilterEngine {
    /// Validate the configuration, restore state from the data directory,
    /// and start the auto-update thread.
    ///
    /// A valid persisted index is loaded as-is; a missing, corrupt, or
    /// outdated one is rebuilt from the canonical list when possible.
    /// Failing both, the engine starts with an empty index and the first
    /// scheduled update fills it. Queries are answerable from the moment
    /// this returns.
    pub fn start(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let paths = config.paths();
        std::fs::create_dir_all(&config.data_dir)?;
        overrides::ensure_exists(&paths.overrides)?;

        let index = Arc::new(BlockedIndex::empty(
            config.allowed_cache_size,
            config.blocked_cache_size,
        ));
        index.set_overrules(overrides::load(&paths.overrides)?);

        let urls = config.enabled_urls();
        let sources_match = canonical::matches_sources(&paths.canonical, &urls);

        if !rebuild::needs_rebuild(&paths) {
            // a drifted source set does not invalidate the index: keep
            // filtering on the stale list until the re-download lands
            index.migrate_to(crate::index::IndexReader::open(
                &paths.index,
                config.eager_index_load,
            )?);
            if !sources_match && !urls.is_empty() {
                log::info!("Configured sources changed, scheduling immediate re-download");
            }
        } else if paths.canonical.exists() && sources_match {
            log::info!("Persisted index unusable, rebuilding from canonical list");
            rebuild::rebuild_index(&config, &paths, &index, &AbortToken::new())?;
        } else if !urls.is_empty() {
            log::info!("No usable block list on disk, scheduling immediate download");
        }

        let initial_delay = if sources_match {
            next_reload_delay(&paths, config.reload_interval_days)
        } else {
            Duration::ZERO
        };

        let interval = Duration::from_secs(config.reload_interval_days * 24 * 3600);
        let update_index = Arc::clone(&index);
        let update_config = config.clone();
        let update_paths = paths.clone();
        let updater = AutoUpdater::start(initial_delay, interval, move |abort| {
            run_update(&update_config, &update_paths, &update_index, abort)
        });

        Ok(Self {
            paths,
            index,
            allowed: AtomicU64::new(0),
            blocked: AtomicU64::new(0),
            mapped: AtomicU64::new(0),
            updater,
        })
    }

    /// Decide the fate of a queried hostname.
    pub fn decide(&self, host: &str) -> Decision {
        let decision = self.index.decide(host);
        let counter = match decision {
            Decision::Allowed => &self.allowed,
            Decision::Blocked => &self.blocked,
            Decision::MappedTo(_) => &self.mapped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        decision
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            allowed: self.allowed.load(Ordering::Relaxed),
            blocked: self.blocked.load(Ordering::Relaxed),
            mapped: self.mapped.load(Ordering::Relaxed),
            index_entries: self.index.entry_count(),
            index_generation: self.index.generation(),
            overrules: self.index.overrule_count(),
        }
    }

    /// Request an immediate fetch-and-rebuild. Ignored while one is
    /// already running.
    pub fn trigger_reload_now(&self) {
        self.updater.trigger_now();
    }

    pub fn is_rebuild_in_progress(&self) -> bool {
        self.updater.is_update_in_flight()
    }

    /// Replace the override set, both on disk and live.
    pub fn set_overrides(&self, entries: &[Override]) -> Result<()> {
        overrides::store(&self.paths.overrides, entries)?;
        self.index.set_overrules(overrides::load(&self.paths.overrides)?);
        Ok(())
    }

    /// Upsert raw directive lines into the override set.
    ///
    /// In blocklist mode plain hosts block; otherwise they allow. Explicit
    /// `!` and `>` prefixes keep their meaning in both modes. Only the
    /// named hosts are touched; every other existing override is carried
    /// over unchanged. Unparsable lines are dropped with a warning.
    pub fn update_overrides(&self, entries: &[&str], as_blocklist: bool) -> Result<()> {
        let mut merged = overrides::load_entries(&self.paths.overrides)?;
        for line in entries {
            let trimmed = line.trim();
            let prefixed = matches!(trimmed.chars().next(), Some('!') | Some('>') | Some('#'));
            let line = if as_blocklist || prefixed {
                trimmed.to_string()
            } else {
                format!("!{}", trimmed)
            };
            let entry = match overrides::parse_line(&line) {
                Some(entry) => entry,
                None => {
                    log::warn!("Dropping malformed override entry: {}", trimmed);
                    continue;
                }
            };
            match merged
                .iter()
                .position(|e| e.host == entry.host && e.wildcard == entry.wildcard)
            {
                Some(i) => merged[i].decision = entry.decision,
                None => merged.push(entry),
            }
        }
        self.set_overrides(&merged)
    }

    /// Re-read the overrides file after an external edit.
    pub fn reload_overrides(&self) -> Result<()> {
        self.index.set_overrules(overrides::load(&self.paths.overrides)?);
        Ok(())
    }

    /// Stop the auto-update thread, aborting any in-flight rebuild, and
    /// wait for it to finish.
    pub fn stop(self) {
        self.updater.stop();
    }
}

/// One scheduled update: download every source, then rebuild and swap the
/// index. An observed abort is a clean outcome, not a failure.
fn run_update(
    config: &EngineConfig,
    paths: &EnginePaths,
    index: &BlockedIndex,
    abort: &AbortToken,
) -> Result<()> {
    let urls = config.enabled_urls();
    match fetcher::fetch_sources(&urls, paths, abort)? {
        FetchOutcome::Aborted => return Ok(()),
        FetchOutcome::Completed { .. } => {}
    }
    match rebuild::rebuild_index(config, paths, index, abort)? {
        RebuildOutcome::Aborted => Ok(()),
        RebuildOutcome::Completed(_) => Ok(()),
    }
}

/// Time until the canonical list is due for a refresh, based on its age.
fn next_reload_delay(paths: &EnginePaths, interval_days: u64) -> Duration {
    let interval = Duration::from_secs(interval_days * 24 * 3600);
    let Ok(mtime) = canonical::file_mtime(&paths.canonical) else {
        return Duration::ZERO;
    };
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;
    let age = Duration::from_secs((now - mtime).max(0) as u64);
    interval.saturating_sub(age)
}
