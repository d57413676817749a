//! Block-list index: binary format, two-phase builder, mmap reader, and the
//! hot-swappable runtime wrapper with overrules and decision caches.

pub mod builder;
pub mod format;
pub mod reader;

pub use builder::IndexBuilder;
pub use reader::{check_index_version, IndexReader};

use arc_swap::ArcSwap;
use parking_lot::RwLock;
use quick_cache::sync::Cache;
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::{Decision, Result};

/// Manual overrides layered over the bulk index.
///
/// Exact entries match one hostname; wildcard entries match the hostname and
/// every subdomain of it. Overrules always win over the bulk index.
#[derive(Debug, Default)]
pub struct OverruleSet {
    exact: HashMap<String, Decision, ahash::RandomState>,
    wildcard: HashMap<String, Decision, ahash::RandomState>,
}

impl OverruleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, host: &str, decision: Decision, wildcard: bool) {
        let map = if wildcard {
            &mut self.wildcard
        } else {
            &mut self.exact
        };
        map.insert(host.to_ascii_lowercase(), decision);
    }

    pub fn remove(&mut self, host: &str, wildcard: bool) -> Option<Decision> {
        let map = if wildcard {
            &mut self.wildcard
        } else {
            &mut self.exact
        };
        map.remove(&host.to_ascii_lowercase())
    }

    pub fn clear(&mut self) {
        self.exact.clear();
        self.wildcard.clear();
    }

    pub fn len(&self) -> usize {
        self.exact.len() + self.wildcard.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.wildcard.is_empty()
    }

    /// Look up `host`, most specific match first.
    pub fn lookup(&self, host: &str) -> Option<Decision> {
        if let Some(decision) = self.exact.get(host) {
            return Some(*decision);
        }
        let mut current = host;
        loop {
            if let Some(decision) = self.wildcard.get(current) {
                return Some(*decision);
            }
            match current.find('.') {
                Some(pos) => current = &current[pos + 1..],
                None => return None,
            }
        }
    }
}

/// Runtime block-list index.
///
/// Wraps the persisted reader behind an atomic pointer so lookups stay
/// lock-free while a rebuild swaps in a replacement. Decision caches only
/// hold bulk-index verdicts; overrules are consulted before them and so
/// never need a cache flush on edit.
pub struct BlockedIndex {
    reader: ArcSwap<IndexReader>,
    swap_gate: RwLock<()>,
    overrules: RwLock<OverruleSet>,
    allowed_cache: Cache<String, ()>,
    blocked_cache: Cache<String, ()>,
    generation: AtomicU64,
}

impl BlockedIndex {
    /// An index with no bulk entries, usable from the first query.
    pub fn empty(allowed_cache_size: usize, blocked_cache_size: usize) -> Self {
        Self::with_reader(IndexReader::empty(), allowed_cache_size, blocked_cache_size)
    }

    /// Load a persisted index from disk.
    pub fn load(
        path: &Path,
        eager: bool,
        allowed_cache_size: usize,
        blocked_cache_size: usize,
    ) -> Result<Self> {
        let reader = IndexReader::open(path, eager)?;
        log::info!(
            "Loaded block-list index: {} entries from {:?}",
            reader.entry_count(),
            path
        );
        Ok(Self::with_reader(
            reader,
            allowed_cache_size,
            blocked_cache_size,
        ))
    }

    fn with_reader(
        reader: IndexReader,
        allowed_cache_size: usize,
        blocked_cache_size: usize,
    ) -> Self {
        Self {
            reader: ArcSwap::from_pointee(reader),
            swap_gate: RwLock::new(()),
            overrules: RwLock::new(OverruleSet::new()),
            allowed_cache: Cache::new(allowed_cache_size.max(1)),
            blocked_cache: Cache::new(blocked_cache_size.max(1)),
            generation: AtomicU64::new(0),
        }
    }

    /// Decide the fate of a hostname.
    ///
    /// Precedence: overrules, then cached verdicts, then the bulk index with
    /// its dot-suffix walk. Hostnames are matched case-insensitively.
    pub fn decide(&self, host: &str) -> Decision {
        let host = host.to_ascii_lowercase();
        let host = host.trim_end_matches('.');

        if let Some(decision) = self.overrules.read().lookup(host) {
            return decision;
        }

        if self.blocked_cache.get(host).is_some() {
            return Decision::Blocked;
        }
        if self.allowed_cache.get(host).is_some() {
            return Decision::Allowed;
        }

        let _read = self.swap_gate.read();
        let blocked = self.reader.load().contains(host);
        drop(_read);

        if blocked {
            self.blocked_cache.insert(host.to_string(), ());
            Decision::Blocked
        } else {
            self.allowed_cache.insert(host.to_string(), ());
            Decision::Allowed
        }
    }

    /// Atomically replace the bulk index with a freshly built one.
    ///
    /// Cached verdicts from the old generation are dropped; overrules are
    /// untouched and remain in force.
    pub fn migrate_to(&self, reader: IndexReader) {
        let entries = reader.entry_count();
        {
            let _write = self.swap_gate.write();
            self.reader.store(Arc::new(reader));
            self.allowed_cache.clear();
            self.blocked_cache.clear();
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        log::info!(
            "Migrated to index generation {}: {} entries",
            generation,
            entries
        );
    }

    /// Drop all cached verdicts and replace the bulk index with an empty
    /// one. Overrules stay in force.
    pub fn clear(&self) {
        let _write = self.swap_gate.write();
        self.reader.store(Arc::new(IndexReader::empty()));
        self.allowed_cache.clear();
        self.blocked_cache.clear();
    }

    /// Install or replace an overrule.
    pub fn add_overrule(&self, host: &str, decision: Decision, wildcard: bool) {
        self.overrules.write().insert(host, decision, wildcard);
    }

    /// Remove an overrule. Returns the decision it carried, if present.
    pub fn remove_overrule(&self, host: &str, wildcard: bool) -> Option<Decision> {
        self.overrules.write().remove(host, wildcard)
    }

    /// Drop every overrule.
    pub fn clear_overrules(&self) {
        self.overrules.write().clear();
    }

    /// Replace the whole overrule set in one critical section.
    pub fn set_overrules(&self, set: OverruleSet) {
        *self.overrules.write() = set;
    }

    pub fn overrule_count(&self) -> usize {
        self.overrules.read().len()
    }

    /// Number of unique entries in the current bulk index.
    pub fn entry_count(&self) -> u32 {
        self.reader.load().entry_count()
    }

    /// Monotonic counter bumped on every migration.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

/// Map an overrides-file IP to a decision.
///
/// The conventional sink addresses keep their blocking meaning; anything
/// else becomes a custom mapping.
pub fn decision_for_ip(ip: IpAddr) -> Decision {
    let sink = match ip {
        IpAddr::V4(v4) => v4.is_unspecified() || v4.is_loopback(),
        IpAddr::V6(v6) => v6.is_unspecified() || v6.is_loopback(),
    };
    if sink {
        Decision::Blocked
    } else {
        Decision::MappedTo(ip)
    }
}
