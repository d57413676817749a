//! hostblock - block-list ingestion, indexing, and hot reload for a
//! DNS-filtering agent.
//!
//! This crate turns raw hosts-file style block lists into a compact binary
//! index and keeps that index fresh, so a resolver can ask "what do I do
//! with this hostname" on its hot path.
//!
//! # Features
//!
//! - **Streaming ingestion**: byte-level tokenizer for hosts files and
//!   plain host lists, no per-line allocation
//! - **Binary index**: open-addressing hash table persisted to disk and
//!   memory-mapped back, with checksum and version checks
//! - **Hot reload**: rebuilt indexes swap in atomically under live queries
//! - **Overrides**: per-host allow, block, and fixed-address directives
//!   that always win over downloaded lists
//! - **Auto update**: background thread refreshes sources on an interval
//!   with failure backoff, stoppable without long blocking waits
//!
//! # Quick Start
//!
//! ```ignore
//! use hostblock::{Decision, EngineConfig, FilterEngine, FilterSource};
//!
//! let mut config = EngineConfig::new("/var/lib/hostblock");
//! config.sources.push(FilterSource {
//!     url: "https://example.com/hosts.txt".to_string(),
//!     enabled: true,
//! });
//!
//! let engine = FilterEngine::start(config)?;
//! match engine.decide("ads.example.com") {
//!     Decision::Blocked => { /* answer with the block address */ }
//!     Decision::Allowed => { /* resolve normally */ }
//!     Decision::MappedTo(ip) => { /* answer with ip */ }
//! }
//! engine.stop();
//! ```
//!
//! # Data directory
//!
//! The engine keeps everything under one directory: the canonical merged
//! download (`hosts.canonical`) with its entry-count sidecar, the binary
//! index (`hosts.idx`), an outdated marker that flags interrupted rebuilds,
//! the user overrides file, and an optional local `extra-hosts.txt` indexed
//! alongside the downloads.

mod abort;
mod canonical;
mod decision;
mod error;

pub mod config;
pub mod engine;
pub mod fetcher;
pub mod index;
pub mod overrides;
pub mod rebuild;
pub mod scheduler;
pub mod tokenizer;

// Re-export core types
pub use abort::AbortToken;
pub use decision::Decision;
pub use error::{Error, Result};

// Re-export the engine surface
pub use config::{EngineConfig, EnginePaths, FilterSource};
pub use engine::{EngineStats, FilterEngine};

// Re-export pipeline types for direct use
pub use fetcher::FetchOutcome;
pub use index::{BlockedIndex, IndexBuilder, IndexReader};
pub use overrides::Override;
pub use rebuild::{RebuildOutcome, RebuildReport};
pub use scheduler::AutoUpdater;
