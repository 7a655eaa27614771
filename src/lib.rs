//! # CaskKV
//!
//! A Bitcask-style embedded key-value storage engine with:
//! - Append-only segment files with CRC32-checked records
//! - Pluggable indexes (B-tree, adaptive radix tree, on-disk B+Tree)
//! - Atomic multi-key write batches
//! - Log compaction (merge) with hint files for fast restarts
//! - Single-writer/multi-reader concurrency model
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │          Engine API  (put / get / delete / iter / fold)     │
//! └──────┬──────────────────────┬──────────────────────┬────────┘
//!        │                      │                      │
//!        ▼                      ▼                      ▼
//! ┌─────────────┐        ┌─────────────┐        ┌─────────────┐
//! │ WriteBatch  │        │    Index    │        │    Merge    │
//! │ (seq + txn) │        │ key → pos   │        │ (compactor) │
//! └──────┬──────┘        └─────────────┘        └──────┬──────┘
//!        │                                             │
//!        ▼                                             ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Segment files: 000000000.data … (active) + hint-index      │
//! │                 (FileIo / read-only mmap at startup)        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use caskkv::{Config, Engine};
//!
//! # fn main() -> caskkv::Result<()> {
//! let engine = Engine::open(Config::builder().dir_path("/tmp/caskkv").build())?;
//! engine.put(b"name", b"cask")?;
//! assert_eq!(engine.get(b"name")?, Some(b"cask".to_vec()));
//! engine.close()?;
//! # Ok(())
//! # }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod fio;
pub mod data;
pub mod index;
pub mod engine;
pub mod iterator;
pub mod batch;
pub mod merge;

mod util;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{CaskError, Result};
pub use config::{Config, ConfigBuilder, IteratorOptions, SyncStrategy, WriteBatchOptions};
pub use engine::{Engine, Stat};
pub use iterator::EngineIterator;
pub use batch::WriteBatch;
pub use index::IndexType;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of CaskKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
