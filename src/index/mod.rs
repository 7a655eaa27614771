//! Index Module
//!
//! Ordered key → [`LogRecordPos`] mapping consulted on every read.
//!
//! ## Responsibilities
//! - Point lookups, inserts and deletes returning the replaced position
//! - Snapshot iteration in raw key-byte order, forwards or backwards
//! - Three interchangeable backends selected at open time
//!
//! ## Backends
//! - [`BTreeIndex`]: `BTreeMap` behind a `RwLock`, rebuilt on every open
//! - [`ArtIndex`]: adaptive radix tree, rebuilt on every open
//! - [`BPlusTreeIndex`]: `sled` tree on disk, survives restarts

mod art;
mod btree;
mod bptree;

use std::path::Path;

use crate::data::LogRecordPos;
use crate::error::Result;

pub use art::ArtIndex;
pub use bptree::{BPlusTreeIndex, BPTREE_INDEX_DIR_NAME};
pub use btree::BTreeIndex;

/// Index backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    /// In-memory balanced ordered tree
    BTree,

    /// In-memory adaptive radix tree
    Art,

    /// On-disk B+Tree
    BPlusTree,
}

impl IndexType {
    /// Whether index state survives a restart (no log replay on open)
    pub fn is_durable(self) -> bool {
        matches!(self, IndexType::BPlusTree)
    }
}

/// Operations every index backend provides
pub trait Indexer: Send + Sync {
    /// Insert or replace; returns the previous position
    fn put(&self, key: Vec<u8>, pos: LogRecordPos) -> Result<Option<LogRecordPos>>;

    fn get(&self, key: &[u8]) -> Result<Option<LogRecordPos>>;

    /// Remove `key`; `Some(old)` iff the key existed
    fn delete(&self, key: &[u8]) -> Result<Option<LogRecordPos>>;

    /// Number of keys
    fn size(&self) -> usize;

    /// Iterator over a snapshot of the index
    fn iterator(&self, reverse: bool) -> Box<dyn IndexIterator>;

    /// Make every applied mutation durable; a no-op for in-memory backends
    fn sync(&self) -> Result<()>;

    fn close(&self) -> Result<()>;
}

/// Cursor over index entries
pub trait IndexIterator {
    /// Back to the first entry (last, if reverse)
    fn rewind(&mut self);

    /// First key >= `key` (<= `key`, if reverse)
    fn seek(&mut self, key: &[u8]);

    fn next(&mut self);

    fn valid(&self) -> bool;

    /// Current key. Only meaningful while `valid()`
    fn key(&self) -> &[u8];

    /// Current position. Only meaningful while `valid()`
    fn value(&self) -> LogRecordPos;

    /// Release the snapshot
    fn close(&mut self);
}

/// The configured backend, dispatched statically
pub enum Index {
    BTree(BTreeIndex),
    Art(ArtIndex),
    BPlusTree(BPlusTreeIndex),
}

impl Index {
    /// Create the backend chosen by `index_type`; only the on-disk backend
    /// touches `dir`
    pub fn open(index_type: IndexType, dir: &Path) -> Result<Self> {
        Ok(match index_type {
            IndexType::BTree => Index::BTree(BTreeIndex::new()),
            IndexType::Art => Index::Art(ArtIndex::new()),
            IndexType::BPlusTree => Index::BPlusTree(BPlusTreeIndex::open(dir)?),
        })
    }
}

impl Indexer for Index {
    fn put(&self, key: Vec<u8>, pos: LogRecordPos) -> Result<Option<LogRecordPos>> {
        match self {
            Index::BTree(index) => index.put(key, pos),
            Index::Art(index) => index.put(key, pos),
            Index::BPlusTree(index) => index.put(key, pos),
        }
    }

    fn get(&self, key: &[u8]) -> Result<Option<LogRecordPos>> {
        match self {
            Index::BTree(index) => index.get(key),
            Index::Art(index) => index.get(key),
            Index::BPlusTree(index) => index.get(key),
        }
    }

    fn delete(&self, key: &[u8]) -> Result<Option<LogRecordPos>> {
        match self {
            Index::BTree(index) => index.delete(key),
            Index::Art(index) => index.delete(key),
            Index::BPlusTree(index) => index.delete(key),
        }
    }

    fn size(&self) -> usize {
        match self {
            Index::BTree(index) => index.size(),
            Index::Art(index) => index.size(),
            Index::BPlusTree(index) => index.size(),
        }
    }

    fn iterator(&self, reverse: bool) -> Box<dyn IndexIterator> {
        match self {
            Index::BTree(index) => index.iterator(reverse),
            Index::Art(index) => index.iterator(reverse),
            Index::BPlusTree(index) => index.iterator(reverse),
        }
    }

    fn sync(&self) -> Result<()> {
        match self {
            Index::BTree(index) => index.sync(),
            Index::Art(index) => index.sync(),
            Index::BPlusTree(index) => index.sync(),
        }
    }

    fn close(&self) -> Result<()> {
        match self {
            Index::BTree(index) => index.close(),
            Index::Art(index) => index.close(),
            Index::BPlusTree(index) => index.close(),
        }
    }
}

// =============================================================================
// Snapshot Iterator (shared by the in-memory backends)
// =============================================================================

/// Iterator over a copied, already-ordered list of entries
pub(crate) struct SnapshotIterator {
    /// Entries in iteration order (descending when reverse)
    items: Vec<(Vec<u8>, LogRecordPos)>,
    cursor: usize,
    reverse: bool,
}

impl SnapshotIterator {
    /// `items` must be in ascending key order; they are flipped for reverse
    pub(crate) fn new(mut items: Vec<(Vec<u8>, LogRecordPos)>, reverse: bool) -> Self {
        if reverse {
            items.reverse();
        }
        Self {
            items,
            cursor: 0,
            reverse,
        }
    }
}

impl IndexIterator for SnapshotIterator {
    fn rewind(&mut self) {
        self.cursor = 0;
    }

    fn seek(&mut self, key: &[u8]) {
        self.cursor = if self.reverse {
            self.items.partition_point(|(k, _)| k.as_slice() > key)
        } else {
            self.items.partition_point(|(k, _)| k.as_slice() < key)
        };
    }

    fn next(&mut self) {
        self.cursor += 1;
    }

    fn valid(&self) -> bool {
        self.cursor < self.items.len()
    }

    fn key(&self) -> &[u8] {
        &self.items[self.cursor].0
    }

    fn value(&self) -> LogRecordPos {
        self.items[self.cursor].1
    }

    fn close(&mut self) {
        self.items.clear();
        self.cursor = 0;
    }
}
