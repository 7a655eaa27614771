//! B-tree index
//!
//! `BTreeMap`-based index with RwLock for concurrency.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::data::LogRecordPos;
use crate::error::Result;

use super::{IndexIterator, Indexer, SnapshotIterator};

/// In-memory ordered index
#[derive(Default)]
pub struct BTreeIndex {
    tree: RwLock<BTreeMap<Vec<u8>, LogRecordPos>>,
}

impl BTreeIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Indexer for BTreeIndex {
    fn put(&self, key: Vec<u8>, pos: LogRecordPos) -> Result<Option<LogRecordPos>> {
        Ok(self.tree.write().insert(key, pos))
    }

    fn get(&self, key: &[u8]) -> Result<Option<LogRecordPos>> {
        Ok(self.tree.read().get(key).copied())
    }

    fn delete(&self, key: &[u8]) -> Result<Option<LogRecordPos>> {
        Ok(self.tree.write().remove(key))
    }

    fn size(&self) -> usize {
        self.tree.read().len()
    }

    fn iterator(&self, reverse: bool) -> Box<dyn IndexIterator> {
        let items = self
            .tree
            .read()
            .iter()
            .map(|(key, pos)| (key.clone(), *pos))
            .collect();
        Box::new(SnapshotIterator::new(items, reverse))
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}
