//! Adaptive radix tree index
//!
//! Same contract as [`BTreeIndex`](super::BTreeIndex), but backed by an
//! [`AdaptiveRadixTree`], which stays compact for keys sharing long prefixes.

mod tree;

use parking_lot::RwLock;

use crate::data::LogRecordPos;
use crate::error::Result;

use super::{IndexIterator, Indexer, SnapshotIterator};

pub use tree::AdaptiveRadixTree;

/// In-memory radix tree index
#[derive(Default)]
pub struct ArtIndex {
    tree: RwLock<AdaptiveRadixTree<LogRecordPos>>,
}

impl ArtIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Indexer for ArtIndex {
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
        let tree = self.tree.read();
        let mut items = Vec::with_capacity(tree.len());
        tree.for_each(|key, pos| items.push((key.to_vec(), *pos)));
        Box::new(SnapshotIterator::new(items, reverse))
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}
