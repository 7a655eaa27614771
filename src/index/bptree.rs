//! On-disk B+Tree index
//!
//! Persists key → position entries in a `sled` tree stored under
//! `{dir}/bptree-index`, so opening a directory does not replay its log.
//! Positions are stored in their varint encoding ([`LogRecordPos::encode`]).
//!
//! Iteration is lazy: the cursor walks the live tree instead of copying it.

use std::path::Path;

use sled::{Db, IVec};
use tracing::warn;

use crate::data::LogRecordPos;
use crate::error::Result;

use super::{IndexIterator, Indexer};

/// Directory holding the on-disk index inside the database directory
pub const BPTREE_INDEX_DIR_NAME: &str = "bptree-index";

/// Durable ordered index
pub struct BPlusTreeIndex {
    db: Db,
}

impl BPlusTreeIndex {
    /// Open (or create) the index stored under `dir`
    pub fn open(dir: &Path) -> Result<Self> {
        let db = sled::open(dir.join(BPTREE_INDEX_DIR_NAME))?;
        Ok(Self { db })
    }
}

impl Indexer for BPlusTreeIndex {
    fn put(&self, key: Vec<u8>, pos: LogRecordPos) -> Result<Option<LogRecordPos>> {
        match self.db.insert(key, pos.encode())? {
            Some(old) => Ok(Some(LogRecordPos::decode(&old)?)),
            None => Ok(None),
        }
    }

    fn get(&self, key: &[u8]) -> Result<Option<LogRecordPos>> {
        match self.db.get(key)? {
            Some(raw) => Ok(Some(LogRecordPos::decode(&raw)?)),
            None => Ok(None),
        }
    }

    fn delete(&self, key: &[u8]) -> Result<Option<LogRecordPos>> {
        match self.db.remove(key)? {
            Some(old) => Ok(Some(LogRecordPos::decode(&old)?)),
            None => Ok(None),
        }
    }

    fn size(&self) -> usize {
        self.db.len()
    }

    fn iterator(&self, reverse: bool) -> Box<dyn IndexIterator> {
        let mut iter = BPlusTreeIterator {
            db: self.db.clone(),
            reverse,
            current: None,
        };
        iter.rewind();
        Box::new(iter)
    }

    fn sync(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.sync()
    }
}

/// Cursor that re-positions on the live tree for every step
struct BPlusTreeIterator {
    db: Db,
    reverse: bool,
    current: Option<(IVec, LogRecordPos)>,
}

impl BPlusTreeIterator {
    fn settle(&mut self, entry: Option<sled::Result<(IVec, IVec)>>) {
        self.current = match entry {
            Some(Ok((key, raw))) => match LogRecordPos::decode(&raw) {
                Ok(pos) => Some((key, pos)),
                Err(e) => {
                    warn!(error = %e, "Undecodable position in on-disk index");
                    None
                }
            },
            Some(Err(e)) => {
                warn!(error = %e, "On-disk index iteration failed");
                None
            }
            None => None,
        };
    }
}

impl IndexIterator for BPlusTreeIterator {
    fn rewind(&mut self) {
        let entry = if self.reverse {
            self.db.iter().next_back()
        } else {
            self.db.iter().next()
        };
        self.settle(entry);
    }

    fn seek(&mut self, key: &[u8]) {
        let entry = if self.reverse {
            self.db.range(..=key).next_back()
        } else {
            self.db.range(key..).next()
        };
        self.settle(entry);
    }

    fn next(&mut self) {
        let Some((key, _)) = self.current.take() else {
            return;
        };
        let entry = if self.reverse {
            self.db.range(..key).next_back()
        } else {
            self.db
                .range::<&[u8], _>((std::ops::Bound::Excluded(key.as_ref()), std::ops::Bound::Unbounded))
                .next()
        };
        self.settle(entry);
    }

    fn valid(&self) -> bool {
        self.current.is_some()
    }

    fn key(&self) -> &[u8] {
        self.current.as_ref().map(|(key, _)| key.as_ref()).unwrap_or_default()
    }

    fn value(&self) -> LogRecordPos {
        self.current.as_ref().map(|(_, pos)| *pos).unwrap_or_default()
    }

    fn close(&mut self) {
        self.current = None;
    }
}
