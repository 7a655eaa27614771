//! Engine iterator
//!
//! Walks an index snapshot and resolves values lazily from the segment files.
//! Keys outside [`IteratorOptions::prefix`] are skipped transparently.

use crate::config::IteratorOptions;
use crate::engine::Engine;
use crate::error::Result;
use crate::index::{IndexIterator, Indexer};

/// Ordered cursor over the engine's keys
pub struct EngineIterator<'a> {
    engine: &'a Engine,
    index_iter: Box<dyn IndexIterator>,
    options: IteratorOptions,
}

impl<'a> EngineIterator<'a> {
    pub(crate) fn new(engine: &'a Engine, options: IteratorOptions) -> Self {
        let index_iter = {
            let _state = engine.state.read();
            engine.index.iterator(options.reverse)
        };
        let mut iter = Self {
            engine,
            index_iter,
            options,
        };
        iter.skip_to_prefix();
        iter
    }

    /// Back to the first matching key
    pub fn rewind(&mut self) {
        self.index_iter.rewind();
        self.skip_to_prefix();
    }

    /// First matching key >= `key` (<= `key` when reverse)
    pub fn seek(&mut self, key: &[u8]) {
        self.index_iter.seek(key);
        self.skip_to_prefix();
    }

    pub fn next(&mut self) {
        self.index_iter.next();
        self.skip_to_prefix();
    }

    pub fn valid(&self) -> bool {
        self.index_iter.valid()
    }

    pub fn key(&self) -> &[u8] {
        self.index_iter.key()
    }

    /// Value of the current key, read from its segment
    pub fn value(&self) -> Result<Vec<u8>> {
        let pos = self.index_iter.value();
        let state = self.engine.state.read();
        state.data_file(pos.file_id)?.read_value(pos.offset)
    }

    pub fn close(&mut self) {
        self.index_iter.close();
    }

    fn skip_to_prefix(&mut self) {
        if self.options.prefix.is_empty() {
            return;
        }
        while self.index_iter.valid() && !self.index_iter.key().starts_with(&self.options.prefix) {
            self.index_iter.next();
        }
    }
}
