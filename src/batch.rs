//! Write batches
//!
//! Buffers puts and deletes, then commits them as one atomic group:
//!
//! ```text
//!   seq = engine.seq_no + 1
//!   ┌──────────────┬──────────────┬─────┬───────────────────────────┐
//!   │ seq ++ key_1 │ seq ++ key_2 │ ... │ seq ++ "txn-fix" (marker) │
//!   └──────────────┴──────────────┴─────┴───────────────────────────┘
//! ```
//!
//! Replay only applies a group once its marker is found, so a crash in the
//! middle of a commit loses the whole group and nothing else.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::debug;

use crate::config::WriteBatchOptions;
use crate::data::{encode_key_with_seq, LogRecord, LogRecordPos, LogRecordType, TXN_FIN_KEY};
use crate::engine::{apply_to_index, Engine};
use crate::error::{CaskError, Result};
use crate::index::Indexer;

/// Pending mutations committed atomically
pub struct WriteBatch<'a> {
    engine: &'a Engine,
    options: WriteBatchOptions,
    /// Latest pending record per logical key
    pending: Mutex<HashMap<Vec<u8>, LogRecord>>,
}

impl<'a> WriteBatch<'a> {
    pub(crate) fn new(engine: &'a Engine, options: WriteBatchOptions) -> Self {
        Self {
            engine,
            options,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Stage a put; replaces anything staged for `key`
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(CaskError::KeyIsEmpty);
        }
        self.pending
            .lock()
            .insert(key.to_vec(), LogRecord::normal(key, value));
        Ok(())
    }

    /// Stage a delete
    ///
    /// A key that is neither stored nor staged is ignored; a key that is
    /// only staged is simply unstaged.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(CaskError::KeyIsEmpty);
        }
        let mut pending = self.pending.lock();
        if self.engine.index.get(key)?.is_none() {
            pending.remove(key);
            return Ok(());
        }
        pending.insert(key.to_vec(), LogRecord::deleted(key));
        Ok(())
    }

    /// Number of staged operations
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Write every staged record plus the commit marker, then apply them to
    /// the index before any other writer can run
    pub fn commit(&self) -> Result<()> {
        let mut pending = self.pending.lock();
        if pending.is_empty() {
            return Ok(());
        }
        if pending.len() > self.options.max_batch_num {
            return Err(CaskError::ExceedMaxBatchNum {
                pending: pending.len(),
                max: self.options.max_batch_num,
            });
        }

        let engine = self.engine;
        let mut state = engine.state.write();
        state.seq_no += 1;
        let seq_no = state.seq_no;

        let mut written: Vec<(Vec<u8>, LogRecordType, LogRecordPos)> =
            Vec::with_capacity(pending.len());
        for (key, record) in pending.iter() {
            let physical = LogRecord {
                key: encode_key_with_seq(key, seq_no),
                value: record.value.clone(),
                rec_type: record.rec_type,
            };
            let pos = engine.append_log_record_with_lock(&mut state, &physical)?;
            written.push((key.clone(), record.rec_type, pos));
        }

        let marker = LogRecord {
            key: encode_key_with_seq(TXN_FIN_KEY, seq_no),
            value: Vec::new(),
            rec_type: LogRecordType::TxnFinished,
        };
        let marker_pos = engine.append_log_record_with_lock(&mut state, &marker)?;

        if self.options.sync_writes {
            state.active.sync()?;
            state.bytes_since_sync = 0;
            state.index_sync_pending = true;
        }

        let mut reclaimed = marker_pos.size as u64;
        for (key, rec_type, pos) in written {
            reclaimed += apply_to_index(&engine.index, key, rec_type, pos)?;
        }
        state.reclaim_size += reclaimed;
        engine.sync_index_if_pending(&mut state)?;

        debug!(seq_no, records = pending.len(), "Committed write batch");
        pending.clear();
        Ok(())
    }
}
