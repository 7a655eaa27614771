//! Engine Module
//!
//! The core storage engine that owns the segment files and the index.
//!
//! ## Responsibilities
//! - Append records to the active segment, rotating it when full
//! - Keep the index pointing at the newest record of every key
//! - Rebuild (or restore) the index when a directory is opened
//! - Track reclaimable bytes for merge
//! - Hold the directory lock for the lifetime of the engine

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use fs4::fs_std::FileExt;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::batch::WriteBatch;
use crate::config::{Config, IteratorOptions, SyncStrategy, WriteBatchOptions};
use crate::data::{
    encode_key_with_seq, parse_key_with_seq, DataFile, LogRecord, LogRecordPos, LogRecordType,
    TransactionRecord, HINT_FILE_NAME, NON_TRANSACTION_SEQ_NO, SEQ_NO_FILE_NAME,
};
use crate::error::{CaskError, Result};
use crate::fio::IoType;
use crate::index::{Index, Indexer};
use crate::iterator::EngineIterator;
use crate::merge;
use crate::util;

/// Advisory lock file inside the database directory
pub(crate) const FILE_LOCK_NAME: &str = "flock";

/// Key of the single record stored in the `seq-no` file
const SEQ_NO_KEY: &[u8] = b"seq-no";

/// Engine statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    /// Number of live keys
    pub key_num: usize,
    /// Number of segment files, active included
    pub data_file_num: usize,
    /// Bytes held by superseded or deleted records
    pub reclaimable_size: u64,
    /// Bytes used by the whole directory
    pub disk_size: u64,
}

/// Mutable engine state, guarded by one lock
pub(crate) struct EngineState {
    /// The only segment accepting appends
    pub(crate) active: DataFile,

    /// Read-only segments by id
    pub(crate) older: HashMap<u32, Arc<DataFile>>,

    /// Bytes appended since the last fsync
    pub(crate) bytes_since_sync: usize,

    /// The active segment was fsynced but the index has not caught up
    pub(crate) index_sync_pending: bool,

    pub(crate) reclaim_size: u64,

    /// Last sequence number handed to a write batch
    pub(crate) seq_no: u64,

    pub(crate) merging: bool,
}

impl EngineState {
    /// The segment with `file_id`, active included
    pub(crate) fn data_file(&self, file_id: u32) -> Result<&DataFile> {
        if self.active.file_id() == file_id {
            return Ok(&self.active);
        }
        self.older
            .get(&file_id)
            .map(Arc::as_ref)
            .ok_or(CaskError::DataFileNotFound(file_id))
    }
}

/// The main storage engine
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader
///
/// - **Writes** (put/delete/batch commit/rotation): exclusive `state` lock.
///   The index is updated before the lock is released, so a reader never
///   sees a pointer to bytes that are not written yet.
/// - **Reads** (get/fold/iterator values/stat): shared `state` lock.
/// - **Merge** holds the exclusive lock only to rotate and snapshot; the
///   rewrite reads `Arc<DataFile>` handles without any engine lock.
pub struct Engine {
    pub(crate) config: Config,

    pub(crate) index: Index,

    pub(crate) state: RwLock<EngineState>,

    /// Holds the exclusive directory lock until dropped
    lock_file: File,

    /// The `seq-no` file was present at open (on-disk index only)
    seq_no_file_exists: bool,

    /// The directory was missing or empty at open
    is_initial: bool,

    closed: bool,
}

/// What replaying the log produced
#[derive(Debug, Default)]
struct ReplayOutcome {
    seq_no: u64,
    reclaim_size: u64,
    /// Where the last valid record of the active segment ends
    active_end: Option<u64>,
}

impl Engine {
    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Validate the config and create the directory
    /// 2. Take the directory lock
    /// 3. Splice in the output of a finished merge
    /// 4. Load the segment files
    /// 5. Rebuild the index (in-memory) or restore the sequence number (on-disk)
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        let dir = config.dir_path.clone();

        let is_initial = if dir.is_dir() {
            fs::read_dir(&dir)?.next().is_none()
        } else {
            fs::create_dir_all(&dir)?;
            true
        };

        // Dropped (and so unlocked) on every early return below
        let lock_file = Self::lock_dir(&dir)?;

        merge::load_merge_files(&dir)?;
        let watermark = merge::read_watermark(&dir)?;

        let durable = config.index_type.is_durable();
        let io_type = if config.mmap_at_startup && !durable {
            IoType::MemoryMap
        } else {
            IoType::Standard
        };
        let mut files = Self::load_data_files(&dir, io_type)?;
        if files.is_empty() {
            files.push(DataFile::open(&dir, 0, IoType::Standard)?);
        }

        let index = Index::open(config.index_type, &dir)?;

        let mut seq_no_file_exists = false;
        let mut outcome = ReplayOutcome::default();
        if durable {
            if let Some(seq_no) = Self::take_seq_no(&dir)? {
                outcome.seq_no = seq_no;
                seq_no_file_exists = true;
            }
            if let Some(watermark) = watermark {
                Self::repoint_merged_keys(&dir, &index, watermark)?;
            }
        } else {
            Self::load_index_from_hint_file(&dir, &index)?;
            outcome = Self::replay_data_files(&files, &index, watermark)?;
            if io_type == IoType::MemoryMap {
                for file in &mut files {
                    file.set_io_manager(&dir, IoType::Standard)?;
                }
            }
        }

        let mut active = match files.pop() {
            Some(active) => active,
            None => DataFile::open(&dir, 0, IoType::Standard)?,
        };
        let physical_size = active.size()?;
        match outcome.active_end {
            Some(end) if end < physical_size => {
                warn!(
                    file_id = active.file_id(),
                    end,
                    physical_size,
                    "Truncating torn tail of active data file"
                );
                active.truncate(end)?;
            }
            _ => active.set_write_off(physical_size),
        }

        let older: HashMap<u32, Arc<DataFile>> = files
            .into_iter()
            .map(|file| (file.file_id(), Arc::new(file)))
            .collect();

        info!(
            dir = %dir.display(),
            index = ?config.index_type,
            data_files = older.len() + 1,
            keys = index.size(),
            "Engine opened"
        );

        Ok(Self {
            config,
            index,
            state: RwLock::new(EngineState {
                active,
                older,
                bytes_since_sync: 0,
                index_sync_pending: false,
                reclaim_size: outcome.reclaim_size,
                seq_no: outcome.seq_no,
                merging: false,
            }),
            lock_file,
            seq_no_file_exists,
            is_initial,
            closed: false,
        })
    }

    /// Open with default config rooted at `path`
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().dir_path(path).build())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // =========================================================================
    // Startup
    // =========================================================================

    fn lock_dir(dir: &Path) -> Result<File> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(dir.join(FILE_LOCK_NAME))?;
        if !FileExt::try_lock_exclusive(&file)? {
            return Err(CaskError::DatabaseInUse);
        }
        Ok(file)
    }

    /// Open every `*.data` file in ascending id order
    fn load_data_files(dir: &Path, io_type: IoType) -> Result<Vec<DataFile>> {
        let mut file_ids = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some(file_id) = DataFile::parse_file_id(name)? {
                file_ids.push(file_id);
            }
        }
        file_ids.sort_unstable();

        file_ids
            .into_iter()
            .map(|file_id| DataFile::open(dir, file_id, io_type))
            .collect()
    }

    /// Seed the index from the hint file written by the last merge
    fn load_index_from_hint_file(dir: &Path, index: &Index) -> Result<()> {
        if !dir.join(HINT_FILE_NAME).is_file() {
            return Ok(());
        }
        let hint_file = DataFile::open_hint_file(dir)?;
        let mut offset = 0;
        let mut loaded = 0usize;
        while let Some((record, size)) = hint_file.read_log_record(offset)? {
            index.put(record.key, LogRecordPos::decode(&record.value)?)?;
            offset += size;
            loaded += 1;
        }
        debug!(entries = loaded, "Loaded hint file");
        Ok(())
    }

    /// Point keys still referencing merged-away segments at their new home
    ///
    /// Runs on every open with a watermark, so a splice interrupted by a
    /// crash is still picked up; keys already re-pointed are left alone.
    fn repoint_merged_keys(dir: &Path, index: &Index, watermark: u32) -> Result<()> {
        if !dir.join(HINT_FILE_NAME).is_file() {
            return Ok(());
        }
        let hint_file = DataFile::open_hint_file(dir)?;
        let mut offset = 0;
        let mut repointed = 0usize;
        while let Some((record, size)) = hint_file.read_log_record(offset)? {
            offset += size;
            let merged = LogRecordPos::decode(&record.value)?;
            let stale = matches!(
                index.get(&record.key)?,
                Some(pos) if pos.file_id < watermark && pos != merged
            );
            if stale {
                index.put(record.key, merged)?;
                repointed += 1;
            }
        }
        if repointed > 0 {
            index.sync()?;
            debug!(repointed, watermark, "Re-pointed on-disk index after merge");
        }
        Ok(())
    }

    /// Rebuild the index from segments with id >= `watermark`
    ///
    /// Records with a non-zero sequence number are buffered until that
    /// sequence's commit marker appears; groups without one are dropped.
    fn replay_data_files(
        files: &[DataFile],
        index: &Index,
        watermark: Option<u32>,
    ) -> Result<ReplayOutcome> {
        let mut outcome = ReplayOutcome::default();
        let mut pending: HashMap<u64, Vec<TransactionRecord>> = HashMap::new();

        for (i, file) in files.iter().enumerate() {
            let file_id = file.file_id();
            let is_active = i + 1 == files.len();
            if watermark.is_some_and(|watermark| file_id < watermark) {
                continue;
            }

            let mut offset = 0;
            let mut records = 0usize;
            while let Some((record, size)) = file.read_log_record(offset)? {
                let pos = LogRecordPos {
                    file_id,
                    offset,
                    size: size as u32,
                };
                let (key, seq_no) = parse_key_with_seq(&record.key)?;
                outcome.seq_no = outcome.seq_no.max(seq_no);

                if seq_no == NON_TRANSACTION_SEQ_NO {
                    outcome.reclaim_size +=
                        apply_to_index(index, key.to_vec(), record.rec_type, pos)?;
                } else if record.rec_type == LogRecordType::TxnFinished {
                    for txn in pending.remove(&seq_no).unwrap_or_default() {
                        outcome.reclaim_size +=
                            apply_to_index(index, txn.record.key, txn.record.rec_type, txn.pos)?;
                    }
                    outcome.reclaim_size += pos.size as u64;
                } else {
                    let record = LogRecord {
                        key: key.to_vec(),
                        value: Vec::new(),
                        rec_type: record.rec_type,
                    };
                    pending
                        .entry(seq_no)
                        .or_default()
                        .push(TransactionRecord { record, pos });
                }

                offset += size;
                records += 1;
            }

            if is_active {
                outcome.active_end = Some(offset);
            }
            debug!(file_id, records, "Replayed data file");
        }

        if !pending.is_empty() {
            let discarded: u64 = pending
                .values()
                .flatten()
                .map(|txn| txn.pos.size as u64)
                .sum();
            warn!(
                transactions = pending.len(),
                bytes = discarded,
                "Discarded incomplete transactions"
            );
            outcome.reclaim_size += discarded;
        }

        Ok(outcome)
    }

    /// Read and delete the `seq-no` file; `None` if it does not exist
    fn take_seq_no(dir: &Path) -> Result<Option<u64>> {
        let path = dir.join(SEQ_NO_FILE_NAME);
        if !path.is_file() {
            return Ok(None);
        }
        let file = DataFile::open_seq_no_file(dir)?;
        let seq_no = match file.read_log_record(0)? {
            Some((record, _)) => std::str::from_utf8(&record.value)
                .ok()
                .and_then(|text| text.parse::<u64>().ok())
                .ok_or_else(|| CaskError::CorruptedRecord("invalid seq-no file".to_string()))?,
            None => 0,
        };
        file.close()?;
        fs::remove_file(&path)?;
        Ok(Some(seq_no))
    }

    // =========================================================================
    // Public API
    // =========================================================================

    /// Get a value by key; `Ok(None)` if absent
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if key.is_empty() {
            return Err(CaskError::KeyIsEmpty);
        }
        let state = self.state.read();
        match self.index.get(key)? {
            Some(pos) => Ok(Some(state.data_file(pos.file_id)?.read_value(pos.offset)?)),
            None => Ok(None),
        }
    }

    /// Put a key-value pair
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(CaskError::KeyIsEmpty);
        }
        let record = LogRecord::normal(encode_key_with_seq(key, NON_TRANSACTION_SEQ_NO), value);

        let mut state = self.state.write();
        let pos = self.append_log_record_with_lock(&mut state, &record)?;
        if let Some(old) = self.index.put(key.to_vec(), pos)? {
            state.reclaim_size += old.size as u64;
        }
        self.sync_index_if_pending(&mut state)
    }

    /// Delete a key; deleting an absent key is a no-op
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(CaskError::KeyIsEmpty);
        }

        let mut state = self.state.write();
        if self.index.get(key)?.is_none() {
            return Ok(());
        }

        let record = LogRecord::deleted(encode_key_with_seq(key, NON_TRANSACTION_SEQ_NO));
        let pos = self.append_log_record_with_lock(&mut state, &record)?;
        state.reclaim_size += pos.size as u64;
        if let Some(old) = self.index.delete(key)? {
            state.reclaim_size += old.size as u64;
        }
        self.sync_index_if_pending(&mut state)
    }

    /// All live keys in ascending order
    pub fn list_keys(&self) -> Result<Vec<Vec<u8>>> {
        let _state = self.state.read();
        let mut iter = self.index.iterator(false);
        let mut keys = Vec::with_capacity(self.index.size());
        while iter.valid() {
            keys.push(iter.key().to_vec());
            iter.next();
        }
        iter.close();
        Ok(keys)
    }

    /// Visit every key/value pair in ascending key order until `visit`
    /// returns `false`
    ///
    /// No engine lock is held while `visit` runs, so it may read from or
    /// write to the engine. With an in-memory index the visited pairs are
    /// those present when `fold` started.
    pub fn fold<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        let mut iter = {
            let _state = self.state.read();
            self.index.iterator(false)
        };
        while iter.valid() {
            let pos = iter.value();
            let value = self
                .state
                .read()
                .data_file(pos.file_id)?
                .read_value(pos.offset)?;
            if !visit(iter.key(), &value) {
                break;
            }
            iter.next();
        }
        iter.close();
        Ok(())
    }

    /// fsync the active segment, then flush the index
    pub fn sync(&self) -> Result<()> {
        let mut state = self.state.write();
        state.active.sync()?;
        state.bytes_since_sync = 0;
        self.index.sync()?;
        state.index_sync_pending = false;
        Ok(())
    }

    pub fn stat(&self) -> Result<Stat> {
        let state = self.state.read();
        Ok(Stat {
            key_num: self.index.size(),
            data_file_num: state.older.len() + 1,
            reclaimable_size: state.reclaim_size,
            disk_size: util::dir_size(&self.config.dir_path)?,
        })
    }

    /// Iterator over a snapshot of the index
    pub fn iter(&self, options: IteratorOptions) -> EngineIterator<'_> {
        EngineIterator::new(self, options)
    }

    /// Start an atomic write batch
    ///
    /// With the on-disk index, batches are refused when the sequence number
    /// could not be restored (no `seq-no` file on a non-empty directory).
    pub fn new_write_batch(&self, options: WriteBatchOptions) -> Result<WriteBatch<'_>> {
        if self.config.index_type.is_durable() && !self.seq_no_file_exists && !self.is_initial {
            return Err(CaskError::SeqNoFileMissing);
        }
        Ok(WriteBatch::new(self, options))
    }

    /// Rewrite live records into fresh segments; see [`merge`](crate::merge)
    pub fn merge(&self) -> Result<()> {
        merge::merge(self)
    }

    /// Flush everything and release the directory lock
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let state = self.state.read();
        if self.config.index_type.is_durable() {
            let mut seq_no_file = DataFile::open_seq_no_file(&self.config.dir_path)?;
            let record = LogRecord::normal(SEQ_NO_KEY, state.seq_no.to_string());
            seq_no_file.write(&record.encode())?;
            seq_no_file.sync()?;
            seq_no_file.close()?;
        }
        state.active.sync()?;
        self.index.close()?;
        FileExt::unlock(&self.lock_file)?;

        info!(dir = %self.config.dir_path.display(), "Engine closed");
        Ok(())
    }

    // =========================================================================
    // Append Path
    // =========================================================================

    /// Append one record under the exclusive lock
    pub(crate) fn append_log_record(&self, record: &LogRecord) -> Result<LogRecordPos> {
        let mut state = self.state.write();
        self.append_log_record_with_lock(&mut state, record)
    }

    /// Append one record; the caller holds the exclusive lock
    pub(crate) fn append_log_record_with_lock(
        &self,
        state: &mut EngineState,
        record: &LogRecord,
    ) -> Result<LogRecordPos> {
        let encoded = record.encode();
        let record_len = encoded.len() as u64;

        // Soft limit: an empty segment takes a record of any size
        let write_off = state.active.write_off();
        if write_off > 0 && write_off + record_len > self.config.data_file_size {
            self.rotate_active_with_lock(state)?;
        }

        let offset = state.active.write_off();
        state.active.write(&encoded)?;
        state.bytes_since_sync += encoded.len();

        let need_sync = match self.config.sync_strategy {
            SyncStrategy::Os => false,
            SyncStrategy::EveryWrite => true,
            SyncStrategy::EveryNBytes { bytes } => state.bytes_since_sync >= bytes,
        };
        if need_sync {
            state.active.sync()?;
            state.bytes_since_sync = 0;
            state.index_sync_pending = true;
        }

        Ok(LogRecordPos {
            file_id: state.active.file_id(),
            offset,
            size: record_len as u32,
        })
    }

    /// Flush the index once its mutations are applied, if the log beneath
    /// them has been fsynced; the caller holds the exclusive lock
    ///
    /// The log is always synced first, so the on-disk index never points
    /// past what survives a crash.
    pub(crate) fn sync_index_if_pending(&self, state: &mut EngineState) -> Result<()> {
        if state.index_sync_pending {
            self.index.sync()?;
            state.index_sync_pending = false;
        }
        Ok(())
    }

    /// Seal the active segment and start the next one
    pub(crate) fn rotate_active_with_lock(&self, state: &mut EngineState) -> Result<()> {
        state.active.sync()?;
        state.index_sync_pending = true;
        let next_id = state.active.file_id() + 1;
        let next = DataFile::open(&self.config.dir_path, next_id, IoType::Standard)?;
        let sealed = std::mem::replace(&mut state.active, next);
        debug!(
            sealed = sealed.file_id(),
            size = sealed.write_off(),
            active = next_id,
            "Rotated data file"
        );
        state.older.insert(sealed.file_id(), Arc::new(sealed));
        state.bytes_since_sync = 0;
        Ok(())
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(error = %e, "Failed to close engine cleanly");
        }
    }
}

/// Apply one replayed or committed record to the index
///
/// Returns the bytes that became reclaimable. Commit markers never reach the
/// index.
pub(crate) fn apply_to_index(
    index: &Index,
    key: Vec<u8>,
    rec_type: LogRecordType,
    pos: LogRecordPos,
) -> Result<u64> {
    let (old, mut reclaimed) = match rec_type {
        LogRecordType::Normal => (index.put(key, pos)?, 0),
        LogRecordType::Deleted => (index.delete(&key)?, pos.size as u64),
        LogRecordType::TxnFinished => return Ok(0),
    };
    if let Some(old) = old {
        reclaimed += old.size as u64;
    }
    Ok(reclaimed)
}
