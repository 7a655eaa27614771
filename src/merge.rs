//! Merge Module
//!
//! Log compaction: rewrites the live records of every sealed segment into a
//! sibling working directory, then swaps the result in on the next open.
//!
//! ## Phases
//! ```text
//!   merge()                                  next Engine::open
//!   ───────                                  ─────────────────
//!   1. check flag / ratio / disk space       6. merge-finished present?
//!   2. rotate active, watermark = new id        ├─ no:  drop <dir>-merge
//!   3. snapshot sealed segments                 └─ yes: delete unreplaced live ids,
//!   4. copy live records → <dir>-merge               move segments (ascending),
//!      + hint-index entries                          then hint-index,
//!   5. sync, write merge-finished(watermark)         then merge-finished,
//!                                                    drop <dir>-merge
//! ```
//!
//! Foreground writes continue during steps 3-5; they land in segments at or
//! above the watermark, which merge never touches.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{Config, SyncStrategy};
use crate::data::{
    encode_key_with_seq, parse_key_with_seq, DataFile, LogRecord, LogRecordType,
    MERGE_FINISHED_FILE_NAME, NON_TRANSACTION_SEQ_NO, SEQ_NO_FILE_NAME,
};
use crate::engine::{Engine, FILE_LOCK_NAME};
use crate::error::{CaskError, Result};
use crate::index::{IndexType, Indexer, BPTREE_INDEX_DIR_NAME};
use crate::util;

/// Key of the single record stored in `merge-finished`
const MERGE_FINISHED_KEY: &[u8] = b"merge.finished";

/// Suffix of the working directory created next to the database directory
const MERGE_DIR_SUFFIX: &str = "-merge";

/// Clears the engine's merge flag however merge exits
struct MergingGuard<'a> {
    engine: &'a Engine,
}

impl Drop for MergingGuard<'_> {
    fn drop(&mut self) {
        self.engine.state.write().merging = false;
    }
}

/// `<dir>-merge`, next to `dir`
pub(crate) fn merge_dir_path(dir: &Path) -> Result<PathBuf> {
    let dir = dir.canonicalize()?;
    let mut name = dir.file_name().unwrap_or_default().to_os_string();
    name.push(MERGE_DIR_SUFFIX);
    Ok(dir.with_file_name(name))
}

pub(crate) fn merge(engine: &Engine) -> Result<()> {
    let dir = engine.config.dir_path.clone();

    {
        let mut state = engine.state.write();
        if state.merging {
            return Err(CaskError::MergeInProgress);
        }

        let total_size = util::dir_size(&dir)?;
        let ratio = if total_size == 0 {
            0.0
        } else {
            state.reclaim_size as f32 / total_size as f32
        };
        let threshold = engine.config.data_file_merge_ratio;
        if ratio < threshold {
            return Err(CaskError::MergeRatioUnreached { ratio, threshold });
        }

        let required = total_size.saturating_sub(state.reclaim_size);
        let available = util::available_disk_space(&dir)?;
        if required >= available {
            return Err(CaskError::NoEnoughSpaceForMerge {
                required,
                available,
            });
        }

        state.merging = true;
    }
    let _guard = MergingGuard { engine };

    let (watermark, mut sealed) = {
        let mut state = engine.state.write();
        engine.rotate_active_with_lock(&mut state)?;
        engine.sync_index_if_pending(&mut state)?;
        let sealed: Vec<Arc<DataFile>> = state.older.values().cloned().collect();
        (state.active.file_id(), sealed)
    };
    sealed.sort_by_key(|file| file.file_id());
    info!(watermark, segments = sealed.len(), "Merge started");

    let merge_dir = merge_dir_path(&dir)?;
    if merge_dir.exists() {
        fs::remove_dir_all(&merge_dir)?;
    }
    fs::create_dir_all(&merge_dir)?;

    let merge_engine = Engine::open(Config {
        dir_path: merge_dir.clone(),
        sync_strategy: SyncStrategy::Os,
        index_type: IndexType::BTree,
        mmap_at_startup: false,
        ..engine.config.clone()
    })?;
    let mut hint_file = DataFile::open_hint_file(&merge_dir)?;

    let mut kept = 0usize;
    let mut dropped = 0usize;
    for file in &sealed {
        let mut offset = 0;
        while let Some((record, size)) = file.read_log_record(offset)? {
            let (key, _) = parse_key_with_seq(&record.key)?;
            let is_live = matches!(
                engine.index.get(key)?,
                Some(pos) if pos.file_id == file.file_id() && pos.offset == offset
            );
            if is_live {
                let rewritten = LogRecord {
                    key: encode_key_with_seq(key, NON_TRANSACTION_SEQ_NO),
                    value: record.value,
                    rec_type: LogRecordType::Normal,
                };
                let pos = merge_engine.append_log_record(&rewritten)?;
                hint_file.write_hint_record(key, &pos)?;
                kept += 1;
            } else {
                dropped += 1;
            }
            offset += size;
        }
    }

    hint_file.sync()?;
    hint_file.close()?;
    merge_engine.sync()?;
    merge_engine.close()?;

    let mut finished = DataFile::open_merge_finished_file(&merge_dir)?;
    let record = LogRecord::normal(MERGE_FINISHED_KEY, watermark.to_string());
    finished.write(&record.encode())?;
    finished.sync()?;
    finished.close()?;

    info!(watermark, kept, dropped, "Merge finished");
    Ok(())
}

/// Splice a finished merge into `dir`
///
/// An unfinished working directory is discarded. Every step can be repeated
/// after a crash: merged segments move in ascending id order, then the hint
/// file, and `merge-finished` moves last, so a working directory that still
/// holds the marker also holds whatever was not moved yet.
pub(crate) fn load_merge_files(dir: &Path) -> Result<()> {
    let merge_dir = merge_dir_path(dir)?;
    if !merge_dir.is_dir() {
        return Ok(());
    }

    let Some(watermark) = read_watermark(&merge_dir)? else {
        warn!(dir = %merge_dir.display(), "Discarding unfinished merge");
        fs::remove_dir_all(&merge_dir)?;
        return Ok(());
    };

    let mut merged_ids = Vec::new();
    let mut others = Vec::new();
    for entry in fs::read_dir(&merge_dir)? {
        let name = entry?.file_name();
        let file_id = match name.to_str() {
            Some(text) => DataFile::parse_file_id(text)?,
            None => None,
        };
        match file_id {
            Some(file_id) => merged_ids.push(file_id),
            None if name == FILE_LOCK_NAME
                || name == SEQ_NO_FILE_NAME
                || name == BPTREE_INDEX_DIR_NAME
                || name == MERGE_FINISHED_FILE_NAME => {}
            None => others.push(name),
        }
    }
    merged_ids.sort_unstable();

    // While any merged segment is left, the highest one is the last the
    // merge wrote; live segments between it and the watermark are dropped.
    if let Some(&last) = merged_ids.last() {
        if last >= watermark {
            return Err(CaskError::DataDirectoryCorrupted(format!(
                "merged data file {} is not below watermark {}",
                last, watermark
            )));
        }
        for file_id in last + 1..watermark {
            let path = DataFile::file_name(dir, file_id);
            if path.is_file() {
                fs::remove_file(path)?;
            }
        }
    }

    for file_id in merged_ids {
        fs::rename(
            DataFile::file_name(&merge_dir, file_id),
            DataFile::file_name(dir, file_id),
        )?;
    }
    for name in others {
        fs::rename(merge_dir.join(&name), dir.join(&name))?;
    }
    fs::rename(
        merge_dir.join(MERGE_FINISHED_FILE_NAME),
        dir.join(MERGE_FINISHED_FILE_NAME),
    )?;
    fs::remove_dir_all(&merge_dir)?;

    info!(watermark, "Spliced merge output");
    Ok(())
}

/// Watermark recorded by the last finished merge in `dir`, if any
pub(crate) fn read_watermark(dir: &Path) -> Result<Option<u32>> {
    if !dir.join(MERGE_FINISHED_FILE_NAME).is_file() {
        return Ok(None);
    }
    let file = DataFile::open_merge_finished_file(dir)?;
    let Some((record, _)) = file.read_log_record(0)? else {
        return Ok(None);
    };
    let watermark = std::str::from_utf8(&record.value)
        .ok()
        .and_then(|text| text.parse::<u32>().ok())
        .ok_or_else(|| CaskError::CorruptedRecord("invalid merge-finished file".to_string()))?;
    Ok(Some(watermark))
}
