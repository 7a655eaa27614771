//! Tests for WriteBatch
//!
//! These tests verify:
//! - Staged writes are invisible until commit
//! - Delete semantics for stored, staged and unknown keys
//! - Batch size limits
//! - Atomicity across a crash in the middle of a commit
//! - No partial batch is visible to concurrent readers
//! - Sequence numbers across restarts, including the on-disk index

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use caskkv::data::{encode_key_with_seq, DataFile, LogRecord, LogRecordType, TXN_FIN_KEY};
use caskkv::fio::IoType;
use caskkv::{CaskError, Config, Engine, IndexType, WriteBatchOptions};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn open_engine(dir: &Path, index_type: IndexType) -> Engine {
    let config = Config::builder()
        .dir_path(dir)
        .index_type(index_type)
        .build();
    Engine::open(config).unwrap()
}

fn setup_temp_engine() -> (TempDir, Engine) {
    let temp_dir = TempDir::new().unwrap();
    let engine = open_engine(temp_dir.path(), IndexType::BTree);
    (temp_dir, engine)
}

/// Append records as a crashed commit would have left them
fn append_batch_records(dir: &Path, seq_no: u64, records: &[(&[u8], &[u8])], committed: bool) {
    let mut data_file = DataFile::open(dir, 0, IoType::Standard).unwrap();
    for (key, value) in records {
        let record = LogRecord::normal(encode_key_with_seq(key, seq_no), *value);
        data_file.write(&record.encode()).unwrap();
    }
    if committed {
        let marker = LogRecord {
            key: encode_key_with_seq(TXN_FIN_KEY, seq_no),
            value: Vec::new(),
            rec_type: LogRecordType::TxnFinished,
        };
        data_file.write(&marker.encode()).unwrap();
    }
    data_file.sync().unwrap();
}

// =============================================================================
// Commit Tests
// =============================================================================

#[test]
fn test_batch_invisible_until_commit() {
    let (_temp, engine) = setup_temp_engine();
    let batch = engine.new_write_batch(WriteBatchOptions::default()).unwrap();

    batch.put(b"a", b"1").unwrap();
    batch.put(b"b", b"2").unwrap();
    assert_eq!(batch.len(), 2);
    assert_eq!(engine.get(b"a").unwrap(), None);

    batch.commit().unwrap();

    assert_eq!(engine.get(b"a").unwrap(), Some(b"1".to_vec()));
    assert_eq!(engine.get(b"b").unwrap(), Some(b"2".to_vec()));
    assert!(batch.is_empty());
}

#[test]
fn test_batch_last_write_per_key_wins() {
    let (_temp, engine) = setup_temp_engine();
    let batch = engine.new_write_batch(WriteBatchOptions::default()).unwrap();

    batch.put(b"k", b"first").unwrap();
    batch.put(b"k", b"second").unwrap();
    batch.commit().unwrap();

    assert_eq!(engine.get(b"k").unwrap(), Some(b"second".to_vec()));
}

#[test]
fn test_batch_delete_stored_key() {
    let (_temp, engine) = setup_temp_engine();
    engine.put(b"stored", b"v").unwrap();

    let batch = engine.new_write_batch(WriteBatchOptions::default()).unwrap();
    batch.delete(b"stored").unwrap();
    assert_eq!(engine.get(b"stored").unwrap(), Some(b"v".to_vec()));
    batch.commit().unwrap();

    assert_eq!(engine.get(b"stored").unwrap(), None);
    assert_eq!(engine.stat().unwrap().key_num, 0);
}

#[test]
fn test_batch_delete_unknown_and_staged_keys() {
    let (_temp, engine) = setup_temp_engine();
    let batch = engine.new_write_batch(WriteBatchOptions::default()).unwrap();

    batch.delete(b"unknown").unwrap();
    assert!(batch.is_empty());

    batch.put(b"staged", b"v").unwrap();
    batch.delete(b"staged").unwrap();
    assert!(batch.is_empty());

    batch.commit().unwrap();
    assert_eq!(engine.get(b"staged").unwrap(), None);
}

#[test]
fn test_batch_empty_key_rejected() {
    let (_temp, engine) = setup_temp_engine();
    let batch = engine.new_write_batch(WriteBatchOptions::default()).unwrap();

    assert!(matches!(batch.put(b"", b"v"), Err(CaskError::KeyIsEmpty)));
    assert!(matches!(batch.delete(b""), Err(CaskError::KeyIsEmpty)));
}

#[test]
fn test_empty_commit_writes_nothing() {
    let (temp, engine) = setup_temp_engine();
    let batch = engine.new_write_batch(WriteBatchOptions::default()).unwrap();

    batch.commit().unwrap();

    let segment = DataFile::file_name(temp.path(), 0);
    assert_eq!(std::fs::metadata(segment).unwrap().len(), 0);
}

#[test]
fn test_batch_exceeding_limit_is_rejected() {
    let (_temp, engine) = setup_temp_engine();
    let options = WriteBatchOptions {
        max_batch_num: 2,
        sync_writes: false,
    };
    let batch = engine.new_write_batch(options).unwrap();

    for key in ["a", "b", "c"] {
        batch.put(key.as_bytes(), b"v").unwrap();
    }

    assert!(matches!(
        batch.commit(),
        Err(CaskError::ExceedMaxBatchNum { pending: 3, max: 2 })
    ));
    assert_eq!(engine.get(b"a").unwrap(), None);
}

// =============================================================================
// Crash Atomicity Tests
// =============================================================================

#[test]
fn test_uncommitted_batch_discarded_on_replay() {
    let temp_dir = TempDir::new().unwrap();
    {
        let engine = open_engine(temp_dir.path(), IndexType::BTree);
        engine.put(b"x", b"original").unwrap();
        engine.close().unwrap();
    }

    // seq 5 never got its marker, seq 6 did
    let torn = [(&b"x"[..], &b"torn"[..]), (&b"y"[..], &b"torn"[..])];
    let whole = [(&b"z"[..], &b"whole"[..])];
    append_batch_records(temp_dir.path(), 5, &torn, false);
    append_batch_records(temp_dir.path(), 6, &whole, true);

    let engine = open_engine(temp_dir.path(), IndexType::BTree);
    assert_eq!(engine.get(b"x").unwrap(), Some(b"original".to_vec()));
    assert_eq!(engine.get(b"y").unwrap(), None);
    assert_eq!(engine.get(b"z").unwrap(), Some(b"whole".to_vec()));

    // The next commit must not reuse a sequence number seen on disk
    let batch = engine.new_write_batch(WriteBatchOptions::default()).unwrap();
    batch.put(b"y", b"fresh").unwrap();
    batch.commit().unwrap();
    engine.close().unwrap();

    let engine = open_engine(temp_dir.path(), IndexType::BTree);
    assert_eq!(engine.get(b"y").unwrap(), Some(b"fresh".to_vec()));
    assert_eq!(engine.get(b"x").unwrap(), Some(b"original".to_vec()));
}

#[test]
fn test_committed_batches_survive_reopen() {
    for index_type in [IndexType::BTree, IndexType::Art, IndexType::BPlusTree] {
        let temp_dir = TempDir::new().unwrap();
        {
            let engine = open_engine(temp_dir.path(), index_type);
            engine.put(b"plain", b"p").unwrap();
            let batch = engine.new_write_batch(WriteBatchOptions::default()).unwrap();
            batch.put(b"k1", b"v1").unwrap();
            batch.put(b"k2", b"v2").unwrap();
            batch.delete(b"plain").unwrap();
            batch.commit().unwrap();
            engine.close().unwrap();
        }

        let engine = open_engine(temp_dir.path(), index_type);
        assert_eq!(engine.get(b"k1").unwrap(), Some(b"v1".to_vec()), "{:?}", index_type);
        assert_eq!(engine.get(b"k2").unwrap(), Some(b"v2".to_vec()));
        assert_eq!(engine.get(b"plain").unwrap(), None);
        assert_eq!(engine.stat().unwrap().key_num, 2);
    }
}

// =============================================================================
// Concurrent Visibility Tests
// =============================================================================

#[test]
fn test_concurrent_readers_never_see_partial_batch() {
    let (_temp, engine) = setup_temp_engine();
    let engine = Arc::new(engine);
    let options = WriteBatchOptions {
        sync_writes: false,
        ..WriteBatchOptions::default()
    };

    let seed = engine.new_write_batch(options).unwrap();
    seed.put(b"pair:a", b"0").unwrap();
    seed.put(b"pair:b", b"0").unwrap();
    seed.commit().unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut last_generation = 0u64;
                let mut checks = 0usize;
                while !done.load(Ordering::Acquire) || checks == 0 {
                    let mut a = None;
                    let mut b = None;
                    engine
                        .fold(|key, value| {
                            match key {
                                b"pair:a" => a = Some(value.to_vec()),
                                b"pair:b" => b = Some(value.to_vec()),
                                _ => {}
                            }
                            true
                        })
                        .unwrap();

                    assert_eq!(a, b, "pair split across batches");
                    let generation: u64 = String::from_utf8(a.unwrap()).unwrap().parse().unwrap();
                    assert!(generation >= last_generation);
                    last_generation = generation;
                    checks += 1;
                }
            })
        })
        .collect();

    for generation in 1..=200u64 {
        let batch = engine.new_write_batch(options).unwrap();
        let value = generation.to_string();
        batch.put(b"pair:a", value.as_bytes()).unwrap();
        batch.put(b"pair:b", value.as_bytes()).unwrap();
        batch.commit().unwrap();
    }
    done.store(true, Ordering::Release);

    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(engine.get(b"pair:a").unwrap(), Some(b"200".to_vec()));
    assert_eq!(engine.get(b"pair:b").unwrap(), Some(b"200".to_vec()));
}

// =============================================================================
// On-Disk Index Sequence Number Tests
// =============================================================================

#[test]
fn test_bptree_batches_need_seq_no_file() {
    let temp_dir = TempDir::new().unwrap();
    {
        let engine = open_engine(temp_dir.path(), IndexType::BPlusTree);
        engine.put(b"k", b"v").unwrap();
        engine.close().unwrap();
    }
    assert!(temp_dir.path().join("seq-no").is_file());

    {
        let engine = open_engine(temp_dir.path(), IndexType::BPlusTree);
        // Consumed on open, rewritten on close
        assert!(!temp_dir.path().join("seq-no").exists());
        assert!(engine.new_write_batch(WriteBatchOptions::default()).is_ok());
        engine.close().unwrap();
    }

    // Simulate a crash that lost the counter
    std::fs::remove_file(temp_dir.path().join("seq-no")).unwrap();

    let engine = open_engine(temp_dir.path(), IndexType::BPlusTree);
    assert!(matches!(
        engine.new_write_batch(WriteBatchOptions::default()),
        Err(CaskError::SeqNoFileMissing)
    ));
    assert_eq!(engine.get(b"k").unwrap(), Some(b"v".to_vec()));
}

#[test]
fn test_bptree_batches_allowed_after_reopen_without_writes() {
    let temp_dir = TempDir::new().unwrap();
    {
        let engine = open_engine(temp_dir.path(), IndexType::BPlusTree);
        engine.put(b"k", b"v").unwrap();
        engine.close().unwrap();
    }

    // The counter is consumed on open, so even an idle session rewrites it
    for _ in 0..2 {
        let engine = open_engine(temp_dir.path(), IndexType::BPlusTree);
        engine.close().unwrap();
        assert!(temp_dir.path().join("seq-no").is_file());
    }

    let engine = open_engine(temp_dir.path(), IndexType::BPlusTree);
    let batch = engine.new_write_batch(WriteBatchOptions::default()).unwrap();
    batch.put(b"k2", b"v2").unwrap();
    batch.commit().unwrap();
    assert_eq!(engine.get(b"k2").unwrap(), Some(b"v2".to_vec()));
}
