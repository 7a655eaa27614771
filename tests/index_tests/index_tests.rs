//! Tests for the index backends
//!
//! Every contract test runs against the B-tree, radix tree and on-disk
//! B+Tree backends.
//!
//! These tests verify:
//! - put/get/delete returning the replaced position
//! - Ordered iteration, reverse iteration and seek
//! - Persistence of the on-disk backend

use caskkv::data::LogRecordPos;
use caskkv::index::{Index, IndexIterator, IndexType, Indexer};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

const ALL_TYPES: [IndexType; 3] = [IndexType::BTree, IndexType::Art, IndexType::BPlusTree];

fn setup_temp_index(index_type: IndexType) -> (TempDir, Index) {
    let temp_dir = TempDir::new().unwrap();
    let index = Index::open(index_type, temp_dir.path()).unwrap();
    (temp_dir, index)
}

fn pos(file_id: u32, offset: u64) -> LogRecordPos {
    LogRecordPos {
        file_id,
        offset,
        size: 10,
    }
}

fn collect(iter: &mut Box<dyn IndexIterator>) -> Vec<Vec<u8>> {
    let mut keys = Vec::new();
    while iter.valid() {
        keys.push(iter.key().to_vec());
        iter.next();
    }
    keys
}

fn fill(index: &Index, keys: &[&[u8]]) {
    for (i, key) in keys.iter().enumerate() {
        index.put(key.to_vec(), pos(0, i as u64 * 10)).unwrap();
    }
}

// =============================================================================
// Point Operation Tests
// =============================================================================

#[test]
fn test_put_get_returns_previous() {
    for index_type in ALL_TYPES {
        let (_temp, index) = setup_temp_index(index_type);

        assert_eq!(index.put(b"key".to_vec(), pos(1, 0)).unwrap(), None);
        assert_eq!(
            index.put(b"key".to_vec(), pos(2, 40)).unwrap(),
            Some(pos(1, 0)),
            "{:?}",
            index_type
        );
        assert_eq!(index.get(b"key").unwrap(), Some(pos(2, 40)));
        assert_eq!(index.get(b"missing").unwrap(), None);
        assert_eq!(index.size(), 1);
    }
}

#[test]
fn test_delete_reports_existence() {
    for index_type in ALL_TYPES {
        let (_temp, index) = setup_temp_index(index_type);
        index.put(b"key".to_vec(), pos(1, 0)).unwrap();

        assert_eq!(index.delete(b"key").unwrap(), Some(pos(1, 0)), "{:?}", index_type);
        assert_eq!(index.delete(b"key").unwrap(), None);
        assert_eq!(index.get(b"key").unwrap(), None);
        assert_eq!(index.size(), 0);
    }
}

#[test]
fn test_many_keys_with_shared_prefixes() {
    for index_type in ALL_TYPES {
        let (_temp, index) = setup_temp_index(index_type);

        for i in 0..1000u64 {
            let key = format!("user:{}", i).into_bytes();
            index.put(key, pos(0, i)).unwrap();
        }
        for i in (0..1000u64).step_by(3) {
            index.delete(format!("user:{}", i).as_bytes()).unwrap();
        }

        assert_eq!(index.size(), 666, "{:?}", index_type);
        assert_eq!(index.get(b"user:1").unwrap(), Some(pos(0, 1)));
        assert_eq!(index.get(b"user:3").unwrap(), None);
        assert_eq!(index.get(b"user:999").unwrap(), None);
        assert_eq!(index.get(b"user:998").unwrap(), Some(pos(0, 998)));
    }
}

// =============================================================================
// Iterator Tests
// =============================================================================

#[test]
fn test_iterator_orders_by_raw_bytes() {
    for index_type in ALL_TYPES {
        let (_temp, index) = setup_temp_index(index_type);
        fill(&index, &[b"b", b"ab", b"a", b"c", b"abc", b"\xff"]);

        let mut forward = index.iterator(false);
        assert_eq!(
            collect(&mut forward),
            vec![
                b"a".to_vec(),
                b"ab".to_vec(),
                b"abc".to_vec(),
                b"b".to_vec(),
                b"c".to_vec(),
                b"\xff".to_vec()
            ],
            "{:?}",
            index_type
        );

        let mut reverse = index.iterator(true);
        let keys = collect(&mut reverse);
        assert_eq!(keys.first(), Some(&b"\xff".to_vec()));
        assert_eq!(keys.last(), Some(&b"a".to_vec()));
        assert_eq!(keys.len(), 6);
    }
}

#[test]
fn test_iterator_seek() {
    for index_type in ALL_TYPES {
        let (_temp, index) = setup_temp_index(index_type);
        fill(&index, &[b"aa", b"bb", b"cc", b"dd"]);

        let mut forward = index.iterator(false);
        forward.seek(b"bc");
        assert!(forward.valid());
        assert_eq!(forward.key(), b"cc", "{:?}", index_type);
        forward.seek(b"bb");
        assert_eq!(forward.key(), b"bb");
        forward.seek(b"zz");
        assert!(!forward.valid());

        let mut reverse = index.iterator(true);
        reverse.seek(b"bc");
        assert_eq!(reverse.key(), b"bb", "{:?}", index_type);
        reverse.next();
        assert_eq!(reverse.key(), b"aa");
        reverse.next();
        assert!(!reverse.valid());

        reverse.rewind();
        assert_eq!(reverse.key(), b"dd");
    }
}

#[test]
fn test_iterator_values_and_close() {
    for index_type in ALL_TYPES {
        let (_temp, index) = setup_temp_index(index_type);
        index.put(b"k".to_vec(), pos(4, 96)).unwrap();

        let mut iter = index.iterator(false);
        assert_eq!(iter.value(), pos(4, 96));
        iter.close();
        assert!(!iter.valid());
    }
}

#[test]
fn test_in_memory_iterator_is_a_snapshot() {
    for index_type in [IndexType::BTree, IndexType::Art] {
        let (_temp, index) = setup_temp_index(index_type);
        fill(&index, &[b"a", b"b"]);

        let mut iter = index.iterator(false);
        index.put(b"c".to_vec(), pos(0, 0)).unwrap();
        index.delete(b"a").unwrap();

        assert_eq!(collect(&mut iter), vec![b"a".to_vec(), b"b".to_vec()]);
    }
}

#[test]
fn test_empty_index_iterator() {
    for index_type in ALL_TYPES {
        let (_temp, index) = setup_temp_index(index_type);

        let mut iter = index.iterator(false);
        assert!(!iter.valid());
        iter.seek(b"anything");
        assert!(!iter.valid());
    }
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_bptree_survives_reopen() {
    let temp = TempDir::new().unwrap();
    {
        let index = Index::open(IndexType::BPlusTree, temp.path()).unwrap();
        index.put(b"durable".to_vec(), pos(9, 900)).unwrap();
        index.put(b"gone".to_vec(), pos(9, 910)).unwrap();
        index.delete(b"gone").unwrap();
        index.close().unwrap();
    }

    let index = Index::open(IndexType::BPlusTree, temp.path()).unwrap();
    assert_eq!(index.get(b"durable").unwrap(), Some(pos(9, 900)));
    assert_eq!(index.get(b"gone").unwrap(), None);
    assert_eq!(index.size(), 1);
    assert!(temp.path().join("bptree-index").is_dir());
}

#[test]
fn test_in_memory_indexes_start_empty() {
    let temp = TempDir::new().unwrap();
    {
        let index = Index::open(IndexType::BTree, temp.path()).unwrap();
        index.put(b"volatile".to_vec(), pos(0, 0)).unwrap();
    }

    let index = Index::open(IndexType::BTree, temp.path()).unwrap();
    assert_eq!(index.size(), 0);
    assert!(!temp.path().join("bptree-index").exists());
}
