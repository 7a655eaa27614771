//! Tests for EngineIterator
//!
//! These tests verify:
//! - Forward and reverse iteration with values
//! - Seek in both directions
//! - Prefix filtering
//! - Behaviour across index backends

use caskkv::{Config, Engine, IndexType, IteratorOptions};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_engine_with_keys(index_type: IndexType, keys: &[&str]) -> (TempDir, Engine) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .dir_path(temp_dir.path())
        .index_type(index_type)
        .build();
    let engine = Engine::open(config).unwrap();
    for key in keys {
        engine
            .put(key.as_bytes(), format!("value-{}", key).as_bytes())
            .unwrap();
    }
    (temp_dir, engine)
}

fn options(prefix: &str, reverse: bool) -> IteratorOptions {
    IteratorOptions {
        prefix: prefix.as_bytes().to_vec(),
        reverse,
    }
}

fn collect_keys(engine: &Engine, options: IteratorOptions) -> Vec<String> {
    let mut iter = engine.iter(options);
    let mut keys = Vec::new();
    while iter.valid() {
        keys.push(String::from_utf8(iter.key().to_vec()).unwrap());
        iter.next();
    }
    iter.close();
    keys
}

// =============================================================================
// Ordering Tests
// =============================================================================

#[test]
fn test_iterate_empty_engine() {
    let (_temp, engine) = setup_engine_with_keys(IndexType::BTree, &[]);

    let iter = engine.iter(IteratorOptions::default());
    assert!(!iter.valid());
}

#[test]
fn test_forward_iteration_with_values() {
    let (_temp, engine) = setup_engine_with_keys(IndexType::BTree, &["c", "a", "b"]);

    let mut iter = engine.iter(IteratorOptions::default());
    let mut pairs = Vec::new();
    while iter.valid() {
        pairs.push((iter.key().to_vec(), iter.value().unwrap()));
        iter.next();
    }

    assert_eq!(
        pairs,
        vec![
            (b"a".to_vec(), b"value-a".to_vec()),
            (b"b".to_vec(), b"value-b".to_vec()),
            (b"c".to_vec(), b"value-c".to_vec()),
        ]
    );
}

#[test]
fn test_reverse_iteration_every_backend() {
    for index_type in [IndexType::BTree, IndexType::Art, IndexType::BPlusTree] {
        let (_temp, engine) = setup_engine_with_keys(index_type, &["b", "d", "a", "c"]);

        assert_eq!(
            collect_keys(&engine, options("", true)),
            vec!["d", "c", "b", "a"],
            "{:?}",
            index_type
        );
    }
}

#[test]
fn test_deleted_keys_are_skipped() {
    let (_temp, engine) = setup_engine_with_keys(IndexType::Art, &["a", "b", "c"]);
    engine.delete(b"b").unwrap();

    assert_eq!(collect_keys(&engine, IteratorOptions::default()), vec!["a", "c"]);
}

// =============================================================================
// Seek Tests
// =============================================================================

#[test]
fn test_seek_forward_and_reverse() {
    let (_temp, engine) = setup_engine_with_keys(IndexType::BTree, &["aa", "bb", "cc", "dd"]);

    let mut forward = engine.iter(IteratorOptions::default());
    forward.seek(b"bz");
    assert_eq!(forward.key(), b"cc");
    assert_eq!(forward.value().unwrap(), b"value-cc");

    let mut reverse = engine.iter(options("", true));
    reverse.seek(b"bz");
    assert_eq!(reverse.key(), b"bb");
    reverse.next();
    assert_eq!(reverse.key(), b"aa");

    reverse.rewind();
    assert_eq!(reverse.key(), b"dd");
}

// =============================================================================
// Prefix Tests
// =============================================================================

#[test]
fn test_prefix_filter() {
    for index_type in [IndexType::BTree, IndexType::Art, IndexType::BPlusTree] {
        let (_temp, engine) = setup_engine_with_keys(
            index_type,
            &["apple", "apricot", "banana", "ap", "a", "apx", "zap"],
        );

        assert_eq!(
            collect_keys(&engine, options("ap", false)),
            vec!["ap", "apple", "apricot", "apx"],
            "{:?}",
            index_type
        );
        assert_eq!(
            collect_keys(&engine, options("ap", true)),
            vec!["apx", "apricot", "apple", "ap"],
            "{:?}",
            index_type
        );
        assert!(collect_keys(&engine, options("q", false)).is_empty());
    }
}

#[test]
fn test_prefix_longer_than_keys() {
    let (_temp, engine) = setup_engine_with_keys(IndexType::BTree, &["a", "ab"]);

    assert!(collect_keys(&engine, options("abc", false)).is_empty());
}

#[test]
fn test_seek_with_prefix() {
    let (_temp, engine) =
        setup_engine_with_keys(IndexType::BTree, &["user:1", "user:2", "user:3", "zone:1"]);

    let mut iter = engine.iter(options("user:", false));
    iter.seek(b"user:2");
    assert_eq!(iter.key(), b"user:2");
    iter.next();
    assert_eq!(iter.key(), b"user:3");
    iter.next();
    assert!(!iter.valid());
}
