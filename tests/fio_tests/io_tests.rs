//! Tests for the file I/O backends
//!
//! These tests verify:
//! - Append and positional reads on FileIo
//! - Short reads at end of file
//! - The read-only contract of MmapIo

use std::path::PathBuf;

use caskkv::fio::{new_io_manager, FileIo, IoManager, IoType, MmapIo};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_path() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("000000000.data");
    (temp_dir, path)
}

// =============================================================================
// FileIo Tests
// =============================================================================

#[test]
fn test_file_io_write_then_read() {
    let (_temp, path) = setup_temp_path();
    let mut io = FileIo::open(&path).unwrap();

    assert_eq!(io.write(b"hello ").unwrap(), 6);
    assert_eq!(io.write(b"world").unwrap(), 5);
    io.sync().unwrap();

    let mut buf = [0u8; 5];
    assert_eq!(io.read(&mut buf, 6).unwrap(), 5);
    assert_eq!(&buf, b"world");
    assert_eq!(io.size().unwrap(), 11);
}

#[test]
fn test_file_io_short_read_at_end() {
    let (_temp, path) = setup_temp_path();
    let mut io = FileIo::open(&path).unwrap();
    io.write(b"abc").unwrap();

    let mut buf = [0u8; 8];
    assert_eq!(io.read(&mut buf, 1).unwrap(), 2);
    assert_eq!(&buf[..2], b"bc");
    assert_eq!(io.read(&mut buf, 10).unwrap(), 0);
}

#[test]
fn test_file_io_appends_after_reopen() {
    let (_temp, path) = setup_temp_path();
    {
        let mut io = FileIo::open(&path).unwrap();
        io.write(b"first").unwrap();
        io.close().unwrap();
    }

    let mut io = FileIo::open(&path).unwrap();
    io.write(b"second").unwrap();

    let mut buf = vec![0u8; 11];
    io.read(&mut buf, 0).unwrap();
    assert_eq!(buf, b"firstsecond");
}

#[test]
fn test_file_io_truncate() {
    let (_temp, path) = setup_temp_path();
    let mut io = FileIo::open(&path).unwrap();
    io.write(b"keep-drop").unwrap();

    io.truncate(4).unwrap();
    io.write(b"!").unwrap();

    let mut buf = vec![0u8; 5];
    io.read(&mut buf, 0).unwrap();
    assert_eq!(buf, b"keep!");
}

// =============================================================================
// MmapIo Tests
// =============================================================================

#[test]
fn test_mmap_reads_existing_bytes() {
    let (_temp, path) = setup_temp_path();
    let mut file_io = FileIo::open(&path).unwrap();
    file_io.write(b"mapped data").unwrap();
    file_io.sync().unwrap();

    let mmap = MmapIo::open(&path).unwrap();
    let mut buf = [0u8; 4];
    assert_eq!(mmap.read(&mut buf, 7).unwrap(), 4);
    assert_eq!(&buf, b"data");
    assert_eq!(mmap.size().unwrap(), 11);
}

#[test]
fn test_mmap_empty_file() {
    let (_temp, path) = setup_temp_path();
    let mmap = MmapIo::open(&path).unwrap();

    let mut buf = [0u8; 4];
    assert_eq!(mmap.size().unwrap(), 0);
    assert_eq!(mmap.read(&mut buf, 0).unwrap(), 0);
}

#[test]
fn test_mmap_is_read_only() {
    let (_temp, path) = setup_temp_path();
    let mut mmap = new_io_manager(&path, IoType::MemoryMap).unwrap();

    assert!(mmap.write(b"nope").is_err());
    assert!(mmap.sync().is_err());
    assert!(mmap.truncate(0).is_err());
}
