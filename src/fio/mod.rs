//! File I/O Module
//!
//! Byte-level access to a single segment file.
//!
//! ## Responsibilities
//! - Positional reads, append-only writes and fsync
//! - Report the physical file size
//! - Read-only memory-mapped backend for fast startup scans
//!
//! ## Backends
//! ```text
//! ┌──────────────┬───────┬───────┬──────┬──────┐
//! │ Backend      │ read  │ write │ sync │ size │
//! ├──────────────┼───────┼───────┼──────┼──────┤
//! │ FileIo       │  yes  │  yes  │ yes  │ yes  │
//! │ MmapIo       │  yes  │  no   │  no  │ yes  │
//! └──────────────┴───────┴───────┴──────┴──────┘
//! (truncate follows write)
//! ```

mod file_io;
mod mmap;

use std::path::Path;

use crate::error::Result;

pub use file_io::FileIo;
pub use mmap::MmapIo;

/// Permissions used when creating segment files (unix only)
pub const DATA_FILE_PERM: u32 = 0o644;

/// Which backend a segment file is opened with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoType {
    /// Standard file I/O (read/write/sync)
    Standard,

    /// Read-only memory map
    MemoryMap,
}

/// Byte-level operations on one segment file
pub trait IoManager: Send + Sync {
    /// Read into `buf` starting at `offset`; returns bytes read (short at EOF)
    fn read(&self, buf: &mut [u8], offset: u64) -> Result<usize>;

    /// Append `buf` at the end of the file
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Flush written bytes to stable storage
    fn sync(&self) -> Result<()>;

    /// Current physical size in bytes
    fn size(&self) -> Result<u64>;

    /// Cut the file back to `len` bytes
    fn truncate(&mut self, len: u64) -> Result<()>;

    /// Release the handle, flushing anything the backend buffered
    fn close(&mut self) -> Result<()>;
}

/// Open `path` with the requested backend
pub fn new_io_manager(path: &Path, io_type: IoType) -> Result<Box<dyn IoManager>> {
    match io_type {
        IoType::Standard => Ok(Box::new(FileIo::open(path)?)),
        IoType::MemoryMap => Ok(Box::new(MmapIo::open(path)?)),
    }
}
