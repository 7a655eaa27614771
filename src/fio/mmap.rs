//! Memory-mapped backend
//!
//! Read-only. Used while scanning segments at startup; the engine swaps every
//! segment back to [`FileIo`](super::FileIo) before accepting writes.

use std::fs::OpenOptions;
use std::io;
use std::path::Path;

use memmap2::Mmap;

use crate::error::Result;

use super::IoManager;

/// Segment file mapped read-only into memory
pub struct MmapIo {
    /// `None` for empty files, which cannot be mapped portably
    map: Option<Mmap>,
}

impl MmapIo {
    /// Map `path`, creating an empty file if it does not exist
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let map = if file.metadata()?.len() == 0 {
            None
        } else {
            // SAFETY: segment files are append-only and this handle is dropped
            // before the engine writes to the file again.
            Some(unsafe { Mmap::map(&file)? })
        };

        Ok(Self { map })
    }

    fn bytes(&self) -> &[u8] {
        self.map.as_deref().unwrap_or(&[])
    }
}

impl IoManager for MmapIo {
    fn read(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let data = self.bytes();
        let start = match usize::try_from(offset) {
            Ok(start) if start < data.len() => start,
            _ => return Ok(0),
        };
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        Ok(n)
    }

    fn write(&mut self, _buf: &[u8]) -> Result<usize> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "mmap segment is read-only").into())
    }

    fn sync(&self) -> Result<()> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "mmap segment is read-only").into())
    }

    fn size(&self) -> Result<u64> {
        Ok(self.bytes().len() as u64)
    }

    fn truncate(&mut self, _len: u64) -> Result<()> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "mmap segment is read-only").into())
    }

    fn close(&mut self) -> Result<()> {
        self.map = None;
        Ok(())
    }
}
