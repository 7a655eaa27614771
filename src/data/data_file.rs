//! Segment files
//!
//! Record-level access to one file on top of an [`IoManager`] backend.

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{CaskError, Result};
use crate::fio::{new_io_manager, IoManager, IoType};

use super::log_record::{
    decode_header, log_record_crc, LogRecord, LogRecordPos, LogRecordType,
    MAX_LOG_RECORD_HEADER_SIZE,
};

/// Extension of segment files: `{id:09}.data`
pub const DATA_FILE_NAME_SUFFIX: &str = ".data";

/// Pointer-only index snapshot written by merge
pub const HINT_FILE_NAME: &str = "hint-index";

/// Completion marker of a merge, holds the watermark id
pub const MERGE_FINISHED_FILE_NAME: &str = "merge-finished";

/// Last sequence number, persisted on close for the on-disk index
pub const SEQ_NO_FILE_NAME: &str = "seq-no";

/// An append-only file of encoded log records
pub struct DataFile {
    file_id: u32,
    /// Logical end of the file: where the next record goes
    write_off: u64,
    io: Box<dyn IoManager>,
}

impl DataFile {
    /// Open the segment file `file_id` in `dir`
    pub fn open(dir: &Path, file_id: u32, io_type: IoType) -> Result<Self> {
        Self::open_path(&Self::file_name(dir, file_id), file_id, io_type)
    }

    /// Open the hint file of `dir`
    pub fn open_hint_file(dir: &Path) -> Result<Self> {
        Self::open_path(&dir.join(HINT_FILE_NAME), 0, IoType::Standard)
    }

    /// Open the merge completion marker of `dir`
    pub fn open_merge_finished_file(dir: &Path) -> Result<Self> {
        Self::open_path(&dir.join(MERGE_FINISHED_FILE_NAME), 0, IoType::Standard)
    }

    /// Open the sequence number file of `dir`
    pub fn open_seq_no_file(dir: &Path) -> Result<Self> {
        Self::open_path(&dir.join(SEQ_NO_FILE_NAME), 0, IoType::Standard)
    }

    fn open_path(path: &Path, file_id: u32, io_type: IoType) -> Result<Self> {
        let io = new_io_manager(path, io_type)?;
        Ok(Self {
            file_id,
            write_off: 0,
            io,
        })
    }

    /// Path of segment `file_id` inside `dir`
    pub fn file_name(dir: &Path, file_id: u32) -> PathBuf {
        dir.join(format!("{:09}{}", file_id, DATA_FILE_NAME_SUFFIX))
    }

    /// Parse a segment id from a file name: "000000042.data" → Some(42)
    ///
    /// `None` for names that are not segment files at all, `Err` for names
    /// with the segment suffix but an unparsable id.
    pub fn parse_file_id(name: &str) -> Result<Option<u32>> {
        let Some(stem) = name.strip_suffix(DATA_FILE_NAME_SUFFIX) else {
            return Ok(None);
        };
        stem.parse::<u32>().map(Some).map_err(|_| {
            CaskError::DataDirectoryCorrupted(format!("invalid data file name {}", name))
        })
    }

    pub fn file_id(&self) -> u32 {
        self.file_id
    }

    pub fn write_off(&self) -> u64 {
        self.write_off
    }

    pub fn set_write_off(&mut self, offset: u64) {
        self.write_off = offset;
    }

    /// Physical size of the underlying file
    pub fn size(&self) -> Result<u64> {
        self.io.size()
    }

    /// Read the record starting at `offset`
    ///
    /// Returns:
    /// - `Ok(Some((record, encoded_size)))`: a valid record
    /// - `Ok(None)`: end of file (including zero fill and a torn tail)
    /// - `Err(InvalidCrc)`: the record is corrupted
    pub fn read_log_record(&self, offset: u64) -> Result<Option<(LogRecord, u64)>> {
        let file_size = self.io.size()?;
        if offset >= file_size {
            return Ok(None);
        }

        // Bounded header read, shortened near the end of the file
        let header_len = (MAX_LOG_RECORD_HEADER_SIZE as u64).min(file_size - offset) as usize;
        let mut header_buf = vec![0u8; header_len];
        let read = self.io.read(&mut header_buf, offset)?;
        header_buf.truncate(read);

        let (header, header_size) = match decode_header(&header_buf)? {
            Some(decoded) => decoded,
            None if header_buf.len() < MAX_LOG_RECORD_HEADER_SIZE => {
                warn!(file_id = self.file_id, offset, "torn record header at end of file");
                return Ok(None);
            }
            None => {
                return Err(CaskError::CorruptedRecord(format!(
                    "undecodable header in data file {} at offset {}",
                    self.file_id, offset
                )))
            }
        };

        if header.is_end_marker() {
            return Ok(None);
        }

        let key_size = header.key_size as usize;
        let kv_size = key_size + header.value_size as usize;
        let record_size = (header_size + kv_size) as u64;
        if offset + record_size > file_size {
            warn!(file_id = self.file_id, offset, "torn record at end of file");
            return Ok(None);
        }

        let mut kv_buf = vec![0u8; kv_size];
        let read = self.io.read(&mut kv_buf, offset + header_size as u64)?;
        if read < kv_size {
            return Ok(None);
        }
        let value = kv_buf.split_off(key_size);
        let record = LogRecord {
            key: kv_buf,
            value,
            rec_type: header.rec_type,
        };

        let crc = log_record_crc(&record, &header_buf[4..header_size]);
        if crc != header.crc {
            return Err(CaskError::InvalidCrc {
                file_id: self.file_id,
                offset,
            });
        }

        Ok(Some((record, record_size)))
    }

    /// Read the value of the record at `offset`
    pub fn read_value(&self, offset: u64) -> Result<Vec<u8>> {
        match self.read_log_record(offset)? {
            Some((record, _)) if record.rec_type == LogRecordType::Normal => Ok(record.value),
            Some(_) => Err(CaskError::CorruptedRecord(format!(
                "record in data file {} at offset {} is not a value",
                self.file_id, offset
            ))),
            None => Err(CaskError::CorruptedRecord(format!(
                "no record in data file {} at offset {}",
                self.file_id, offset
            ))),
        }
    }

    /// Append raw encoded bytes and advance the write offset
    pub fn write(&mut self, buf: &[u8]) -> Result<()> {
        let written = self.io.write(buf)?;
        self.write_off += written as u64;
        Ok(())
    }

    /// Drop everything past `len`, e.g. a torn record left by a crash
    pub fn truncate(&mut self, len: u64) -> Result<()> {
        self.io.truncate(len)?;
        self.write_off = len;
        Ok(())
    }

    /// Append a hint entry: logical key → encoded position
    pub fn write_hint_record(&mut self, key: &[u8], pos: &LogRecordPos) -> Result<()> {
        let record = LogRecord::normal(key, pos.encode());
        self.write(&record.encode())
    }

    pub fn sync(&self) -> Result<()> {
        self.io.sync()
    }

    /// Swap the I/O backend, e.g. from mmap back to standard file I/O
    pub fn set_io_manager(&mut self, dir: &Path, io_type: IoType) -> Result<()> {
        let mut io = new_io_manager(&Self::file_name(dir, self.file_id), io_type)?;
        std::mem::swap(&mut self.io, &mut io);
        io.close()
    }

    pub fn close(mut self) -> Result<()> {
        self.io.close()
    }
}
