//! Log record codec
//!
//! Encodes one mutation as `[crc][type][keyLen][valueLen][key][value]` and the
//! index pointer that locates it.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{CaskError, Result};

use super::varint::{self, MAX_VARINT_LEN32, MAX_VARINT_LEN64};

/// CRC (4) + type (1) + two varint-32 lengths
pub const MAX_LOG_RECORD_HEADER_SIZE: usize = 4 + 1 + MAX_VARINT_LEN32 * 2;

/// Sequence number of writes made outside a write batch
pub const NON_TRANSACTION_SEQ_NO: u64 = 0;

/// Logical key of the record that commits a write batch
pub const TXN_FIN_KEY: &[u8] = b"txn-fix";

const CRC_SIZE: usize = 4;

// =============================================================================
// Record Types
// =============================================================================

/// Kind of mutation a record describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LogRecordType {
    /// A live key/value pair
    Normal = 0,

    /// A tombstone
    Deleted = 1,

    /// Commit marker of a write batch
    TxnFinished = 2,
}

impl TryFrom<u8> for LogRecordType {
    type Error = CaskError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Normal),
            1 => Ok(Self::Deleted),
            2 => Ok(Self::TxnFinished),
            other => Err(CaskError::CorruptedRecord(format!(
                "unknown record type {}",
                other
            ))),
        }
    }
}

/// One entry of a segment file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub rec_type: LogRecordType,
}

impl LogRecord {
    /// A live key/value record
    pub fn normal(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            rec_type: LogRecordType::Normal,
        }
    }

    /// A tombstone for `key`
    pub fn deleted(key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: Vec::new(),
            rec_type: LogRecordType::Deleted,
        }
    }

    /// Encode into the on-disk layout. The CRC is computed last over
    /// everything that follows it.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(
            MAX_LOG_RECORD_HEADER_SIZE + self.key.len() + self.value.len(),
        );
        buf.put_u32_le(0);
        buf.put_u8(self.rec_type as u8);
        varint::put_varint(&mut buf, self.key.len() as i64);
        varint::put_varint(&mut buf, self.value.len() as i64);
        buf.put_slice(&self.key);
        buf.put_slice(&self.value);

        let crc = crc32fast::hash(&buf[CRC_SIZE..]);
        buf[..CRC_SIZE].copy_from_slice(&crc.to_le_bytes());
        buf.freeze()
    }
}

/// Checksum of a record given its encoded header minus the CRC field
pub fn log_record_crc(record: &LogRecord, header_without_crc: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(header_without_crc);
    hasher.update(&record.key);
    hasher.update(&record.value);
    hasher.finalize()
}

// =============================================================================
// Header
// =============================================================================

/// Fixed part of an encoded record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRecordHeader {
    pub crc: u32,
    pub rec_type: LogRecordType,
    pub key_size: u32,
    pub value_size: u32,
}

impl LogRecordHeader {
    /// Zero-filled space past the last real record
    pub fn is_end_marker(&self) -> bool {
        self.crc == 0 && self.key_size == 0 && self.value_size == 0
    }
}

/// Decode a header from the start of `buf`
///
/// Returns:
/// - `Ok(Some((header, header_size)))`: a complete header
/// - `Ok(None)`: the buffer is too short to hold a header
/// - `Err(CorruptedRecord)`: unknown type or impossible lengths
pub fn decode_header(buf: &[u8]) -> Result<Option<(LogRecordHeader, usize)>> {
    if buf.len() <= CRC_SIZE {
        return Ok(None);
    }

    let crc = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let type_byte = buf[CRC_SIZE];
    let mut index = CRC_SIZE + 1;

    let Some((key_size, n)) = varint::varint(&buf[index..]) else {
        return Ok(None);
    };
    index += n;

    let Some((value_size, n)) = varint::varint(&buf[index..]) else {
        return Ok(None);
    };
    index += n;

    let key_size = u32::try_from(key_size)
        .map_err(|_| CaskError::CorruptedRecord(format!("invalid key size {}", key_size)))?;
    let value_size = u32::try_from(value_size)
        .map_err(|_| CaskError::CorruptedRecord(format!("invalid value size {}", value_size)))?;

    // Zero fill carries type 0, so only validate the type for real headers
    let rec_type = if crc == 0 && key_size == 0 && value_size == 0 {
        LogRecordType::Normal
    } else {
        LogRecordType::try_from(type_byte)?
    };

    Ok(Some((
        LogRecordHeader {
            crc,
            rec_type,
            key_size,
            value_size,
        },
        index,
    )))
}

// =============================================================================
// Position
// =============================================================================

/// Location of an encoded record: the index's value type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct LogRecordPos {
    /// Segment file id
    pub file_id: u32,
    /// Byte offset of the record start
    pub offset: u64,
    /// Encoded record length
    pub size: u32,
}

impl LogRecordPos {
    /// Encode as three signed varints (file id, offset, size)
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(MAX_VARINT_LEN32 * 2 + MAX_VARINT_LEN64);
        varint::put_varint(&mut buf, i64::from(self.file_id));
        varint::put_varint(&mut buf, self.offset as i64);
        varint::put_varint(&mut buf, i64::from(self.size));
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let truncated = || CaskError::CorruptedRecord("truncated record position".to_string());

        let (file_id, n) = varint::varint(buf).ok_or_else(truncated)?;
        let mut index = n;
        let (offset, n) = varint::varint(&buf[index..]).ok_or_else(truncated)?;
        index += n;
        let (size, _) = varint::varint(&buf[index..]).ok_or_else(truncated)?;

        let invalid = |what: &str| CaskError::CorruptedRecord(format!("invalid position {}", what));
        Ok(Self {
            file_id: u32::try_from(file_id).map_err(|_| invalid("file id"))?,
            offset: u64::try_from(offset).map_err(|_| invalid("offset"))?,
            size: u32::try_from(size).map_err(|_| invalid("size"))?,
        })
    }
}

/// A batch record buffered during replay until its commit marker is seen
#[derive(Debug, Clone)]
pub struct TransactionRecord {
    pub record: LogRecord,
    pub pos: LogRecordPos,
}

// =============================================================================
// Sequence-Prefixed Keys
// =============================================================================

/// Physical key: `uvarint(seq_no) ++ key`
pub fn encode_key_with_seq(key: &[u8], seq_no: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(MAX_VARINT_LEN64 + key.len());
    varint::put_uvarint(&mut buf, seq_no);
    buf.extend_from_slice(key);
    buf
}

/// Split a physical key into its logical key and sequence number
pub fn parse_key_with_seq(encoded: &[u8]) -> Result<(&[u8], u64)> {
    let (seq_no, n) = varint::uvarint(encoded)
        .ok_or_else(|| CaskError::CorruptedRecord("missing sequence prefix".to_string()))?;
    Ok((&encoded[n..], seq_no))
}
