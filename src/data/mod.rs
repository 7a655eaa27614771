//! Data Module
//!
//! On-disk record format and segment files.
//!
//! ## Responsibilities
//! - Encode/decode log records with CRC32 checksums
//! - Encode/decode record positions for the hint file and on-disk index
//! - Sequence-number prefixes for write batch keys
//! - Record-level reads and appends on segment files
//!
//! ## Record Format
//! ```text
//! ┌─────────┬──────────┬──────────────┬────────────────┬───────┬─────────┐
//! │ CRC (4) │ Type (1) │ KeyLen (var) │ ValueLen (var) │  Key  │  Value  │
//! └─────────┴──────────┴──────────────┴────────────────┴───────┴─────────┘
//!   CRC32 covers every byte after itself; lengths are zigzag varints.
//!
//! Physical key = uvarint(seq_no) ++ logical key   (seq_no 0 = no batch)
//! ```

mod data_file;
mod log_record;
pub mod varint;

pub use data_file::{
    DataFile, DATA_FILE_NAME_SUFFIX, HINT_FILE_NAME, MERGE_FINISHED_FILE_NAME, SEQ_NO_FILE_NAME,
};
pub use log_record::{
    decode_header, encode_key_with_seq, log_record_crc, parse_key_with_seq, LogRecord,
    LogRecordHeader, LogRecordPos, LogRecordType, TransactionRecord, MAX_LOG_RECORD_HEADER_SIZE,
    NON_TRANSACTION_SEQ_NO, TXN_FIN_KEY,
};
