//! Error types for CaskKV
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using CaskError
pub type Result<T> = std::result::Result<T, CaskError>;

/// Unified error type for CaskKV operations
#[derive(Debug, Error)]
pub enum CaskError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Caller Errors
    // -------------------------------------------------------------------------
    #[error("Key is empty")]
    KeyIsEmpty,

    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // State Errors
    // -------------------------------------------------------------------------
    #[error("Database directory is in use by another process")]
    DatabaseInUse,

    #[error("Merge is already in progress")]
    MergeInProgress,

    #[error("Reclaimable ratio {ratio:.3} is below the merge threshold {threshold:.3}")]
    MergeRatioUnreached { ratio: f32, threshold: f32 },

    #[error("Not enough disk space for merge: need {required} bytes, {available} available")]
    NoEnoughSpaceForMerge { required: u64, available: u64 },

    #[error("Sequence number file is missing, write batches are disabled")]
    SeqNoFileMissing,

    // -------------------------------------------------------------------------
    // Corruption Errors
    // -------------------------------------------------------------------------
    #[error("Invalid CRC in data file {file_id} at offset {offset}")]
    InvalidCrc { file_id: u32, offset: u64 },

    #[error("Corrupted log record: {0}")]
    CorruptedRecord(String),

    #[error("Data directory corrupted: {0}")]
    DataDirectoryCorrupted(String),

    // -------------------------------------------------------------------------
    // Internal Consistency Errors
    // -------------------------------------------------------------------------
    #[error("Data file {0} not found")]
    DataFileNotFound(u32),

    #[error("Write batch has {pending} pending operations, limit is {max}")]
    ExceedMaxBatchNum { pending: usize, max: usize },

    #[error("Index error: {0}")]
    Index(#[from] sled::Error),
}
