//! Configuration for CaskKV
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{CaskError, Result};
use crate::index::IndexType;

/// Main configuration for a CaskKV instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Database directory. Internal structure:
    ///   {dir_path}/
    ///     ├── 000000000.data, ...  (segment files)
    ///     ├── hint-index           (written by merge)
    ///     ├── merge-finished       (written by merge)
    ///     ├── seq-no               (on-disk index only)
    ///     ├── bptree-index/        (on-disk index only)
    ///     └── flock                (advisory directory lock)
    pub dir_path: PathBuf,

    /// Size in bytes at which the active segment is rotated
    pub data_file_size: u64,

    /// When to fsync the active segment
    pub sync_strategy: SyncStrategy,

    // -------------------------------------------------------------------------
    // Index Configuration
    // -------------------------------------------------------------------------
    /// Index backend, fixed for the life of a directory
    pub index_type: IndexType,

    /// Scan segments through read-only memory maps during open
    pub mmap_at_startup: bool,

    // -------------------------------------------------------------------------
    // Merge Configuration
    // -------------------------------------------------------------------------
    /// Minimum reclaimable/total bytes ratio (0..=1) before a merge runs
    pub data_file_merge_ratio: f32,
}

/// Segment sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// Leave flushing to the OS; segments are still synced on rotation and close
    Os,

    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync once this many bytes have been written since the last sync
    EveryNBytes { bytes: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dir_path: PathBuf::from("./caskkv_data"),
            data_file_size: 256 * 1024 * 1024, // 256 MB
            sync_strategy: SyncStrategy::Os,
            index_type: IndexType::BTree,
            mmap_at_startup: false,
            data_file_merge_ratio: 0.5,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.dir_path.as_os_str().is_empty() {
            return Err(CaskError::Config("database dir path is empty".to_string()));
        }
        if self.data_file_size == 0 {
            return Err(CaskError::Config(
                "data file size must be greater than 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.data_file_merge_ratio) {
            return Err(CaskError::Config(format!(
                "merge ratio must be within [0, 1], got {}",
                self.data_file_merge_ratio
            )));
        }
        if let SyncStrategy::EveryNBytes { bytes: 0 } = self.sync_strategy {
            return Err(CaskError::Config(
                "bytes per sync must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the database directory
    pub fn dir_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.dir_path = path.into();
        self
    }

    /// Set the segment rotation size (in bytes)
    pub fn data_file_size(mut self, size: u64) -> Self {
        self.config.data_file_size = size;
        self
    }

    /// Set the sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Set the index backend
    pub fn index_type(mut self, index_type: IndexType) -> Self {
        self.config.index_type = index_type;
        self
    }

    /// Enable or disable memory-mapped reads during open
    pub fn mmap_at_startup(mut self, enabled: bool) -> Self {
        self.config.mmap_at_startup = enabled;
        self
    }

    /// Set the merge trigger ratio
    pub fn data_file_merge_ratio(mut self, ratio: f32) -> Self {
        self.config.data_file_merge_ratio = ratio;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

/// Options for [`Engine::iter`](crate::Engine::iter)
#[derive(Debug, Clone, Default)]
pub struct IteratorOptions {
    /// Only yield keys starting with this prefix (empty = all keys)
    pub prefix: Vec<u8>,

    /// Iterate in descending key order
    pub reverse: bool,
}

/// Options for [`Engine::new_write_batch`](crate::Engine::new_write_batch)
#[derive(Debug, Clone, Copy)]
pub struct WriteBatchOptions {
    /// Maximum number of pending operations a single commit accepts
    pub max_batch_num: usize,

    /// fsync the active segment after the commit marker is written
    pub sync_writes: bool,
}

impl Default for WriteBatchOptions {
    fn default() -> Self {
        Self {
            max_batch_num: 10_000,
            sync_writes: true,
        }
    }
}
