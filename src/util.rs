//! Filesystem helpers shared by stat and merge

use std::fs;
use std::path::Path;

use crate::error::Result;

/// Total size in bytes of every file below `dir`
pub fn dir_size(dir: &Path) -> Result<u64> {
    let mut total = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if metadata.is_dir() {
            total += dir_size(&entry.path())?;
        } else {
            total += metadata.len();
        }
    }
    Ok(total)
}

/// Free space available to this process on the filesystem holding `dir`
pub fn available_disk_space(dir: &Path) -> Result<u64> {
    Ok(fs4::available_space(dir)?)
}
