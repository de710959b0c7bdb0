//! Storage Abstraction
//!
//! The SD card's FAT filesystem as seen through a handful of primitives.
//! Writes become durable only after [`Storage::commit`].

use crate::error::{Error, Result};
use alloc::string::ToString;

/// Metadata returned by [`Storage::stat`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileStat {
    pub exists: bool,
    /// Modification time, seconds since epoch
    pub mtime: u64,
}

/// Filesystem operations
pub trait Storage {
    /// Mount the filesystem
    fn mount(&mut self) -> Result<()>;

    /// Unmount and power down the card
    fn unmount(&mut self);

    /// Check if filesystem is mounted
    fn is_mounted(&self) -> bool;

    /// Query file metadata; a missing file is `exists == false`, not an error
    fn stat(&self, path: &str) -> FileStat;

    /// Read up to `buf.len()` bytes from the start of a file
    fn read(&mut self, path: &str, buf: &mut [u8]) -> Result<usize>;

    /// Create or truncate a file and write `data`.
    ///
    /// Returns the number of bytes that reached the file, which may be
    /// less than `data.len()`.
    fn write(&mut self, path: &str, data: &[u8]) -> Result<usize>;

    /// Create a directory and any missing parents
    fn mkdir(&mut self, path: &str) -> Result<()>;

    /// Durability barrier: flush everything written so far
    fn commit(&mut self);
}

/// Write `data` and fail unless every byte was written.
pub fn write_all(storage: &mut dyn Storage, path: &str, data: &[u8]) -> Result<()> {
    let written = storage.write(path, data)?;
    if written != data.len() {
        return Err(Error::ShortWrite {
            path: path.to_string(),
            written,
            expected: data.len(),
        });
    }
    Ok(())
}

/// Directory part of a path, without the trailing slash.
pub fn dirname(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(idx) => &path[..idx],
        None => ".",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirname() {
        assert_eq!(dirname("/savestate/nes/mario.nes-0.sav"), "/savestate/nes");
        assert_eq!(dirname("/off.sav"), "/");
        assert_eq!(dirname("off.sav"), ".");
    }
}
