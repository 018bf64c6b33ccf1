//! Memory-mapped read access to module files on disk.
//!
//! [`Physical`] maps a file into the address space so module images and working copies can be
//! decoded and hashed without an intermediate copy. The mapping is read-only; writes go through
//! [`crate::patcher::FileStorage`] with ordinary file I/O.

use std::{fs, path::Path};

use memmap2::Mmap;

use crate::{
    Error::{Empty, Error, FileError},
    Result,
};

/// A read-only memory mapping of a file.
#[derive(Debug)]
pub struct Physical {
    data: Mmap,
}

impl Physical {
    /// Map the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::FileError`] if the file cannot be opened,
    /// [`crate::Error::Empty`] for a zero-length file (which cannot be mapped) and
    /// [`crate::Error::Error`] if the mapping itself fails.
    pub fn new(path: impl AsRef<Path>) -> Result<Physical> {
        let file = match fs::File::open(path) {
            Ok(file) => file,
            Err(error) => return Err(FileError(error)),
        };

        if file.metadata()?.len() == 0 {
            return Err(Empty);
        }

        // The mapping is only read from while `Physical` is alive.
        let mmap = match unsafe { Mmap::map(&file) } {
            Ok(mmap) => mmap,
            Err(error) => return Err(Error(error.to_string())),
        };

        Ok(Physical { data: mmap })
    }

    /// The complete mapped contents.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Size of the mapped file in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the mapping is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn maps_file_contents() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"DSMI\x01\x00").unwrap();
        file.flush().unwrap();

        let physical = Physical::new(file.path()).unwrap();
        assert_eq!(physical.len(), 6);
        assert_eq!(&physical.data()[..4], b"DSMI");
    }

    #[test]
    fn empty_file_is_rejected() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(matches!(Physical::new(file.path()), Err(Empty)));
    }

    #[test]
    fn missing_file_is_file_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = Physical::new(dir.path().join("missing.dll"));
        assert!(matches!(result, Err(FileError(_))));
    }
}
