//! Whole-module byte storage.
//!
//! The patcher never touches the filesystem directly. Module images are read, written, copied
//! and listed through [`ModuleStorage`]: [`FileStorage`] is the disk implementation and
//! [`MemoryStorage`] keeps everything in a map, which is what dry runs and tests use.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use sha1::{Digest, Sha1};

use crate::{file::Physical, Error, Result};

/// Storage for module images, addressed by path.
pub trait ModuleStorage {
    /// Read the complete image at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileError`] if the image cannot be read.
    fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Replace the image at `path` with `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileError`] if the image cannot be written.
    fn write(&self, path: &Path, bytes: &[u8]) -> Result<()>;

    /// Copy the image at `from` to `to` byte for byte.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WorkingCopy`] if the copy cannot be made or does not match its source.
    fn copy(&self, from: &Path, to: &Path) -> Result<()>;

    /// Paths in `directory` whose extension is one of `extensions`, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileError`] if the directory cannot be listed.
    fn list(&self, directory: &Path, extensions: &[String]) -> Result<Vec<PathBuf>>;

    /// Remove the image at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileError`] if the image exists and cannot be removed.
    fn remove(&self, path: &Path) -> Result<()>;
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| extensions.iter().any(|wanted| wanted.eq_ignore_ascii_case(ext)))
}

/// SHA-1 digest of `data`.
#[must_use]
pub fn digest(data: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Module storage on the local filesystem.
///
/// Reads go through a read-only memory mapping; copies are verified by comparing the SHA-1
/// digests of source and destination.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileStorage;

impl FileStorage {
    /// Create the storage.
    #[must_use]
    pub fn new() -> Self {
        FileStorage
    }
}

impl ModuleStorage for FileStorage {
    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let physical = Physical::new(path)?;
        Ok(physical.data().to_vec())
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        fs::write(path, bytes)?;
        Ok(())
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        let working_copy = |message: String| Error::WorkingCopy {
            path: to.to_path_buf(),
            message,
        };

        fs::copy(from, to).map_err(|e| working_copy(e.to_string()))?;
        let source = Physical::new(from).map_err(|e| working_copy(e.to_string()))?;
        let copy = Physical::new(to).map_err(|e| working_copy(e.to_string()))?;
        if digest(source.data()) != digest(copy.data()) {
            return Err(working_copy(format!(
                "digest differs from {}",
                from.display()
            )));
        }
        Ok(())
    }

    fn list(&self, directory: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(directory)? {
            let path = entry?.path();
            if path.is_file() && has_extension(&path, extensions) {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    fn remove(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Module storage held in memory.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    files: Mutex<BTreeMap<PathBuf, Vec<u8>>>,
}

impl MemoryStorage {
    /// An empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `bytes` at `path`, replacing what was there.
    pub fn insert(&self, path: impl Into<PathBuf>, bytes: Vec<u8>) {
        self.lock().insert(path.into(), bytes);
    }

    /// The bytes stored at `path`.
    #[must_use]
    pub fn get(&self, path: &Path) -> Option<Vec<u8>> {
        self.lock().get(path).cloned()
    }

    /// Whether `path` is stored.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.lock().contains_key(path)
    }

    /// Every stored path.
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        self.lock().keys().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<PathBuf, Vec<u8>>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.files
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn not_found(path: &Path) -> Error {
        Error::FileError(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} not found", path.display()),
        ))
    }
}

impl ModuleStorage for MemoryStorage {
    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.get(path).ok_or_else(|| Self::not_found(path))
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        self.insert(path, bytes.to_vec());
        Ok(())
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        let bytes = self.get(from).ok_or_else(|| Error::WorkingCopy {
            path: to.to_path_buf(),
            message: format!("{} not found", from.display()),
        })?;
        self.insert(to, bytes);
        Ok(())
    }

    fn list(&self, directory: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
        Ok(self
            .lock()
            .keys()
            .filter(|p| p.parent() == Some(directory) && has_extension(p, extensions))
            .cloned()
            .collect())
    }

    fn remove(&self, path: &Path) -> Result<()> {
        self.lock().remove(path);
        Ok(())
    }
}
