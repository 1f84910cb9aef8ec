// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Filesystem capability.
//!
//! Components that touch files inside the vault are handed a [`FileSystem`]
//! at construction time instead of reaching for [`std::fs`] directly. All
//! paths given to a file system are relative to the vault root.

use std::{
    fs::{self, read_dir, read_to_string, write},
    io,
    path::{Path, PathBuf},
};

/// Minimal file operations over a rooted directory.
pub trait FileSystem: Send + Sync + 'static {
    /// Read file at relative path into a string.
    fn read(&self, path: &Path) -> io::Result<String>;

    /// Write string to file at relative path, replacing previous content.
    fn write(&self, path: &Path, contents: &str) -> io::Result<()>;

    /// List entries of directory at relative path.
    fn list(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    /// Create directory at relative path along with missing parents.
    fn mkdir(&self, path: &Path) -> io::Result<()>;

    /// Check if anything exists at relative path.
    fn exists(&self, path: &Path) -> bool;
}

/// File system rooted at a directory on local disk.
#[derive(Debug, Clone)]
pub struct LocalFs {
    root: PathBuf,
}

impl LocalFs {
    /// Construct new local file system rooted at target directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }
}

impl FileSystem for LocalFs {
    fn read(&self, path: &Path) -> io::Result<String> {
        read_to_string(self.resolve(path))
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        write(self.resolve(path), contents.as_bytes())
    }

    fn list(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let mut entries = read_dir(self.resolve(path))?
            .map(|entry| entry.map(|entry| path.join(entry.file_name())))
            .collect::<io::Result<Vec<_>>>()?;
        entries.sort();

        Ok(entries)
    }

    fn mkdir(&self, path: &Path) -> io::Result<()> {
        mkdirp::mkdirp(self.resolve(path)).map(|_| ())
    }

    fn exists(&self, path: &Path) -> bool {
        fs::symlink_metadata(self.resolve(path)).is_ok()
    }
}

/// File system kept entirely in memory.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct MemoryFs {
    files: std::sync::Mutex<std::collections::HashMap<PathBuf, String>>,
    broken: bool,
}

#[cfg(test)]
impl MemoryFs {
    pub(crate) fn with_file(path: &str, content: &str) -> Self {
        let fs = Self::default();
        fs.files
            .lock()
            .unwrap()
            .insert(PathBuf::from(path), content.into());
        fs
    }

    /// File system whose reads always fail with something other than "not found".
    pub(crate) fn broken() -> Self {
        Self {
            broken: true,
            ..Default::default()
        }
    }
}

#[cfg(test)]
impl FileSystem for MemoryFs {
    fn read(&self, path: &Path) -> io::Result<String> {
        if self.broken {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "nope"));
        }

        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), contents.into());
        Ok(())
    }

    fn list(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let mut entries = self
            .files
            .lock()
            .unwrap()
            .keys()
            .filter(|entry| entry.parent() == Some(path))
            .cloned()
            .collect::<Vec<_>>();
        entries.sort();
        Ok(entries)
    }

    fn mkdir(&self, _path: &Path) -> io::Result<()> {
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.lock().unwrap().contains_key(path)
    }
}
