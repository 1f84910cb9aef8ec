// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Ignore file reconciliation.
//!
//! The host application keeps its private settings inside the vault. Those
//! settings must never end up in the remote, so vaultsync makes sure that the
//! ignore file at the top-level of the vault always excludes them.
//!
//! Reconciliation only ever appends. Existing rules are left untouched, and
//! the required entry is written at most once no matter how many times
//! reconciliation runs.

use crate::fs::FileSystem;

use std::{io::ErrorKind, path::PathBuf, sync::Arc};
use tracing::{debug, info, instrument};

/// Name of ignore file at top-level of vault.
pub const IGNORE_FILE: &str = ".gitignore";

/// Keep an entry present in the vault's ignore file.
#[derive(Clone)]
pub struct ExclusionList {
    fs: Arc<dyn FileSystem>,
    ignore_path: PathBuf,
}

impl ExclusionList {
    /// Construct new exclusion list over the ignore file of a vault.
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self {
            fs,
            ignore_path: PathBuf::from(IGNORE_FILE),
        }
    }

    /// Ensure that target entry is excluded.
    ///
    /// Creates the ignore file containing only the entry if the file is
    /// missing. Appends the entry if no line of the file matches it, adding a
    /// newline first when the file does not already end with one.
    ///
    /// # Errors
    ///
    /// - Return [`ExcludeError::Read`] if ignore file exists but cannot be
    ///   read.
    /// - Return [`ExcludeError::Write`] if ignore file cannot be written to.
    #[instrument(skip(self), level = "debug")]
    pub fn ensure_excluded(&self, entry: &str) -> Result<Exclusion> {
        let content = match self.fs.read(&self.ignore_path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!("create {:?} excluding {entry:?}", self.ignore_path.display());
                self.write(format!("{entry}\n"))?;
                return Ok(Exclusion::Created);
            }
            Err(err) => {
                return Err(ExcludeError::Read {
                    source: err,
                    ignore_path: self.ignore_path.clone(),
                })
            }
        };

        if is_listed(&content, entry) {
            debug!("{entry:?} already excluded");
            return Ok(Exclusion::Unchanged);
        }

        info!("append {entry:?} to {:?}", self.ignore_path.display());
        let mut content = content;
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        content.push_str(entry);
        content.push('\n');
        self.write(content)?;

        Ok(Exclusion::Appended)
    }

    fn write(&self, content: String) -> Result<()> {
        self.fs
            .write(&self.ignore_path, &content)
            .map_err(|err| ExcludeError::Write {
                source: err,
                ignore_path: self.ignore_path.clone(),
            })
    }
}

fn is_listed(content: &str, entry: &str) -> bool {
    let entry = entry.trim();
    content.lines().any(|line| line.trim() == entry)
}

/// What reconciliation did to the ignore file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exclusion {
    /// Ignore file did not exist, and was created.
    Created,

    /// Entry was appended to existing ignore file.
    Appended,

    /// Entry was already present.
    Unchanged,
}

impl Exclusion {
    /// Check if ignore file was written to.
    pub fn is_modified(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// Ignore file reconciliation error types.
#[derive(Debug, thiserror::Error)]
pub enum ExcludeError {
    /// Ignore file exists but cannot be read from.
    #[error("failed to read from ignore file at {:?}", ignore_path.display())]
    Read {
        #[source]
        source: std::io::Error,
        ignore_path: PathBuf,
    },

    /// Ignore file cannot be written to.
    #[error("failed to write to ignore file at {:?}", ignore_path.display())]
    Write {
        #[source]
        source: std::io::Error,
        ignore_path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = ExcludeError> = std::result::Result<T, E>;
