// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Vault change detection.
//!
//! Hosts that cannot deliver file events themselves poll the vault instead.
//! Each poll walks the working tree, and reduces it to a [`Fingerprint`] of
//! paths, sizes, and modification times. Any difference between two
//! consecutive fingerprints counts as a file change.
//!
//! The walk honors the ignore file of the vault, and always skips the
//! repository metadata directory, so that a status query or a commit never
//! looks like a change to the vault itself.

use ignore::WalkBuilder;
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::SystemTime,
};
use tracing::{debug, instrument};

/// Name of repository metadata directory.
const METADATA_DIR: &str = ".git";

/// Snapshot of every visible file in a vault.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Fingerprint(BTreeMap<PathBuf, (u64, Option<SystemTime>)>);

impl Fingerprint {
    /// Walk vault at root to produce its fingerprint.
    ///
    /// Entries that vanish or cannot be read mid-walk are skipped.
    #[instrument(level = "debug")]
    pub fn scan(root: &Path) -> Self {
        let walker = WalkBuilder::new(root)
            .hidden(false)
            .require_git(false)
            .filter_entry(|entry| entry.file_name() != METADATA_DIR)
            .build();

        let mut files = BTreeMap::new();
        for entry in walker.flatten() {
            if !entry.file_type().is_some_and(|kind| kind.is_file()) {
                continue;
            }

            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            let path = entry
                .path()
                .strip_prefix(root)
                .unwrap_or(entry.path())
                .to_path_buf();
            files.insert(path, (metadata.len(), metadata.modified().ok()));
        }
        debug!("fingerprinted {} files", files.len());

        Self(files)
    }
}

/// Detect changes of a vault between polls.
#[derive(Debug)]
pub struct VaultWatcher {
    root: PathBuf,
    last: Fingerprint,
}

impl VaultWatcher {
    /// Construct new watcher, taking the current state of the vault as baseline.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let last = Fingerprint::scan(&root);
        Self { root, last }
    }

    /// Check if the vault changed since the previous poll.
    pub fn poll(&mut self) -> bool {
        let current = Fingerprint::scan(&self.root);
        if current == self.last {
            return false;
        }

        self.last = current;
        true
    }
}
