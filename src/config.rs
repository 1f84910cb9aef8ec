// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the vaultsync configuration file to simplify the
//! process of serialization and deserialization. File I/O is left to the
//! caller to figure out.

use crate::vcs::redact;

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Debug, Display, Error as FmtError, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    str::FromStr,
};

/// Default branch to push to and pull from.
pub const DEFAULT_BRANCH: &str = "main";

/// Default name of the remote that gets reconciled at setup.
pub const DEFAULT_REMOTE: &str = "origin";

/// Default entry that must be excluded from version tracking.
///
/// The host application keeps its private settings in this directory.
pub const DEFAULT_EXCLUDE: &str = ".obsidian/";

/// Synchronization settings.
///
/// Loaded once at startup from the settings store, and re-read whenever the
/// settings change. Push and pull are only possible when the configuration is
/// [complete](SyncConfig::is_complete).
#[derive(Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Root of the vault, i.e., the working tree of the repository.
    pub vault: VaultPath,

    /// URL of remote to push to and pull from.
    pub remote_url: String,

    /// Branch to push to and pull from.
    pub branch_name: String,

    /// Name of remote to reconcile with `remote_url`.
    pub remote_name: String,

    /// Version control backend to drive.
    pub backend: Backend,

    /// Credential handed to push and pull, never logged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub personal_access_token: Option<String>,

    /// Entry to keep in the ignore file.
    pub exclude: String,
}

impl SyncConfig {
    /// Check that remote URL and branch name are both set.
    pub fn is_complete(&self) -> bool {
        !self.remote_url.trim().is_empty() && !self.branch_name.trim().is_empty()
    }

    /// Credential to use for network operations, if any.
    ///
    /// Blank tokens are treated as absent.
    pub fn credential(&self) -> Option<&str> {
        self.personal_access_token
            .as_deref()
            .filter(|token| !token.trim().is_empty())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            vault: VaultPath::default(),
            remote_url: String::new(),
            branch_name: DEFAULT_BRANCH.into(),
            remote_name: DEFAULT_REMOTE.into(),
            backend: Backend::default(),
            personal_access_token: None,
            exclude: DEFAULT_EXCLUDE.into(),
        }
    }
}

impl Debug for SyncConfig {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.debug_struct("SyncConfig")
            .field("vault", &self.vault)
            .field("remote_url", &redact(&self.remote_url, self.credential()))
            .field("branch_name", &self.branch_name)
            .field("remote_name", &self.remote_name)
            .field("backend", &self.backend)
            .field(
                "personal_access_token",
                &self.personal_access_token.as_ref().map(|_| "***"),
            )
            .field("exclude", &self.exclude)
            .finish()
    }
}

impl FromStr for SyncConfig {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut config: SyncConfig = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on vault field.
        config.vault = VaultPath::new(
            shellexpand::full(config.vault.to_string().as_str())
                .map_err(ConfigError::ShellExpansion)?
                .into_owned(),
        );

        Ok(config)
    }
}

impl Display for SyncConfig {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Version control backend selection.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Invoke the external `git` executable for every operation.
    #[default]
    Binary,

    /// Drive libgit2 in-process.
    Embedded,
}

/// Path acting as the root of the vault.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct VaultPath(PathBuf);

impl VaultPath {
    /// Construct new vault path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    /// Check if no vault path was given.
    pub fn is_unset(&self) -> bool {
        self.0.as_os_str().is_empty()
    }

    /// Treat vault path as [`Path`] slice.
    pub fn as_path(&self) -> &Path {
        self.0.as_path()
    }
}

impl Display for VaultPath {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.as_path().to_string_lossy().as_ref())
    }
}

/// Configuration error types.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}
