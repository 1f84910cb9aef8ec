// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Keep a notes vault in sync with a remote Git repository.
//!
//! A __vault__ is a directory of notes owned by some host application. The
//! vault doubles as the working tree of a Git repository that vaultsync sets
//! up, keeps pointed at the configured remote, and pushes to or pulls from on
//! demand. Between operations, the number of uncommitted changes is reported
//! to the host as a small status signal.
//!
//! The [`sync::SyncManager`] drives everything. It talks to version control
//! through [`vcs::VersionControl`], to the vault through [`fs::FileSystem`],
//! and to the user through [`host::Host`].

pub mod config;
pub mod exclude;
pub mod fs;
pub mod host;
pub mod path;
pub mod repo;
pub mod status;
pub mod sync;
pub mod vcs;
pub mod watch;

pub use config::SyncConfig;
pub use sync::{Outcome, Setup, SyncError, SyncManager};
