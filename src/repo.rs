// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Repository state machine.
//!
//! A vault is either uninitialized or initialized. Setup moves it from the
//! former to the latter exactly once per session. There is no way back.
//!
//! The remote is always re-applied from the current settings, even when the
//! repository already existed, so that changing the remote URL in the settings
//! takes effect without touching the repository by hand.

use crate::vcs::{Result, VersionControl};

use tracing::{debug, info, instrument};

/// Initialization state of a vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoState {
    Uninitialized,
    Initialized,
}

impl RepoState {
    /// Detect current state through version control backend.
    pub fn detect(vcs: &impl VersionControl) -> Self {
        if vcs.is_initialized() {
            Self::Initialized
        } else {
            Self::Uninitialized
        }
    }
}

/// Transition that reconciliation took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Repository was created, and remote attached.
    Initialized,

    /// Repository already existed, and remote was re-applied.
    Reconciled,
}

/// Remote a vault must point at.
#[derive(Debug, Clone, Copy)]
pub struct RemoteSpec<'a> {
    pub name: &'a str,
    pub url: &'a str,
    pub branch: &'a str,
}

/// Bring repository into initialized state pointing at target remote.
///
/// # Errors
///
/// - Return [`VcsError`](crate::vcs::VcsError) if backend fails to initialize
///   the repository or to set the remote.
#[instrument(skip(vcs, remote), fields(remote_name = remote.name), level = "debug")]
pub fn reconcile(vcs: &impl VersionControl, remote: RemoteSpec<'_>) -> Result<Transition> {
    let transition = match RepoState::detect(vcs) {
        RepoState::Uninitialized => {
            info!("no repository found, initializing on branch {:?}", remote.branch);
            vcs.initialize(remote.branch)?;
            Transition::Initialized
        }
        RepoState::Initialized => {
            debug!("repository found");
            Transition::Reconciled
        }
    };
    vcs.set_remote(remote.name, remote.url)?;

    Ok(transition)
}
