// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Host interface.
//!
//! Vaultsync runs inside some host shell that owns the user interface: a note
//! taking application, a terminal, a test harness. The orchestrator only ever
//! talks to that shell through the narrow [`Host`] trait.

use crate::status::StatusSignal;

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    time::Duration,
};

/// Default time a notice stays visible.
pub const NOTICE_DURATION: Duration = Duration::from_millis(5000);

/// User interface capabilities the orchestrator needs from its host.
pub trait Host: Send + Sync + 'static {
    /// Make command available to the user.
    fn register_command(&self, command: SyncCommand);

    /// Show transient message to the user.
    fn show_notice(&self, text: &str, duration: Duration);

    /// Display status signal.
    fn render_status(&self, signal: &StatusSignal);
}

/// Commands exposed to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncCommand {
    Push,
    Pull,
}

impl SyncCommand {
    /// All commands, in registration order.
    pub const ALL: [SyncCommand; 2] = [SyncCommand::Push, SyncCommand::Pull];

    /// Identifier that stays stable across sessions.
    pub fn id(&self) -> &'static str {
        match self {
            Self::Push => "vaultsync-push",
            Self::Pull => "vaultsync-pull",
        }
    }

    /// Human readable name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Push => "Push vault to remote",
            Self::Pull => "Pull vault from remote",
        }
    }
}

/// User facing messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    SettingsIncomplete,
    Unavailable,
    RepositoryInitialized,
    IgnoreFileConfigured,
    PushFailed(String),
    PullFailed(String),
}

impl Notice {
    /// Show notice through target host.
    pub fn show(&self, host: &dyn Host) {
        host.show_notice(&self.to_string(), NOTICE_DURATION);
    }
}

impl Display for Notice {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::SettingsIncomplete => {
                fmt.write_str("Vault sync: set a remote URL and branch name to enable syncing")
            }
            Self::Unavailable => {
                fmt.write_str("Vault sync: git is not available, syncing is disabled")
            }
            Self::RepositoryInitialized => fmt.write_str("Vault sync: initialized repository"),
            Self::IgnoreFileConfigured => fmt.write_str("Vault sync: configured .gitignore"),
            Self::PushFailed(reason) => write!(fmt, "Vault sync push error: {reason}"),
            Self::PullFailed(reason) => write!(fmt, "Vault sync pull error: {reason}"),
        }
    }
}
