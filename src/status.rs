// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Status signal.
//!
//! The state of a vault is boiled down to a short label and one of three
//! colors for the host to display. Only the orchestrator produces signals,
//! the host only ever renders them.

use crate::vcs::WorkingTreeStatus;

use std::fmt::{Display, Formatter, Result as FmtResult};

/// Color of status indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusColor {
    Green,
    Yellow,
    Red,
}

impl Display for StatusColor {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            Self::Green => "green",
            Self::Yellow => "yellow",
            Self::Red => "red",
        };
        fmt.write_str(name)
    }
}

/// Network operation that keeps the vault busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusyAction {
    Pushing,
    Pulling,
}

/// Reason why synchronization is switched off for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InactiveReason {
    /// Remote URL or branch name is missing.
    NotConfigured,

    /// Version control backend cannot run.
    Unavailable,
}

/// What the vault is up to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    /// Working tree has no uncommitted changes.
    Clean,

    /// Network operation is in flight.
    Busy(BusyAction),

    /// Working tree has this many uncommitted changes.
    Dirty(usize),

    /// Setup halted, so no operation will ever run.
    Inactive(InactiveReason),

    /// Working tree could not be queried.
    Unknown,
}

/// Label and color to display for the vault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSignal {
    pub kind: StatusKind,
    pub label: String,
}

impl StatusSignal {
    /// Signal for a clean working tree.
    pub fn clean() -> Self {
        Self {
            kind: StatusKind::Clean,
            label: "No Uncommitted Changes".into(),
        }
    }

    /// Signal for an in-flight network operation.
    pub fn busy(action: BusyAction) -> Self {
        let label = match action {
            BusyAction::Pushing => "Pushing changes...",
            BusyAction::Pulling => "Pulling changes...",
        };
        Self {
            kind: StatusKind::Busy(action),
            label: label.into(),
        }
    }

    /// Signal for a working tree with uncommitted changes.
    pub fn dirty(count: usize) -> Self {
        let plural = if count == 1 { "" } else { "s" };
        Self {
            kind: StatusKind::Dirty(count),
            label: format!("{count} Uncommitted Change{plural}"),
        }
    }

    /// Signal for a session where setup halted.
    pub fn inactive(reason: InactiveReason) -> Self {
        let label = match reason {
            InactiveReason::NotConfigured => "Sync Not Configured",
            InactiveReason::Unavailable => "Git Unavailable",
        };
        Self {
            kind: StatusKind::Inactive(reason),
            label: label.into(),
        }
    }

    /// Signal for a working tree that could not be queried.
    pub fn unknown() -> Self {
        Self {
            kind: StatusKind::Unknown,
            label: "Status Unknown".into(),
        }
    }

    /// Color to display signal with.
    pub fn color(&self) -> StatusColor {
        match self.kind {
            StatusKind::Clean => StatusColor::Green,
            StatusKind::Busy(_) => StatusColor::Yellow,
            StatusKind::Dirty(_) | StatusKind::Inactive(_) | StatusKind::Unknown => {
                StatusColor::Red
            }
        }
    }

    /// Check if signal reflects a settled state of the working tree.
    pub fn is_terminal(&self) -> bool {
        !matches!(self.kind, StatusKind::Busy(_))
    }
}

impl Display for StatusSignal {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(&self.label)
    }
}

/// Reduce working tree listing into status signal.
pub fn reduce(status: &WorkingTreeStatus) -> StatusSignal {
    match status.len() {
        0 => StatusSignal::clean(),
        count => StatusSignal::dirty(count),
    }
}
