// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Sync orchestration.
//!
//! The [`SyncManager`] owns the repository of a vault for the whole session.
//! It runs setup once, exposes push and pull to the host, keeps the status
//! signal current, and keeps every failure of a command inside that command.
//!
//! # Serialization
//!
//! Interleaving staging, committing, and pushing against the same working
//! tree would corrupt commit semantics. Thus, every operation that touches the
//! repository first takes the command gate. The gate is a fair mutex, so
//! commands fired back-to-back queue up and run in order.
//!
//! File change notifications can arrive in bursts. They never queue up more
//! than one status query. While a query is in flight, further notifications
//! only mark the status as stale, which leads to exactly one trailing query.
//!
//! # Failure Containment
//!
//! Only setup can fail with an error. Push and pull surface their failures as
//! notices, and always finish by recomputing the status, so the host is never
//! left displaying a busy signal.

use crate::{
    config::SyncConfig,
    exclude::{ExcludeError, ExclusionList},
    fs::FileSystem,
    host::{Host, Notice, SyncCommand},
    repo::{reconcile, RemoteSpec, Transition},
    status::{self, BusyAction, InactiveReason, StatusSignal},
    vcs::{redact, VcsError, VersionControl},
};

use chrono::Local;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use tokio::{sync::Mutex as AsyncMutex, task};
use tracing::{debug, info, instrument, warn};

/// Label that prefixes every commit made by a push.
pub const COMMIT_LABEL: &str = "Vault sync";

/// Result of setting up a vault.
pub enum Setup<V>
where
    V: VersionControl,
{
    /// Vault is ready, and commands are registered.
    Ready(SyncManager<V>),

    /// Setup stopped before registering any command.
    Halted(InactiveReason),
}

impl<V> Setup<V>
where
    V: VersionControl,
{
    /// Take sync manager if setup finished.
    pub fn ready(self) -> Option<SyncManager<V>> {
        match self {
            Self::Ready(manager) => Some(manager),
            Self::Halted(_) => None,
        }
    }
}

/// How a command ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Every step went through.
    Completed,

    /// Configuration is incomplete, so nothing was attempted.
    NotConfigured,

    /// A step failed, and was reported to the user.
    Failed(String),
}

impl Outcome {
    /// Check if command went through.
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Orchestrate synchronization of a vault.
pub struct SyncManager<V>
where
    V: VersionControl,
{
    repo: Arc<Mutex<V>>,
    exclusions: ExclusionList,
    host: Arc<dyn Host>,
    gate: AsyncMutex<SyncConfig>,
    refresh: RefreshState,
}

impl<V> SyncManager<V>
where
    V: VersionControl,
{
    /// Set up vault for synchronization.
    ///
    /// Checks configuration and backend availability, brings the repository
    /// into initialized state with the configured remote, makes sure the
    /// configured entry is excluded, computes the initial status, and finally
    /// registers the sync commands with the host.
    ///
    /// Incomplete configuration or an unavailable backend halt setup before
    /// any command gets registered. The host is notified once, and shown an
    /// inactive status signal.
    ///
    /// # Errors
    ///
    /// - Return [`SyncError::Vcs`] if repository cannot be initialized, or
    ///   remote cannot be set.
    /// - Return [`SyncError::Exclude`] if ignore file cannot be read or
    ///   written for any reason other than not existing yet.
    #[instrument(skip_all, level = "debug")]
    pub async fn setup(
        config: SyncConfig,
        vcs: V,
        fs: Arc<dyn FileSystem>,
        host: Arc<dyn Host>,
    ) -> Result<Setup<V>> {
        if !config.is_complete() {
            warn!("remote url or branch name missing, sync disabled");
            return Ok(halt(&*host, InactiveReason::NotConfigured));
        }

        let (vcs, available) = task::spawn_blocking(move || {
            let available = vcs.probe_available();
            (vcs, available)
        })
        .await?;
        if !available {
            warn!("version control backend unavailable, sync disabled");
            return Ok(halt(&*host, InactiveReason::Unavailable));
        }

        let manager = Self {
            repo: Arc::new(Mutex::new(vcs)),
            exclusions: ExclusionList::new(fs),
            host,
            gate: AsyncMutex::new(config),
            refresh: RefreshState::default(),
        };

        {
            let config = manager.gate.lock().await;
            if manager.reconcile_remote(&config).await? == Transition::Initialized {
                Notice::RepositoryInitialized.show(&*manager.host);
            }

            manager.apply_exclusion(&config).await?;
            manager.recompute_status().await;
        }

        for command in SyncCommand::ALL {
            debug!("register command {:?}", command.id());
            manager.host.register_command(command);
        }
        info!("vault ready for sync");

        Ok(Setup::Ready(manager))
    }

    /// Run a registered command.
    pub async fn run(&self, command: SyncCommand) -> Outcome {
        match command {
            SyncCommand::Push => self.push().await,
            SyncCommand::Pull => self.pull().await,
        }
    }

    /// Stage and commit everything, then push to configured remote.
    ///
    /// A commit without staged changes does not stop the push. Failures are
    /// shown to the user, never returned as errors.
    #[instrument(skip(self), level = "debug")]
    pub async fn push(&self) -> Outcome {
        let config = self.gate.lock().await;
        if !config.is_complete() {
            return self.not_configured();
        }

        self.host.render_status(&StatusSignal::busy(BusyAction::Pushing));
        let outcome = match self.push_sequence(&config).await {
            Ok(()) => {
                info!("pushed to {}/{}", config.remote_name, config.branch_name);
                Outcome::Completed
            }
            Err(error) => {
                let reason = redact(&error.to_string(), config.credential());
                warn!("push failed: {reason}");
                Notice::PushFailed(reason.clone()).show(&*self.host);
                Outcome::Failed(reason)
            }
        };
        self.recompute_status().await;

        outcome
    }

    /// Pull configured branch from configured remote.
    ///
    /// Failures are shown to the user, never returned as errors.
    #[instrument(skip(self), level = "debug")]
    pub async fn pull(&self) -> Outcome {
        let config = self.gate.lock().await;
        if !config.is_complete() {
            return self.not_configured();
        }

        self.host.render_status(&StatusSignal::busy(BusyAction::Pulling));
        let remote = config.remote_name.clone();
        let branch = config.branch_name.clone();
        let credential = config.credential().map(str::to_owned);
        let result = self
            .with_repo(move |vcs| vcs.pull(&remote, &branch, credential.as_deref()))
            .await;

        let outcome = match result {
            Ok(()) => {
                info!("pulled from {}/{}", config.remote_name, config.branch_name);
                Outcome::Completed
            }
            Err(error) => {
                let reason = redact(&error.to_string(), config.credential());
                warn!("pull failed: {reason}");
                Notice::PullFailed(reason.clone()).show(&*self.host);
                Outcome::Failed(reason)
            }
        };
        self.recompute_status().await;

        outcome
    }

    /// React to a file being created, modified, or deleted in the vault.
    ///
    /// Only ever queries status. Bursts of notifications coalesce into at most
    /// one in-flight query, plus one trailing query.
    pub async fn on_file_change(&self) {
        let refresh = &self.refresh;
        refresh.stale.store(true, Ordering::SeqCst);
        if refresh.in_flight.swap(true, Ordering::SeqCst) {
            debug!("status query in flight, coalescing");
            return;
        }

        loop {
            let claim = InFlight(&refresh.in_flight);
            refresh.stale.store(false, Ordering::SeqCst);
            {
                let config = self.gate.lock().await;
                if config.is_complete() {
                    self.recompute_status().await;
                } else {
                    // INVARIANT: Keep inactive signal until settings are complete.
                    self.host
                        .render_status(&StatusSignal::inactive(InactiveReason::NotConfigured));
                }
            }
            drop(claim);

            // INVARIANT: Only run again if marked stale while querying, and
            // nobody else picked that up already.
            if !refresh.stale.load(Ordering::SeqCst)
                || refresh.in_flight.swap(true, Ordering::SeqCst)
            {
                break;
            }
        }
    }

    /// Apply changed settings.
    ///
    /// Re-applies the remote so it always matches current settings, then
    /// recomputes status. Repository metadata is not checked again, since it
    /// already exists once setup finished. A changed exclusion entry is added
    /// to the ignore file right away. Incomplete settings switch the vault to
    /// the inactive status until complete settings arrive.
    ///
    /// # Errors
    ///
    /// - Return [`SyncError::Vcs`] if remote cannot be set.
    /// - Return [`SyncError::Exclude`] if ignore file cannot be updated.
    #[instrument(skip_all, level = "debug")]
    pub async fn reconfigure(&self, new_config: SyncConfig) -> Result<()> {
        let mut config = self.gate.lock().await;
        if new_config.vault != config.vault {
            warn!("vault path changes only take effect after restart");
        }
        if new_config.backend != config.backend {
            warn!("backend changes only take effect after restart");
        }
        let exclude_changed = new_config.exclude != config.exclude;
        *config = new_config;

        if exclude_changed {
            self.apply_exclusion(&config).await?;
        }

        if !config.is_complete() {
            self.not_configured();
            return Ok(());
        }

        let name = config.remote_name.clone();
        let url = config.remote_url.clone();
        self.with_repo(move |vcs| vcs.set_remote(&name, &url)).await?;
        self.recompute_status().await;

        Ok(())
    }

    /// Release repository once all queued commands are done.
    pub async fn shutdown(self) {
        {
            let _config = self.gate.lock().await;
        }
        info!("release vault repository");
    }

    async fn push_sequence(&self, config: &SyncConfig) -> Result<()> {
        self.with_repo(|vcs| vcs.stage_all()).await?;

        let message = commit_message();
        match self.with_repo(move |vcs| vcs.commit(&message)).await {
            Err(SyncError::Vcs(VcsError::NothingToCommit)) => {
                debug!("nothing to commit, pushing anyway")
            }
            result => result?,
        }

        let remote = config.remote_name.clone();
        let branch = config.branch_name.clone();
        let credential = config.credential().map(str::to_owned);
        self.with_repo(move |vcs| vcs.push(&remote, &branch, credential.as_deref()))
            .await
    }

    async fn reconcile_remote(&self, config: &SyncConfig) -> Result<Transition> {
        let name = config.remote_name.clone();
        let url = config.remote_url.clone();
        let branch = config.branch_name.clone();
        self.with_repo(move |vcs| {
            reconcile(
                vcs,
                RemoteSpec {
                    name: &name,
                    url: &url,
                    branch: &branch,
                },
            )
        })
        .await
    }

    /// Make sure configured entry is listed in the ignore file.
    ///
    /// Caller must hold the command gate.
    async fn apply_exclusion(&self, config: &SyncConfig) -> Result<()> {
        let exclusions = self.exclusions.clone();
        let entry = config.exclude.clone();
        let exclusion = task::spawn_blocking(move || exclusions.ensure_excluded(&entry)).await??;
        if exclusion.is_modified() {
            Notice::IgnoreFileConfigured.show(&*self.host);
        }

        Ok(())
    }

    /// Query working tree, and render resulting signal.
    ///
    /// Caller must hold the command gate.
    async fn recompute_status(&self) {
        let signal = match self.with_repo(|vcs| vcs.status_list()).await {
            Ok(status) => status::reduce(&status),
            Err(error) => {
                warn!("cannot query working tree status: {error}");
                StatusSignal::unknown()
            }
        };
        debug!("status: {signal}");
        self.host.render_status(&signal);
    }

    fn not_configured(&self) -> Outcome {
        warn!("remote url or branch name missing");
        Notice::SettingsIncomplete.show(&*self.host);
        self.host
            .render_status(&StatusSignal::inactive(InactiveReason::NotConfigured));
        Outcome::NotConfigured
    }

    /// Run version control operation on blocking thread pool.
    async fn with_repo<T, F>(&self, operation: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&V) -> crate::vcs::Result<T> + Send + 'static,
    {
        let repo = Arc::clone(&self.repo);
        task::spawn_blocking(move || {
            let vcs = repo.lock().map_err(|_| SyncError::Poisoned)?;
            operation(&*vcs).map_err(SyncError::from)
        })
        .await?
    }
}

fn halt<V>(host: &dyn Host, reason: InactiveReason) -> Setup<V>
where
    V: VersionControl,
{
    let notice = match reason {
        InactiveReason::NotConfigured => Notice::SettingsIncomplete,
        InactiveReason::Unavailable => Notice::Unavailable,
    };
    notice.show(host);
    host.render_status(&StatusSignal::inactive(reason));

    Setup::Halted(reason)
}

fn commit_message() -> String {
    format!(
        "{COMMIT_LABEL} - {}",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    )
}

#[derive(Debug, Default)]
struct RefreshState {
    in_flight: AtomicBool,
    stale: AtomicBool,
}

/// Releases the in-flight claim even if the owning future gets dropped.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Sync orchestration error types.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Version control operation fails.
    #[error(transparent)]
    Vcs(#[from] VcsError),

    /// Ignore file reconciliation fails.
    #[error(transparent)]
    Exclude(#[from] ExcludeError),

    /// Blocking version control task panicked or was cancelled.
    #[error(transparent)]
    Join(#[from] task::JoinError),

    /// A previous version control operation panicked while holding the repository.
    #[error("repository handle poisoned by earlier panic")]
    Poisoned,
}

/// Friendly result alias :3
pub type Result<T, E = SyncError> = std::result::Result<T, E>;
