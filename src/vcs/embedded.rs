// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Backend over libgit2.
//!
//! Drives the repository in-process through [`git2`]. The repository is
//! reopened for every operation, because the vault can be changed by anything
//! between two operations, including an external `git` process.
//!
//! # Authentication
//!
//! A configured personal access token is answered first whenever libgit2 asks
//! for plaintext credentials. When there is no token, or the token was
//! rejected, authentication falls through to [`GitAuthenticator`], which tries
//! the SSH agent, credential helpers, and finally an interactive prompt when a
//! prompter was given.

use crate::vcs::{ChangeKind, ChangedPath, Result, VcsError, VersionControl, WorkingTreeStatus};

use auth_git2::{GitAuthenticator, Prompter};
use git2::{
    build::CheckoutBuilder, AnnotatedCommit, Cred, CredentialType, FetchOptions, IndexAddOption,
    PushOptions, RemoteCallbacks, Repository, RepositoryInitOptions, Signature, Status,
    StatusOptions,
};
use indicatif::ProgressBar;
use inquire::{Password, Text};
use std::{
    cell::RefCell,
    path::{Path, PathBuf},
    rc::Rc,
};
use tracing::{debug, info, instrument};

/// Version control through libgit2.
#[derive(Debug, Clone)]
pub struct Git2Backend {
    root: PathBuf,
    prompter: Option<IndicatifPrompter>,
}

impl Git2Backend {
    /// Construct new libgit2 backend rooted at the vault.
    ///
    /// Never prompts for credentials.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            prompter: None,
        }
    }

    /// Prompt for missing credentials through target prompter.
    pub fn with_prompter(mut self, prompter: IndicatifPrompter) -> Self {
        self.prompter = Some(prompter);
        self
    }

    fn open(&self) -> Result<Repository> {
        Repository::open(&self.root).map_err(|_| VcsError::NotInitialized {
            root: self.root.clone(),
        })
    }

    fn authenticator(&self) -> GitAuthenticator {
        match &self.prompter {
            Some(prompter) => GitAuthenticator::default().set_prompter(prompter.clone()),
            None => GitAuthenticator::default().try_password_prompt(0),
        }
    }

    fn signature(repository: &Repository) -> Result<Signature<'static>> {
        match repository.signature() {
            Ok(signature) => Ok(signature.to_owned()),
            Err(_) => Ok(Signature::now("vaultsync", "vaultsync@localhost")?),
        }
    }

    /// Run network operation with credential callbacks installed.
    fn with_remote_callbacks<T>(
        &self,
        repository: &Repository,
        credential: Option<&str>,
        operation: impl for<'cb> FnOnce(RemoteCallbacks<'cb>) -> Result<T>,
    ) -> Result<T> {
        let config = repository.config()?;
        let authenticator = self.authenticator();
        let mut fallback = authenticator.credentials(&config);
        let token = credential.map(str::to_owned);
        let mut token_offered = false;

        let mut rc = RemoteCallbacks::new();
        rc.credentials(move |url, username, allowed| {
            // INVARIANT: Offer token only once, otherwise libgit2 retries forever.
            if let Some(token) = token.as_deref() {
                if !token_offered && allowed.contains(CredentialType::USER_PASS_PLAINTEXT) {
                    token_offered = true;
                    return Cred::userpass_plaintext("x-access-token", token);
                }
            }
            fallback(url, username, allowed)
        });

        operation(rc)
    }

    fn fast_forward(
        &self,
        repository: &Repository,
        refname: &str,
        incoming: &AnnotatedCommit,
    ) -> Result<()> {
        let target = repository.find_commit(incoming.id())?;

        // INVARIANT: Update work tree before moving any reference, so HEAD
        // still acts as checkout baseline.
        repository.checkout_tree(target.as_object(), Some(CheckoutBuilder::new().safe()))?;
        match repository.find_reference(refname) {
            Ok(mut reference) => {
                reference.set_target(target.id(), "vaultsync: fast-forward")?;
            }
            Err(_) => {
                repository.reference(refname, target.id(), true, "vaultsync: initial pull")?;
            }
        }
        repository.set_head(refname)?;

        Ok(())
    }

    fn merge(
        &self,
        repository: &Repository,
        remote: &str,
        branch: &str,
        incoming: &AnnotatedCommit,
    ) -> Result<()> {
        let ours = repository.head()?.peel_to_commit()?;
        let theirs = repository.find_commit(incoming.id())?;
        let mut index = repository.merge_commits(&ours, &theirs, None)?;
        if index.has_conflicts() {
            return Err(VcsError::MergeConflict {
                branch: branch.to_string(),
            });
        }

        let tree = repository.find_tree(index.write_tree_to(repository)?)?;
        repository.checkout_tree(tree.as_object(), Some(CheckoutBuilder::new().safe()))?;

        let signature = Self::signature(repository)?;
        repository.commit(
            Some("HEAD"),
            &signature,
            &signature,
            &format!("Merge branch '{branch}' of {remote}"),
            &tree,
            &[&ours, &theirs],
        )?;

        Ok(())
    }
}

impl VersionControl for Git2Backend {
    fn probe_available(&self) -> bool {
        let (major, minor, patch) = git2::Version::get().libgit2_version();
        debug!("libgit2 version {major}.{minor}.{patch}");
        true
    }

    fn is_initialized(&self) -> bool {
        Repository::open(&self.root).is_ok()
    }

    #[instrument(skip(self), level = "debug")]
    fn initialize(&self, default_branch: &str) -> Result<()> {
        info!("initialize repository at {:?}", self.root.display());
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head(default_branch);
        Repository::init_opts(&self.root, &opts)?;

        Ok(())
    }

    #[instrument(skip(self, url), level = "debug")]
    fn set_remote(&self, name: &str, url: &str) -> Result<()> {
        let repository = self.open()?;
        match repository.find_remote(name) {
            Ok(remote) if remote.url() == Some(url) => {
                debug!("remote {name:?} already up to date")
            }
            Ok(_) => {
                info!("update url of remote {name:?}");
                repository.remote_set_url(name, url)?;
            }
            Err(_) => {
                info!("add remote {name:?}");
                repository.remote(name, url)?;
            }
        }

        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    fn stage_all(&self) -> Result<()> {
        let repository = self.open()?;
        let mut index = repository.index()?;

        // INVARIANT: Stage deletions along with new and modified files.
        index.add_all(["*"], IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"], None)?;
        index.write()?;

        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    fn commit(&self, message: &str) -> Result<()> {
        let repository = self.open()?;
        let mut index = repository.index()?;
        let tree_oid = index.write_tree()?;
        let parent = repository
            .head()
            .ok()
            .and_then(|head| head.peel_to_commit().ok());

        let unchanged = match &parent {
            Some(parent) => parent.tree_id() == tree_oid,
            None => index.is_empty(),
        };
        if unchanged {
            return Err(VcsError::NothingToCommit);
        }

        let tree = repository.find_tree(tree_oid)?;
        let signature = Self::signature(&repository)?;
        let parents = parent.iter().collect::<Vec<_>>();
        let oid = repository.commit(
            Some("HEAD"),
            &signature,
            &signature,
            message,
            &tree,
            &parents,
        )?;
        debug!("created commit {oid}");

        Ok(())
    }

    #[instrument(skip(self, credential), level = "debug")]
    fn push(&self, remote: &str, branch: &str, credential: Option<&str>) -> Result<()> {
        let repository = self.open()?;
        let mut target = repository.find_remote(remote)?;
        let refspec = format!("refs/heads/{branch}:refs/heads/{branch}");
        let rejection = Rc::new(RefCell::new(None::<String>));

        self.with_remote_callbacks(&repository, credential, |mut rc| {
            let rejection = Rc::clone(&rejection);
            rc.push_update_reference(move |refname, status| {
                if let Some(status) = status {
                    *rejection.borrow_mut() = Some(format!("{refname} rejected: {status}"));
                }
                Ok(())
            });

            let mut po = PushOptions::new();
            po.remote_callbacks(rc);
            target.push(&[refspec.as_str()], Some(&mut po))?;
            Ok(())
        })?;

        if let Some(message) = rejection.borrow_mut().take() {
            return Err(VcsError::Git2(git2::Error::from_str(&message)));
        }

        Ok(())
    }

    #[instrument(skip(self, credential), level = "debug")]
    fn pull(&self, remote: &str, branch: &str, credential: Option<&str>) -> Result<()> {
        let repository = self.open()?;
        let mut source = repository.find_remote(remote)?;

        self.with_remote_callbacks(&repository, credential, |rc| {
            let mut fo = FetchOptions::new();
            fo.remote_callbacks(rc);
            source.fetch(&[branch], Some(&mut fo), None)?;
            Ok(())
        })?;

        let fetch_head = repository.find_reference("FETCH_HEAD")?;
        let incoming = repository.reference_to_annotated_commit(&fetch_head)?;
        let (analysis, _) = repository.merge_analysis(&[&incoming])?;
        let refname = format!("refs/heads/{branch}");

        if analysis.is_up_to_date() {
            debug!("{branch:?} already up to date");
            Ok(())
        } else if analysis.is_fast_forward() || analysis.is_unborn() {
            info!("fast-forward {branch:?}");
            self.fast_forward(&repository, &refname, &incoming)
        } else {
            info!("merge {remote}/{branch} into {branch:?}");
            self.merge(&repository, remote, branch, &incoming)
        }
    }

    fn status_list(&self) -> Result<WorkingTreeStatus> {
        let repository = self.open()?;
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false)
            .renames_head_to_index(true);

        let statuses = repository.statuses(Some(&mut opts))?;
        let changes = statuses
            .iter()
            .filter(|entry| !entry.status().is_ignored())
            .map(|entry| {
                ChangedPath::new(bytes_to_path(entry.path_bytes()), change_kind(entry.status()))
            })
            .collect();

        Ok(changes)
    }
}

fn change_kind(status: Status) -> ChangeKind {
    if status.intersects(Status::INDEX_RENAMED | Status::WT_RENAMED) {
        ChangeKind::Renamed
    } else if status.intersects(Status::INDEX_DELETED | Status::WT_DELETED) {
        ChangeKind::Deleted
    } else if status.intersects(Status::INDEX_NEW | Status::WT_NEW) {
        ChangeKind::Added
    } else {
        ChangeKind::Modified
    }
}

// Thanks from:
//
// https://github.com/rust-lang/git2-rs/blob/5bc3baa9694a94db2ca9cc256b5bce8a215f9013/
// src/util.rs#L85
#[cfg(unix)]
fn bytes_to_path(bytes: &[u8]) -> PathBuf {
    use std::{ffi::OsStr, os::unix::prelude::*};
    PathBuf::from(OsStr::from_bytes(bytes))
}
#[cfg(windows)]
fn bytes_to_path(bytes: &[u8]) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(bytes).into_owned())
}

/// Git2 authentication prompter for progress bar.
///
/// Suspends the progress bar while asking the user for credentials, so the
/// prompt does not get drawn over.
#[derive(Debug, Clone)]
pub struct IndicatifPrompter {
    pub(crate) bar: ProgressBar,
}

impl IndicatifPrompter {
    /// Construct new progress bar authenticator.
    pub fn new(bar: ProgressBar) -> Self {
        Self { bar }
    }
}

impl Prompter for IndicatifPrompter {
    #[instrument(skip(self, url, _config), level = "debug")]
    fn prompt_username_password(
        &mut self,
        url: &str,
        _config: &git2::Config,
    ) -> Option<(String, String)> {
        info!("authentication required at {url}");
        self.bar.suspend(|| -> Option<(String, String)> {
            let username = Text::new("username").prompt().ok()?;
            let password = Password::new("password")
                .without_confirmation()
                .prompt()
                .ok()?;
            Some((username, password))
        })
    }

    #[instrument(skip(self, username, url, _config), level = "debug")]
    fn prompt_password(
        &mut self,
        username: &str,
        url: &str,
        _config: &git2::Config,
    ) -> Option<String> {
        info!("authentication required at {url} for user {username}");
        self.bar.suspend(|| -> Option<String> {
            Password::new("password")
                .without_confirmation()
                .prompt()
                .ok()
        })
    }

    #[instrument(skip(self, ssh_key_path, _config), level = "debug")]
    fn prompt_ssh_key_passphrase(
        &mut self,
        ssh_key_path: &Path,
        _config: &git2::Config,
    ) -> Option<String> {
        info!(
            "authentication required with ssh key at {}",
            ssh_key_path.display()
        );
        self.bar.suspend(|| -> Option<String> {
            Password::new("passphrase")
                .without_confirmation()
                .prompt()
                .ok()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    fn configure_identity(root: &Path) -> anyhow::Result<()> {
        let repository = Repository::open(root)?;
        let mut config = repository.config()?;
        config.set_str("user.name", "John Doe")?;
        config.set_str("user.email", "john@doe.com")?;

        Ok(())
    }

    #[sealed_test]
    fn initialize_and_reconcile_remote() -> anyhow::Result<()> {
        let root = std::env::current_dir()?;
        let backend = Git2Backend::new(&root);
        assert!(!backend.is_initialized());

        backend.initialize("main")?;
        assert!(backend.is_initialized());

        backend.set_remote("origin", "https://github.com/me/notes.git")?;
        backend.set_remote("origin", "https://github.com/me/notes.git")?;
        backend.set_remote("origin", "https://github.com/me/vault.git")?;

        let repository = Repository::open(&root)?;
        assert_eq!(
            repository.find_remote("origin")?.url(),
            Some("https://github.com/me/vault.git")
        );
        assert_eq!(repository.remotes()?.len(), 1);

        Ok(())
    }

    #[sealed_test]
    fn stage_commit_and_status() -> anyhow::Result<()> {
        let root = std::env::current_dir()?;
        let backend = Git2Backend::new(&root);
        backend.initialize("main")?;
        configure_identity(&root)?;

        assert!(matches!(backend.commit("empty"), Err(VcsError::NothingToCommit)));

        std::fs::write("inbox.md", "# Inbox\n")?;
        std::fs::write("ideas.md", "- vaultsync\n")?;
        let status = backend.status_list()?;
        assert_eq!(status.len(), 2);
        assert!(status.iter().all(|change| change.kind == ChangeKind::Added));

        backend.stage_all()?;
        backend.commit("first")?;
        assert!(backend.status_list()?.is_empty());
        assert!(matches!(backend.commit("again"), Err(VcsError::NothingToCommit)));

        std::fs::remove_file("ideas.md")?;
        std::fs::write("inbox.md", "# Inbox\n\n- call mom\n")?;
        let status = backend.status_list()?;
        let expect = WorkingTreeStatus::new([
            ChangedPath::new("ideas.md", ChangeKind::Deleted),
            ChangedPath::new("inbox.md", ChangeKind::Modified),
        ]);
        assert_eq!(status, expect);

        backend.stage_all()?;
        backend.commit("second")?;
        assert!(backend.status_list()?.is_empty());

        Ok(())
    }

    #[sealed_test]
    fn operations_require_repository() -> anyhow::Result<()> {
        let backend = Git2Backend::new(std::env::current_dir()?);
        assert!(matches!(backend.stage_all(), Err(VcsError::NotInitialized { .. })));

        Ok(())
    }
}
