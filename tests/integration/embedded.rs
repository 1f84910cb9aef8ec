// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{block_on, RecordingHost, RepoFixture};

use vaultsync::{
    config::{Backend, SyncConfig, VaultPath},
    fs::LocalFs,
    host::SyncCommand,
    status::{InactiveReason, StatusSignal},
    vcs::Git2Backend,
    Outcome, Setup, SyncManager,
};

use anyhow::{anyhow, Result};
use pretty_assertions::assert_eq;
use sealed_test::prelude::*;
use std::{
    fs::{create_dir_all, read_to_string, remove_file, write},
    path::{Path, PathBuf},
    sync::Arc,
};

fn config(vault: &Path, remote: &RepoFixture) -> SyncConfig {
    SyncConfig {
        vault: VaultPath::new(vault),
        remote_url: remote.url(),
        backend: Backend::Embedded,
        ..Default::default()
    }
}

async fn setup(config: SyncConfig, host: Arc<RecordingHost>) -> Result<SyncManager<Git2Backend>> {
    let vault = config.vault.as_path().to_path_buf();
    let fs = Arc::new(LocalFs::new(&vault));
    SyncManager::setup(config, Git2Backend::new(&vault), fs, host)
        .await?
        .ready()
        .ok_or_else(|| anyhow!("setup halted"))
}

fn vault_dir() -> Result<PathBuf> {
    let vault = std::env::current_dir()?.join("vault");
    create_dir_all(vault.join(".obsidian"))?;
    Ok(vault)
}

#[sealed_test]
fn setup_prepares_fresh_vault() -> Result<()> {
    let remote = RepoFixture::remote("remote.git")?;
    let vault = vault_dir()?;
    write(vault.join(".obsidian/app.json"), "{}")?;
    write(vault.join("inbox.md"), "idea\n")?;
    let host = Arc::new(RecordingHost::default());

    block_on(setup(config(&vault, &remote), host.clone()))?;

    assert!(vault.join(".git").is_dir());
    assert_eq!(read_to_string(vault.join(".gitignore"))?, ".obsidian/\n");
    assert_eq!(host.commands(), SyncCommand::ALL.to_vec());
    assert_eq!(host.notices().len(), 2);

    // Only inbox.md and the fresh ignore file count, settings are excluded.
    assert_eq!(host.last_signal(), Some(StatusSignal::dirty(2)));

    Ok(())
}

#[sealed_test]
fn setup_without_remote_registers_nothing() -> Result<()> {
    let vault = vault_dir()?;
    let host = Arc::new(RecordingHost::default());
    let config = SyncConfig {
        vault: VaultPath::new(&vault),
        ..Default::default()
    };

    let setup = block_on(SyncManager::setup(
        config,
        Git2Backend::new(&vault),
        Arc::new(LocalFs::new(&vault)),
        host.clone(),
    ))?;

    assert!(matches!(setup, Setup::Halted(InactiveReason::NotConfigured)));
    assert!(host.commands().is_empty());
    assert!(!vault.join(".git").exists());

    Ok(())
}

#[sealed_test]
fn push_sends_vault_to_remote() -> Result<()> {
    let remote = RepoFixture::remote("remote.git")?;
    let vault = vault_dir()?;
    write(vault.join(".obsidian/app.json"), "{}")?;
    write(vault.join("inbox.md"), "idea\n")?;
    let host = Arc::new(RecordingHost::default());

    block_on(async {
        let manager = setup(config(&vault, &remote), host.clone()).await?;
        assert_eq!(manager.push().await, Outcome::Completed);

        // Nothing new to commit, but push still goes through.
        assert_eq!(manager.push().await, Outcome::Completed);
        manager.shutdown().await;
        anyhow::Ok(())
    })?;

    assert_eq!(remote.read_file("inbox.md")?.as_deref(), Some("idea\n"));
    assert_eq!(remote.read_file(".gitignore")?.as_deref(), Some(".obsidian/\n"));
    assert_eq!(remote.read_file(".obsidian/app.json")?, None);
    assert_eq!(remote.commit_count()?, 1);
    assert_eq!(host.last_signal(), Some(StatusSignal::clean()));

    Ok(())
}

#[sealed_test]
fn push_records_deletions() -> Result<()> {
    let remote = RepoFixture::remote("remote.git")?;
    let vault = vault_dir()?;
    write(vault.join("inbox.md"), "idea\n")?;
    write(vault.join("draft.md"), "maybe\n")?;
    let host = Arc::new(RecordingHost::default());

    block_on(async {
        let manager = setup(config(&vault, &remote), host.clone()).await?;
        manager.push().await;

        remove_file(vault.join("draft.md"))?;
        manager.on_file_change().await;
        assert_eq!(host.last_signal(), Some(StatusSignal::dirty(1)));

        assert_eq!(manager.push().await, Outcome::Completed);
        anyhow::Ok(())
    })?;

    assert_eq!(remote.read_file("draft.md")?, None);
    assert_eq!(remote.read_file("inbox.md")?.as_deref(), Some("idea\n"));
    assert_eq!(remote.commit_count()?, 2);

    Ok(())
}

#[sealed_test]
fn pull_brings_in_notes_from_other_device() -> Result<()> {
    let remote = RepoFixture::remote("remote.git")?;
    let device = RepoFixture::device("device")?;
    device.stage_and_commit("welcome.md", "hello from phone\n")?;
    device.push_to(&remote)?;

    let vault = vault_dir()?;
    let host = Arc::new(RecordingHost::default());

    block_on(async {
        let manager = setup(config(&vault, &remote), host.clone()).await?;
        assert_eq!(manager.pull().await, Outcome::Completed);
        anyhow::Ok(())
    })?;

    assert_eq!(read_to_string(vault.join("welcome.md"))?, "hello from phone\n");

    // Only the fresh ignore file is left uncommitted.
    assert_eq!(host.last_signal(), Some(StatusSignal::dirty(1)));

    Ok(())
}

#[sealed_test]
fn pull_merges_diverged_history() -> Result<()> {
    let remote = RepoFixture::remote("remote.git")?;
    let vault = vault_dir()?;
    write(vault.join("inbox.md"), "idea\n")?;
    let host = Arc::new(RecordingHost::default());

    block_on(async {
        let manager = setup(config(&vault, &remote), host.clone()).await?;
        manager.push().await;

        remote.stage_and_commit("phone.md", "written elsewhere\n")?;
        write(vault.join("laptop.md"), "written here\n")?;

        // Remote moved on, so local history cannot be pushed as is.
        assert!(matches!(manager.push().await, Outcome::Failed(_)));
        assert!(host
            .notices()
            .last()
            .is_some_and(|notice| notice.starts_with("Vault sync push error:")));

        assert_eq!(manager.pull().await, Outcome::Completed);
        assert_eq!(manager.push().await, Outcome::Completed);
        anyhow::Ok(())
    })?;

    assert_eq!(read_to_string(vault.join("phone.md"))?, "written elsewhere\n");
    assert_eq!(remote.read_file("laptop.md")?.as_deref(), Some("written here\n"));
    assert_eq!(remote.read_file("inbox.md")?.as_deref(), Some("idea\n"));
    assert_eq!(remote.commit_count()?, 4);
    assert_eq!(host.last_signal(), Some(StatusSignal::clean()));

    Ok(())
}

#[sealed_test]
fn reconfigure_points_vault_at_new_remote() -> Result<()> {
    let first = RepoFixture::remote("first.git")?;
    let second = RepoFixture::remote("second.git")?;
    let vault = vault_dir()?;
    write(vault.join("inbox.md"), "idea\n")?;
    let host = Arc::new(RecordingHost::default());

    block_on(async {
        let manager = setup(config(&vault, &first), host.clone()).await?;
        manager.reconfigure(config(&vault, &second)).await?;
        assert_eq!(manager.push().await, Outcome::Completed);
        anyhow::Ok(())
    })?;

    assert_eq!(first.commit_count()?, 0);
    assert_eq!(second.read_file("inbox.md")?.as_deref(), Some("idea\n"));

    Ok(())
}
