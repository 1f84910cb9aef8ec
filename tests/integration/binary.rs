// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{block_on, RecordingHost, RepoFixture};

use vaultsync::{
    config::{SyncConfig, VaultPath},
    fs::LocalFs,
    status::StatusSignal,
    vcs::{GitBinary, VersionControl},
    Outcome, SyncManager,
};

use anyhow::{anyhow, Result};
use pretty_assertions::assert_eq;
use sealed_test::prelude::*;
use std::{
    fs::{create_dir_all, read_to_string, write},
    path::Path,
    sync::Arc,
};

fn backend(vault: &Path) -> GitBinary {
    GitBinary::new(vault, Arc::new(LocalFs::new(vault)))
}

#[sealed_test(env = [
    ("GIT_AUTHOR_NAME", "John Doe"),
    ("GIT_AUTHOR_EMAIL", "john@doe.com"),
    ("GIT_COMMITTER_NAME", "John Doe"),
    ("GIT_COMMITTER_EMAIL", "john@doe.com"),
])]
fn round_trip_through_git_binary() -> Result<()> {
    let vault = std::env::current_dir()?.join("vault");
    if !backend(&vault).probe_available() {
        eprintln!("git executable not found, skipping");
        return Ok(());
    }

    let remote = RepoFixture::remote("remote.git")?;
    let device = RepoFixture::device("device")?;
    device.stage_and_commit("welcome.md", "hello from phone\n")?;
    device.push_to(&remote)?;

    create_dir_all(vault.join(".obsidian"))?;
    write(vault.join(".obsidian/app.json"), "{}")?;
    let host = Arc::new(RecordingHost::default());
    let config = SyncConfig {
        vault: VaultPath::new(&vault),
        remote_url: remote.url(),
        ..Default::default()
    };

    block_on(async {
        let fs = Arc::new(LocalFs::new(&vault));
        let manager = SyncManager::setup(config, backend(&vault), fs, host.clone())
            .await?
            .ready()
            .ok_or_else(|| anyhow!("setup halted"))?;

        assert_eq!(manager.pull().await, Outcome::Completed);
        assert_eq!(host.last_signal(), Some(StatusSignal::dirty(1)));

        write(vault.join("inbox.md"), "idea\n")?;
        manager.on_file_change().await;
        assert_eq!(host.last_signal(), Some(StatusSignal::dirty(2)));

        assert_eq!(manager.push().await, Outcome::Completed);
        anyhow::Ok(())
    })?;

    assert_eq!(read_to_string(vault.join("welcome.md"))?, "hello from phone\n");
    assert_eq!(remote.read_file("inbox.md")?.as_deref(), Some("idea\n"));
    assert_eq!(remote.read_file(".obsidian/app.json")?, None);
    assert_eq!(remote.commit_count()?, 2);
    assert_eq!(host.last_signal(), Some(StatusSignal::clean()));

    Ok(())
}
