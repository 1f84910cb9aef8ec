// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Backend over the external `git` executable.
//!
//! Every operation spawns a fresh `git` process with the vault as its working
//! directory. Interactive credential prompts are disabled, so a process that
//! needs credentials it was not given fails instead of hanging.

use crate::{
    fs::FileSystem,
    vcs::{redact, ChangeKind, ChangedPath, Result, VcsError, VersionControl, WorkingTreeStatus},
};

use std::{
    ffi::{OsStr, OsString},
    path::{Path, PathBuf},
    process::{Command, Output, Stdio},
    sync::Arc,
};
use tracing::{debug, info, instrument};

/// Version control through the `git` binary.
#[derive(Clone)]
pub struct GitBinary {
    program: OsString,
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl GitBinary {
    /// Construct new `git` binary backend rooted at the vault.
    pub fn new(root: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            program: "git".into(),
            root: root.into(),
            fs,
        }
    }

    /// Use a different executable than `git` found through `PATH`.
    pub fn with_program(mut self, program: impl Into<OsString>) -> Self {
        self.program = program.into();
        self
    }

    fn command(&self, args: &[&OsStr]) -> Command {
        let mut command = Command::new(&self.program);
        command
            .current_dir(&self.root)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .args(args);
        command
    }

    fn output(&self, args: &[&OsStr]) -> Result<Output> {
        Ok(self.command(args).output()?)
    }

    /// Run `git` with target arguments, returning its standard output.
    fn gitcall(&self, args: &[&str], credential: Option<&str>) -> Result<String> {
        let args = args.iter().map(OsStr::new).collect::<Vec<_>>();
        let output = self.output(&args)?;

        if !output.status.success() {
            let message = chomp(render_output(&output));
            let command = args
                .iter()
                .map(|arg| arg.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ");
            return Err(VcsError::Command {
                command: redact(&format!("git {command}"), credential),
                message: redact(&message, credential),
            });
        }

        Ok(chomp(String::from_utf8_lossy(&output.stdout).into_owned()))
    }

    fn remote_url(&self, remote: &str) -> Option<String> {
        self.gitcall(&["remote", "get-url", remote], None)
            .ok()
            .map(|url| url.trim().to_string())
    }

    /// Determine what to hand `git` as the push or pull target.
    ///
    /// Credentials can only be injected into HTTPS remotes. Anything else is
    /// addressed by remote name, leaving authentication to the user's own git
    /// setup.
    fn network_target(&self, remote: &str, credential: Option<&str>) -> String {
        credential
            .and_then(|token| {
                self.remote_url(remote)
                    .and_then(|url| authenticated_url(&url, token))
            })
            .unwrap_or_else(|| remote.to_string())
    }
}

impl VersionControl for GitBinary {
    fn probe_available(&self) -> bool {
        match Command::new(&self.program)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
        {
            Ok(output) if output.status.success() => {
                debug!("{}", String::from_utf8_lossy(&output.stdout).trim());
                true
            }
            Ok(_) | Err(_) => false,
        }
    }

    fn is_initialized(&self) -> bool {
        self.fs.exists(Path::new(".git"))
    }

    #[instrument(skip(self), level = "debug")]
    fn initialize(&self, default_branch: &str) -> Result<()> {
        info!("initialize repository at {:?}", self.root.display());
        self.gitcall(&["init"], None)?;
        self.gitcall(
            &["symbolic-ref", "HEAD", &format!("refs/heads/{default_branch}")],
            None,
        )?;

        Ok(())
    }

    #[instrument(skip(self, url), level = "debug")]
    fn set_remote(&self, name: &str, url: &str) -> Result<()> {
        match self.remote_url(name) {
            Some(current) if current == url => debug!("remote {name:?} already up to date"),
            Some(_) => {
                info!("update url of remote {name:?}");
                self.gitcall(&["remote", "set-url", name, url], None)?;
            }
            None => {
                info!("add remote {name:?}");
                self.gitcall(&["remote", "add", name, url], None)?;
            }
        }

        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    fn stage_all(&self) -> Result<()> {
        self.gitcall(&["add", "--all"], None)?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    fn commit(&self, message: &str) -> Result<()> {
        // INVARIANT: Exit code 0 from a quiet cached diff means nothing is staged.
        let staged = self.output(&[
            OsStr::new("diff"),
            OsStr::new("--cached"),
            OsStr::new("--quiet"),
        ])?;
        if staged.status.success() {
            return Err(VcsError::NothingToCommit);
        }

        let output = self.gitcall(&["commit", "--quiet", "-m", message], None)?;
        debug!("{output}");

        Ok(())
    }

    #[instrument(skip(self, credential), level = "debug")]
    fn push(&self, remote: &str, branch: &str, credential: Option<&str>) -> Result<()> {
        let target = self.network_target(remote, credential);
        let refspec = format!("refs/heads/{branch}:refs/heads/{branch}");
        let output = self.gitcall(&["push", "--porcelain", &target, &refspec], credential)?;
        debug!("{}", redact(&output, credential));

        Ok(())
    }

    #[instrument(skip(self, credential), level = "debug")]
    fn pull(&self, remote: &str, branch: &str, credential: Option<&str>) -> Result<()> {
        let target = self.network_target(remote, credential);
        let output = self.gitcall(
            &["pull", "--no-rebase", "--no-edit", &target, branch],
            credential,
        )?;
        debug!("{}", redact(&output, credential));

        Ok(())
    }

    fn status_list(&self) -> Result<WorkingTreeStatus> {
        let args = ["status", "--porcelain=v1", "-z", "--untracked-files=all"];
        let output = self.output(&args.map(OsStr::new))?;
        if !output.status.success() {
            return Err(VcsError::Command {
                command: format!("git {}", args.join(" ")),
                message: chomp(render_output(&output)),
            });
        }

        Ok(parse_porcelain(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Parse NUL separated output of `git status --porcelain=v1 -z`.
///
/// Each record is `XY <path>`. Renames and copies carry one extra record
/// holding the original path, which is skipped.
fn parse_porcelain(output: &str) -> WorkingTreeStatus {
    let mut changes = Vec::new();
    let mut records = output.split('\0').filter(|record| !record.is_empty());

    while let Some(record) = records.next() {
        let Some((code, path)) = record.split_at_checked(2) else {
            continue;
        };
        let path = path.strip_prefix(' ').unwrap_or(path);
        let kind = change_kind(code);
        if kind == ChangeKind::Renamed {
            records.next();
        }
        changes.push(ChangedPath::new(path, kind));
    }

    WorkingTreeStatus::new(changes)
}

fn change_kind(code: &str) -> ChangeKind {
    if code.contains('R') || code.contains('C') {
        ChangeKind::Renamed
    } else if code.contains('D') {
        ChangeKind::Deleted
    } else if code.contains('A') || code == "??" {
        ChangeKind::Added
    } else {
        ChangeKind::Modified
    }
}

/// Put credential into user information of HTTPS URL.
fn authenticated_url(url: &str, token: &str) -> Option<String> {
    let rest = url.strip_prefix("https://")?;

    // INVARIANT: Replace existing user information instead of stacking it.
    let host_and_path = match rest.split_once('/') {
        Some((authority, path)) => {
            let host = authority.rsplit('@').next().unwrap_or(authority);
            format!("{host}/{path}")
        }
        None => rest.rsplit('@').next().unwrap_or(rest).to_string(),
    };

    Some(format!("https://x-access-token:{token}@{host_and_path}"))
}

fn render_output(output: &Output) -> String {
    let stdout = String::from_utf8_lossy(output.stdout.as_slice()).into_owned();
    let stderr = String::from_utf8_lossy(output.stderr.as_slice()).into_owned();
    let mut message = String::new();

    if !stdout.is_empty() {
        message.push_str(format!("stdout: {stdout}").as_str());
    }

    if !stderr.is_empty() {
        message.push_str(format!("stderr: {stderr}").as_str());
    }

    message
}

fn chomp(message: String) -> String {
    message
        .strip_suffix("\r\n")
        .or(message.strip_suffix('\n'))
        .map(ToString::to_string)
        .unwrap_or(message)
}
