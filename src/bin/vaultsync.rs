// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use vaultsync::{
    config::{Backend, SyncConfig, VaultPath},
    fs::{FileSystem, LocalFs},
    host::{Host, SyncCommand},
    path::default_config_path,
    status::{StatusColor, StatusSignal},
    vcs::{Git2Backend, GitBinary, IndicatifPrompter, VersionControl},
    watch::VaultWatcher,
    Outcome, SyncManager,
};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::{fs::read_to_string, path::PathBuf, process::exit, sync::Arc, time::Duration};
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "vaultsync [options] <vaultsync-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Path to configuration file.
    #[arg(long, global = true, env = "VAULTSYNC_CONFIG", value_name = "path")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    async fn run(self) -> Result<()> {
        let config = load_config(self.config)?;
        match config.backend {
            Backend::Binary => self.command.run(config, binary_backend).await,
            Backend::Embedded => self.command.run(config, embedded_backend).await,
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Initialize vault repository, and point it at configured remote.
    #[command(override_usage = "vaultsync setup [options]")]
    Setup,

    /// Commit all changes of vault, and push them to remote.
    #[command(override_usage = "vaultsync push [options]")]
    Push,

    /// Pull changes from remote into vault.
    #[command(override_usage = "vaultsync pull [options]")]
    Pull,

    /// Show number of uncommitted changes in vault.
    #[command(override_usage = "vaultsync status [options]")]
    Status,

    /// Keep status current while vault is edited.
    #[command(override_usage = "vaultsync watch [options]")]
    Watch(WatchOptions),
}

impl Command {
    async fn run<V, B>(self, config: SyncConfig, backend: B) -> Result<()>
    where
        V: VersionControl,
        B: FnOnce(&SyncConfig, Arc<dyn FileSystem>, &ProgressBar) -> V,
    {
        let bar = ProgressBar::new_spinner();
        let shell = Arc::new(TerminalShell::new(bar.clone()));
        let fs: Arc<dyn FileSystem> = Arc::new(LocalFs::new(config.vault.as_path()));
        let vcs = backend(&config, fs.clone(), &bar);

        let Some(manager) = SyncManager::setup(config.clone(), vcs, fs, shell.clone())
            .await?
            .ready()
        else {
            shell.finish();
            exit(1);
        };

        let outcome = match self {
            Self::Setup | Self::Status => Outcome::Completed,
            Self::Push => manager.run(SyncCommand::Push).await,
            Self::Pull => manager.run(SyncCommand::Pull).await,
            Self::Watch(opts) => {
                run_watch(&manager, config.vault.as_path().to_path_buf(), opts).await;
                Outcome::Completed
            }
        };
        manager.shutdown().await;
        shell.finish();

        if !outcome.is_completed() {
            exit(1);
        }

        Ok(())
    }
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct WatchOptions {
    /// Milliseconds between two scans of the vault.
    #[arg(long, default_value_t = 2000, value_name = "ms")]
    pub interval: u64,

    /// Seconds between two automatic pushes.
    #[arg(long, value_name = "secs")]
    pub push_interval: Option<u64>,
}

/// Host shell rendering to the terminal.
struct TerminalShell {
    bar: ProgressBar,
}

impl TerminalShell {
    fn new(bar: ProgressBar) -> Self {
        Self { bar }
    }

    fn finish(&self) {
        self.bar.disable_steady_tick();
        self.bar.finish();
    }
}

impl Host for TerminalShell {
    fn register_command(&self, command: SyncCommand) {
        debug!("command {:?} available: {}", command.id(), command.name());
    }

    fn show_notice(&self, text: &str, _duration: Duration) {
        self.bar.println(text);
    }

    fn render_status(&self, signal: &StatusSignal) {
        let template = match signal.color() {
            StatusColor::Yellow => "{spinner:.yellow} {msg:.yellow}",
            StatusColor::Green => "{msg:.green}",
            StatusColor::Red => "{msg:.red}",
        };
        if let Ok(style) = ProgressStyle::with_template(template) {
            self.bar.set_style(style);
        }

        if signal.is_terminal() {
            self.bar.disable_steady_tick();
        } else {
            self.bar.enable_steady_tick(Duration::from_millis(100));
        }
        self.bar.set_message(signal.label.clone());
    }
}

fn binary_backend(config: &SyncConfig, fs: Arc<dyn FileSystem>, _bar: &ProgressBar) -> GitBinary {
    GitBinary::new(config.vault.as_path(), fs)
}

fn embedded_backend(
    config: &SyncConfig,
    _fs: Arc<dyn FileSystem>,
    bar: &ProgressBar,
) -> Git2Backend {
    Git2Backend::new(config.vault.as_path()).with_prompter(IndicatifPrompter::new(bar.clone()))
}

fn load_config(path: Option<PathBuf>) -> Result<SyncConfig> {
    let path = match path {
        Some(path) => path,
        None => default_config_path()?,
    };

    let mut config = match read_to_string(&path) {
        Ok(data) => data
            .parse::<SyncConfig>()
            .with_context(|| format!("invalid configuration at {:?}", path.display()))?,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            info!("no configuration at {:?}, using defaults", path.display());
            SyncConfig::default()
        }
        Err(error) => {
            return Err(anyhow!(error).context(format!("cannot read {:?}", path.display())))
        }
    };

    // INVARIANT: Unset vault means the current directory is the vault.
    if config.vault.is_unset() {
        config.vault = VaultPath::new(std::env::current_dir()?);
    }
    debug!("loaded {config:?}");

    Ok(config)
}

async fn run_watch<V>(manager: &SyncManager<V>, root: PathBuf, opts: WatchOptions)
where
    V: VersionControl,
{
    let mut watcher = VaultWatcher::new(root);
    let mut scan = interval(Duration::from_millis(opts.interval.max(1)));
    scan.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut push = opts.push_interval.map(|secs| {
        let mut push = interval(Duration::from_secs(secs.max(1)));
        push.set_missed_tick_behavior(MissedTickBehavior::Delay);
        push
    });

    // Intervals tick immediately once.
    scan.tick().await;
    if let Some(push) = push.as_mut() {
        push.tick().await;
    }

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!("watching vault, press Ctrl-C to stop");
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("stop watching vault");
                break;
            }
            _ = scan.tick() => {
                let (changed, returned) = match tokio::task::spawn_blocking(move || {
                    let changed = watcher.poll();
                    (changed, watcher)
                })
                .await
                {
                    Ok(result) => result,
                    Err(error) => {
                        error!("vault scan failed: {error}");
                        break;
                    }
                };
                watcher = returned;
                if changed {
                    manager.on_file_change().await;
                }
            }
            _ = next_tick(&mut push) => {
                manager.push().await;
            }
        }
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[tokio::main]
async fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run().await {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

async fn run() -> Result<()> {
    Cli::parse().run().await
}
