//! updraft: in-app update decision agent.
//!
//! This binary hosts the update agent against an emulated update
//! provider, persisting the flexible-prompt cooldown on disk.
//! It is meant for exercising update decisions from a terminal:
//!  * `check` - run one update check for a given snapshot.
//!  * `push-status` - start a flexible flow, then push an install status.
//!  * `reset-cooldown` - forget when the flexible prompt was last shown.

#[macro_use]
extern crate log;

use actix::prelude::*;
use failure::{Fallible, ResultExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use structopt::StructOpt;
use updraft::config::{AgentConfig, DEFAULT_CONFIG_DIRS};
use updraft::cooldown::FLEXIBLE_PROMPT_KEY;
use updraft::provider::UpdateProvider;
use updraft::{
    CheckForUpdates, CooldownStore, FakeProvider, FileStore, FlexiblePromptShown, FlowHandle,
    GetState, InstallDownloadedUpdate, InstallPromptConsumed, SystemClock, TriggerFlexibleUpdate,
    UiState, UnregisterListeners, UpdateAgent, UpdateSnapshot,
};

#[derive(Debug, StructOpt)]
#[structopt(name = "updraft", about = "In-app update decision agent")]
struct CliOptions {
    /// Verbosity level (higher is more verbose).
    #[structopt(short = "v", parse(from_occurrences))]
    verbosity: u8,

    /// Base directory for configuration snippets (repeatable).
    #[structopt(long = "config-dir", parse(from_os_str))]
    config_dirs: Vec<PathBuf>,

    #[structopt(subcommand)]
    cmd: CliCommand,
}

#[derive(Debug, StructOpt)]
enum CliCommand {
    /// Run one update check against an emulated provider.
    #[structopt(name = "check")]
    Check {
        /// JSON file with the snapshot served by the emulated provider.
        #[structopt(long = "snapshot", parse(from_os_str))]
        snapshot: PathBuf,
    },
    /// Start a flexible update, then push a raw install status code.
    #[structopt(name = "push-status")]
    PushStatus {
        /// JSON file with the snapshot served by the emulated provider.
        #[structopt(long = "snapshot", parse(from_os_str))]
        snapshot: PathBuf,
        /// Provider-native install status code.
        code: i32,
    },
    /// Clear the flexible prompt cooldown record.
    #[structopt(name = "reset-cooldown")]
    ResetCooldown,
}

fn main() -> Fallible<()> {
    let opts = CliOptions::from_args();
    init_logging(opts.verbosity)?;
    trace!("command-line options: {:?}", opts);

    let dirs: Vec<PathBuf> = if opts.config_dirs.is_empty() {
        DEFAULT_CONFIG_DIRS.iter().map(PathBuf::from).collect()
    } else {
        opts.config_dirs.clone()
    };
    let cfg = AgentConfig::read_config(&dirs)?;

    let sys = actix::System::new();
    match opts.cmd {
        CliCommand::Check { snapshot } => {
            let snapshot = read_snapshot(&snapshot)?;
            sys.block_on(check_session(cfg, snapshot))
        }
        CliCommand::PushStatus { snapshot, code } => {
            let snapshot = read_snapshot(&snapshot)?;
            sys.block_on(push_status_session(cfg, snapshot, code))
        }
        CliCommand::ResetCooldown => sys.block_on(reset_cooldown(cfg)),
    }
}

/// Initialize logging, `RUST_LOG` taking precedence over verbosity flags.
fn init_logging(verbosity: u8) -> Fallible<()> {
    let level = match verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .try_init()?;
    Ok(())
}

fn read_snapshot(path: &Path) -> Fallible<UpdateSnapshot> {
    let content = std::fs::read(path).context(format!("failed to read '{}'", path.display()))?;
    let snapshot = serde_json::from_slice(&content)
        .context(format!("failed to parse snapshot in '{}'", path.display()))?;
    Ok(snapshot)
}

fn start_agent(cfg: &AgentConfig, provider: Arc<dyn UpdateProvider>) -> Addr<UpdateAgent> {
    let store = Arc::new(FileStore::new(cfg.state_dir.clone()));
    UpdateAgent::new(cfg.settings.clone(), provider, store, Arc::new(SystemClock)).start()
}

fn print_state(state: &UiState) -> Fallible<()> {
    let json = serde_json::to_string_pretty(state)?;
    println!("{}", json);
    Ok(())
}

async fn check_session(cfg: AgentConfig, snapshot: UpdateSnapshot) -> Fallible<()> {
    let provider = Arc::new(FakeProvider::new(snapshot));
    let addr = start_agent(&cfg, provider);

    let outcome = addr.send(CheckForUpdates).await?;
    info!("update check outcome: {:?}", outcome);

    let state = addr.send(GetState).await?;
    print_state(&state)?;

    // Printing the state is what "showing" the prompt means here.
    if state.launch_flexible_update.is_triggered() {
        addr.send(FlexiblePromptShown).await?;
    }
    addr.send(UnregisterListeners).await?;
    Ok(())
}

async fn push_status_session(cfg: AgentConfig, snapshot: UpdateSnapshot, code: i32) -> Fallible<()> {
    let provider = Arc::new(FakeProvider::new(snapshot));
    let addr = start_agent(&cfg, provider.clone());

    let outcome = addr.send(CheckForUpdates).await?;
    info!("update check outcome: {:?}", outcome);
    let flexible = TriggerFlexibleUpdate {
        handle: FlowHandle::new("updraft-cli"),
    };
    addr.send(flexible).await?;

    provider.push_status(code);
    let state = addr.send(GetState).await?;
    print_state(&state)?;

    if state.show_install_prompt.is_triggered() {
        addr.send(InstallPromptConsumed).await?;
        addr.send(InstallDownloadedUpdate).await?;
        info!("installs completed: {}", provider.installs_completed());
    }
    addr.send(UnregisterListeners).await?;
    Ok(())
}

async fn reset_cooldown(cfg: AgentConfig) -> Fallible<()> {
    let store = FileStore::new(cfg.state_dir);
    store.remove(FLEXIBLE_PROMPT_KEY).await?;
    info!("cleared cooldown record in {:?}", store.dir());
    Ok(())
}
