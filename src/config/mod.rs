//! Configuration parsing and validation.
//!
//! This module contains three logical entities:
//!  * Snippets: single configuration files, holding a subset of configuration entries.
//!  * Inputs: configuration snippets merged, but not yet validated.
//!  * AgentConfig: validated configuration for the update agent.

mod inputs;
mod snippets;

use crate::policy::PolicyThresholds;
use crate::update_agent::AgentSettings;
use failure::Fallible;
use std::path::PathBuf;
use std::time::Duration;

/// Base directories for configuration snippets, in increasing priority.
pub static DEFAULT_CONFIG_DIRS: [&str; 3] = ["/usr/lib", "/run", "/etc"];

/// Default directory for persistent state.
static DEFAULT_STATE_DIR: &str = "/var/lib/updraft";

/// Runtime configuration for the agent.
///
/// It holds validated agent configuration.
#[derive(Debug, Serialize)]
pub struct AgentConfig {
    pub settings: AgentSettings,
    pub state_dir: PathBuf,
}

impl AgentConfig {
    pub fn read_config(dirs: &[PathBuf]) -> Fallible<Self> {
        let cfg = inputs::ConfigInput::read_config(dirs)?;
        Self::try_from_input(cfg)
    }

    /// Validate inputs and return a valid agent configuration.
    fn try_from_input(cfg: inputs::ConfigInput) -> Fallible<Self> {
        let defaults = AgentSettings::default();
        let updates = cfg.updates;

        let check_timeout = match updates.check_timeout_ms {
            Some(0) => bail!("invalid check_timeout_ms: must be greater than zero"),
            Some(ms) => Duration::from_millis(ms),
            None => defaults.check_timeout,
        };
        let cooldown_window = match updates.cooldown_hours {
            Some(0) => bail!("invalid cooldown_hours: must be greater than zero"),
            Some(h) => match h.checked_mul(60 * 60) {
                Some(secs) => Duration::from_secs(secs),
                None => bail!("invalid cooldown_hours: {} is out of range", h),
            },
            None => defaults.cooldown_window,
        };
        let thresholds = PolicyThresholds {
            priority: updates
                .priority_threshold
                .unwrap_or(defaults.thresholds.priority),
            staleness_days: updates
                .staleness_threshold_days
                .unwrap_or(defaults.thresholds.staleness_days),
        };
        ensure!(
            thresholds.staleness_days >= 0,
            "invalid staleness_threshold_days: {}",
            thresholds.staleness_days
        );

        let state_dir = if cfg.storage.state_dir.is_empty() {
            PathBuf::from(DEFAULT_STATE_DIR)
        } else {
            PathBuf::from(cfg.storage.state_dir)
        };

        let config = AgentConfig {
            settings: AgentSettings {
                check_timeout,
                cooldown_window,
                thresholds,
            },
            state_dir,
        };
        match serde_json::to_string_pretty(&config) {
            Ok(json) => debug!("runtime configuration:\n{}", json),
            Err(e) => warn!("failed to render runtime configuration: {}", e),
        }

        Ok(config)
    }
}
