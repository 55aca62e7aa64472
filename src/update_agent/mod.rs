//! Update agent state-machine.

mod agent;
mod state;

pub use self::agent::{
    CheckForUpdates, CheckOutcome, FlexiblePromptShown, GetState, InstallDownloadedUpdate,
    InstallPromptConsumed, TriggerFlexibleUpdate, TriggerImmediateUpdate, UnregisterListeners,
    UpdateAgent,
};
pub use self::state::{OneShotEvent, UiState};

use crate::cooldown::DEFAULT_COOLDOWN_WINDOW;
use crate::policy::PolicyThresholds;
use std::time::Duration;

/// Default deadline for a single update check.
pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_millis(3000);

/// Tunables for the update agent.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AgentSettings {
    /// Deadline for fetching a snapshot.
    pub check_timeout: Duration,
    /// Minimum interval between two flexible-update prompts.
    pub cooldown_window: Duration,
    /// Immediate-update thresholds.
    pub thresholds: PolicyThresholds,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            check_timeout: DEFAULT_CHECK_TIMEOUT,
            cooldown_window: DEFAULT_COOLDOWN_WINDOW,
            thresholds: PolicyThresholds::default(),
        }
    }
}
