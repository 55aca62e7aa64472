//! UI-facing state, owned by the update agent.

use crate::policy::ActionCategory;

/// Event meant to be acted upon once, until explicitly consumed.
///
/// Reading a triggered event does not consume it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OneShotEvent {
    Idle,
    Triggered,
}

impl Default for OneShotEvent {
    fn default() -> Self {
        OneShotEvent::Idle
    }
}

impl OneShotEvent {
    pub fn is_triggered(self) -> bool {
        self == OneShotEvent::Triggered
    }
}

/// State exposed to the UI layer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct UiState {
    pub status: ActionCategory,
    /// Show the flexible-update download prompt.
    pub launch_flexible_update: OneShotEvent,
    /// Show the "restart to install" prompt.
    pub show_install_prompt: OneShotEvent,
}
