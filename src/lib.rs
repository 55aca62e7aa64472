//! updraft: in-app update decision agent.
//!
//! This library decides whether a running application must be updated,
//! which update flow to use (immediate vs. flexible), and publishes that
//! decision to the UI layer exactly once per change.
//!
//! It is made of a few small pieces wired around one actor:
//!  * `UpdateAgent` - main agent state-machine, owning the UI-facing state.
//!  * `policy` - pure classification of an update snapshot.
//!  * `CooldownGate` - throttling of the flexible-update prompt.
//!  * `InstallStateTracker` - folding of provider install-status pushes.
//!
//! The update provider and the cooldown store are external collaborators,
//! reached through the `UpdateProvider` and `CooldownStore` traits.

#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;
#[macro_use]
extern crate serde_derive;

pub mod clock;
pub mod config;
pub mod cooldown;
pub mod errors;
pub mod install_state;
pub mod policy;
pub mod provider;
pub mod update_agent;

pub use crate::clock::{Clock, FixedClock, SystemClock};
pub use crate::cooldown::{CooldownGate, CooldownStore, FileStore, MemoryStore};
pub use crate::install_state::{InstallProgress, InstallStateTracker};
pub use crate::policy::{ActionCategory, PolicyThresholds, UpdateSnapshot};
pub use crate::provider::{FakeFetch, FakeProvider, FlowHandle, FlowKind, UpdateProvider};
pub use crate::update_agent::{
    AgentSettings, CheckForUpdates, CheckOutcome, FlexiblePromptShown, GetState,
    InstallDownloadedUpdate, InstallPromptConsumed, OneShotEvent, TriggerFlexibleUpdate,
    TriggerImmediateUpdate, UiState, UnregisterListeners, UpdateAgent,
};
