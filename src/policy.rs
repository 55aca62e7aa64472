//! Update policy.
//!
//! Pure classification of a fetched update snapshot into the action
//! the UI layer should take.

/// Default update priority at or above which an immediate update is required.
pub const DEFAULT_PRIORITY_THRESHOLD: i32 = 5;

/// Default client staleness (in days) above which an immediate update is required.
pub const DEFAULT_STALENESS_THRESHOLD_DAYS: i32 = 60;

/// Update availability, as seen by the provider at fetch time.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UpdateSnapshot {
    pub update_available: bool,
    pub immediate_allowed: bool,
    pub flexible_allowed: bool,
    pub priority: i32,
    pub staleness_days: i32,
    pub is_downloaded: bool,
    pub is_actively_downloading: bool,
    pub download_triggered_incomplete: bool,
}

/// Action category derived from a snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionCategory {
    NoUpdate,
    FlexibleRequired,
    ImmediateRequired,
    /// A developer-triggered update is still in progress.
    DownloadIncomplete {
        is_downloaded: bool,
        is_actively_downloading: bool,
    },
    Failed,
}

impl Default for ActionCategory {
    fn default() -> Self {
        ActionCategory::NoUpdate
    }
}

/// Thresholds for immediate updates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PolicyThresholds {
    pub priority: i32,
    pub staleness_days: i32,
}

impl Default for PolicyThresholds {
    fn default() -> Self {
        Self {
            priority: DEFAULT_PRIORITY_THRESHOLD,
            staleness_days: DEFAULT_STALENESS_THRESHOLD_DAYS,
        }
    }
}

impl PolicyThresholds {
    /// Classify a snapshot. First matching rule wins.
    pub fn classify(&self, snapshot: &UpdateSnapshot) -> ActionCategory {
        if snapshot.download_triggered_incomplete {
            trace!("update download triggered but not completed");
            return ActionCategory::DownloadIncomplete {
                is_downloaded: snapshot.is_downloaded,
                is_actively_downloading: snapshot.is_actively_downloading,
            };
        }

        if self.requires_immediate(snapshot) {
            trace!("immediate update required");
            return ActionCategory::ImmediateRequired;
        }

        if snapshot.flexible_allowed {
            trace!("flexible update required");
            return ActionCategory::FlexibleRequired;
        }

        trace!("no update required");
        ActionCategory::NoUpdate
    }

    fn requires_immediate(&self, snapshot: &UpdateSnapshot) -> bool {
        snapshot.immediate_allowed
            && (snapshot.priority >= self.priority
                || snapshot.staleness_days > self.staleness_days)
    }
}

/// Classify a snapshot with default thresholds.
pub fn classify(snapshot: &UpdateSnapshot) -> ActionCategory {
    PolicyThresholds::default().classify(snapshot)
}
