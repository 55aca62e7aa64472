//! TOML configuration snippets, as found on disk.

/// Top-level configuration stanza.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ConfigSnippet {
    /// Update decision configuration.
    pub(crate) updates: Option<UpdatesSnippet>,
    /// Persistent state configuration.
    pub(crate) storage: Option<StorageSnippet>,
}

/// Config snippet for update decision logic.
#[derive(Debug, Deserialize)]
pub(crate) struct UpdatesSnippet {
    /// Deadline for a single update check, in milliseconds (default: 3000)
    pub(crate) check_timeout_ms: Option<u64>,
    /// Update priority requiring an immediate update (default: 5)
    pub(crate) priority_threshold: Option<i32>,
    /// Client staleness above which an immediate update is required (default: 60)
    pub(crate) staleness_threshold_days: Option<i32>,
    /// Minimum interval between flexible prompts, in hours (default: 24)
    pub(crate) cooldown_hours: Option<u64>,
}

/// Config snippet for persistent state.
#[derive(Debug, Deserialize)]
pub(crate) struct StorageSnippet {
    /// Directory holding the cooldown record (default: /var/lib/updraft)
    pub(crate) state_dir: Option<String>,
}
