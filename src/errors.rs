//! Failure taxonomy for the update agent.
//!
//! None of these ever reach a caller of the agent: they are logged where
//! they happen, and either turn into a `Failed` status (fetch path) or
//! into a no-op preserving prior state (store and flow paths).

use failure::Fail;
use std::time::Duration;

#[derive(Debug, Fail)]
pub enum UpdateError {
    #[fail(display = "update check timed out after {}ms", _0)]
    FetchTimeout(u64),

    #[fail(display = "failed to fetch update snapshot: {}", _0)]
    FetchError(String),

    #[fail(display = "failed to read cooldown record '{}': {}", key, reason)]
    StoreReadError { key: String, reason: String },

    #[fail(display = "failed to write cooldown record '{}': {}", key, reason)]
    StoreWriteError { key: String, reason: String },

    #[fail(display = "failed to start {} update flow: {}", kind, reason)]
    FlowStartFailure { kind: String, reason: String },
}

impl UpdateError {
    pub(crate) fn timeout(deadline: Duration) -> Self {
        UpdateError::FetchTimeout(deadline.as_millis() as u64)
    }
}
