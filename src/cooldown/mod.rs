//! Cooldown gate for the flexible-update prompt.
//!
//! The gate decides whether enough time elapsed since the prompt was last
//! shown. The "last shown" timestamp lives in an external `CooldownStore`
//! and is re-read on every check, never cached in memory.

mod store;

pub use self::store::{CooldownStore, FileStore, MemoryStore};

use crate::clock::Clock;
use crate::errors::UpdateError;
use futures::prelude::*;
use std::convert::TryFrom;
use std::sync::Arc;
use std::time::Duration;

/// Well-known store key for the flexible prompt timestamp.
pub const FLEXIBLE_PROMPT_KEY: &str = "last_flexible_prompt_shown";

/// Default minimum interval between two flexible prompts.
pub const DEFAULT_COOLDOWN_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Whether the cooldown window elapsed, given the last-shown timestamp.
///
/// An absent record is always expired. The window itself is exclusive:
/// exactly one window after the last prompt is still within cooldown.
pub fn is_expired(now_millis: i64, last_shown: Option<i64>, window: Duration) -> bool {
    match last_shown {
        None => true,
        Some(ts) => {
            let window_millis = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
            now_millis.saturating_sub(ts) > window_millis
        }
    }
}

/// Throttling gate over a persisted timestamp.
#[derive(Clone)]
pub struct CooldownGate {
    store: Arc<dyn CooldownStore>,
    clock: Arc<dyn Clock>,
    key: String,
    window: Duration,
}

impl std::fmt::Debug for CooldownGate {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("CooldownGate")
            .field("key", &self.key)
            .field("window", &self.window)
            .finish()
    }
}

impl CooldownGate {
    pub fn new(store: Arc<dyn CooldownStore>, clock: Arc<dyn Clock>, window: Duration) -> Self {
        Self {
            store,
            clock,
            key: FLEXIBLE_PROMPT_KEY.to_string(),
            window,
        }
    }

    /// Check whether the cooldown expired, at current time.
    ///
    /// A store read failure is reported as "not expired".
    pub fn check_expired(&self) -> impl Future<Output = bool> {
        let read = self.store.read(&self.key);
        let clock = Arc::clone(&self.clock);
        let key = self.key.clone();
        let window = self.window;

        async move {
            match read.await {
                Ok(last_shown) => {
                    let now = clock.now_millis();
                    let expired = is_expired(now, last_shown, window);
                    trace!(
                        "cooldown check: now={}, last_shown={:?}, expired={}",
                        now,
                        last_shown,
                        expired
                    );
                    expired
                }
                Err(e) => {
                    let err = UpdateError::StoreReadError {
                        key,
                        reason: e.to_string(),
                    };
                    error!("{}", err);
                    false
                }
            }
        }
    }

    /// Record that the prompt was shown now. Best-effort.
    pub fn record_shown(&self) -> impl Future<Output = ()> {
        let now = self.clock.now_millis();
        let write = self.store.write(&self.key, now);
        let key = self.key.clone();

        async move {
            match write.await {
                Ok(_) => debug!("recorded flexible prompt timestamp {}", now),
                Err(e) => {
                    let err = UpdateError::StoreWriteError {
                        key,
                        reason: e.to_string(),
                    };
                    error!("{}", err);
                }
            }
        }
    }

    /// Remove the persisted record. Best-effort.
    pub fn clear(&self) -> impl Future<Output = ()> {
        let remove = self.store.remove(&self.key);
        let key = self.key.clone();

        async move {
            match remove.await {
                Ok(_) => debug!("cleared flexible prompt timestamp"),
                Err(e) => {
                    let err = UpdateError::StoreWriteError {
                        key,
                        reason: e.to_string(),
                    };
                    error!("{}", err);
                }
            }
        }
    }
}
