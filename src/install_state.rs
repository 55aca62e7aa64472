//! Install state tracker.
//!
//! It folds the provider's raw install-status pushes into a tri-state
//! value, and forwards changes (and only changes) to the update agent
//! mailbox, preserving push order.

use crate::provider::{install_status, ListenerId, UpdateProvider};
use actix::prelude::*;
use failure::Fallible;
use std::sync::{Arc, Mutex};

/// Last-known state of a previously triggered download/install.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallProgress {
    Unknown,
    Downloaded,
    Failed,
}

impl Default for InstallProgress {
    fn default() -> Self {
        InstallProgress::Unknown
    }
}

impl InstallProgress {
    /// Map a provider-native status code.
    pub fn from_status_code(code: i32) -> Self {
        match code {
            install_status::DOWNLOADED => InstallProgress::Downloaded,
            install_status::FAILED => InstallProgress::Failed,
            _ => InstallProgress::Unknown,
        }
    }
}

/// Agent notification: install progress changed.
#[derive(Debug)]
pub struct InstallProgressChanged(pub InstallProgress);

impl Message for InstallProgressChanged {
    type Result = ();
}

/// Tracker of install status pushes.
#[derive(Debug, Default)]
pub struct InstallStateTracker {
    last: Arc<Mutex<InstallProgress>>,
    registration: Option<ListenerId>,
}

/// Record a new status code, returning the new value if it changed.
fn fold_status(last: &mut InstallProgress, code: i32) -> Option<InstallProgress> {
    let next = InstallProgress::from_status_code(code);
    if next == *last {
        return None;
    }
    *last = next;
    Some(next)
}

impl InstallStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_subscribed(&self) -> bool {
        self.registration.is_some()
    }

    /// Last value seen from the provider.
    pub fn last_known(&self) -> InstallProgress {
        match self.last.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Register on the provider push channel, forwarding changes to `recipient`.
    ///
    /// Returns `false` if already registered.
    pub fn subscribe(
        &mut self,
        provider: &dyn UpdateProvider,
        recipient: Recipient<InstallProgressChanged>,
    ) -> Fallible<bool> {
        if self.registration.is_some() {
            trace!("install listener already registered");
            return Ok(false);
        }

        let last = Arc::clone(&self.last);
        let recipient = Mutex::new(recipient);
        let listener = move |code: i32| {
            trace!("install status push: {}", code);
            // Forward under lock, so concurrent pushes keep their order.
            let mut guard = match last.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Some(progress) = fold_status(&mut guard, code) {
                debug!("install progress changed: {:?}", progress);
                match recipient.lock() {
                    Ok(r) => r.do_send(InstallProgressChanged(progress)),
                    Err(poisoned) => poisoned.into_inner().do_send(InstallProgressChanged(progress)),
                }
            }
        };

        let id = provider.subscribe(Box::new(listener))?;
        debug!("registered install listener {:?}", id);
        self.registration = Some(id);
        Ok(true)
    }

    /// Unregister from the provider. No-op if not registered.
    pub fn unsubscribe(&mut self, provider: &dyn UpdateProvider) -> Fallible<()> {
        if let Some(id) = self.registration.take() {
            provider.unsubscribe(id)?;
            debug!("unregistered install listener {:?}", id);
        }
        Ok(())
    }
}
