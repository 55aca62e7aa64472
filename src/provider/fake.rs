//! Emulated update provider.
//!
//! It serves scripted fetch responses and records every delegated call,
//! so that hosts can run the agent without a real delivery backend.

use super::{FlowHandle, FlowKind, InstallListener, ListenerId, UpdateProvider};
use crate::policy::UpdateSnapshot;
use failure::Fallible;
use futures::future::{self, BoxFuture};
use futures::prelude::*;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Scripted response to a single fetch.
#[derive(Clone, Debug)]
pub enum FakeFetch {
    /// Answer right away.
    Ready(UpdateSnapshot),
    /// Answer after a delay.
    Delayed(UpdateSnapshot, Duration),
    /// Fail with the given reason.
    Fail(String),
    /// Never answer.
    Hang,
}

struct FakeState {
    default_fetch: FakeFetch,
    scripted: VecDeque<FakeFetch>,
    listeners: BTreeMap<ListenerId, Arc<dyn Fn(i32) + Send + Sync>>,
    next_listener: u64,
    accept_flows: bool,
    fail_flows: bool,
    fail_installs: bool,
    flows: Vec<(FlowKind, FlowHandle)>,
    fetches_started: usize,
    fetches_abandoned: usize,
    installs_completed: usize,
}

/// Emulated update provider.
#[derive(Clone)]
pub struct FakeProvider {
    inner: Arc<Mutex<FakeState>>,
}

impl Default for FakeProvider {
    fn default() -> Self {
        Self::new(UpdateSnapshot::default())
    }
}

impl FakeProvider {
    /// Provider answering every fetch with `snapshot`.
    pub fn new(snapshot: UpdateSnapshot) -> Self {
        let state = FakeState {
            default_fetch: FakeFetch::Ready(snapshot),
            scripted: VecDeque::new(),
            listeners: BTreeMap::new(),
            next_listener: 0,
            accept_flows: true,
            fail_flows: false,
            fail_installs: false,
            flows: vec![],
            fetches_started: 0,
            fetches_abandoned: 0,
            installs_completed: 0,
        };
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    /// Answer every unscripted fetch with `snapshot`.
    pub fn set_snapshot(&self, snapshot: UpdateSnapshot) {
        self.set_default_fetch(FakeFetch::Ready(snapshot));
    }

    /// Answer every unscripted fetch with `response`.
    pub fn set_default_fetch(&self, response: FakeFetch) {
        self.lock().default_fetch = response;
    }

    /// Queue a one-off response for the next unanswered fetch.
    pub fn enqueue_fetch(&self, response: FakeFetch) {
        self.lock().scripted.push_back(response);
    }

    /// Whether started flows report success.
    pub fn set_flow_accepted(&self, accepted: bool) {
        self.lock().accept_flows = accepted;
    }

    /// Make flow starts fail with an error.
    pub fn fail_flows(&self, fail: bool) {
        self.lock().fail_flows = fail;
    }

    /// Make install completion fail with an error.
    pub fn fail_installs(&self, fail: bool) {
        self.lock().fail_installs = fail;
    }

    /// Push a raw install status code to all registered listeners.
    pub fn push_status(&self, code: i32) {
        let listeners: Vec<_> = self.lock().listeners.values().cloned().collect();
        trace!("pushing install status {} to {} listener(s)", code, listeners.len());
        for listener in listeners {
            listener(code);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    pub fn started_flows(&self) -> Vec<FlowKind> {
        self.lock().flows.iter().map(|(kind, _)| *kind).collect()
    }

    pub fn fetches_started(&self) -> usize {
        self.lock().fetches_started
    }

    /// Fetches dropped before they answered.
    pub fn fetches_abandoned(&self) -> usize {
        self.lock().fetches_abandoned
    }

    pub fn installs_completed(&self) -> usize {
        self.lock().installs_completed
    }

    fn lock(&self) -> MutexGuard<FakeState> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Counts a fetch as abandoned if dropped while still armed.
struct AbandonGuard {
    inner: Arc<Mutex<FakeState>>,
    armed: bool,
}

impl Drop for AbandonGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Ok(mut state) = self.inner.lock() {
            state.fetches_abandoned += 1;
        }
    }
}

async fn answer_fetch(response: FakeFetch, mut guard: AbandonGuard) -> Fallible<UpdateSnapshot> {
    let result = match response {
        FakeFetch::Ready(snapshot) => Ok(snapshot),
        FakeFetch::Delayed(snapshot, delay) => {
            tokio::time::sleep(delay).await;
            Ok(snapshot)
        }
        FakeFetch::Fail(reason) => Err(format_err!("{}", reason)),
        FakeFetch::Hang => future::pending().await,
    };
    guard.armed = false;
    result
}

impl UpdateProvider for FakeProvider {
    fn fetch_snapshot(&self) -> BoxFuture<'static, Fallible<UpdateSnapshot>> {
        let response = {
            let mut state = self.lock();
            state.fetches_started += 1;
            match state.scripted.pop_front() {
                Some(r) => r,
                None => state.default_fetch.clone(),
            }
        };
        trace!("fake provider fetch, answering with {:?}", response);

        let guard = AbandonGuard {
            inner: Arc::clone(&self.inner),
            armed: true,
        };
        answer_fetch(response, guard).boxed()
    }

    fn start_flow(&self, kind: FlowKind, handle: FlowHandle) -> BoxFuture<'static, Fallible<bool>> {
        let mut state = self.lock();
        state.flows.push((kind, handle));
        if state.fail_flows {
            return future::err(format_err!("fake provider: {} flow unavailable", kind)).boxed();
        }
        future::ok::<_, failure::Error>(state.accept_flows).boxed()
    }

    fn complete_install(&self) -> BoxFuture<'static, Fallible<()>> {
        let mut state = self.lock();
        if state.fail_installs {
            return future::err(format_err!("fake provider: nothing to install")).boxed();
        }
        state.installs_completed += 1;
        future::ok::<_, failure::Error>(()).boxed()
    }

    fn subscribe(&self, listener: InstallListener) -> Fallible<ListenerId> {
        let mut state = self.lock();
        let id = ListenerId(state.next_listener);
        state.next_listener += 1;
        state.listeners.insert(id, Arc::from(listener));
        Ok(id)
    }

    fn unsubscribe(&self, id: ListenerId) -> Fallible<()> {
        match self.lock().listeners.remove(&id) {
            Some(_) => Ok(()),
            None => bail!("unknown listener {:?}", id),
        }
    }
}
