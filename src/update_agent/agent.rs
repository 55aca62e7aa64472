//! Update agent.

use super::state::{OneShotEvent, UiState};
use super::AgentSettings;
use crate::clock::Clock;
use crate::cooldown::{CooldownGate, CooldownStore};
use crate::errors::UpdateError;
use crate::install_state::{InstallProgress, InstallProgressChanged, InstallStateTracker};
use crate::policy::{ActionCategory, UpdateSnapshot};
use crate::provider::{FlowHandle, FlowKind, UpdateProvider};
use actix::fut;
use actix::prelude::*;
use failure::Fallible;
use std::sync::Arc;
use tokio::sync::{oneshot, watch};

/// Main actor deciding and publishing update actions.
///
/// All mutations of the UI state happen on this actor, either in a
/// message handler or in a future spawned on its context.
pub struct UpdateAgent {
    settings: AgentSettings,
    provider: Arc<dyn UpdateProvider>,
    gate: CooldownGate,
    tracker: InstallStateTracker,
    state: UiState,
    publisher: watch::Sender<UiState>,
    /// Generation of the most recently started check.
    check_generation: u64,
    inflight: Option<InflightCheck>,
}

/// Bookkeeping for the check currently in flight.
struct InflightCheck {
    generation: u64,
    handle: SpawnHandle,
    /// Resolves once the check future has been dropped or has completed.
    released: oneshot::Receiver<()>,
}

impl UpdateAgent {
    pub fn new(
        settings: AgentSettings,
        provider: Arc<dyn UpdateProvider>,
        store: Arc<dyn CooldownStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let gate = CooldownGate::new(store, clock, settings.cooldown_window);
        let (publisher, _) = watch::channel(UiState::default());
        Self {
            settings,
            provider,
            gate,
            tracker: InstallStateTracker::new(),
            state: UiState::default(),
            publisher,
            check_generation: 0,
            inflight: None,
        }
    }

    /// Read-only subscription to UI state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<UiState> {
        self.publisher.subscribe()
    }

    /// Apply a state mutation, publishing only on actual change.
    fn update_state<F>(&mut self, mutate: F)
    where
        F: FnOnce(&mut UiState),
    {
        let mut next = self.state.clone();
        mutate(&mut next);
        if next == self.state {
            trace!("state unchanged, nothing to publish");
            return;
        }

        debug!("publishing state: {:?}", next);
        self.state = next.clone();
        self.publisher.send_replace(next);
    }

    /// Cancel the check in flight, if any, and return its release signal.
    fn cancel_inflight(&mut self, ctx: &mut Context<Self>) -> Option<oneshot::Receiver<()>> {
        let inflight = self.inflight.take()?;
        debug!("cancelling superseded update check #{}", inflight.generation);
        ctx.cancel_future(inflight.handle);
        Some(inflight.released)
    }

    /// Spawn a fresh check, which starts fetching only after `prior` released.
    fn spawn_check(
        &mut self,
        ctx: &mut Context<Self>,
        prior: Option<oneshot::Receiver<()>>,
        done: oneshot::Sender<CheckOutcome>,
    ) {
        self.check_generation += 1;
        let generation = self.check_generation;
        let provider = Arc::clone(&self.provider);
        let deadline = self.settings.check_timeout;
        let (released_tx, released_rx) = oneshot::channel::<()>();

        let fetch = async move {
            if let Some(prior) = prior {
                // An error only means the sender was dropped, i.e. released.
                let _ = prior.await;
                trace!("superseded check released, starting check #{}", generation);
            }
            match tokio::time::timeout(deadline, provider.fetch_snapshot()).await {
                Ok(Ok(snapshot)) => Ok(snapshot),
                Ok(Err(e)) => Err(UpdateError::FetchError(e.to_string())),
                Err(_) => Err(UpdateError::timeout(deadline)),
            }
        };

        let check = fut::wrap_future::<_, Self>(fetch)
            .then(move |res, actor, _ctx| actor.apply_fetch_result(generation, res))
            .map(move |published, actor, _ctx| {
                drop(released_tx);
                if actor.inflight.as_ref().map(|c| c.generation) == Some(generation) {
                    actor.inflight = None;
                }
                let outcome = match published {
                    Some(category) => CheckOutcome::Published(category),
                    None => CheckOutcome::Superseded,
                };
                let _ = done.send(outcome);
            });

        trace!("starting update check #{}", generation);
        let handle = ctx.spawn(check);
        self.inflight = Some(InflightCheck {
            generation,
            handle,
            released: released_rx,
        });
    }

    /// Fold the result of a fetch into the UI state.
    ///
    /// Results of superseded checks are discarded without publishing.
    fn apply_fetch_result(
        &mut self,
        generation: u64,
        res: Result<UpdateSnapshot, UpdateError>,
    ) -> ResponseActFuture<Self, Option<ActionCategory>> {
        if generation != self.check_generation {
            debug!("discarding result of superseded check #{}", generation);
            return Box::pin(fut::ready(None));
        }

        let snapshot = match res {
            Ok(s) => s,
            Err(e) => {
                error!("{}", e);
                self.update_state(|s| s.status = ActionCategory::Failed);
                return Box::pin(fut::ready(Some(ActionCategory::Failed)));
            }
        };

        debug!("fetched update snapshot: {:?}", snapshot);
        let category = self.settings.thresholds.classify(&snapshot);
        info!("update status determined: {:?}", category);
        self.update_state(|s| s.status = category);

        if category != ActionCategory::FlexibleRequired {
            return Box::pin(fut::ready(Some(category)));
        }
        if snapshot.is_downloaded {
            debug!("flexible update already downloaded, no download prompt");
            return Box::pin(fut::ready(Some(category)));
        }

        let cooldown = fut::wrap_future::<_, Self>(self.gate.check_expired()).map(
            move |expired, actor, _ctx| {
                if generation != actor.check_generation {
                    debug!("check #{} superseded during cooldown check", generation);
                } else if expired {
                    info!("flexible update prompt triggered");
                    actor.update_state(|s| s.launch_flexible_update = OneShotEvent::Triggered);
                } else {
                    debug!("flexible update prompt still in cooldown");
                }
                Some(category)
            },
        );
        Box::pin(cooldown)
    }

    /// Register the install listener, unless already registered.
    fn register_listener(&mut self, ctx: &mut Context<Self>) {
        let recipient = ctx.address().recipient();
        if let Err(e) = self.tracker.subscribe(self.provider.as_ref(), recipient) {
            error!("failed to register install listener: {}", e);
        }
    }

    fn unregister_listener(&mut self) {
        if let Err(e) = self.tracker.unsubscribe(self.provider.as_ref()) {
            error!("failed to unregister install listener: {}", e);
        }
    }
}

/// Map the result of a flow start to a failure, if any.
fn check_flow_start(kind: FlowKind, res: Fallible<bool>) -> Result<(), UpdateError> {
    match res {
        Ok(true) => Ok(()),
        Ok(false) => Err(UpdateError::FlowStartFailure {
            kind: kind.to_string(),
            reason: "provider declined to start the flow".to_string(),
        }),
        Err(e) => Err(UpdateError::FlowStartFailure {
            kind: kind.to_string(),
            reason: e.to_string(),
        }),
    }
}

impl Actor for UpdateAgent {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        trace!("update agent started");
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.unregister_listener();
        trace!("update agent stopped");
    }
}

/// Outcome of a single update check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The check settled and published this status.
    Published(ActionCategory),
    /// A newer check cancelled this one before it settled.
    ///
    /// If it was cancelled while consulting the cooldown store, its status
    /// was already published; it never raises the flexible prompt.
    Superseded,
}

/// Request: check for updates, superseding any check in flight.
#[derive(Debug)]
pub struct CheckForUpdates;

impl Message for CheckForUpdates {
    type Result = CheckOutcome;
}

impl Handler<CheckForUpdates> for UpdateAgent {
    type Result = ResponseFuture<CheckOutcome>;

    fn handle(&mut self, _msg: CheckForUpdates, ctx: &mut Self::Context) -> Self::Result {
        let prior = self.cancel_inflight(ctx);
        let (done_tx, done_rx) = oneshot::channel();
        self.spawn_check(ctx, prior, done_tx);

        Box::pin(async move { done_rx.await.unwrap_or(CheckOutcome::Superseded) })
    }
}

impl Handler<InstallProgressChanged> for UpdateAgent {
    type Result = ();

    fn handle(&mut self, msg: InstallProgressChanged, _ctx: &mut Self::Context) {
        match msg.0 {
            InstallProgress::Downloaded => {
                if self.state.show_install_prompt.is_triggered() {
                    trace!("install prompt already pending");
                    return;
                }
                info!("update downloaded, install prompt triggered");
                self.update_state(|s| s.show_install_prompt = OneShotEvent::Triggered);
            }
            InstallProgress::Failed => {
                warn!("update download/install failed");
                self.update_state(|s| s.status = ActionCategory::Failed);
            }
            InstallProgress::Unknown => trace!("install progress unknown, nothing to do"),
        }
    }
}

/// Request: start the immediate update flow.
#[derive(Debug)]
pub struct TriggerImmediateUpdate {
    pub handle: FlowHandle,
}

impl Message for TriggerImmediateUpdate {
    type Result = ();
}

impl Handler<TriggerImmediateUpdate> for UpdateAgent {
    type Result = ResponseActFuture<Self, ()>;

    fn handle(&mut self, msg: TriggerImmediateUpdate, _ctx: &mut Self::Context) -> Self::Result {
        info!("triggering immediate update");
        let start = self.provider.start_flow(FlowKind::Immediate, msg.handle);

        let started = fut::wrap_future::<_, Self>(start).map(|res, _actor, _ctx| {
            match check_flow_start(FlowKind::Immediate, res) {
                Ok(_) => info!("immediate update flow started"),
                Err(e) => error!("{}", e),
            }
        });
        Box::pin(started)
    }
}

/// Request: start the flexible update flow.
#[derive(Debug)]
pub struct TriggerFlexibleUpdate {
    pub handle: FlowHandle,
}

impl Message for TriggerFlexibleUpdate {
    type Result = ();
}

impl Handler<TriggerFlexibleUpdate> for UpdateAgent {
    type Result = ResponseActFuture<Self, ()>;

    fn handle(&mut self, msg: TriggerFlexibleUpdate, _ctx: &mut Self::Context) -> Self::Result {
        info!("triggering flexible update");
        let provider = Arc::clone(&self.provider);
        let handle = msg.handle;

        // A fresh flexible attempt always restarts cooldown bookkeeping.
        let clear = fut::wrap_future::<_, Self>(self.gate.clear());
        let started = clear
            .then(move |_, actor, ctx| {
                actor.register_listener(ctx);
                fut::wrap_future::<_, Self>(provider.start_flow(FlowKind::Flexible, handle))
            })
            .map(|res, actor, _ctx| match check_flow_start(FlowKind::Flexible, res) {
                Ok(_) => info!("flexible update flow started"),
                Err(e) => {
                    error!("{}", e);
                    actor.unregister_listener();
                }
            });
        Box::pin(started)
    }
}

/// Notification: the flexible download prompt was shown (consumes the event).
#[derive(Debug)]
pub struct FlexiblePromptShown;

impl Message for FlexiblePromptShown {
    type Result = ();
}

impl Handler<FlexiblePromptShown> for UpdateAgent {
    type Result = ResponseActFuture<Self, ()>;

    fn handle(&mut self, _msg: FlexiblePromptShown, _ctx: &mut Self::Context) -> Self::Result {
        debug!("flexible update download prompt shown");
        let record = fut::wrap_future::<_, Self>(self.gate.record_shown());
        let consumed = record.map(|_, actor, _ctx| {
            actor.update_state(|s| s.launch_flexible_update = OneShotEvent::Idle);
        });
        Box::pin(consumed)
    }
}

/// Notification: the install prompt was shown (consumes the event).
#[derive(Debug)]
pub struct InstallPromptConsumed;

impl Message for InstallPromptConsumed {
    type Result = ();
}

impl Handler<InstallPromptConsumed> for UpdateAgent {
    type Result = ();

    fn handle(&mut self, _msg: InstallPromptConsumed, _ctx: &mut Self::Context) {
        debug!("install prompt consumed");
        self.update_state(|s| s.show_install_prompt = OneShotEvent::Idle);
    }
}

/// Request: install the downloaded update.
#[derive(Debug)]
pub struct InstallDownloadedUpdate;

impl Message for InstallDownloadedUpdate {
    type Result = ();
}

impl Handler<InstallDownloadedUpdate> for UpdateAgent {
    type Result = ResponseActFuture<Self, ()>;

    fn handle(&mut self, _msg: InstallDownloadedUpdate, _ctx: &mut Self::Context) -> Self::Result {
        info!("installing downloaded update");
        let complete = self.provider.complete_install();

        let completed = fut::wrap_future::<_, Self>(complete).map(|res, _actor, _ctx| {
            if let Err(e) = res {
                error!("failed to complete update install: {}", e);
            }
        });
        Box::pin(completed)
    }
}

/// Request: unregister from the provider push channel.
#[derive(Debug)]
pub struct UnregisterListeners;

impl Message for UnregisterListeners {
    type Result = ();
}

impl Handler<UnregisterListeners> for UpdateAgent {
    type Result = ();

    fn handle(&mut self, _msg: UnregisterListeners, _ctx: &mut Self::Context) {
        debug!("unregistering update listeners");
        self.unregister_listener();
    }
}

/// Request: current UI state.
#[derive(Debug)]
pub struct GetState;

impl Message for GetState {
    type Result = UiState;
}

impl Handler<GetState> for UpdateAgent {
    type Result = MessageResult<GetState>;

    fn handle(&mut self, _msg: GetState, _ctx: &mut Self::Context) -> Self::Result {
        MessageResult(self.state.clone())
    }
}
