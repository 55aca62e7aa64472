use actix::prelude::*;
use futures::future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use updraft::cooldown::FLEXIBLE_PROMPT_KEY;
use updraft::provider::install_status;
use updraft::{
    ActionCategory, AgentSettings, CheckForUpdates, CheckOutcome, FakeFetch, FakeProvider,
    FixedClock, FlexiblePromptShown, FlowHandle, FlowKind, GetState, InstallDownloadedUpdate,
    InstallPromptConsumed, MemoryStore, OneShotEvent, TriggerFlexibleUpdate,
    TriggerImmediateUpdate, UiState, UnregisterListeners, UpdateAgent, UpdateSnapshot,
};

const NOW: i64 = 1_725_337_204_000;
const HOUR_MS: i64 = 3_600_000;

struct Harness {
    provider: Arc<FakeProvider>,
    store: Arc<MemoryStore>,
    clock: Arc<FixedClock>,
    state: watch::Receiver<UiState>,
    addr: Addr<UpdateAgent>,
}

impl Harness {
    fn new(snapshot: UpdateSnapshot) -> Self {
        Self::with_settings(AgentSettings::default(), snapshot)
    }

    fn with_settings(settings: AgentSettings, snapshot: UpdateSnapshot) -> Self {
        let provider = Arc::new(FakeProvider::new(snapshot));
        let store = Arc::new(MemoryStore::default());
        let clock = Arc::new(FixedClock::new(NOW));
        let agent = UpdateAgent::new(settings, provider.clone(), store.clone(), clock.clone());
        let state = agent.subscribe_state();
        Self {
            provider,
            store,
            clock,
            state,
            addr: agent.start(),
        }
    }

    async fn check(&self) -> CheckOutcome {
        self.addr.send(CheckForUpdates).await.unwrap()
    }

    async fn ui(&self) -> UiState {
        self.addr.send(GetState).await.unwrap()
    }

    async fn trigger_flexible(&self) {
        let msg = TriggerFlexibleUpdate {
            handle: FlowHandle::new("main"),
        };
        self.addr.send(msg).await.unwrap();
    }
}

fn flexible() -> UpdateSnapshot {
    UpdateSnapshot {
        update_available: true,
        flexible_allowed: true,
        ..Default::default()
    }
}

fn immediate() -> UpdateSnapshot {
    UpdateSnapshot {
        update_available: true,
        immediate_allowed: true,
        flexible_allowed: true,
        priority: 5,
        staleness_days: 10,
        ..Default::default()
    }
}

#[actix::test]
async fn flexible_update_without_cooldown_record_raises_prompt() {
    let h = Harness::new(flexible());

    let outcome = h.check().await;
    assert_eq!(outcome, CheckOutcome::Published(ActionCategory::FlexibleRequired));

    let ui = h.ui().await;
    assert_eq!(ui.status, ActionCategory::FlexibleRequired);
    assert_eq!(ui.launch_flexible_update, OneShotEvent::Triggered);
    assert_eq!(ui.show_install_prompt, OneShotEvent::Idle);
}

#[actix::test]
async fn flexible_prompt_respects_recent_cooldown() {
    let h = Harness::new(flexible());
    h.store.insert(FLEXIBLE_PROMPT_KEY, NOW - HOUR_MS);

    h.check().await;
    let ui = h.ui().await;
    assert_eq!(ui.status, ActionCategory::FlexibleRequired);
    assert_eq!(ui.launch_flexible_update, OneShotEvent::Idle);
}

#[actix::test]
async fn flexible_prompt_returns_after_cooldown_expires() {
    let h = Harness::new(flexible());
    h.store.insert(FLEXIBLE_PROMPT_KEY, NOW - HOUR_MS);

    h.check().await;
    assert_eq!(h.ui().await.launch_flexible_update, OneShotEvent::Idle);

    h.clock.advance(24 * HOUR_MS);
    h.check().await;
    assert_eq!(h.ui().await.launch_flexible_update, OneShotEvent::Triggered);
}

#[actix::test]
async fn cooldown_read_failure_does_not_prompt() {
    let h = Harness::new(flexible());
    h.store.fail_reads(true);

    h.check().await;
    let ui = h.ui().await;
    assert_eq!(ui.status, ActionCategory::FlexibleRequired);
    assert_eq!(ui.launch_flexible_update, OneShotEvent::Idle);
}

#[actix::test]
async fn downloaded_flexible_update_does_not_prompt_download() {
    let h = Harness::new(UpdateSnapshot {
        is_downloaded: true,
        ..flexible()
    });

    h.check().await;
    let ui = h.ui().await;
    assert_eq!(ui.status, ActionCategory::FlexibleRequired);
    assert_eq!(ui.launch_flexible_update, OneShotEvent::Idle);
}

#[actix::test]
async fn immediate_update_is_classified_without_prompt() {
    let h = Harness::new(immediate());

    let outcome = h.check().await;
    assert_eq!(outcome, CheckOutcome::Published(ActionCategory::ImmediateRequired));
    assert_eq!(h.ui().await.launch_flexible_update, OneShotEvent::Idle);
}

#[actix::test]
async fn no_update_available() {
    let h = Harness::new(UpdateSnapshot::default());

    assert_eq!(h.check().await, CheckOutcome::Published(ActionCategory::NoUpdate));
    assert_eq!(h.ui().await, UiState::default());
}

#[actix::test]
async fn superseded_check_never_publishes() {
    let h = Harness::new(flexible());
    h.provider
        .enqueue_fetch(FakeFetch::Delayed(immediate(), Duration::from_millis(500)));
    let mut state = h.state.clone();

    let first = h.addr.send(CheckForUpdates);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.provider.fetches_started(), 1);

    let second = h.addr.send(CheckForUpdates);
    let (first, second) = future::join(first, second).await;
    assert_eq!(first.unwrap(), CheckOutcome::Superseded);
    assert_eq!(
        second.unwrap(),
        CheckOutcome::Published(ActionCategory::FlexibleRequired)
    );
    assert_eq!(h.provider.fetches_started(), 2);
    assert_eq!(h.provider.fetches_abandoned(), 1);

    assert_eq!(state.borrow_and_update().status, ActionCategory::FlexibleRequired);

    // Well past the point where the first fetch would have answered.
    tokio::time::sleep(Duration::from_millis(700)).await;
    assert!(!state.has_changed().unwrap());
    assert_eq!(h.ui().await.status, ActionCategory::FlexibleRequired);
}

#[actix::test]
async fn rapid_checks_publish_only_the_latest() {
    let h = Harness::new(immediate());
    h.provider
        .set_default_fetch(FakeFetch::Delayed(flexible(), Duration::from_millis(50)));

    let first = h.addr.send(CheckForUpdates);
    let second = h.addr.send(CheckForUpdates);
    let (first, second) = future::join(first, second).await;

    assert_eq!(first.unwrap(), CheckOutcome::Superseded);
    assert_eq!(
        second.unwrap(),
        CheckOutcome::Published(ActionCategory::FlexibleRequired)
    );
    assert_eq!(h.ui().await.status, ActionCategory::FlexibleRequired);
}

#[actix::test]
async fn fetch_without_answer_times_out_as_failed() {
    let h = Harness::new(flexible());
    h.provider.set_default_fetch(FakeFetch::Hang);

    let outcome = h.check().await;
    assert_eq!(outcome, CheckOutcome::Published(ActionCategory::Failed));
    assert_eq!(h.ui().await.status, ActionCategory::Failed);
    assert_eq!(h.provider.fetches_abandoned(), 1);
}

#[actix::test]
async fn slow_fetch_times_out_with_configured_deadline() {
    let settings = AgentSettings {
        check_timeout: Duration::from_millis(100),
        ..Default::default()
    };
    let h = Harness::with_settings(settings, flexible());
    h.provider
        .enqueue_fetch(FakeFetch::Delayed(flexible(), Duration::from_secs(2)));

    assert_eq!(h.check().await, CheckOutcome::Published(ActionCategory::Failed));

    // A new check is always accepted after a failure.
    assert_eq!(
        h.check().await,
        CheckOutcome::Published(ActionCategory::FlexibleRequired)
    );
}

#[actix::test]
async fn fetch_error_fails_then_recovers() {
    let h = Harness::new(flexible());
    h.provider.enqueue_fetch(FakeFetch::Fail("store unreachable".to_string()));

    assert_eq!(h.check().await, CheckOutcome::Published(ActionCategory::Failed));
    assert_eq!(h.ui().await.status, ActionCategory::Failed);

    assert_eq!(
        h.check().await,
        CheckOutcome::Published(ActionCategory::FlexibleRequired)
    );
}

#[actix::test]
async fn prompt_shown_records_cooldown_and_consumes_event() {
    let h = Harness::new(flexible());
    h.check().await;
    assert_eq!(h.ui().await.launch_flexible_update, OneShotEvent::Triggered);

    // Reading does not consume.
    assert_eq!(h.ui().await.launch_flexible_update, OneShotEvent::Triggered);

    h.addr.send(FlexiblePromptShown).await.unwrap();
    assert_eq!(h.store.get(FLEXIBLE_PROMPT_KEY), Some(NOW));
    assert_eq!(h.ui().await.launch_flexible_update, OneShotEvent::Idle);

    // Next check within cooldown stays quiet.
    h.clock.advance(HOUR_MS);
    h.check().await;
    assert_eq!(h.ui().await.launch_flexible_update, OneShotEvent::Idle);
}

#[actix::test]
async fn prompt_shown_with_broken_store_still_consumes() {
    let h = Harness::new(flexible());
    h.check().await;
    h.store.fail_writes(true);

    h.addr.send(FlexiblePromptShown).await.unwrap();
    assert_eq!(h.store.get(FLEXIBLE_PROMPT_KEY), None);
    assert_eq!(h.ui().await.launch_flexible_update, OneShotEvent::Idle);
}

#[actix::test]
async fn flexible_trigger_clears_cooldown_and_listens() {
    let h = Harness::new(flexible());
    h.store.insert(FLEXIBLE_PROMPT_KEY, NOW - HOUR_MS);

    h.trigger_flexible().await;
    assert_eq!(h.store.get(FLEXIBLE_PROMPT_KEY), None);
    assert_eq!(h.provider.started_flows(), vec![FlowKind::Flexible]);
    assert_eq!(h.provider.listener_count(), 1);

    // A second attempt does not register twice.
    h.trigger_flexible().await;
    assert_eq!(h.provider.listener_count(), 1);
}

#[actix::test]
async fn flexible_trigger_proceeds_when_cooldown_clear_fails() {
    let h = Harness::new(flexible());
    h.store.insert(FLEXIBLE_PROMPT_KEY, NOW - HOUR_MS);
    h.store.fail_writes(true);

    h.trigger_flexible().await;
    assert_eq!(h.store.get(FLEXIBLE_PROMPT_KEY), Some(NOW - HOUR_MS));
    assert_eq!(h.provider.started_flows(), vec![FlowKind::Flexible]);
    assert_eq!(h.provider.listener_count(), 1);

    h.provider.push_status(install_status::DOWNLOADED);
    assert_eq!(h.ui().await.show_install_prompt, OneShotEvent::Triggered);
}

#[actix::test]
async fn declined_flexible_flow_unregisters_listener() {
    let h = Harness::new(flexible());
    h.provider.set_flow_accepted(false);

    h.trigger_flexible().await;
    assert_eq!(h.provider.started_flows(), vec![FlowKind::Flexible]);
    assert_eq!(h.provider.listener_count(), 0);

    h.provider.set_flow_accepted(true);
    h.provider.fail_flows(true);
    h.trigger_flexible().await;
    assert_eq!(h.provider.listener_count(), 0);
    assert_eq!(h.ui().await, UiState::default());
}

#[actix::test]
async fn download_completion_raises_install_prompt() {
    let h = Harness::new(flexible());
    h.check().await;
    h.trigger_flexible().await;

    h.provider.push_status(install_status::PENDING);
    h.provider.push_status(install_status::DOWNLOADING);
    h.provider.push_status(install_status::DOWNLOADED);

    let ui = h.ui().await;
    assert_eq!(ui.show_install_prompt, OneShotEvent::Triggered);
    assert_eq!(ui.status, ActionCategory::FlexibleRequired);

    h.addr.send(InstallPromptConsumed).await.unwrap();
    assert_eq!(h.ui().await.show_install_prompt, OneShotEvent::Idle);

    h.addr.send(InstallDownloadedUpdate).await.unwrap();
    assert_eq!(h.provider.installs_completed(), 1);
    assert_eq!(h.ui().await.status, ActionCategory::FlexibleRequired);
}

#[actix::test]
async fn repeated_download_push_does_not_retrigger() {
    let h = Harness::new(flexible());
    h.trigger_flexible().await;

    h.provider.push_status(install_status::DOWNLOADED);
    h.addr.send(InstallPromptConsumed).await.unwrap();
    h.provider.push_status(install_status::DOWNLOADED);

    assert_eq!(h.ui().await.show_install_prompt, OneShotEvent::Idle);
}

#[actix::test]
async fn install_failure_overrides_status() {
    let h = Harness::new(immediate());
    h.check().await;
    h.trigger_flexible().await;

    h.provider.push_status(install_status::FAILED);
    assert_eq!(h.ui().await.status, ActionCategory::Failed);

    // Recovery through a fresh check.
    h.provider.set_snapshot(flexible());
    assert_eq!(
        h.check().await,
        CheckOutcome::Published(ActionCategory::FlexibleRequired)
    );
}

#[actix::test]
async fn consuming_install_prompt_twice_is_harmless() {
    let h = Harness::new(flexible());
    let mut state = h.state.clone();

    h.addr.send(InstallPromptConsumed).await.unwrap();
    assert_eq!(h.ui().await.show_install_prompt, OneShotEvent::Idle);
    h.addr.send(InstallPromptConsumed).await.unwrap();
    assert_eq!(h.ui().await.show_install_prompt, OneShotEvent::Idle);

    // Nothing changed, so nothing was published.
    assert!(!state.has_changed().unwrap());
}

#[actix::test]
async fn immediate_trigger_delegates_without_touching_status() {
    let h = Harness::new(immediate());
    h.check().await;

    let msg = TriggerImmediateUpdate {
        handle: FlowHandle::new("main"),
    };
    h.addr.send(msg).await.unwrap();
    assert_eq!(h.provider.started_flows(), vec![FlowKind::Immediate]);
    assert_eq!(h.provider.listener_count(), 0);
    assert_eq!(h.ui().await.status, ActionCategory::ImmediateRequired);

    h.provider.fail_flows(true);
    let msg = TriggerImmediateUpdate {
        handle: FlowHandle::new("main"),
    };
    h.addr.send(msg).await.unwrap();
    assert_eq!(h.ui().await.status, ActionCategory::ImmediateRequired);
}

#[actix::test]
async fn install_failure_from_provider_is_swallowed() {
    let h = Harness::new(flexible());
    h.provider.fail_installs(true);

    h.addr.send(InstallDownloadedUpdate).await.unwrap();
    assert_eq!(h.provider.installs_completed(), 0);
    assert_eq!(h.ui().await, UiState::default());
}

#[actix::test]
async fn unregister_is_idempotent_and_stops_pushes() {
    let h = Harness::new(flexible());
    h.addr.send(UnregisterListeners).await.unwrap();

    h.trigger_flexible().await;
    assert_eq!(h.provider.listener_count(), 1);

    h.addr.send(UnregisterListeners).await.unwrap();
    h.addr.send(UnregisterListeners).await.unwrap();
    assert_eq!(h.provider.listener_count(), 0);

    h.provider.push_status(install_status::DOWNLOADED);
    assert_eq!(h.ui().await.show_install_prompt, OneShotEvent::Idle);
}

#[actix::test]
async fn background_download_then_resume() {
    let h = Harness::new(flexible());
    h.check().await;
    h.addr.send(FlexiblePromptShown).await.unwrap();
    h.trigger_flexible().await;
    h.provider.push_status(install_status::DOWNLOADING);

    // Download finishes while the host is in background, then it resumes.
    h.provider.set_snapshot(UpdateSnapshot {
        is_downloaded: true,
        download_triggered_incomplete: true,
        ..flexible()
    });
    h.provider.push_status(install_status::DOWNLOADED);
    h.check().await;

    let ui = h.ui().await;
    assert_eq!(
        ui.status,
        ActionCategory::DownloadIncomplete {
            is_downloaded: true,
            is_actively_downloading: false,
        }
    );
    assert_eq!(ui.show_install_prompt, OneShotEvent::Triggered);
    assert_eq!(ui.launch_flexible_update, OneShotEvent::Idle);
}

#[actix::test]
async fn subscribers_observe_published_state() {
    let h = Harness::new(flexible());
    let mut state = h.state.clone();
    assert_eq!(*state.borrow(), UiState::default());

    h.check().await;
    assert!(state.has_changed().unwrap());
    let seen = state.borrow_and_update().clone();
    assert_eq!(seen.status, ActionCategory::FlexibleRequired);
    assert_eq!(seen.launch_flexible_update, OneShotEvent::Triggered);
}
