//! Sync orchestrator
//!
//! Decides when pushes and pulls run. Every trigger (login, connectivity,
//! visibility, queue growth, the periodic poll, explicit requests) funnels
//! into the guarded [`SyncOrchestrator::push_now`] and
//! [`SyncOrchestrator::pull_now`]. A trigger that arrives while a run of the
//! same kind is in flight is dropped, not queued.
//!
//! The decision logic lives in [`Scheduler`], which is pure and has no
//! notion of time; the background loop started by
//! [`SyncOrchestrator::spawn`] owns the timers and feeds it.

use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::future::OptionFuture;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, Sleep};
use tracing::{debug, info, warn};

use super::error::SyncResult;
use super::pull::{PullSummary, PullSynchronizer};
use super::push::{PushSummary, PushSynchronizer};
use super::state::{SyncKind, SyncState};
use crate::events::{EventBus, SubscriptionId, SyncEvent, SyncStatus};
use crate::identity::Identity;
use crate::remote::RemoteStore;
use crate::storage::queue::QueueStatus;
use crate::store::{SharedStore, Store};

/// Scheduling parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncPolicy {
    /// Failed attempts after which an entry is skipped
    pub retry_ceiling: u32,
    /// Period of the background push while signed in and online
    pub poll_interval: Duration,
    /// Delay between login and the first pull
    pub startup_debounce: Duration,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            retry_ceiling: 3,
            poll_interval: Duration::from_secs(30),
            startup_debounce: Duration::from_millis(1500),
        }
    }
}

/// Inputs to the background loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// An identity signed in
    Login(Identity),
    Logout,
    /// Network connectivity came back
    Online,
    /// Network connectivity was lost
    Offline,
    /// The app became visible (`true`) or hidden
    Visibility(bool),
    /// The queue was written to; `pending` is the new total
    QueueChanged { pending: usize },
    PushNow,
    PullNow,
    Shutdown,
}

/// What the loop should do in response to a trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Push,
    Pull,
    ArmDebounce,
    DisarmDebounce,
    Stop,
}

/// Pure trigger-to-action logic
#[derive(Debug, Clone)]
pub struct Scheduler {
    identity: Option<Identity>,
    online: bool,
    last_queue_size: usize,
    debounce_armed: bool,
    /// The startup debounce fired while offline
    pending_initial_pull: bool,
}

impl Scheduler {
    /// Start signed out and online, with `pending` entries already queued,
    /// counted the way `QueueChanged` counts them
    pub fn new(pending: usize) -> Self {
        Self {
            identity: None,
            online: true,
            last_queue_size: pending,
            debounce_armed: false,
            pending_initial_pull: false,
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    /// Signed in and online: automatic runs are allowed
    pub fn is_active(&self) -> bool {
        self.identity.is_some() && self.online
    }

    pub fn handle(&mut self, trigger: Trigger) -> Vec<Action> {
        match trigger {
            Trigger::Login(identity) => {
                self.identity = Some(identity);
                self.debounce_armed = true;
                self.pending_initial_pull = false;
                vec![Action::ArmDebounce]
            }
            Trigger::Logout => {
                self.identity = None;
                self.pending_initial_pull = false;
                if std::mem::take(&mut self.debounce_armed) {
                    vec![Action::DisarmDebounce]
                } else {
                    Vec::new()
                }
            }
            Trigger::Online => {
                self.online = true;
                if !self.is_active() || self.debounce_armed {
                    Vec::new()
                } else if std::mem::take(&mut self.pending_initial_pull) {
                    vec![Action::Pull, Action::Push]
                } else {
                    vec![Action::Push]
                }
            }
            Trigger::Offline => {
                self.online = false;
                Vec::new()
            }
            Trigger::Visibility(visible) => {
                if visible && self.is_active() {
                    vec![Action::Push]
                } else {
                    Vec::new()
                }
            }
            Trigger::QueueChanged { pending } => {
                let grew = self.last_queue_size == 0 && pending > 0;
                self.last_queue_size = pending;
                if grew && self.is_active() {
                    vec![Action::Push]
                } else {
                    Vec::new()
                }
            }
            Trigger::PushNow if self.identity.is_some() => vec![Action::Push],
            Trigger::PullNow if self.identity.is_some() => vec![Action::Pull],
            Trigger::PushNow | Trigger::PullNow => Vec::new(),
            Trigger::Shutdown => vec![Action::Stop],
        }
    }

    /// The periodic poll fired
    pub fn poll(&self) -> Vec<Action> {
        if self.is_active() {
            vec![Action::Push]
        } else {
            Vec::new()
        }
    }

    /// The startup debounce fired
    pub fn debounce_elapsed(&mut self) -> Vec<Action> {
        self.debounce_armed = false;
        if self.is_active() {
            vec![Action::Pull, Action::Push]
        } else {
            self.pending_initial_pull = self.identity.is_some();
            Vec::new()
        }
    }
}

/// Inputs to the resting status
#[derive(Debug, Clone, Copy)]
struct StatusFlags {
    signed_in: bool,
    online: bool,
    failed: bool,
}

impl StatusFlags {
    fn resting(&self) -> SyncStatus {
        if !self.signed_in {
            SyncStatus::SignedOut
        } else if !self.online {
            SyncStatus::Offline
        } else if self.failed {
            SyncStatus::Error
        } else {
            SyncStatus::Idle
        }
    }
}

/// Coordinates push and pull runs for one store
pub struct SyncOrchestrator {
    store: SharedStore,
    push: PushSynchronizer,
    pull: PullSynchronizer,
    state: SyncState,
    events: EventBus,
    policy: SyncPolicy,
    status_tx: watch::Sender<SyncStatus>,
    flags: Mutex<StatusFlags>,
}

impl SyncOrchestrator {
    /// Take ownership of a store and coordinate its sync
    pub fn new(store: Store, remote: Arc<dyn RemoteStore>, policy: SyncPolicy) -> Self {
        let events = store.events().clone();
        Self::with_shared(store.into_shared(), events, remote, policy)
    }

    /// Coordinate an already shared store
    ///
    /// `events` must be the bus the store emits on, or queue growth will
    /// never reach the loop.
    pub fn with_shared(
        store: SharedStore,
        events: EventBus,
        remote: Arc<dyn RemoteStore>,
        policy: SyncPolicy,
    ) -> Self {
        let (status_tx, _) = watch::channel(SyncStatus::SignedOut);
        Self {
            push: PushSynchronizer::new(store.clone(), remote.clone(), policy.retry_ceiling),
            pull: PullSynchronizer::new(store.clone(), remote),
            store,
            state: SyncState::new(),
            events,
            policy,
            status_tx,
            flags: Mutex::new(StatusFlags {
                signed_in: false,
                online: true,
                failed: false,
            }),
        }
    }

    /// Replace the in-memory state, typically with one persisted to disk
    pub fn with_state(mut self, state: SyncState) -> Self {
        self.state = state;
        self
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn policy(&self) -> &SyncPolicy {
        &self.policy
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    pub async fn queue_status(&self) -> SyncResult<QueueStatus> {
        let status = self
            .store
            .lock()
            .await
            .queue_status(self.policy.retry_ceiling)?;
        Ok(status)
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    pub fn status(&self) -> SyncStatus {
        *self.status_tx.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.status_tx.subscribe()
    }

    /// Drain the queue once
    ///
    /// Returns `Ok(None)` without doing anything if a push is already in
    /// flight.
    pub async fn push_now(&self, identity: &Identity) -> SyncResult<Option<PushSummary>> {
        let Some(guard) = self.state.try_begin(SyncKind::Push) else {
            debug!("Push already in flight, skipping");
            return Ok(None);
        };
        self.update_flags(|flags| flags.signed_in = true);
        self.set_status(SyncStatus::Syncing);

        let result = self.push.drain(identity).await;
        drop(guard);

        match &result {
            Ok(summary) => {
                self.state.record_push(*summary);
                self.update_flags(|flags| flags.failed = false);
                self.events.emit(SyncEvent::PushCompleted(*summary));
            }
            Err(e) => self.record_failure("Push", &e.to_string()),
        }
        self.finish_run();

        result.map(Some)
    }

    /// Pull every accessible trip once
    ///
    /// Returns `Ok(None)` without doing anything if a pull is already in
    /// flight.
    pub async fn pull_now(&self, identity: &Identity) -> SyncResult<Option<PullSummary>> {
        let Some(guard) = self.state.try_begin(SyncKind::Pull) else {
            debug!("Pull already in flight, skipping");
            return Ok(None);
        };
        self.update_flags(|flags| flags.signed_in = true);
        self.set_status(SyncStatus::Syncing);

        let result = self.pull.pull_all(identity).await;
        drop(guard);

        match &result {
            Ok(summary) => {
                self.state.record_pull(*summary);
                self.update_flags(|flags| flags.failed = false);
                self.events.emit(SyncEvent::PullCompleted(*summary));
            }
            Err(e) => self.record_failure("Pull", &e.to_string()),
        }
        self.finish_run();

        result.map(Some)
    }

    /// Start the background trigger loop
    ///
    /// Queue growth reported by the store is forwarded to the loop
    /// automatically. The loop stops on [`Trigger::Shutdown`] or when the
    /// returned handle is dropped.
    pub fn spawn(self: Arc<Self>) -> OrchestratorHandle {
        let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();

        // Weak so the subscription alone does not keep the loop alive
        let forward = trigger_tx.downgrade();
        let subscription = self.events.subscribe(move |event| {
            if let SyncEvent::QueueChanged { pending } = event {
                if let Some(tx) = forward.upgrade() {
                    let _ = tx.send(Trigger::QueueChanged { pending: *pending });
                }
            }
        });

        let status_rx = self.status_tx.subscribe();
        let task = tokio::spawn(trigger_loop(self, trigger_rx, subscription));

        OrchestratorHandle {
            trigger_tx,
            status_rx,
            task,
        }
    }

    fn record_failure(&self, what: &str, message: &str) {
        warn!("{} failed: {}", what, message);
        self.state.record_error(message);
        self.update_flags(|flags| flags.failed = true);
        self.events.emit(SyncEvent::Error(message.to_string()));
    }

    fn finish_run(&self) {
        if let Err(e) = self.state.save() {
            warn!("Failed to save sync state: {}", e);
        }
        self.settle_status();
    }

    fn update_flags(&self, f: impl FnOnce(&mut StatusFlags)) {
        f(&mut self.flags.lock().unwrap_or_else(PoisonError::into_inner));
    }

    /// Move to the resting status unless a run is still in flight
    fn settle_status(&self) {
        if self.state.is_idle() {
            let resting = self
                .flags
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .resting();
            self.set_status(resting);
        }
    }

    fn set_status(&self, status: SyncStatus) {
        let changed = self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
        if changed {
            debug!("Sync status: {}", status.as_str());
            self.events.emit(SyncEvent::StatusChanged(status));
        }
    }

    fn observe(&self, scheduler: &Scheduler) {
        self.update_flags(|flags| {
            flags.signed_in = scheduler.identity().is_some();
            flags.online = scheduler.is_online();
        });
        self.settle_status();
    }

    async fn run_batch(self: Arc<Self>, identity: Identity, actions: Vec<Action>) {
        // Failures are already logged, recorded and emitted
        for action in actions {
            match action {
                Action::Push => {
                    let _ = self.push_now(&identity).await;
                }
                Action::Pull => {
                    let _ = self.pull_now(&identity).await;
                }
                Action::ArmDebounce | Action::DisarmDebounce | Action::Stop => {}
            }
        }
    }
}

/// Handle to a running trigger loop
pub struct OrchestratorHandle {
    trigger_tx: mpsc::UnboundedSender<Trigger>,
    status_rx: watch::Receiver<SyncStatus>,
    task: JoinHandle<()>,
}

impl OrchestratorHandle {
    /// Deliver a trigger; false if the loop has already stopped
    pub fn send(&self, trigger: Trigger) -> bool {
        self.trigger_tx.send(trigger).is_ok()
    }

    pub fn status(&self) -> watch::Receiver<SyncStatus> {
        self.status_rx.clone()
    }

    /// Stop the loop and wait for in-flight runs to finish
    pub async fn shutdown(self) {
        let _ = self.trigger_tx.send(Trigger::Shutdown);
        if let Err(e) = self.task.await {
            warn!("Sync loop ended abnormally: {}", e);
        }
    }
}

async fn trigger_loop(
    orchestrator: Arc<SyncOrchestrator>,
    mut triggers: mpsc::UnboundedReceiver<Trigger>,
    subscription: SubscriptionId,
) {
    // Same measure as QueueChanged: every entry, exhausted ones included
    let queued = match orchestrator.queue_status().await {
        Ok(status) => status.total,
        Err(e) => {
            warn!("Failed to read sync queue: {}", e);
            0
        }
    };
    let mut scheduler = Scheduler::new(queued);
    orchestrator.observe(&scheduler);

    let period = orchestrator.policy.poll_interval;
    let mut poll = tokio::time::interval_at(Instant::now() + period, period);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut debounce: Option<Pin<Box<Sleep>>> = None;
    let mut runs: Vec<JoinHandle<()>> = Vec::new();

    info!("Sync loop started");
    loop {
        let actions = tokio::select! {
            trigger = triggers.recv() => match trigger {
                Some(trigger) => {
                    debug!("Sync trigger: {:?}", trigger);
                    scheduler.handle(trigger)
                }
                None => vec![Action::Stop],
            },
            _ = poll.tick() => scheduler.poll(),
            _ = OptionFuture::from(debounce.as_mut()), if debounce.is_some() => {
                debounce = None;
                scheduler.debounce_elapsed()
            }
        };

        let mut batch = Vec::new();
        let mut stop = false;
        for action in actions {
            match action {
                Action::Push | Action::Pull => batch.push(action),
                Action::ArmDebounce => {
                    debounce = Some(Box::pin(tokio::time::sleep(
                        orchestrator.policy.startup_debounce,
                    )));
                }
                Action::DisarmDebounce => debounce = None,
                Action::Stop => stop = true,
            }
        }

        orchestrator.observe(&scheduler);

        if !batch.is_empty() {
            if let Some(identity) = scheduler.identity() {
                runs.retain(|run| !run.is_finished());
                runs.push(tokio::spawn(
                    orchestrator.clone().run_batch(identity.clone(), batch),
                ));
            }
        }

        if stop {
            break;
        }
    }

    orchestrator.unsubscribe(subscription);
    for run in runs {
        if let Err(e) = run.await {
            warn!("Sync run ended abnormally: {}", e);
        }
    }
    info!("Sync loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Activity, Itinerary, Trip};
    use crate::remote::{MemoryRemote, RemoteCall};

    fn me() -> Identity {
        Identity::parse("ana@example.com").unwrap()
    }

    fn setup() -> (Arc<SyncOrchestrator>, MemoryRemote) {
        let store = Store::open_in_memory().unwrap();
        let remote = MemoryRemote::new();
        let orchestrator =
            SyncOrchestrator::new(store, Arc::new(remote.clone()), SyncPolicy::default());
        (Arc::new(orchestrator), remote)
    }

    /// Same as `setup`, with a poll far enough away to never fire in a test
    fn setup_quiet() -> (Arc<SyncOrchestrator>, MemoryRemote) {
        let store = Store::open_in_memory().unwrap();
        let remote = MemoryRemote::new();
        let policy = SyncPolicy {
            poll_interval: Duration::from_secs(24 * 60 * 60),
            ..SyncPolicy::default()
        };
        let orchestrator = SyncOrchestrator::new(store, Arc::new(remote.clone()), policy);
        (Arc::new(orchestrator), remote)
    }

    fn forward_events(orchestrator: &SyncOrchestrator) -> mpsc::UnboundedReceiver<SyncEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        orchestrator.subscribe(move |event| {
            let _ = tx.send(event.clone());
        });
        rx
    }

    async fn next_push(rx: &mut mpsc::UnboundedReceiver<SyncEvent>) -> PushSummary {
        loop {
            match rx.recv().await {
                Some(SyncEvent::PushCompleted(summary)) => return summary,
                Some(_) => continue,
                None => panic!("event stream closed"),
            }
        }
    }

    fn drained_pushes(rx: &mut mpsc::UnboundedReceiver<SyncEvent>) -> usize {
        let mut pushes = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, SyncEvent::PushCompleted(_)) {
                pushes += 1;
            }
        }
        pushes
    }

    async fn seed_trip(orchestrator: &SyncOrchestrator, id: &str) {
        let bundle = Itinerary {
            trip: Trip::with_id(id, "Lisbon"),
            flights: vec![],
            hotels: vec![],
            activities: vec![],
            restaurants: vec![],
        };
        orchestrator
            .store()
            .lock()
            .await
            .apply_pulled_trip(&bundle)
            .unwrap();
    }

    // ==================== Scheduler ====================

    #[test]
    fn test_login_arms_debounce_then_pulls_and_pushes() {
        let mut scheduler = Scheduler::new(0);
        assert!(scheduler.poll().is_empty());

        assert_eq!(scheduler.handle(Trigger::Login(me())), vec![Action::ArmDebounce]);
        assert_eq!(scheduler.debounce_elapsed(), vec![Action::Pull, Action::Push]);
        assert_eq!(scheduler.poll(), vec![Action::Push]);
    }

    #[test]
    fn test_queue_growth_is_edge_triggered() {
        let mut scheduler = Scheduler::new(0);
        scheduler.handle(Trigger::Login(me()));
        scheduler.debounce_elapsed();

        assert_eq!(
            scheduler.handle(Trigger::QueueChanged { pending: 1 }),
            vec![Action::Push]
        );
        assert!(scheduler
            .handle(Trigger::QueueChanged { pending: 2 })
            .is_empty());
        assert!(scheduler
            .handle(Trigger::QueueChanged { pending: 0 })
            .is_empty());
        assert_eq!(
            scheduler.handle(Trigger::QueueChanged { pending: 3 }),
            vec![Action::Push]
        );
    }

    #[test]
    fn test_existing_queue_is_not_an_edge() {
        let mut scheduler = Scheduler::new(4);
        scheduler.handle(Trigger::Login(me()));
        assert!(scheduler
            .handle(Trigger::QueueChanged { pending: 5 })
            .is_empty());
    }

    #[test]
    fn test_offline_suppresses_automatic_pushes() {
        let mut scheduler = Scheduler::new(0);
        scheduler.handle(Trigger::Login(me()));
        scheduler.debounce_elapsed();

        assert!(scheduler.handle(Trigger::Offline).is_empty());
        assert!(scheduler.poll().is_empty());
        assert!(scheduler.handle(Trigger::Visibility(true)).is_empty());
        assert!(scheduler
            .handle(Trigger::QueueChanged { pending: 1 })
            .is_empty());

        assert_eq!(scheduler.handle(Trigger::Online), vec![Action::Push]);
    }

    #[test]
    fn test_debounce_while_offline_defers_initial_pull() {
        let mut scheduler = Scheduler::new(0);
        scheduler.handle(Trigger::Login(me()));
        scheduler.handle(Trigger::Offline);

        assert!(scheduler.debounce_elapsed().is_empty());
        assert_eq!(
            scheduler.handle(Trigger::Online),
            vec![Action::Pull, Action::Push]
        );
        assert_eq!(scheduler.handle(Trigger::Online), vec![Action::Push]);
    }

    #[test]
    fn test_logout_stops_scheduling() {
        let mut scheduler = Scheduler::new(0);
        scheduler.handle(Trigger::Login(me()));

        assert_eq!(scheduler.handle(Trigger::Logout), vec![Action::DisarmDebounce]);
        assert!(scheduler.identity().is_none());
        assert!(scheduler.poll().is_empty());
        assert!(scheduler.handle(Trigger::PushNow).is_empty());
        assert!(scheduler.handle(Trigger::Visibility(true)).is_empty());
        assert_eq!(scheduler.handle(Trigger::Shutdown), vec![Action::Stop]);
    }

    #[test]
    fn test_hidden_does_nothing() {
        let mut scheduler = Scheduler::new(0);
        scheduler.handle(Trigger::Login(me()));
        scheduler.debounce_elapsed();
        assert!(scheduler.handle(Trigger::Visibility(false)).is_empty());
        assert_eq!(scheduler.handle(Trigger::Visibility(true)), vec![Action::Push]);
    }

    // ==================== Guarded runs ====================

    #[tokio::test]
    async fn test_activity_push_scenario() {
        let (orchestrator, remote) = setup();
        seed_trip(&orchestrator, "t1").await;
        orchestrator
            .store()
            .lock()
            .await
            .create(Activity::with_id("a1", "t1", "Tram 28"), &me())
            .unwrap();

        let summary = orchestrator.push_now(&me()).await.unwrap().unwrap();
        assert_eq!(summary.success, 1);

        assert_eq!(
            remote.writes().await,
            vec![RemoteCall::Set("trips/t1/activities/a1".to_string())]
        );
        assert_eq!(orchestrator.queue_status().await.unwrap().total, 0);
        assert_eq!(orchestrator.status(), SyncStatus::Idle);
    }

    #[tokio::test]
    async fn test_concurrent_push_is_a_noop() {
        let (orchestrator, remote) = setup();
        orchestrator
            .store()
            .lock()
            .await
            .create(Trip::with_id("t1", "Lisbon"), &me())
            .unwrap();

        let identity = me();
        let (first, second) = tokio::join!(
            orchestrator.push_now(&identity),
            orchestrator.push_now(&identity)
        );
        let results = [first.unwrap(), second.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_none()).count(), 1);
        assert_eq!(remote.writes().await.len(), 1);
    }

    #[tokio::test]
    async fn test_push_and_pull_may_overlap() {
        let (orchestrator, _remote) = setup();
        let identity = me();
        let (push, pull) = tokio::join!(
            orchestrator.push_now(&identity),
            orchestrator.pull_now(&identity)
        );
        assert!(push.unwrap().is_some());
        assert!(pull.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_offline_creates_then_online_drain() {
        let (orchestrator, remote) = setup();
        remote.set_offline(true).await;
        {
            let mut store = orchestrator.store().lock().await;
            store.create(Trip::with_id("t1", "Lisbon"), &me()).unwrap();
            store.create(Trip::with_id("t2", "Porto"), &me()).unwrap();
        }

        let entries = orchestrator.store().lock().await.pending_entries().unwrap();
        let ids: Vec<_> = entries.iter().map(|e| e.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "t2"]);

        // Failed pass while offline
        let summary = orchestrator.push_now(&me()).await.unwrap().unwrap();
        assert_eq!(summary.failed, 2);

        remote.set_offline(false).await;
        let summary = orchestrator.push_now(&me()).await.unwrap().unwrap();
        assert_eq!(summary.success, 2);

        assert_eq!(orchestrator.queue_status().await.unwrap().total, 0);
        assert_eq!(remote.paths().await, vec!["trips/t1", "trips/t2"]);
        let sets: Vec<_> = remote
            .writes()
            .await
            .into_iter()
            .skip(2)
            .collect();
        assert_eq!(
            sets,
            vec![
                RemoteCall::Set("trips/t1".to_string()),
                RemoteCall::Set("trips/t2".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_exhausted_entries_stay_queued() {
        let (orchestrator, remote) = setup();
        orchestrator
            .store()
            .lock()
            .await
            .create(Trip::with_id("t1", "Lisbon"), &me())
            .unwrap();
        remote.set_offline(true).await;

        for _ in 0..3 {
            orchestrator.push_now(&me()).await.unwrap();
        }
        remote.set_offline(false).await;

        let summary = orchestrator.push_now(&me()).await.unwrap().unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.success, 0);
        assert!(remote.paths().await.is_empty());

        let status = orchestrator.queue_status().await.unwrap();
        assert_eq!(status.failed, 1);
        assert_eq!(status.pending, 0);
    }

    #[tokio::test]
    async fn test_systemic_pull_failure_is_reported() {
        let (orchestrator, remote) = setup();
        let mut rx = forward_events(&orchestrator);
        remote.set_offline(true).await;

        assert!(orchestrator.pull_now(&me()).await.is_err());
        assert_eq!(orchestrator.status(), SyncStatus::Error);
        assert!(orchestrator.state().history().last_error.is_some());

        let mut saw_error = false;
        while let Ok(event) = rx.try_recv() {
            saw_error |= matches!(event, SyncEvent::Error(_));
        }
        assert!(saw_error);
    }

    #[tokio::test]
    async fn test_independent_orchestrators_do_not_interfere() {
        let (a, _) = setup();
        let (b, _) = setup();

        let _guard = a.state().try_begin(SyncKind::Push).unwrap();
        assert!(a.push_now(&me()).await.unwrap().is_none());
        assert!(b.push_now(&me()).await.unwrap().is_some());
    }

    // ==================== Trigger loop ====================

    #[tokio::test(start_paused = true)]
    async fn test_login_debounce_delays_first_pull() {
        let (orchestrator, _remote) = setup_quiet();
        let mut rx = forward_events(&orchestrator);
        let handle = orchestrator.clone().spawn();

        let started = Instant::now();
        assert!(handle.send(Trigger::Login(me())));

        let mut order = Vec::new();
        while order.len() < 2 {
            match rx.recv().await {
                Some(SyncEvent::PullCompleted(_)) => order.push("pull"),
                Some(SyncEvent::PushCompleted(_)) => order.push("push"),
                Some(_) => {}
                None => panic!("event stream closed"),
            }
        }
        assert_eq!(order, vec!["pull", "push"]);
        assert!(started.elapsed() >= Duration::from_millis(1500));

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_growth_pushes_immediately() {
        let (orchestrator, remote) = setup_quiet();
        let mut rx = forward_events(&orchestrator);
        let handle = orchestrator.clone().spawn();

        handle.send(Trigger::Login(me()));
        assert_eq!(next_push(&mut rx).await.total, 0);

        orchestrator
            .store()
            .lock()
            .await
            .create(Trip::with_id("t1", "Lisbon"), &me())
            .unwrap();
        assert_eq!(next_push(&mut rx).await.success, 1);
        assert_eq!(remote.paths().await, vec!["trips/t1"]);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_edge_growth_does_not_push() {
        let (orchestrator, remote) = setup_quiet();
        let mut rx = forward_events(&orchestrator);
        let handle = orchestrator.clone().spawn();

        handle.send(Trigger::Login(me()));
        next_push(&mut rx).await;

        // First entry fails and stays queued
        remote.set_offline(true).await;
        orchestrator
            .store()
            .lock()
            .await
            .create(Trip::with_id("t1", "Lisbon"), &me())
            .unwrap();
        assert_eq!(next_push(&mut rx).await.failed, 1);

        // 1 -> 2 is not an edge
        orchestrator
            .store()
            .lock()
            .await
            .create(Trip::with_id("t2", "Porto"), &me())
            .unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(drained_pushes(&mut rx), 0);

        remote.set_offline(false).await;
        handle.send(Trigger::PushNow);
        assert_eq!(next_push(&mut rx).await.success, 2);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_backlog_is_not_an_edge() {
        let (orchestrator, remote) = setup_quiet();
        orchestrator
            .store()
            .lock()
            .await
            .create(Trip::with_id("t1", "Lisbon"), &me())
            .unwrap();
        remote.set_offline(true).await;
        for _ in 0..3 {
            orchestrator.push_now(&me()).await.unwrap();
        }
        remote.set_offline(false).await;

        let mut rx = forward_events(&orchestrator);
        let handle = orchestrator.clone().spawn();
        handle.send(Trigger::Login(me()));
        assert_eq!(next_push(&mut rx).await.failed, 1);

        // 1 -> 2 with only an exhausted entry queued before
        orchestrator
            .store()
            .lock()
            .await
            .create(Trip::with_id("t2", "Porto"), &me())
            .unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(drained_pushes(&mut rx), 0);
        assert!(remote.paths().await.is_empty());

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_then_online() {
        let (orchestrator, remote) = setup_quiet();
        let mut rx = forward_events(&orchestrator);
        let handle = orchestrator.clone().spawn();
        let status = handle.status();

        handle.send(Trigger::Login(me()));
        next_push(&mut rx).await;

        handle.send(Trigger::Offline);
        orchestrator
            .store()
            .lock()
            .await
            .create(Trip::with_id("t1", "Lisbon"), &me())
            .unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(drained_pushes(&mut rx), 0);
        assert!(remote.writes().await.is_empty());
        assert_eq!(*status.borrow(), SyncStatus::Offline);

        handle.send(Trigger::Online);
        assert_eq!(next_push(&mut rx).await.success, 1);
        assert_eq!(remote.paths().await, vec!["trips/t1"]);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_pushes_periodically() {
        let (orchestrator, _remote) = setup();
        let mut rx = forward_events(&orchestrator);
        let handle = orchestrator.clone().spawn();

        handle.send(Trigger::Login(me()));
        next_push(&mut rx).await;

        let started = Instant::now();
        next_push(&mut rx).await;
        assert!(started.elapsed() >= Duration::from_secs(25));

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_unsubscribes() {
        let (orchestrator, _remote) = setup_quiet();
        let handle = orchestrator.clone().spawn();
        assert_eq!(orchestrator.events.subscriber_count(), 1);

        handle.shutdown().await;
        assert_eq!(orchestrator.events.subscriber_count(), 0);
    }
}
