//! Sync events
//!
//! A plain callback bus that any UI layer can adapt to its own reactivity
//! model. Callbacks run synchronously on the emitting task, so they should
//! return quickly (forward into a channel if real work is needed).

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;

use crate::sync::{PullSummary, PushSummary};

/// Overall state of the sync engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// No identity; nothing is scheduled
    SignedOut,
    /// Network reported down; automatic pushes are suppressed
    Offline,
    /// Signed in and online, nothing running
    Idle,
    /// A push or pull is in flight
    Syncing,
    /// The last run failed outright
    Error,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::SignedOut => "signed out",
            SyncStatus::Offline => "offline",
            SyncStatus::Idle => "idle",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Error => "error",
        }
    }
}

/// Events emitted by the store and the orchestrator
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// The queue was written to; `pending` is the new total
    QueueChanged { pending: usize },
    StatusChanged(SyncStatus),
    PushCompleted(PushSummary),
    PullCompleted(PullSummary),
    /// A run failed outright
    Error(String),
}

/// Handle returned by [`EventBus::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Arc<dyn Fn(&SyncEvent) + Send + Sync>;

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    callbacks: Vec<(SubscriptionId, Callback)>,
}

/// Cloneable fan-out of [`SyncEvent`]s to registered callbacks
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<Subscribers>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for every future event
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        let mut subs = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let id = SubscriptionId(subs.next_id);
        subs.next_id += 1;
        subs.callbacks.push((id, Arc::new(callback)));
        id
    }

    /// Remove a callback; returns false if it was not registered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let before = subs.callbacks.len();
        subs.callbacks.retain(|(sid, _)| *sid != id);
        subs.callbacks.len() != before
    }

    /// Deliver an event to every subscriber
    pub fn emit(&self, event: SyncEvent) {
        // Callbacks run outside the lock so they may subscribe or unsubscribe
        let callbacks: Vec<Callback> = {
            let subs = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            subs.callbacks.iter().map(|(_, cb)| cb.clone()).collect()
        };

        for callback in callbacks {
            callback(&event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .callbacks
            .len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(bus: &EventBus) -> (SubscriptionId, Arc<Mutex<Vec<SyncEvent>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let id = bus.subscribe(move |event| sink.lock().unwrap().push(event.clone()));
        (id, seen)
    }

    #[test]
    fn test_emit_reaches_all_subscribers() {
        let bus = EventBus::new();
        let (_, a) = recorder(&bus);
        let (_, b) = recorder(&bus);

        bus.emit(SyncEvent::QueueChanged { pending: 2 });

        assert_eq!(a.lock().unwrap().as_slice(), &[SyncEvent::QueueChanged { pending: 2 }]);
        assert_eq!(b.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = EventBus::new();
        let (id, seen) = recorder(&bus);

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.emit(SyncEvent::StatusChanged(SyncStatus::Idle));

        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_clones_share_subscribers() {
        let bus = EventBus::new();
        let (_, seen) = recorder(&bus);

        bus.clone().emit(SyncEvent::Error("offline".to_string()));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_callback_may_unsubscribe_itself() {
        let bus = EventBus::new();
        let slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));
        let inner_bus = bus.clone();
        let inner_slot = slot.clone();
        let id = bus.subscribe(move |_| {
            if let Some(id) = inner_slot.lock().unwrap().take() {
                inner_bus.unsubscribe(id);
            }
        });
        *slot.lock().unwrap() = Some(id);

        bus.emit(SyncEvent::StatusChanged(SyncStatus::Syncing));
        assert_eq!(bus.subscriber_count(), 0);
    }
}
