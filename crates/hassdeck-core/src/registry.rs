// ── SubscriptionRegistry ──
//
// Which local callbacks watch which entity, and the hub-side subscription
// id backing each tracked entity. The registry itself never talks to the
// hub: it reports when a subscribe or unsubscribe is due and the manager
// issues it.

use dashmap::DashMap;

use crate::callback::EntityCallback;

#[derive(Debug, Default)]
struct Tracked {
    callbacks: Vec<EntityCallback>,
    /// `None` when the hub is not currently pushing changes for this id.
    subscription: Option<u64>,
}

/// Outcome of [`SubscriptionRegistry::remove`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// The (id, callback) pair was not registered.
    NotTracked,
    /// Other callbacks still watch the id.
    Remaining(usize),
    /// That was the last callback; the entry is gone. Carries the hub
    /// subscription to cancel, if one was active.
    Last { subscription: Option<u64> },
}

/// Per-entity callback sets and their remote subscription ids.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: DashMap<String, Tracked>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback. Returns `true` when it is the first one for the
    /// id, i.e. a remote subscribe is now due.
    pub fn add(&self, entity_id: &str, callback: EntityCallback) -> bool {
        let mut entry = self.entries.entry(entity_id.to_owned()).or_default();
        if entry.callbacks.contains(&callback) {
            return false;
        }
        entry.callbacks.push(callback);
        entry.callbacks.len() == 1
    }

    pub fn remove(&self, entity_id: &str, callback: &EntityCallback) -> Removal {
        let remaining = {
            let Some(mut entry) = self.entries.get_mut(entity_id) else {
                return Removal::NotTracked;
            };
            let before = entry.callbacks.len();
            entry.callbacks.retain(|c| c != callback);
            if entry.callbacks.len() == before {
                return Removal::NotTracked;
            }
            entry.callbacks.len()
        };

        if remaining > 0 {
            return Removal::Remaining(remaining);
        }
        match self
            .entries
            .remove_if(entity_id, |_, tracked| tracked.callbacks.is_empty())
        {
            Some((_, tracked)) => Removal::Last {
                subscription: tracked.subscription,
            },
            // Re-registered between the two steps.
            None => Removal::Remaining(self.callback_count(entity_id)),
        }
    }

    /// Record the subscription id for a tracked entity.
    ///
    /// Returns `false` without storing when the entity is no longer tracked
    /// or is already subscribed; the caller then owns `subscription` and
    /// should cancel it on the hub.
    pub fn set_subscription(&self, entity_id: &str, subscription: u64) -> bool {
        match self.entries.get_mut(entity_id) {
            Some(mut entry) if !entry.callbacks.is_empty() && entry.subscription.is_none() => {
                entry.subscription = Some(subscription);
                true
            }
            _ => false,
        }
    }

    /// Drop `subscription` if it is still the one recorded for the id.
    pub fn clear_subscription(&self, entity_id: &str, subscription: u64) {
        if let Some(mut entry) = self.entries.get_mut(entity_id) {
            if entry.subscription == Some(subscription) {
                entry.subscription = None;
            }
        }
    }

    /// Forget every subscription id. Callback sets are kept for replay.
    pub fn invalidate(&self) {
        for mut entry in self.entries.iter_mut() {
            entry.subscription = None;
        }
    }

    /// Ids that have callbacks but no live subscription.
    pub fn replay_targets(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .entries
            .iter()
            .filter(|e| !e.callbacks.is_empty() && e.subscription.is_none())
            .map(|e| e.key().clone())
            .collect();
        ids.sort();
        ids
    }

    /// Snapshot of the callbacks for one id, safe to invoke without locks.
    pub fn callbacks(&self, entity_id: &str) -> Vec<EntityCallback> {
        self.entries
            .get(entity_id)
            .map(|e| e.callbacks.clone())
            .unwrap_or_default()
    }

    pub fn subscription(&self, entity_id: &str) -> Option<u64> {
        self.entries.get(entity_id).and_then(|e| e.subscription)
    }

    pub fn callback_count(&self, entity_id: &str) -> usize {
        self.entries.get(entity_id).map_or(0, |e| e.callbacks.len())
    }

    pub fn is_tracked(&self, entity_id: &str) -> bool {
        self.callback_count(entity_id) > 0
    }

    /// Every tracked id, sorted.
    pub fn tracked_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }
}
