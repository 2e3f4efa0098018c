// ── SyncStore ──
//
// Local mirror of the hub: entities grouped by domain, and the action
// schema per domain. Writers are the manager's refresh and event paths;
// readers are any thread. Every mutation bumps a `watch` version so
// consumers can wait for changes without polling.

mod refresh;

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use tokio::sync::watch;

use crate::model::{ActionFields, ActionSchema, EntityRecord};

type Domains = IndexMap<String, IndexMap<String, EntityRecord>>;

/// In-memory cache of entities and action schemas.
#[derive(Debug)]
pub struct SyncStore {
    entities: RwLock<Domains>,
    actions: RwLock<ActionSchema>,
    version: watch::Sender<u64>,
    last_refresh: watch::Sender<Option<DateTime<Utc>>>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl Default for SyncStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncStore {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        let (last_refresh, _) = watch::channel(None);
        Self {
            entities: RwLock::new(IndexMap::new()),
            actions: RwLock::new(IndexMap::new()),
            version,
            last_refresh,
        }
    }

    // ── Entity reads ─────────────────────────────────────────────────

    /// Domains in the order they were first seen.
    pub fn domains(&self) -> Vec<String> {
        read(&self.entities).keys().cloned().collect()
    }

    pub fn entities(&self, domain: &str) -> Vec<EntityRecord> {
        read(&self.entities)
            .get(domain)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn entity(&self, entity_id: &str) -> Option<EntityRecord> {
        let (domain, _) = entity_id.split_once('.')?;
        read(&self.entities)
            .get(domain)
            .and_then(|records| records.get(entity_id))
            .cloned()
    }

    pub fn has_entities(&self) -> bool {
        read(&self.entities).values().any(|records| !records.is_empty())
    }

    pub fn entity_count(&self) -> usize {
        read(&self.entities).values().map(IndexMap::len).sum()
    }

    // ── Action reads ─────────────────────────────────────────────────

    /// Domains that expose at least one action.
    pub fn action_domains(&self) -> Vec<String> {
        read(&self.actions).keys().cloned().collect()
    }

    pub fn actions(&self, domain: &str) -> ActionFields {
        read(&self.actions).get(domain).cloned().unwrap_or_default()
    }

    pub fn has_actions(&self) -> bool {
        !read(&self.actions).is_empty()
    }

    // ── Change tracking ──────────────────────────────────────────────

    /// Monotonic counter bumped on every mutation.
    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    pub fn subscribe_version(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    /// When the last wholesale refresh was applied.
    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        *self.last_refresh.borrow()
    }

    /// Drop everything. Used when the hub changes.
    pub fn clear(&self) {
        write(&self.entities).clear();
        write(&self.actions).clear();
        self.last_refresh.send_replace(None);
        self.bump_version();
    }

    fn bump_version(&self) {
        self.version.send_modify(|v| *v += 1);
    }
}
