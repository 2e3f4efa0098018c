// ── Callback handles ──
//
// Consumers register plain closures; the registries need to compare them
// for removal and deduplication. A `Callback` wraps the closure in an `Arc`
// and compares by pointer, so the handle a consumer keeps is the handle it
// can later remove.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Shared, comparable handle to a callback taking `&A`.
pub struct Callback<A: ?Sized + 'static>(Arc<dyn Fn(&A) + Send + Sync>);

/// Invoked with the latest snapshot of a tracked entity.
pub type EntityCallback = Callback<crate::model::EntitySnapshot>;

/// Invoked every time the manager reaches the connected state.
pub type ReadyCallback = Callback<()>;

/// Invoked with the status text on every connection-state change.
pub type StatusCallback = Callback<str>;

impl<A: ?Sized + 'static> Callback<A> {
    pub fn new(f: impl Fn(&A) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn call(&self, arg: &A) {
        (self.0)(arg);
    }
}

impl<A: ?Sized + 'static> Clone for Callback<A> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<A: ?Sized + 'static> PartialEq for Callback<A> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.0), Arc::as_ptr(&other.0))
    }
}

impl<A: ?Sized + 'static> Eq for Callback<A> {}

impl<A: ?Sized + 'static> fmt::Debug for Callback<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callback({:p})", Arc::as_ptr(&self.0))
    }
}

// ── CallbackSet ──────────────────────────────────────────────────────

/// Deduplicating set of callbacks, safe to mutate from any thread.
///
/// Registering the same handle twice keeps one entry. Dispatch iterates a
/// snapshot, so callbacks may add or remove handles while being invoked.
pub struct CallbackSet<A: ?Sized + 'static> {
    entries: RwLock<Vec<Callback<A>>>,
}

impl<A: ?Sized + 'static> Default for CallbackSet<A> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }
}

impl<A: ?Sized + 'static> fmt::Debug for CallbackSet<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackSet")
            .field("len", &self.len())
            .finish()
    }
}

impl<A: ?Sized + 'static> CallbackSet<A> {
    /// Returns `false` if the handle was already present.
    pub fn insert(&self, callback: Callback<A>) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.contains(&callback) {
            return false;
        }
        entries.push(callback);
        true
    }

    /// Returns `false` if the handle was not present.
    pub fn remove(&self, callback: &Callback<A>) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|c| c != callback);
        entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<Callback<A>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Invoke every registered callback outside the lock.
    pub fn call_all(&self, arg: &A) {
        for callback in self.snapshot() {
            callback.call(arg);
        }
    }
}
