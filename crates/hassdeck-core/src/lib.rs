//! Connection and synchronization layer between `hassdeck-api` and its
//! consumers (the CLI, or a control-surface host).
//!
//! - **[`ConnectionManager`]**: owns the channel lifecycle. It connects,
//!   reacts to the hub accepting the token, reconnects with a constant
//!   backoff, and exposes the query and command surface.
//! - **[`SyncStore`]**: the local mirror of entities and action schemas,
//!   refreshed wholesale after every connect and patched by events.
//! - **[`SubscriptionRegistry`]**: which local callbacks watch which entity,
//!   and the hub-side subscription backing each tracked entity.
//! - **Domain model** ([`model`]): [`EntityId`], [`EntityRecord`],
//!   [`EntitySnapshot`] and [`ActionSchema`].

pub mod callback;
pub mod config;
pub mod convert;
pub mod error;
pub mod manager;
pub mod model;
pub mod registry;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use callback::{Callback, EntityCallback, ReadyCallback, StatusCallback};
pub use config::ConnectionConfig;
pub use error::CoreError;
pub use manager::{ConnectionManager, ConnectionState};
pub use model::{ActionSchema, EntityId, EntityRecord, EntitySnapshot};
pub use registry::SubscriptionRegistry;
pub use store::SyncStore;
