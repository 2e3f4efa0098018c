// ── Domain model ──
//
// Canonical shapes for hub data as the rest of the workspace sees it.
// Wire snapshots from `hassdeck-api` are converted into these in `convert`.

pub mod action;
pub mod entity;
pub mod entity_id;

// ── Re-exports ──────────────────────────────────────────────────────

pub use action::{ActionFields, ActionSchema};
pub use entity::{EntityRecord, EntitySnapshot};
pub use entity_id::EntityId;
