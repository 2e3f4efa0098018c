// ── Entity records ──

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// State string for entities the store has not heard of yet.
pub const UNKNOWN_STATE: &str = "unknown";

/// State string for lookups that cannot name an entity at all.
pub const PLACEHOLDER_STATE: &str = "N/A";

/// One entity as mirrored in the [`SyncStore`](crate::SyncStore).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl EntityRecord {
    /// Stand-in for a well-formed id the hub has not reported.
    pub fn unknown(entity_id: &str) -> Self {
        Self {
            entity_id: entity_id.to_owned(),
            state: UNKNOWN_STATE.to_owned(),
            attributes: Map::new(),
        }
    }

    /// Stand-in for an id that is empty or has no domain.
    pub fn placeholder(entity_id: &str) -> Self {
        Self {
            entity_id: entity_id.to_owned(),
            state: PLACEHOLDER_STATE.to_owned(),
            attributes: Map::new(),
        }
    }

    /// The part before the first `.`; empty for malformed ids.
    pub fn domain(&self) -> &str {
        self.entity_id
            .split_once('.')
            .map_or("", |(domain, _)| domain)
    }

    /// `friendly_name` attribute, falling back to the id.
    pub fn friendly_name(&self) -> &str {
        self.attributes
            .get("friendly_name")
            .and_then(Value::as_str)
            .unwrap_or(&self.entity_id)
    }

    /// Attach the live connectivity flag for handing out to consumers.
    pub fn snapshot(&self, connected: bool) -> EntitySnapshot {
        EntitySnapshot {
            entity_id: self.entity_id.clone(),
            state: self.state.clone(),
            attributes: self.attributes.clone(),
            connected,
        }
    }
}

/// What consumers receive: a record plus whether the hub is reachable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntitySnapshot {
    pub entity_id: String,
    pub state: String,
    pub attributes: Map<String, Value>,
    pub connected: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn placeholders() {
        let p = EntityRecord::placeholder("kitchen");
        assert_eq!(p.state, "N/A");
        assert!(p.attributes.is_empty());

        let u = EntityRecord::unknown("light.kitchen");
        assert_eq!(u.state, "unknown");
        assert_eq!(u.domain(), "light");
    }

    #[test]
    fn friendly_name_falls_back_to_id() {
        let mut record = EntityRecord::unknown("light.kitchen");
        assert_eq!(record.friendly_name(), "light.kitchen");

        if let Value::Object(attrs) = json!({ "friendly_name": "Kitchen" }) {
            record.attributes = attrs;
        }
        assert_eq!(record.friendly_name(), "Kitchen");
    }

    #[test]
    fn snapshot_carries_connectivity() {
        let record = EntityRecord::unknown("switch.fan");
        assert!(record.snapshot(true).connected);
        assert!(!record.snapshot(false).connected);
    }
}
