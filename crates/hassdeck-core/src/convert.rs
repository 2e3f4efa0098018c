// ── Wire-to-domain conversions ──
//
// Turns `get_states` / `get_services` results and event snapshots from
// `hassdeck_api` into model types. Malformed entries are skipped with a
// debug log; a result of the wrong shape converts to an empty collection.

use hassdeck_api::StateSnapshot;
use serde_json::Value;
use tracing::debug;

use crate::model::{ActionFields, ActionSchema, EntityRecord};

impl From<StateSnapshot> for EntityRecord {
    fn from(snapshot: StateSnapshot) -> Self {
        Self {
            entity_id: snapshot.entity_id,
            state: snapshot.state,
            attributes: snapshot.attributes,
        }
    }
}

/// Convert a `get_states` result (an array of snapshots).
pub fn entities_from_states(result: &Value) -> Vec<EntityRecord> {
    let Some(items) = result.as_array() else {
        debug!(kind = json_kind(result), "get_states result is not an array");
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| match serde_json::from_value::<StateSnapshot>(item.clone()) {
            Ok(snapshot) if snapshot.entity_id.contains('.') => Some(EntityRecord::from(snapshot)),
            _ => {
                debug!(item = %item, "skipping unreadable state snapshot");
                None
            }
        })
        .collect()
}

/// Convert a `get_services` result (`domain → action → schema`).
pub fn actions_from_services(result: &Value) -> ActionSchema {
    let Some(domains) = result.as_object() else {
        debug!(kind = json_kind(result), "get_services result is not an object");
        return ActionSchema::new();
    };

    domains
        .iter()
        .filter_map(|(domain, actions)| {
            let Some(actions) = actions.as_object() else {
                debug!(domain, "skipping domain with no action map");
                return None;
            };
            let fields: ActionFields = actions
                .iter()
                .map(|(name, schema)| (name.clone(), schema.clone()))
                .collect();
            Some((domain.clone(), fields))
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
