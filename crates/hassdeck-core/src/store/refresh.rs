// ── Refresh application logic ──
//
// Wholesale replacement after a bulk load, plus single-entity patches
// from pushed events.

use chrono::Utc;
use indexmap::IndexMap;

use super::{Domains, SyncStore, write};
use crate::model::{ActionSchema, EntityRecord};

/// Group records by domain, keeping first-discovery order of domains.
fn group_by_domain(records: Vec<EntityRecord>) -> Domains {
    let mut domains = Domains::new();
    for record in records {
        let domain = record.domain().to_owned();
        domains
            .entry(domain)
            .or_default()
            .insert(record.entity_id.clone(), record);
    }
    domains
}

impl SyncStore {
    /// Replace every entity with the result of a bulk `get_states`.
    pub fn apply_states(&self, records: Vec<EntityRecord>) {
        let grouped = group_by_domain(records);
        *write(&self.entities) = grouped;
        self.last_refresh.send_replace(Some(Utc::now()));
        self.bump_version();
    }

    /// Replace every action schema with the result of a bulk `get_services`.
    pub fn apply_services(&self, schema: ActionSchema) {
        *write(&self.actions) = schema;
        self.bump_version();
    }

    /// Patch one entity from a pushed event.
    ///
    /// `Some` updates state and attributes in place (inserting the entity if
    /// it is new); `None` means the hub removed it. Returns the record as
    /// stored afterwards.
    pub fn apply_state_change(
        &self,
        entity_id: &str,
        new_state: Option<EntityRecord>,
    ) -> Option<EntityRecord> {
        let (domain, _) = entity_id.split_once('.')?;
        let updated = {
            let mut entities = write(&self.entities);
            match new_state {
                Some(incoming) => {
                    let record = entities
                        .entry(domain.to_owned())
                        .or_default()
                        .entry(entity_id.to_owned())
                        .or_insert_with(|| EntityRecord::unknown(entity_id));
                    record.state = incoming.state;
                    record.attributes = incoming.attributes;
                    Some(record.clone())
                }
                None => {
                    if let Some(records) = entities.get_mut(domain) {
                        records.shift_remove(entity_id);
                        if records.is_empty() {
                            entities.shift_remove(domain);
                        }
                    }
                    None
                }
            }
        };
        self.bump_version();
        updated
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::{Map, Value, json};

    use crate::model::EntityRecord;
    use crate::store::SyncStore;

    fn record(id: &str, state: &str) -> EntityRecord {
        EntityRecord {
            entity_id: id.into(),
            state: state.into(),
            attributes: Map::new(),
        }
    }

    fn attrs(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn domains_keep_first_discovery_order() {
        let store = SyncStore::new();
        store.apply_states(vec![
            record("light.kitchen", "on"),
            record("sensor.outside", "12"),
            record("light.hall", "off"),
        ]);

        assert_eq!(store.domains(), vec!["light", "sensor"]);
        let lights: Vec<String> = store
            .entities("light")
            .into_iter()
            .map(|r| r.entity_id)
            .collect();
        assert_eq!(lights, vec!["light.kitchen", "light.hall"]);
        assert_eq!(store.entity_count(), 3);
        assert!(store.last_refresh().is_some());
    }

    #[test]
    fn bulk_refresh_replaces_wholesale() {
        let store = SyncStore::new();
        store.apply_states(vec![record("light.kitchen", "on"), record("switch.fan", "on")]);
        store.apply_states(vec![record("sensor.outside", "3")]);

        assert_eq!(store.domains(), vec!["sensor"]);
        assert!(store.entity("light.kitchen").is_none());
    }

    #[test]
    fn unknown_domain_is_empty() {
        let store = SyncStore::new();
        assert!(store.entities("climate").is_empty());
        assert!(store.actions("climate").is_empty());
        assert!(!store.has_entities());
        assert!(!store.has_actions());
    }

    #[test]
    fn state_change_patches_in_place() {
        let store = SyncStore::new();
        store.apply_states(vec![record("light.kitchen", "off")]);
        let before = store.version();

        let mut incoming = record("light.kitchen", "on");
        incoming.attributes = attrs(json!({ "brightness": 180 }));
        let updated = store.apply_state_change("light.kitchen", Some(incoming)).unwrap();

        assert_eq!(updated.state, "on");
        assert_eq!(store.entity("light.kitchen").unwrap().attributes["brightness"], 180);
        assert!(store.version() > before);
    }

    #[test]
    fn state_change_inserts_new_entities() {
        let store = SyncStore::new();
        store.apply_state_change("cover.garage", Some(record("cover.garage", "open")));
        assert_eq!(store.domains(), vec!["cover"]);
        assert_eq!(store.entity("cover.garage").unwrap().state, "open");
    }

    #[test]
    fn removed_entity_is_dropped() {
        let store = SyncStore::new();
        store.apply_states(vec![record("light.kitchen", "off")]);
        assert!(store.apply_state_change("light.kitchen", None).is_none());
        assert!(store.entity("light.kitchen").is_none());
        assert!(store.domains().is_empty());
    }

    #[test]
    fn malformed_ids_are_ignored() {
        let store = SyncStore::new();
        assert!(store.apply_state_change("nodomain", Some(record("nodomain", "on"))).is_none());
        assert!(store.entity("nodomain").is_none());
        assert!(store.domains().is_empty());
    }

    #[test]
    fn services_replace_schema() {
        let store = SyncStore::new();
        let mut schema = crate::model::ActionSchema::new();
        schema
            .entry("light".into())
            .or_default()
            .insert("turn_on".into(), json!({ "fields": {} }));
        store.apply_services(schema);

        assert_eq!(store.action_domains(), vec!["light"]);
        assert_eq!(store.actions("light")["turn_on"], json!({ "fields": {} }));
    }

    #[test]
    fn clear_resets_everything() {
        let store = SyncStore::new();
        store.apply_states(vec![record("light.kitchen", "off")]);
        store.clear();
        assert!(!store.has_entities());
        assert!(store.last_refresh().is_none());
    }

    #[tokio::test]
    async fn version_watch_wakes_subscribers() {
        let store = SyncStore::new();
        let mut rx = store.subscribe_version();
        store.apply_states(vec![record("light.kitchen", "off")]);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), store.version());
    }
}
