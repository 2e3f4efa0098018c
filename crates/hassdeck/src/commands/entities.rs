//! Entity listing and detail.

use std::fmt::Write as _;

use hassdeck_core::{ConnectionManager, EntityRecord, EntitySnapshot};
use serde_json::Value;
use tabled::Tabled;

use crate::cli::{EntitiesArgs, EntityArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct EntityRow {
    #[tabled(rename = "Entity")]
    entity_id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "State")]
    state: String,
}

impl From<&EntityRecord> for EntityRow {
    fn from(r: &EntityRecord) -> Self {
        Self {
            entity_id: r.entity_id.clone(),
            name: r.friendly_name().to_owned(),
            state: r.state.clone(),
        }
    }
}

fn detail(s: &EntitySnapshot) -> String {
    let mut out = format!("Entity:     {}\n", s.entity_id);
    if let Some(name) = s.attributes.get("friendly_name").and_then(Value::as_str) {
        let _ = writeln!(out, "Name:       {name}");
    }
    let _ = write!(out, "State:      {}", s.state);
    if !s.connected {
        out.push_str(" (stale, hub disconnected)");
    }
    let extra: Vec<_> = s
        .attributes
        .iter()
        .filter(|(key, _)| key.as_str() != "friendly_name")
        .collect();
    if !extra.is_empty() {
        out.push_str("\nAttributes:");
        for (key, value) in extra {
            let _ = write!(out, "\n  {key}: {}", output::value_text(value));
        }
    }
    out
}

// ── Handlers ────────────────────────────────────────────────────────

pub async fn list(
    manager: &ConnectionManager,
    args: EntitiesArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let records = manager.get_entities(&args.domain).await;
    if records.is_empty() {
        return Err(CliError::NotFound {
            resource_type: "domain".into(),
            identifier: args.domain,
            list_command: "domains".into(),
        });
    }

    let out = output::render_list(
        global.output,
        &records,
        |r| EntityRow::from(r),
        |r| r.entity_id.clone(),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn show(
    manager: &ConnectionManager,
    args: EntityArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let id = util::parse_entity_id(&args.entity_id)?;
    // Ensures the mirror is loaded before the synchronous lookup.
    let known = manager
        .get_entities(id.domain())
        .await
        .iter()
        .any(|r| r.entity_id == id.as_str());
    if !known {
        return Err(CliError::NotFound {
            resource_type: "entity".into(),
            identifier: args.entity_id,
            list_command: format!("entities {}", id.domain()),
        });
    }

    let snapshot = manager.get_entity(id.as_str());
    let out = output::render_single(global.output, &snapshot, detail, |s| s.state.clone());
    output::print_output(&out, global.quiet);
    Ok(())
}
