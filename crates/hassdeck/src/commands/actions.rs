//! Action (service) listing.

use hassdeck_core::ConnectionManager;
use serde::Serialize;
use serde_json::Value;
use tabled::Tabled;

use crate::cli::{ActionsArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

#[derive(Serialize)]
struct ActionDomain {
    domain: String,
    actions: usize,
}

#[derive(Serialize)]
struct ActionSummary {
    action: String,
    description: String,
    fields: Vec<String>,
}

impl ActionSummary {
    fn from_schema(action: &str, schema: &Value) -> Self {
        let description = schema
            .get("description")
            .or_else(|| schema.get("name"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        let fields = schema
            .get("fields")
            .and_then(Value::as_object)
            .map(|fields| fields.keys().cloned().collect())
            .unwrap_or_default();
        Self {
            action: action.to_owned(),
            description,
            fields,
        }
    }
}

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct DomainRow {
    #[tabled(rename = "Domain")]
    domain: String,
    #[tabled(rename = "Actions")]
    actions: usize,
}

#[derive(Tabled)]
struct ActionRow {
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Fields")]
    fields: String,
    #[tabled(rename = "Description")]
    description: String,
}

impl From<&ActionSummary> for ActionRow {
    fn from(a: &ActionSummary) -> Self {
        Self {
            action: a.action.clone(),
            fields: a.fields.join(", "),
            description: a.description.clone(),
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    manager: &ConnectionManager,
    args: ActionsArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let out = match args.domain {
        None => {
            let mut domains = Vec::new();
            for domain in manager.get_domains_for_actions().await {
                let actions = manager.get_actions(&domain).await.len();
                domains.push(ActionDomain { domain, actions });
            }
            output::render_list(
                global.output,
                &domains,
                |d| DomainRow {
                    domain: d.domain.clone(),
                    actions: d.actions,
                },
                |d| d.domain.clone(),
            )
        }
        Some(domain) => {
            let fields = manager.get_actions(&domain).await;
            if fields.is_empty() {
                return Err(CliError::NotFound {
                    resource_type: "action domain".into(),
                    identifier: domain,
                    list_command: "actions".into(),
                });
            }
            let actions: Vec<ActionSummary> = fields
                .iter()
                .map(|(action, schema)| ActionSummary::from_schema(action, schema))
                .collect();
            output::render_list(
                global.output,
                &actions,
                |a| ActionRow::from(a),
                |a| a.action.clone(),
            )
        }
    };
    output::print_output(&out, global.quiet);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn summary_reads_description_and_fields() {
        let schema = json!({
            "name": "Turn on",
            "description": "Turns on one or more lights.",
            "fields": { "brightness": {}, "transition": {} }
        });
        let summary = ActionSummary::from_schema("turn_on", &schema);
        assert_eq!(summary.description, "Turns on one or more lights.");
        assert_eq!(summary.fields, vec!["brightness", "transition"]);
    }

    #[test]
    fn summary_tolerates_bare_schema() {
        let summary = ActionSummary::from_schema("toggle", &json!({}));
        assert!(summary.description.is_empty());
        assert!(summary.fields.is_empty());
    }
}
