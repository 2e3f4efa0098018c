//! Perform an action against an entity.

use hassdeck_core::ConnectionManager;
use serde_json::Value;

use crate::cli::{CallArgs, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

use super::util;

/// Parse `--data`: absent means no data, otherwise a JSON object.
fn parse_data(raw: Option<&str>) -> Result<Value, CliError> {
    let Some(raw) = raw else {
        return Ok(Value::Null);
    };
    let value: Value = serde_json::from_str(raw).map_err(|e| CliError::Validation {
        field: "data".into(),
        reason: format!("invalid JSON: {e}"),
    })?;
    if value.is_object() {
        Ok(value)
    } else {
        Err(CliError::Validation {
            field: "data".into(),
            reason: "expected a JSON object".into(),
        })
    }
}

pub async fn handle(
    manager: &ConnectionManager,
    args: CallArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let data = parse_data(args.data.as_deref())?;
    let id = util::parse_entity_id(&args.entity_id)?;

    let result = manager
        .call_action(&args.domain, &args.action, id.as_str(), data)
        .await?;

    match global.output {
        OutputFormat::Json => output::print_output(&output::render_json(&result, false), global.quiet),
        OutputFormat::JsonCompact => {
            output::print_output(&output::render_json(&result, true), global.quiet);
        }
        OutputFormat::Table | OutputFormat::Plain => {
            if !global.quiet {
                eprintln!("Called {}.{} on {id}", args.domain, args.action);
            }
        }
    }
    Ok(())
}
