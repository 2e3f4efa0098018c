//! Domain listing.

use hassdeck_core::ConnectionManager;
use serde::Serialize;
use tabled::Tabled;

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

#[derive(Serialize)]
struct DomainSummary {
    domain: String,
    entities: usize,
}

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct DomainRow {
    #[tabled(rename = "Domain")]
    domain: String,
    #[tabled(rename = "Entities")]
    entities: usize,
}

impl From<&DomainSummary> for DomainRow {
    fn from(s: &DomainSummary) -> Self {
        Self {
            domain: s.domain.clone(),
            entities: s.entities,
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(manager: &ConnectionManager, global: &GlobalOpts) -> Result<(), CliError> {
    let mut summaries = Vec::new();
    for domain in manager.get_domains().await {
        let entities = manager.get_entities(&domain).await.len();
        summaries.push(DomainSummary { domain, entities });
    }

    let out = output::render_list(
        global.output,
        &summaries,
        |s| DomainRow::from(s),
        |s| s.domain.clone(),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}
