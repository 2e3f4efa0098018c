//! Stream state changes for tracked entities.

use hassdeck_core::{Callback, ConnectionManager, EntityCallback, EntitySnapshot};
use tokio::sync::mpsc;

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

use super::util;

fn render_update(snapshot: &EntitySnapshot, format: OutputFormat, color: bool) -> String {
    match format {
        // One object per line so the stream stays parseable.
        OutputFormat::Json | OutputFormat::JsonCompact => output::render_json(snapshot, true),
        OutputFormat::Plain => format!("{}\t{}", snapshot.entity_id, snapshot.state),
        OutputFormat::Table => format!(
            "{}  {:<32} {}",
            chrono::Local::now().format("%H:%M:%S"),
            snapshot.entity_id,
            output::paint_state(&snapshot.state, color),
        ),
    }
}

pub async fn handle(
    manager: &ConnectionManager,
    args: WatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    for raw in &args.entity_ids {
        util::parse_entity_id(raw)?;
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<EntitySnapshot>();
    let callback: EntityCallback = Callback::new(move |snapshot: &EntitySnapshot| {
        let _ = tx.send(snapshot.clone());
    });

    let color = output::should_color(global.color);
    for entity_id in &args.entity_ids {
        // Baseline before the first change arrives.
        if global.output == OutputFormat::Table {
            let current = manager.get_entity(entity_id);
            output::print_output(&render_update(&current, global.output, color), global.quiet);
        }
        manager.add_tracked_entity(entity_id, callback.clone()).await;
    }
    tracing::info!(entities = args.entity_ids.len(), "watching for changes");

    let mut seen = 0usize;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            update = rx.recv() => {
                let Some(snapshot) = update else { break };
                output::print_output(&render_update(&snapshot, global.output, color), global.quiet);
                seen += 1;
                if args.count.is_some_and(|limit| seen >= limit) {
                    break;
                }
            }
        }
    }

    for entity_id in &args.entity_ids {
        manager.remove_tracked_entity(entity_id, &callback).await;
    }
    Ok(())
}
