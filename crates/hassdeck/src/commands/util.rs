//! Shared helpers for command handlers.

use std::sync::Arc;
use std::time::Duration;

use hassdeck_core::{Callback, ConnectionManager, CoreError, EntityId, ReadyCallback};
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::CliError;

/// How often the wait loop checks for a rejected token.
const POLL: Duration = Duration::from_millis(100);

/// Connect and wait until the manager reports ready (bulk load done).
///
/// Fails fast on a rejected token; otherwise waits up to `timeout_secs`.
pub async fn connect_and_wait(
    manager: &ConnectionManager,
    profile: &str,
    timeout_secs: u64,
) -> Result<(), CliError> {
    let ready = Arc::new(Notify::new());
    let signal = Arc::clone(&ready);
    let callback: ReadyCallback = Callback::new(move |()| signal.notify_one());
    manager.add_ready_callback(callback.clone());
    manager.connect();

    let deadline = Instant::now() + Duration::from_secs(timeout_secs.max(1));
    let outcome = loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break Err(not_ready(manager, timeout_secs));
        }
        if tokio::time::timeout(remaining.min(POLL), ready.notified())
            .await
            .is_ok()
        {
            break Ok(());
        }
        if let Some(CoreError::AuthenticationFailed { .. }) = manager.last_error() {
            break Err(CliError::AuthFailed {
                profile: profile.to_owned(),
            });
        }
    };

    manager.remove_ready_callback(&callback);
    if outcome.is_err() {
        manager.shutdown();
    }
    outcome
}

fn not_ready(manager: &ConnectionManager, timeout_secs: u64) -> CliError {
    match manager.last_error() {
        Some(CoreError::ConnectionFailed { url, reason }) => {
            CliError::ConnectionFailed { url, reason }
        }
        Some(CoreError::Config { message }) => CliError::Config { message },
        _ => CliError::Timeout {
            seconds: timeout_secs,
        },
    }
}

/// Validate a `<domain>.<name>` argument.
pub fn parse_entity_id(raw: &str) -> Result<EntityId, CliError> {
    EntityId::parse(raw).map_err(CliError::from)
}
