//! Command dispatch: bridges CLI args -> manager queries -> output formatting.

pub mod actions;
pub mod call;
pub mod config_cmd;
pub mod domains;
pub mod entities;
pub mod util;
pub mod watch;

use hassdeck_core::ConnectionManager;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a hub-bound command to its handler.
pub async fn dispatch(
    cmd: Command,
    manager: &ConnectionManager,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Domains => domains::handle(manager, global).await,
        Command::Entities(args) => entities::list(manager, args, global).await,
        Command::Entity(args) => entities::show(manager, args, global).await,
        Command::Actions(args) => actions::handle(manager, args, global).await,
        Command::Call(args) => call::handle(manager, args, global).await,
        Command::Watch(args) => watch::handle(manager, args, global).await,
        // Handled before a connection is opened
        Command::Config(_) | Command::Completions(_) => Ok(()),
    }
}
