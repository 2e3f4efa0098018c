//! Clap derive structures for the `hassdeck` CLI.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// hassdeck -- talk to a Home Assistant hub over its WebSocket API
#[derive(Debug, Parser)]
#[command(
    name = "hassdeck",
    version,
    about = "Browse entities, call actions, and watch state on a Home Assistant hub",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Hub profile to use
    #[arg(long, short = 'p', env = "HASSDECK_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Hub hostname or IP (overrides profile)
    #[arg(long, env = "HASSDECK_HOST", global = true)]
    pub host: Option<String>,

    /// Hub port (default 8123)
    #[arg(long, env = "HASSDECK_PORT", global = true)]
    pub port: Option<u16>,

    /// Long-lived access token
    #[arg(long, env = "HASSDECK_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Connect with plain ws:// instead of wss://
    #[arg(long, env = "HASSDECK_NO_TLS", global = true)]
    pub no_tls: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "HASSDECK_INSECURE", global = true)]
    pub insecure: bool,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "HASSDECK_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Seconds to wait for the hub to become ready
    #[arg(long, env = "HASSDECK_TIMEOUT", default_value = "10", global = true)]
    pub timeout: u64,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List entity domains
    Domains,

    /// List the entities of one domain
    #[command(alias = "ls")]
    Entities(EntitiesArgs),

    /// Show one entity's state and attributes
    #[command(alias = "get")]
    Entity(EntityArgs),

    /// List action domains, or the actions of one domain
    Actions(ActionsArgs),

    /// Perform an action against an entity
    Call(CallArgs),

    /// Stream state changes for entities until interrupted
    Watch(WatchArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct EntitiesArgs {
    /// Domain, e.g. "light"
    pub domain: String,
}

#[derive(Debug, Args)]
pub struct EntityArgs {
    /// Entity id, e.g. "light.kitchen"
    pub entity_id: String,
}

#[derive(Debug, Args)]
pub struct ActionsArgs {
    /// Only list actions of this domain
    pub domain: Option<String>,
}

#[derive(Debug, Args)]
pub struct CallArgs {
    /// Action domain, e.g. "light"
    pub domain: String,

    /// Action name, e.g. "turn_on"
    pub action: String,

    /// Target entity id
    pub entity_id: String,

    /// Action data as a JSON object, e.g. '{"brightness": 120}'
    #[arg(long, short = 'd')]
    pub data: Option<String>,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Entity ids to watch
    #[arg(required = true)]
    pub entity_ids: Vec<String>,

    /// Exit after this many updates
    #[arg(long, short = 'n')]
    pub count: Option<usize>,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,

    /// Display the current configuration (tokens redacted)
    Show,

    /// Write a profile from --host/--port/--token and friends
    Init {
        /// Environment variable to read the token from instead of --token
        #[arg(long)]
        token_env: Option<String>,

        /// Store the token in the system keyring instead of the file
        #[arg(long)]
        keyring: bool,

        /// Overwrite an existing profile of the same name
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
