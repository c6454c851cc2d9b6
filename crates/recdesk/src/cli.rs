//! Clap derive structures for the `recdesk` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// recdesk -- office records from the command line
#[derive(Debug, Parser)]
#[command(
    name = "recdesk",
    version,
    about = "Browse and edit office records from the command line",
    long_about = "A CLI for the office records backend: assets, correspondence,\n\
        case files, orders, users and audit logs.\n\n\
        Sessions refresh transparently; `watch` keeps a polling\n\
        subscription open and prints every change.",
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
    /// Backend profile to use
    #[arg(long, short = 'p', env = "RECDESK_PROFILE", global = true)]
    pub profile: Option<String>,

    /// API base URL (overrides profile)
    #[arg(long, short = 's', env = "RECDESK_SERVER", global = true)]
    pub server: Option<String>,

    /// Login username (overrides profile)
    #[arg(long, short = 'u', env = "RECDESK_USERNAME", global = true, hide_env = true)]
    pub username: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "RECDESK_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "RECDESK_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds (overrides profile)
    #[arg(long, env = "RECDESK_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output Enum ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one identifier per line (scripting)
    Plain,
}

// ── Resource kinds ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ResourceKind {
    #[value(alias = "asset")]
    Assets,
    #[value(alias = "incoming", alias = "in")]
    Incomings,
    #[value(alias = "outgoing", alias = "out")]
    Outgoings,
    DeathCases,
    PrisonCases,
    #[value(alias = "po")]
    PurchaseOrders,
    #[value(alias = "co")]
    CollectionOrders,
    #[value(alias = "user")]
    Users,
    #[value(alias = "log")]
    Logs,
}

impl ResourceKind {
    /// Name as typed on the command line.
    pub fn cli_name(self) -> &'static str {
        match self {
            Self::Assets => "assets",
            Self::Incomings => "incomings",
            Self::Outgoings => "outgoings",
            Self::DeathCases => "death-cases",
            Self::PrisonCases => "prison-cases",
            Self::PurchaseOrders => "purchase-orders",
            Self::CollectionOrders => "collection-orders",
            Self::Users => "users",
            Self::Logs => "logs",
        }
    }
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List every record of a resource
    #[command(alias = "ls")]
    List {
        resource: ResourceKind,
    },

    /// Show one record
    Get {
        resource: ResourceKind,
        /// Record identifier
        id: String,
    },

    /// Create a record from JSON
    Create {
        resource: ResourceKind,
        #[command(flatten)]
        payload: PayloadArgs,
    },

    /// Update a record; fields not given are left as they are
    Update {
        resource: ResourceKind,
        /// Record identifier
        id: String,
        #[command(flatten)]
        payload: PayloadArgs,
    },

    /// Delete a record
    #[command(alias = "rm")]
    Delete {
        resource: ResourceKind,
        /// Record identifier
        id: String,
    },

    /// Poll a resource list and print it every time it changes
    Watch(WatchArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

impl Command {
    /// The resource a record command operates on.
    pub fn resource(&self) -> Option<ResourceKind> {
        match self {
            Self::List { resource }
            | Self::Get { resource, .. }
            | Self::Create { resource, .. }
            | Self::Update { resource, .. }
            | Self::Delete { resource, .. } => Some(*resource),
            Self::Watch(args) => Some(args.resource),
            Self::Config(_) | Self::Completions(_) => None,
        }
    }
}

/// Record fields as inline JSON or a JSON file.
#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
pub struct PayloadArgs {
    /// JSON object with the record fields
    #[arg(long, short = 'd')]
    pub data: Option<String>,

    /// Path to a JSON file with the record fields
    #[arg(long, short = 'f')]
    pub from_file: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    pub resource: ResourceKind,

    /// Polling interval (e.g. "10s", "1m")
    #[arg(long, short = 'i', default_value = "10s", value_parser = humantime::parse_duration)]
    pub interval: Duration,

    /// Stop after this many updates
    #[arg(long, short = 'n')]
    pub count: Option<usize>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create or extend the config file with guided setup
    Init,

    /// Display current configuration (secrets masked)
    Show,

    /// Print the config file path
    Path,

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },

    /// Store the active profile's password in the system keyring
    SetPassword,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  COMPLETIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
