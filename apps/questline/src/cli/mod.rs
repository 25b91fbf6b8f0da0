//! # Questline CLI Module
//!
//! This module implements the CLI interface for Questline.
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `status` - Show tracker summary
//! - `init` - Initialize a new database
//! - `seed` - Configure achievements from a TOML catalog
//! - `authorize` / `revoke` - Manage the allow-list
//! - `enable` / `disable` / `metadata` - Administer one achievement
//! - `progress` / `observe` / `unlock` - Record progress
//! - `show` - Show an achievement, or one participant's progress on it
//! - `categories` - Category totals, or one participant's rollups
//! - `completed` - Achievements a participant has completed
//! - `export` / `import` - Snapshot files

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use questline_core::{Principal, QuestError};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Questline - achievement and progression tracker
///
/// Records per-participant progress toward achievements, unlocks
/// milestones, and reports category rollups.
#[derive(Parser, Debug)]
#[command(name = "questline")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the tracker database
    #[arg(short = 'D', long, global = true, default_value = "questline.db")]
    pub database: PathBuf,

    /// Storage backend
    #[arg(short = 'B', long, global = true, value_enum, default_value_t = Backend::Redb)]
    pub backend: Backend,

    /// Administrator principal (key or 64-char hex)
    #[arg(short = 'A', long, global = true, default_value = "admin")]
    pub admin: String,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Storage backend of the database file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// ACID redb database
    Redb,
    /// In-memory tracker saved as a snapshot file after each change
    Memory,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Redb => f.write_str("redb"),
            Backend::Memory => f.write_str("memory"),
        }
    }
}

/// Where and as whom a command runs.
#[derive(Debug, Clone)]
pub struct Context {
    pub database: PathBuf,
    pub backend: Backend,
    pub admin: Principal,
    pub json_mode: bool,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        /// Host to bind to
        #[arg(short = 'H', long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },

    /// Show tracker summary
    Status,

    /// Initialize a new empty database
    Init {
        /// Overwrite an existing database
        #[arg(short, long)]
        force: bool,
    },

    /// Configure achievements from a TOML catalog, in file order
    Seed {
        /// Path to the catalog file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Add a principal to the allow-list
    Authorize {
        /// Principal key or hex id
        principal: String,
    },

    /// Remove a principal from the allow-list
    Revoke {
        /// Principal key or hex id
        principal: String,
    },

    /// Enable an achievement
    Enable {
        achievement: String,
    },

    /// Disable an achievement (progress is kept)
    Disable {
        achievement: String,
    },

    /// Read or set achievement metadata
    Metadata {
        achievement: String,

        /// Attribute key (all attributes when omitted)
        key: Option<String>,

        /// New value (reads the attribute when omitted)
        value: Option<String>,
    },

    /// Add to a progression achievement
    Progress {
        achievement: String,
        participant: String,

        /// Amount to add (must be positive)
        #[arg(short, long, default_value = "1")]
        delta: u64,

        /// Authorized caller principal
        #[arg(short, long)]
        caller: String,
    },

    /// Report an absolute value; counted once per new high
    Observe {
        achievement: String,
        participant: String,

        /// Observed value
        #[arg(short = 'v', long)]
        value: u64,

        /// Authorized caller principal
        #[arg(short, long)]
        caller: String,
    },

    /// Unlock a one-time achievement
    Unlock {
        achievement: String,
        participant: String,

        /// Authorized caller principal
        #[arg(short, long)]
        caller: String,
    },

    /// Show an achievement, or a participant's progress on it
    Show {
        achievement: String,
        participant: Option<String>,
    },

    /// Category totals, or a participant's category rollups
    Categories {
        /// Participant key or hex id
        #[arg(short, long)]
        participant: Option<String>,

        /// Limit to one category
        #[arg(short = 'k', long)]
        category: Option<String>,
    },

    /// List achievements a participant has completed
    Completed {
        participant: String,
    },

    /// Export a snapshot file
    Export {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Import a snapshot file into the database
    Import {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), QuestError> {
    let ctx = Context {
        database: cli.database,
        backend: cli.backend,
        admin: Principal::resolve(&cli.admin),
        json_mode: cli.json_mode,
    };

    match cli.command {
        Some(Commands::Server { host, port }) => cmd_server(&ctx, &host, port).await,
        Some(Commands::Status) | None => cmd_status(&ctx),
        Some(Commands::Init { force }) => cmd_init(&ctx, force),
        Some(Commands::Seed { file }) => cmd_seed(&ctx, &file),
        Some(Commands::Authorize { principal }) => cmd_authorize(&ctx, &principal, true),
        Some(Commands::Revoke { principal }) => cmd_authorize(&ctx, &principal, false),
        Some(Commands::Enable { achievement }) => cmd_set_enabled(&ctx, &achievement, true),
        Some(Commands::Disable { achievement }) => cmd_set_enabled(&ctx, &achievement, false),
        Some(Commands::Metadata {
            achievement,
            key,
            value,
        }) => cmd_metadata(&ctx, &achievement, key.as_deref(), value.as_deref()),
        Some(Commands::Progress {
            achievement,
            participant,
            delta,
            caller,
        }) => cmd_progress(
            &ctx,
            &caller,
            &achievement,
            &participant,
            ProgressAction::Add(delta),
        ),
        Some(Commands::Observe {
            achievement,
            participant,
            value,
            caller,
        }) => cmd_progress(
            &ctx,
            &caller,
            &achievement,
            &participant,
            ProgressAction::Observe(value),
        ),
        Some(Commands::Unlock {
            achievement,
            participant,
            caller,
        }) => cmd_progress(
            &ctx,
            &caller,
            &achievement,
            &participant,
            ProgressAction::Unlock,
        ),
        Some(Commands::Show {
            achievement,
            participant,
        }) => cmd_show(&ctx, &achievement, participant.as_deref()),
        Some(Commands::Categories {
            participant,
            category,
        }) => cmd_categories(&ctx, participant.as_deref(), category.as_deref()),
        Some(Commands::Completed { participant }) => cmd_completed(&ctx, &participant),
        Some(Commands::Export { output }) => cmd_export(&ctx, &output),
        Some(Commands::Import { input }) => cmd_import(&ctx, &input),
    }
}
