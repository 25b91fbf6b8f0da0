//! # Questline - Achievement Tracker
//!
//! The main binary for the Questline achievement and progression engine.
//!
//! This application provides:
//! - HTTP REST API server (axum-based)
//! - CLI interface for administration and progress recording
//! - TOML catalog seeding
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │              apps/questline (THE BINARY)             │
//! │                                                      │
//! │   ┌─────────────┐   ┌─────────────┐   ┌──────────┐   │
//! │   │    CLI      │   │  HTTP API   │   │ Catalogs │   │
//! │   │   (clap)    │   │   (axum)    │   │  (toml)  │   │
//! │   └──────┬──────┘   └──────┬──────┘   └────┬─────┘   │
//! │          └─────────────────┼───────────────┘         │
//! │                            ▼                         │
//! │                  ┌──────────────────┐                │
//! │                  │  questline-core  │                │
//! │                  │   (THE LOGIC)    │                │
//! │                  └──────────────────┘                │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! questline init
//! questline seed -f apps/questline/catalogs/pets.toml
//! questline authorize game-server
//! questline observe evolution_progression alice -v 2 -c game-server
//! questline server --port 8080
//! ```

use clap::Parser;
use questline::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // QUESTLINE_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("QUESTLINE_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "questline=info,tower_http=debug".into());

    // Logs go to stderr so --json-mode output on stdout stays parseable.
    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!(code = e.code(), "Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the Questline startup banner.
fn print_banner() {
    println!(
        r#"
   ___                  _   _ _
  / _ \ _   _  ___  ___| |_| (_)_ __   ___
 | | | | | | |/ _ \/ __| __| | | '_ \ / _ \
 | |_| | |_| |  __/\__ \ |_| | | | | |  __/
  \__\_\\__,_|\___||___/\__|_|_|_| |_|\___|

  Achievement Tracker v{}

  Milestones • Prerequisites • Rollups
"#,
        env!("CARGO_PKG_VERSION")
    );
}
