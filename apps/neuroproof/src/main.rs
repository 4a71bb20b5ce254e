//! # neuroproof
//!
//! The binary of the neuroproof merge engine.
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │               apps/neuroproof                 │
//! │                                               │
//! │   ┌─────────────┐        ┌─────────────┐      │
//! │   │    CLI      │        │  HTTP API   │      │
//! │   │   (clap)    │        │   (axum)    │      │
//! │   └──────┬──────┘        └──────┬──────┘      │
//! │          └───────────┬──────────┘             │
//! │                      ▼                        │
//! │             ┌─────────────────┐               │
//! │             │ neuroproof-core │               │
//! │             │  store + merge  │               │
//! │             └─────────────────┘               │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! neuroproof --dataset hemibrain init
//! neuroproof --dataset hemibrain load -f hemibrain.json
//! neuroproof --dataset hemibrain merge -f merges.json
//! neuroproof --dataset hemibrain history --body 1001
//! neuroproof server --host 0.0.0.0 --port 8080
//! ```

use clap::Parser;
use neuroproof::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "neuroproof=info,neuroproof_core=info,tower_http=debug";

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // NEUROPROOF_LOG_FORMAT=json switches to machine-parseable output.
    let log_format =
        std::env::var("NEUROPROOF_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_env("NEUROPROOF_LOG")
        .or_else(|_| tracing_subscriber::EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
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
        tracing::error!(kind = e.kind(), "Error: {}", e);
        std::process::exit(if e.is_retryable() { 75 } else { 1 });
    }
}

fn print_banner() {
    println!(
        r#"
  neuroproof v{}
  connectome proofreading merge engine
"#,
        env!("CARGO_PKG_VERSION")
    );
}
