//! whats-up-log
//!
//! A small Cloud Run service demonstrating log severities, trace context
//! propagation and custom spans.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌───────────────────────────────────────────────────┐
//!                    │                   whats-up-log                     │
//!   Client Request   │  ┌──────────┐   ┌────────────┐   ┌────────────┐   │
//!   ─────────────────┼─▶│ request  │──▶│   route    │──▶│  handlers  │   │
//!   traceparent      │  │ span/id  │   │    set     │   └─────┬──────┘   │
//!                    │  └──────────┘   └────────────┘         │          │
//!                    │                        ┌───────────────┼───────┐  │
//!                    │                        ▼               ▼       │  │
//!                    │               ┌──────────────┐ ┌────────────┐  │  │──▶ remote service
//!                    │               │ propagating  │ │  object    │  │  │──▶ Cloud Storage
//!                    │               │ http client  │ │  store     │  │  │
//!                    │               └──────────────┘ └────────────┘  │  │
//!                    │  ┌─────────────────────────────────────────────┘  │
//!                    │  │ logger (JSON → Cloud Logging)  tracer (OTLP)   │
//!                    │  │ lifecycle: Starting → Serving → Draining → Stopped
//!                    └──┴────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio::net::TcpListener;

use whats_up_log::config::validation::validate_config;
use whats_up_log::config::{load_config, ConfigError};
use whats_up_log::http::RouteKind;
use whats_up_log::lifecycle::{bootstrap, signals};

#[derive(Parser)]
#[command(name = "whats-up-log")]
#[command(about = "Cloud Run logging and tracing demo service", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long, env = "WHATS_UP_LOG_CONFIG")]
    config: Option<PathBuf>,

    /// Comma separated routes to enable, e.g. `diagnostic` for the minimal variant.
    #[arg(long, value_delimiter = ',')]
    routes: Option<Vec<RouteKind>>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(routes) = cli.routes {
        config.service.routes = routes;
        if let Err(errors) = validate_config(&config) {
            eprintln!("Invalid configuration: {}", ConfigError::Validation(errors));
            return ExitCode::FAILURE;
        }
    }

    let service = match bootstrap(&config).await {
        Ok(service) => service,
        Err(e) => {
            eprintln!("Startup failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    let listener = match TcpListener::bind(&config.listener.bind_address).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(address = %config.listener.bind_address, error = %e, "Failed to bind listener");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = service.server.run(listener, signals::termination()).await {
        tracing::error!(error = %e, "Server exited with error");
    }

    // Flushing blocks on the batch exporter.
    let telemetry = service.telemetry;
    if let Err(e) = tokio::task::spawn_blocking(move || telemetry.shutdown()).await {
        tracing::error!(error = %e, "Trace flush panicked");
    }

    tracing::info!("Shutdown complete");
    ExitCode::SUCCESS
}
