//! GoTicket Server - Main entry point.
//!
//! This binary starts the GoTicket API server with:
//! - Structured JSON logging for production
//! - Graceful shutdown handling (SIGTERM/SIGINT)
//! - Background sweep of idle rate limiter entries
//!
//! # Configuration
//!
//! See [`goticket_server::config`] for environment variable configuration.
//! Variables may also be placed in a `.env` file in the working directory.
//!
//! # Example
//!
//! ```bash
//! SUPABASE_URL="https://your-project.supabase.co" \
//! SUPABASE_ANON_KEY="anon-key" \
//! PORT=8080 \
//! cargo run --release --bin goticket-server
//! ```

use std::net::SocketAddr;
use std::process::ExitCode;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use goticket_server::config::Config;
use goticket_server::routes::{create_router, AppState};

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine; real environment variables win.
    let dotenv = dotenvy::dotenv();

    init_logging();

    if let Ok(path) = dotenv {
        info!(path = %path.display(), "Loaded environment from file");
    }

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "Failed to load configuration");
            eprintln!("Error: {err}");
            eprintln!();
            eprintln!("Required environment variables:");
            eprintln!("  SUPABASE_URL              - Supabase project URL");
            eprintln!("  SUPABASE_ANON_KEY         - Supabase anon/public key");
            eprintln!();
            eprintln!("Optional environment variables:");
            eprintln!("  SUPABASE_SERVICE_ROLE_KEY - Enables profile inserts on signup");
            eprintln!("  PORT                      - HTTP server port (default: 8080)");
            eprintln!("  RATE_LIMIT_REQUESTS       - Requests per client per window (default: 100)");
            eprintln!("  RATE_LIMIT_WINDOW_SECS    - Rate limit window (default: 3600)");
            eprintln!("  RATE_LIMIT_SWEEP_SECS     - Idle client sweep interval, 0 = off (default: 300)");
            eprintln!("  RUST_LOG                  - Log level filter (default: info)");
            return ExitCode::from(1);
        }
    };

    match run(config).await {
        Ok(()) => {
            info!("Server shutdown complete");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = ?err, "Server error");
            ExitCode::from(1)
        }
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    info!(
        port = config.port,
        supabase_url = %config.supabase_url,
        rate_limit_requests = config.rate_limit_requests,
        rate_limit_window_secs = config.rate_limit_window.as_secs(),
        "GoTicket server starting"
    );

    let state = AppState::new(config.clone()).context("failed to create Supabase client")?;

    let sweep_handle = config.rate_limit_sweep.map(|interval| {
        info!(
            interval_secs = interval.as_secs(),
            "Rate limiter sweep task started"
        );
        state.rate_limiter.spawn_sweep_task(interval)
    });

    let app = create_router(state);

    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind to {bind_addr}"))?;
    info!(address = %bind_addr, "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server terminated unexpectedly")?;

    info!("Server shutting down gracefully");

    if let Some(handle) = sweep_handle {
        handle.abort();
        info!("Rate limiter sweep task stopped");
    }

    Ok(())
}

/// Initialize structured logging with tracing.
///
/// JSON output, filtered by `RUST_LOG` with a default of
/// `info,tower_http=debug,axum::rejection=trace`.
fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug,axum::rejection=trace"));

    let json_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_level(true)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .init();
}

/// Resolves when SIGINT or SIGTERM is received.
///
/// If a handler cannot be installed, that signal is ignored and the other
/// one still triggers shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
