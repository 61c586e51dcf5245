//! Gatepass HTTP server.
//!
//! Ticket lifecycle & redemption engine behind an Axum HTTP surface.

use gatepass_core::{PaymentReconciler, RedemptionCoordinator, SystemClock};
use gatepass_postgres::{PostgresAuditLog, PostgresTicketStore, ensure_schema};
use gatepass_server::{AppState, Config, build_router, metrics::register_business_metrics};
use metrics_exporter_prometheus::PrometheusBuilder;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file (if present)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gatepass=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Gatepass HTTP Server");

    // Load configuration
    let config = Config::from_env();
    info!(
        postgres_url = %config.postgres.url,
        "Configuration loaded"
    );

    // Install the Prometheus exporter on its own listener
    let metrics_addr: SocketAddr =
        format!("{}:{}", config.server.metrics_host, config.server.metrics_port).parse()?;
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()?;
    register_business_metrics();
    info!(address = %metrics_addr, "Metrics exporter listening");

    // Connect the ticket store pool; the statement timeout bounds every
    // store call, including try_redeem
    info!("Connecting to ticket store database...");
    let connect_options = PgConnectOptions::from_str(&config.postgres.url)?.options([(
        "statement_timeout",
        format!("{}s", config.postgres.statement_timeout),
    )]);
    let pool = PgPoolOptions::new()
        .max_connections(config.postgres.max_connections)
        .min_connections(config.postgres.min_connections)
        .acquire_timeout(Duration::from_secs(config.postgres.connect_timeout))
        .idle_timeout(Some(Duration::from_secs(config.postgres.idle_timeout)))
        .connect_with(connect_options)
        .await?;
    ensure_schema(&pool).await?;
    info!("Ticket store connected");

    // Wire the engine
    let store = Arc::new(PostgresTicketStore::new(pool.clone()));
    let audit = Arc::new(PostgresAuditLog::new(pool.clone()));
    let coordinator = Arc::new(RedemptionCoordinator::new(
        store.clone(),
        audit,
        Arc::new(SystemClock),
    ));
    let reconciler = Arc::new(PaymentReconciler::new(store));

    let state = AppState::new(coordinator, reconciler, Some(pool));
    let app = build_router(state);

    // Create server address
    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!(address = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
