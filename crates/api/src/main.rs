//! API server entry point.

use std::sync::Arc;

use api::config::{Config, GatewayMode};
use api::state::AppState;
use checkout::{
    CheckoutConfig, FileRecoveryStore, GatewayConfig, HttpPaymentGateway, InMemoryPaymentGateway,
    PaymentGateway,
};
use ledger::{InMemoryOrderLedger, OrderLedger, PostgresOrderLedger};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

async fn connect_ledger(config: &Config) -> Arc<dyn OrderLedger> {
    let Some(url) = config.database_url.as_deref() else {
        tracing::warn!("DATABASE_URL not set, orders are kept in memory");
        return Arc::new(InMemoryOrderLedger::new());
    };

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .expect("failed to connect to PostgreSQL");
    let ledger = PostgresOrderLedger::new(pool);
    ledger
        .run_migrations()
        .await
        .expect("failed to run migrations");
    Arc::new(ledger)
}

fn build_gateway(mode: GatewayMode) -> Arc<dyn PaymentGateway> {
    match mode {
        GatewayMode::Sandbox => {
            tracing::warn!("using the sandbox payment gateway");
            Arc::new(InMemoryPaymentGateway::sandbox())
        }
        GatewayMode::Http => Arc::new(
            HttpPaymentGateway::new(GatewayConfig::from_env())
                .expect("failed to build payment gateway client"),
        ),
    }
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Wire the ledger, gateway and recovery log
    let ledger = connect_ledger(&config).await;
    let gateway = build_gateway(config.gateway_mode);
    let recovery = Arc::new(FileRecoveryStore::new(config.recovery_file.clone()));
    let collaborators = api::local_collaborators(ledger, gateway, recovery);
    let state = Arc::new(AppState::new(collaborators, CheckoutConfig::from_env()));

    // 4. Build the application
    let app = api::create_app(state, metrics_handle);

    // 5. Start server
    let addr = config.addr();
    tracing::info!(%addr, gateway = ?config.gateway_mode, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("server shut down gracefully");
}
