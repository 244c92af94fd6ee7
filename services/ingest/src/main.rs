// Multi-tenant message ingestion service.
// ----------------------------------------
// One process hosts the HTTP API, the publish/query service, and a dynamic
// set of per-tenant consumer pools supervised by the tenant runtime
// controller. Backends are pluggable: Postgres + AMQP in production, the
// in-memory store and in-process broker when no URLs are configured.
use anyhow::Result;
use hive_broker::{AmqpBroker, Broker, MemoryBroker};
use ingest::app::{AppState, build_router};
use ingest::auth::TokenIssuer;
use ingest::config::AppConfig;
use ingest::observability;
use ingest::runtime::TenantRuntime;
use ingest::service::MessageService;
use ingest::store::MessageStore;
use ingest::store::memory::InMemoryStore;
use ingest::store::postgres::PostgresStore;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    let metrics_handle = observability::init_observability("hive-ingest");

    let config = AppConfig::from_env_or_yaml()?;

    let store: Arc<dyn MessageStore> = match &config.database {
        Some(database) => Arc::new(PostgresStore::connect(database).await?),
        None => Arc::new(InMemoryStore::new()),
    };
    tracing::info!(backend = store.backend_name(), "message store ready");

    // The AMQP handle is kept separately so the connection can be closed
    // after the consumer pools have drained.
    let mut amqp: Option<Arc<AmqpBroker>> = None;
    let broker: Arc<dyn Broker> = match &config.rabbitmq_url {
        Some(url) => {
            let connection = Arc::new(AmqpBroker::connect(url).await?);
            amqp = Some(Arc::clone(&connection));
            connection
        }
        None => {
            tracing::warn!("no broker configured, using in-process broker");
            Arc::new(MemoryBroker::new())
        }
    };

    let runtime = Arc::new(TenantRuntime::new(
        Arc::clone(&broker),
        Arc::clone(&store),
        config.workers,
    ));
    let messages = Arc::new(MessageService::new(Arc::clone(&broker), Arc::clone(&store)));
    let tokens = TokenIssuer::new(
        &config.auth_secret,
        Duration::from_secs(config.token_ttl_secs),
    );

    let state = AppState {
        runtime: Arc::clone(&runtime),
        messages,
        store,
        tokens,
    };

    let metrics_addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    tokio::spawn(observability::serve_metrics(metrics_handle, metrics_addr));

    let app = build_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "ingest service listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // HTTP is drained; stop the consumer pools within the grace period, then
    // close the broker connection.
    tracing::info!("shutdown signal received, starting graceful shutdown");
    runtime
        .shutdown_consumers(Duration::from_secs(config.shutdown_grace_secs))
        .await;
    if let Some(amqp) = amqp {
        if let Err(err) = amqp.close().await {
            tracing::warn!(error = %err, "failed to close broker connection");
        }
    }
    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
