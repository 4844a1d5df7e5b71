//! Order service entry point.

use std::sync::Arc;

use api::SharedRepository;
use api::config::Config;
use lifecycle::{ExpirationSweeper, SweeperConfig};
use order_store::{
    CachedOrderRepository, InMemoryOrderCache, InMemoryOrderRepository, OrderRepository,
    PostgresOrderRepository, RedisOrderCache,
};
use publisher::{EventDispatcher, LoggingPublisher, Publisher};
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
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

/// Wraps a store with the configured cache.
async fn with_cache<R>(store: R, config: &Config) -> Result<SharedRepository, BoxError>
where
    R: OrderRepository + 'static,
{
    match &config.redis_url {
        Some(url) => {
            let cache = RedisOrderCache::connect(url).await?;
            Ok(Arc::new(CachedOrderRepository::with_ttl(
                store,
                cache,
                config.cache_ttl,
            )))
        }
        None => {
            tracing::warn!("REDIS_URL not set, using in-memory order cache");
            Ok(Arc::new(CachedOrderRepository::with_ttl(
                store,
                InMemoryOrderCache::new(),
                config.cache_ttl,
            )))
        }
    }
}

async fn build_repository(config: &Config) -> Result<SharedRepository, BoxError> {
    match &config.database_url {
        Some(url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(20)
                .connect(url)
                .await?;
            let store = PostgresOrderRepository::new(pool);
            store.run_migrations().await?;
            tracing::info!("connected to PostgreSQL order store");
            with_cache(store, config).await
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory order store");
            with_cache(InMemoryOrderRepository::new(), config).await
        }
    }
}

#[cfg(feature = "kafka")]
fn build_publisher(config: &Config) -> Result<Arc<dyn Publisher>, BoxError> {
    match &config.kafka_brokers {
        Some(brokers) => Ok(Arc::new(publisher::KafkaPublisher::new(brokers)?)),
        None => {
            tracing::warn!("KAFKA_BROKERS not set, events will only be logged");
            Ok(Arc::new(LoggingPublisher::new()))
        }
    }
}

#[cfg(not(feature = "kafka"))]
fn build_publisher(config: &Config) -> Result<Arc<dyn Publisher>, BoxError> {
    if config.kafka_brokers.is_some() {
        tracing::warn!("KAFKA_BROKERS set but built without the kafka feature, events will only be logged");
    }
    Ok(Arc::new(LoggingPublisher::new()))
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
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
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    // 3. Storage, cache and publisher
    let terms = config.downpayment_terms()?;
    let repo = build_repository(&config).await?;
    let publisher = build_publisher(&config)?;
    let dispatcher = EventDispatcher::new(Arc::clone(&publisher));

    // 4. Expiration sweeper
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = ExpirationSweeper::new(
        Arc::clone(&repo),
        dispatcher.clone(),
        SweeperConfig {
            interval: config.sweep_interval,
            ..SweeperConfig::default()
        },
    );
    let mut sweeper_task = tokio::spawn(async move { sweeper.run(shutdown_rx).await });

    // 5. Build the application and serve
    let state = api::create_state(repo, dispatcher, terms);
    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, ?terms, "starting order service");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // 6. Stop the sweeper, giving an in-flight sweep the grace period
    let _ = shutdown_tx.send(true);
    match tokio::time::timeout(config.shutdown_grace, &mut sweeper_task).await {
        Ok(Ok(())) => tracing::info!("expiration sweeper finished"),
        Ok(Err(e)) => tracing::error!(error = %e, "expiration sweeper task failed"),
        Err(_) => {
            tracing::warn!(grace = ?config.shutdown_grace, "sweeper did not stop in time, aborting");
            sweeper_task.abort();
        }
    }

    if let Err(e) = publisher.close().await {
        tracing::error!(error = %e, "failed to close publisher");
    }

    served?;
    tracing::info!("server shut down gracefully");
    Ok(())
}
