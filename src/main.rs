//! Ingestion gateway
//!
//! Quota-enforcing event admission and batch persistence:
//! - Admission: API key binding, credit quota, context enrichment, Redpanda publish
//! - Persistence: Redpanda consumer, buffered batch writes to ClickHouse, dead letters
//! - Background: credit reconciliation, monthly reset, dead-letter replay

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};

use api::{router, AdmissionController, AppState};
use cache::{CacheConfig, CounterCache, WriteBehind};
use clickhouse_client::{ClickHouseClient, ClickHouseConfig, EventStore};
use engine_core::{DlqRecord, Envelope};
use redpanda::{ensure_topics, RedpandaConfig, RedpandaConsumer, RedpandaProducer};
use telemetry::{init_tracing_from_env, HealthRegistry, Metrics};
use tenant_client::{
    CreditLedger, CreditReconciler, IdentityCache, MonthlyReset, TenantConfig, TenantServiceClient,
};
use worker::{
    BackgroundTasks, BatchWriter, ConsumerWorker, DeadLetterReprocessor, EventBuffer,
    PipelineConfig, SchedulerConfig, WorkerScheduler,
};

/// Application configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Config {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    /// Interval between dependency health probes in seconds
    #[serde(default = "default_health_interval_secs")]
    health_interval_secs: u64,
    /// Seconds each background task gets to stop at shutdown
    #[serde(default = "default_shutdown_timeout_secs")]
    shutdown_timeout_secs: u64,

    #[serde(default)]
    cache: CacheConfig,
    #[serde(default)]
    tenant: TenantConfig,
    #[serde(default)]
    redpanda: RedpandaConfig,
    #[serde(default)]
    clickhouse: ClickHouseConfig,
    #[serde(default)]
    pipeline: PipelineConfig,
    #[serde(default)]
    scheduler: SchedulerConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_health_interval_secs() -> u64 {
    10
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            health_interval_secs: default_health_interval_secs(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            cache: CacheConfig::default(),
            tenant: TenantConfig::default(),
            redpanda: RedpandaConfig::default(),
            clickhouse: ClickHouseConfig::default(),
            pipeline: PipelineConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // rustls 0.23+ requires an explicit crypto provider before any TLS handshake
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("rustls crypto provider was already installed");
    }

    dotenvy::dotenv().ok();
    init_tracing_from_env();

    info!("Starting ingestion gateway v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;
    info!(
        brokers = ?config.redpanda.brokers,
        sasl_username = config.redpanda.sasl_username.as_deref().unwrap_or("none"),
        cache_backend = ?config.cache.backend,
        tenant_url = %config.tenant.url,
        "Loaded configuration"
    );

    let metrics = Arc::new(Metrics::new());
    let health = Arc::new(HealthRegistry::new());

    // Shared cache and the bounded pool for deferred cache writes
    let counters = cache::connect(&config.cache)
        .await
        .context("Failed to connect to the counter cache")?;
    let write_behind = Arc::new(WriteBehind::new(
        config.cache.write_behind_capacity,
        metrics.clone(),
    ));

    // Tenant service: identity bindings and the credit ledger
    let tenant = Arc::new(
        TenantServiceClient::new(&config.tenant).context("Failed to create tenant client")?,
    );
    let identity = Arc::new(IdentityCache::new(
        &config.tenant,
        counters.clone(),
        tenant.clone(),
        write_behind.clone(),
    ));
    let ledger = Arc::new(CreditLedger::new(
        counters.clone(),
        tenant.clone(),
        write_behind.clone(),
        metrics.clone(),
    ));

    // Transport
    if config.redpanda.create_topics {
        match ensure_topics(&config.redpanda).await {
            Ok(created) if !created.is_empty() => info!(topics = ?created, "Created topics"),
            Ok(_) => {}
            Err(e) => error!(error = %e, "Failed to ensure topics"),
        }
    }
    let producer = Arc::new(
        RedpandaProducer::new(config.redpanda.clone())
            .await
            .context("Failed to create Redpanda producer")?,
    );

    // Store
    let clickhouse = Arc::new(ClickHouseClient::new(config.clickhouse.clone()));
    if config.clickhouse.init_schema {
        if let Err(e) = clickhouse_client::health::init_schema(&clickhouse).await {
            // The schema may already exist; writes will surface a real problem
            error!(error = %e, "Failed to initialize ClickHouse schema");
        }
    }

    // Persistence pipeline
    let buffer = Arc::new(EventBuffer::new(config.pipeline.max_buffer_size));
    let store: Arc<dyn EventStore> = clickhouse.clone();
    let writer = Arc::new(BatchWriter::new(
        &config.pipeline,
        buffer,
        store,
        producer.clone(),
        metrics.clone(),
    ));

    let event_source = Arc::new(RedpandaConsumer::<Envelope>::new(
        config.redpanda.clone(),
        config.redpanda.event_topic.clone(),
        config.redpanda.consumer.clone(),
    ));
    let consumer = ConsumerWorker::new(
        event_source,
        writer.clone(),
        config.pipeline.flush_interval(),
    );

    let dlq_source = Arc::new(RedpandaConsumer::<DlqRecord>::new(
        config.redpanda.clone(),
        config.redpanda.dlq_topic.clone(),
        config.redpanda.dlq_consumer.clone(),
    ));
    let reprocessor = Arc::new(DeadLetterReprocessor::new(
        dlq_source,
        writer.clone(),
        metrics.clone(),
        config.scheduler.replay_window(),
    ));

    let reconciler = Arc::new(CreditReconciler::new(
        counters.clone(),
        tenant.clone(),
        metrics.clone(),
    ));
    let monthly_reset = Arc::new(MonthlyReset::new(counters.clone(), metrics.clone()));

    check_health(&health, counters.as_ref(), &config.redpanda, &clickhouse).await;

    let mut tasks = WorkerScheduler::new(
        config.scheduler.clone(),
        config.pipeline.flush_interval(),
        metrics.clone(),
    )
    .with_writer(writer.clone())
    .with_consumer(consumer)
    .with_reprocessor(reprocessor)
    .with_reconciler(reconciler)
    .with_monthly_reset(monthly_reset)
    .start();
    spawn_health_probe(
        &mut tasks,
        Duration::from_secs(config.health_interval_secs),
        health.clone(),
        counters.clone(),
        config.redpanda.clone(),
        clickhouse.clone(),
    );

    // Admission
    let admission = Arc::new(AdmissionController::new(
        identity,
        ledger,
        producer.clone(),
        metrics.clone(),
    ));
    let state = AppState::new(
        admission,
        metrics.clone(),
        health.clone(),
        config.pipeline.failure_rate_threshold,
    );
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid server address")?;
    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutting down...");

    // The consumer flushes and commits on its way out
    tasks
        .shutdown(Duration::from_secs(config.shutdown_timeout_secs))
        .await;

    let report = writer.flush().await;
    if report.persisted > 0 || report.dead_lettered > 0 {
        info!(
            persisted = report.persisted,
            dead_lettered = report.dead_lettered,
            "Final flush complete"
        );
    }

    write_behind.shutdown(config.cache.write_behind_drain()).await;

    info!("Shutdown complete");
    Ok(())
}

/// Load configuration from defaults, `config/default.toml`, then `INGESTION__*` variables.
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        .add_source(config::Config::try_from(&Config::default())?)
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("INGESTION")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut config: Config = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    // Lists and secrets are easier to pass as flat variables
    if let Ok(brokers) = std::env::var("INGESTION_REDPANDA_BROKERS") {
        config.redpanda.brokers = brokers.split(',').map(|s| s.trim().to_string()).collect();
    }
    if let Ok(username) = std::env::var("INGESTION_REDPANDA_SASL_USERNAME") {
        config.redpanda.sasl_username = Some(username);
    }
    if let Ok(password) = std::env::var("INGESTION_REDPANDA_SASL_PASSWORD") {
        config.redpanda.sasl_password = Some(password);
    }
    if let Ok(url) = std::env::var("INGESTION_CLICKHOUSE_URL") {
        config.clickhouse.url = url;
    }
    if let Ok(username) = std::env::var("INGESTION_CLICKHOUSE_USERNAME") {
        config.clickhouse.username = Some(username);
    }
    if let Ok(password) = std::env::var("INGESTION_CLICKHOUSE_PASSWORD") {
        config.clickhouse.password = Some(password);
    }
    if let Ok(url) = std::env::var("INGESTION_REDIS_URL") {
        config.cache.url = url;
    }
    if let Ok(url) = std::env::var("INGESTION_TENANT_URL") {
        config.tenant.url = url;
    }

    Ok(config)
}

/// Probe every dependency once and record the outcome.
async fn check_health(
    health: &HealthRegistry,
    counters: &dyn CounterCache,
    redpanda: &RedpandaConfig,
    clickhouse: &ClickHouseClient,
) {
    let cache = counters.ping().await;
    log_probe("cache", &cache);
    health.cache.record(&cache);

    let transport = redpanda::health::check_connection(redpanda).await;
    log_probe("redpanda", &transport);
    health.redpanda.record(&transport);

    let store = clickhouse_client::health::check_connection(clickhouse).await;
    log_probe("clickhouse", &store);
    health.clickhouse.record(&store);
}

fn log_probe(component: &str, outcome: &engine_core::Result<()>) {
    match outcome {
        Ok(()) => info!(component, "Connection healthy"),
        Err(e) => error!(component, error = %e, "Connection unhealthy"),
    }
}

fn spawn_health_probe(
    tasks: &mut BackgroundTasks,
    period: Duration,
    health: Arc<HealthRegistry>,
    counters: Arc<dyn CounterCache>,
    redpanda: RedpandaConfig,
    clickhouse: Arc<ClickHouseClient>,
) {
    tasks.spawn_periodic("health_probe", period, move || {
        let health = health.clone();
        let counters = counters.clone();
        let redpanda = redpanda.clone();
        let clickhouse = clickhouse.clone();
        async move {
            health.cache.record(&counters.ping().await);
            health
                .redpanda
                .record(&redpanda::health::check_connection(&redpanda).await);
            health
                .clickhouse
                .record(&clickhouse_client::health::check_connection(&clickhouse).await);
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
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
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
