//! Common test setup functions.

use std::sync::Arc;

use api::{router, AdmissionController, AppState};
use axum::Router;
use cache::{CounterCache, MemoryCache, WriteBehind};
use engine_core::{DlqRecord, Envelope, ParsedApiKey};
use telemetry::{HealthRegistry, Metrics};
use tenant_client::{CreditLedger, CreditReconciler, IdentityCache, MonthlyReset, TenantConfig};
use uuid::Uuid;
use worker::{BatchWriter, DeadLetterReprocessor, EventBuffer, PipelineConfig};

use crate::fixtures;
use crate::mocks::{MemoryStore, MemoryTopic, MockPublisher, MockTenant, UnavailableCache};

/// Failure rate above which `/api/health/events` reports UNHEALTHY.
pub const FAILURE_RATE_THRESHOLD: f64 = 0.1;

/// Admission stack over in-memory dependencies.
pub struct TestContext {
    pub router: Router,
    /// Entries behind the admission path's cache, readable during an outage.
    pub cache: Arc<MemoryCache>,
    pub cache_switch: Arc<UnavailableCache>,
    pub tenant: Arc<MockTenant>,
    pub publisher: Arc<MockPublisher>,
    pub ledger: Arc<CreditLedger>,
    pub write_behind: Arc<WriteBehind>,
    pub metrics: Arc<Metrics>,
    pub health: Arc<HealthRegistry>,
}

impl TestContext {
    pub fn new() -> Self {
        let cache = Arc::new(MemoryCache::new());
        let cache_switch = Arc::new(UnavailableCache::new(cache.clone()));
        let counters: Arc<dyn CounterCache> = cache_switch.clone();
        let tenant = Arc::new(MockTenant::new());
        let publisher = Arc::new(MockPublisher::new());
        let metrics = Arc::new(Metrics::new());
        let health = Arc::new(HealthRegistry::new());
        let write_behind = Arc::new(WriteBehind::new(16, metrics.clone()));

        let identity = Arc::new(IdentityCache::new(
            &TenantConfig::default(),
            counters.clone(),
            tenant.clone(),
            write_behind.clone(),
        ));
        let ledger = Arc::new(CreditLedger::new(
            counters,
            tenant.clone(),
            write_behind.clone(),
            metrics.clone(),
        ));
        let admission = Arc::new(AdmissionController::new(
            identity,
            ledger.clone(),
            publisher.clone(),
            metrics.clone(),
        ));
        let state = AppState::new(
            admission,
            metrics.clone(),
            health.clone(),
            FAILURE_RATE_THRESHOLD,
        );

        Self {
            router: router(state),
            cache,
            cache_switch,
            tenant,
            publisher,
            ledger,
            write_behind,
            metrics,
            health,
        }
    }

    /// Register an application with a fresh key and `limit` credits.
    pub fn register_app(&self, limit: i64) -> (Uuid, ParsedApiKey) {
        let app_id = Uuid::new_v4();
        let key = fixtures::api_key();
        self.tenant.bind(key, app_id);
        self.tenant.set_credits(app_id, limit, 0);
        (app_id, key)
    }

    pub fn reconciler(&self) -> CreditReconciler {
        CreditReconciler::new(self.cache.clone(), self.tenant.clone(), self.metrics.clone())
    }

    pub fn monthly_reset(&self) -> MonthlyReset {
        MonthlyReset::new(self.cache.clone(), self.metrics.clone())
    }

    /// Make every cache call on the admission path fail with `CACHE_001`.
    pub fn set_cache_down(&self, down: bool) {
        self.cache_switch.set_down(down);
    }

    pub fn mark_dependencies_healthy(&self) {
        self.health.cache.set_healthy();
        self.health.redpanda.set_healthy();
        self.health.clickhouse.set_healthy();
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Persistence pipeline over in-memory topics and store.
pub struct PipelineContext {
    pub events: Arc<MemoryTopic<Envelope>>,
    pub dead_letter_topic: Arc<MemoryTopic<DlqRecord>>,
    pub store: Arc<MemoryStore>,
    pub publisher: Arc<MockPublisher>,
    pub writer: Arc<BatchWriter>,
    pub metrics: Arc<Metrics>,
}

impl PipelineContext {
    pub fn new(config: PipelineConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let publisher = Arc::new(MockPublisher::new());
        let metrics = Arc::new(Metrics::new());
        let writer = Arc::new(BatchWriter::new(
            &config,
            Arc::new(EventBuffer::new(config.max_buffer_size)),
            store.clone(),
            publisher.clone(),
            metrics.clone(),
        ));

        Self {
            events: Arc::new(MemoryTopic::new(100)),
            dead_letter_topic: Arc::new(MemoryTopic::new(100)),
            store,
            publisher,
            writer,
            metrics,
        }
    }

    /// Pipeline config with millisecond backoff.
    pub fn fast_config() -> PipelineConfig {
        PipelineConfig {
            max_buffer_size: 1000,
            max_batch_size: 50,
            initial_backoff_ms: 1,
            max_backoff_ms: 4,
            ..PipelineConfig::default()
        }
    }

    /// Move everything dead-lettered since the last call onto the dead-letter topic.
    pub fn deliver_dead_letters(&self) -> usize {
        let records = self.publisher.take_dead_letters();
        let count = records.len();
        self.dead_letter_topic.push_all(records);
        count
    }

    pub fn reprocessor(&self, window: std::time::Duration) -> DeadLetterReprocessor {
        DeadLetterReprocessor::new(
            self.dead_letter_topic.clone(),
            self.writer.clone(),
            self.metrics.clone(),
            window,
        )
    }
}
