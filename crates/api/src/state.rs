//! Application state shared across handlers.

use std::sync::Arc;

use telemetry::{HealthRegistry, Metrics};

use crate::admission::AdmissionController;
use crate::context::ContextEnricher;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub admission: Arc<AdmissionController>,
    pub enricher: Arc<ContextEnricher>,
    pub metrics: Arc<Metrics>,
    pub health: Arc<HealthRegistry>,
    /// Failure rate above which the pipeline reports UNHEALTHY
    pub failure_rate_threshold: f64,
}

impl AppState {
    pub fn new(
        admission: Arc<AdmissionController>,
        metrics: Arc<Metrics>,
        health: Arc<HealthRegistry>,
        failure_rate_threshold: f64,
    ) -> Self {
        Self {
            admission,
            enricher: Arc::new(ContextEnricher::new()),
            metrics,
            health,
            failure_rate_threshold,
        }
    }
}
