//! Dependency health aggregation.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Health status for the whole service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Last known state of one dependency.
#[derive(Debug)]
pub struct ComponentHealth {
    name: &'static str,
    healthy: AtomicBool,
    message: RwLock<Option<String>>,
}

impl ComponentHealth {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            healthy: AtomicBool::new(false),
            message: RwLock::new(None),
        }
    }

    pub fn set_healthy(&self) {
        self.healthy.store(true, Ordering::Relaxed);
        *self.message.write() = None;
    }

    pub fn set_unhealthy(&self, msg: impl Into<String>) {
        self.healthy.store(false, Ordering::Relaxed);
        *self.message.write() = Some(msg.into());
    }

    /// Record the outcome of a probe.
    pub fn record<E: std::fmt::Display>(&self, outcome: &Result<(), E>) {
        match outcome {
            Ok(()) => self.set_healthy(),
            Err(e) => self.set_unhealthy(e.to_string()),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn message(&self) -> Option<String> {
        self.message.read().clone()
    }

    fn report(&self) -> ComponentHealthReport {
        ComponentHealthReport {
            name: self.name.to_string(),
            healthy: self.is_healthy(),
            message: self.message(),
        }
    }
}

/// Aggregated health status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub components: Vec<ComponentHealthReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealthReport {
    pub name: String,
    pub healthy: bool,
    pub message: Option<String>,
}

/// Health of the gateway's dependencies.
///
/// Admission needs the cache and the transport. The store only affects the
/// persistence pipeline, so losing it degrades the service without making it unready.
#[derive(Debug)]
pub struct HealthRegistry {
    pub cache: ComponentHealth,
    pub redpanda: ComponentHealth,
    pub clickhouse: ComponentHealth,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self {
            cache: ComponentHealth::new("cache"),
            redpanda: ComponentHealth::new("redpanda"),
            clickhouse: ComponentHealth::new("clickhouse"),
        }
    }

    /// Generate a health report.
    pub fn report(&self) -> HealthReport {
        let status = if self.is_ready() && self.clickhouse.is_healthy() {
            HealthStatus::Healthy
        } else if self.is_ready() {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unhealthy
        };

        HealthReport {
            status,
            components: vec![
                self.cache.report(),
                self.redpanda.report(),
                self.clickhouse.report(),
            ],
        }
    }

    /// Check if the service can admit events.
    pub fn is_ready(&self) -> bool {
        self.cache.is_healthy() && self.redpanda.is_healthy()
    }
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}
