//! Redpanda health checks.

use std::collections::HashSet;

use engine_core::{with_deadline, Dependency, Error, Result};
use tracing::{debug, error};

use crate::client;
use crate::config::RedpandaConfig;

/// Check Redpanda connection health by listing topics.
pub async fn check_connection(config: &RedpandaConfig) -> Result<()> {
    let result = with_deadline(
        Dependency::Transport,
        "list_topics",
        config.request_timeout(),
        async {
            let client = client::connect(config).await?;
            client
                .list_topics()
                .await
                .map_err(|e| Error::transport(format!("failed to list topics: {e}")))
        },
    )
    .await;

    match result {
        Ok(topics) => {
            debug!(topics = topics.len(), "Redpanda connection healthy");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Redpanda health check failed");
            Err(e)
        }
    }
}

/// Names from `required` that are absent from `existing`.
pub fn missing_topics<'a>(existing: &[String], required: &[&'a str]) -> Vec<&'a str> {
    let existing: HashSet<&str> = existing.iter().map(String::as_str).collect();
    required
        .iter()
        .filter(|t| !existing.contains(*t))
        .copied()
        .collect()
}
