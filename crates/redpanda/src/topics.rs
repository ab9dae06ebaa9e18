//! Topic definitions and startup provisioning.

use engine_core::{Error, Result};
use tracing::info;

use crate::client;
use crate::config::RedpandaConfig;
use crate::health::missing_topics;

/// Topic configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicConfig {
    pub name: String,
    pub partitions: i32,
    pub replication_factor: i16,
}

impl TopicConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partitions: 1,
            replication_factor: 1,
        }
    }

    pub fn with_partitions(mut self, partitions: i32) -> Self {
        self.partitions = partitions;
        self
    }

    pub fn with_replication(mut self, factor: i16) -> Self {
        self.replication_factor = factor;
        self
    }
}

/// The event and dead-letter topics. Both are read from a single partition.
pub fn topic_configs(config: &RedpandaConfig) -> Vec<TopicConfig> {
    [&config.event_topic, &config.dlq_topic]
        .into_iter()
        .map(|name| {
            TopicConfig::new(name.as_str())
                .with_partitions(config.partition + 1)
                .with_replication(config.replication_factor)
        })
        .collect()
}

/// Create any missing topics. Returns the names created.
pub async fn ensure_topics(config: &RedpandaConfig) -> Result<Vec<String>> {
    let client = client::connect(config).await?;
    let existing: Vec<String> = client
        .list_topics()
        .await
        .map_err(|e| Error::transport(format!("failed to list topics: {e}")))?
        .into_iter()
        .map(|t| t.name)
        .collect();

    let wanted = topic_configs(config);
    let names: Vec<&str> = wanted.iter().map(|t| t.name.as_str()).collect();
    let missing = missing_topics(&existing, &names);
    if missing.is_empty() {
        return Ok(Vec::new());
    }

    let controller = client
        .controller_client()
        .map_err(|e| Error::transport(format!("failed to get controller: {e}")))?;

    let timeout_ms = i32::try_from(config.request_timeout_ms).unwrap_or(i32::MAX);
    let mut created = Vec::with_capacity(missing.len());
    for topic in wanted.iter().filter(|t| missing.contains(&t.name.as_str())) {
        controller
            .create_topic(
                topic.name.clone(),
                topic.partitions,
                topic.replication_factor,
                timeout_ms,
            )
            .await
            .map_err(|e| Error::transport(format!("failed to create {}: {e}", topic.name)))?;
        info!(topic = %topic.name, partitions = topic.partitions, "Created topic");
        created.push(topic.name.clone());
    }

    Ok(created)
}
