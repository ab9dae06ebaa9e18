//! Redpanda producer for admitted envelopes and dead-letter records.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use engine_core::{with_deadline, Dependency, DlqRecord, Envelope, Error, Result};
use rskafka::client::{partition::PartitionClient, Client};
use rskafka::record::Record;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, error};

use crate::client;
use crate::config::RedpandaConfig;
use crate::transport::{DeadLetterPublisher, EventPublisher};

pub const SCHEMA_VERSION_HEADER: &str = "schemaVersion";

/// Build the record for an admitted envelope, keyed by application.
pub fn envelope_record(envelope: &Envelope) -> Result<Record> {
    let mut headers = BTreeMap::new();
    headers.insert(
        SCHEMA_VERSION_HEADER.to_string(),
        envelope.schema_version.as_str().as_bytes().to_vec(),
    );
    json_record(envelope.partition_key(), envelope, headers)
}

/// Build the record for a dead-letter entry. Keyed like the envelope it carries.
pub fn dead_letter_record(record: &DlqRecord) -> Result<Record> {
    let mut headers = BTreeMap::new();
    headers.insert(
        "attempts".to_string(),
        record.attempts.to_string().into_bytes(),
    );
    json_record(record.event.partition_key(), record, headers)
}

fn json_record<T: Serialize>(
    key: String,
    value: &T,
    headers: BTreeMap<String, Vec<u8>>,
) -> Result<Record> {
    Ok(Record {
        key: Some(key.into_bytes()),
        value: Some(serde_json::to_vec(value)?),
        headers,
        timestamp: Utc::now(),
    })
}

/// Producer writing to the event and dead-letter topics.
pub struct RedpandaProducer {
    client: Client,
    config: RedpandaConfig,
    /// Cached partition clients per topic
    clients: RwLock<BTreeMap<String, Arc<PartitionClient>>>,
}

impl RedpandaProducer {
    pub async fn new(config: RedpandaConfig) -> Result<Self> {
        let client = client::connect(&config).await?;
        Ok(Self {
            client,
            config,
            clients: RwLock::new(BTreeMap::new()),
        })
    }

    /// Gets or creates a partition client for a topic.
    async fn get_client(&self, topic: &str) -> Result<Arc<PartitionClient>> {
        {
            let clients = self.clients.read().await;
            if let Some(client) = clients.get(topic) {
                return Ok(client.clone());
            }
        }

        let partition_client =
            client::partition_client(&self.client, topic, self.config.partition).await?;

        let mut clients = self.clients.write().await;
        clients.insert(topic.to_string(), partition_client.clone());
        Ok(partition_client)
    }

    async fn forget_client(&self, topic: &str) {
        self.clients.write().await.remove(topic);
    }

    /// Produce `records` to `topic` and wait for the acknowledgement.
    async fn produce(&self, topic: &str, records: Vec<Record>) -> Result<()> {
        let count = records.len();
        let start = Instant::now();
        let deadline = self.config.request_timeout();
        let compression = self.config.compression();

        let result = with_deadline(Dependency::Transport, "produce", deadline, async {
            let partition = self.get_client(topic).await?;
            partition
                .produce(records, compression)
                .await
                .map_err(|e| Error::transport(format!("failed to produce to {topic}: {e}")))
        })
        .await;

        match result {
            Ok(offsets) => {
                debug!(
                    topic = %topic,
                    count,
                    first_offset = offsets.first().copied().unwrap_or(-1),
                    latency_ms = %start.elapsed().as_millis(),
                    "Produced records"
                );
                Ok(())
            }
            Err(e) => {
                error!(topic = %topic, count, error = %e, "Produce failed");
                self.forget_client(topic).await;
                Err(e)
            }
        }
    }

    pub fn config(&self) -> &RedpandaConfig {
        &self.config
    }
}

#[async_trait]
impl EventPublisher for RedpandaProducer {
    async fn publish(&self, envelope: &Envelope) -> Result<()> {
        let record = envelope_record(envelope)?;
        self.produce(&self.config.event_topic, vec![record]).await
    }
}

#[async_trait]
impl DeadLetterPublisher for RedpandaProducer {
    async fn publish_dead_letters(&self, records: &[DlqRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let records = records
            .iter()
            .map(dead_letter_record)
            .collect::<Result<Vec<_>>>()?;
        self.produce(&self.config.dlq_topic, records).await
    }
}
