//! Redpanda consumer for reading JSON records from one topic partition.
//!
//! Uses rskafka with manual position management for at-least-once delivery:
//! the committed position only moves when the caller commits after handling
//! a batch, and the read cursor can be rewound to it.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use engine_core::{Error, Result};
use rskafka::client::partition::{OffsetAt, PartitionClient};
use rskafka::record::RecordAndOffset;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::client;
use crate::config::{ConsumerConfig, RedpandaConfig, StartOffset};
use crate::transport::{ConsumedRecord, FetchedBatch, TopicSource};

/// Consumer for one topic, decoding each record value as `T`.
pub struct RedpandaConsumer<T> {
    config: ConsumerConfig,
    connection: RedpandaConfig,
    topic: String,
    partition_client: RwLock<Option<Arc<PartitionClient>>>,
    /// Next offset to fetch
    read_offset: AtomicI64,
    /// Next offset not yet handled by the caller
    committed_offset: AtomicI64,
    initialized: AtomicBool,
    _record: PhantomData<fn() -> T>,
}

impl<T> RedpandaConsumer<T>
where
    T: DeserializeOwned + Send,
{
    pub fn new(connection: RedpandaConfig, topic: impl Into<String>, config: ConsumerConfig) -> Self {
        let topic = topic.into();
        info!(group_id = %config.group_id, topic = %topic, "Creating Redpanda consumer");
        Self {
            config,
            connection,
            topic,
            partition_client: RwLock::new(None),
            read_offset: AtomicI64::new(-1),
            committed_offset: AtomicI64::new(-1),
            initialized: AtomicBool::new(false),
            _record: PhantomData,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    async fn ensure_connected(&self) -> Result<Arc<PartitionClient>> {
        {
            let client = self.partition_client.read().await;
            if let Some(ref c) = *client {
                return Ok(c.clone());
            }
        }

        let client = client::connect(&self.connection).await?;
        let partition_client =
            client::partition_client(&client, &self.topic, self.connection.partition).await?;

        if !self.initialized.load(Ordering::SeqCst) {
            let at = match self.config.start_offset {
                StartOffset::Earliest => OffsetAt::Earliest,
                StartOffset::Latest => OffsetAt::Latest,
            };
            let offset = partition_client
                .get_offset(at)
                .await
                .map_err(|e| Error::transport(format!("failed to get offset: {e}")))?;

            self.read_offset.store(offset, Ordering::SeqCst);
            self.committed_offset.store(offset, Ordering::SeqCst);
            self.initialized.store(true, Ordering::SeqCst);

            info!(
                group_id = %self.config.group_id,
                topic = %self.topic,
                offset,
                "Consumer initialized at offset"
            );
        }

        let mut guard = self.partition_client.write().await;
        *guard = Some(partition_client.clone());
        Ok(partition_client)
    }

    /// Drop the cached connection so the next call reconnects.
    pub async fn reset_connection(&self) {
        let mut client = self.partition_client.write().await;
        *client = None;
        info!(topic = %self.topic, "Consumer connection reset");
    }

    pub fn committed_offset(&self) -> i64 {
        self.committed_offset.load(Ordering::SeqCst)
    }

    pub fn read_offset(&self) -> i64 {
        self.read_offset.load(Ordering::SeqCst)
    }
}

/// Decode fetched records. Undecodable records are skipped but still advance
/// the returned next offset.
pub fn decode_records<T: DeserializeOwned>(
    topic: &str,
    records: Vec<RecordAndOffset>,
    high_watermark: i64,
) -> FetchedBatch<T> {
    let mut batch = FetchedBatch::empty(high_watermark);

    for record in records {
        let offset = record.offset;
        batch.next_offset = Some(batch.next_offset.map_or(offset + 1, |n| n.max(offset + 1)));

        let Some(value) = record.record.value else {
            warn!(topic = %topic, offset, "Skipping record without value");
            continue;
        };

        match serde_json::from_slice::<T>(&value) {
            Ok(value) => batch.records.push(ConsumedRecord { offset, value }),
            Err(e) => warn!(topic = %topic, offset, error = %e, "Skipping undecodable record"),
        }
    }

    batch
}

#[async_trait]
impl<T> TopicSource<T> for RedpandaConsumer<T>
where
    T: DeserializeOwned + Send + Sync,
{
    async fn fetch(&self) -> Result<FetchedBatch<T>> {
        let client = self.ensure_connected().await?;
        let start = Instant::now();
        let current = self.read_offset();

        let fetched = client
            .fetch_records(
                current,
                1..self.config.max_fetch_bytes.max(1),
                self.config.max_wait_ms,
            )
            .await;

        let (records, high_watermark) = match fetched {
            Ok(fetched) => fetched,
            Err(e) => {
                error!(topic = %self.topic, error = %e, "Fetch error");
                self.reset_connection().await;
                return Err(Error::transport(format!("failed to fetch records: {e}")));
            }
        };

        let batch = decode_records(&self.topic, records, high_watermark);
        if let Some(next) = batch.next_offset {
            self.read_offset.fetch_max(next, Ordering::SeqCst);
        }

        if batch.next_offset.is_some() {
            debug!(
                topic = %self.topic,
                records = batch.records.len(),
                offset_start = current,
                next_offset = batch.next_offset,
                latency_ms = %start.elapsed().as_millis(),
                "Fetched batch"
            );
        }

        Ok(batch)
    }

    async fn commit(&self, next_offset: i64) -> Result<()> {
        let prev = self.committed_offset.fetch_max(next_offset, Ordering::SeqCst);
        self.read_offset.fetch_max(next_offset, Ordering::SeqCst);
        debug!(
            group_id = %self.config.group_id,
            prev_offset = prev,
            new_offset = next_offset.max(prev),
            "Committed offset"
        );
        Ok(())
    }

    async fn rewind(&self) {
        let committed = self.committed_offset();
        let prev = self.read_offset.swap(committed, Ordering::SeqCst);
        if prev != committed {
            debug!(topic = %self.topic, from = prev, to = committed, "Rewound read cursor");
        }
    }

    async fn high_watermark(&self) -> Result<i64> {
        let client = self.ensure_connected().await?;
        client
            .get_offset(OffsetAt::Latest)
            .await
            .map_err(|e| Error::transport(format!("failed to get high watermark: {e}")))
    }

    fn position(&self) -> Option<i64> {
        self.initialized
            .load(Ordering::SeqCst)
            .then(|| self.committed_offset())
    }
}
