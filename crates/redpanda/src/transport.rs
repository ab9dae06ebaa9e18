//! Transport seams used by admission and the persistence pipeline.

use async_trait::async_trait;
use engine_core::{DlqRecord, Envelope, Result};

/// Publishes admitted envelopes. Returns only after the broker acknowledged.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, envelope: &Envelope) -> Result<()>;
}

/// Publishes dead-letter records as one batch.
#[async_trait]
pub trait DeadLetterPublisher: Send + Sync {
    async fn publish_dead_letters(&self, records: &[DlqRecord]) -> Result<()>;
}

/// A decoded record and its offset.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumedRecord<T> {
    pub offset: i64,
    pub value: T,
}

/// Result of one fetch.
#[derive(Debug, Clone)]
pub struct FetchedBatch<T> {
    pub records: Vec<ConsumedRecord<T>>,
    /// Position to commit once every record in this batch is handled.
    /// Covers undecodable records too, so they are not fetched again.
    pub next_offset: Option<i64>,
    pub high_watermark: i64,
}

impl<T> FetchedBatch<T> {
    pub fn empty(high_watermark: i64) -> Self {
        Self {
            records: Vec::new(),
            next_offset: None,
            high_watermark,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// A consumable topic with an explicitly committed position.
///
/// Fetching moves a read cursor ahead of the committed position; records
/// between the two are in flight and are read again after [`rewind`].
///
/// [`rewind`]: TopicSource::rewind
#[async_trait]
pub trait TopicSource<T>: Send + Sync {
    /// Read the next records after the read cursor and advance it.
    async fn fetch(&self) -> Result<FetchedBatch<T>>;

    /// Advance the committed position to `next_offset`. Never moves backwards.
    async fn commit(&self, next_offset: i64) -> Result<()>;

    /// Move the read cursor back to the committed position.
    async fn rewind(&self);

    /// Offset one past the newest record currently in the topic.
    async fn high_watermark(&self) -> Result<i64>;

    /// Committed position (next offset not yet handled), if initialized.
    fn position(&self) -> Option<i64>;
}
