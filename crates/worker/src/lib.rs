//! Persistence pipeline and background workers.
//!
//! - Event buffer and batch writer (buffer → ClickHouse, dead letters on exhaustion)
//! - Consumer (Redpanda → buffer)
//! - Dead-letter reprocessor (pulsed replay of the dead-letter topic)
//! - Scheduler (flush, credit reconciliation, monthly reset, replay, metrics log)

pub mod buffer;
pub mod config;
pub mod consumer;
pub mod dlq;
pub mod scheduler;
pub mod writer;

pub use buffer::EventBuffer;
pub use config::{PipelineConfig, SchedulerConfig};
pub use consumer::ConsumerWorker;
pub use dlq::{DeadLetterReprocessor, ReplayReport};
pub use scheduler::{BackgroundTasks, WorkerScheduler};
pub use writer::{BatchWriter, FlushReport};
