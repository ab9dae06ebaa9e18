//! Worker scheduler for background tasks.
//!
//! Each task runs in its own loop, so a slow run delays the next tick of the
//! same task instead of overlapping with it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use telemetry::Metrics;
use tenant_client::{next_reset_after, CreditReconciler, MonthlyReset};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::config::SchedulerConfig;
use crate::consumer::ConsumerWorker;
use crate::dlq::DeadLetterReprocessor;
use crate::writer::BatchWriter;

/// Spawned background tasks sharing one shutdown signal.
pub struct BackgroundTasks {
    shutdown: watch::Sender<bool>,
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shutdown,
            handles: Vec::new(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Spawn a task that owns its loop and watches the shutdown signal itself.
    pub fn spawn<F, Fut>(&mut self, name: &'static str, task: F)
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task(self.subscribe()));
        self.handles.push((name, handle));
        info!(task = name, "Background task started");
    }

    /// Run `tick` every `period`, first after one full period.
    pub fn spawn_periodic<F, Fut>(&mut self, name: &'static str, period: Duration, mut tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.spawn(name, move |mut shutdown| async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => tick().await,
                    _ = shutdown.changed() => break,
                }
            }
        });
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Signal every task and wait up to `deadline` for each to finish.
    pub async fn shutdown(self, deadline: Duration) {
        let _ = self.shutdown.send(true);
        for (name, handle) in self.handles {
            match tokio::time::timeout(deadline, handle).await {
                Ok(Ok(())) => info!(task = name, "Background task stopped"),
                Ok(Err(e)) => error!(task = name, error = %e, "Background task panicked"),
                Err(_) => warn!(task = name, "Background task did not stop in time"),
            }
        }
    }
}

impl Default for BackgroundTasks {
    fn default() -> Self {
        Self::new()
    }
}

/// Background worker scheduler.
pub struct WorkerScheduler {
    config: SchedulerConfig,
    flush_interval: Duration,
    metrics: Arc<Metrics>,
    writer: Option<Arc<BatchWriter>>,
    consumer: Option<ConsumerWorker>,
    reprocessor: Option<Arc<DeadLetterReprocessor>>,
    reconciler: Option<Arc<CreditReconciler>>,
    monthly_reset: Option<Arc<MonthlyReset>>,
}

impl WorkerScheduler {
    pub fn new(config: SchedulerConfig, flush_interval: Duration, metrics: Arc<Metrics>) -> Self {
        Self {
            config,
            flush_interval,
            metrics,
            writer: None,
            consumer: None,
            reprocessor: None,
            reconciler: None,
            monthly_reset: None,
        }
    }

    pub fn with_writer(mut self, writer: Arc<BatchWriter>) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn with_consumer(mut self, consumer: ConsumerWorker) -> Self {
        self.consumer = Some(consumer);
        self
    }

    pub fn with_reprocessor(mut self, reprocessor: Arc<DeadLetterReprocessor>) -> Self {
        self.reprocessor = Some(reprocessor);
        self
    }

    pub fn with_reconciler(mut self, reconciler: Arc<CreditReconciler>) -> Self {
        self.reconciler = Some(reconciler);
        self
    }

    pub fn with_monthly_reset(mut self, reset: Arc<MonthlyReset>) -> Self {
        self.monthly_reset = Some(reset);
        self
    }

    /// Starts all configured background workers.
    pub fn start(self) -> BackgroundTasks {
        let mut tasks = BackgroundTasks::new();

        // Consumer worker (Redpanda -> buffer -> ClickHouse)
        if let Some(consumer) = self.consumer {
            tasks.spawn("consumer", move |shutdown| consumer.run(shutdown));
        }

        if let Some(writer) = self.writer {
            tasks.spawn_periodic("scheduled_flush", self.flush_interval, move || {
                let writer = writer.clone();
                async move {
                    writer.scheduled_flush().await;
                }
            });
        }

        if let Some(reconciler) = self.reconciler {
            tasks.spawn_periodic(
                "credit_reconcile",
                self.config.reconcile_interval(),
                move || {
                    let reconciler = reconciler.clone();
                    async move {
                        if let Err(e) = reconciler.run_once().await {
                            error!(error = %e, "Credit reconciliation failed");
                        }
                    }
                },
            );
        }

        if self.config.monthly_reset {
            if let Some(reset) = self.monthly_reset {
                tasks.spawn("monthly_reset", move |shutdown| run_monthly_reset(reset, shutdown));
            }
        }

        if let Some(reprocessor) = self.reprocessor {
            tasks.spawn_periodic("dlq_replay", self.config.replay_interval(), move || {
                let reprocessor = reprocessor.clone();
                async move {
                    if let Err(e) = reprocessor.trigger_replay().await {
                        error!(error = %e, "Dead-letter replay failed");
                    }
                }
            });
        }

        let metrics = self.metrics;
        tasks.spawn_periodic(
            "metrics_log",
            self.config.metrics_log_interval(),
            move || {
                let metrics = metrics.clone();
                async move { log_metrics(&metrics) }
            },
        );

        info!(tasks = tasks.len(), "Background workers started");
        tasks
    }
}

async fn run_monthly_reset(reset: Arc<MonthlyReset>, mut shutdown: watch::Receiver<bool>) {
    loop {
        let now = Utc::now();
        let next = next_reset_after(now);
        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        info!(next_reset = %next, "Monthly credit reset scheduled");

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = shutdown.changed() => return,
        }

        if let Err(e) = reset.run_once().await {
            error!(error = %e, "Monthly credit reset failed");
        }
    }
}

fn log_metrics(metrics: &Metrics) {
    let snapshot = metrics.snapshot();
    info!(
        events_received = snapshot.events_received,
        events_accepted = snapshot.events_accepted,
        rejected_quota = snapshot.rejected_quota,
        rejected_unavailable = snapshot.rejected_unavailable,
        credit_overdrafts = snapshot.credit_overdrafts,
        events_persisted = snapshot.events_persisted,
        batches_flushed = snapshot.batches_flushed,
        batches_failed = snapshot.batches_failed,
        dead_lettered = snapshot.events_dead_lettered,
        dead_letter_publish_failures = snapshot.dead_letter_publish_failures,
        buffer_size = snapshot.buffer_size,
        failure_rate = snapshot.failure_rate,
        admission_latency_mean_ms = snapshot.admission_latency_mean_ms,
        "Pipeline metrics"
    );
}
