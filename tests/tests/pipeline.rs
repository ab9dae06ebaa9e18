//! Persistence pipeline: event topic to store, dead letters, and replay.

use std::time::Duration;

use engine_core::StoreFailure;
use integration_tests::{fixtures, setup::PipelineContext};
use uuid::Uuid;
use worker::{ConsumerWorker, SchedulerConfig, WorkerScheduler};

fn consumer(ctx: &PipelineContext) -> ConsumerWorker {
    ConsumerWorker::new(
        ctx.events.clone(),
        ctx.writer.clone(),
        Duration::from_secs(3600),
    )
}

/// Process until the topic is drained and the idle fetch has flushed.
async fn drain(worker: &mut ConsumerWorker) -> usize {
    let mut total = 0;
    loop {
        let n = worker.process_once().await.unwrap();
        if n == 0 {
            return total;
        }
        total += n;
    }
}

#[tokio::test]
async fn test_consumed_events_are_persisted_and_committed() {
    let ctx = PipelineContext::new(PipelineContext::fast_config());
    let app_id = Uuid::new_v4();
    let envelopes = fixtures::envelopes(app_id, 120);
    let ids: Vec<Uuid> = envelopes.iter().map(|e| e.id).collect();
    ctx.events.push_all(envelopes);

    let mut worker = consumer(&ctx);
    assert_eq!(drain(&mut worker).await, 120);

    let stored: Vec<Uuid> = ctx.store.rows().iter().map(|e| e.id).collect();
    assert_eq!(stored, ids);
    assert_eq!(ctx.events.committed(), 120);
    assert_eq!(ctx.metrics.events_consumed.get(), 120);
    assert_eq!(ctx.metrics.events_persisted.get(), 120);
    assert!(ctx.publisher.dead_letters().is_empty());
}

#[tokio::test]
async fn test_store_outage_dead_letters_then_replays() {
    let ctx = PipelineContext::new(PipelineContext::fast_config());
    let envelopes = fixtures::envelopes(Uuid::new_v4(), 10);
    let ids: Vec<Uuid> = envelopes.iter().map(|e| e.id).collect();
    ctx.events.push_all(envelopes);
    ctx.store.set_failure(Some(StoreFailure::Transient));

    let mut worker = consumer(&ctx);
    drain(&mut worker).await;

    assert!(ctx.store.rows().is_empty());
    assert_eq!(ctx.store.attempts(), 3);
    assert_eq!(ctx.events.committed(), 10);
    assert_eq!(ctx.metrics.batches_failed.get(), 1);

    let dead_letters = ctx.publisher.dead_letters();
    assert_eq!(dead_letters.len(), 10);
    assert!(dead_letters.iter().all(|r| r.attempts == 1));
    assert!(dead_letters
        .iter()
        .all(|r| r.error_message.contains("mock store refused insert")));

    assert_eq!(ctx.deliver_dead_letters(), 10);
    ctx.store.set_failure(None);

    let report = ctx
        .reprocessor(Duration::from_secs(5))
        .trigger_replay()
        .await
        .unwrap();

    assert_eq!(report.consumed, 10);
    assert_eq!(report.persisted, 10);
    let stored: Vec<Uuid> = ctx.store.rows().iter().map(|e| e.id).collect();
    assert_eq!(stored, ids);
    assert_eq!(ctx.dead_letter_topic.committed(), 10);
    assert_eq!(ctx.metrics.events_replayed.get(), 10);
}

#[tokio::test]
async fn test_permanent_failure_skips_retries() {
    let ctx = PipelineContext::new(PipelineContext::fast_config());
    ctx.events.push_all(fixtures::envelopes(Uuid::new_v4(), 4));
    ctx.store.set_failure(Some(StoreFailure::Permanent));

    let mut worker = consumer(&ctx);
    drain(&mut worker).await;

    assert_eq!(ctx.store.attempts(), 1);
    assert_eq!(ctx.publisher.dead_letters().len(), 4);
    assert_eq!(ctx.metrics.persist_retries.get(), 0);
}

#[tokio::test]
async fn test_failed_replay_is_requeued_for_a_later_pulse() {
    let ctx = PipelineContext::new(PipelineContext::fast_config());
    ctx.events.push_all(fixtures::envelopes(Uuid::new_v4(), 5));
    ctx.store.set_failure(Some(StoreFailure::Transient));

    let mut worker = consumer(&ctx);
    drain(&mut worker).await;
    ctx.deliver_dead_letters();

    let reprocessor = ctx.reprocessor(Duration::from_secs(5));
    let first = reprocessor.trigger_replay().await.unwrap();
    assert_eq!(first.requeued, 5);
    assert_eq!(first.persisted, 0);
    assert_eq!(ctx.dead_letter_topic.committed(), 5);

    let requeued = ctx.publisher.dead_letters();
    assert!(requeued.iter().all(|r| r.attempts == 2));
    ctx.deliver_dead_letters();
    ctx.store.set_failure(None);

    let second = reprocessor.trigger_replay().await.unwrap();
    assert_eq!(second.consumed, 5);
    assert_eq!(second.persisted, 5);
    assert_eq!(ctx.store.rows().len(), 5);
    assert_eq!(ctx.dead_letter_topic.committed(), 10);
}

#[tokio::test]
async fn test_lost_dead_letters_are_counted() {
    let ctx = PipelineContext::new(PipelineContext::fast_config());
    ctx.events.push_all(fixtures::envelopes(Uuid::new_v4(), 3));
    ctx.store.set_failure(Some(StoreFailure::Permanent));
    ctx.publisher.set_fail_dead_letters(true);

    let mut worker = consumer(&ctx);
    drain(&mut worker).await;

    assert_eq!(ctx.metrics.dead_letter_publish_failures.get(), 1);
    assert_eq!(ctx.metrics.events_dead_lettered.get(), 0);
}

#[tokio::test]
async fn test_scheduler_runs_pipeline_until_shutdown() {
    let config = PipelineContext::fast_config();
    let ctx = PipelineContext::new(config.clone());
    ctx.events.push_all(fixtures::envelopes(Uuid::new_v4(), 25));

    let worker = ConsumerWorker::new(
        ctx.events.clone(),
        ctx.writer.clone(),
        Duration::from_millis(50),
    );
    let tasks = WorkerScheduler::new(
        SchedulerConfig::default(),
        Duration::from_millis(50),
        ctx.metrics.clone(),
    )
    .with_writer(ctx.writer.clone())
    .with_consumer(worker)
    .start();

    let persisted = tokio::time::timeout(Duration::from_secs(5), async {
        while ctx.store.rows().len() < 25 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(persisted.is_ok(), "pipeline did not persist in time");

    tasks.shutdown(Duration::from_secs(1)).await;
    assert_eq!(ctx.events.committed(), 25);
    assert!(ctx.writer.buffer().is_empty());
}
