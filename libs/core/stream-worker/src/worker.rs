//! The generic StreamWorker loop.
//!
//! Ties together the consumer, the delayed-retry buffer, and the DLQ into
//! a sequential processing loop driven by a [`messaging::Processor`].

use crate::config::WorkerConfig;
use crate::consumer::StreamConsumer;
use crate::delay::DelayBuffer;
use crate::dlq::DlqManager;
use crate::error::QueueError;
use crate::event::StreamEvent;
use crate::metrics::StreamMetrics;
use messaging::{ErrorCategory, Job, ProcessingError, Processor};
use redis::aio::ConnectionManager;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Generic stream worker that processes jobs sequentially.
///
/// The loop per iteration:
/// 1. Promote due delayed retries back onto their streams
/// 2. Read pending then new messages, highest priority first
/// 3. Process each job, one at a time
/// 4. Acknowledge every delivered message exactly once, whatever the
///    outcome; failures are re-enqueued as new entries or dead-lettered
///
/// Jobs are intentionally not processed concurrently: the pipeline behind
/// the processor has strict call-rate budgets and needs deterministic
/// ordering within a priority level.
///
/// # Type Parameters
///
/// * `J` - The job type (must implement [`messaging::Job`])
/// * `P` - The processor type (must implement [`messaging::Processor<J>`])
pub struct StreamWorker<J, P>
where
    J: Job,
    P: Processor<J>,
{
    consumer: StreamConsumer,
    delay: DelayBuffer,
    dlq: DlqManager,
    processor: Arc<P>,
    config: WorkerConfig,
    metrics: StreamMetrics,
    _phantom: PhantomData<J>,
}

impl<J, P> StreamWorker<J, P>
where
    J: Job,
    P: Processor<J> + 'static,
{
    /// Create a new stream worker.
    pub fn new(redis: ConnectionManager, processor: P, config: WorkerConfig) -> Self {
        Self::with_arc_processor(redis, Arc::new(processor), config)
    }

    /// Create a new stream worker with an Arc processor.
    pub fn with_arc_processor(
        redis: ConnectionManager,
        processor: Arc<P>,
        config: WorkerConfig,
    ) -> Self {
        let redis = Arc::new(redis);
        let consumer = StreamConsumer::new(redis.clone(), config.clone());
        let delay = DelayBuffer::new(redis.clone(), &config.delayed_set, &config.base_stream)
            .with_max_length(config.max_length);
        let dlq = DlqManager::new(redis, &config.dlq_stream);
        let metrics = StreamMetrics::new(&config.base_stream, processor.name());

        Self {
            consumer,
            delay,
            dlq,
            processor,
            config,
            metrics,
            _phantom: PhantomData,
        }
    }

    /// Get a reference to the consumer for health checks.
    pub fn consumer(&self) -> &StreamConsumer {
        &self.consumer
    }

    /// Get a clone of the Redis connection manager.
    pub fn redis(&self) -> Arc<ConnectionManager> {
        self.consumer.redis()
    }

    /// Run the worker loop until the shutdown signal flips to true.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), QueueError> {
        info!(
            consumer_id = %self.consumer.consumer_id(),
            base_stream = %self.config.base_stream,
            group = %self.config.consumer_group,
            processor = %self.processor.name(),
            batch_size = %self.config.batch_size,
            blocking_timeout_ms = ?self.config.blocking_timeout_ms,
            "Starting stream worker"
        );

        self.consumer.init_consumer_groups().await?;

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let claim_interval = Duration::from_millis(self.config.claim_timeout_ms * 2);
        let mut last_claim = std::time::Instant::now();
        let is_blocking = self.config.blocking_timeout_ms.is_some();

        // Track consecutive errors for exponential backoff
        let mut consecutive_errors: u32 = 0;
        const MAX_BACKOFF_SECS: u64 = 30;

        loop {
            if *shutdown.borrow() {
                info!("Received shutdown signal, stopping worker");
                break;
            }

            // Move due delayed retries back onto their streams first so
            // they compete with fresh jobs this iteration
            if let Err(e) = self.delay.promote_due().await {
                warn!(error = %e, "Failed to promote delayed jobs");
            }

            match self.process_batch().await {
                Ok(_) => {
                    if consecutive_errors > 0 {
                        info!(
                            consecutive_errors = %consecutive_errors,
                            "Connection recovered"
                        );
                        consecutive_errors = 0;
                    }
                }
                Err(e) => {
                    if e.is_timeout() {
                        // Blocking read timed out with no messages
                        debug!("Read timeout, no messages");
                        continue;
                    }

                    consecutive_errors += 1;

                    if e.is_nogroup_error() {
                        warn!("Consumer group missing, recreating");
                        if let Err(create_err) = self.consumer.init_consumer_groups().await {
                            error!(error = %create_err, "Failed to recreate consumer groups");
                        }
                    } else if e.is_connection_error() {
                        let backoff_secs =
                            std::cmp::min(2u64.pow(consecutive_errors.min(5)), MAX_BACKOFF_SECS);
                        warn!(
                            error = %e,
                            consecutive_errors = %consecutive_errors,
                            backoff_secs = %backoff_secs,
                            "Redis connection error, backing off"
                        );
                        tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                    } else {
                        error!(error = %e, "Error processing batch");
                    }

                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            }

            // Periodically claim abandoned messages from dead consumers
            if last_claim.elapsed() >= claim_interval {
                match self.consumer.claim_abandoned::<J>(self.config.batch_size).await {
                    Ok(claimed) => {
                        for event in claimed {
                            self.metrics.message_claimed();
                            self.process_event(&event).await;
                        }
                    }
                    Err(e) => debug!(error = %e, "Error claiming abandoned messages"),
                }
                last_claim = std::time::Instant::now();
            }

            self.record_depth_gauges().await;

            // In blocking mode, Redis BLOCK handles waiting; in polling
            // mode wait out the interval, interruptible by shutdown
            if !is_blocking {
                tokio::select! {
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            info!("Received shutdown signal, stopping worker");
                            break;
                        }
                    }
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            }
        }

        info!("Stream worker stopped");
        Ok(())
    }

    /// Read and process one batch, pending messages before new ones.
    async fn process_batch(&self) -> Result<(), QueueError> {
        let pending = self.consumer.read_pending::<J>(self.config.batch_size).await?;
        let new_events = self.consumer.read_new::<J>(self.config.batch_size).await?;

        if pending.is_empty() && new_events.is_empty() {
            return Ok(());
        }

        for event in pending.iter().chain(new_events.iter()) {
            self.metrics.job_received();
            self.process_event(event).await;
        }

        Ok(())
    }

    /// Process a single event and settle it (ack, retry, or DLQ).
    async fn process_event(&self, event: &StreamEvent<J>) {
        debug!(
            stream = %event.stream,
            stream_id = %event.stream_id,
            job_id = %event.job_id(),
            retry_count = %event.retry_count(),
            redelivery = %event.is_redelivery(),
            "Processing job"
        );

        let start = std::time::Instant::now();

        match self.processor.process(&event.job).await {
            Ok(()) => {
                self.metrics.job_processed(start.elapsed());

                if let Err(e) = self.consumer.ack(&event.stream, &event.stream_id).await {
                    error!(
                        stream_id = %event.stream_id,
                        error = %e,
                        "Failed to ACK message"
                    );
                }
            }
            Err(e) => {
                self.metrics.job_failed(&e.category().to_string());

                warn!(
                    stream_id = %event.stream_id,
                    job_id = %event.job_id(),
                    error = %e,
                    error_category = %e.category(),
                    "Job processing failed"
                );

                if let Err(handler_err) = self.settle_failure(event, e).await {
                    error!(
                        stream_id = %event.stream_id,
                        error = %handler_err,
                        "Failed to settle failed job"
                    );
                    // Still ACK to prevent a redelivery loop
                    let _ = self.consumer.ack(&event.stream, &event.stream_id).await;
                }
            }
        }
    }

    /// Decide the fate of a failed job.
    ///
    /// - Permanent errors go straight to the DLQ
    /// - Jobs out of retries go to the DLQ
    /// - Everything else is parked in the delay buffer with backoff
    ///
    /// The original message is acknowledged in every branch.
    async fn settle_failure(
        &self,
        event: &StreamEvent<J>,
        error: ProcessingError,
    ) -> Result<(), QueueError> {
        let job = &event.job;
        let max_retries = error
            .category()
            .max_retries()
            .max(self.config.max_retries);

        if error.category() == ErrorCategory::Permanent {
            warn!(
                job_id = %job.job_id(),
                error_category = %error.category(),
                "Permanent error, moving to DLQ without retry"
            );

            if self.config.enable_dlq {
                self.dlq.push(job, &error.to_string(), &event.stream).await?;
            }
            self.metrics.job_moved_to_dlq();
            self.consumer.ack(&event.stream, &event.stream_id).await?;
            return Ok(());
        }

        if job.retry_count() >= max_retries {
            warn!(
                job_id = %job.job_id(),
                max_retries = %max_retries,
                "Job exceeded max retries, moving to DLQ"
            );

            if self.config.enable_dlq {
                self.dlq.push(job, &error.to_string(), &event.stream).await?;
            }
            self.metrics.job_moved_to_dlq();
            self.consumer.ack(&event.stream, &event.stream_id).await?;
            return Ok(());
        }

        let delay_ms = error.backoff_delay_ms(job.retry_count());
        let retry_job = job.with_retry();

        info!(
            job_id = %job.job_id(),
            retry_attempt = %retry_job.retry_count(),
            delay_ms = %delay_ms,
            error_category = %error.category(),
            "Scheduling retry with backoff"
        );

        self.delay.schedule(&retry_job, delay_ms).await?;
        self.metrics.job_retried();
        self.consumer.ack(&event.stream, &event.stream_id).await?;

        Ok(())
    }

    async fn record_depth_gauges(&self) {
        if let Ok(info) = self.consumer.stream_info().await {
            self.metrics.queue_depth(info.total_length);
            self.metrics.pending_count(info.total_pending);
            self.metrics.delayed_count(info.delayed_count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use messaging::JobPriority;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct TestJob {
        id: String,
        retry_count: u32,
    }

    impl Job for TestJob {
        fn job_id(&self) -> String {
            self.id.clone()
        }

        fn retry_count(&self) -> u32 {
            self.retry_count
        }

        fn with_retry(&self) -> Self {
            Self {
                id: self.id.clone(),
                retry_count: self.retry_count + 1,
            }
        }

        fn priority(&self) -> JobPriority {
            JobPriority::High
        }
    }

    #[test]
    fn test_retry_exhaustion_boundary() {
        let job = TestJob {
            id: "job-1".to_string(),
            retry_count: 3,
        };

        // At max_retries the job must not be retried again
        assert!(!job.can_retry());
        assert!(job.retry_count() >= job.max_retries());
    }

    #[test]
    fn test_backoff_uses_error_category() {
        let err = ProcessingError::transient("redis down");
        assert!(err.should_retry(0));
        assert_eq!(err.backoff_delay_ms(0), 1000);
        assert_eq!(err.backoff_delay_ms(2), 4000);
        assert_eq!(err.backoff_delay_ms(6), 30_000);

        let permanent = ProcessingError::permanent("unparseable job");
        assert!(!permanent.should_retry(0));
    }
}
