//! # Worker Loop
//!
//! Consumes one request at a time, dispatches it and publishes exactly one response
//! for it. Failures become error responses; the loop keeps going. It stops when the
//! queue is exhausted or nothing has arrived for `worker.idle_timeout_seconds`.
//!
//! The only state carried between requests is the [`DatasetHandle`], loaded on the
//! first request and reused afterwards.

use crate::cell_sets::CellSetStore;
use crate::dispatcher::TaskDispatcher;
use crate::error::{Result, WorkerError};
use crate::messaging::MessageQueue;
use crate::models::{DatasetHandle, TaskResult, WorkRequest, WorkResponse};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Prepares the experiment dataset a worker serves
#[async_trait]
pub trait DatasetLoader: Send + Sync {
    async fn load(&self, experiment_id: &str) -> Result<DatasetHandle>;
}

/// Treats an experiment as loaded once its cell sets can be read
pub struct CellSetDatasetLoader {
    store: Arc<dyn CellSetStore>,
}

impl CellSetDatasetLoader {
    pub fn new(store: Arc<dyn CellSetStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl DatasetLoader for CellSetDatasetLoader {
    async fn load(&self, experiment_id: &str) -> Result<DatasetHandle> {
        let forest = self
            .store
            .fetch(experiment_id)
            .await
            .map_err(|e| WorkerError::dataset_load(experiment_id, e.to_string()))?;
        info!(
            experiment_id = %experiment_id,
            root_sets = forest.len(),
            "Dataset loaded"
        );
        Ok(DatasetHandle::new(experiment_id))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub total_processed: u64,
    pub total_succeeded: u64,
    pub total_failed: u64,
}

/// Why [`WorkerLoop::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    IdleTimeout,
    QueueExhausted,
}

pub struct WorkerLoop {
    dispatcher: TaskDispatcher,
    queue: Arc<dyn MessageQueue>,
    loader: Arc<dyn DatasetLoader>,
    dataset: Option<DatasetHandle>,
    idle_timeout: Duration,
    poll_interval: Duration,
    stats: WorkerStats,
}

impl WorkerLoop {
    pub fn new(
        dispatcher: TaskDispatcher,
        queue: Arc<dyn MessageQueue>,
        loader: Arc<dyn DatasetLoader>,
    ) -> Self {
        let idle_timeout = dispatcher.config().idle_timeout();
        let poll_interval = dispatcher.config().poll_interval();
        Self {
            dispatcher,
            queue,
            loader,
            dataset: None,
            idle_timeout,
            poll_interval,
            stats: WorkerStats::default(),
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    pub fn dataset(&self) -> Option<&DatasetHandle> {
        self.dataset.as_ref()
    }

    /// Run until idle or exhausted. Only a failure to publish ends the loop early.
    pub async fn run(&mut self) -> Result<StopReason> {
        info!(
            idle_timeout_seconds = self.idle_timeout.as_secs(),
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Worker loop started"
        );
        let mut last_activity = Instant::now();

        let reason = loop {
            let idle_for = last_activity.elapsed();
            if idle_for >= self.idle_timeout {
                break StopReason::IdleTimeout;
            }
            let wait = self.poll_interval.min(self.idle_timeout - idle_for);

            let message = match tokio::time::timeout(wait, self.queue.consume()).await {
                Err(_) => continue,
                Ok(Ok(Some(message))) => message,
                Ok(Ok(None)) => {
                    if self.queue.is_exhausted() {
                        break StopReason::QueueExhausted;
                    }
                    tokio::time::sleep(wait).await;
                    continue;
                }
                Ok(Err(error)) => {
                    warn!(error = %error, "Failed to consume message");
                    self.record(&Err(&error));
                    self.queue
                        .publish(&WorkResponse::failure(Value::Null, &error))
                        .await?;
                    last_activity = Instant::now();
                    continue;
                }
            };

            let response = self.process(message).await;
            self.queue.publish(&response).await?;
            last_activity = Instant::now();
        };

        info!(
            reason = ?reason,
            total_processed = self.stats.total_processed,
            total_failed = self.stats.total_failed,
            "Worker loop stopped"
        );
        Ok(reason)
    }

    /// Turn one raw message into the response to publish for it
    pub async fn process(&mut self, message: Value) -> WorkResponse {
        let request_id = Uuid::new_v4();
        let span = info_span!("work_request", request_id = %request_id);

        let outcome = self.handle(&message).instrument(span).await;
        self.record(&outcome.as_ref().map(|_| ()));

        match outcome {
            Ok(results) => WorkResponse::success(message, results),
            Err(error) => {
                error!(
                    request_id = %request_id,
                    error_code = %error.error_code(),
                    error = %error,
                    "Request failed"
                );
                WorkResponse::failure(message, &error)
            }
        }
    }

    async fn handle(&mut self, message: &Value) -> Result<Vec<TaskResult>> {
        let request = WorkRequest::from_value(message.clone())?;
        debug!(
            experiment_id = %request.experiment_id,
            task = request.task_name().unwrap_or("<none>"),
            "Request received"
        );

        if self.dataset.is_none() {
            let experiment_id = self
                .dispatcher
                .config()
                .worker
                .experiment_id
                .clone()
                .unwrap_or_else(|| request.experiment_id.clone());
            self.dataset = Some(self.loader.load(&experiment_id).await?);
        }

        self.dispatcher.submit(&request, self.dataset.as_ref()).await
    }

    fn record(&mut self, outcome: &std::result::Result<(), &WorkerError>) {
        self.stats.total_processed += 1;
        match outcome {
            Ok(()) => self.stats.total_succeeded += 1,
            Err(_) => self.stats.total_failed += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell_sets::InMemoryCellSetStore;
    use crate::client::RWorkerClient;
    use crate::config::WorkerConfig;
    use crate::messaging::InMemoryQueue;
    use crate::models::CellSetNode;
    use crate::resilience::RetryPolicy;
    use serde_json::json;

    fn worker(queue: Arc<InMemoryQueue>) -> WorkerLoop {
        let store: Arc<dyn CellSetStore> = Arc::new(
            InMemoryCellSetStore::new()
                .with_experiment("e1", vec![CellSetNode::leaf("cluster1", [1]).as_root()]),
        );
        let client = RWorkerClient::with_policy(
            "http://127.0.0.1:9",
            Duration::from_millis(50),
            RetryPolicy::default(),
        )
        .unwrap();
        let dispatcher = TaskDispatcher::new(Arc::new(WorkerConfig::default()), client, store.clone());

        WorkerLoop::new(dispatcher, queue, Arc::new(CellSetDatasetLoader::new(store)))
            .with_idle_timeout(Duration::from_millis(100))
    }

    #[tokio::test]
    async fn test_failures_are_published_and_the_loop_continues() {
        let queue = Arc::new(InMemoryQueue::with_messages([
            json!({"experimentId": "e1", "body": {"name": "GetEmbedding"}}),
            json!({"no": "experiment"}),
        ]));
        let mut worker = worker(queue.clone());

        let reason = worker.run().await.unwrap();

        assert_eq!(reason, StopReason::IdleTimeout);
        let published = queue.published().await;
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].error.as_ref().unwrap().error_code, "UNSUPPORTED_TASK");
        assert_eq!(published[1].error.as_ref().unwrap().error_code, "INVALID_PARAMETERS");
        assert_eq!(published[0].request["body"]["name"], "GetEmbedding");
        assert_eq!(worker.stats().total_failed, 2);
    }

    #[tokio::test]
    async fn test_dataset_is_loaded_once_and_kept() {
        let queue = Arc::new(InMemoryQueue::new());
        let mut worker = worker(queue);

        worker
            .process(json!({"experimentId": "e1", "body": {"name": "GetEmbedding"}}))
            .await;
        let first = worker.dataset().cloned().unwrap();
        worker
            .process(json!({"experimentId": "e1", "body": {"name": "GetEmbedding"}}))
            .await;

        assert_eq!(worker.dataset(), Some(&first));
    }

    #[tokio::test]
    async fn test_failed_dataset_load_leaves_no_handle() {
        let queue = Arc::new(InMemoryQueue::new());
        let mut worker = worker(queue);

        let response = worker
            .process(json!({"experimentId": "unknown", "body": {"name": "getMitochondrialContent"}}))
            .await;

        assert_eq!(response.error.unwrap().error_code, "DATASET_LOAD_ERROR");
        assert!(worker.dataset().is_none());
    }

    #[tokio::test]
    async fn test_idle_worker_stops() {
        let queue = Arc::new(InMemoryQueue::new());
        let mut worker = worker(queue.clone());

        assert_eq!(worker.run().await.unwrap(), StopReason::IdleTimeout);
        assert!(queue.published().await.is_empty());
    }
}
