//! # Task Dispatcher
//!
//! Routes a decoded [`WorkRequest`] to its [`AnalysisTask`], serving cacheable
//! results from the [`ResultCache`] when a request with the same fingerprint has
//! already been computed. A non-cacheable task may rewrite the experiment's
//! cell sets, so once one runs every cached result for that experiment is dropped.

use crate::cache::ResultCache;
use crate::cell_sets::CellSetStore;
use crate::client::RWorkerClient;
use crate::config::WorkerConfig;
use crate::error::{Result, WorkerError};
use crate::models::{DatasetHandle, TaskResult, WorkRequest};
use crate::tasks::{AnalysisTask, TaskContext};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct TaskDispatcher {
    config: Arc<WorkerConfig>,
    client: RWorkerClient,
    cell_sets: Arc<dyn CellSetStore>,
    cache: ResultCache,
}

impl TaskDispatcher {
    pub fn new(
        config: Arc<WorkerConfig>,
        client: RWorkerClient,
        cell_sets: Arc<dyn CellSetStore>,
    ) -> Self {
        let cache = ResultCache::new(&config.cache);
        Self::with_cache(config, client, cell_sets, cache)
    }

    pub fn with_cache(
        config: Arc<WorkerConfig>,
        client: RWorkerClient,
        cell_sets: Arc<dyn CellSetStore>,
        cache: ResultCache,
    ) -> Self {
        Self {
            config,
            client,
            cell_sets,
            cache,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Validate, compute (or recall) and return the results for one request
    pub async fn submit(
        &self,
        request: &WorkRequest,
        dataset: Option<&DatasetHandle>,
    ) -> Result<Vec<TaskResult>> {
        if request.is_expired_at(Utc::now())? {
            warn!(
                experiment_id = %request.experiment_id,
                timeout = ?request.timeout,
                "Rejecting expired request"
            );
            return Err(WorkerError::RequestExpired {
                timeout: request.timeout.clone().unwrap_or_default(),
            });
        }

        let task = AnalysisTask::from_request(request)?;

        if let Some(dataset) = dataset {
            if !dataset.serves(&request.experiment_id) {
                return Err(WorkerError::parameter(format!(
                    "request for experiment {} reached a worker serving {}",
                    request.experiment_id, dataset.experiment_id
                )));
            }
        }

        if task.cacheable() {
            if let Some(cached) = self.cache.get(task.fingerprint()) {
                info!(task = %task.kind(), fingerprint = %task.fingerprint(), "Serving cached result");
                return Ok(vec![cached]);
            }
        }

        let ctx = TaskContext {
            config: &self.config,
            client: &self.client,
            cell_sets: self.cell_sets.as_ref(),
            dataset,
        };
        let outcome = task.compute(&ctx).await;

        // The cell-set patch may have landed even when the task reports an error.
        if !task.cacheable() {
            let dropped = self.cache.invalidate_experiment(&request.experiment_id);
            if dropped > 0 {
                info!(
                    task = %task.kind(),
                    experiment_id = %request.experiment_id,
                    dropped = dropped,
                    "Dropped cached results after cell sets changed"
                );
            }
        }

        let result = outcome?;
        if self.cache.insert(&request.experiment_id, &result) {
            debug!(task = %task.kind(), fingerprint = %result.fingerprint, "Result cached");
        }

        Ok(vec![result])
    }
}

impl std::fmt::Debug for TaskDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskDispatcher")
            .field("client", &self.client)
            .field("cached_results", &self.cache.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell_sets::InMemoryCellSetStore;
    use crate::resilience::RetryPolicy;
    use serde_json::json;
    use std::time::Duration;

    fn dispatcher() -> TaskDispatcher {
        // Nothing listens here; these tests must fail before any HTTP call.
        let client = RWorkerClient::with_policy(
            "http://127.0.0.1:9",
            Duration::from_millis(50),
            RetryPolicy::default(),
        )
        .unwrap();
        TaskDispatcher::new(
            Arc::new(WorkerConfig::default()),
            client,
            Arc::new(InMemoryCellSetStore::new()),
        )
    }

    #[tokio::test]
    async fn test_unknown_task_is_rejected_before_dispatch() {
        let request = WorkRequest::new("e1", json!({"name": "GetEmbedding"})).unwrap();
        let err = dispatcher().submit(&request, None).await.unwrap_err();
        assert_eq!(err.error_code(), "UNSUPPORTED_TASK");
    }

    #[tokio::test]
    async fn test_expired_request_is_rejected() {
        let request = WorkRequest::new("e1", json!({"name": "getMitochondrialContent"}))
            .unwrap()
            .with_timeout("2001-01-01 00:00:00");
        let err = dispatcher().submit(&request, None).await.unwrap_err();
        assert!(matches!(err, WorkerError::RequestExpired { .. }));
    }

    #[tokio::test]
    async fn test_dataset_for_another_experiment_is_rejected() {
        let request = WorkRequest::new("e1", json!({"name": "getMitochondrialContent"})).unwrap();
        let dataset = DatasetHandle::new("e2");
        let err = dispatcher().submit(&request, Some(&dataset)).await.unwrap_err();
        assert!(matches!(err, WorkerError::Parameter(_)));
    }

    #[tokio::test]
    async fn test_cached_result_is_served_without_compute() {
        let dispatcher = dispatcher();
        let request = WorkRequest::new("e1", json!({"name": "getMitochondrialContent"})).unwrap();
        let cached = TaskResult::new(json!([0.1, 0.2]), true, request.fingerprint());
        dispatcher.cache().insert("e1", &cached);

        let results = dispatcher.submit(&request, None).await.unwrap();
        assert_eq!(results, vec![cached]);
    }

    #[tokio::test]
    async fn test_failed_cluster_cells_still_drops_cached_results() {
        let client = RWorkerClient::with_policy(
            "http://127.0.0.1:9",
            Duration::from_millis(50),
            RetryPolicy {
                initial_interval: Duration::from_millis(5),
                max_interval: Duration::from_millis(10),
                multiplier: 2.0,
                max_elapsed: Duration::from_millis(30),
                jitter: false,
            },
        )
        .unwrap();
        let dispatcher = TaskDispatcher::new(
            Arc::new(WorkerConfig::default()),
            client,
            Arc::new(InMemoryCellSetStore::new()),
        );
        let cache = dispatcher.cache();
        cache.insert("e1", &TaskResult::new(json!({"rows": []}), true, "de-fp"));
        cache.insert("e2", &TaskResult::new(json!({"rows": []}), true, "other-fp"));

        // Nothing answers, so clustering fails after it has been dispatched.
        let request = WorkRequest::new(
            "e1",
            json!({"name": "ClusterCells", "type": "louvain", "config": {}}),
        )
        .unwrap()
        .with_authorization("Bearer token");
        assert!(dispatcher.submit(&request, None).await.is_err());

        assert_eq!(cache.get("de-fp"), None);
        assert!(cache.get("other-fp").is_some());
    }
}
