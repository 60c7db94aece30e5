#![allow(dead_code)]

use analysis_worker::resilience::RetryPolicy;
use analysis_worker::{
    CellSetStore, FileCellSetStore, RWorkerClient, TaskDispatcher, WorkRequest, WorkerConfig,
};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub const API_URL: &str = "http://api.test";

pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

pub fn fixture_store() -> Arc<dyn CellSetStore> {
    Arc::new(FileCellSetStore::new(fixtures_dir().join("cell_sets")))
}

/// Short budget so exhaustion tests finish quickly
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        initial_interval: Duration::from_millis(10),
        max_interval: Duration::from_millis(40),
        multiplier: 2.0,
        max_elapsed: Duration::from_millis(250),
        jitter: false,
    }
}

pub fn test_config(r_worker_url: &str) -> WorkerConfig {
    let mut config = WorkerConfig::default();
    config.r_worker.url = r_worker_url.to_string();
    config.api.url = API_URL.to_string();
    config.cell_sets.directory = fixtures_dir().join("cell_sets").display().to_string();
    config
}

pub fn client(r_worker_url: &str) -> RWorkerClient {
    RWorkerClient::with_policy(r_worker_url, Duration::from_secs(5), fast_retry())
        .expect("mock server URL is valid")
}

pub fn dispatcher(r_worker_url: &str) -> TaskDispatcher {
    TaskDispatcher::new(
        Arc::new(test_config(r_worker_url)),
        client(r_worker_url),
        fixture_store(),
    )
}

pub fn request(experiment_id: &str, body: Value) -> WorkRequest {
    WorkRequest::new(experiment_id, body).expect("body is an object")
}

pub fn de_body(cell_set: &str, compare_with: &str) -> Value {
    json!({
        "name": "DifferentialExpression",
        "cellSet": cell_set,
        "compareWith": compare_with
    })
}

/// Backend rows with every field the worker keeps plus one it drops
pub fn de_rows(count: usize) -> Value {
    Value::Array(
        (0..count)
            .map(|i| {
                json!({
                    "gene_names": format!("GENE{i}"),
                    "zscore": 5.0 - i as f64,
                    "abszscore": 5.0 - i as f64,
                    "qval": 0.001 * (i + 1) as f64,
                    "log2fc": 1.5,
                    "_row": format!("ENSG{i:05}"),
                    "pval": 0.0001
                })
            })
            .collect(),
    )
}

pub fn data_envelope(data: Value) -> String {
    json!({ "data": data }).to_string()
}
