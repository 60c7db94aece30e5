//! Process-wide handle to the experiment dataset the compute backend has loaded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Loaded once per process and shared read-only across requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetHandle {
    pub experiment_id: String,
    pub loaded_at: DateTime<Utc>,
}

impl DatasetHandle {
    pub fn new(experiment_id: impl Into<String>) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            loaded_at: Utc::now(),
        }
    }

    pub fn serves(&self, experiment_id: &str) -> bool {
        self.experiment_id == experiment_id
    }
}
