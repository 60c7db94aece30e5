//! # Clustering
//!
//! The backend clusters the experiment and patches the resulting cell sets back
//! through the experiment API, so the request carries the API location and the
//! caller's credentials. Results are never cached.

use super::{Task, TaskContext, TaskKind};
use crate::error::{Result, WorkerError};
use crate::models::WorkRequest;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

const DEFAULT_RESOLUTION: f64 = 0.5;

#[derive(Debug, Clone)]
pub struct ClusterCells {
    experiment_id: String,
    clustering_type: String,
    config: Map<String, Value>,
    authorization: String,
    fingerprint: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusteringRequest {
    #[serde(rename = "type")]
    pub clustering_type: String,
    pub config: Map<String, Value>,
}

impl ClusterCells {
    pub fn from_request(request: &WorkRequest) -> Result<Self> {
        let task = TaskKind::ClusterCells.name();
        let body = request.body_for(task)?;

        let config = body.required_object("config")?.clone();
        if let Some(resolution) = config.get("resolution") {
            if !resolution.as_f64().is_some_and(|r| r > 0.0) {
                return Err(WorkerError::parameter(format!(
                    "{task}: resolution must be a positive number, got {resolution}"
                )));
            }
        }

        let authorization = request
            .authorization
            .clone()
            .ok_or_else(|| WorkerError::missing_field(task, "Authorization"))?;

        Ok(Self {
            experiment_id: request.experiment_id.clone(),
            clustering_type: body.required_str("type")?.to_string(),
            config,
            authorization,
            fingerprint: request.fingerprint(),
        })
    }
}

#[async_trait]
impl Task for ClusterCells {
    type Request = ClusteringRequest;

    fn kind(&self) -> TaskKind {
        TaskKind::ClusterCells
    }

    fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    fn cacheable(&self) -> bool {
        false
    }

    async fn format_request(&self, ctx: &TaskContext<'_>) -> Result<Self::Request> {
        let mut config = self.config.clone();
        config
            .entry("resolution")
            .or_insert_with(|| Value::from(DEFAULT_RESOLUTION));
        config.insert(
            "experimentId".to_string(),
            Value::String(self.experiment_id.clone()),
        );
        config.insert(
            "apiUrl".to_string(),
            Value::String(ctx.config.api.url.clone()),
        );
        config.insert(
            "authJwt".to_string(),
            Value::String(self.authorization.clone()),
        );

        Ok(ClusteringRequest {
            clustering_type: self.clustering_type.clone(),
            config,
        })
    }
}
