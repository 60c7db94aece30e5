//! # Cell Set Stores
//!
//! The backing store that holds an experiment's cell set forest is an external
//! collaborator. The worker reads it once per request, whole, through
//! [`CellSetStore`].

use crate::error::{Result, WorkerError};
use crate::models::CellSetNode;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

#[async_trait]
pub trait CellSetStore: Send + Sync {
    /// Fetch the complete cell set forest for an experiment
    async fn fetch(&self, experiment_id: &str) -> Result<Vec<CellSetNode>>;
}

/// Fixed forests keyed by experiment id
#[derive(Debug, Default, Clone)]
pub struct InMemoryCellSetStore {
    experiments: HashMap<String, Vec<CellSetNode>>,
}

impl InMemoryCellSetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_experiment(mut self, experiment_id: impl Into<String>, forest: Vec<CellSetNode>) -> Self {
        self.experiments.insert(experiment_id.into(), forest);
        self
    }
}

#[async_trait]
impl CellSetStore for InMemoryCellSetStore {
    async fn fetch(&self, experiment_id: &str) -> Result<Vec<CellSetNode>> {
        self.experiments
            .get(experiment_id)
            .cloned()
            .ok_or_else(|| WorkerError::cell_set_store(experiment_id, "no cell sets stored"))
    }
}

/// The stored document is either `{"cellSets": [...]}` or a bare list
#[derive(Deserialize)]
#[serde(untagged)]
enum CellSetDocument {
    Wrapped {
        #[serde(rename = "cellSets")]
        cell_sets: Vec<CellSetNode>,
    },
    Bare(Vec<CellSetNode>),
}

impl CellSetDocument {
    fn into_forest(self) -> Vec<CellSetNode> {
        match self {
            CellSetDocument::Wrapped { cell_sets } => cell_sets,
            CellSetDocument::Bare(forest) => forest,
        }
    }
}

/// Reads `{directory}/{experiment_id}.json`
#[derive(Debug, Clone)]
pub struct FileCellSetStore {
    directory: PathBuf,
}

impl FileCellSetStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn document_path(&self, experiment_id: &str) -> Result<PathBuf> {
        let acceptable = !experiment_id.is_empty()
            && experiment_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !acceptable {
            return Err(WorkerError::parameter(format!(
                "invalid experiment id '{experiment_id}'"
            )));
        }
        Ok(self.directory.join(format!("{experiment_id}.json")))
    }
}

#[async_trait]
impl CellSetStore for FileCellSetStore {
    async fn fetch(&self, experiment_id: &str) -> Result<Vec<CellSetNode>> {
        let path = self.document_path(experiment_id)?;
        debug!(experiment_id = %experiment_id, path = %path.display(), "Reading cell sets");

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| WorkerError::cell_set_store(experiment_id, format!("{}: {e}", path.display())))?;
        let document: CellSetDocument = serde_json::from_slice(&bytes).map_err(|e| {
            WorkerError::cell_set_store(experiment_id, format!("malformed cell set document: {e}"))
        })?;

        Ok(document.into_forest())
    }
}
