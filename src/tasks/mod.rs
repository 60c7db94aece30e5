//! # Analysis Tasks
//!
//! One implementation per [`TaskKind`]. Every task follows the same lifecycle:
//!
//! ```text
//! from_request (validate body) -> format_request -> RWorkerClient::invoke
//!     -> format_result -> TaskResult { cacheable, fingerprint }
//! ```
//!
//! The set of kinds is closed: adding one means adding a `TaskKind` variant, an
//! [`AnalysisTask`] variant and the match arms the compiler then asks for.

pub mod cluster_cells;
pub mod differential_expression;
pub mod doublet_score;
pub mod mitochondrial_content;

use crate::cell_sets::CellSetStore;
use crate::client::RWorkerClient;
use crate::config::WorkerConfig;
use crate::error::{Result, WorkerError};
use crate::log_task;
use crate::models::{DatasetHandle, TaskResult, WorkRequest};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

pub use cluster_cells::{ClusterCells, ClusteringRequest};
pub use differential_expression::{
    DifferentialExpression, DifferentialExpressionRequest, ROW_FIELDS,
};
pub use doublet_score::{DoubletScoreRequest, GetDoubletScore};
pub use mitochondrial_content::{GetMitochondrialContent, MitochondrialContentRequest};

/// Supported analyses, keyed by the `body.name` of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    DifferentialExpression,
    DoubletScore,
    ClusterCells,
    MitochondrialContent,
}

impl TaskKind {
    pub const ALL: [TaskKind; 4] = [
        TaskKind::DifferentialExpression,
        TaskKind::DoubletScore,
        TaskKind::ClusterCells,
        TaskKind::MitochondrialContent,
    ];

    /// Name carried in `body.name`
    pub fn name(self) -> &'static str {
        match self {
            TaskKind::DifferentialExpression => "DifferentialExpression",
            TaskKind::DoubletScore => "getDoubletScore",
            TaskKind::ClusterCells => "ClusterCells",
            TaskKind::MitochondrialContent => "getMitochondrialContent",
        }
    }

    /// Path segment under `/v0/` on the compute backend
    pub fn endpoint(self) -> &'static str {
        match self {
            TaskKind::DifferentialExpression => "DifferentialExpression",
            TaskKind::DoubletScore => "getDoubletScore",
            TaskKind::ClusterCells => "getClusters",
            TaskKind::MitochondrialContent => "getMitochondrialContent",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TaskKind {
    type Err = WorkerError;

    fn from_str(name: &str) -> Result<Self> {
        TaskKind::ALL
            .into_iter()
            .find(|kind| kind.name() == name)
            .ok_or_else(|| WorkerError::unsupported_task(name))
    }
}

/// Shared, read-only collaborators handed to every task
#[derive(Clone, Copy)]
pub struct TaskContext<'a> {
    pub config: &'a WorkerConfig,
    pub client: &'a RWorkerClient,
    pub cell_sets: &'a dyn CellSetStore,
    pub dataset: Option<&'a DatasetHandle>,
}

#[async_trait]
pub trait Task: Send + Sync {
    /// Body posted to the compute backend
    type Request: Serialize + Send + Sync;

    fn kind(&self) -> TaskKind;

    fn fingerprint(&self) -> &str;

    fn cacheable(&self) -> bool {
        true
    }

    async fn format_request(&self, ctx: &TaskContext<'_>) -> Result<Self::Request>;

    /// Task-specific post-processing of the decoded backend payload
    fn format_result(&self, payload: Value) -> Result<Value> {
        Ok(payload)
    }

    async fn compute(&self, ctx: &TaskContext<'_>) -> Result<TaskResult> {
        log_task!(debug, "formatting request", task: self.kind().name());
        let request = self.format_request(ctx).await?;

        let payload = ctx.client.invoke(self.kind().endpoint(), &request).await?;
        let payload = self.format_result(payload)?;

        log_task!(
            info,
            "task computed",
            task: self.kind().name(),
            cacheable: self.cacheable()
        );
        Ok(TaskResult::new(payload, self.cacheable(), self.fingerprint()))
    }
}

/// A constructed task of any kind
#[derive(Debug, Clone)]
pub enum AnalysisTask {
    DifferentialExpression(DifferentialExpression),
    DoubletScore(GetDoubletScore),
    ClusterCells(ClusterCells),
    MitochondrialContent(GetMitochondrialContent),
}

impl AnalysisTask {
    /// Select the kind from `body.name` and validate the request for it
    pub fn from_request(request: &WorkRequest) -> Result<Self> {
        let kind: TaskKind = request.task_name()?.parse()?;
        Self::build(kind, request)
    }

    pub fn build(kind: TaskKind, request: &WorkRequest) -> Result<Self> {
        Ok(match kind {
            TaskKind::DifferentialExpression => {
                AnalysisTask::DifferentialExpression(DifferentialExpression::from_request(request)?)
            }
            TaskKind::DoubletScore => {
                AnalysisTask::DoubletScore(GetDoubletScore::from_request(request)?)
            }
            TaskKind::ClusterCells => {
                AnalysisTask::ClusterCells(ClusterCells::from_request(request)?)
            }
            TaskKind::MitochondrialContent => {
                AnalysisTask::MitochondrialContent(GetMitochondrialContent::from_request(request)?)
            }
        })
    }

    pub fn kind(&self) -> TaskKind {
        match self {
            AnalysisTask::DifferentialExpression(task) => task.kind(),
            AnalysisTask::DoubletScore(task) => task.kind(),
            AnalysisTask::ClusterCells(task) => task.kind(),
            AnalysisTask::MitochondrialContent(task) => task.kind(),
        }
    }

    pub fn fingerprint(&self) -> &str {
        match self {
            AnalysisTask::DifferentialExpression(task) => task.fingerprint(),
            AnalysisTask::DoubletScore(task) => task.fingerprint(),
            AnalysisTask::ClusterCells(task) => task.fingerprint(),
            AnalysisTask::MitochondrialContent(task) => task.fingerprint(),
        }
    }

    pub fn cacheable(&self) -> bool {
        match self {
            AnalysisTask::DifferentialExpression(task) => task.cacheable(),
            AnalysisTask::DoubletScore(task) => task.cacheable(),
            AnalysisTask::ClusterCells(task) => task.cacheable(),
            AnalysisTask::MitochondrialContent(task) => task.cacheable(),
        }
    }

    pub async fn compute(&self, ctx: &TaskContext<'_>) -> Result<TaskResult> {
        match self {
            AnalysisTask::DifferentialExpression(task) => task.compute(ctx).await,
            AnalysisTask::DoubletScore(task) => task.compute(ctx).await,
            AnalysisTask::ClusterCells(task) => task.compute(ctx).await,
            AnalysisTask::MitochondrialContent(task) => task.compute(ctx).await,
        }
    }
}
