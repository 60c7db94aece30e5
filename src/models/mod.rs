//! # Data Models
//!
//! - [`cell_set`] - cell set forest and its aggregated index
//! - [`request`] - inbound work requests and typed body access
//! - [`result`] - task results and published responses
//! - [`dataset`] - process-wide dataset handle

pub mod cell_set;
pub mod dataset;
pub mod request;
pub mod result;

pub use cell_set::{CellIds, CellSetNode, CellSetTree, Hierarchy};
pub use dataset::DatasetHandle;
pub use request::{RequestBody, WorkRequest};
pub use result::{ResponseError, TaskResult, WorkResponse};
