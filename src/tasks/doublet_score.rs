//! Doublet scores for an explicit list of cells.

use super::{Task, TaskKind, TaskContext};
use crate::error::{Result, WorkerError};
use crate::models::WorkRequest;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct GetDoubletScore {
    cells: Vec<String>,
    fingerprint: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DoubletScoreRequest {
    pub cells: Vec<String>,
}

impl GetDoubletScore {
    pub fn from_request(request: &WorkRequest) -> Result<Self> {
        let body = request.body_for(TaskKind::DoubletScore.name())?;
        let cells = body
            .required_array("cells")?
            .iter()
            .map(|cell| match cell {
                Value::String(id) => Ok(id.clone()),
                Value::Number(id) if id.is_u64() => Ok(id.to_string()),
                other => Err(WorkerError::parameter(format!(
                    "getDoubletScore: cell ids must be strings or non-negative integers, got {other}"
                ))),
            })
            .collect::<Result<Vec<_>>>()?;

        if cells.is_empty() {
            return Err(WorkerError::parameter(
                "getDoubletScore: 'cells' must name at least one cell",
            ));
        }

        let mut seen = HashSet::with_capacity(cells.len());
        if let Some(duplicate) = cells.iter().find(|cell| !seen.insert(cell.as_str())) {
            return Err(WorkerError::parameter(format!(
                "getDoubletScore: duplicate cell id '{duplicate}'"
            )));
        }

        Ok(Self {
            cells,
            fingerprint: request.fingerprint(),
        })
    }

    pub fn cells(&self) -> &[String] {
        &self.cells
    }
}

#[async_trait]
impl Task for GetDoubletScore {
    type Request = DoubletScoreRequest;

    fn kind(&self) -> TaskKind {
        TaskKind::DoubletScore
    }

    fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    async fn format_request(&self, _ctx: &TaskContext<'_>) -> Result<Self::Request> {
        Ok(DoubletScoreRequest {
            cells: self.cells.clone(),
        })
    }

    /// One entry per requested cell, keyed by cell id
    fn format_result(&self, payload: Value) -> Result<Value> {
        let mut scores = Map::with_capacity(self.cells.len());

        match payload {
            Value::Object(by_cell) => {
                for cell in &self.cells {
                    let score = by_cell.get(cell).cloned().unwrap_or(Value::Null);
                    scores.insert(cell.clone(), score);
                }
            }
            Value::Array(values) if values.len() == self.cells.len() => {
                for (cell, score) in self.cells.iter().zip(values) {
                    scores.insert(cell.clone(), score);
                }
            }
            Value::Array(values) => {
                return Err(WorkerError::Serialization(format!(
                    "getDoubletScore returned {} scores for {} cells",
                    values.len(),
                    self.cells.len()
                )))
            }
            other => {
                return Err(WorkerError::Serialization(format!(
                    "unexpected doublet score payload: {other}"
                )))
            }
        }

        let missing = scores.values().filter(|score| score.is_null()).count();
        if missing > 0 {
            warn!(missing = missing, requested = self.cells.len(), "Backend returned no score for some cells");
        }
        Ok(Value::Object(scores))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn task(cells: Value) -> Result<GetDoubletScore> {
        GetDoubletScore::from_request(
            &WorkRequest::new("e1", json!({"name": "getDoubletScore", "cells": cells})).unwrap(),
        )
    }

    #[test]
    fn test_cells_are_required_and_non_empty() {
        let missing = GetDoubletScore::from_request(
            &WorkRequest::new("e1", json!({"name": "getDoubletScore"})).unwrap(),
        );
        assert!(matches!(missing, Err(WorkerError::Parameter(_))));
        assert!(task(json!([])).is_err());
        assert!(task(json!([{"id": 1}])).is_err());
    }

    #[test]
    fn test_integer_and_string_ids_are_accepted() {
        let task = task(json!(["0", 1])).unwrap();
        assert_eq!(task.cells(), ["0", "1"]);
    }

    #[test]
    fn test_duplicate_cell_ids_are_rejected() {
        let err = task(json!(["0", "1", "0"])).unwrap_err();
        assert!(err.to_string().contains("duplicate cell id '0'"));

        // 7 and "7" name the same cell
        assert!(matches!(task(json!([7, "7"])), Err(WorkerError::Parameter(_))));
    }

    #[test]
    fn test_mapping_payload_is_restricted_to_requested_cells() {
        let task = task(json!(["0", "1"])).unwrap();
        let result = task
            .format_result(json!({"0": 0.1, "1": 0.9, "2": 0.5}))
            .unwrap();

        assert_eq!(result, json!({"0": 0.1, "1": 0.9}));
    }

    #[test]
    fn test_aligned_list_payload_is_keyed_by_cell() {
        let task = task(json!(["7", "3"])).unwrap();
        let result = task.format_result(json!([0.2, 0.4])).unwrap();

        assert_eq!(result, json!({"7": 0.2, "3": 0.4}));
    }

    #[test]
    fn test_missing_cells_map_to_null() {
        let task = task(json!(["0", "1"])).unwrap();
        let result = task.format_result(json!({"0": 0.1})).unwrap();

        assert_eq!(result.as_object().unwrap().len(), 2);
        assert_eq!(result["1"], Value::Null);
    }

    #[test]
    fn test_misaligned_list_payload_is_rejected() {
        let task = task(json!(["0", "1"])).unwrap();
        assert!(task.format_result(json!([0.2])).is_err());
    }
}
