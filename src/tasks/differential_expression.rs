//! # Differential Expression
//!
//! Compares two cell populations. The populations arrive as symbolic references and
//! are resolved against the experiment's cell sets before the backend is called.

use super::{Task, TaskContext, TaskKind};
use crate::cell_sets::{CellSetResolver, ComparisonQuery, ComparisonType};
use crate::error::{Result, WorkerError};
use crate::models::{CellIds, WorkRequest};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

/// Fields of every result row, in output order
pub const ROW_FIELDS: [&str; 6] = ["gene_names", "zscore", "abszscore", "qval", "log2fc", "_row"];

#[derive(Debug, Clone)]
pub struct DifferentialExpression {
    experiment_id: String,
    cell_set: String,
    compare_with: String,
    basis: Option<String>,
    comparison_type: Option<ComparisonType>,
    max_num: Option<usize>,
    fingerprint: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DifferentialExpressionRequest {
    pub base_cells: CellIds,
    pub background_cells: CellIds,
    pub comparison_type: ComparisonType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_num: Option<usize>,
}

impl DifferentialExpression {
    pub fn from_request(request: &WorkRequest) -> Result<Self> {
        let body = request.body_for(TaskKind::DifferentialExpression.name())?;

        let comparison_type = body
            .optional_str("comparisonType")?
            .map(str::parse::<ComparisonType>)
            .transpose()?;

        Ok(Self {
            experiment_id: request.experiment_id.clone(),
            cell_set: body.required_str("cellSet")?.to_string(),
            compare_with: body.required_str("compareWith")?.to_string(),
            basis: body.optional_str("basis")?.map(str::to_string),
            comparison_type,
            max_num: body.optional_positive("maxNum")?,
            fingerprint: request.fingerprint(),
        })
    }

    pub fn max_num(&self) -> Option<usize> {
        self.max_num
    }

    fn query(&self) -> ComparisonQuery<'_> {
        ComparisonQuery {
            cell_set: &self.cell_set,
            compare_with: &self.compare_with,
            basis: self.basis.as_deref(),
            comparison_type: self.comparison_type,
        }
    }

    /// Build the backend request from an already-loaded resolver
    pub fn format_request_with(
        &self,
        resolver: &CellSetResolver,
    ) -> Result<DifferentialExpressionRequest> {
        let resolved = resolver.resolve(&self.query())?;
        Ok(DifferentialExpressionRequest {
            base_cells: resolved.base_cells,
            background_cells: resolved.background_cells,
            comparison_type: resolved.comparison_type,
            max_num: self.max_num,
        })
    }
}

#[async_trait]
impl Task for DifferentialExpression {
    type Request = DifferentialExpressionRequest;

    fn kind(&self) -> TaskKind {
        TaskKind::DifferentialExpression
    }

    fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    async fn format_request(&self, ctx: &TaskContext<'_>) -> Result<Self::Request> {
        let resolver = CellSetResolver::load(ctx.cell_sets, &self.experiment_id).await?;
        self.format_request_with(&resolver)
    }

    fn format_result(&self, payload: Value) -> Result<Value> {
        let mut rows = rows_from_payload(payload)?;
        if let Some(max_num) = self.max_num {
            rows.truncate(max_num);
        }
        Ok(Value::Array(rows.into_iter().map(Value::Object).collect()))
    }
}

/// Accepts row-oriented (`[{..}, ..]`) or column-oriented (`{field: [..]}`) output
fn rows_from_payload(payload: Value) -> Result<Vec<Map<String, Value>>> {
    match payload {
        Value::Array(rows) => rows
            .into_iter()
            .map(|row| match row {
                Value::Object(fields) => Ok(project_row(|field| fields.get(field).cloned())),
                other => Err(WorkerError::Serialization(format!(
                    "differential expression row is not an object: {other}"
                ))),
            })
            .collect(),
        Value::Object(columns) => {
            let mut lengths = Vec::with_capacity(columns.len());
            for (name, column) in &columns {
                match column {
                    Value::Array(values) => lengths.push(values.len()),
                    _ => {
                        return Err(WorkerError::Serialization(format!(
                            "differential expression column '{name}' is not a list"
                        )))
                    }
                }
            }
            let row_count = columns
                .get("gene_names")
                .and_then(Value::as_array)
                .map(Vec::len)
                .or_else(|| lengths.iter().copied().max())
                .unwrap_or(0);

            Ok((0..row_count)
                .map(|index| {
                    project_row(|field| {
                        columns
                            .get(field)
                            .and_then(Value::as_array)
                            .and_then(|column| column.get(index))
                            .cloned()
                    })
                })
                .collect())
        }
        other => Err(WorkerError::Serialization(format!(
            "unexpected differential expression payload: {other}"
        ))),
    }
}

fn project_row(lookup: impl Fn(&str) -> Option<Value>) -> Map<String, Value> {
    ROW_FIELDS
        .iter()
        .map(|field| ((*field).to_string(), lookup(field).unwrap_or(Value::Null)))
        .collect()
}
