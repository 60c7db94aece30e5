//! Mitochondrial content of every cell, ordered by cell id.

use super::{Task, TaskContext, TaskKind};
use crate::error::Result;
use crate::models::WorkRequest;
use async_trait::async_trait;
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct GetMitochondrialContent {
    fingerprint: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MitochondrialContentRequest {}

impl GetMitochondrialContent {
    pub fn from_request(request: &WorkRequest) -> Result<Self> {
        request.body_for(TaskKind::MitochondrialContent.name())?;
        Ok(Self {
            fingerprint: request.fingerprint(),
        })
    }
}

#[async_trait]
impl Task for GetMitochondrialContent {
    type Request = MitochondrialContentRequest;

    fn kind(&self) -> TaskKind {
        TaskKind::MitochondrialContent
    }

    fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    async fn format_request(&self, _ctx: &TaskContext<'_>) -> Result<Self::Request> {
        Ok(MitochondrialContentRequest {})
    }
}
