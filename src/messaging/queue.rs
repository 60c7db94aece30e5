//! # Message Queues
//!
//! Provider-agnostic request queue. Messages are consumed as raw JSON so a
//! malformed request can still be answered with an error response.
//!
//! - [`InMemoryQueue`]: FIFO for tests and embedding
//! - [`JsonLinesQueue`]: one request per input line, one response per output line

use crate::error::{Result, WorkerError};
use crate::models::WorkResponse;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::sync::Mutex;
use tracing::debug;

#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Next pending message, or `None` when nothing is waiting
    async fn consume(&self) -> Result<Option<Value>>;

    async fn publish(&self, response: &WorkResponse) -> Result<()>;

    /// True once the queue can never yield another message
    fn is_exhausted(&self) -> bool {
        false
    }
}

#[derive(Debug, Default)]
pub struct InMemoryQueue {
    pending: Mutex<VecDeque<Value>>,
    published: Mutex<Vec<WorkResponse>>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_messages(messages: impl IntoIterator<Item = Value>) -> Self {
        Self {
            pending: Mutex::new(messages.into_iter().collect()),
            published: Mutex::new(Vec::new()),
        }
    }

    pub async fn push(&self, message: Value) {
        self.pending.lock().await.push_back(message);
    }

    pub async fn pending(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Responses published so far, in order
    pub async fn published(&self) -> Vec<WorkResponse> {
        self.published.lock().await.clone()
    }
}

#[async_trait]
impl MessageQueue for InMemoryQueue {
    async fn consume(&self) -> Result<Option<Value>> {
        Ok(self.pending.lock().await.pop_front())
    }

    async fn publish(&self, response: &WorkResponse) -> Result<()> {
        self.published.lock().await.push(response.clone());
        Ok(())
    }
}

pub struct JsonLinesQueue<R, W> {
    lines: Mutex<Lines<R>>,
    output: Mutex<W>,
    closed: AtomicBool,
}

impl JsonLinesQueue<BufReader<tokio::io::Stdin>, tokio::io::Stdout> {
    /// Requests on stdin, responses on stdout
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> JsonLinesQueue<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(input: R, output: W) -> Self {
        Self {
            lines: Mutex::new(input.lines()),
            output: Mutex::new(output),
            closed: AtomicBool::new(false),
        }
    }

    /// Give back the output sink
    pub fn into_output(self) -> W {
        self.output.into_inner()
    }
}

#[async_trait]
impl<R, W> MessageQueue for JsonLinesQueue<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn consume(&self) -> Result<Option<Value>> {
        let mut lines = self.lines.lock().await;
        loop {
            // next_line is cancel safe, so a poll timeout never drops a partial line
            let line = lines
                .next_line()
                .await
                .map_err(|e| WorkerError::queue("consume", e.to_string()))?;

            let Some(line) = line else {
                if !self.closed.swap(true, Ordering::SeqCst) {
                    debug!("Input closed");
                }
                return Ok(None);
            };

            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            return serde_json::from_str(line)
                .map(Some)
                .map_err(|e| WorkerError::Serialization(format!("malformed request line: {e}")));
        }
    }

    async fn publish(&self, response: &WorkResponse) -> Result<()> {
        let mut line = serde_json::to_vec(response)?;
        line.push(b'\n');

        let mut output = self.output.lock().await;
        output
            .write_all(&line)
            .await
            .map_err(|e| WorkerError::queue("publish", e.to_string()))?;
        output
            .flush()
            .await
            .map_err(|e| WorkerError::queue("publish", e.to_string()))
    }

    fn is_exhausted(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
