//! Newline-delimited JSON request loop.
//!
//! Each input line is one `OperationRequest`. Requests run concurrently, one
//! blocking task each, and every request produces exactly one response line.
//! Responses are written in completion order; callers correlate by `id`.

use std::sync::Arc;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::SftpFlowError;
use crate::executor::{OperationExecutor, OperationResult, ResultMetadata, ResultPayload};
use crate::request::OperationRequest;

/// One output message: the result payload plus metadata, or an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<ResultPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exists: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sftp: Option<ResultMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn success(id: Option<String>, result: OperationResult) -> Self {
        Self {
            id,
            payload: Some(result.payload),
            exists: result.exists,
            sftp: Some(result.metadata),
            error: None,
        }
    }

    pub fn failure(id: Option<String>, message: impl Into<String>) -> Self {
        Self {
            id,
            payload: None,
            exists: None,
            sftp: None,
            error: Some(message.into()),
        }
    }

    pub fn from_outcome(id: Option<String>, outcome: Result<OperationResult, SftpFlowError>) -> Self {
        match outcome {
            Ok(result) => Self::success(id, result),
            Err(e) => Self::failure(id, e.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Counts reported when the input is exhausted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeSummary {
    pub handled: usize,
    pub failed: usize,
}

fn send(tx: &mpsc::UnboundedSender<String>, response: &Response) {
    match serde_json::to_string(response) {
        Ok(line) => {
            if tx.send(line).is_err() {
                tracing::warn!("Response writer closed; dropping response");
            }
        }
        Err(e) => tracing::error!(error = %e, "Failed to encode response"),
    }
}

/// Read requests from `reader` until EOF, writing one response line per
/// request to `writer`. Returns once every in-flight request has answered.
pub async fn serve_lines<R, W>(
    executor: Arc<OperationExecutor>,
    reader: R,
    writer: W,
) -> Result<ServeSummary, SftpFlowError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let writer_task = tokio::spawn(async move {
        let mut writer = writer;
        while let Some(line) = rx.recv().await {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }
        Ok::<(), std::io::Error>(())
    });

    let mut summary = ServeSummary::default();
    let mut in_flight: Vec<JoinHandle<bool>> = Vec::new();
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        let line = buf.trim_ascii();
        if line.is_empty() {
            continue;
        }
        summary.handled += 1;

        // Bytes, not str: a line that is not UTF-8 is a bad request, not EOF.
        let request: OperationRequest = match serde_json::from_slice(line) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, "Rejecting malformed request");
                send(&tx, &Response::failure(None, format!("Invalid request: {}", e)));
                summary.failed += 1;
                continue;
            }
        };

        tracing::debug!(id = ?request.id, "Dispatching request");
        let executor = Arc::clone(&executor);
        let tx = tx.clone();
        in_flight.push(tokio::spawn(async move {
            let id = request.id.clone();
            let response = match tokio::task::spawn_blocking(move || executor.execute(&request)).await {
                Ok(outcome) => Response::from_outcome(id, outcome),
                Err(e) => Response::failure(id, format!("Request task failed: {}", e)),
            };
            send(&tx, &response);
            !response.is_error()
        }));
    }

    for handle in in_flight {
        match handle.await {
            Ok(true) => {}
            Ok(false) => summary.failed += 1,
            Err(e) => {
                tracing::error!(error = %e, "Request task panicked");
                summary.failed += 1;
            }
        }
    }

    drop(tx);
    writer_task
        .await
        .map_err(|e| SftpFlowError::Io {
            source: std::io::Error::other(e),
        })??;

    tracing::info!(
        handled = summary.handled,
        failed = summary.failed,
        "Input exhausted"
    );
    Ok(summary)
}

/// Serve stdin to stdout on a fresh runtime.
pub fn serve_stdio(executor: OperationExecutor) -> Result<ServeSummary, SftpFlowError> {
    let rt = tokio::runtime::Runtime::new().map_err(|e| SftpFlowError::Io { source: e })?;
    rt.block_on(serve_lines(
        Arc::new(executor),
        tokio::io::stdin(),
        tokio::io::stdout(),
    ))
}
