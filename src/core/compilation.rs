//! Compilation job client - submits a run and consumes its result stream
//!
//! The stream is consumed on a spawned task that only sends events; state
//! is mutated by whoever drains the receiver.

use super::dataflow::{CellId, CompiledCell};
use super::workers::normalize_url;
use crate::config::Config;
use crate::error::CompileError;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

pub type JobId = String;

/// Event stream item for one job
#[derive(Debug, Clone, PartialEq)]
pub enum CompilationEvent {
    /// Opaque progress payload
    Message { job_id: JobId, data: String },
    /// Terminal payload; the stream is closed after it
    Result {
        job_id: JobId,
        cells: Vec<CompiledCell>,
    },
    /// Stream ended without a usable result
    StreamClosed { job_id: JobId },
}

impl CompilationEvent {
    pub fn job_id(&self) -> &str {
        match self {
            Self::Message { job_id, .. } => job_id,
            Self::Result { job_id, .. } => job_id,
            Self::StreamClosed { job_id } => job_id,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitRequest<'a> {
    cell_ids: &'a [CellId],
    codes: &'a [String],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    job_id: JobId,
}

/// `result` payloads carry one compiled cell or a batch
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ResultPayload {
    Batch(Vec<CompiledCell>),
    Single(CompiledCell),
}

impl ResultPayload {
    fn into_cells(self) -> Vec<CompiledCell> {
        match self {
            Self::Batch(cells) => cells,
            Self::Single(cell) => vec![cell],
        }
    }
}

/// Client for the job submission and status endpoints
pub struct CompilationClient {
    client: reqwest::Client,
    headers: HeaderMap,
    submit_path: String,
    status_path: String,
    event_tx: mpsc::UnboundedSender<CompilationEvent>,
}

impl CompilationClient {
    /// Create a client and the receiver its streams report to
    pub fn new(config: &Config) -> (Self, mpsc::UnboundedReceiver<CompilationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();

        (
            Self {
                client: reqwest::Client::new(),
                headers: config.request_headers(),
                submit_path: config.submit_path.trim_start_matches('/').to_string(),
                status_path: config.status_path.trim_start_matches('/').to_string(),
                event_tx: tx,
            },
            rx,
        )
    }

    /// Submit a job and open its result stream.
    /// Errors mean the run failed outright; no events follow.
    pub async fn run(
        &self,
        endpoint: &str,
        cell_ids: &[CellId],
        codes: &[String],
    ) -> Result<JobId, CompileError> {
        let base = normalize_url(endpoint);
        let job_id = self.submit(&base, cell_ids, codes).await?;
        self.open_stream(&base, &job_id).await?;
        Ok(job_id)
    }

    async fn submit(
        &self,
        base: &str,
        cell_ids: &[CellId],
        codes: &[String],
    ) -> Result<JobId, CompileError> {
        let url = format!("{}{}", base, self.submit_path);
        log::info!("Submitting {} cell(s) to {}", cell_ids.len(), url);

        let response = self
            .client
            .post(&url)
            .headers(self.headers.clone())
            .json(&SubmitRequest { cell_ids, codes })
            .send()
            .await
            .map_err(|source| CompileError::Submit {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CompileError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let body: SubmitResponse = response
            .json()
            .await
            .map_err(|source| CompileError::Decode { url, source })?;
        Ok(body.job_id)
    }

    async fn open_stream(&self, base: &str, job_id: &str) -> Result<(), CompileError> {
        let url = format!("{}{}", base, self.status_path);
        let response = self
            .client
            .get(&url)
            .query(&[("jobId", job_id)])
            .headers(self.headers.clone())
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|source| CompileError::StreamOpen {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CompileError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let job_id = job_id.to_string();
        let event_tx = self.event_tx.clone();
        tokio::spawn(consume_stream(response, job_id, event_tx));
        Ok(())
    }
}

async fn consume_stream(
    response: reqwest::Response,
    job_id: JobId,
    event_tx: mpsc::UnboundedSender<CompilationEvent>,
) {
    let mut stream = response.bytes_stream().eventsource();

    while let Some(event) = stream.next().await {
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                log::warn!("Result stream for job {} broke: {}", job_id, e);
                break;
            }
        };

        match event.event.as_str() {
            "result" => {
                match serde_json::from_str::<ResultPayload>(&event.data) {
                    Ok(payload) => {
                        let _ = event_tx.send(CompilationEvent::Result {
                            job_id,
                            cells: payload.into_cells(),
                        });
                        return;
                    }
                    Err(e) => {
                        log::error!("Undecodable result for job {}: {}", job_id, e);
                        break;
                    }
                }
            }
            "" | "message" => {
                let _ = event_tx.send(CompilationEvent::Message {
                    job_id: job_id.clone(),
                    data: event.data,
                });
            }
            other => {
                log::debug!("Ignoring '{}' event for job {}", other, job_id);
            }
        }
    }

    let _ = event_tx.send(CompilationEvent::StreamClosed { job_id });
}
