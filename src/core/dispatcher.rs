//! Run dispatcher - turns "run these cells" into a compilation job and
//! reconciles the streamed result into the compiled-cell set
//!
//! `process_event` is the only place compiled cells are written, so stream
//! consumers never touch shared state directly.

use super::assignment::WorkerAssignments;
use super::compilation::{CompilationClient, CompilationEvent, JobId};
use super::compiled::CompiledCellsStore;
use super::dataflow::CellId;
use super::workers::WorkerRegistry;
use crate::config::{Config, RuntimeMode};
use crate::error::DispatchError;
use crate::session::{RunId, RunSession, RunStatus};
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Supplies the latest editor text for a cell
pub trait CellSources {
    fn source(&self, cell_id: &str) -> Option<String>;
}

impl CellSources for HashMap<String, String> {
    fn source(&self, cell_id: &str) -> Option<String> {
        self.get(cell_id).cloned()
    }
}

/// What reconciling one stream event did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Progress { job_id: JobId, data: String },
    Merged { job_id: JobId, cell_ids: Vec<CellId> },
    Abandoned { job_id: JobId },
    /// Event for a job this dispatcher is not waiting on
    Ignored,
}

#[derive(Debug)]
struct PendingRun {
    run: RunId,
    cell_ids: Vec<CellId>,
}

pub struct RunDispatcher {
    mode: RuntimeMode,
    local_endpoint: String,
    client: CompilationClient,
    registry: WorkerRegistry,
    compiled: CompiledCellsStore,
    pending: HashMap<JobId, PendingRun>,
    pub assignments: WorkerAssignments,
    pub session: RunSession,
}

impl RunDispatcher {
    pub fn new(
        config: &Config,
        registry: WorkerRegistry,
        compiled: CompiledCellsStore,
    ) -> (Self, mpsc::UnboundedReceiver<CompilationEvent>) {
        let (client, event_rx) = CompilationClient::new(config);
        (
            Self {
                mode: config.mode,
                local_endpoint: config.server_url.clone(),
                client,
                registry,
                compiled,
                pending: HashMap::new(),
                assignments: WorkerAssignments::new(),
                session: RunSession::new(),
            },
            event_rx,
        )
    }

    /// Pick the endpoint for a run: explicit worker, then the first cell's
    /// assignment, then the registry default
    pub fn resolve_endpoint(
        &self,
        cell_ids: &[CellId],
        worker: Option<&str>,
    ) -> Result<String, DispatchError> {
        if self.mode == RuntimeMode::Local {
            return Ok(self.local_endpoint.clone());
        }

        worker
            .map(str::to_string)
            .or_else(|| {
                cell_ids
                    .first()
                    .and_then(|id| self.assignments.worker_for(id))
                    .map(str::to_string)
            })
            .or_else(|| self.registry.default_worker())
            .ok_or(DispatchError::NoEndpoint)
    }

    /// Dispatch a run. `Ok(None)` means there was nothing to run.
    pub async fn run_cells(
        &mut self,
        cell_ids: &[CellId],
        sources: &dyn CellSources,
        worker: Option<&str>,
    ) -> Result<Option<JobId>, DispatchError> {
        if cell_ids.is_empty() {
            return Ok(None);
        }

        let mut codes = Vec::with_capacity(cell_ids.len());
        for cell_id in cell_ids {
            let code = sources.source(cell_id).ok_or_else(|| {
                log::error!("Cannot run cell {}: no source text", cell_id);
                DispatchError::UnknownCell(cell_id.clone())
            })?;
            codes.push(code);
        }
        for cell_id in cell_ids {
            self.session.register_cell_run(cell_id);
        }

        let endpoint = self.resolve_endpoint(cell_ids, worker).map_err(|e| {
            log::error!("Cannot dispatch run: {}", e);
            e
        })?;

        let run = self.session.register_run_start(cell_ids);
        match self.client.run(&endpoint, cell_ids, &codes).await {
            Ok(job_id) => {
                log::info!("Job {} running {} cell(s) on {}", job_id, cell_ids.len(), endpoint);
                self.session.attach_job(run, &job_id);
                self.pending.insert(
                    job_id.clone(),
                    PendingRun {
                        run,
                        cell_ids: cell_ids.to_vec(),
                    },
                );
                Ok(Some(job_id))
            }
            Err(e) => {
                log::error!("Run dispatch to {} failed: {}", endpoint, e);
                self.session.register_run_end(run, RunStatus::Failed);
                Err(e.into())
            }
        }
    }

    /// Apply one stream event to shared state
    pub fn process_event(&mut self, event: CompilationEvent) -> EventOutcome {
        if !self.pending.contains_key(event.job_id()) {
            log::warn!("Dropping event for unknown job {}", event.job_id());
            return EventOutcome::Ignored;
        }

        match event {
            CompilationEvent::Message { job_id, data } => {
                log::debug!("Job {}: {}", job_id, data);
                EventOutcome::Progress { job_id, data }
            }
            CompilationEvent::Result { job_id, cells } => {
                let Some(pending) = self.pending.remove(&job_id) else {
                    return EventOutcome::Ignored;
                };
                let cell_ids: Vec<CellId> = cells.iter().map(|c| c.cell_id.clone()).collect();
                self.compiled.set_cells(cells);
                self.session.register_run_end(pending.run, RunStatus::Completed);

                let dataflow = self.compiled.dataflow();
                for cell_id in dataflow.graph.self_edges() {
                    log::warn!("Cell {} both declares and uses a variable", cell_id);
                }
                log::info!(
                    "Job {} compiled {} of {} requested cell(s)",
                    job_id,
                    cell_ids.len(),
                    pending.cell_ids.len()
                );
                EventOutcome::Merged { job_id, cell_ids }
            }
            CompilationEvent::StreamClosed { job_id } => {
                let Some(pending) = self.pending.remove(&job_id) else {
                    return EventOutcome::Ignored;
                };
                log::warn!("Job {} stream closed without a result", job_id);
                self.session.register_run_end(pending.run, RunStatus::Abandoned);
                EventOutcome::Abandoned { job_id }
            }
        }
    }

    pub fn pending_jobs(&self) -> usize {
        self.pending.len()
    }

    pub fn compiled(&self) -> &CompiledCellsStore {
        &self.compiled
    }
}
