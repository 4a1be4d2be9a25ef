//! Application root - owns the process-wide stores and drains job events

use crate::config::Config;
use crate::core::{
    connect_until_settled, CellId, CellSources, CompilationEvent, CompiledCellsStore,
    EventOutcome, HttpMetadataFetcher, JobId, MetadataFetcher, RunDispatcher, WorkerConnector,
    WorkerRegistry,
};
use crate::recent::RecentWorkers;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Application state
pub struct App {
    pub config: Config,
    pub registry: WorkerRegistry,
    pub compiled: CompiledCellsStore,
    pub dispatcher: RunDispatcher,
    pub event_rx: mpsc::UnboundedReceiver<CompilationEvent>,
    pub recent: RecentWorkers,
    fetcher: Arc<dyn MetadataFetcher>,
}

impl App {
    /// Create a new app talking to workers over HTTP
    pub fn new(config: Config) -> Self {
        let fetcher = Arc::new(HttpMetadataFetcher::new(&config));
        Self::with_fetcher(config, fetcher)
    }

    pub fn with_fetcher(config: Config, fetcher: Arc<dyn MetadataFetcher>) -> Self {
        let registry = WorkerRegistry::new();
        let compiled = CompiledCellsStore::new();
        let (dispatcher, event_rx) =
            RunDispatcher::new(&config, registry.clone(), compiled.clone());

        let recent = match RecentWorkers::load_from(&config.recent_workers_path()) {
            Ok(recent) => recent,
            Err(e) => {
                log::warn!("Failed to load recent workers: {}", e);
                RecentWorkers::default()
            }
        };

        Self {
            config,
            registry,
            compiled,
            dispatcher,
            event_rx,
            recent,
            fetcher,
        }
    }

    /// Re-create every remembered worker
    pub fn restore_recent_workers(&self) {
        for url in self.recent.urls() {
            self.registry.create_from_url(url);
        }
    }

    /// Add a worker and remember it for later sessions
    pub fn add_worker(&mut self, url: &str) {
        self.recent.add(url);
        if let Err(e) = self.recent.save_to(&self.config.recent_workers_path()) {
            log::warn!("Failed to save recent workers: {}", e);
        }
        self.registry.create_from_url(url);
    }

    /// Connect pending workers until each has been tried once
    pub async fn connect_workers(&self, cancel: &CancellationToken) {
        connect_until_settled(&self.registry, self.fetcher.as_ref(), cancel).await;
    }

    /// Keep connecting workers in the background until the token fires
    pub fn spawn_connector(&self) -> (CancellationToken, tokio::task::JoinHandle<()>) {
        let connector = WorkerConnector::new(self.registry.clone(), Arc::clone(&self.fetcher));
        let cancel = connector.cancellation_token();
        (cancel, connector.spawn())
    }

    /// Run cells; failures are logged and absorbed
    pub async fn run_cells(
        &mut self,
        cell_ids: &[CellId],
        sources: &dyn CellSources,
        worker: Option<&str>,
    ) -> Option<JobId> {
        let default = self.registry.default_worker();
        self.dispatcher
            .assignments
            .fill_missing(cell_ids, default.as_deref());

        self.dispatcher
            .run_cells(cell_ids, sources, worker)
            .await
            .ok()
            .flatten()
    }

    /// Process events from running jobs (non-blocking)
    pub fn process_events(&mut self) -> Vec<EventOutcome> {
        let mut outcomes = Vec::new();
        while let Ok(event) = self.event_rx.try_recv() {
            outcomes.push(self.dispatcher.process_event(event));
        }
        outcomes
    }

    /// Wait until every dispatched job has produced a result or closed
    pub async fn wait_for_runs(&mut self) -> Vec<EventOutcome> {
        let mut outcomes = Vec::new();
        while self.dispatcher.pending_jobs() > 0 {
            match self.event_rx.recv().await {
                Some(event) => outcomes.push(self.dispatcher.process_event(event)),
                None => break,
            }
        }
        outcomes
    }

    pub fn is_running(&self) -> bool {
        self.dispatcher.session.is_running()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::WorkerStatus;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> Config {
        Config {
            recent_workers_path: Some(dir.path().join("workers.json")),
            ..Config::default()
        }
    }

    #[test]
    fn test_add_worker_is_remembered() {
        let dir = TempDir::new().unwrap();
        let mut app = App::new(config_in(&dir));
        app.add_worker("http://w1");
        assert_eq!(app.registry.status("http://w1/"), Some(WorkerStatus::Connecting));

        let restored = App::new(config_in(&dir));
        restored.restore_recent_workers();
        assert_eq!(restored.registry.connecting_urls(), vec!["http://w1/".to_string()]);
    }

    #[tokio::test]
    async fn test_run_without_workers_is_absorbed() {
        let dir = TempDir::new().unwrap();
        let mut app = App::new(config_in(&dir));
        let sources = std::collections::HashMap::from([("c1".to_string(), "x = 1".to_string())]);

        let job = app.run_cells(&["c1".to_string()], &sources, None).await;
        assert!(job.is_none());
        assert!(!app.is_running());
        assert!(app.process_events().is_empty());
    }
}
