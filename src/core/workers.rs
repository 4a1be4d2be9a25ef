//! Worker registry - connection lifecycle state for remote compute workers

use super::store::{Reducer, Store};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Append a trailing slash if the URL lacks one
pub fn normalize_url(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{}/", url)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectingWorker {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedWorker {
    pub url: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedWorker {
    pub url: String,
}

/// A worker in exactly one lifecycle state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "connectionStatus", rename_all = "snake_case")]
pub enum Worker {
    Connecting(ConnectingWorker),
    Connected(ConnectedWorker),
    Failed(FailedWorker),
}

impl Worker {
    pub fn url(&self) -> &str {
        match self {
            Self::Connecting(w) => &w.url,
            Self::Connected(w) => &w.url,
            Self::Failed(w) => &w.url,
        }
    }

    pub fn status(&self) -> WorkerStatus {
        match self {
            Self::Connecting(_) => WorkerStatus::Connecting,
            Self::Connected(_) => WorkerStatus::Connected,
            Self::Failed(_) => WorkerStatus::Failed,
        }
    }

    /// Display label: the worker name once connected
    pub fn label(&self) -> &str {
        match self {
            Self::Connecting(_) => "Connecting...",
            Self::Connected(w) => &w.name,
            Self::Failed(_) => "Connection failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Connecting,
    Connected,
    Failed,
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Disjoint buckets keyed by normalized URL
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workers {
    pub connected: BTreeMap<String, ConnectedWorker>,
    pub connecting: BTreeMap<String, ConnectingWorker>,
    pub failed: BTreeMap<String, FailedWorker>,
}

impl Workers {
    pub fn contains(&self, url: &str) -> bool {
        self.connected.contains_key(url)
            || self.connecting.contains_key(url)
            || self.failed.contains_key(url)
    }

    /// All workers, connected first, then connecting, then failed
    pub fn flatten(&self) -> Vec<Worker> {
        self.connected
            .values()
            .cloned()
            .map(Worker::Connected)
            .chain(self.connecting.values().cloned().map(Worker::Connecting))
            .chain(self.failed.values().cloned().map(Worker::Failed))
            .collect()
    }

    pub fn get(&self, url: &str) -> Option<Worker> {
        if let Some(w) = self.connected.get(url) {
            return Some(Worker::Connected(w.clone()));
        }
        if let Some(w) = self.connecting.get(url) {
            return Some(Worker::Connecting(w.clone()));
        }
        self.failed.get(url).cloned().map(Worker::Failed)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkersState {
    pub workers: Workers,
    pub default_worker: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkersAction {
    CreateFromUrl(String),
    SetWorkerConnected { url: String, name: String },
    SetWorkerFailed { url: String },
    SetDefaultWorkerIfNull(String),
    RemoveWorker(String),
}

impl Reducer for WorkersState {
    type Action = WorkersAction;

    fn reduce(&self, action: WorkersAction) -> Self {
        let mut next = self.clone();
        match action {
            WorkersAction::CreateFromUrl(url) => {
                let url = normalize_url(&url);
                if !next.workers.contains(&url) {
                    next.workers
                        .connecting
                        .insert(url.clone(), ConnectingWorker { url });
                }
            }
            WorkersAction::SetWorkerConnected { url, name } => {
                if let Some(worker) = next.workers.connecting.remove(&url) {
                    next.workers.connected.insert(
                        url,
                        ConnectedWorker {
                            url: worker.url,
                            name,
                        },
                    );
                }
            }
            WorkersAction::SetWorkerFailed { url } => {
                if let Some(worker) = next.workers.connecting.remove(&url) {
                    next.workers
                        .failed
                        .insert(url, FailedWorker { url: worker.url });
                }
            }
            WorkersAction::SetDefaultWorkerIfNull(url) => {
                if next.default_worker.is_none() {
                    next.default_worker = Some(url);
                }
            }
            WorkersAction::RemoveWorker(url) => {
                let url = normalize_url(&url);
                next.workers.connected.remove(&url);
                next.workers.connecting.remove(&url);
                next.workers.failed.remove(&url);
            }
        }
        next
    }
}

/// Process-wide worker registry handle
#[derive(Clone, Default)]
pub struct WorkerRegistry {
    store: Store<WorkersState>,
}

impl WorkerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a worker as connecting; no-op when the URL is already known
    pub fn create_from_url(&self, url: &str) -> bool {
        self.store
            .dispatch(WorkersAction::CreateFromUrl(url.to_string()))
    }

    /// Move a connecting worker to connected with its name
    pub fn set_worker_connected(&self, url: &str, name: &str) -> bool {
        self.store.dispatch(WorkersAction::SetWorkerConnected {
            url: url.to_string(),
            name: name.to_string(),
        })
    }

    /// Move a connecting worker to failed
    pub fn set_worker_failed(&self, url: &str) -> bool {
        self.store.dispatch(WorkersAction::SetWorkerFailed {
            url: url.to_string(),
        })
    }

    /// First connected worker wins the default slot
    pub fn set_default_worker_if_null(&self, url: &str) -> bool {
        self.store
            .dispatch(WorkersAction::SetDefaultWorkerIfNull(url.to_string()))
    }

    /// Forget a worker so that `create_from_url` can retry it
    pub fn remove_worker(&self, url: &str) -> bool {
        self.store
            .dispatch(WorkersAction::RemoveWorker(url.to_string()))
    }

    /// Clone of the current state
    pub fn snapshot(&self) -> WorkersState {
        self.store.snapshot()
    }

    /// Receiver notified on every state change
    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<WorkersState> {
        self.store.subscribe()
    }

    /// Every worker, connected first, then connecting, then failed
    pub fn workers(&self) -> Vec<Worker> {
        self.store.read(|s| s.workers.flatten())
    }

    /// Connected workers by URL
    pub fn connected(&self) -> Vec<ConnectedWorker> {
        self.store
            .read(|s| s.workers.connected.values().cloned().collect())
    }

    /// URLs still waiting on a metadata fetch
    pub fn connecting_urls(&self) -> Vec<String> {
        self.store
            .read(|s| s.workers.connecting.keys().cloned().collect())
    }

    /// URL of the default worker, if any has connected
    pub fn default_worker(&self) -> Option<String> {
        self.store.read(|s| s.default_worker.clone())
    }

    /// Connection status of a worker, matched after URL normalization
    pub fn status(&self, url: &str) -> Option<WorkerStatus> {
        let url = normalize_url(url);
        self.store.read(|s| s.workers.get(&url).map(|w| w.status()))
    }
}
