//! Worker connection lifecycle - metadata fan-out with group cancellation
//!
//! Every worker in `connecting` gets one independent metadata fetch. The
//! fetches run interleaved on the current task; their outcomes are applied
//! to the registry one at a time as they complete, so the registry keeps a
//! single writer. Cancelling the token abandons the in-flight fetches
//! without marking anything failed.

use super::workers::WorkerRegistry;
use crate::config::Config;
use crate::error::ConnectionError;
use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Capability descriptor served at `{url}metadata`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerMetadata {
    #[serde(default)]
    pub name: Option<String>,
}

/// Source of worker metadata
#[async_trait]
pub trait MetadataFetcher: Send + Sync {
    async fn fetch_metadata(&self, url: &str) -> Result<WorkerMetadata, ConnectionError>;
}

/// Fetches metadata over HTTP
pub struct HttpMetadataFetcher {
    client: reqwest::Client,
    headers: HeaderMap,
}

impl HttpMetadataFetcher {
    pub fn new(config: &Config) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.metadata_timeout())
            .build()
            .unwrap_or_else(|e| {
                log::warn!("Falling back to default HTTP client: {}", e);
                reqwest::Client::new()
            });
        Self {
            client,
            headers: config.request_headers(),
        }
    }
}

#[async_trait]
impl MetadataFetcher for HttpMetadataFetcher {
    async fn fetch_metadata(&self, url: &str) -> Result<WorkerMetadata, ConnectionError> {
        let metadata_url = format!("{}metadata", url);
        let response = self
            .client
            .get(&metadata_url)
            .headers(self.headers.clone())
            .send()
            .await
            .map_err(|source| ConnectionError::Transport {
                url: metadata_url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ConnectionError::Status {
                url: metadata_url,
                status: status.as_u16(),
            });
        }

        response
            .json::<WorkerMetadata>()
            .await
            .map_err(|e| ConnectionError::Decode {
                url: metadata_url,
                message: e.to_string(),
            })
    }
}

/// Result of one metadata fetch
#[derive(Debug)]
pub enum ConnectOutcome {
    Connected { name: String },
    /// Responded without a name; stays connecting
    NotReady,
    Failed(ConnectionError),
    Cancelled,
}

async fn fetch_one(
    fetcher: &dyn MetadataFetcher,
    url: String,
    cancel: CancellationToken,
) -> (String, ConnectOutcome) {
    let outcome = tokio::select! {
        _ = cancel.cancelled() => ConnectOutcome::Cancelled,
        result = fetcher.fetch_metadata(&url) => match result {
            Ok(WorkerMetadata { name: Some(name) }) if !name.is_empty() => {
                ConnectOutcome::Connected { name }
            }
            Ok(_) => ConnectOutcome::NotReady,
            Err(e) => ConnectOutcome::Failed(e),
        },
    };
    (url, outcome)
}

fn apply_outcome(registry: &WorkerRegistry, url: &str, outcome: ConnectOutcome) {
    match outcome {
        ConnectOutcome::Connected { name } => {
            log::info!("Worker {} connected as {}", url, name);
            registry.set_worker_connected(url, &name);
            registry.set_default_worker_if_null(url);
        }
        ConnectOutcome::NotReady => {
            log::debug!("Worker {} has no name yet, leaving it connecting", url);
        }
        ConnectOutcome::Failed(e) => {
            log::error!("Failed to fetch worker metadata: {}", e);
            registry.set_worker_failed(url);
        }
        ConnectOutcome::Cancelled => {
            log::debug!("Metadata fetch for {} cancelled", url);
        }
    }
}

/// Run one fan-out round over every currently connecting worker.
/// Returns the URLs that were attempted.
pub async fn connection_lifecycle(
    registry: &WorkerRegistry,
    fetcher: &dyn MetadataFetcher,
    cancel: &CancellationToken,
) -> Vec<String> {
    let urls = registry.connecting_urls();
    let round = cancel.child_token();

    let mut pending: FuturesUnordered<_> = urls
        .iter()
        .cloned()
        .map(|url| fetch_one(fetcher, url, round.clone()))
        .collect();

    while let Some((url, outcome)) = pending.next().await {
        apply_outcome(registry, &url, outcome);
    }

    urls
}

/// Repeat rounds until every connecting worker has been tried once in
/// this call, or until cancelled
pub async fn connect_until_settled(
    registry: &WorkerRegistry,
    fetcher: &dyn MetadataFetcher,
    cancel: &CancellationToken,
) {
    let mut tried = BTreeSet::new();
    loop {
        if cancel.is_cancelled() {
            return;
        }
        let fresh = registry
            .connecting_urls()
            .into_iter()
            .any(|url| !tried.contains(&url));
        if !fresh {
            return;
        }
        tried.extend(connection_lifecycle(registry, fetcher, cancel).await);
    }
}

/// Long-running supervisor: whenever the set of connecting workers
/// changes, starts a fetch for each connecting worker without one in
/// flight, until its token is cancelled
pub struct WorkerConnector {
    registry: WorkerRegistry,
    fetcher: Arc<dyn MetadataFetcher>,
    cancel: CancellationToken,
}

impl WorkerConnector {
    pub fn new(registry: WorkerRegistry, fetcher: Arc<dyn MetadataFetcher>) -> Self {
        Self {
            registry,
            fetcher,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops the supervisor and every in-flight fetch
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the supervisor on its own task
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        let mut rx = self.registry.subscribe();
        let mut last_seen: Option<Vec<String>> = None;
        let mut in_flight: BTreeSet<String> = BTreeSet::new();
        let mut pending = FuturesUnordered::new();

        loop {
            let connecting: Vec<String> = rx
                .borrow_and_update()
                .workers
                .connecting
                .keys()
                .cloned()
                .collect();

            if last_seen.as_ref() != Some(&connecting) {
                for url in &connecting {
                    if in_flight.insert(url.clone()) {
                        pending.push(fetch_one(
                            self.fetcher.as_ref(),
                            url.clone(),
                            self.cancel.clone(),
                        ));
                    }
                }
                last_seen = Some(connecting);
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                Some((url, outcome)) = pending.next(), if !pending.is_empty() => {
                    in_flight.remove(&url);
                    apply_outcome(&self.registry, &url, outcome);
                }
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        log::debug!("Worker connector stopped");
    }
}
