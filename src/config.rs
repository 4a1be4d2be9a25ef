//! Runtime configuration - loaded from cellflow.yml, overridden by CLI flags

use anyhow::Result;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const SESSION_HEADER: &str = "cellflow-session-id";
pub const TOKEN_HEADER: &str = "cellflow-server-token";

const CONFIG_FILE: &str = "cellflow.yml";

/// Where runs are dispatched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeMode {
    /// Jobs go to a selected remote worker
    #[default]
    Workers,
    /// Jobs go to the local server
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where runs are dispatched
    pub mode: RuntimeMode,
    /// Local/default execution endpoint
    pub server_url: String,
    /// Job submission path, relative to the endpoint
    pub submit_path: String,
    /// Job status stream path, relative to the endpoint
    pub status_path: String,
    /// Sent as `cellflow-session-id` on every request
    pub session_id: String,
    /// Sent as `cellflow-server-token` on every request
    pub server_token: String,
    /// Per-request timeout for worker metadata fetches
    pub metadata_timeout_secs: u64,
    /// Recent workers file; `~/.cellflow/workers.json` when unset
    pub recent_workers_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: RuntimeMode::default(),
            server_url: "http://127.0.0.1:2718/".to_string(),
            submit_path: "compile/submit".to_string(),
            status_path: "compile/status".to_string(),
            session_id: new_session_id(),
            server_token: String::new(),
            metadata_timeout_secs: 10,
            recent_workers_path: None,
        }
    }
}

fn new_session_id() -> String {
    format!("s_{}", Utc::now().format("%Y%m%d%H%M%S%f"))
}

impl Config {
    /// Load config from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load cellflow.yml from the current directory, or use defaults
    pub fn auto_load() -> Result<Self> {
        let path = Path::new(CONFIG_FILE);
        if path.exists() {
            return Self::load(path);
        }
        Ok(Self::default())
    }

    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_secs(self.metadata_timeout_secs)
    }

    /// Fixed headers carried by every request
    /// Session and token headers for every outgoing request
    pub fn request_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&self.session_id) {
            headers.insert(SESSION_HEADER, value);
        } else {
            log::warn!("Session id is not a valid header value, omitting it");
        }
        if let Ok(value) = HeaderValue::from_str(&self.server_token) {
            headers.insert(TOKEN_HEADER, value);
        } else {
            log::warn!("Server token is not a valid header value, omitting it");
        }
        headers
    }

    /// Resolved recent workers file
    pub fn recent_workers_path(&self) -> PathBuf {
        self.recent_workers_path
            .clone()
            .unwrap_or_else(crate::recent::RecentWorkers::default_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cellflow.yml");
        std::fs::write(&path, "mode: local\nserver_token: abc\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.mode, RuntimeMode::Local);
        assert_eq!(config.server_token, "abc");
        assert_eq!(config.submit_path, "compile/submit");
        assert_eq!(config.metadata_timeout_secs, 10);
        assert!(config.session_id.starts_with("s_"));
    }

    #[test]
    fn test_mode_defaults_to_workers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cellflow.yml");
        std::fs::write(&path, "server_token: abc\n").unwrap();

        assert_eq!(Config::load(&path).unwrap().mode, RuntimeMode::Workers);
        assert_eq!(RuntimeMode::default(), RuntimeMode::Workers);
    }

    #[test]
    fn test_request_headers() {
        let config = Config {
            session_id: "s_1".into(),
            server_token: "tok".into(),
            ..Config::default()
        };
        let headers = config.request_headers();
        assert_eq!(headers[SESSION_HEADER], "s_1");
        assert_eq!(headers[TOKEN_HEADER], "tok");
    }
}
