//! Run session - busy state, per-cell run requests and run history

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, VecDeque};

/// Number of finished and in-flight runs kept in the history
const MAX_RUN_HISTORY: usize = 50;

/// Identifier handed out by `register_run_start`
pub type RunId = u64;

/// A single dispatched run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: RunId,
    pub job_id: Option<String>,
    pub cell_ids: Vec<String>,
    pub started: DateTime<Utc>,
    pub ended: Option<DateTime<Utc>>,
    pub status: RunStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    /// Stream closed before any result arrived
    Abandoned,
}

/// Run-state for one app instance
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSession {
    next_id: RunId,
    /// Runs started but not yet ended
    active: BTreeSet<RunId>,
    /// Most recent runs, oldest first
    runs: VecDeque<RunRecord>,
    /// Last time each cell was asked to run
    requested: HashMap<String, DateTime<Utc>>,
}

impl RunSession {
    /// Create an idle session
    pub fn new() -> Self {
        Self::default()
    }

    /// True while any run is in flight
    pub fn is_running(&self) -> bool {
        !self.active.is_empty()
    }

    /// Record that a cell was asked to run
    pub fn register_cell_run(&mut self, cell_id: &str) {
        self.requested.insert(cell_id.to_string(), Utc::now());
    }

    /// Last time a cell was asked to run
    pub fn last_requested(&self, cell_id: &str) -> Option<DateTime<Utc>> {
        self.requested.get(cell_id).copied()
    }

    /// Mark busy and open a run record
    pub fn register_run_start(&mut self, cell_ids: &[String]) -> RunId {
        let id = self.next_id;
        self.next_id += 1;
        self.active.insert(id);

        if self.runs.len() == MAX_RUN_HISTORY {
            self.runs.pop_front();
        }
        self.runs.push_back(RunRecord {
            id,
            job_id: None,
            cell_ids: cell_ids.to_vec(),
            started: Utc::now(),
            ended: None,
            status: RunStatus::Running,
        });
        id
    }

    /// Record the job a run was submitted as
    pub fn attach_job(&mut self, run: RunId, job_id: &str) {
        if let Some(record) = self.record_mut(run) {
            record.job_id = Some(job_id.to_string());
        }
    }

    /// Close a run; ending a run twice is a no-op
    pub fn register_run_end(&mut self, run: RunId, status: RunStatus) {
        if !self.active.remove(&run) {
            return;
        }
        if let Some(record) = self.record_mut(run) {
            record.ended = Some(Utc::now());
            record.status = status;
        }
    }

    /// Most recently started run
    pub fn last_run(&self) -> Option<&RunRecord> {
        self.runs.back()
    }

    /// Run history, oldest first
    pub fn runs(&self) -> impl Iterator<Item = &RunRecord> {
        self.runs.iter()
    }

    fn record_mut(&mut self, run: RunId) -> Option<&mut RunRecord> {
        self.runs.iter_mut().rev().find(|record| record.id == run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_tracking() {
        let mut session = RunSession::new();
        session.register_cell_run("c1");
        assert!(session.last_requested("c1").is_some());

        let run = session.register_run_start(&["c1".to_string()]);
        assert!(session.is_running());
        session.attach_job(run, "job-1");

        session.register_run_end(run, RunStatus::Completed);
        assert!(!session.is_running());
        let record = session.last_run().unwrap();
        assert_eq!(record.status, RunStatus::Completed);
        assert_eq!(record.job_id.as_deref(), Some("job-1"));
        assert!(record.ended.is_some());
    }

    #[test]
    fn test_double_end_is_ignored() {
        let mut session = RunSession::new();
        let first = session.register_run_start(&[]);
        let second = session.register_run_start(&[]);

        session.register_run_end(first, RunStatus::Failed);
        session.register_run_end(first, RunStatus::Completed);
        assert!(session.is_running());
        assert_eq!(session.runs().next().unwrap().status, RunStatus::Failed);

        session.register_run_end(second, RunStatus::Completed);
        assert!(!session.is_running());
    }

    #[test]
    fn test_history_is_bounded() {
        let mut session = RunSession::new();
        let oldest = session.register_run_start(&[]);
        for _ in 0..MAX_RUN_HISTORY {
            let run = session.register_run_start(&[]);
            session.register_run_end(run, RunStatus::Completed);
        }

        assert_eq!(session.runs().count(), MAX_RUN_HISTORY);
        assert!(session.runs().all(|record| record.id != oldest));

        // An evicted run still clears the busy state when it ends
        assert!(session.is_running());
        session.register_run_end(oldest, RunStatus::Completed);
        assert!(!session.is_running());
    }
}
