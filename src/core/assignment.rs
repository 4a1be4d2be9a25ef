//! Per-cell worker assignment

use super::dataflow::CellId;
use super::workers::normalize_url;
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerAssignments {
    by_cell: HashMap<CellId, String>,
}

impl WorkerAssignments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&mut self, cell_id: &str, url: &str) {
        self.by_cell.insert(cell_id.to_string(), normalize_url(url));
    }

    pub fn unassign(&mut self, cell_id: &str) {
        self.by_cell.remove(cell_id);
    }

    pub fn worker_for(&self, cell_id: &str) -> Option<&str> {
        self.by_cell.get(cell_id).map(String::as_str)
    }

    /// Give every unassigned cell the default worker, if there is one
    pub fn fill_missing(&mut self, cell_ids: &[CellId], default: Option<&str>) {
        let Some(default) = default else {
            return;
        };
        for cell_id in cell_ids {
            if !self.by_cell.contains_key(cell_id) {
                self.assign(cell_id, default);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_missing_keeps_existing() {
        let mut assignments = WorkerAssignments::new();
        assignments.assign("a", "http://w2");
        assignments.fill_missing(&["a".to_string(), "b".to_string()], Some("http://w1/"));

        assert_eq!(assignments.worker_for("a"), Some("http://w2/"));
        assert_eq!(assignments.worker_for("b"), Some("http://w1/"));

        assignments.unassign("a");
        assignments.fill_missing(&["a".to_string()], None);
        assert_eq!(assignments.worker_for("a"), None);
    }
}
