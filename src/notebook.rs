//! Notebook file - cell sources for command-line runs

use crate::core::{CellSources, WorkerAssignments};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notebook {
    pub metadata: Option<Metadata>,
    #[serde(default)]
    pub cells: Vec<NotebookCell>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotebookCell {
    pub id: String,
    pub code: String,
    /// Worker this cell should run on
    pub worker: Option<String>,
}

impl Notebook {
    /// Load notebook from YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let notebook: Notebook = serde_yaml::from_str(&content)?;

        let mut seen = std::collections::HashSet::new();
        for cell in &notebook.cells {
            if !seen.insert(cell.id.as_str()) {
                anyhow::bail!("Duplicate cell id {} in {}", cell.id, path.display());
            }
        }
        Ok(notebook)
    }

    /// Cell ids in notebook order
    pub fn cell_ids(&self) -> Vec<String> {
        self.cells.iter().map(|c| c.id.clone()).collect()
    }

    pub fn get_cell(&self, cell_id: &str) -> Option<&NotebookCell> {
        self.cells.iter().find(|c| c.id == cell_id)
    }

    /// Apply the per-cell worker choices from the file
    pub fn apply_assignments(&self, assignments: &mut WorkerAssignments) {
        for cell in &self.cells {
            if let Some(worker) = &cell.worker {
                assignments.assign(&cell.id, worker);
            }
        }
    }
}

impl CellSources for Notebook {
    fn source(&self, cell_id: &str) -> Option<String> {
        self.get_cell(cell_id).map(|c| c.code.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const NOTEBOOK: &str = r#"
metadata:
  name: demo
cells:
  - id: c1
    code: "y = 1"
    worker: http://w2
  - id: c2
    code: "z = y + 1"
"#;

    #[test]
    fn test_parse_notebook() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nb.yml");
        std::fs::write(&path, NOTEBOOK).unwrap();

        let notebook = Notebook::from_file(&path).unwrap();
        assert_eq!(notebook.metadata.as_ref().unwrap().name, "demo");
        assert_eq!(notebook.cell_ids(), vec!["c1", "c2"]);
        assert_eq!(notebook.source("c2").as_deref(), Some("z = y + 1"));
        assert!(notebook.source("c3").is_none());

        let mut assignments = WorkerAssignments::new();
        notebook.apply_assignments(&mut assignments);
        assert_eq!(assignments.worker_for("c1"), Some("http://w2/"));
        assert_eq!(assignments.worker_for("c2"), None);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nb.yml");
        std::fs::write(&path, "cells:\n  - {id: a, code: x}\n  - {id: a, code: y}\n").unwrap();
        assert!(Notebook::from_file(&path).is_err());
    }
}
