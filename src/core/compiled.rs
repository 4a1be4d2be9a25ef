//! Compiled-cell set and its derived dataflow projection

use super::dataflow::{build_graph, CellId, CompiledCell, DependencyGraph, VariableIndex};
use super::store::{Reducer, Store};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;

/// Latest compiled record per cell
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledCells {
    pub cells: BTreeMap<CellId, CompiledCell>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompiledCellsAction {
    /// Replace each cell's previous record
    SetCells(Vec<CompiledCell>),
}

impl Reducer for CompiledCells {
    type Action = CompiledCellsAction;

    fn reduce(&self, action: CompiledCellsAction) -> Self {
        let mut next = self.clone();
        match action {
            CompiledCellsAction::SetCells(cells) => {
                for cell in cells {
                    next.cells.insert(cell.cell_id.clone(), cell);
                }
            }
        }
        next
    }
}

/// Graph and variable index computed from one settled snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dataflow {
    pub graph: DependencyGraph,
    pub variables: VariableIndex,
}

impl Dataflow {
    pub fn from_cells(cells: &CompiledCells) -> Self {
        let (graph, variables) = build_graph(cells.cells.values());
        Self { graph, variables }
    }
}

/// Owns the compiled-cell set and republishes the dataflow on each change
#[derive(Clone)]
pub struct CompiledCellsStore {
    store: Store<CompiledCells>,
    dataflow: Arc<watch::Sender<Dataflow>>,
}

impl Default for CompiledCellsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CompiledCellsStore {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Dataflow::default());
        Self {
            store: Store::default(),
            dataflow: Arc::new(tx),
        }
    }

    pub fn set_cell(&self, cell: CompiledCell) -> bool {
        self.set_cells(vec![cell])
    }

    /// Merge records and rebuild the dataflow if anything changed
    pub fn set_cells(&self, cells: Vec<CompiledCell>) -> bool {
        let changed = self.store.dispatch(CompiledCellsAction::SetCells(cells));
        if changed {
            let next = self.store.read(Dataflow::from_cells);
            self.dataflow.send_replace(next);
        }
        changed
    }

    pub fn get(&self, cell_id: &str) -> Option<CompiledCell> {
        self.store.read(|s| s.cells.get(cell_id).cloned())
    }

    pub fn snapshot(&self) -> CompiledCells {
        self.store.snapshot()
    }

    pub fn len(&self) -> usize {
        self.store.read(|s| s.cells.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dataflow(&self) -> Dataflow {
        self.dataflow.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CompiledCells> {
        self.store.subscribe()
    }

    pub fn subscribe_dataflow(&self) -> watch::Receiver<Dataflow> {
        self.dataflow.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(id: &str, inputs: &[&str], outputs: &[&str]) -> CompiledCell {
        CompiledCell {
            cell_id: id.to_string(),
            func_id: format!("f_{}", id),
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
            variables: Vec::new(),
        }
    }

    #[test]
    fn test_recompiled_cell_replaces_edges() {
        let store = CompiledCellsStore::new();
        store.set_cells(vec![cell("a", &[], &["x"]), cell("b", &["x"], &[])]);
        assert!(store.dataflow().graph.has_edge("a", "b"));

        // b no longer reads x
        store.set_cell(cell("b", &["w"], &[]));
        let dataflow = store.dataflow();
        assert_eq!(dataflow.graph.edge_count(), 0);
        assert!(dataflow.variables["x"].used_by.is_empty());
        assert_eq!(store.get("b").unwrap().inputs, vec!["w".to_string()]);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_identical_record_does_not_republish() {
        let store = CompiledCellsStore::new();
        store.set_cell(cell("a", &[], &["x"]));
        let mut rx = store.subscribe_dataflow();

        assert!(!store.set_cell(cell("a", &[], &["x"])));
        assert!(!rx.has_changed().unwrap());

        assert!(store.set_cell(cell("c", &["x"], &[])));
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().graph.has_edge("a", "c"));
    }
}
