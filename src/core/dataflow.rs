//! Dataflow graph - cell dependencies derived from compiled variable lists
//!
//! The graph is a pure projection of the compiled-cell set. It is rebuilt
//! from scratch on every change; nothing here is patched incrementally.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub type CellId = String;
pub type VariableName = String;

/// A `(name, type)` declaration reported by the compiler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableDecl {
    pub name: VariableName,
    pub var_type: String,
}

/// Compiled representation of one notebook cell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledCell {
    pub cell_id: CellId,
    pub func_id: String,
    #[serde(default)]
    pub inputs: Vec<VariableName>,
    #[serde(default)]
    pub outputs: Vec<VariableName>,
    #[serde(default)]
    pub variables: Vec<VariableDecl>,
}

/// Which cells declare and which cells use a name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    pub name: VariableName,
    pub declared_by: BTreeSet<CellId>,
    pub used_by: BTreeSet<CellId>,
}

impl Variable {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            declared_by: BTreeSet::new(),
            used_by: BTreeSet::new(),
        }
    }
}

pub type VariableIndex = BTreeMap<VariableName, Variable>;

/// Cell dependency graph; an edge `a -> b` means b reads a name a declares
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyGraph {
    pub nodes: BTreeMap<CellId, CompiledCell>,
    pub edges: BTreeSet<(CellId, CellId)>,
}

impl DependencyGraph {
    pub fn node(&self, cell_id: &str) -> Option<&CompiledCell> {
        self.nodes.get(cell_id)
    }

    pub fn has_edge(&self, from: &str, to: &str) -> bool {
        self.edges.contains(&(from.to_string(), to.to_string()))
    }

    /// Cells whose outputs `cell_id` reads
    pub fn parents(&self, cell_id: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|(_, to)| to == cell_id)
            .map(|(from, _)| from.as_str())
            .collect()
    }

    /// Cells that read outputs of `cell_id`
    pub fn children(&self, cell_id: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|(from, _)| from == cell_id)
            .map(|(_, to)| to.as_str())
            .collect()
    }

    /// Cells that both declare and use the same name.
    /// These edges are kept as produced; callers decide how to surface them.
    pub fn self_edges(&self) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|(from, to)| from == to)
            .map(|(from, _)| from.as_str())
            .collect()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}

/// Derive the dependency graph and variable index from compiled cells
pub fn build_graph<'a, I>(cells: I) -> (DependencyGraph, VariableIndex)
where
    I: IntoIterator<Item = &'a CompiledCell>,
{
    let mut graph = DependencyGraph::default();
    let mut variables = VariableIndex::new();

    for cell in cells {
        graph.nodes.insert(cell.cell_id.clone(), cell.clone());
    }

    for cell in graph.nodes.values() {
        for input in &cell.inputs {
            variables
                .entry(input.clone())
                .or_insert_with(|| Variable::new(input))
                .used_by
                .insert(cell.cell_id.clone());
        }
        for output in &cell.outputs {
            variables
                .entry(output.clone())
                .or_insert_with(|| Variable::new(output))
                .declared_by
                .insert(cell.cell_id.clone());
        }
    }

    for cell in graph.nodes.values() {
        for input in &cell.inputs {
            let Some(variable) = variables.get(input) else {
                continue;
            };
            for declared_by in &variable.declared_by {
                graph
                    .edges
                    .insert((declared_by.clone(), cell.cell_id.clone()));
            }
        }
    }

    (graph, variables)
}
