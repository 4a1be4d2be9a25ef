//! Core engine - worker registry, dataflow graph, job client, run dispatch

mod assignment;
mod compilation;
mod compiled;
mod connection;
mod dataflow;
mod dispatcher;
mod store;
mod workers;

pub use assignment::WorkerAssignments;
pub use compilation::{CompilationClient, CompilationEvent, JobId};
pub use compiled::{CompiledCells, CompiledCellsAction, CompiledCellsStore, Dataflow};
pub use connection::{
    connect_until_settled, connection_lifecycle, ConnectOutcome, HttpMetadataFetcher,
    MetadataFetcher, WorkerConnector, WorkerMetadata,
};
pub use dataflow::{
    build_graph, CellId, CompiledCell, DependencyGraph, Variable, VariableDecl, VariableIndex,
    VariableName,
};
pub use dispatcher::{CellSources, EventOutcome, RunDispatcher};
pub use store::{Reducer, Store};
pub use workers::{
    normalize_url, ConnectedWorker, ConnectingWorker, FailedWorker, Worker, WorkerRegistry,
    WorkerStatus, Workers, WorkersAction, WorkersState,
};
