//! Cellflow - notebook cell dispatch across remote compute workers
//!
//! Tracks the connection lifecycle of remote workers, submits cell runs as
//! compilation jobs, and keeps a dataflow graph between cells in sync with
//! the variables each compiled cell declares and uses.

pub mod app;
pub mod config;
pub mod core;
pub mod error;
pub mod notebook;
pub mod recent;
pub mod session;

// Re-exports
pub use app::App;
pub use config::{Config, RuntimeMode};
pub use crate::core::{
    build_graph, CompiledCell, DependencyGraph, RunDispatcher, Variable, Worker, WorkerRegistry,
};
pub use error::{CompileError, ConnectionError, DispatchError};
pub use notebook::Notebook;
pub use recent::RecentWorkers;
pub use session::{RunSession, RunStatus};

/// Result type alias
pub type Result<T> = anyhow::Result<T>;
