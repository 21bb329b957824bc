//! Node-graph evaluation engine
//!
//! Graphs of nodes connected through typed sockets are evaluated by pulling
//! from a sink. Point graphs are compiled to a small bytecode and run once
//! per point.

pub mod config;
pub mod constants;
pub mod error;
pub mod evaluation;
pub mod file_manager;
pub mod geometry;
pub mod nodes;
pub mod operators;
pub mod point3d;

pub use config::EngineConfig;
pub use error::{CompileError, EvaluationError, ExecutionError, GraphError, InterpretError, PersistenceError};
pub use evaluation::{Document, EditingContext, EvaluationContext, EvaluationReport, Evaluator, Reporter};
pub use file_manager::FileManager;
pub use nodes::{Graph, InputRef, Node, NodeId, OutputRef, SocketKind};
