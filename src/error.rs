//! Error types for graph editing, compilation, execution and persistence

use thiserror::Error;

use crate::nodes::NodeId;

/// Structural graph errors. These never leave the graph partially modified.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("node {0} does not exist")]
    NodeNotFound(NodeId),
    #[error("node '{node}' has no {direction} port {port}")]
    PortNotFound { node: String, direction: &'static str, port: usize },
    #[error("cannot connect node '{0}' to itself")]
    SameNode(String),
    #[error("input '{input}' of '{node}' is already connected")]
    AlreadyConnected { node: String, input: String },
    #[error("cannot connect {from} output to {to} input")]
    KindMismatch { from: &'static str, to: &'static str },
    #[error("no parameter '{name}' on node '{node}'")]
    UnknownParameter { node: String, name: String },
    #[error("graph contains a cycle through {}", unresolved.join(", "))]
    Cycle { unresolved: Vec<String> },
}

/// Failures while turning a point graph into bytecode
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("point graph contains a cycle through {}", unresolved.join(", "))]
    Cycle { unresolved: Vec<String> },
    #[error("node '{node}' is not a point operator")]
    NotAPointOperator { node: String },
    #[error("input '{port}' of '{node}' is not connected")]
    UnconnectedInput { node: String, port: String },
    #[error("node '{node}' was compiled before its input '{port}'")]
    OutOfOrder { node: String, port: String },
    #[error("stack overflow: {requested} slots requested, capacity is {capacity}")]
    StackOverflow { capacity: usize, requested: usize },
    #[error("socket kind {0} cannot live on the point stack")]
    UnsupportedKind(&'static str),
    #[error("point graph has no exit node")]
    MissingExit,
}

/// Failures while interpreting compiled bytecode
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InterpretError {
    #[error("invalid opcode {value} at position {position}")]
    InvalidOpcode { position: usize, value: f32 },
    #[error("read past the end of the stack at position {0}")]
    OutOfBounds(usize),
    #[error("unknown noise handle {0}")]
    UnknownNoise(usize),
    #[error("program ended without reaching an exit instruction")]
    NoExit,
}

/// Failures while executing a node
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("node {0} does not exist")]
    NodeNotFound(NodeId),
    #[error("cycle detected at node '{node}'")]
    Cycle { node: String },
    #[error("input '{port}' of '{node}' is not connected")]
    UnconnectedInput { node: String, port: String },
    #[error("upstream node '{node}' failed")]
    UpstreamFailed { node: String },
    #[error("input '{port}' of '{node}' expected {expected}")]
    WrongInputType { node: String, port: String, expected: &'static str },
    #[error("node '{0}' has no operator")]
    MissingOperator(String),
    #[error("compilation failed: {0}")]
    Compile(#[from] CompileError),
    #[error("interpretation failed: {0}")]
    Interpret(#[from] InterpretError),
    #[error("evaluation interrupted")]
    Interrupted,
    #[error("{0}")]
    Failed(String),
}

/// Failures of a top-level evaluation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error("no {0} node to evaluate")]
    NoSink(&'static str),
    #[error("document lock poisoned")]
    LockPoisoned,
    #[error("an evaluation is already running")]
    Busy,
}

/// Failures while saving or loading graphs and configuration
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown operator type '{0}'")]
    UnknownOperator(String),
    #[error("connection references unknown node '{0}'")]
    UnknownNode(String),
    #[error("operator '{0}' does not own a sub-graph")]
    NoSubgraph(String),
    #[error(transparent)]
    Graph(#[from] GraphError),
}
