//! Node system - graphs, sockets, execution and the operator registry

pub mod cache;
pub mod execution_engine;
pub mod factory;
pub mod graph;
pub mod interface;
pub mod node;
pub mod operator;
pub mod persistence;
pub mod port;

#[cfg(test)]
pub mod test_support;

pub use cache::{CacheKey, CacheStatistics, OutputCache};
pub use execution_engine::{execute_node, run_pass, ExecutionContext, ExecutionPass, ExecutionStats};
pub use factory::{builtin_registry, NodeCategory, NodeFactory, NodeMetadata, NodeRegistry, PortDefinition};
pub use graph::Graph;
pub use interface::{ImageBuffer, NodeData, ParamValue, Parameters};
pub use node::{Node, NodeId, NodeInfo, NodeState};
pub use operator::{Operator, OperatorKind};
pub use persistence::GraphSnapshot;
pub use port::{InputRef, InputSocket, OutputRef, OutputSocket, PortId, SocketKind};
