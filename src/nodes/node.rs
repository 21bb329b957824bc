//! Node types and core node functionality

use std::fmt;

use super::graph::Graph;
use super::interface::Parameters;
use super::operator::{Operator, OperatorKind};
use super::port::{InputSocket, OutputSocket, PortId, SocketKind};

/// Unique identifier for a node within its graph
pub type NodeId = usize;

/// Execution state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Output is up to date
    Clean,
    /// Output must be recomputed before use
    Dirty,
    /// Currently executing in this pass
    Computing,
    /// Last execution failed
    Error,
}

/// A unit of computation: one operator plus its typed sockets
pub struct Node {
    pub id: NodeId,
    /// Unique within the owning graph
    pub name: String,
    pub position: [f32; 2],
    pub inputs: Vec<InputSocket>,
    pub outputs: Vec<OutputSocket>,
    pub parameters: Parameters,
    /// Taken out while the operator executes or compiles
    pub operator: Option<Box<dyn Operator>>,
    pub needs_execution: bool,
    pub execution_count: u32,
    /// Exclusive wall time of the last successful execution, in seconds
    pub last_exec_time: f64,
    /// Smallest non-zero `last_exec_time` seen, `0.0` until the first timed run
    pub min_exec_time: f64,
    /// Scratch in-degree used by topological sorting
    pub degree: usize,
    pub state: NodeState,
    /// Warnings raised by the last execution
    pub warnings: Vec<String>,
    /// Revision of the owned sub-graph at the last successful execution
    pub subgraph_revision: Option<u64>,
}

impl Node {
    /// Create a node whose sockets and parameters follow the operator's declaration
    pub fn new(name: impl Into<String>, operator: Box<dyn Operator>) -> Self {
        let mut node = Self::empty(name);
        for port in operator.inputs() {
            node.add_input(&port.name, port.kind);
        }
        for port in operator.outputs() {
            node.add_output(&port.name, port.kind);
        }
        node.parameters = operator.default_parameters();
        node.operator = Some(operator);
        node
    }

    /// Create a node without an operator
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            position: [0.0, 0.0],
            inputs: Vec::new(),
            outputs: Vec::new(),
            parameters: Parameters::new(),
            operator: None,
            needs_execution: true,
            execution_count: 0,
            last_exec_time: 0.0,
            min_exec_time: 0.0,
            degree: 0,
            state: NodeState::Dirty,
            warnings: Vec::new(),
            subgraph_revision: None,
        }
    }

    pub fn with_position(mut self, position: [f32; 2]) -> Self {
        self.position = position;
        self
    }

    /// Adds an input socket to the node
    pub fn add_input(&mut self, name: &str, kind: SocketKind) -> &mut Self {
        let port_id = self.inputs.len();
        let mut socket = InputSocket::new(port_id, name, kind);
        socket.node = self.id;
        self.inputs.push(socket);
        self
    }

    /// Adds an output socket to the node
    pub fn add_output(&mut self, name: &str, kind: SocketKind) -> &mut Self {
        let port_id = self.outputs.len();
        let mut socket = OutputSocket::new(port_id, name, kind);
        socket.node = self.id;
        self.outputs.push(socket);
        self
    }

    /// Assign the node id, updating the sockets' back references
    pub(crate) fn set_id(&mut self, id: NodeId) {
        self.id = id;
        for input in &mut self.inputs {
            input.node = id;
        }
        for output in &mut self.outputs {
            output.node = id;
        }
    }

    pub fn input(&self, port: PortId) -> Option<&InputSocket> {
        self.inputs.get(port)
    }

    pub fn output(&self, port: PortId) -> Option<&OutputSocket> {
        self.outputs.get(port)
    }

    pub fn operator_type(&self) -> Option<&'static str> {
        self.operator.as_ref().map(|op| op.type_name())
    }

    pub fn operator_kind(&self) -> Option<OperatorKind> {
        self.operator.as_ref().map(|op| op.kind())
    }

    pub fn subgraph(&self) -> Option<&Graph> {
        self.operator.as_ref().and_then(|op| op.subgraph())
    }

    pub fn subgraph_mut(&mut self) -> Option<&mut Graph> {
        self.operator.as_mut().and_then(|op| op.subgraph_mut())
    }

    /// Number of inputs currently linked
    pub fn linked_input_count(&self) -> usize {
        self.inputs.iter().filter(|input| input.is_connected()).count()
    }

    /// Record a successful run's exclusive time
    pub(crate) fn record_execution(&mut self, seconds: f64) {
        self.execution_count += 1;
        self.last_exec_time = seconds;
        if seconds > 0.0 && (self.min_exec_time == 0.0 || seconds < self.min_exec_time) {
            self.min_exec_time = seconds;
        }
    }

    /// Summary for inspection panels and logs
    pub fn info(&self) -> NodeInfo {
        NodeInfo {
            name: self.name.clone(),
            operator: self.operator_type().unwrap_or("<none>"),
            execution_count: self.execution_count,
            last_exec_time: self.last_exec_time,
            min_exec_time: self.min_exec_time,
            state: self.state,
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("operator", &self.operator)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("parameters", &self.parameters)
            .field("needs_execution", &self.needs_execution)
            .field("execution_count", &self.execution_count)
            .field("last_exec_time", &self.last_exec_time)
            .field("state", &self.state)
            .finish()
    }
}

/// Execution summary of a node
#[derive(Debug, Clone, PartialEq)]
pub struct NodeInfo {
    pub name: String,
    pub operator: &'static str,
    pub execution_count: u32,
    pub last_exec_time: f64,
    pub min_exec_time: f64,
    pub state: NodeState,
}

impl fmt::Display for NodeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}): {} runs, last {:.3} ms, min {:.3} ms, {:?}",
            self.name,
            self.operator,
            self.execution_count,
            self.last_exec_time * 1000.0,
            self.min_exec_time * 1000.0,
            self.state
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_node_starts_dirty() {
        let node = Node::empty("A");
        assert!(node.needs_execution);
        assert_eq!(node.state, NodeState::Dirty);
        assert_eq!(node.execution_count, 0);
        assert!(node.operator_type().is_none());
    }

    #[test]
    fn test_sockets_are_positional() {
        let mut node = Node::empty("B");
        node.add_input("in0", SocketKind::Vector).add_input("in1", SocketKind::Scalar);
        node.add_output("out", SocketKind::Vector);
        node.set_id(7);
        assert_eq!(node.inputs[1].id, 1);
        assert_eq!(node.inputs[1].kind, SocketKind::Scalar);
        assert_eq!(node.outputs[0].node, 7);
        assert_eq!(node.linked_input_count(), 0);
    }

    #[test]
    fn test_minimum_ignores_zero_runs() {
        let mut node = Node::empty("C");
        node.record_execution(0.0);
        assert_eq!(node.min_exec_time, 0.0);
        node.record_execution(0.004);
        node.record_execution(0.002);
        node.record_execution(0.003);
        assert_eq!(node.execution_count, 4);
        assert_eq!(node.last_exec_time, 0.003);
        assert_eq!(node.min_exec_time, 0.002);
    }
}
