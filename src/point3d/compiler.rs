//! Compiles a point graph into bytecode on a [`CompiledStack`]
//!
//! Nodes are visited in topological order. Each point operator emits its
//! opcode, the stack offsets of the outputs feeding its inputs, any
//! constants taken from its parameters, and finally reserves its own output
//! slots. Offsets are cached on the output sockets, `0` meaning unresolved.

use log::{debug, warn};

use super::noise::{FlowNoise, NoiseRegistry};
use super::stack::{CompiledStack, OpCode};
use crate::constants::stack::UNRESOLVED;
use crate::error::{CompileError, GraphError};
use crate::nodes::interface::Parameters;
use crate::nodes::{Graph, NodeId, OutputRef, PortId};

/// Bytecode plus the noise generators it references
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledProgram {
    pub stack: CompiledStack,
    pub noises: NoiseRegistry,
}

/// What a point operator sees while compiling.
///
/// Inputs resolve to the slots their feeders reserved earlier in topological
/// order. A feeder that has not been compiled yet is reported as
/// [`CompileError::OutOfOrder`] rather than given a slot on demand, since a
/// sorted graph never reaches that case.
pub struct CompileContext<'a> {
    graph: &'a mut Graph,
    node: NodeId,
    name: String,
    parameters: Parameters,
    stack: &'a mut CompiledStack,
    noises: &'a mut NoiseRegistry,
    time: f32,
    reached_exit: &'a mut bool,
}

impl<'a> CompileContext<'a> {
    pub fn node_name(&self) -> &str {
        &self.name
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Evaluation time used for time-dependent constants
    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn emit(&mut self, value: f32) -> Result<usize, CompileError> {
        self.stack.push(value)
    }

    pub fn emit_opcode(&mut self, opcode: OpCode) -> Result<usize, CompileError> {
        self.stack.push(opcode.to_f32())
    }

    /// Emit the stack offset of whatever feeds input `port`
    pub fn emit_input(&mut self, port: PortId) -> Result<usize, CompileError> {
        let offset = self.input_offset(port)?;
        self.emit(offset as f32)?;
        Ok(offset)
    }

    /// Offset of the output feeding input `port`.
    ///
    /// The feeding node precedes this one in topological order, so its slot
    /// is already resolved. Allocating it here would land inside this node's
    /// operand stream, so an unresolved feeder is an ordering error.
    pub fn input_offset(&mut self, port: PortId) -> Result<usize, CompileError> {
        let input = self
            .graph
            .node(self.node)
            .and_then(|node| node.inputs.get(port))
            .ok_or_else(|| CompileError::UnconnectedInput {
                node: self.name.clone(),
                port: port.to_string(),
            })?;
        let Some(link) = input.link else {
            return Err(CompileError::UnconnectedInput {
                node: self.name.clone(),
                port: input.name.clone(),
            });
        };
        let resolved = self
            .graph
            .node(link.node)
            .and_then(|node| node.outputs.get(link.port))
            .map(|output| output.stack_offset)
            .unwrap_or(UNRESOLVED);
        if resolved == UNRESOLVED {
            return Err(CompileError::OutOfOrder {
                node: self.name.clone(),
                port: input.name.clone(),
            });
        }
        Ok(resolved)
    }

    /// Stack offset of an output socket, allocating zeroed slots at the
    /// cursor the first time it is requested
    pub fn resolve_offset(&mut self, output: OutputRef) -> Result<usize, CompileError> {
        let socket = self
            .graph
            .node(output.node)
            .and_then(|node| node.outputs.get(output.port))
            .ok_or_else(|| CompileError::UnconnectedInput {
                node: self.name.clone(),
                port: output.port.to_string(),
            })?;
        if socket.stack_offset != UNRESOLVED {
            return Ok(socket.stack_offset);
        }
        let slots = socket
            .kind
            .slot_count()
            .ok_or(CompileError::UnsupportedKind(socket.kind.name()))?;

        let offset = self.stack.allocate(slots)?;
        if let Some(socket) = self
            .graph
            .node_mut(output.node)
            .and_then(|node| node.outputs.get_mut(output.port))
        {
            socket.stack_offset = offset;
        }
        Ok(offset)
    }

    /// Reserve this node's output `port`
    pub fn reserve_output(&mut self, port: PortId) -> Result<usize, CompileError> {
        self.resolve_offset(OutputRef::new(self.node, port))
    }

    /// Write compile-time constants into reserved slots
    pub fn store(&mut self, offset: usize, values: &[f32]) -> Result<(), CompileError> {
        self.stack.store(offset, values)
    }

    pub fn add_noise(&mut self, noise: FlowNoise) -> usize {
        self.noises.add(noise)
    }

    /// Record that the program contains an exit instruction
    pub fn mark_exit(&mut self) {
        *self.reached_exit = true;
    }
}

/// Compile every node of a point graph.
///
/// Sorts the graph first if its topology changed. Fails on cycles, on nodes
/// that are not point operators, on unconnected inputs, on stack overflow,
/// and when no exit node was compiled.
pub fn compile_graph(graph: &mut Graph, time: f32, capacity: usize) -> Result<CompiledProgram, CompileError> {
    let mut stack = CompiledStack::new(capacity);
    let mut noises = NoiseRegistry::new();

    if graph.needs_reorder() {
        match graph.topological_sort() {
            Ok(()) => {}
            Err(GraphError::Cycle { unresolved }) => return Err(CompileError::Cycle { unresolved }),
            Err(e) => warn!("Sorting point graph: {}", e),
        }
    }

    let mut reached_exit = false;
    let order = graph.order().to_vec();
    for node_id in order {
        let Some(node) = graph.node_mut(node_id) else {
            continue;
        };
        for output in &mut node.outputs {
            output.stack_offset = UNRESOLVED;
        }
        let name = node.name.clone();
        let parameters = node.parameters.clone();
        let operator = match node.operator.take() {
            Some(operator) if operator.is_point_operator() => operator,
            other => {
                node.operator = other;
                warn!("Node '{}' cannot be compiled into a point graph", name);
                return Err(CompileError::NotAPointOperator { node: name });
            }
        };

        let result = {
            let mut ctx = CompileContext {
                graph: &mut *graph,
                node: node_id,
                name,
                parameters,
                stack: &mut stack,
                noises: &mut noises,
                time,
                reached_exit: &mut reached_exit,
            };
            operator.compile(&mut ctx)
        };

        if let Some(node) = graph.node_mut(node_id) {
            node.operator = Some(operator);
        }
        result?;
    }

    if !reached_exit {
        return Err(CompileError::MissingExit);
    }
    debug!("Compiled point graph: {} slots, {} noise generators", stack.len(), noises.len());
    Ok(CompiledProgram { stack, noises })
}
