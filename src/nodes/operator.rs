//! The execution contract every node payload implements

use std::fmt;

use super::execution_engine::ExecutionContext;
use super::factory::PortDefinition;
use super::graph::Graph;
use super::interface::{NodeData, Parameters};
use crate::error::{CompileError, ExecutionError};
use crate::point3d::compiler::CompileContext;

/// Role of an operator, used by the evaluator to find sinks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorKind {
    Generic,
    /// Compositing sink
    Viewer,
    /// Sink of an object's geometry graph
    ObjectOutput,
    /// Owns a geometry graph
    Object,
    /// Owns a graph of objects
    Scene,
    /// Compiled to bytecode inside a point graph
    Point,
}

/// Behaviour attached to a node
pub trait Operator: Send + fmt::Debug {
    /// Registry name, stable across saves
    fn type_name(&self) -> &'static str;

    fn kind(&self) -> OperatorKind {
        OperatorKind::Generic
    }

    fn inputs(&self) -> Vec<PortDefinition>;

    fn outputs(&self) -> Vec<PortDefinition>;

    fn default_parameters(&self) -> Parameters {
        Parameters::new()
    }

    /// Compute outputs. Inputs are pulled through the context, which executes
    /// stale upstream nodes on demand.
    fn execute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), ExecutionError>;

    /// Emit bytecode for this node. Only point operators implement it.
    fn compile(&self, ctx: &mut CompileContext<'_>) -> Result<(), CompileError> {
        Err(CompileError::NotAPointOperator {
            node: ctx.node_name().to_string(),
        })
    }

    fn is_point_operator(&self) -> bool {
        self.kind() == OperatorKind::Point
    }

    fn subgraph(&self) -> Option<&Graph> {
        None
    }

    fn subgraph_mut(&mut self) -> Option<&mut Graph> {
        None
    }

    /// Result kept by sinks for the evaluator to read back
    fn result(&self) -> Option<&NodeData> {
        None
    }
}
