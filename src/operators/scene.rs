//! Objects owning geometry graphs, and scenes made of objects

use log::{debug, warn};

use super::geometry::{ObjectOutputOperator, PointGridOperator};
use crate::error::ExecutionError;
use crate::evaluation::EvaluationContext;
use crate::geometry::{ObjectData, SceneData};
use crate::nodes::execution_engine::{execute_node, run_pass, ExecutionContext, ExecutionPass};
use crate::nodes::factory::{NodeCategory, NodeFactory, NodeMetadata, PortDefinition};
use crate::nodes::interface::NodeData;
use crate::nodes::operator::{Operator, OperatorKind};
use crate::nodes::{Graph, OutputRef, SocketKind};

/// Pulls every object node of `graph` within one pass.
///
/// Objects that fail are skipped with a warning; an interruption aborts.
pub fn evaluate_objects(
    graph: &mut Graph,
    evaluation: &EvaluationContext,
) -> (ExecutionPass, Result<SceneData, ExecutionError>) {
    graph.sync_nested_revisions();
    let mut pass = ExecutionPass::new();
    let mut scene = SceneData::default();

    for object in graph.nodes_of_kind(OperatorKind::Object) {
        match execute_node(graph, object, evaluation, &mut pass) {
            Ok(()) => {}
            Err(ExecutionError::Interrupted) => return (pass, Err(ExecutionError::Interrupted)),
            Err(e) => {
                warn!("Skipping object {}: {}", object, e);
                continue;
            }
        }
        if let Some(data) = graph.cached_output(OutputRef::new(object, 0)).cloned().and_then(NodeData::into_object) {
            scene.objects.push(data);
        }
    }
    debug!("Evaluated {} objects", scene.objects.len());
    (pass, Ok(scene))
}

/// Object whose geometry comes from its own graph.
///
/// The graph is pulled from its object output node.
#[derive(Debug)]
pub struct ObjectOperator {
    graph: Graph,
}

impl ObjectOperator {
    /// Object made of a default point grid
    pub fn new() -> Self {
        let mut graph = Graph::new();
        let grid = graph.add("Point Grid", PointGridOperator::create());
        let output = graph.add("Object Output", ObjectOutputOperator::create());
        if let Err(e) = graph.connect_ports(grid, 0, output, 0) {
            warn!("Could not wire default object graph: {}", e);
        }
        graph.output_node = Some(output);
        graph.clear_selection();
        Self { graph }
    }

    pub fn with_graph(graph: Graph) -> Self {
        Self { graph }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }
}

impl Default for ObjectOperator {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeFactory for ObjectOperator {
    fn metadata() -> NodeMetadata {
        NodeMetadata::new("scene.object", "Object", NodeCategory::scene(), "Geometry built by a nested graph")
    }

    fn create() -> Box<dyn Operator> {
        Box::new(Self::new())
    }
}

impl Operator for ObjectOperator {
    fn type_name(&self) -> &'static str {
        "scene.object"
    }

    fn kind(&self) -> OperatorKind {
        OperatorKind::Object
    }

    fn inputs(&self) -> Vec<PortDefinition> {
        vec![]
    }

    fn outputs(&self) -> Vec<PortDefinition> {
        vec![PortDefinition::required("object", SocketKind::Object)]
    }

    fn execute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), ExecutionError> {
        let Some(sink) = self.graph.find_sink(OperatorKind::ObjectOutput) else {
            ctx.add_warning("no object output");
            return Err(ExecutionError::Failed(format!("'{}' has no object output", ctx.node_name())));
        };

        let (pass, result) = run_pass(&mut self.graph, sink, ctx.evaluation());
        for (node, message) in pass.warnings() {
            ctx.add_warning(format!("{}: {}", node, message));
        }
        result?;

        let points = self
            .graph
            .node(sink)
            .and_then(|node| node.operator.as_ref())
            .and_then(|operator| operator.result())
            .cloned()
            .and_then(NodeData::into_points)
            .unwrap_or_default();
        let object = ObjectData {
            name: ctx.node_name().to_string(),
            points,
        };
        ctx.set_output(0, NodeData::Object(object));
        Ok(())
    }

    fn subgraph(&self) -> Option<&Graph> {
        Some(&self.graph)
    }

    fn subgraph_mut(&mut self) -> Option<&mut Graph> {
        Some(&mut self.graph)
    }
}

/// A scene nested as a single node, owning a graph of objects
#[derive(Debug, Default)]
pub struct SceneOperator {
    graph: Graph,
}

impl SceneOperator {
    pub fn with_graph(graph: Graph) -> Self {
        Self { graph }
    }

    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }
}

impl NodeFactory for SceneOperator {
    fn metadata() -> NodeMetadata {
        NodeMetadata::new("scene.scene", "Scene", NodeCategory::scene(), "Collection of objects")
    }

    fn create() -> Box<dyn Operator> {
        Box::new(Self::default())
    }
}

impl Operator for SceneOperator {
    fn type_name(&self) -> &'static str {
        "scene.scene"
    }

    fn kind(&self) -> OperatorKind {
        OperatorKind::Scene
    }

    fn inputs(&self) -> Vec<PortDefinition> {
        vec![]
    }

    fn outputs(&self) -> Vec<PortDefinition> {
        vec![PortDefinition::required("scene", SocketKind::Scene)]
    }

    fn execute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), ExecutionError> {
        let (pass, result) = evaluate_objects(&mut self.graph, ctx.evaluation());
        for (node, message) in pass.warnings() {
            ctx.add_warning(format!("{}: {}", node, message));
        }
        ctx.set_output(0, NodeData::Scene(result?));
        Ok(())
    }

    fn subgraph(&self) -> Option<&Graph> {
        Some(&self.graph)
    }

    fn subgraph_mut(&mut self) -> Option<&mut Graph> {
        Some(&mut self.graph)
    }
}
