//! Geometry node running a compiled point graph over every point

use glam::Vec3;
use log::{debug, warn};
use rayon::prelude::*;

use super::compiler::compile_graph;
use super::interpreter::execute_stack;
use super::operators::{EntryOperator, ExitOperator};
use crate::error::ExecutionError;
use crate::geometry::{AttributeKind, PointCloud};
use crate::nodes::execution_engine::ExecutionContext;
use crate::nodes::factory::{NodeCategory, NodeFactory, NodeMetadata, PortDefinition};
use crate::nodes::interface::{NodeData, ParamValue, Parameters};
use crate::nodes::operator::Operator;
use crate::nodes::{Graph, SocketKind};

/// Owns a point graph and applies it to incoming points.
///
/// With an empty `attribute` parameter the exit value replaces each
/// position, otherwise it is written to that vector attribute.
#[derive(Debug)]
pub struct PointGraphOperator {
    graph: Graph,
}

impl PointGraphOperator {
    /// Operator whose graph passes positions through unchanged
    pub fn new() -> Self {
        let mut graph = Graph::new();
        let entry = graph.add("Entry", EntryOperator::create());
        let exit = graph.add("Exit", ExitOperator::create());
        if let Err(e) = graph.connect_ports(entry, 0, exit, 0) {
            warn!("Could not wire default point graph: {}", e);
        }
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

/// Store `values` in the vector attribute `name`, returning how many did not fit
fn write_attribute(points: &mut PointCloud, name: &str, values: Vec<Vec3>) -> usize {
    let column = points.attributes.add(name, AttributeKind::Vector);
    values
        .into_iter()
        .enumerate()
        .filter(|(index, value)| !column.set_vec3(*index, *value))
        .count()
}

impl Default for PointGraphOperator {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeFactory for PointGraphOperator {
    fn metadata() -> NodeMetadata {
        NodeMetadata::new(
            "geometry.point_graph",
            "Point Graph",
            NodeCategory::geometry(),
            "Runs a point graph on every point",
        )
        .with_tags(vec!["displace", "attribute", "procedural"])
    }

    fn create() -> Box<dyn Operator> {
        Box::new(Self::new())
    }
}

impl Operator for PointGraphOperator {
    fn type_name(&self) -> &'static str {
        "geometry.point_graph"
    }

    fn inputs(&self) -> Vec<PortDefinition> {
        vec![PortDefinition::required("points", SocketKind::Points)]
    }

    fn outputs(&self) -> Vec<PortDefinition> {
        vec![PortDefinition::required("points", SocketKind::Points)]
    }

    fn default_parameters(&self) -> Parameters {
        Parameters::new().with("attribute", ParamValue::Text(String::new()))
    }

    fn execute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), ExecutionError> {
        if !ctx.is_input_connected(0) {
            ctx.add_warning("input not connected");
        }
        let mut points = ctx.input_points(0)?;
        let attribute = ctx.parameters().text_or("attribute", "").to_string();

        let config = &ctx.evaluation().config;
        let (capacity, grain) = (config.stack_capacity, config.parallel_grain.max(1));
        let program = match compile_graph(&mut self.graph, ctx.time(), capacity) {
            Ok(program) => program,
            Err(e) => {
                ctx.add_warning(format!("point graph does not compile: {}", e));
                return Err(e.into());
            }
        };

        let progress = ctx.progress().clone();
        let total = points.len().max(1) as f32;
        let mut values = points.positions.clone();
        values
            .par_chunks_mut(grain)
            .try_for_each(|chunk| -> Result<(), ExecutionError> {
                if progress.is_interrupted() {
                    return Err(ExecutionError::Interrupted);
                }
                let mut working = program.stack.as_slice().to_vec();
                for value in chunk.iter_mut() {
                    *value = execute_stack(&mut working, &program.noises, *value)?;
                }
                progress.advance(chunk.len() as f32 / total);
                Ok(())
            })?;

        if attribute.is_empty() {
            points.positions = values;
        } else {
            let count = values.len();
            let dropped = write_attribute(&mut points, &attribute, values);
            if dropped > 0 {
                warn!("{} of {} values did not fit attribute '{}'", dropped, count, attribute);
                ctx.add_warning(format!("{} of {} values did not fit attribute '{}'", dropped, count, attribute));
            }
        }
        debug!("Point graph '{}' processed {} points", ctx.node_name(), points.len());
        ctx.set_output(0, NodeData::Points(points));
        Ok(())
    }

    fn subgraph(&self) -> Option<&Graph> {
        Some(&self.graph)
    }

    fn subgraph_mut(&mut self) -> Option<&mut Graph> {
        Some(&mut self.graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::EvaluationContext;
    use crate::geometry::PointCloud;
    use crate::nodes::execution_engine::run_pass;
    use crate::operators::{ObjectOutputOperator, PointGridOperator};
    use crate::evaluation::reporter::tests::InterruptingReporter;
    use crate::point3d::operators::{MathOperator, VectorOperator};

    /// Grid -> point graph -> object output
    fn setup() -> (Graph, crate::nodes::NodeId, crate::nodes::NodeId) {
        let mut graph = Graph::new();
        let grid = graph.add("Grid", PointGridOperator::create());
        let point_graph = graph.add("Point Graph", PointGraphOperator::create());
        let output = graph.add("Output", ObjectOutputOperator::create());
        graph.set_parameter(grid, "columns", ParamValue::Int(4)).unwrap();
        graph.set_parameter(grid, "rows", ParamValue::Int(3)).unwrap();
        graph.connect_ports(grid, 0, point_graph, 0).unwrap();
        graph.connect_ports(point_graph, 0, output, 0).unwrap();
        (graph, point_graph, output)
    }

    fn offset_inner_graph(graph: &mut Graph, offset: Vec3) {
        let entry = graph.find_node("Entry").unwrap();
        let exit = graph.find_node("Exit").unwrap();
        graph.disconnect(crate::nodes::OutputRef::new(entry, 0), crate::nodes::InputRef::new(exit, 0));
        let constant = graph.add("Offset", VectorOperator::create());
        let math = graph.add("Add", MathOperator::create());
        graph.set_parameter(constant, "value", ParamValue::Vector(offset)).unwrap();
        graph.connect_ports(entry, 0, math, 0).unwrap();
        graph.connect_ports(constant, 0, math, 1).unwrap();
        graph.connect_ports(math, 0, exit, 0).unwrap();
    }

    fn result_points(graph: &Graph, output: crate::nodes::NodeId) -> PointCloud {
        let node = graph.node(output).unwrap();
        match node.operator.as_ref().and_then(|op| op.result()) {
            Some(NodeData::Points(points)) => points.clone(),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_default_graph_passes_points_through() {
        let (mut graph, _, output) = setup();
        let context = EvaluationContext::default();
        let (_, result) = run_pass(&mut graph, output, &context);
        result.unwrap();
        assert_eq!(result_points(&graph, output), PointCloud::grid(4, 3, 1.0));
    }

    #[test]
    fn test_displaces_positions_in_parallel_chunks() {
        let (mut graph, point_graph, output) = setup();
        offset_inner_graph(graph.node_mut(point_graph).unwrap().subgraph_mut().unwrap(), Vec3::Y);
        let mut context = EvaluationContext::default();
        context.config.parallel_grain = 5;

        let (_, result) = run_pass(&mut graph, output, &context);
        result.unwrap();
        let points = result_points(&graph, output);
        let expected = PointCloud::grid(4, 3, 1.0);
        for (actual, original) in points.positions.iter().zip(&expected.positions) {
            assert_eq!(*actual, *original + Vec3::Y);
        }
        assert!((context.progress.fraction() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_writes_attribute_instead_of_positions() {
        let (mut graph, point_graph, output) = setup();
        offset_inner_graph(graph.node_mut(point_graph).unwrap().subgraph_mut().unwrap(), Vec3::X);
        graph
            .set_parameter(point_graph, "attribute", ParamValue::Text("velocity".into()))
            .unwrap();

        let context = EvaluationContext::default();
        let (_, result) = run_pass(&mut graph, output, &context);
        result.unwrap();
        let points = result_points(&graph, output);
        let expected = PointCloud::grid(4, 3, 1.0);
        assert_eq!(points.positions, expected.positions);
        let velocity = points.attributes.get("velocity").unwrap();
        assert_eq!(velocity.vec3(0), Some(expected.positions[0] + Vec3::X));
    }

    #[test]
    fn test_inner_edit_restales_outer_node() {
        let (mut graph, point_graph, output) = setup();
        let context = EvaluationContext::default();
        let (_, result) = run_pass(&mut graph, output, &context);
        result.unwrap();

        let (pass, _) = run_pass(&mut graph, output, &context);
        assert!(pass.executed().is_empty());

        offset_inner_graph(graph.node_mut(point_graph).unwrap().subgraph_mut().unwrap(), Vec3::Z);
        let (pass, result) = run_pass(&mut graph, output, &context);
        result.unwrap();
        assert_eq!(pass.executed(), &[point_graph, output]);
    }

    #[test]
    fn test_compile_failure_becomes_warning() {
        let (mut graph, point_graph, output) = setup();
        {
            let inner = graph.node_mut(point_graph).unwrap().subgraph_mut().unwrap();
            let exit = inner.find_node("Exit").unwrap();
            inner.remove_node(exit);
        }
        let context = EvaluationContext::default();
        let (pass, result) = run_pass(&mut graph, output, &context);
        assert!(matches!(result, Err(ExecutionError::Compile(_))));
        assert!(pass.has_failed(point_graph));
        assert_eq!(graph.node(point_graph).unwrap().warnings.len(), 1);
    }

    #[test]
    fn test_interrupt_during_point_loop_stops_remaining_chunks() {
        let (mut graph, point_graph, output) = setup();
        let grid = graph.find_node("Grid").unwrap();
        graph.set_parameter(grid, "columns", ParamValue::Int(20)).unwrap();
        let (progress, reporter) = InterruptingReporter::tracker();
        let mut context = EvaluationContext { progress, ..EvaluationContext::default() };
        context.config.parallel_grain = 1;

        let pool = rayon::ThreadPoolBuilder::new().num_threads(1).build().unwrap();
        let (pass, result) = pool.install(|| run_pass(&mut graph, output, &context));
        assert_eq!(result, Err(ExecutionError::Interrupted));
        assert!(pass.has_failed(point_graph));
        assert!(reporter.calls() >= 1);
        assert!(reporter.calls() < 60);
        assert!(context.progress.fraction() < 1.0);
    }

    #[test]
    fn test_attribute_writes_past_store_length_are_counted() {
        let mut points = PointCloud::new(vec![Vec3::ZERO; 4]);
        points.positions.push(Vec3::ONE);
        let values = vec![Vec3::X; 5];
        assert_eq!(write_attribute(&mut points, "velocity", values), 1);
        let column = points.attributes.get("velocity").unwrap();
        assert_eq!(column.vec3(3), Some(Vec3::X));
        assert_eq!(column.vec3(4), None);

        let mut aligned = PointCloud::new(vec![Vec3::ZERO; 3]);
        assert_eq!(write_attribute(&mut aligned, "velocity", vec![Vec3::Y; 3]), 0);
    }

    #[test]
    fn test_interrupted_evaluation_fails() {
        let (mut graph, _, output) = setup();
        let context = EvaluationContext::default();
        context.progress.interrupt();
        let (_, result) = run_pass(&mut graph, output, &context);
        assert_eq!(result, Err(ExecutionError::Interrupted));
    }
}
