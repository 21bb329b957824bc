//! Pull-based node execution
//!
//! Executing a node hands its operator an [`ExecutionContext`]. Reading an
//! input through the context executes the upstream node first if it is
//! stale, then returns the cached output. Within one [`ExecutionPass`] each
//! node runs at most once: success clears its stale flag, failure is
//! remembered by the pass.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use glam::Vec3;
use log::{debug, warn};

use super::cache::CacheKey;
use super::graph::Graph;
use super::interface::{ImageBuffer, NodeData, Parameters};
use super::node::{NodeId, NodeState};
use super::port::PortId;
use crate::error::ExecutionError;
use crate::evaluation::{EvaluationContext, ProgressTracker};
use crate::geometry::{ObjectData, PointCloud};

/// Bookkeeping for one evaluation pass
#[derive(Debug, Default)]
pub struct ExecutionPass {
    executed: Vec<NodeId>,
    failed: HashSet<NodeId>,
    warnings: Vec<(String, String)>,
}

impl ExecutionPass {
    pub fn new() -> Self {
        Self::default()
    }

    /// Nodes that ran successfully, in completion order
    pub fn executed(&self) -> &[NodeId] {
        &self.executed
    }

    pub fn has_failed(&self, node_id: NodeId) -> bool {
        self.failed.contains(&node_id)
    }

    pub fn failure_count(&self) -> usize {
        self.failed.len()
    }

    /// `(node name, message)` pairs raised during the pass
    pub fn warnings(&self) -> &[(String, String)] {
        &self.warnings
    }
}

/// What an operator sees while executing
pub struct ExecutionContext<'a> {
    graph: &'a mut Graph,
    node: NodeId,
    evaluation: &'a EvaluationContext,
    pass: &'a mut ExecutionPass,
    /// Wall time spent executing upstream nodes pulled by this node
    upstream_time: Duration,
    warnings: Vec<String>,
}

impl<'a> ExecutionContext<'a> {
    fn new(
        graph: &'a mut Graph,
        node: NodeId,
        evaluation: &'a EvaluationContext,
        pass: &'a mut ExecutionPass,
    ) -> Self {
        Self {
            graph,
            node,
            evaluation,
            pass,
            upstream_time: Duration::ZERO,
            warnings: Vec::new(),
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node
    }

    pub fn node_name(&self) -> &str {
        self.graph.node(self.node).map(|n| n.name.as_str()).unwrap_or_default()
    }

    /// Snapshot of the executing node's parameters
    pub fn parameters(&self) -> Parameters {
        self.graph.node(self.node).map(|n| n.parameters.clone()).unwrap_or_default()
    }

    pub fn evaluation(&self) -> &EvaluationContext {
        self.evaluation
    }

    /// Current time in seconds
    pub fn time(&self) -> f32 {
        self.evaluation.time.seconds()
    }

    pub fn progress(&self) -> &ProgressTracker {
        &self.evaluation.progress
    }

    pub fn is_interrupted(&self) -> bool {
        self.evaluation.progress.is_interrupted()
    }

    pub fn is_input_connected(&self, port: PortId) -> bool {
        self.graph
            .node(self.node)
            .and_then(|n| n.inputs.get(port))
            .is_some_and(|input| input.is_connected())
    }

    /// Value arriving at an input, executing the upstream node if needed
    pub fn input(&mut self, port: PortId) -> Result<NodeData, ExecutionError> {
        let node = self.graph.node(self.node).ok_or(ExecutionError::NodeNotFound(self.node))?;
        let input = node
            .inputs
            .get(port)
            .ok_or_else(|| ExecutionError::Failed(format!("'{}' has no input {}", node.name, port)))?;
        let Some(link) = input.link else {
            return Err(ExecutionError::UnconnectedInput {
                node: node.name.clone(),
                port: input.name.clone(),
            });
        };

        let started = Instant::now();
        let result = execute_node(self.graph, link.node, self.evaluation, self.pass);
        self.upstream_time += started.elapsed();
        result?;

        match self.graph.cache.get(&CacheKey::new(link.node, link.port)) {
            Some(data) => Ok(data.clone()),
            None => {
                let upstream = self.graph.node(link.node).map(|n| n.name.clone()).unwrap_or_default();
                Err(ExecutionError::Failed(format!(
                    "'{}' produced no value on output {}",
                    upstream, link.port
                )))
            }
        }
    }

    /// Like [`input`](Self::input) but `None` when the input is unconnected
    pub fn optional_input(&mut self, port: PortId) -> Result<Option<NodeData>, ExecutionError> {
        if self.is_input_connected(port) {
            self.input(port).map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn input_vector(&mut self, port: PortId) -> Result<Vec3, ExecutionError> {
        match self.input(port)? {
            NodeData::Vector3(value) => Ok(value),
            _ => Err(self.wrong_type(port, "a vector")),
        }
    }

    pub fn input_points(&mut self, port: PortId) -> Result<PointCloud, ExecutionError> {
        match self.input(port)? {
            NodeData::Points(points) => Ok(points),
            _ => Err(self.wrong_type(port, "points")),
        }
    }

    pub fn input_image(&mut self, port: PortId) -> Result<ImageBuffer, ExecutionError> {
        match self.input(port)? {
            NodeData::Image(image) => Ok(image),
            _ => Err(self.wrong_type(port, "an image")),
        }
    }

    pub fn input_object(&mut self, port: PortId) -> Result<ObjectData, ExecutionError> {
        match self.input(port)? {
            NodeData::Object(object) => Ok(object),
            _ => Err(self.wrong_type(port, "an object")),
        }
    }

    fn wrong_type(&self, port: PortId, expected: &'static str) -> ExecutionError {
        let node = self.graph.node(self.node);
        ExecutionError::WrongInputType {
            node: node.map(|n| n.name.clone()).unwrap_or_default(),
            port: node
                .and_then(|n| n.inputs.get(port))
                .map(|i| i.name.clone())
                .unwrap_or_default(),
            expected,
        }
    }

    /// Publish a value on one of this node's outputs
    pub fn set_output(&mut self, port: PortId, data: NodeData) {
        self.graph.cache.insert(CacheKey::new(self.node, port), data);
    }

    /// Record a non-fatal problem; it is kept on the node and in the pass
    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

/// Executes `node_id` if it is stale, pulling its inputs first.
///
/// Timing is exclusive: wall time spent in upstream executions triggered by
/// the node's own input reads is subtracted. Failed runs leave the minimum
/// untouched and keep the node stale for the next pass.
pub fn execute_node(
    graph: &mut Graph,
    node_id: NodeId,
    evaluation: &EvaluationContext,
    pass: &mut ExecutionPass,
) -> Result<(), ExecutionError> {
    let node = graph.node_mut(node_id).ok_or(ExecutionError::NodeNotFound(node_id))?;
    if pass.failed.contains(&node_id) {
        return Err(ExecutionError::UpstreamFailed { node: node.name.clone() });
    }
    if !node.needs_execution {
        return Ok(());
    }
    if node.state == NodeState::Computing {
        warn!("Cycle detected while executing '{}'", node.name);
        return Err(ExecutionError::Cycle { node: node.name.clone() });
    }
    if evaluation.progress.is_interrupted() {
        return Err(ExecutionError::Interrupted);
    }
    let Some(mut operator) = node.operator.take() else {
        node.state = NodeState::Error;
        pass.failed.insert(node_id);
        return Err(ExecutionError::MissingOperator(node.name.clone()));
    };

    node.state = NodeState::Computing;
    node.last_exec_time = 0.0;
    debug!("Executing '{}' ({})", node.name, operator.type_name());

    let started = Instant::now();
    let mut ctx = ExecutionContext::new(graph, node_id, evaluation, pass);
    let result = operator.execute(&mut ctx);
    let ExecutionContext {
        upstream_time,
        warnings,
        ..
    } = ctx;
    let elapsed = started.elapsed().saturating_sub(upstream_time);
    let revision = operator.subgraph().map(Graph::revision);

    let node = graph.node_mut(node_id).ok_or(ExecutionError::NodeNotFound(node_id))?;
    node.operator = Some(operator);
    pass.warnings
        .extend(warnings.iter().map(|message| (node.name.clone(), message.clone())));
    node.warnings = warnings;

    match result {
        Ok(()) => {
            node.needs_execution = false;
            node.state = NodeState::Clean;
            node.record_execution(elapsed.as_secs_f64());
            if revision.is_some() {
                node.subgraph_revision = revision;
            }
            pass.executed.push(node_id);
            Ok(())
        }
        Err(e) => {
            node.state = NodeState::Error;
            warn!("Node '{}' failed: {}", node.name, e);
            pass.failed.insert(node_id);
            graph.cache.invalidate_node(node_id);
            Err(e)
        }
    }
}

/// Runs one pass pulling from `target`, after refreshing nested-graph staleness
pub fn run_pass(
    graph: &mut Graph,
    target: NodeId,
    evaluation: &EvaluationContext,
) -> (ExecutionPass, Result<(), ExecutionError>) {
    graph.sync_nested_revisions();
    let mut pass = ExecutionPass::new();
    let result = execute_node(graph, target, evaluation, &mut pass);
    debug!(
        "Pass from node {} executed {} nodes, {} failed, cache hit ratio {:.2}",
        target,
        pass.executed.len(),
        pass.failed.len(),
        graph.cache_statistics().hit_ratio()
    );
    (pass, result)
}

/// Statistics about the execution state of a graph
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionStats {
    pub total_nodes: usize,
    pub clean_nodes: usize,
    pub dirty_nodes: usize,
    pub computing_nodes: usize,
    pub error_nodes: usize,
    pub cached_outputs: usize,
}

impl ExecutionStats {
    pub fn collect(graph: &Graph) -> Self {
        let mut stats = Self {
            total_nodes: graph.len(),
            clean_nodes: 0,
            dirty_nodes: 0,
            computing_nodes: 0,
            error_nodes: 0,
            cached_outputs: graph.cache.len(),
        };
        for node in graph.nodes() {
            match node.state {
                NodeState::Clean => stats.clean_nodes += 1,
                NodeState::Dirty => stats.dirty_nodes += 1,
                NodeState::Computing => stats.computing_nodes += 1,
                NodeState::Error => stats.error_nodes += 1,
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::port::OutputRef;
    use crate::nodes::test_support::{ExecutionLog, Probe};

    fn scenario(log: &ExecutionLog) -> (Graph, NodeId, NodeId, NodeId) {
        let mut graph = Graph::new();
        let a = graph.add("A", Probe::source("A", Vec3::new(1.0, 2.0, 3.0), log));
        let b = graph.add("B", Probe::scale("B", 2.0, log));
        let c = graph.add("C", Probe::sink("C", log));
        graph.connect_ports(a, 0, b, 0).unwrap();
        graph.connect_ports(b, 0, c, 0).unwrap();
        (graph, a, b, c)
    }

    #[test]
    fn test_chain_executes_each_node_once() {
        let log = ExecutionLog::default();
        let (mut graph, a, b, c) = scenario(&log);
        let evaluation = EvaluationContext::default();

        let (pass, result) = run_pass(&mut graph, c, &evaluation);
        result.unwrap();

        assert_eq!(log.count("A"), 1);
        assert_eq!(log.count("B"), 1);
        // B is invoked first and pulls A, which completes first.
        assert_eq!(log.entries(), vec!["C", "B", "A"]);
        assert_eq!(pass.executed(), &[a, b, c]);

        let sink = graph.node(c).unwrap().operator.as_ref().unwrap();
        assert_eq!(sink.result(), Some(&NodeData::Vector3(Vec3::new(2.0, 4.0, 6.0))));
        for id in [a, b, c] {
            let node = graph.node(id).unwrap();
            assert!(!node.needs_execution);
            assert_eq!(node.execution_count, 1);
            assert_eq!(node.state, NodeState::Clean);
        }
    }

    #[test]
    fn test_fan_out_executes_upstream_once() {
        let log = ExecutionLog::default();
        let mut graph = Graph::new();
        let a = graph.add("A", Probe::source("A", Vec3::ONE, &log));
        let left = graph.add("L", Probe::scale("L", 2.0, &log));
        let right = graph.add("R", Probe::scale("R", 3.0, &log));
        let sum = graph.add("S", Probe::sum("S", &log));
        graph.connect_ports(a, 0, left, 0).unwrap();
        graph.connect_ports(a, 0, right, 0).unwrap();
        graph.connect_ports(left, 0, sum, 0).unwrap();
        graph.connect_ports(right, 0, sum, 1).unwrap();

        let (_, result) = run_pass(&mut graph, sum, &EvaluationContext::default());
        result.unwrap();
        assert_eq!(log.count("A"), 1);
        assert_eq!(
            graph.cached_output(OutputRef::new(sum, 0)),
            Some(&NodeData::Vector3(Vec3::splat(5.0)))
        );
    }

    #[test]
    fn test_clean_nodes_are_skipped() {
        let log = ExecutionLog::default();
        let (mut graph, _, b, c) = scenario(&log);
        let evaluation = EvaluationContext::default();
        run_pass(&mut graph, c, &evaluation).1.unwrap();
        log.clear();

        let (pass, result) = run_pass(&mut graph, c, &evaluation);
        result.unwrap();
        assert!(log.entries().is_empty());
        assert!(pass.executed().is_empty());

        graph.mark_stale(b);
        run_pass(&mut graph, c, &evaluation).1.unwrap();
        assert_eq!(log.entries(), vec!["C", "B"]);

        let stats = graph.cache_statistics();
        assert!(stats.cache_invalidations >= 1);
        assert!(stats.hit_ratio() > 0.0);
    }

    #[test]
    fn test_failure_keeps_node_stale_and_timing_untouched() {
        let log = ExecutionLog::default();
        let mut graph = Graph::new();
        let a = graph.add("A", Probe::source("A", Vec3::ONE, &log));
        let bad = graph.add("Bad", Probe::failing("Bad", &log));
        let c = graph.add("C", Probe::sink("C", &log));
        graph.connect_ports(a, 0, bad, 0).unwrap();
        graph.connect_ports(bad, 0, c, 0).unwrap();

        let (pass, result) = run_pass(&mut graph, c, &EvaluationContext::default());
        assert!(matches!(result, Err(ExecutionError::Failed(_))));
        assert!(pass.has_failed(bad));
        assert!(pass.has_failed(c));

        let node = graph.node(bad).unwrap();
        assert!(node.needs_execution);
        assert_eq!(node.state, NodeState::Error);
        assert_eq!(node.execution_count, 0);
        assert_eq!(node.min_exec_time, 0.0);

        let stats = ExecutionStats::collect(&graph);
        assert_eq!(stats.total_nodes, 3);
        assert_eq!(stats.error_nodes, 2);
        // The failing node never pulled its input.
        assert_eq!(stats.clean_nodes, 0);
        assert_eq!(stats.dirty_nodes, 1);
        assert_eq!(log.count("A"), 0);
        assert_eq!(stats.cached_outputs, 0);
    }

    #[test]
    fn test_failed_node_runs_once_per_pass() {
        let log = ExecutionLog::default();
        let mut graph = Graph::new();
        let bad_source = graph.add("Bad", Probe::failing("Bad", &log));
        let a = graph.add("A", Probe::source("A", Vec3::ONE, &log));
        graph.connect_ports(a, 0, bad_source, 0).unwrap();
        let left = graph.add("L", Probe::scale("L", 1.0, &log));
        let right = graph.add("R", Probe::scale("R", 1.0, &log));
        let sum = graph.add("S", Probe::sum("S", &log));
        graph.connect_ports(bad_source, 0, left, 0).unwrap();
        graph.connect_ports(bad_source, 0, right, 0).unwrap();
        graph.connect_ports(left, 0, sum, 0).unwrap();
        graph.connect_ports(right, 0, sum, 1).unwrap();

        let evaluation = EvaluationContext::default();
        let mut pass = ExecutionPass::new();
        assert!(execute_node(&mut graph, left, &evaluation, &mut pass).is_err());
        let second = execute_node(&mut graph, right, &evaluation, &mut pass);
        assert!(matches!(second, Err(ExecutionError::UpstreamFailed { .. })));
        assert_eq!(log.count("Bad"), 1);
    }

    #[test]
    fn test_cycle_is_reported() {
        let log = ExecutionLog::default();
        let mut graph = Graph::new();
        let a = graph.add("a", Probe::scale("a", 1.0, &log));
        let b = graph.add("b", Probe::scale("b", 1.0, &log));
        graph.connect_ports(a, 0, b, 0).unwrap();
        graph.connect_ports(b, 0, a, 0).unwrap();

        let (_, result) = run_pass(&mut graph, b, &EvaluationContext::default());
        assert_eq!(result, Err(ExecutionError::Cycle { node: "b".to_string() }));
        assert_eq!(log.count("a"), 1);
        assert_eq!(log.count("b"), 1);
    }

    #[test]
    fn test_unconnected_input_fails() {
        let log = ExecutionLog::default();
        let mut graph = Graph::new();
        let b = graph.add("B", Probe::scale("B", 2.0, &log));
        let (_, result) = run_pass(&mut graph, b, &EvaluationContext::default());
        assert!(matches!(result, Err(ExecutionError::UnconnectedInput { .. })));
    }

    #[test]
    fn test_interrupted_pass_stops() {
        let log = ExecutionLog::default();
        let (mut graph, _, _, c) = scenario(&log);
        let evaluation = EvaluationContext::default();
        evaluation.progress.interrupt();
        let (_, result) = run_pass(&mut graph, c, &evaluation);
        assert_eq!(result, Err(ExecutionError::Interrupted));
        assert!(log.entries().is_empty());
    }

    #[test]
    fn test_node_without_operator_fails() {
        let mut graph = Graph::new();
        let id = graph.add_node(crate::nodes::Node::empty("bare"));
        let (_, result) = run_pass(&mut graph, id, &EvaluationContext::default());
        assert_eq!(result, Err(ExecutionError::MissingOperator("bare".to_string())));
    }
}
