//! Node graph data structures and operations

use std::collections::{HashMap, HashSet};

use log::{debug, warn};

use super::cache::{CacheKey, CacheStatistics, OutputCache};
use super::interface::{NodeData, ParamValue};
use super::node::{Node, NodeId, NodeState};
use super::operator::{Operator, OperatorKind};
use super::port::{InputRef, OutputRef};
use crate::error::GraphError;

/// A graph owning nodes and the links between their sockets
#[derive(Debug, Default)]
pub struct Graph {
    nodes: HashMap<NodeId, Node>,
    /// Storage order; topological sorting rearranges it
    order: Vec<NodeId>,
    names: HashSet<String>,
    selection: HashSet<NodeId>,
    needs_reorder: bool,
    next_node_id: NodeId,
    pub active_node: Option<NodeId>,
    pub output_node: Option<NodeId>,
    pub(crate) cache: OutputCache,
    /// Bumped by every edit, read by owners of nested graphs
    revision: u64,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node, renaming it if the name is taken, and selects it
    pub fn add_node(&mut self, mut node: Node) -> NodeId {
        let id = self.next_node_id;
        self.next_node_id += 1;

        node.set_id(id);
        node.name = self.unique_name(&node.name);
        node.needs_execution = true;
        node.state = NodeState::Dirty;
        for input in &mut node.inputs {
            input.link = None;
        }
        for output in &mut node.outputs {
            output.links.clear();
            output.stack_offset = 0;
        }

        debug!("Adding node '{}' ({})", node.name, id);
        self.names.insert(node.name.clone());
        self.nodes.insert(id, node);
        self.order.push(id);

        self.selection.clear();
        self.selection.insert(id);
        self.needs_reorder = true;
        self.touch();
        id
    }

    /// Shorthand for `add_node(Node::new(name, operator))`
    pub fn add(&mut self, name: &str, operator: Box<dyn Operator>) -> NodeId {
        self.add_node(Node::new(name, operator))
    }

    fn unique_name(&self, requested: &str) -> String {
        if !self.names.contains(requested) {
            return requested.to_string();
        }
        let mut suffix = 1;
        loop {
            let candidate = format!("{}{}", requested, suffix);
            if !self.names.contains(&candidate) {
                return candidate;
            }
            suffix += 1;
        }
    }

    /// Removes a node after disconnecting every link touching it
    pub fn remove_node(&mut self, node_id: NodeId) -> Option<Node> {
        let Some(node) = self.nodes.get(&node_id) else {
            warn!("Cannot remove node {}: not in this graph", node_id);
            return None;
        };

        let inbound = node
            .inputs
            .iter()
            .filter_map(|input| input.link.map(|from| (from, InputRef::new(node_id, input.id))));
        let outbound = node.outputs.iter().flat_map(|output| {
            output
                .links
                .iter()
                .map(move |to| (OutputRef::new(node_id, output.id), *to))
        });
        let links: Vec<(OutputRef, InputRef)> = inbound.chain(outbound).collect();

        for (from, to) in links {
            self.disconnect(from, to);
        }

        let node = self.nodes.remove(&node_id)?;
        self.names.remove(&node.name);
        self.order.retain(|id| *id != node_id);
        self.selection.remove(&node_id);
        if self.active_node == Some(node_id) {
            self.active_node = None;
        }
        if self.output_node == Some(node_id) {
            self.output_node = None;
        }
        self.cache.invalidate_node(node_id);
        self.needs_reorder = true;
        self.touch();
        debug!("Removed node '{}' ({})", node.name, node_id);
        Some(node)
    }

    /// Links an output to an input. Fails without touching the graph when the
    /// input is already linked, the kinds differ, or an endpoint is missing.
    pub fn connect(&mut self, from: OutputRef, to: InputRef) -> Result<(), GraphError> {
        if let Err(e) = self.validate_connection(from, to) {
            warn!("Connection rejected: {}", e);
            return Err(e);
        }

        if let Some(input) = self.nodes.get_mut(&to.node).and_then(|n| n.inputs.get_mut(to.port)) {
            input.link = Some(from);
        }
        if let Some(output) = self.nodes.get_mut(&from.node).and_then(|n| n.outputs.get_mut(from.port)) {
            output.links.push(to);
        }

        self.propagate_stale(to.node);
        self.needs_reorder = true;
        self.touch();
        Ok(())
    }

    /// Convenience wrapper taking raw node and port indices
    pub fn connect_ports(
        &mut self,
        from_node: NodeId,
        from_port: usize,
        to_node: NodeId,
        to_port: usize,
    ) -> Result<(), GraphError> {
        self.connect(OutputRef::new(from_node, from_port), InputRef::new(to_node, to_port))
    }

    fn validate_connection(&self, from: OutputRef, to: InputRef) -> Result<(), GraphError> {
        let source = self.nodes.get(&from.node).ok_or(GraphError::NodeNotFound(from.node))?;
        let target = self.nodes.get(&to.node).ok_or(GraphError::NodeNotFound(to.node))?;
        if from.node == to.node {
            return Err(GraphError::SameNode(source.name.clone()));
        }

        let output = source.outputs.get(from.port).ok_or_else(|| GraphError::PortNotFound {
            node: source.name.clone(),
            direction: "output",
            port: from.port,
        })?;
        let input = target.inputs.get(to.port).ok_or_else(|| GraphError::PortNotFound {
            node: target.name.clone(),
            direction: "input",
            port: to.port,
        })?;

        if input.link.is_some() {
            return Err(GraphError::AlreadyConnected {
                node: target.name.clone(),
                input: input.name.clone(),
            });
        }
        if !output.kind.can_connect_to(input.kind) {
            return Err(GraphError::KindMismatch {
                from: output.kind.name(),
                to: input.kind.name(),
            });
        }
        Ok(())
    }

    /// Removes the link `from -> to`. Returns false if it does not exist.
    pub fn disconnect(&mut self, from: OutputRef, to: InputRef) -> bool {
        let Some(input) = self.nodes.get_mut(&to.node).and_then(|n| n.inputs.get_mut(to.port)) else {
            warn!("Cannot disconnect: input {:?} does not exist", to);
            return false;
        };
        if input.link != Some(from) {
            warn!("Cannot disconnect: {:?} is not linked to {:?}", from, to);
            return false;
        }
        input.link = None;

        if let Some(output) = self.nodes.get_mut(&from.node).and_then(|n| n.outputs.get_mut(from.port)) {
            output.links.retain(|link| *link != to);
        }

        self.propagate_stale(to.node);
        self.needs_reorder = true;
        self.touch();
        true
    }

    /// Marks a node and everything downstream of it as needing execution
    pub fn mark_stale(&mut self, node_id: NodeId) {
        self.propagate_stale(node_id);
        self.touch();
    }

    pub fn mark_all_stale(&mut self) {
        let ids = self.order.clone();
        for id in ids {
            self.propagate_stale(id);
        }
        self.touch();
    }

    // Iterative with a visited set, so cyclic graphs terminate.
    pub(crate) fn propagate_stale(&mut self, node_id: NodeId) {
        let mut visited = HashSet::new();
        let mut pending = vec![node_id];

        while let Some(current) = pending.pop() {
            if !visited.insert(current) {
                continue;
            }
            let Some(node) = self.nodes.get_mut(&current) else {
                continue;
            };
            node.needs_execution = true;
            node.last_exec_time = 0.0;
            node.state = NodeState::Dirty;
            pending.extend(node.outputs.iter().flat_map(|o| o.links.iter().map(|link| link.node)));
            self.cache.invalidate_node(current);
        }
    }

    /// Replaces a declared parameter value and marks the node stale
    pub fn set_parameter(&mut self, node_id: NodeId, name: &str, value: ParamValue) -> Result<(), GraphError> {
        let node = self.nodes.get_mut(&node_id).ok_or(GraphError::NodeNotFound(node_id))?;
        if !node.parameters.contains(name) {
            return Err(GraphError::UnknownParameter {
                node: node.name.clone(),
                name: name.to_string(),
            });
        }
        node.parameters.set(name, value);
        self.mark_stale(node_id);
        Ok(())
    }

    /// Orders nodes so every node comes after the nodes feeding it.
    ///
    /// Each round moves the nodes whose predecessors are all placed in front
    /// of the unplaced remainder. A round that places nothing means the
    /// remainder sits on a cycle; it is left unsorted and reported.
    pub fn topological_sort(&mut self) -> Result<(), GraphError> {
        for id in &self.order {
            if let Some(node) = self.nodes.get_mut(id) {
                node.degree = node.linked_input_count();
            }
        }

        let mut boundary = 0;
        while boundary < self.order.len() {
            let (ready, waiting): (Vec<NodeId>, Vec<NodeId>) = self.order[boundary..]
                .iter()
                .copied()
                .partition(|id| self.nodes.get(id).map_or(true, |n| n.degree == 0));
            if ready.is_empty() {
                break;
            }

            for id in &ready {
                for successor in self.downstream_links(*id) {
                    if let Some(node) = self.nodes.get_mut(&successor) {
                        node.degree = node.degree.saturating_sub(1);
                    }
                }
            }

            let placed = ready.len();
            self.order.truncate(boundary);
            self.order.extend(ready);
            self.order.extend(waiting);
            boundary += placed;
        }

        if boundary < self.order.len() {
            let unresolved: Vec<String> = self.order[boundary..]
                .iter()
                .filter_map(|id| self.nodes.get(id).map(|n| n.name.clone()))
                .collect();
            warn!("Graph has a cycle, {} nodes left unsorted", unresolved.len());
            return Err(GraphError::Cycle { unresolved });
        }

        self.needs_reorder = false;
        Ok(())
    }

    /// Target node of every outgoing link, one entry per link
    fn downstream_links(&self, node_id: NodeId) -> Vec<NodeId> {
        self.nodes
            .get(&node_id)
            .map(|node| {
                node.outputs
                    .iter()
                    .flat_map(|o| o.links.iter().map(|link| link.node))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Distinct nodes fed by this node
    pub fn downstream_nodes(&self, node_id: NodeId) -> Vec<NodeId> {
        let mut nodes = self.downstream_links(node_id);
        nodes.sort_unstable();
        nodes.dedup();
        nodes
    }

    /// Distinct nodes feeding this node
    pub fn upstream_nodes(&self, node_id: NodeId) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = self
            .nodes
            .get(&node_id)
            .map(|node| node.inputs.iter().filter_map(|i| i.link.map(|l| l.node)).collect())
            .unwrap_or_default();
        nodes.sort_unstable();
        nodes.dedup();
        nodes
    }

    /// Re-checks nested graphs bottom-up; owners whose sub-graph changed
    /// since their last successful run are marked stale. Returns whether
    /// anything was marked.
    pub fn sync_nested_revisions(&mut self) -> bool {
        let mut changed = Vec::new();
        for (id, node) in self.nodes.iter_mut() {
            let recorded = node.subgraph_revision;
            if let Some(subgraph) = node.subgraph_mut() {
                subgraph.sync_nested_revisions();
                let current = subgraph.revision();
                if recorded.is_some() && recorded != Some(current) {
                    node.subgraph_revision = None;
                    changed.push(*id);
                }
            }
        }

        for id in &changed {
            debug!("Nested graph of node {} changed", id);
            self.propagate_stale(*id);
        }
        if !changed.is_empty() {
            self.touch();
        }
        !changed.is_empty()
    }

    fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn needs_reorder(&self) -> bool {
        self.needs_reorder
    }

    /// Node ids in storage order (topological after a successful sort)
    pub fn order(&self) -> &[NodeId] {
        &self.order
    }

    pub fn node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    pub fn node_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&node_id)
    }

    /// Nodes in storage order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn find_node(&self, name: &str) -> Option<NodeId> {
        self.nodes.values().find(|node| node.name == name).map(|node| node.id)
    }

    /// Sink of the given kind: the output node if it matches, otherwise
    /// the lowest id among matching nodes
    pub fn find_sink(&self, kind: OperatorKind) -> Option<NodeId> {
        let matches = |id: &NodeId| {
            self.nodes
                .get(id)
                .is_some_and(|node| node.operator_kind() == Some(kind))
        };
        if let Some(output) = self.output_node.filter(|id| matches(id)) {
            return Some(output);
        }
        self.nodes.keys().copied().filter(|id| matches(id)).min()
    }

    /// Ids of nodes whose operator has the given kind, ascending
    pub fn nodes_of_kind(&self, kind: OperatorKind) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self
            .nodes
            .values()
            .filter(|node| node.operator_kind() == Some(kind))
            .map(|node| node.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn contains(&self, node_id: NodeId) -> bool {
        self.nodes.contains_key(&node_id)
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn select(&mut self, node_id: NodeId, additive: bool) {
        if !self.nodes.contains_key(&node_id) {
            return;
        }
        if !additive {
            self.selection.clear();
        }
        self.selection.insert(node_id);
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    pub fn is_selected(&self, node_id: NodeId) -> bool {
        self.selection.contains(&node_id)
    }

    /// Selected node ids in ascending order
    pub fn selection(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.selection.iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Cached value of an output, if its node is up to date
    pub fn cached_output(&mut self, output: OutputRef) -> Option<&NodeData> {
        self.cache.get(&CacheKey::new(output.node, output.port))
    }

    pub fn cache_statistics(&self) -> &CacheStatistics {
        self.cache.get_statistics()
    }
}
