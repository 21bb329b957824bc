//! Serializable snapshots of graphs
//!
//! Nodes are stored with their operator type name and parameters and are
//! recreated through a [`NodeRegistry`]. Connections refer to nodes by name,
//! which is unique within a graph.

use std::collections::HashMap;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::factory::NodeRegistry;
use super::graph::Graph;
use super::interface::Parameters;
use super::node::{Node, NodeId};
use crate::error::PersistenceError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub name: String,
    pub operator: String,
    pub position: [f32; 2],
    pub parameters: Parameters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subgraph: Option<GraphSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionSnapshot {
    pub from_node: String,
    pub from_port: usize,
    pub to_node: String,
    pub to_port: usize,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<NodeSnapshot>,
    pub connections: Vec<ConnectionSnapshot>,
    #[serde(default)]
    pub active_node: Option<String>,
    #[serde(default)]
    pub output_node: Option<String>,
}

impl GraphSnapshot {
    /// Capture nodes in creation order. Nodes without an operator cannot be
    /// recreated and are left out along with their connections.
    pub fn capture(graph: &Graph) -> Self {
        let mut ids: Vec<NodeId> = graph.nodes().map(|node| node.id).collect();
        ids.sort_unstable();

        let mut snapshot = Self::default();
        for id in &ids {
            let Some(node) = graph.node(*id) else { continue };
            let Some(operator) = node.operator.as_ref() else {
                warn!("Node '{}' has no operator and is not saved", node.name);
                continue;
            };
            snapshot.nodes.push(NodeSnapshot {
                name: node.name.clone(),
                operator: operator.type_name().to_string(),
                position: node.position,
                parameters: node.parameters.clone(),
                subgraph: operator.subgraph().map(Self::capture),
            });
        }

        let saved = |id: NodeId| {
            graph
                .node(id)
                .filter(|node| node.operator.is_some())
                .map(|node| node.name.clone())
        };
        for id in &ids {
            let Some(node) = graph.node(*id) else { continue };
            for input in &node.inputs {
                let Some(link) = input.link else { continue };
                if let (Some(from_node), Some(to_node)) = (saved(link.node), saved(node.id)) {
                    snapshot.connections.push(ConnectionSnapshot {
                        from_node,
                        from_port: link.port,
                        to_node,
                        to_port: input.id,
                    });
                }
            }
        }

        snapshot.active_node = graph.active_node.and_then(saved);
        snapshot.output_node = graph.output_node.and_then(saved);
        snapshot
    }

    /// Rebuild a graph: nodes first, then connections. Every node starts stale.
    pub fn restore(&self, registry: &NodeRegistry) -> Result<Graph, PersistenceError> {
        let mut graph = Graph::new();
        let mut ids: HashMap<&str, NodeId> = HashMap::new();

        for saved in &self.nodes {
            let mut operator = registry
                .create_operator(&saved.operator)
                .ok_or_else(|| PersistenceError::UnknownOperator(saved.operator.clone()))?;
            if let Some(subgraph) = &saved.subgraph {
                let restored = subgraph.restore(registry)?;
                let target = operator
                    .subgraph_mut()
                    .ok_or_else(|| PersistenceError::NoSubgraph(saved.operator.clone()))?;
                *target = restored;
            }

            let mut node = Node::new(saved.name.as_str(), operator).with_position(saved.position);
            for (name, value) in saved.parameters.iter() {
                node.parameters.set(name, value.clone());
            }
            let id = graph.add_node(node);
            ids.insert(saved.name.as_str(), id);
        }

        let lookup = |name: &str| {
            ids.get(name)
                .copied()
                .ok_or_else(|| PersistenceError::UnknownNode(name.to_string()))
        };
        for connection in &self.connections {
            let from = lookup(&connection.from_node)?;
            let to = lookup(&connection.to_node)?;
            graph.connect_ports(from, connection.from_port, to, connection.to_port)?;
        }

        graph.active_node = self.active_node.as_deref().map(lookup).transpose()?;
        graph.output_node = self.output_node.as_deref().map(lookup).transpose()?;
        graph.clear_selection();
        debug!(
            "Restored graph with {} nodes and {} connections",
            self.nodes.len(),
            self.connections.len()
        );
        Ok(graph)
    }
}

impl Graph {
    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot::capture(self)
    }

    pub fn from_snapshot(snapshot: &GraphSnapshot, registry: &NodeRegistry) -> Result<Graph, PersistenceError> {
        snapshot.restore(registry)
    }
}
