//! Socket types and functionality for node connections

use serde::{Deserialize, Serialize};

use super::node::NodeId;
use crate::constants::stack::UNRESOLVED;

/// Positional index of a socket on its node
pub type PortId = usize;

/// Kind of value carried by a socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SocketKind {
    Scalar,
    Integer,
    Vector,
    Color,
    Image,
    Points,
    Object,
    Scene,
}

impl SocketKind {
    /// Sockets connect only to sockets of the same kind
    pub fn can_connect_to(self, other: SocketKind) -> bool {
        self == other
    }

    /// Float slots the kind occupies on a compiled point stack, `None` for non-point kinds
    pub fn slot_count(self) -> Option<usize> {
        match self {
            SocketKind::Scalar | SocketKind::Integer => Some(1),
            SocketKind::Vector => Some(3),
            SocketKind::Color => Some(4),
            SocketKind::Image | SocketKind::Points | SocketKind::Object | SocketKind::Scene => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SocketKind::Scalar => "Scalar",
            SocketKind::Integer => "Integer",
            SocketKind::Vector => "Vector",
            SocketKind::Color => "Color",
            SocketKind::Image => "Image",
            SocketKind::Points => "Points",
            SocketKind::Object => "Object",
            SocketKind::Scene => "Scene",
        }
    }
}

/// Address of an output socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputRef {
    pub node: NodeId,
    pub port: PortId,
}

impl OutputRef {
    pub fn new(node: NodeId, port: PortId) -> Self {
        Self { node, port }
    }
}

/// Address of an input socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputRef {
    pub node: NodeId,
    pub port: PortId,
}

impl InputRef {
    pub fn new(node: NodeId, port: PortId) -> Self {
        Self { node, port }
    }
}

/// Input socket: accepts at most one link
#[derive(Debug, Clone, PartialEq)]
pub struct InputSocket {
    /// Owning node
    pub node: NodeId,
    pub id: PortId,
    pub name: String,
    pub kind: SocketKind,
    /// Output feeding this input, `None` when unconnected
    pub link: Option<OutputRef>,
}

impl InputSocket {
    pub fn new(id: PortId, name: impl Into<String>, kind: SocketKind) -> Self {
        Self {
            node: 0,
            id,
            name: name.into(),
            kind,
            link: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }
}

/// Output socket: fans out to any number of inputs
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSocket {
    /// Owning node
    pub node: NodeId,
    pub id: PortId,
    pub name: String,
    pub kind: SocketKind,
    pub links: Vec<InputRef>,
    /// Slot assigned by the point compiler, `0` while unresolved
    pub stack_offset: usize,
}

impl OutputSocket {
    pub fn new(id: PortId, name: impl Into<String>, kind: SocketKind) -> Self {
        Self {
            node: 0,
            id,
            name: name.into(),
            kind,
            links: Vec::new(),
            stack_offset: UNRESOLVED,
        }
    }

    pub fn is_connected(&self) -> bool {
        !self.links.is_empty()
    }
}
