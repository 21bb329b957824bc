//! Node factory system with registration and metadata

use std::collections::{BTreeMap, HashMap};

use log::{debug, warn};
use once_cell::sync::Lazy;

use super::node::Node;
use super::operator::Operator;
use super::port::SocketKind;
use crate::operators::{
    GainOperator, ObjectOperator, ObjectOutputOperator, PointGridOperator, SceneOperator, SolidColorOperator,
    ViewerOperator,
};
use crate::point3d::operators::{
    CombineVectorOperator, EntryOperator, ExitOperator, MathOperator, NoiseOperator, RangeRemapOperator,
    SplitVectorOperator, ValueOperator, VectorOperator,
};
use crate::point3d::PointGraphOperator;

static BUILTIN_REGISTRY: Lazy<NodeRegistry> = Lazy::new(NodeRegistry::with_builtins);

/// Registry holding every built-in operator
pub fn builtin_registry() -> &'static NodeRegistry {
    &BUILTIN_REGISTRY
}

/// Hierarchical category system for organizing nodes
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeCategory {
    path: Vec<String>,
}

impl NodeCategory {
    pub fn new(path: &[&str]) -> Self {
        Self {
            path: path.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Last path component
    pub fn name(&self) -> &str {
        self.path.last().map(|s| s.as_str()).unwrap_or("")
    }

    pub fn display_string(&self) -> String {
        self.path.join(" > ")
    }

    pub fn point() -> Self {
        Self::new(&["Point"])
    }
    pub fn geometry() -> Self {
        Self::new(&["Geometry"])
    }
    pub fn compositing() -> Self {
        Self::new(&["Compositing"])
    }
    pub fn scene() -> Self {
        Self::new(&["Scene"])
    }
    pub fn output() -> Self {
        Self::new(&["Output"])
    }
}

/// Port declaration used to build node sockets
#[derive(Debug, Clone, PartialEq)]
pub struct PortDefinition {
    pub name: String,
    pub kind: SocketKind,
    pub optional: bool,
    pub description: Option<String>,
}

impl PortDefinition {
    pub fn required(name: &str, kind: SocketKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            optional: false,
            description: None,
        }
    }

    pub fn optional(name: &str, kind: SocketKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            optional: true,
            description: None,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
}

/// Descriptive metadata of a node type
#[derive(Debug, Clone)]
pub struct NodeMetadata {
    pub node_type: &'static str,
    pub display_name: &'static str,
    pub description: &'static str,
    pub version: &'static str,
    pub category: NodeCategory,
    pub tags: Vec<&'static str>,
}

impl NodeMetadata {
    pub fn new(
        node_type: &'static str,
        display_name: &'static str,
        category: NodeCategory,
        description: &'static str,
    ) -> Self {
        Self {
            node_type,
            display_name,
            description,
            version: "1.0",
            category,
            tags: vec![],
        }
    }

    pub fn with_tags(mut self, tags: Vec<&'static str>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_version(mut self, version: &'static str) -> Self {
        self.version = version;
        self
    }
}

/// Implemented by every operator type that can be created by name
pub trait NodeFactory {
    fn metadata() -> NodeMetadata
    where
        Self: Sized;

    fn create() -> Box<dyn Operator>
    where
        Self: Sized;

    /// Node named after the display name, with sockets from the operator
    fn create_node() -> Node
    where
        Self: Sized,
    {
        Node::new(Self::metadata().display_name, Self::create())
    }
}

type OperatorCreator = fn() -> Box<dyn Operator>;
type MetadataProvider = fn() -> NodeMetadata;

/// Registry for managing node factories
#[derive(Default)]
pub struct NodeRegistry {
    creators: BTreeMap<String, OperatorCreator>,
    metadata_providers: BTreeMap<String, MetadataProvider>,
    categories: HashMap<NodeCategory, Vec<String>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in operator
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register::<EntryOperator>();
        registry.register::<ExitOperator>();
        registry.register::<ValueOperator>();
        registry.register::<VectorOperator>();
        registry.register::<MathOperator>();
        registry.register::<SplitVectorOperator>();
        registry.register::<CombineVectorOperator>();
        registry.register::<NoiseOperator>();
        registry.register::<RangeRemapOperator>();
        registry.register::<PointGridOperator>();
        registry.register::<PointGraphOperator>();
        registry.register::<ObjectOutputOperator>();
        registry.register::<SolidColorOperator>();
        registry.register::<GainOperator>();
        registry.register::<ViewerOperator>();
        registry.register::<ObjectOperator>();
        registry.register::<SceneOperator>();
        debug!("Registered {} built-in node types", registry.creators.len());
        registry
    }

    pub fn register<T: NodeFactory + 'static>(&mut self) {
        let metadata = T::metadata();
        let node_type = metadata.node_type.to_string();
        if self.creators.contains_key(&node_type) {
            warn!("Node type '{}' registered twice, replacing", node_type);
        } else {
            self.categories
                .entry(metadata.category.clone())
                .or_default()
                .push(node_type.clone());
        }
        self.creators.insert(node_type.clone(), T::create);
        self.metadata_providers.insert(node_type, T::metadata);
    }

    pub fn create_operator(&self, node_type: &str) -> Option<Box<dyn Operator>> {
        self.creators.get(node_type).map(|creator| creator())
    }

    /// Create a node by type name, named after the type's display name
    pub fn create_node(&self, node_type: &str) -> Option<Node> {
        let operator = self.create_operator(node_type)?;
        let name = self
            .get_metadata(node_type)
            .map(|meta| meta.display_name)
            .unwrap_or(node_type);
        Some(Node::new(name, operator))
    }

    /// All registered type names, sorted
    pub fn node_types(&self) -> Vec<&str> {
        self.creators.keys().map(|s| s.as_str()).collect()
    }

    pub fn nodes_in_category(&self, category: &NodeCategory) -> Vec<&str> {
        self.categories
            .get(category)
            .map(|nodes| nodes.iter().map(|s| s.as_str()).collect())
            .unwrap_or_default()
    }

    /// All categories, sorted
    pub fn categories(&self) -> Vec<&NodeCategory> {
        let mut categories: Vec<&NodeCategory> = self.categories.keys().collect();
        categories.sort();
        categories
    }

    pub fn get_metadata(&self, node_type: &str) -> Option<NodeMetadata> {
        self.metadata_providers.get(node_type).map(|provider| provider())
    }
}
