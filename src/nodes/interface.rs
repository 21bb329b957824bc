//! Values flowing between nodes and node parameters

use std::collections::BTreeMap;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::port::SocketKind;
use crate::geometry::{ObjectData, PointCloud, SceneData};

/// RGBA float image
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImageBuffer {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<[f32; 4]>,
}

impl ImageBuffer {
    pub fn filled(width: usize, height: usize, color: [f32; 4]) -> Self {
        Self {
            width,
            height,
            pixels: vec![color; width * height],
        }
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<[f32; 4]> {
        if x >= self.width {
            return None;
        }
        self.pixels.get(y * self.width + x).copied()
    }
}

/// Core data types that flow between nodes
#[derive(Debug, Clone, PartialEq, Default)]
pub enum NodeData {
    #[default]
    None,
    Float(f32),
    Integer(i32),
    Vector3(Vec3),
    Color([f32; 4]),
    Image(ImageBuffer),
    Points(PointCloud),
    Object(ObjectData),
    Scene(SceneData),
}

impl NodeData {
    /// Socket kind this value can travel through
    pub fn kind(&self) -> Option<SocketKind> {
        match self {
            NodeData::None => None,
            NodeData::Float(_) => Some(SocketKind::Scalar),
            NodeData::Integer(_) => Some(SocketKind::Integer),
            NodeData::Vector3(_) => Some(SocketKind::Vector),
            NodeData::Color(_) => Some(SocketKind::Color),
            NodeData::Image(_) => Some(SocketKind::Image),
            NodeData::Points(_) => Some(SocketKind::Points),
            NodeData::Object(_) => Some(SocketKind::Object),
            NodeData::Scene(_) => Some(SocketKind::Scene),
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            NodeData::Float(v) => Some(*v),
            NodeData::Integer(v) => Some(*v as f32),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<Vec3> {
        match self {
            NodeData::Vector3(v) => Some(*v),
            _ => None,
        }
    }

    pub fn into_image(self) -> Option<ImageBuffer> {
        match self {
            NodeData::Image(image) => Some(image),
            _ => None,
        }
    }

    pub fn into_points(self) -> Option<PointCloud> {
        match self {
            NodeData::Points(points) => Some(points),
            _ => None,
        }
    }

    pub fn into_object(self) -> Option<ObjectData> {
        match self {
            NodeData::Object(object) => Some(object),
            _ => None,
        }
    }
}

/// A single parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    Float(f32),
    Int(i32),
    Bool(bool),
    Vector(Vec3),
    Color([f32; 4]),
    Text(String),
}

/// Named parameter values of a node
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parameters(BTreeMap<String, ParamValue>);

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion
    pub fn with(mut self, name: &str, value: ParamValue) -> Self {
        self.0.insert(name.to_string(), value);
        self
    }

    pub fn set(&mut self, name: &str, value: ParamValue) -> Option<ParamValue> {
        self.0.insert(name.to_string(), value)
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn float_or(&self, name: &str, default: f32) -> f32 {
        match self.0.get(name) {
            Some(ParamValue::Float(v)) => *v,
            Some(ParamValue::Int(v)) => *v as f32,
            _ => default,
        }
    }

    pub fn int_or(&self, name: &str, default: i32) -> i32 {
        match self.0.get(name) {
            Some(ParamValue::Int(v)) => *v,
            _ => default,
        }
    }

    pub fn bool_or(&self, name: &str, default: bool) -> bool {
        match self.0.get(name) {
            Some(ParamValue::Bool(v)) => *v,
            _ => default,
        }
    }

    pub fn vector_or(&self, name: &str, default: Vec3) -> Vec3 {
        match self.0.get(name) {
            Some(ParamValue::Vector(v)) => *v,
            _ => default,
        }
    }

    pub fn color_or(&self, name: &str, default: [f32; 4]) -> [f32; 4] {
        match self.0.get(name) {
            Some(ParamValue::Color(v)) => *v,
            _ => default,
        }
    }

    pub fn text_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        match self.0.get(name) {
            Some(ParamValue::Text(v)) => v.as_str(),
            _ => default,
        }
    }
}
