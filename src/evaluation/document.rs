//! The state an evaluator works on

use serde::{Deserialize, Serialize};

use super::context::TimeSettings;
use crate::constants::evaluation::DEFAULT_RESOLUTION;
use crate::geometry::{ObjectData, SceneData};
use crate::nodes::interface::ImageBuffer;
use crate::nodes::{Graph, NodeId};

/// What the user is editing, which decides what gets evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EditingContext {
    #[default]
    Composite,
    Pixel,
    Scene,
    Object,
    Mesh,
    Simulation,
}

/// Evaluation strategy an editing context maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationTarget {
    /// Pull the compositing graph from its viewer
    Composite,
    /// Pull every object of the scene graph
    Scene,
    /// Pull the active object of the scene graph
    Object,
}

impl EditingContext {
    pub fn target(self) -> EvaluationTarget {
        match self {
            EditingContext::Composite | EditingContext::Pixel => EvaluationTarget::Composite,
            EditingContext::Scene | EditingContext::Simulation => EvaluationTarget::Scene,
            EditingContext::Object | EditingContext::Mesh => EvaluationTarget::Object,
        }
    }
}

/// Graphs plus the results of the last evaluation
#[derive(Debug)]
pub struct Document {
    pub composite: Graph,
    pub scene: Graph,
    pub context: EditingContext,
    pub time: TimeSettings,
    pub resolution: [u32; 2],
    /// Evaluations run on the caller's thread while playing
    pub playing: bool,
    pub last_viewer: Option<NodeId>,
    pub last_image: Option<ImageBuffer>,
    pub last_scene: Option<SceneData>,
    pub last_object: Option<ObjectData>,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            composite: Graph::new(),
            scene: Graph::new(),
            context: EditingContext::default(),
            time: TimeSettings::default(),
            resolution: DEFAULT_RESOLUTION,
            playing: false,
            last_viewer: None,
            last_image: None,
            last_scene: None,
            last_object: None,
        }
    }
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move to `frame`, staling every node of both graphs
    pub fn set_frame(&mut self, frame: i32) {
        if self.time.current != frame {
            self.time.current = frame;
            self.composite.mark_all_stale();
            self.scene.mark_all_stale();
        }
    }

    /// Change the output size; only compositing depends on it
    pub fn set_resolution(&mut self, width: u32, height: u32) {
        if self.resolution != [width, height] {
            self.resolution = [width, height];
            self.composite.mark_all_stale();
        }
    }
}
