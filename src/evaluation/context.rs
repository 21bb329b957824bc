//! Ambient values handed to every node execution

use serde::{Deserialize, Serialize};

use super::reporter::ProgressTracker;
use crate::config::EngineConfig;
use crate::constants::evaluation::{DEFAULT_END_FRAME, DEFAULT_FRAME_RATE, DEFAULT_RESOLUTION, DEFAULT_START_FRAME};

/// Frame range and playback position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSettings {
    pub frame_rate: f32,
    pub start: i32,
    pub end: i32,
    pub current: i32,
}

impl TimeSettings {
    /// Current time in seconds
    pub fn seconds(&self) -> f32 {
        if self.frame_rate > 0.0 {
            self.current as f32 / self.frame_rate
        } else {
            0.0
        }
    }
}

impl Default for TimeSettings {
    fn default() -> Self {
        Self {
            frame_rate: DEFAULT_FRAME_RATE,
            start: DEFAULT_START_FRAME,
            end: DEFAULT_END_FRAME,
            current: DEFAULT_START_FRAME,
        }
    }
}

/// Output region in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rectangle {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rectangle {
    pub fn from_resolution(width: u32, height: u32) -> Self {
        Self { x: 0, y: 0, width, height }
    }

    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl Default for Rectangle {
    fn default() -> Self {
        Self::from_resolution(DEFAULT_RESOLUTION[0], DEFAULT_RESOLUTION[1])
    }
}

/// Everything an operator may read besides its inputs and parameters
#[derive(Debug, Clone, Default)]
pub struct EvaluationContext {
    pub time: TimeSettings,
    pub region: Rectangle,
    pub progress: ProgressTracker,
    pub config: EngineConfig,
}

impl EvaluationContext {
    pub fn new(time: TimeSettings, region: Rectangle, progress: ProgressTracker, config: EngineConfig) -> Self {
        Self { time, region, progress, config }
    }
}
