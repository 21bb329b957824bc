//! Application-wide constants and default values
//!
//! Centralized location for all hard-coded values to improve maintainability

/// Version string written into save files
pub const FILE_FORMAT_VERSION: &str = "1.0";

/// Creator tag written into save file metadata
pub const CREATOR: &str = "opgraph 0.1";

/// Compiled point-graph constants
pub mod stack {
    /// Number of float slots available to a compiled point graph
    pub const DEFAULT_CAPACITY: usize = 256;

    /// Offset value meaning "no slot assigned yet". Position 0 always holds an opcode.
    pub const UNRESOLVED: usize = 0;
}

/// Parallel evaluation constants
pub mod parallel {
    /// Elements processed per parallel chunk; cancellation is polled once per chunk
    pub const DEFAULT_GRAIN: usize = 1024;
}

/// Evaluation defaults
pub mod evaluation {
    /// Default playback rate in frames per second
    pub const DEFAULT_FRAME_RATE: f32 = 24.0;

    /// Default frame range
    pub const DEFAULT_START_FRAME: i32 = 0;
    pub const DEFAULT_END_FRAME: i32 = 250;

    /// Default render resolution
    pub const DEFAULT_RESOLUTION: [u32; 2] = [640, 360];
}

/// Configuration file location under the platform config directory
pub mod config {
    pub const APP_DIR: &str = "opgraph";
    pub const FILE_NAME: &str = "config.json";
}
