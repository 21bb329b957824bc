//! Built-in operators outside point graphs

pub mod compositing;
pub mod geometry;
pub mod scene;

pub use compositing::{GainOperator, SolidColorOperator, ViewerOperator};
pub use geometry::{ObjectOutputOperator, PointGridOperator};
pub use scene::{evaluate_objects, ObjectOperator, SceneOperator};
