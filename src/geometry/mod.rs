//! Geometry carried between geometry and scene nodes

pub mod attributes;

pub use attributes::{Attribute, AttributeKind, AttributeStore};

use glam::Vec3;

/// Point positions plus per-point attributes
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PointCloud {
    pub positions: Vec<Vec3>,
    pub attributes: AttributeStore,
}

impl PointCloud {
    pub fn new(positions: Vec<Vec3>) -> Self {
        let attributes = AttributeStore::new(positions.len());
        Self { positions, attributes }
    }

    /// Regular grid in the XZ plane centred on the origin
    pub fn grid(columns: usize, rows: usize, size: f32) -> Self {
        let mut positions = Vec::with_capacity(columns * rows);
        let step_x = if columns > 1 { size / (columns - 1) as f32 } else { 0.0 };
        let step_z = if rows > 1 { size / (rows - 1) as f32 } else { 0.0 };
        let half = if columns > 1 || rows > 1 { size * 0.5 } else { 0.0 };
        for row in 0..rows {
            for column in 0..columns {
                positions.push(Vec3::new(
                    column as f32 * step_x - half,
                    0.0,
                    row as f32 * step_z - half,
                ));
            }
        }
        Self::new(positions)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn push(&mut self, position: Vec3) {
        self.positions.push(position);
        self.attributes.resize(self.positions.len());
    }

    /// Axis-aligned bounds, `None` when empty
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let first = *self.positions.first()?;
        Some(
            self.positions
                .iter()
                .fold((first, first), |(min, max), p| (min.min(*p), max.max(*p))),
        )
    }
}

/// Geometry produced by one object graph
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectData {
    pub name: String,
    pub points: PointCloud,
}

/// Objects produced by a scene graph
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SceneData {
    pub objects: Vec<ObjectData>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_layout() {
        let grid = PointCloud::grid(3, 2, 2.0);
        assert_eq!(grid.len(), 6);
        assert_eq!(grid.positions[0], Vec3::new(-1.0, 0.0, -1.0));
        assert_eq!(grid.positions[5], Vec3::new(1.0, 0.0, 1.0));
        assert_eq!(grid.attributes.len(), 6);
    }

    #[test]
    fn test_push_grows_attributes() {
        let mut cloud = PointCloud::default();
        cloud.attributes.add("w", AttributeKind::Scalar);
        cloud.push(Vec3::ONE);
        cloud.push(Vec3::ZERO);
        assert_eq!(cloud.attributes.get("w").unwrap().len(), 2);
    }

    #[test]
    fn test_bounds() {
        assert_eq!(PointCloud::default().bounds(), None);
        let cloud = PointCloud::new(vec![Vec3::new(1.0, -2.0, 0.0), Vec3::new(-1.0, 3.0, 0.5)]);
        assert_eq!(cloud.bounds(), Some((Vec3::new(-1.0, -2.0, 0.0), Vec3::new(1.0, 3.0, 0.5))));
    }
}
