//! Ray batches

use crate::{point::*, Error, Result};
use serde::{Deserialize, Serialize};

/// Parallel arrays of ray origins and directions
///
/// Directions are not required to be normalized.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RayBatch {
    pub origins: Vec<Point3f>,
    pub directions: Vec<Vector3f>,
}

impl RayBatch {
    /// Create a batch from parallel arrays of equal length
    pub fn new(origins: Vec<Point3f>, directions: Vec<Vector3f>) -> Result<Self> {
        if origins.len() != directions.len() {
            return Err(Error::shape_mismatch(
                "RayBatch::new",
                format!("{} directions", origins.len()),
                directions.len(),
            ));
        }
        Ok(Self { origins, directions })
    }

    /// Create a batch from flat `[N, 3]` arrays
    pub fn from_flat(origins: &[[f32; 3]], directions: &[[f32; 3]]) -> Result<Self> {
        Self::new(
            origins.iter().map(|o| Point3f::new(o[0], o[1], o[2])).collect(),
            directions.iter().map(|d| Vector3f::new(d[0], d[1], d[2])).collect(),
        )
    }

    /// Number of rays
    pub fn len(&self) -> usize {
        self.origins.len()
    }

    /// Whether the batch is empty
    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }

    /// Position along ray `index` at parameter `t`
    #[inline]
    pub fn point_at(&self, index: usize, t: f32) -> Point3f {
        self.origins[index] + self.directions[index] * t
    }

    /// Re-check the parallel-array invariant (fields are public)
    pub fn validate(&self) -> Result<()> {
        if self.origins.len() != self.directions.len() {
            return Err(Error::shape_mismatch(
                "RayBatch::validate",
                format!("{} directions", self.origins.len()),
                self.directions.len(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ray_batch_lengths() {
        assert!(RayBatch::new(vec![Point3f::origin()], vec![]).is_err());

        let rays = RayBatch::from_flat(&[[0.0, 0.0, 2.0]], &[[0.0, 0.0, -1.0]]).unwrap();
        assert_eq!(rays.len(), 1);
        assert_eq!(rays.point_at(0, 1.5), Point3f::new(0.0, 0.0, 0.5));
    }

    #[test]
    fn test_validate_detects_tampering() {
        let mut rays = RayBatch::from_flat(&[[0.0; 3]], &[[1.0, 0.0, 0.0]]).unwrap();
        rays.directions.push(Vector3f::x());
        assert!(rays.validate().is_err());
    }
}
