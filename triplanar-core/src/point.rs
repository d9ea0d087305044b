//! Point and vector aliases shared across the workspace

use nalgebra::{Point3, Vector3};

/// A 3D point with floating point coordinates
pub type Point3f = Point3<f32>;

/// A 3D vector with floating point components
pub type Vector3f = Vector3<f32>;

/// Linear RGB triple, nominally in `[0, 1]`
pub type Rgb = [f32; 3];

/// Scale a point from the world cube `[-radius, radius]^3` into the
/// logical plane-coordinate cube `[-1, 1]^3`
#[inline]
pub fn normalize_to_unit_cube(point: &Point3f, radius: f32) -> Point3f {
    Point3f::from(point.coords / radius)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_normalize_to_unit_cube() {
        let p = normalize_to_unit_cube(&Point3f::new(0.87, -0.435, 0.0), 0.87);
        assert_relative_eq!(p.x, 1.0);
        assert_relative_eq!(p.y, -0.5);
        assert_relative_eq!(p.z, 0.0);
    }
}
