//! Dense scalar fields sampled on a uniform grid
//!
//! A [`DensityField`] of resolution `R` stores `R^3` samples on the logical
//! cube `[-1, 1]^3`. Element `[ix, iy, iz]` sits at
//! `(-1 + 2 ix / (R - 1), -1 + 2 iy / (R - 1), -1 + 2 iz / (R - 1))`, and the
//! flat order is row-major with `z` varying fastest, so the density value at
//! flat index `i` belongs to the `i`-th point of [`DensityField::grid_points`].

use crate::{point::*, Error, Result};
use ndarray::{s, Array3};

/// Cubic scalar field over `[-radius, radius]^3`
#[derive(Debug, Clone)]
pub struct DensityField {
    values: Array3<f32>,
    radius: f32,
}

impl DensityField {
    /// Wrap an `[R, R, R]` array of samples covering `[-radius, radius]^3`
    pub fn new(values: Array3<f32>, radius: f32) -> Result<Self> {
        let shape = values.shape();
        if shape[0] != shape[1] || shape[1] != shape[2] || shape[0] < 2 {
            return Err(Error::shape_mismatch(
                "DensityField::new",
                "[R, R, R] with R >= 2",
                format!("{:?}", shape),
            ));
        }
        if !(radius.is_finite() && radius > 0.0) {
            return Err(Error::InvalidData(format!(
                "field radius must be finite and positive, got {}",
                radius
            )));
        }
        Ok(Self { values, radius })
    }

    /// Build a field from a flat vector in grid-point order
    pub fn from_flat(resolution: usize, values: Vec<f32>, radius: f32) -> Result<Self> {
        let len = values.len();
        let values = Array3::from_shape_vec((resolution, resolution, resolution), values)
            .map_err(|_| {
                Error::shape_mismatch(
                    "DensityField::from_flat",
                    format!("{} values", resolution * resolution * resolution),
                    len,
                )
            })?;
        Self::new(values, radius)
    }

    /// Sample `f` at every world-space grid point
    pub fn from_fn<F>(resolution: usize, radius: f32, f: F) -> Result<Self>
    where
        F: Fn(Point3f) -> f32,
    {
        if resolution < 2 {
            return Err(Error::Config(format!(
                "grid resolution must be at least 2, got {}",
                resolution
            )));
        }
        let values = Array3::from_shape_fn((resolution, resolution, resolution), |(x, y, z)| {
            let p = Point3f::new(
                logical_coord(x, resolution),
                logical_coord(y, resolution),
                logical_coord(z, resolution),
            );
            f(Point3f::from(p.coords * radius))
        });
        Self::new(values, radius)
    }

    /// Samples per axis `R`
    pub fn resolution(&self) -> usize {
        self.values.shape()[0]
    }

    /// Half extent of the world-space cube
    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Raw samples
    pub fn values(&self) -> &Array3<f32> {
        &self.values
    }

    /// Sample at grid index
    #[inline]
    pub fn value(&self, x: usize, y: usize, z: usize) -> f32 {
        self.values[[x, y, z]]
    }

    /// Number of marching cubes, `(R - 1)^3`
    pub fn cube_count(&self) -> usize {
        let n = self.resolution() - 1;
        n * n * n
    }

    /// Logical `[-1, 1]^3` positions of every grid point in flat order
    pub fn grid_points(resolution: usize) -> Vec<Point3f> {
        let mut points = Vec::with_capacity(resolution * resolution * resolution);
        for x in 0..resolution {
            for y in 0..resolution {
                for z in 0..resolution {
                    points.push(Point3f::new(
                        logical_coord(x, resolution),
                        logical_coord(y, resolution),
                        logical_coord(z, resolution),
                    ));
                }
            }
        }
        points
    }

    /// Map a position in grid-index space (`[0, R-1]^3`) to world space
    #[inline]
    pub fn index_to_world(&self, p: &Point3f) -> Point3f {
        let scale = 2.0 * self.radius / (self.resolution() - 1) as f32;
        Point3f::new(
            p.x * scale - self.radius,
            p.y * scale - self.radius,
            p.z * scale - self.radius,
        )
    }

    /// Partition the cube grid into sub-grids of at most `chunk_cubes` cubes per axis.
    ///
    /// `chunk_cubes == 0` yields a single sub-grid covering every cube.
    pub fn sub_grids(&self, chunk_cubes: usize) -> Vec<SubGrid> {
        let n = self.resolution() - 1;
        let step = if chunk_cubes == 0 { n } else { chunk_cubes.min(n) };

        let mut grids = Vec::new();
        for x in (0..n).step_by(step) {
            for y in (0..n).step_by(step) {
                for z in (0..n).step_by(step) {
                    grids.push(SubGrid {
                        origin: [x, y, z],
                        cubes: [step.min(n - x), step.min(n - y), step.min(n - z)],
                    });
                }
            }
        }
        grids
    }
}

/// Logical coordinate of grid index `i` along an axis with `resolution` samples
#[inline]
pub fn logical_coord(i: usize, resolution: usize) -> f32 {
    -1.0 + 2.0 * i as f32 / (resolution - 1) as f32
}

/// A box of cubes inside a [`DensityField`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubGrid {
    /// Grid index of the first corner
    pub origin: [usize; 3],
    /// Cubes along each axis
    pub cubes: [usize; 3],
}

impl SubGrid {
    /// Number of cubes in this sub-grid
    pub fn cube_count(&self) -> usize {
        self.cubes[0] * self.cubes[1] * self.cubes[2]
    }

    /// Grid points along each axis (cubes + 1)
    pub fn point_dims(&self) -> [usize; 3] {
        [self.cubes[0] + 1, self.cubes[1] + 1, self.cubes[2] + 1]
    }

    /// Copy the samples this sub-grid touches, flat with `z` fastest
    pub fn gather(&self, field: &DensityField) -> Vec<f32> {
        let [ox, oy, oz] = self.origin;
        let [px, py, pz] = self.point_dims();
        field
            .values()
            .slice(s![ox..ox + px, oy..oy + py, oz..oz + pz])
            .iter()
            .copied()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_field_validation() {
        assert!(DensityField::new(Array3::zeros((4, 4, 4)), 1.0).is_ok());
        assert!(DensityField::new(Array3::zeros((4, 4, 3)), 1.0).is_err());
        assert!(DensityField::new(Array3::zeros((1, 1, 1)), 1.0).is_err());
        assert!(DensityField::new(Array3::zeros((4, 4, 4)), 0.0).is_err());
        assert!(DensityField::from_flat(3, vec![0.0; 26], 1.0).is_err());
    }

    #[test]
    fn test_grid_point_order_matches_field_layout() {
        let resolution = 5;
        let points = DensityField::grid_points(resolution);
        let values: Vec<f32> = points.iter().map(|p| p.x * 100.0 + p.y * 10.0 + p.z).collect();
        let field = DensityField::from_flat(resolution, values, 1.0).unwrap();

        // flat index 1 is (0, 0, 1): z varies fastest
        assert_eq!(points[1], Point3f::new(-1.0, -1.0, -0.5));
        assert_relative_eq!(field.value(4, 2, 1), 100.0 + 0.0 - 0.5);
    }

    #[test]
    fn test_index_to_world() {
        let field = DensityField::new(Array3::zeros((5, 5, 5)), 0.5).unwrap();
        let p = field.index_to_world(&Point3f::new(0.0, 2.0, 4.0));
        assert_relative_eq!(p.x, -0.5);
        assert_relative_eq!(p.y, 0.0);
        assert_relative_eq!(p.z, 0.5);
    }

    #[test]
    fn test_sub_grids_cover_every_cube_once() {
        let field = DensityField::new(Array3::zeros((11, 11, 11)), 1.0).unwrap();
        for chunk in [0, 1, 3, 4, 10, 32] {
            let grids = field.sub_grids(chunk);
            let total: usize = grids.iter().map(|g| g.cube_count()).sum();
            assert_eq!(total, field.cube_count(), "chunk size {}", chunk);
        }
        assert_eq!(field.sub_grids(0).len(), 1);
        assert_eq!(field.sub_grids(4).len(), 27);
    }

    #[test]
    fn test_sub_grid_gather() {
        let field = DensityField::from_fn(4, 1.0, |p| p.x + p.y + p.z).unwrap();
        let grid = SubGrid { origin: [1, 0, 2], cubes: [2, 1, 1] };
        let samples = grid.gather(&field);

        assert_eq!(samples.len(), 3 * 2 * 2);
        assert_relative_eq!(samples[0], field.value(1, 0, 2));
        assert_relative_eq!(samples[11], field.value(3, 1, 3));
    }
}
