//! CPU triplane feature sampling
//!
//! Bilinear grid-sample with zero padding and `align_corners = false`: a
//! coordinate `c` in `[-1, 1]` lands on pixel `((c + 1) * size - 1) / 2`, so
//! `-1` and `1` sit on the outer edges of the first and last texels. Taps that
//! fall outside the plane contribute zero.

use crate::parallel;
use ndarray::Array2;
use triplanar_core::{
    FeatureReduction, FeatureSampler, Point3f, Result, Triplane, NUM_PLANES, PLANE_AXES,
};

/// Map a normalized coordinate to a continuous pixel coordinate
#[inline]
pub fn unnormalize(coord: f32, size: usize) -> f32 {
    ((coord + 1.0) * size as f32 - 1.0) * 0.5
}

/// Rayon-parallel triplane sampler
#[derive(Debug, Clone, Copy, Default)]
pub struct TriplaneSampler {
    reduction: FeatureReduction,
}

impl TriplaneSampler {
    pub fn new(reduction: FeatureReduction) -> Self {
        Self { reduction }
    }
}

impl FeatureSampler for TriplaneSampler {
    fn reduction(&self) -> FeatureReduction {
        self.reduction
    }

    fn sample(&self, triplane: &Triplane, positions: &[Point3f]) -> Result<Array2<f32>> {
        let channels = triplane.channels();
        let dim = self.reduction.output_dim(channels);

        let rows = parallel::parallel_map(positions, |p| {
            let mut row = vec![0.0f32; dim];
            sample_point(triplane, p, self.reduction, &mut row);
            row
        });

        let flat: Vec<f32> = rows.into_iter().flatten().collect();
        Ok(Array2::from_shape_vec((positions.len(), dim), flat)?)
    }
}

/// Reduced feature vector of a single point, written into `out`
pub fn sample_point(triplane: &Triplane, p: &Point3f, reduction: FeatureReduction, out: &mut [f32]) {
    let channels = triplane.channels();
    let coords = [p.x, p.y, p.z];

    match reduction {
        FeatureReduction::Concat => {
            for (plane, axes) in PLANE_AXES.iter().enumerate() {
                let slot = &mut out[plane * channels..(plane + 1) * channels];
                grid_sample_plane(triplane, plane, coords[axes[0]], coords[axes[1]], slot);
            }
        }
        FeatureReduction::Mean => {
            let mut scratch = vec![0.0f32; channels];
            for (plane, axes) in PLANE_AXES.iter().enumerate() {
                scratch.iter_mut().for_each(|v| *v = 0.0);
                grid_sample_plane(triplane, plane, coords[axes[0]], coords[axes[1]], &mut scratch);
                for (o, s) in out.iter_mut().zip(&scratch) {
                    *o += s;
                }
            }
            let scale = 1.0 / NUM_PLANES as f32;
            out.iter_mut().for_each(|v| *v *= scale);
        }
    }
}

/// Bilinearly sample every channel of one plane at `(u, v)`, accumulating into `out`.
///
/// `u` indexes the plane width and `v` its height.
pub fn grid_sample_plane(triplane: &Triplane, plane: usize, u: f32, v: f32, out: &mut [f32]) {
    let width = triplane.width();
    let height = triplane.height();

    let px = unnormalize(u, width);
    let py = unnormalize(v, height);
    let x0 = px.floor();
    let y0 = py.floor();
    let fx = px - x0;
    let fy = py - y0;

    let taps = [
        (x0, y0, (1.0 - fx) * (1.0 - fy)),
        (x0 + 1.0, y0, fx * (1.0 - fy)),
        (x0, y0 + 1.0, (1.0 - fx) * fy),
        (x0 + 1.0, y0 + 1.0, fx * fy),
    ];

    for (tx, ty, weight) in taps {
        if weight == 0.0 || tx < 0.0 || ty < 0.0 || tx >= width as f32 || ty >= height as f32 {
            continue;
        }
        let (col, row) = (tx as usize, ty as usize);
        for (c, o) in out.iter_mut().enumerate() {
            *o += weight * triplane.texel(plane, c, row, col);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn lattice_coord(i: usize, size: usize) -> f32 {
        (2.0 * i as f32 + 1.0) / size as f32 - 1.0
    }

    #[test]
    fn test_lattice_points_are_exact() {
        for channels in [1, 3, 8] {
            let triplane = Triplane::from_fn(channels, 4, 6, |p, c, y, x| {
                (p * 1000 + c * 100 + y * 10 + x) as f32
            })
            .unwrap();
            let sampler = TriplaneSampler::new(FeatureReduction::Concat);

            // x -> col 2 of a 6-wide plane, y -> row 1 of a 4-tall plane
            let x = lattice_coord(2, 6);
            let y = lattice_coord(1, 4);
            let z = lattice_coord(3, 4);
            let features = sampler.sample(&triplane, &[Point3f::new(x, y, z)]).unwrap();

            assert_eq!(features.shape(), &[1, 3 * channels]);
            for c in 0..channels {
                // plane 0 (x, y): col from x, row from y
                assert_relative_eq!(features[[0, c]], triplane.texel(0, c, 1, 2), epsilon = 1e-4);
                // plane 1 (x, z): row from z
                assert_relative_eq!(
                    features[[0, channels + c]],
                    triplane.texel(1, c, 3, 2),
                    epsilon = 1e-4
                );
            }
        }
    }

    #[test]
    fn test_edge_is_half_zero_padded() {
        let triplane = Triplane::from_fn(2, 4, 4, |_, c, _, _| (c + 1) as f32).unwrap();
        let sampler = TriplaneSampler::new(FeatureReduction::Concat);

        let y = lattice_coord(1, 4);
        let z = lattice_coord(2, 4);
        let features = sampler.sample(&triplane, &[Point3f::new(-1.0, y, z)]).unwrap();

        // planes 0 and 1 see x = -1, half a texel outside the first column
        assert_relative_eq!(features[[0, 0]], 0.5, epsilon = 1e-5);
        assert_relative_eq!(features[[0, 1]], 1.0, epsilon = 1e-5);
        assert_relative_eq!(features[[0, 2]], 0.5, epsilon = 1e-5);
        // plane 2 (y, z) is interior
        assert_relative_eq!(features[[0, 4]], 1.0, epsilon = 1e-5);
        assert_relative_eq!(features[[0, 5]], 2.0, epsilon = 1e-5);
    }

    #[test]
    fn test_far_outside_is_zero() {
        let triplane = Triplane::from_fn(1, 4, 4, |_, _, _, _| 3.0).unwrap();
        let sampler = TriplaneSampler::default();
        let features = sampler.sample(&triplane, &[Point3f::new(5.0, 5.0, 5.0)]).unwrap();
        assert!(features.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_mean_is_average_of_concat() {
        let triplane = Triplane::from_fn(3, 5, 5, |p, c, y, x| {
            (p as f32 + 1.0) * 0.3 + c as f32 * 0.1 + y as f32 * 0.07 - x as f32 * 0.05
        })
        .unwrap();
        let points = vec![
            Point3f::new(0.1, -0.3, 0.7),
            Point3f::new(-0.9, 0.9, 0.0),
            Point3f::new(0.0, 0.0, 0.0),
        ];

        let concat = TriplaneSampler::new(FeatureReduction::Concat)
            .sample(&triplane, &points)
            .unwrap();
        let mean = TriplaneSampler::new(FeatureReduction::Mean)
            .sample(&triplane, &points)
            .unwrap();

        assert_eq!(mean.shape(), &[3, 3]);
        for i in 0..points.len() {
            for c in 0..3 {
                let expected = (concat[[i, c]] + concat[[i, 3 + c]] + concat[[i, 6 + c]]) / 3.0;
                assert_relative_eq!(mean[[i, c]], expected, epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn test_empty_positions() {
        let triplane = Triplane::from_fn(2, 2, 2, |_, _, _, _| 1.0).unwrap();
        let features = TriplaneSampler::default().sample(&triplane, &[]).unwrap();
        assert_eq!(features.shape(), &[0, 6]);
    }
}
