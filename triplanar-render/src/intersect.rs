//! Ray / axis-aligned cube intersection

use serde::{Deserialize, Serialize};
use triplanar_core::{Error, RayBatch, Result};

/// Components smaller than this are replaced before dividing
const DIRECTION_EPS: f32 = 1e-6;

/// Shrink applied to the cube so samples stay strictly inside the triplane
const BOX_SHRINK: f32 = 1e-3;

/// Slab-test intersector against `[-radius, radius]^3`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RayBoxIntersector {
    pub radius: f32,
    /// Lower clamp on entry distance
    pub near: f32,
    /// Minimum in-box segment length for a ray to count as a hit (strict)
    pub valid_threshold: f32,
}

impl Default for RayBoxIntersector {
    fn default() -> Self {
        Self {
            radius: 0.87,
            near: 0.0,
            valid_threshold: 0.01,
        }
    }
}

/// Per-ray entry/exit distances
#[derive(Debug, Clone, Default)]
pub struct Intersections {
    pub t_near: Vec<f32>,
    pub t_far: Vec<f32>,
    pub valid: Vec<bool>,
}

impl Intersections {
    /// Indices of rays that hit the cube, ascending
    pub fn valid_indices(&self) -> Vec<usize> {
        self.valid
            .iter()
            .enumerate()
            .filter_map(|(i, &v)| v.then_some(i))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.valid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.valid.is_empty()
    }
}

impl RayBoxIntersector {
    pub fn new(radius: f32) -> Result<Self> {
        if !(radius.is_finite() && radius > 0.0) {
            return Err(Error::Config(format!(
                "bounding radius must be finite and positive, got {}",
                radius
            )));
        }
        Ok(Self {
            radius,
            ..Default::default()
        })
    }

    pub fn with_near(mut self, near: f32) -> Self {
        self.near = near;
        self
    }

    pub fn with_valid_threshold(mut self, threshold: f32) -> Self {
        self.valid_threshold = threshold;
        self
    }

    /// Intersect every ray with the cube. Missed rays get `t_near = t_far = 0`.
    pub fn intersect(&self, rays: &RayBatch) -> Intersections {
        let n = rays.len();
        let mut out = Intersections {
            t_near: Vec::with_capacity(n),
            t_far: Vec::with_capacity(n),
            valid: Vec::with_capacity(n),
        };

        for (origin, direction) in rays.origins.iter().zip(&rays.directions) {
            let (t_near, t_far) = self.slab(
                [origin.x, origin.y, origin.z],
                [direction.x, direction.y, direction.z],
            );
            let valid = t_far - t_near > self.valid_threshold;
            if valid {
                out.t_near.push(t_near);
                out.t_far.push(t_far);
            } else {
                out.t_near.push(0.0);
                out.t_far.push(0.0);
            }
            out.valid.push(valid);
        }

        out
    }

    fn slab(&self, origin: [f32; 3], direction: [f32; 3]) -> (f32, f32) {
        let bound = self.radius * (1.0 - BOX_SHRINK);
        let mut t_near = f32::NEG_INFINITY;
        let mut t_far = f32::INFINITY;

        for axis in 0..3 {
            let mut d = direction[axis];
            if d.abs() < DIRECTION_EPS {
                d = DIRECTION_EPS.copysign(d);
            }
            let t0 = (-bound - origin[axis]) / d;
            let t1 = (bound - origin[axis]) / d;
            t_near = t_near.max(t0.min(t1));
            t_far = t_far.min(t0.max(t1));
        }

        (t_near.max(self.near), t_far)
    }
}
