//! Synthetic scene shared by the demos
//!
//! The triplane stores each texel's own plane coordinates plus a mask
//! channel, so the decoder can recover the query position and shape an
//! analytic scene from it. No trained network is involved.

use ndarray::{Array1, Array2, ArrayView2};
use triplanar_core::{DecoderOutput, Point3f, Result, Triplane, VolumeDecoder};

/// Triplane whose channels are `[u, v, 1]` on every plane
pub fn position_triplane(size: usize) -> Result<Triplane> {
    Triplane::from_fn(3, size, size, |_, c, row, col| match c {
        0 => (2 * col + 1) as f32 / size as f32 - 1.0,
        1 => (2 * row + 1) as f32 / size as f32 - 1.0,
        _ => 1.0,
    })
}

struct Ball {
    center: Point3f,
    radius: f32,
    color_logits: [f32; 3],
}

/// Two stacked balls, activated density crossing 25 at their surfaces
pub struct SnowmanDecoder {
    balls: [Ball; 2],
}

impl Default for SnowmanDecoder {
    fn default() -> Self {
        Self {
            balls: [
                Ball {
                    center: Point3f::new(0.0, 0.0, -0.3),
                    radius: 0.4,
                    color_logits: [3.0, 3.0, 3.5],
                },
                Ball {
                    center: Point3f::new(0.0, 0.0, 0.35),
                    radius: 0.25,
                    color_logits: [3.0, 0.5, -2.0],
                },
            ],
        }
    }
}

impl VolumeDecoder for SnowmanDecoder {
    fn decode(&self, features: ArrayView2<'_, f32>) -> Result<DecoderOutput> {
        let n = features.nrows();
        let mut density = Array1::zeros(n);
        let mut color = Array2::zeros((n, 3));

        for (r, row) in features.rows().into_iter().enumerate() {
            // samples blended with zero padding lie outside the scene
            if (0..3).any(|p| row[3 * p + 2] < 0.999) {
                density[r] = -50.0;
                continue;
            }

            // plane 0 holds (x, y), plane 1 holds (x, z)
            let p = Point3f::new(row[0], row[1], row[4]);
            let (surface, ball) = self
                .balls
                .iter()
                .map(|b| (b.radius - (p - b.center).norm(), b))
                .fold((f32::MIN, &self.balls[0]), |best, next| if next.0 > best.0 { next } else { best });

            density[r] = 60.0 * surface + 1.0 + 25.0f32.ln();
            for c in 0..3 {
                color[[r, c]] = ball.color_logits[c];
            }
        }

        DecoderOutput::new(density, color)
    }
}
