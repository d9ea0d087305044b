//! Triplane volume renderer
//!
//! Rays are clipped against the scene cube, sampled at stratified depths,
//! decoded through the triplane and alpha-composited front to back:
//!
//! ```text
//! alpha_i = 1 - exp(-delta_i * sigma_i)
//! T_i     = prod_{j < i} (1 - alpha_j + 1e-10),  T_0 = 1
//! rgb     = sum_i alpha_i T_i c_i
//! opacity = sum_i alpha_i T_i
//! ```
//!
//! `delta` is the spacing of the unit stratification rather than the
//! world-space step, which keeps densities comparable across ray lengths.

use crate::activation::Activation;
use crate::chunked::{ChunkedEvaluator, DEFAULT_CHUNK_SIZE};
use crate::intersect::RayBoxIntersector;
use crate::parallel;
use crate::query::FieldQuery;
use crate::sampler::TriplaneSampler;
use ndarray::{s, Array2, Array3, ArrayView1, ArrayView2, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use triplanar_core::{
    normalize_to_unit_cube, Error, FeatureReduction, FeatureSampler, RayBatch, Result, Triplane,
    TriplaneBatch, VolumeDecoder,
};

/// Added to `1 - alpha` so transmittance never collapses to exactly zero
const TRANSMITTANCE_EPS: f32 = 1e-10;

/// Renderer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Half extent of the scene cube in world units
    pub radius: f32,
    pub num_samples_per_ray: usize,
    /// Jitter samples inside their strata instead of using midpoints
    pub randomized: bool,
    /// Composite over white instead of black
    pub white_background: bool,
    /// Added to raw density before activation
    pub density_bias: f32,
    pub density_activation: Activation,
    pub color_activation: Activation,
    pub feature_reduction: FeatureReduction,
    /// Query points per decoder call; `0` evaluates everything at once
    pub chunk_size: i64,
    /// Lower clamp on ray entry distance
    pub near: f32,
    /// Minimum in-box segment length for a ray to be rendered
    pub valid_threshold: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            radius: 0.87,
            num_samples_per_ray: 128,
            randomized: false,
            white_background: false,
            density_bias: -1.0,
            density_activation: Activation::TruncExp,
            color_activation: Activation::Sigmoid,
            feature_reduction: FeatureReduction::Concat,
            chunk_size: DEFAULT_CHUNK_SIZE as i64,
            near: 0.0,
            valid_threshold: 0.01,
        }
    }
}

impl RenderConfig {
    pub fn with_radius(mut self, radius: f32) -> Self {
        self.radius = radius;
        self
    }

    pub fn with_samples_per_ray(mut self, samples: usize) -> Self {
        self.num_samples_per_ray = samples;
        self
    }

    pub fn with_randomized(mut self, randomized: bool) -> Self {
        self.randomized = randomized;
        self
    }

    pub fn with_white_background(mut self, white: bool) -> Self {
        self.white_background = white;
        self
    }

    pub fn with_density_bias(mut self, bias: f32) -> Self {
        self.density_bias = bias;
        self
    }

    pub fn with_density_activation(mut self, activation: Activation) -> Self {
        self.density_activation = activation;
        self
    }

    pub fn with_color_activation(mut self, activation: Activation) -> Self {
        self.color_activation = activation;
        self
    }

    pub fn with_feature_reduction(mut self, reduction: FeatureReduction) -> Self {
        self.feature_reduction = reduction;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: i64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Check every field; errors are [`Error::Config`]
    pub fn validate(&self) -> Result<()> {
        if !(self.radius.is_finite() && self.radius > 0.0) {
            return Err(Error::Config(format!(
                "radius must be finite and positive, got {}",
                self.radius
            )));
        }
        if self.num_samples_per_ray == 0 {
            return Err(Error::Config(
                "num_samples_per_ray must be at least 1".to_string(),
            ));
        }
        if self.chunk_size < 0 {
            return Err(Error::Config(format!(
                "chunk_size must be non-negative, got {}",
                self.chunk_size
            )));
        }
        if !self.valid_threshold.is_finite() || self.valid_threshold < 0.0 {
            return Err(Error::Config(format!(
                "valid_threshold must be non-negative, got {}",
                self.valid_threshold
            )));
        }
        Ok(())
    }

    /// Intersector for the configured scene cube
    pub fn intersector(&self) -> Result<RayBoxIntersector> {
        Ok(RayBoxIntersector::new(self.radius)?
            .with_near(self.near)
            .with_valid_threshold(self.valid_threshold))
    }
}

/// Unit-interval stratification shared by every ray of a render call
#[derive(Debug, Clone)]
struct Strata {
    edges: Vec<f32>,
    deltas: Vec<f32>,
}

impl Strata {
    fn new(samples: usize) -> Self {
        let edges: Vec<f32> = (0..=samples).map(|i| i as f32 / samples as f32).collect();
        let deltas = edges.windows(2).map(|w| w[1] - w[0]).collect();
        Self { edges, deltas }
    }

    fn midpoints(&self) -> Vec<f32> {
        self.edges.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect()
    }

    fn jittered<R: Rng>(&self, rng: &mut R) -> Vec<f32> {
        self.edges
            .windows(2)
            .map(|w| w[0] + rng.gen::<f32>() * (w[1] - w[0]))
            .collect()
    }
}

/// Renders RGBA per ray from a triplane and a decoder
#[derive(Debug, Clone)]
pub struct VolumeRenderer<S: FeatureSampler = TriplaneSampler> {
    config: RenderConfig,
    sampler: S,
    chunks: ChunkedEvaluator,
}

impl VolumeRenderer<TriplaneSampler> {
    /// Renderer with the CPU triplane sampler
    pub fn new(config: RenderConfig) -> Result<Self> {
        let sampler = TriplaneSampler::new(config.feature_reduction);
        Self::with_sampler(config, sampler)
    }
}

impl<S: FeatureSampler> VolumeRenderer<S> {
    /// Renderer with a custom sampler whose reduction must match the config
    pub fn with_sampler(config: RenderConfig, sampler: S) -> Result<Self> {
        config.validate()?;
        if sampler.reduction() != config.feature_reduction {
            return Err(Error::Config(format!(
                "sampler reduces with '{}' but the renderer is configured for '{}'",
                sampler.reduction(),
                config.feature_reduction
            )));
        }
        let chunks = ChunkedEvaluator::new(config.chunk_size)?;
        Ok(Self {
            config,
            sampler,
            chunks,
        })
    }

    /// Replace the chunk evaluator, e.g. to attach a release hook
    pub fn with_chunk_evaluator(mut self, chunks: ChunkedEvaluator) -> Self {
        self.chunks = chunks;
        self
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn sampler(&self) -> &S {
        &self.sampler
    }

    pub fn chunk_evaluator(&self) -> &ChunkedEvaluator {
        &self.chunks
    }

    /// Decoder queries against `triplane` with this renderer's settings
    pub fn field_query<'a>(
        &'a self,
        decoder: &'a dyn VolumeDecoder,
        triplane: &'a Triplane,
    ) -> FieldQuery<'a> {
        FieldQuery::new(triplane, decoder, &self.sampler, &self.config, &self.chunks)
    }

    /// Render `[N, 4]` RGBA for one scene
    #[tracing::instrument(skip_all, fields(rays = rays.len()))]
    pub fn render(
        &self,
        decoder: &dyn VolumeDecoder,
        triplane: &Triplane,
        rays: &RayBatch,
    ) -> Result<Array2<f32>> {
        rays.validate()?;
        let mut output = Array2::<f32>::zeros((rays.len(), 4));

        let hits = self.config.intersector()?.intersect(rays);
        let valid = hits.valid_indices();
        debug!(valid = valid.len(), total = rays.len(), "intersected rays");

        if !valid.is_empty() {
            let samples = self.config.num_samples_per_ray;
            let strata = Strata::new(samples);

            let mut positions = Vec::with_capacity(valid.len() * samples);
            let mut rng = rand::thread_rng();
            for &ray in &valid {
                let steps = if self.config.randomized {
                    strata.jittered(&mut rng)
                } else {
                    strata.midpoints()
                };
                let (t_near, t_far) = (hits.t_near[ray], hits.t_far[ray]);
                for m in steps {
                    let t = t_near * (1.0 - m) + t_far * m;
                    let p = rays.point_at(ray, t);
                    positions.push(normalize_to_unit_cube(&p, self.config.radius));
                }
            }

            let field = self.field_query(decoder, triplane).query(&positions)?;

            let composited = parallel::parallel_map_range(valid.len(), |r| {
                let range = r * samples..(r + 1) * samples;
                integrate(
                    field.density.slice(s![range.clone()]),
                    field.color.slice(s![range, ..]),
                    &strata.deltas,
                )
            });

            for (&ray, rgba) in valid.iter().zip(composited) {
                output.row_mut(ray).assign(&ArrayView1::from(&rgba[..]));
            }
        }

        if self.config.white_background {
            for mut row in output.rows_mut() {
                let background = 1.0 - row[3];
                for c in 0..3 {
                    row[c] += background;
                }
            }
        }

        info!(rays = rays.len(), hits = valid.len(), "rendered rays");
        Ok(output)
    }

    /// Render `[B, N, 4]` for a batch of scenes, one ray batch per scene
    pub fn render_batch(
        &self,
        decoder: &dyn VolumeDecoder,
        triplanes: &TriplaneBatch,
        rays: &[RayBatch],
    ) -> Result<Array3<f32>> {
        if rays.len() != triplanes.len() {
            return Err(Error::shape_mismatch(
                "VolumeRenderer::render_batch",
                format!("{} ray batches", triplanes.len()),
                rays.len(),
            ));
        }
        let ray_count = rays.first().map(|r| r.len()).unwrap_or(0);
        if let Some(other) = rays.iter().find(|r| r.len() != ray_count) {
            return Err(Error::shape_mismatch(
                "VolumeRenderer::render_batch",
                format!("{} rays per scene", ray_count),
                other.len(),
            ));
        }

        let mut images = Vec::with_capacity(rays.len());
        for (scene, scene_rays) in triplanes.scenes().zip(rays) {
            images.push(self.render(decoder, &scene?, scene_rays)?);
        }

        if images.is_empty() {
            return Ok(Array3::zeros((0, ray_count, 4)));
        }
        let views: Vec<_> = images.iter().map(|i| i.view()).collect();
        Ok(ndarray::stack(Axis(0), &views)?)
    }

    /// Render a `[H, W, 4]` image from `H * W` rays in row-major pixel order
    pub fn render_image(
        &self,
        decoder: &dyn VolumeDecoder,
        triplane: &Triplane,
        rays: &RayBatch,
        height: usize,
        width: usize,
    ) -> Result<Array3<f32>> {
        if rays.len() != height * width {
            return Err(Error::shape_mismatch(
                "VolumeRenderer::render_image",
                format!("{} x {} = {} rays", height, width, height * width),
                rays.len(),
            ));
        }
        let rgba = self.render(decoder, triplane, rays)?;
        Ok(rgba.into_shape_with_order((height, width, 4))?)
    }
}

/// Composite one ray's samples front to back into `[r, g, b, opacity]`
pub fn integrate(
    densities: ArrayView1<'_, f32>,
    colors: ArrayView2<'_, f32>,
    deltas: &[f32],
) -> [f32; 4] {
    let mut rgba = [0.0f32; 4];
    let mut transmittance = 1.0f32;

    for ((&sigma, color), &delta) in densities.iter().zip(colors.rows()).zip(deltas) {
        let alpha = 1.0 - (-delta * sigma).exp();
        let weight = alpha * transmittance;
        for c in 0..3 {
            rgba[c] += weight * color[c];
        }
        rgba[3] += weight;
        transmittance *= 1.0 - alpha + TRANSMITTANCE_EPS;
    }

    rgba
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{array, Array1};
    use triplanar_core::DecoderOutput;

    /// Triplane whose three planes sum to `2 * |p|^2` at any interior point
    fn radial_triplane(size: usize) -> Triplane {
        Triplane::from_fn(1, size, size, |_, _, row, col| {
            let u = (2 * col + 1) as f32 / size as f32 - 1.0;
            let v = (2 * row + 1) as f32 / size as f32 - 1.0;
            u * u + v * v
        })
        .unwrap()
    }

    /// Red ball of normalized radius 0.5
    fn ball_decoder(features: ArrayView2<'_, f32>) -> Result<DecoderOutput> {
        let n = features.nrows();
        let density = Array1::from_shape_fn(n, |r| {
            let r2 = features.row(r).sum() * 0.5;
            if r2 < 0.25 {
                10.0
            } else {
                -20.0
            }
        });
        let color = Array2::from_shape_fn((n, 3), |(_, c)| if c == 0 { 10.0 } else { -10.0 });
        DecoderOutput::new(density, color)
    }

    /// Smooth decoder for equivalence checks
    fn smooth_decoder(features: ArrayView2<'_, f32>) -> Result<DecoderOutput> {
        let n = features.nrows();
        let density = Array1::from_shape_fn(n, |r| features.row(r).sum());
        let color = Array2::from_shape_fn((n, 3), |(r, c)| features[[r, c % features.ncols()]] - 0.5);
        DecoderOutput::new(density, color)
    }

    fn rays_along_z(offsets: &[[f32; 2]]) -> RayBatch {
        let origins: Vec<[f32; 3]> = offsets.iter().map(|o| [o[0], o[1], -2.0]).collect();
        let directions = vec![[0.0, 0.0, 1.0]; offsets.len()];
        RayBatch::from_flat(&origins, &directions).unwrap()
    }

    #[test]
    fn test_zero_density_is_transparent() {
        let densities = Array1::zeros(16);
        let colors = Array2::from_elem((16, 3), 0.7);
        let deltas = vec![1.0 / 16.0; 16];
        let rgba = integrate(densities.view(), colors.view(), &deltas);
        assert_eq!(rgba, [0.0; 4]);
    }

    #[test]
    fn test_infinite_first_density_is_opaque() {
        let mut densities = Array1::from_elem(8, 3.0);
        densities[0] = f32::INFINITY;
        let mut colors = Array2::from_elem((8, 3), 0.1);
        colors.row_mut(0).assign(&array![0.2, 0.4, 0.6]);
        let deltas = vec![0.125; 8];

        let rgba = integrate(densities.view(), colors.view(), &deltas);
        assert_relative_eq!(rgba[3], 1.0, epsilon = 1e-6);
        assert_relative_eq!(rgba[0], 0.2, epsilon = 1e-6);
        assert_relative_eq!(rgba[1], 0.4, epsilon = 1e-6);
        assert_relative_eq!(rgba[2], 0.6, epsilon = 1e-6);
    }

    #[test]
    fn test_opacity_matches_closed_form() {
        let densities = Array1::from_elem(4, 2.0);
        let colors = Array2::ones((4, 3));
        let deltas = vec![0.25; 4];
        let rgba = integrate(densities.view(), colors.view(), &deltas);

        // constant density: opacity = 1 - exp(-sum(delta * sigma))
        assert_relative_eq!(rgba[3], 1.0 - (-2.0f32).exp(), epsilon = 1e-5);
        assert_relative_eq!(rgba[0], rgba[3], epsilon = 1e-6);
    }

    #[test]
    fn test_config_validation() {
        assert!(RenderConfig::default().validate().is_ok());
        assert!(RenderConfig::default().with_radius(-1.0).validate().is_err());
        assert!(RenderConfig::default().with_samples_per_ray(0).validate().is_err());
        assert!(matches!(
            VolumeRenderer::new(RenderConfig::default().with_chunk_size(-4)),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_sampler_reduction_must_match() {
        let config = RenderConfig::default().with_feature_reduction(FeatureReduction::Mean);
        let result = VolumeRenderer::with_sampler(config, TriplaneSampler::new(FeatureReduction::Concat));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_renders_ball() {
        let triplane = radial_triplane(32);
        let renderer = VolumeRenderer::new(RenderConfig::default()).unwrap();
        let rays = rays_along_z(&[[0.0, 0.0], [0.0, 0.8], [0.0, 2.0]]);

        let rgba = renderer.render(&ball_decoder, &triplane, &rays).unwrap();
        assert_eq!(rgba.shape(), &[3, 4]);

        // through the center
        assert_relative_eq!(rgba[[0, 3]], 1.0, epsilon = 1e-3);
        assert_relative_eq!(rgba[[0, 0]], 1.0, epsilon = 1e-3);
        assert!(rgba[[0, 1]] < 1e-3 && rgba[[0, 2]] < 1e-3);

        // inside the cube but outside the ball
        assert!(rgba[[1, 3]] < 1e-3);

        // misses the cube entirely
        assert_eq!(rgba.row(2).to_vec(), vec![0.0; 4]);
    }

    #[test]
    fn test_white_background() {
        let triplane = radial_triplane(32);
        let config = RenderConfig::default().with_white_background(true);
        let renderer = VolumeRenderer::new(config).unwrap();
        let rays = rays_along_z(&[[0.0, 0.0], [0.0, 2.0]]);

        let rgba = renderer.render(&ball_decoder, &triplane, &rays).unwrap();
        assert_relative_eq!(rgba[[0, 0]], 1.0, epsilon = 1e-3);
        assert!(rgba[[0, 1]] < 1e-2);
        for c in 0..3 {
            assert_eq!(rgba[[1, c]], 1.0);
        }
        assert_eq!(rgba[[1, 3]], 0.0);
    }

    #[test]
    fn test_chunking_does_not_change_output() {
        let triplane = radial_triplane(16);
        let rays = rays_along_z(&[[0.1, -0.2], [0.3, 0.3], [-0.5, 0.05], [0.9, 0.9]]);
        let samples = 24;
        let total = (rays.len() * samples) as i64;

        let render = |chunk: i64| {
            let config = RenderConfig::default()
                .with_samples_per_ray(samples)
                .with_chunk_size(chunk);
            VolumeRenderer::new(config)
                .unwrap()
                .render(&smooth_decoder, &triplane, &rays)
                .unwrap()
        };

        let reference = render(0);
        for chunk in [1, total / 2 + 1, total] {
            let chunked = render(chunk);
            for (a, b) in chunked.iter().zip(reference.iter()) {
                assert_relative_eq!(*a, *b, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_randomized_stays_bounded() {
        let triplane = radial_triplane(16);
        let config = RenderConfig::default()
            .with_samples_per_ray(32)
            .with_randomized(true);
        let renderer = VolumeRenderer::new(config).unwrap();
        let rays = rays_along_z(&[[0.0, 0.0], [0.2, -0.4]]);

        let rgba = renderer.render(&smooth_decoder, &triplane, &rays).unwrap();
        assert!(rgba.iter().all(|v| v.is_finite()));
        assert!(rgba.column(3).iter().all(|&a| (0.0..=1.0 + 1e-5).contains(&a)));
    }

    #[test]
    fn test_render_batch_and_image() {
        let a = radial_triplane(16);
        let b = Triplane::from_fn(1, 16, 16, |_, _, _, _| 0.0).unwrap();
        let batch = TriplaneBatch::stack(&[a.clone(), b]).unwrap();
        let renderer = VolumeRenderer::new(RenderConfig::default().with_samples_per_ray(16)).unwrap();
        let rays = rays_along_z(&[[0.0, 0.0], [0.1, 0.1], [0.2, 0.0], [0.0, 0.3], [2.0, 2.0], [0.4, 0.4]]);

        let out = renderer
            .render_batch(&smooth_decoder, &batch, &[rays.clone(), rays.clone()])
            .unwrap();
        assert_eq!(out.shape(), &[2, 6, 4]);
        let single = renderer.render(&smooth_decoder, &a, &rays).unwrap();
        assert_eq!(out.index_axis(Axis(0), 0), single);

        assert!(renderer
            .render_batch(&smooth_decoder, &batch, &[rays.clone()])
            .is_err());

        let image = renderer.render_image(&smooth_decoder, &a, &rays, 2, 3).unwrap();
        assert_eq!(image.shape(), &[2, 3, 4]);
        assert_eq!(image[[1, 0, 3]], single[[3, 3]]);
        assert!(matches!(
            renderer.render_image(&smooth_decoder, &a, &rays, 4, 4),
            Err(Error::ShapeMismatch { .. })
        ));
    }
}
