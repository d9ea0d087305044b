//! Mesh extraction from a decoded triplane
//!
//! Queries activated density on a dense grid over `[-1, 1]^3`, runs an
//! isosurface extractor on it, and optionally colors each vertex by querying
//! the decoder again at the vertex position.

use crate::renderer::VolumeRenderer;
use serde::{Deserialize, Serialize};
use tracing::info;
use triplanar_core::{
    normalize_to_unit_cube, DensityField, Error, FeatureSampler, IsosurfaceExtractor, Point3f,
    Result, Rgb, Triplane, TriangleMesh, VolumeDecoder,
};

/// Configuration for mesh extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshExtractionConfig {
    /// Grid samples per axis
    pub resolution: usize,
    /// Density level of the surface
    pub threshold: f32,
    /// Query the decoder for per-vertex colors
    pub vertex_colors: bool,
}

impl Default for MeshExtractionConfig {
    fn default() -> Self {
        Self {
            resolution: 256,
            threshold: 25.0,
            vertex_colors: true,
        }
    }
}

impl MeshExtractionConfig {
    pub fn with_resolution(mut self, resolution: usize) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_vertex_colors(mut self, vertex_colors: bool) -> Self {
        self.vertex_colors = vertex_colors;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.resolution < 2 {
            return Err(Error::Config(format!(
                "mesh resolution must be at least 2, got {}",
                self.resolution
            )));
        }
        if !self.threshold.is_finite() {
            return Err(Error::Config(format!(
                "threshold must be finite, got {}",
                self.threshold
            )));
        }
        Ok(())
    }
}

/// Extracts colored meshes using a renderer's field settings
///
/// The renderer supplies the scene radius, activations, sampler and chunk
/// evaluator, so the mesh matches what the renderer would draw.
#[derive(Debug)]
pub struct MeshExtractor<'r, S: FeatureSampler> {
    renderer: &'r VolumeRenderer<S>,
    config: MeshExtractionConfig,
}

impl<'r, S: FeatureSampler> MeshExtractor<'r, S> {
    pub fn new(renderer: &'r VolumeRenderer<S>, config: MeshExtractionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { renderer, config })
    }

    pub fn config(&self) -> &MeshExtractionConfig {
        &self.config
    }

    /// Sample activated density at every grid point
    pub fn density_field(
        &self,
        decoder: &dyn VolumeDecoder,
        triplane: &Triplane,
    ) -> Result<DensityField> {
        let resolution = self.config.resolution;
        let points = DensityField::grid_points(resolution);
        let density = self.renderer.field_query(decoder, triplane).density(&points)?;
        DensityField::from_flat(resolution, density.to_vec(), self.renderer.config().radius)
    }

    /// Activated colors at world-space positions
    pub fn vertex_colors(
        &self,
        decoder: &dyn VolumeDecoder,
        triplane: &Triplane,
        vertices: &[Point3f],
    ) -> Result<Vec<Rgb>> {
        let radius = self.renderer.config().radius;
        let positions: Vec<Point3f> = vertices
            .iter()
            .map(|v| normalize_to_unit_cube(v, radius))
            .collect();

        let colors = self.renderer.field_query(decoder, triplane).color(&positions)?;
        Ok(colors
            .rows()
            .into_iter()
            .map(|row| [row[0], row[1], row[2]])
            .collect())
    }

    /// Density grid, isosurface and optional vertex colors for one scene
    #[tracing::instrument(skip_all, fields(resolution = self.config.resolution))]
    pub fn extract(
        &self,
        decoder: &dyn VolumeDecoder,
        triplane: &Triplane,
        extractor: &dyn IsosurfaceExtractor,
    ) -> Result<TriangleMesh> {
        let field = self.density_field(decoder, triplane)?;
        let mut mesh = extractor.extract(&field, self.config.threshold);

        if self.config.vertex_colors && !mesh.vertices.is_empty() {
            let colors = self.vertex_colors(decoder, triplane, &mesh.vertices)?;
            mesh.set_vertex_colors(colors)?;
        }

        info!(
            vertices = mesh.vertex_count(),
            faces = mesh.face_count(),
            colored = mesh.vertex_colors.is_some(),
            "extracted mesh"
        );
        Ok(mesh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marching_cubes::CpuMarchingCubes;
    use crate::renderer::RenderConfig;
    use approx::assert_relative_eq;
    use ndarray::{Array1, Array2, ArrayView2};
    use triplanar_core::DecoderOutput;

    /// Keeps zero padding at the cube boundary far from any encoded coordinate
    const OFFSET: f32 = 3.0;

    /// Channel 0 of every plane holds the texel's first coordinate, channel 1 its second
    fn coordinate_triplane(size: usize) -> Triplane {
        Triplane::from_fn(2, size, size, |_, c, row, col| {
            let index = if c == 0 { col } else { row };
            (2 * index + 1) as f32 / size as f32 - 1.0 + OFFSET
        })
        .unwrap()
    }

    /// Density peaks at the origin; color encodes the sampled x coordinate
    fn blob_decoder(features: ArrayView2<'_, f32>) -> Result<DecoderOutput> {
        let n = features.nrows();
        let density = Array1::from_shape_fn(n, |r| {
            // concat layout: [x, y | x, z | y, z]
            let r2 = features.row(r).iter().map(|v| (v - OFFSET).powi(2)).sum::<f32>() * 0.5;
            5.0 - 10.0 * r2
        });
        let color = Array2::from_shape_fn((n, 3), |(r, c)| {
            if c == 0 {
                features[[r, 0]] - OFFSET
            } else {
                0.0
            }
        });
        DecoderOutput::new(density, color)
    }

    fn renderer(chunk_size: i64) -> VolumeRenderer {
        let config = RenderConfig::default()
            .with_radius(1.0)
            .with_density_activation(crate::activation::Activation::Identity)
            .with_color_activation(crate::activation::Activation::Identity)
            .with_density_bias(0.0)
            .with_chunk_size(chunk_size);
        VolumeRenderer::new(config).unwrap()
    }

    #[test]
    fn test_config_validation() {
        assert!(MeshExtractionConfig::default().validate().is_ok());
        assert_eq!(MeshExtractionConfig::default().resolution, 256);
        assert_eq!(MeshExtractionConfig::default().threshold, 25.0);
        assert!(MeshExtractionConfig::default().with_resolution(1).validate().is_err());
    }

    #[test]
    fn test_extracts_colored_blob() {
        let triplane = coordinate_triplane(32);
        let renderer = renderer(4096);
        let config = MeshExtractionConfig::default()
            .with_resolution(24)
            .with_threshold(2.5);
        let extractor = MeshExtractor::new(&renderer, config).unwrap();

        let mesh = extractor
            .extract(&blob_decoder, &triplane, &CpuMarchingCubes::default())
            .unwrap();
        assert!(mesh.face_count() > 0);
        assert!(mesh.validate().is_ok());

        // density 2.5 at r = 0.5
        for v in &mesh.vertices {
            assert!((v.coords.norm() - 0.5).abs() < 0.1);
        }

        let colors = mesh.vertex_colors.as_ref().unwrap();
        for (v, c) in mesh.vertices.iter().zip(colors) {
            assert_relative_eq!(c[0], v.x, epsilon = 0.05);
            assert_eq!(c[1], 0.0);
        }
    }

    #[test]
    fn test_vertex_colors_are_chunk_independent() {
        let triplane = coordinate_triplane(16);
        let vertices: Vec<Point3f> = (0..37)
            .map(|i| {
                let t = i as f32 / 37.0;
                Point3f::new(t - 0.5, 0.3 - t * 0.4, (t * 6.0).sin() * 0.5)
            })
            .collect();
        let config = MeshExtractionConfig::default().with_resolution(8);

        let reference_renderer = renderer(0);
        let reference = MeshExtractor::new(&reference_renderer, config.clone())
            .unwrap()
            .vertex_colors(&blob_decoder, &triplane, &vertices)
            .unwrap();

        for chunk in [1, 18, 37] {
            let chunked_renderer = renderer(chunk);
            let colors = MeshExtractor::new(&chunked_renderer, config.clone())
                .unwrap()
                .vertex_colors(&blob_decoder, &triplane, &vertices)
                .unwrap();
            assert_eq!(colors, reference, "chunk size {}", chunk);
        }
    }

    #[test]
    fn test_empty_surface_has_no_colors() {
        let triplane = coordinate_triplane(8);
        let renderer = renderer(0);
        let config = MeshExtractionConfig::default().with_resolution(8).with_threshold(100.0);
        let mesh = MeshExtractor::new(&renderer, config)
            .unwrap()
            .extract(&blob_decoder, &triplane, &CpuMarchingCubes::default())
            .unwrap();

        assert!(mesh.is_empty());
        assert!(mesh.vertex_colors.is_none());
    }
}
