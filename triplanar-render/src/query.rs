//! Chunked decoder queries at normalized positions
//!
//! Shared by the volume renderer (sample points along rays) and the mesh
//! extractor (grid points and mesh vertices).

use crate::chunked::ChunkedEvaluator;
use crate::renderer::RenderConfig;
use ndarray::{Array1, Array2};
use triplanar_core::{
    DecoderOutput, Error, FeatureSampler, Point3f, Result, Triplane, VolumeDecoder,
};

/// Evaluates a decoder over one scene's triplane
pub struct FieldQuery<'a> {
    triplane: &'a Triplane,
    decoder: &'a dyn VolumeDecoder,
    sampler: &'a dyn FeatureSampler,
    config: &'a RenderConfig,
    chunks: &'a ChunkedEvaluator,
}

impl<'a> FieldQuery<'a> {
    pub fn new(
        triplane: &'a Triplane,
        decoder: &'a dyn VolumeDecoder,
        sampler: &'a dyn FeatureSampler,
        config: &'a RenderConfig,
        chunks: &'a ChunkedEvaluator,
    ) -> Self {
        Self {
            triplane,
            decoder,
            sampler,
            config,
            chunks,
        }
    }

    /// Raw decoder output for positions in `[-1, 1]^3`, no chunking
    pub fn decode_raw(&self, positions: &[Point3f]) -> Result<DecoderOutput> {
        let features = self.sampler.sample(self.triplane, positions)?;
        let output = self.decoder.decode(features.view())?;

        let rows = positions.len();
        if output.density.len() != rows || output.color.shape() != [rows, 3] {
            return Err(Error::shape_mismatch(
                "VolumeDecoder::decode",
                format!("density [{}] and color [{}, 3]", rows, rows),
                format!(
                    "density [{}] and color {:?}",
                    output.density.len(),
                    output.color.shape()
                ),
            ));
        }
        Ok(output)
    }

    /// Activated density and color, evaluated chunk by chunk
    pub fn query(&self, positions: &[Point3f]) -> Result<DecoderOutput> {
        self.chunks.evaluate(positions, |chunk| {
            let raw = self.decode_raw(chunk)?;
            Ok(DecoderOutput {
                density: self.activate_density(raw.density),
                color: self.activate_color(raw.color),
            })
        })
    }

    /// Activated density only
    pub fn density(&self, positions: &[Point3f]) -> Result<Array1<f32>> {
        self.chunks.evaluate(positions, |chunk| {
            Ok(self.activate_density(self.decode_raw(chunk)?.density))
        })
    }

    /// Activated color only, `[M, 3]`
    pub fn color(&self, positions: &[Point3f]) -> Result<Array2<f32>> {
        self.chunks.evaluate(positions, |chunk| {
            Ok(self.activate_color(self.decode_raw(chunk)?.color))
        })
    }

    fn activate_density(&self, raw: Array1<f32>) -> Array1<f32> {
        let bias = self.config.density_bias;
        let activation = self.config.density_activation;
        raw.mapv_into(|v| activation.apply(v + bias))
    }

    fn activate_color(&self, raw: Array2<f32>) -> Array2<f32> {
        let activation = self.config.color_activation;
        raw.mapv_into(|v| activation.apply(v))
    }
}
