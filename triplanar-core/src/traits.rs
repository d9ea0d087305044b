//! Core traits for triplanar

use crate::{field::DensityField, mesh::TriangleMesh, point::*, triplane::*, Result};
use ndarray::Array2;

/// Samples reduced triplane features at points in `[-1, 1]^3`
pub trait FeatureSampler: Send + Sync {
    /// How per-plane features are combined
    fn reduction(&self) -> FeatureReduction;

    /// Sample `[M, D]` features for `M` normalized positions
    fn sample(&self, triplane: &Triplane, positions: &[Point3f]) -> Result<Array2<f32>>;

    /// Length `D` of each feature row for `triplane`
    fn output_dim(&self, triplane: &Triplane) -> usize {
        self.reduction().output_dim(triplane.channels())
    }
}

/// Extracts a triangle mesh from the `threshold` level set of a density field
///
/// Extraction never fails outright: a field that never crosses the threshold
/// yields an empty mesh, and backends that lose part of the grid return the
/// remainder.
pub trait IsosurfaceExtractor {
    /// Mesh with world-space vertices for the `threshold` isosurface
    fn extract(&self, field: &DensityField, threshold: f32) -> TriangleMesh;
}
