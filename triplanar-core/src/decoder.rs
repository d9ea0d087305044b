//! The volume decoder contract
//!
//! A decoder turns reduced triplane features into raw (pre-activation)
//! density and color features. Its internals belong to the model; this crate
//! only relies on the mapping being pure and batchable.

use crate::{Error, Result};
use ndarray::{Array1, Array2, ArrayView2, Axis};

/// Raw decoder output for a batch of `M` query points
#[derive(Debug, Clone, PartialEq)]
pub struct DecoderOutput {
    /// Raw density per point, `[M]`
    pub density: Array1<f32>,
    /// Raw color features per point, `[M, 3]`
    pub color: Array2<f32>,
}

impl DecoderOutput {
    /// Pair densities with color features, checking shapes
    pub fn new(density: Array1<f32>, color: Array2<f32>) -> Result<Self> {
        if color.ncols() != 3 || color.nrows() != density.len() {
            return Err(Error::shape_mismatch(
                "DecoderOutput::new",
                format!("color of shape [{}, 3]", density.len()),
                format!("{:?}", color.shape()),
            ));
        }
        Ok(Self { density, color })
    }

    /// Output with no rows
    pub fn empty() -> Self {
        Self {
            density: Array1::zeros(0),
            color: Array2::zeros((0, 3)),
        }
    }

    /// Number of decoded points
    pub fn len(&self) -> usize {
        self.density.len()
    }

    /// Whether no points were decoded
    pub fn is_empty(&self) -> bool {
        self.density.is_empty()
    }

    /// Concatenate outputs along the point axis, in order
    pub fn concat(parts: &[DecoderOutput]) -> Result<Self> {
        if parts.is_empty() {
            return Ok(Self::empty());
        }
        let densities: Vec<_> = parts.iter().map(|p| p.density.view()).collect();
        let colors: Vec<_> = parts.iter().map(|p| p.color.view()).collect();
        let density = ndarray::concatenate(Axis(0), &densities)
            .map_err(|e| Error::InvalidData(format!("cannot concatenate densities: {}", e)))?;
        let color = ndarray::concatenate(Axis(0), &colors)
            .map_err(|e| Error::InvalidData(format!("cannot concatenate colors: {}", e)))?;
        Self::new(density, color)
    }
}

/// Maps reduced triplane features to raw density and color features
///
/// Implementations must be pure: the same features always decode to the
/// same output, and rows are decoded independently of each other.
pub trait VolumeDecoder: Send + Sync {
    /// Decode an `[M, D]` feature batch into `M` densities and colors
    fn decode(&self, features: ArrayView2<'_, f32>) -> Result<DecoderOutput>;
}

impl<F> VolumeDecoder for F
where
    F: Fn(ArrayView2<'_, f32>) -> Result<DecoderOutput> + Send + Sync,
{
    fn decode(&self, features: ArrayView2<'_, f32>) -> Result<DecoderOutput> {
        self(features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_decoder_output_shapes() {
        assert!(DecoderOutput::new(array![1.0, 2.0], Array2::zeros((2, 3))).is_ok());
        assert!(DecoderOutput::new(array![1.0, 2.0], Array2::zeros((3, 3))).is_err());
        assert!(DecoderOutput::new(array![1.0], Array2::zeros((1, 4))).is_err());
    }

    #[test]
    fn test_concat_preserves_order() {
        let a = DecoderOutput::new(array![1.0], array![[0.1, 0.2, 0.3]]).unwrap();
        let b = DecoderOutput::new(array![2.0, 3.0], Array2::ones((2, 3))).unwrap();
        let joined = DecoderOutput::concat(&[a, b]).unwrap();

        assert_eq!(joined.density, array![1.0, 2.0, 3.0]);
        assert_eq!(joined.color[[0, 2]], 0.3);
        assert_eq!(joined.color[[2, 0]], 1.0);
        assert!(DecoderOutput::concat(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_closure_decoder() {
        let decoder = |features: ArrayView2<'_, f32>| {
            let n = features.nrows();
            DecoderOutput::new(features.column(0).to_owned(), Array2::zeros((n, 3)))
        };
        let out = decoder.decode(array![[4.0, 0.0], [5.0, 1.0]].view()).unwrap();
        assert_eq!(out.density, array![4.0, 5.0]);
    }
}
