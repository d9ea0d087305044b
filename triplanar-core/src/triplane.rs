//! Triplane scene codes
//!
//! A triplane is a `[3, C, H, W]` feature volume made of three orthogonal
//! planes: plane 0 spans XY, plane 1 spans XZ and plane 2 spans YZ. It is
//! produced by an upstream backbone and consumed read-only here.

use crate::{Error, Result};
use ndarray::{Array4, Array5, ArrayView3, ArrayView4, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of feature planes in a triplane
pub const NUM_PLANES: usize = 3;

/// Coordinate pair used by each plane, as indices into `(x, y, z)`.
///
/// The first coordinate of a pair indexes the plane width, the second its height.
pub const PLANE_AXES: [[usize; 2]; NUM_PLANES] = [[0, 1], [0, 2], [1, 2]];

/// How the three per-plane feature vectors of a point are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureReduction {
    /// Concatenate the plane features into a `3 * C` vector
    #[default]
    Concat,
    /// Average the plane features into a `C` vector
    Mean,
}

impl FeatureReduction {
    /// Length of the reduced feature vector for `channels` input channels
    pub fn output_dim(&self, channels: usize) -> usize {
        match self {
            FeatureReduction::Concat => NUM_PLANES * channels,
            FeatureReduction::Mean => channels,
        }
    }
}

impl FromStr for FeatureReduction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "concat" => Ok(FeatureReduction::Concat),
            "mean" => Ok(FeatureReduction::Mean),
            other => Err(Error::Config(format!(
                "unsupported feature reduction '{}', expected 'concat' or 'mean'",
                other
            ))),
        }
    }
}

impl fmt::Display for FeatureReduction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureReduction::Concat => write!(f, "concat"),
            FeatureReduction::Mean => write!(f, "mean"),
        }
    }
}

/// A single scene's triplane tensor of shape `[3, C, H, W]`
#[derive(Debug, Clone)]
pub struct Triplane {
    data: Array4<f32>,
}

impl Triplane {
    /// Wrap a `[3, C, H, W]` tensor. The data is stored in standard layout.
    pub fn new(data: Array4<f32>) -> Result<Self> {
        let shape = data.shape();
        if shape[0] != NUM_PLANES || shape[1] == 0 || shape[2] == 0 || shape[3] == 0 {
            return Err(Error::shape_mismatch(
                "Triplane::new",
                "[3, C, H, W] with C, H, W > 0",
                format!("{:?}", shape),
            ));
        }

        let data = if data.is_standard_layout() {
            data
        } else {
            data.as_standard_layout().into_owned()
        };

        Ok(Self { data })
    }

    /// Build a triplane by evaluating `f(plane, channel, row, col)` at every texel
    pub fn from_fn<F>(channels: usize, height: usize, width: usize, f: F) -> Result<Self>
    where
        F: Fn(usize, usize, usize, usize) -> f32,
    {
        let data = Array4::from_shape_fn((NUM_PLANES, channels, height, width), |(p, c, y, x)| {
            f(p, c, y, x)
        });
        Self::new(data)
    }

    /// Number of feature channels `C`
    pub fn channels(&self) -> usize {
        self.data.shape()[1]
    }

    /// Plane height `H`
    pub fn height(&self) -> usize {
        self.data.shape()[2]
    }

    /// Plane width `W`
    pub fn width(&self) -> usize {
        self.data.shape()[3]
    }

    /// Full tensor view
    pub fn tensor(&self) -> ArrayView4<'_, f32> {
        self.data.view()
    }

    /// `[C, H, W]` view of a single plane
    pub fn plane(&self, plane: usize) -> ArrayView3<'_, f32> {
        self.data.index_axis(Axis(0), plane)
    }

    /// Texel value; indices must be in range
    #[inline]
    pub fn texel(&self, plane: usize, channel: usize, row: usize, col: usize) -> f32 {
        self.data[[plane, channel, row, col]]
    }

    /// Borrow the backing memory as a device-uploadable view.
    ///
    /// The view does not own the data; it is valid for as long as the borrow
    /// of `self` lives, so the triplane cannot be dropped or mutated while a
    /// view is outstanding.
    pub fn device_view(&self) -> Result<DeviceView<'_>> {
        let values = self.data.as_slice().ok_or_else(|| {
            Error::InvalidData("triplane storage is not contiguous".to_string())
        })?;
        Ok(DeviceView {
            values,
            shape: [self.data.shape()[0], self.channels(), self.height(), self.width()],
        })
    }
}

/// Non-owning view of a contiguous `f32` tensor, ready to be copied into a device buffer
#[derive(Debug, Clone, Copy)]
pub struct DeviceView<'a> {
    values: &'a [f32],
    shape: [usize; 4],
}

impl<'a> DeviceView<'a> {
    /// Elements in row-major order
    pub fn values(&self) -> &'a [f32] {
        self.values
    }

    /// Raw bytes of the elements
    pub fn as_bytes(&self) -> &'a [u8] {
        bytemuck::cast_slice(self.values)
    }

    /// Tensor shape
    pub fn shape(&self) -> [usize; 4] {
        self.shape
    }
}

/// A batch of scenes, shape `[B, 3, C, H, W]`
#[derive(Debug, Clone)]
pub struct TriplaneBatch {
    data: Array5<f32>,
}

impl TriplaneBatch {
    /// Wrap a `[B, 3, C, H, W]` tensor
    pub fn new(data: Array5<f32>) -> Result<Self> {
        let shape = data.shape();
        if shape[1] != NUM_PLANES || shape[2] == 0 || shape[3] == 0 || shape[4] == 0 {
            return Err(Error::shape_mismatch(
                "TriplaneBatch::new",
                "[B, 3, C, H, W] with C, H, W > 0",
                format!("{:?}", shape),
            ));
        }
        Ok(Self { data })
    }

    /// Stack single-scene triplanes of identical shape
    pub fn stack(scenes: &[Triplane]) -> Result<Self> {
        let views: Vec<ArrayView4<'_, f32>> = scenes.iter().map(|t| t.tensor()).collect();
        let data = ndarray::stack(Axis(0), &views).map_err(|e| {
            Error::shape_mismatch("TriplaneBatch::stack", "scenes of identical shape", e)
        })?;
        Self::new(data)
    }

    /// Number of scenes `B`
    pub fn len(&self) -> usize {
        self.data.shape()[0]
    }

    /// Whether the batch holds no scenes
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy out the triplane of scene `index`
    pub fn scene(&self, index: usize) -> Result<Triplane> {
        if index >= self.len() {
            return Err(Error::shape_mismatch(
                "TriplaneBatch::scene",
                format!("index < {}", self.len()),
                index,
            ));
        }
        Triplane::new(self.data.index_axis(Axis(0), index).to_owned())
    }

    /// Iterate over the scenes in order
    pub fn scenes(&self) -> impl Iterator<Item = Result<Triplane>> + '_ {
        (0..self.len()).map(move |i| self.scene(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triplane_shape_validation() {
        assert!(Triplane::new(Array4::zeros((3, 4, 8, 8))).is_ok());
        assert!(Triplane::new(Array4::zeros((2, 4, 8, 8))).is_err());
        assert!(Triplane::new(Array4::zeros((3, 0, 8, 8))).is_err());
    }

    #[test]
    fn test_triplane_accessors() {
        let triplane = Triplane::from_fn(2, 3, 4, |p, c, y, x| {
            (p * 1000 + c * 100 + y * 10 + x) as f32
        })
        .unwrap();

        assert_eq!(triplane.channels(), 2);
        assert_eq!(triplane.height(), 3);
        assert_eq!(triplane.width(), 4);
        assert_eq!(triplane.texel(2, 1, 2, 3), 2123.0);
        assert_eq!(triplane.plane(1).shape(), &[2, 3, 4]);
    }

    #[test]
    fn test_device_view_borrows_contiguous_memory() {
        let triplane = Triplane::from_fn(1, 2, 2, |p, _, y, x| (p * 4 + y * 2 + x) as f32).unwrap();
        let view = triplane.device_view().unwrap();

        assert_eq!(view.shape(), [3, 1, 2, 2]);
        assert_eq!(view.values().len(), 12);
        assert_eq!(view.values()[5], 5.0);
        assert_eq!(view.as_bytes().len(), 48);
    }

    #[test]
    fn test_non_standard_layout_is_normalized() {
        let base = Array4::from_shape_fn((5, 4, 2, 3), |(a, b, c, d)| (a + b + c + d) as f32);
        let fortran = base.reversed_axes();
        assert!(!fortran.is_standard_layout());

        let triplane = Triplane::new(fortran.clone()).unwrap();
        assert!(triplane.device_view().is_ok());
        assert_eq!(triplane.texel(2, 1, 3, 4), fortran[[2, 1, 3, 4]]);
    }

    #[test]
    fn test_feature_reduction_parsing() {
        assert_eq!("concat".parse::<FeatureReduction>().unwrap(), FeatureReduction::Concat);
        assert_eq!("mean".parse::<FeatureReduction>().unwrap(), FeatureReduction::Mean);
        assert!(matches!(
            "sum".parse::<FeatureReduction>(),
            Err(Error::Config(_))
        ));
        assert_eq!(FeatureReduction::Concat.output_dim(40), 120);
        assert_eq!(FeatureReduction::Mean.output_dim(40), 40);
    }

    #[test]
    fn test_batch_scenes() {
        let a = Triplane::from_fn(2, 4, 4, |_, _, _, _| 1.0).unwrap();
        let b = Triplane::from_fn(2, 4, 4, |_, _, _, _| 2.0).unwrap();
        let batch = TriplaneBatch::stack(&[a, b]).unwrap();

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.scene(1).unwrap().texel(0, 0, 0, 0), 2.0);
        assert!(batch.scene(2).is_err());

        let c = Triplane::from_fn(3, 4, 4, |_, _, _, _| 0.0).unwrap();
        let d = Triplane::from_fn(2, 4, 4, |_, _, _, _| 0.0).unwrap();
        assert!(TriplaneBatch::stack(&[c, d]).is_err());
    }
}
