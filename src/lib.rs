//! # triplanar
//!
//! Triplane-based volume rendering and isosurface extraction for
//! single-image 3D reconstruction.
//!
//! This is the umbrella crate that provides convenient access to all triplanar
//! functionality. You can use this crate to get everything in one place, or use
//! individual crates for more granular control over dependencies.
//!
//! ## Features
//!
//! - **Core**: Triplane tensors, ray batches, density fields, meshes and the decoder contract
//! - **Render**: Triplane sampling, ray/box intersection, volume rendering, chunked evaluation
//!   and CPU marching cubes
//! - **GPU**: wgpu compute kernels for chunked marching cubes and triplane sampling
//!
//! ## Quick Start
//!
//! ```rust
//! use triplanar::prelude::*;
//! use ndarray::Array4;
//!
//! let triplane = Triplane::new(Array4::<f32>::zeros((3, 8, 16, 16))).unwrap();
//! assert_eq!(triplane.channels(), 8);
//! ```
//!
//! ## Feature Flags
//!
//! - `default`: Enables core and render
//! - `render`: CPU rendering and extraction
//! - `gpu`: GPU-accelerated marching cubes and sampling
//! - `all`: Enables all features

// Re-export core functionality
pub use triplanar_core::*;

#[cfg(feature = "render")]
pub use triplanar_render as render;

#[cfg(feature = "gpu")]
pub use triplanar_gpu as gpu;

/// Convenient imports for common use cases
pub mod prelude {
    pub use triplanar_core::*;

    #[cfg(feature = "render")]
    pub use triplanar_render::*;

    #[cfg(feature = "gpu")]
    pub use triplanar_gpu::{GpuContext, GpuMarchingCubes, GpuTriplaneSampler};
}
