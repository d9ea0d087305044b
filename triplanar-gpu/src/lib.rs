//! # triplanar GPU
//!
//! wgpu compute kernels for the triplanar pipeline: chunked marching cubes
//! and triplane feature sampling. Both plug into the CPU pipeline through
//! the `IsosurfaceExtractor` and `FeatureSampler` traits.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use triplanar_core::{DensityField, IsosurfaceExtractor};
//! use triplanar_gpu::{GpuContext, GpuMarchingCubes};
//!
//! async fn example() -> triplanar_core::Result<()> {
//!     let gpu = GpuContext::new().await?;
//!     let field = DensityField::from_fn(64, 0.87, |p| 0.5 - p.coords.norm())?;
//!
//!     let mesh = GpuMarchingCubes::new(&gpu).extract_async(&field, 0.0).await;
//!     println!("{} triangles", mesh.face_count());
//!     Ok(())
//! }
//! ```

pub mod device;
pub mod marching_cubes;
pub mod triplane;

// Re-export commonly used items
pub use device::{try_create_gpu_context, GpuContext};
pub use marching_cubes::{GpuMarchingCubes, GPU_DEFAULT_CHUNK_CUBES};
pub use triplane::GpuTriplaneSampler;
