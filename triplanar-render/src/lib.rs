//! # triplanar render
//!
//! CPU pipeline for triplane scenes: feature sampling, ray/box intersection,
//! volume rendering, chunked decoder evaluation and marching cubes mesh
//! extraction with per-vertex colors.

pub mod activation;
pub mod camera;
pub mod chunked;
pub mod extract;
pub mod intersect;
pub mod marching_cubes;
pub mod parallel;
pub mod query;
pub mod renderer;
pub mod sampler;

// Re-export commonly used items
pub use activation::*;
pub use camera::*;
pub use chunked::*;
pub use extract::*;
pub use intersect::*;
pub use marching_cubes::*;
pub use query::*;
pub use renderer::*;
pub use sampler::*;
pub use parallel::{init_thread_pool, ThreadPoolConfig};
