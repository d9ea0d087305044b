//! Core data structures and traits for triplanar
//!
//! This crate provides the fundamental types shared by the renderer and the
//! isosurface extractors: triplane tensors, ray batches, dense density
//! fields, triangle meshes, the decoder contract and marching-cubes tables.

pub mod point;
pub mod triplane;
pub mod ray;
pub mod field;
pub mod mesh;
pub mod decoder;
pub mod tables;
pub mod traits;
pub mod error;

pub use point::*;
pub use triplane::*;
pub use ray::*;
pub use field::*;
pub use mesh::*;
pub use decoder::*;
pub use traits::*;
pub use error::*;

/// Re-export commonly used types from nalgebra
pub use nalgebra::{Matrix3, Matrix4, Point3, Vector3};
