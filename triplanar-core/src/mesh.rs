//! Mesh data structures and functionality

use crate::{point::*, Error, Result};
use serde::{Deserialize, Serialize};

/// A triangle mesh with optional per-vertex colors
///
/// Face winding is whatever the triangulation table produced; it is not
/// normalized afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriangleMesh {
    pub vertices: Vec<Point3f>,
    pub faces: Vec<[usize; 3]>,
    pub vertex_colors: Option<Vec<Rgb>>,
}

impl TriangleMesh {
    /// Create a new empty mesh
    pub fn new() -> Self {
        Self {
            vertices: Vec::new(),
            faces: Vec::new(),
            vertex_colors: None,
        }
    }

    /// Create a mesh from vertices and faces
    pub fn from_vertices_and_faces(vertices: Vec<Point3f>, faces: Vec<[usize; 3]>) -> Self {
        Self {
            vertices,
            faces,
            vertex_colors: None,
        }
    }

    /// Get the number of vertices
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Get the number of faces
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Check if the mesh is empty
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.faces.is_empty()
    }

    /// Append another mesh, offsetting its face indices by the current vertex count
    pub fn append(&mut self, other: TriangleMesh) {
        let offset = self.vertices.len();
        self.faces.extend(
            other
                .faces
                .into_iter()
                .map(|f| [f[0] + offset, f[1] + offset, f[2] + offset]),
        );
        self.vertices.extend(other.vertices);
        self.vertex_colors = None;
    }

    /// Attach per-vertex colors; the count must match the vertex count
    pub fn set_vertex_colors(&mut self, colors: Vec<Rgb>) -> Result<()> {
        if colors.len() != self.vertices.len() {
            return Err(Error::shape_mismatch(
                "TriangleMesh::set_vertex_colors",
                format!("{} colors", self.vertices.len()),
                colors.len(),
            ));
        }
        self.vertex_colors = Some(colors);
        Ok(())
    }

    /// Check that every face index is in range and colors align with vertices
    pub fn validate(&self) -> Result<()> {
        let count = self.vertices.len();
        if let Some(face) = self.faces.iter().find(|f| f.iter().any(|&i| i >= count)) {
            return Err(Error::InvalidData(format!(
                "face {:?} references a vertex beyond {}",
                face, count
            )));
        }
        if let Some(colors) = &self.vertex_colors {
            if colors.len() != count {
                return Err(Error::shape_mismatch(
                    "TriangleMesh::validate",
                    format!("{} colors", count),
                    colors.len(),
                ));
            }
        }
        Ok(())
    }

    /// Centroid of the vertex positions, `None` for an empty mesh
    pub fn centroid(&self) -> Option<Point3f> {
        if self.vertices.is_empty() {
            return None;
        }
        let sum = self
            .vertices
            .iter()
            .fold(Vector3f::zeros(), |acc, v| acc + v.coords);
        Some(Point3f::from(sum / self.vertices.len() as f32))
    }

    /// Per-vertex colors quantized to 8 bits, for exporters that want bytes
    pub fn vertex_colors_u8(&self) -> Option<Vec<[u8; 3]>> {
        self.vertex_colors.as_ref().map(|colors| {
            colors
                .iter()
                .map(|c| {
                    [
                        (c[0].clamp(0.0, 1.0) * 255.0).round() as u8,
                        (c[1].clamp(0.0, 1.0) * 255.0).round() as u8,
                        (c[2].clamp(0.0, 1.0) * 255.0).round() as u8,
                    ]
                })
                .collect()
        })
    }
}

impl Default for TriangleMesh {
    fn default() -> Self {
        Self::new()
    }
}
