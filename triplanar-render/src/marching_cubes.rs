//! Marching cubes isosurface extraction on the CPU
//!
//! The cube grid is partitioned into sub-grids and each sub-grid is
//! polygonized independently, with cubes processed in parallel. Every cube
//! emits its own edge vertices, so vertices shared between neighbouring
//! cubes are duplicated and partitioning never changes the output counts.

use crate::parallel;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use triplanar_core::tables::{
    cube_configuration, CORNER_OFFSETS, EDGE_CONNECTIONS, EDGE_TABLE, MAX_VERTICES_PER_CUBE,
    TRIANGLE_TABLE,
};
use triplanar_core::{DensityField, IsosurfaceExtractor, Point3f, SubGrid, TriangleMesh};

/// Default cubes per sub-grid axis
pub const DEFAULT_CHUNK_CUBES: usize = 32;

/// Configuration for marching cubes extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarchingCubesConfig {
    /// Cubes per sub-grid axis; `0` processes the whole grid at once
    pub chunk_cubes: usize,
}

impl Default for MarchingCubesConfig {
    fn default() -> Self {
        Self {
            chunk_cubes: DEFAULT_CHUNK_CUBES,
        }
    }
}

impl MarchingCubesConfig {
    pub fn with_chunk_cubes(mut self, chunk_cubes: usize) -> Self {
        self.chunk_cubes = chunk_cubes;
        self
    }
}

/// Geometry emitted by one cube, in grid-index space with cube-local indices
#[derive(Debug, Clone, Default)]
pub struct CubePolygons {
    pub vertices: Vec<Point3f>,
    pub triangles: Vec<[usize; 3]>,
}

/// Rayon-parallel marching cubes
#[derive(Debug, Clone, Default)]
pub struct CpuMarchingCubes {
    config: MarchingCubesConfig,
}

impl CpuMarchingCubes {
    pub fn new(config: MarchingCubesConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MarchingCubesConfig {
        &self.config
    }

    /// Polygonize one sub-grid. Vertices stay in grid-index space.
    pub fn extract_sub_grid(
        &self,
        field: &DensityField,
        grid: &SubGrid,
        threshold: f32,
    ) -> TriangleMesh {
        let [nx, ny, nz] = grid.cubes;
        let [ox, oy, oz] = grid.origin;

        let cubes = parallel::parallel_map_range(grid.cube_count(), |i| {
            let x = ox + i / (ny * nz);
            let y = oy + (i / nz) % ny;
            let z = oz + i % nz;
            polygonize_cube(field, [x, y, z], threshold)
        });
        debug_assert_eq!(cubes.len(), nx * ny * nz);

        let mut mesh = TriangleMesh::new();
        for cube in cubes {
            if cube.triangles.is_empty() {
                continue;
            }
            mesh.append(TriangleMesh::from_vertices_and_faces(cube.vertices, cube.triangles));
        }
        mesh
    }
}

impl IsosurfaceExtractor for CpuMarchingCubes {
    #[tracing::instrument(skip_all, fields(resolution = field.resolution(), threshold = threshold))]
    fn extract(&self, field: &DensityField, threshold: f32) -> TriangleMesh {
        let grids = field.sub_grids(self.config.chunk_cubes);
        let mut mesh = TriangleMesh::new();

        for (index, grid) in grids.iter().enumerate() {
            let chunk = self.extract_sub_grid(field, grid, threshold);
            debug!(
                chunk = index,
                origin = ?grid.origin,
                vertices = chunk.vertex_count(),
                triangles = chunk.face_count(),
                "polygonized sub-grid"
            );
            mesh.append(chunk);
        }

        for vertex in &mut mesh.vertices {
            *vertex = field.index_to_world(vertex);
        }

        info!(
            chunks = grids.len(),
            vertices = mesh.vertex_count(),
            triangles = mesh.face_count(),
            "extracted isosurface"
        );
        mesh
    }
}

/// Triangulate the cube whose lowest corner is grid point `corner`
pub fn polygonize_cube(field: &DensityField, corner: [usize; 3], threshold: f32) -> CubePolygons {
    let mut values = [0.0f32; 8];
    let mut positions = [Point3f::origin(); 8];
    for (i, offset) in CORNER_OFFSETS.iter().enumerate() {
        let (x, y, z) = (corner[0] + offset[0], corner[1] + offset[1], corner[2] + offset[2]);
        values[i] = field.value(x, y, z);
        positions[i] = Point3f::new(x as f32, y as f32, z as f32);
    }

    let configuration = cube_configuration(&values, threshold);
    let edges = EDGE_TABLE[configuration];
    if edges == 0 {
        return CubePolygons::default();
    }

    let mut polygons = CubePolygons::default();
    let mut edge_vertex = [usize::MAX; MAX_VERTICES_PER_CUBE];
    for (edge, &[a, b]) in EDGE_CONNECTIONS.iter().enumerate() {
        if edges & (1 << edge) != 0 {
            edge_vertex[edge] = polygons.vertices.len();
            polygons.vertices.push(interpolate_vertex(
                positions[a],
                positions[b],
                values[a],
                values[b],
                threshold,
            ));
        }
    }

    for triangle in TRIANGLE_TABLE[configuration].chunks_exact(3) {
        if triangle[0] < 0 {
            break;
        }
        polygons.triangles.push([
            edge_vertex[triangle[0] as usize],
            edge_vertex[triangle[1] as usize],
            edge_vertex[triangle[2] as usize],
        ]);
    }

    polygons
}

/// Linear crossing of `threshold` between two corners
#[inline]
pub fn interpolate_vertex(p1: Point3f, p2: Point3f, v1: f32, v2: f32, threshold: f32) -> Point3f {
    let t = if (v2 - v1).abs() < 1e-6 {
        0.5
    } else {
        (threshold - v1) / (v2 - v1)
    };
    p1 + (p2 - p1) * t
}
