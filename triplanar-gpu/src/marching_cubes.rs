//! GPU marching cubes
//!
//! The cube grid is split into sub-grids that are uploaded and polygonized
//! one at a time. Each chunk owns its buffers and counters; triangle indices
//! are offset by the vertices of the chunks before it. A chunk whose buffers
//! cannot be allocated is skipped with a warning and the rest of the surface
//! is still returned.

use crate::device::GpuContext;
use bytemuck::{Pod, Zeroable};
use tracing::{debug, info, warn};
use triplanar_core::tables::{edge_table_u32, triangle_table_i32, MAX_TRIANGLES_PER_CUBE, MAX_VERTICES_PER_CUBE};
use triplanar_core::{DensityField, Error, IsosurfaceExtractor, Point3f, Result, SubGrid, TriangleMesh};

/// Default cubes per sub-grid axis
pub const GPU_DEFAULT_CHUNK_CUBES: usize = 32;

const WORKGROUP_SIZE: u32 = 4;

/// Per-chunk kernel parameters
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
#[repr(align(16))]
struct ChunkParams {
    cubes: [u32; 4],
    origin: [f32; 4],
    threshold: f32,
    max_vertices: u32,
    max_triangles: u32,
    _padding: u32,
}

/// Marching cubes on a wgpu compute pipeline
pub struct GpuMarchingCubes<'a> {
    gpu: &'a GpuContext,
    pipeline: wgpu::ComputePipeline,
    edge_table: wgpu::Buffer,
    triangle_table: wgpu::Buffer,
    chunk_cubes: usize,
}

impl<'a> GpuMarchingCubes<'a> {
    /// Compile the kernel and upload the lookup tables
    pub fn new(gpu: &'a GpuContext) -> Self {
        let shader = gpu.create_shader_module(
            "Marching Cubes Shader",
            include_str!("shaders/marching_cubes.wgsl"),
        );
        let pipeline = gpu.create_compute_pipeline("Marching Cubes Pipeline", &shader, "main");
        let edge_table = gpu.create_buffer_init(
            "Marching Cubes Edge Table",
            &edge_table_u32(),
            wgpu::BufferUsages::STORAGE,
        );
        let triangle_table = gpu.create_buffer_init(
            "Marching Cubes Triangle Table",
            &triangle_table_i32(),
            wgpu::BufferUsages::STORAGE,
        );

        Self {
            gpu,
            pipeline,
            edge_table,
            triangle_table,
            chunk_cubes: GPU_DEFAULT_CHUNK_CUBES,
        }
    }

    /// Cubes per sub-grid axis; `0` processes the whole grid in one pass
    pub fn with_chunk_cubes(mut self, chunk_cubes: usize) -> Self {
        self.chunk_cubes = chunk_cubes;
        self
    }

    pub fn chunk_cubes(&self) -> usize {
        self.chunk_cubes
    }

    /// Extract the `threshold` isosurface with world-space vertices
    pub async fn extract_async(&self, field: &DensityField, threshold: f32) -> TriangleMesh {
        let grids = field.sub_grids(self.chunk_cubes);
        let mut mesh = TriangleMesh::new();
        let mut skipped = 0usize;

        for (index, grid) in grids.iter().enumerate() {
            match self.extract_sub_grid(field, grid, threshold).await {
                Ok(chunk) => {
                    debug!(
                        chunk = index,
                        origin = ?grid.origin,
                        vertices = chunk.vertex_count(),
                        triangles = chunk.face_count(),
                        "polygonized sub-grid"
                    );
                    mesh.append(chunk);
                }
                Err(e) => {
                    warn!(chunk = index, origin = ?grid.origin, "skipping sub-grid: {}", e);
                    skipped += 1;
                }
            }
            self.gpu.release_transient();
        }

        for vertex in &mut mesh.vertices {
            *vertex = field.index_to_world(vertex);
        }

        info!(
            chunks = grids.len(),
            skipped,
            vertices = mesh.vertex_count(),
            triangles = mesh.face_count(),
            "extracted isosurface on GPU"
        );
        mesh
    }

    /// Polygonize one sub-grid. Vertices stay in grid-index space.
    pub async fn extract_sub_grid(
        &self,
        field: &DensityField,
        grid: &SubGrid,
        threshold: f32,
    ) -> Result<TriangleMesh> {
        let cubes = grid.cube_count();
        let max_vertices = cubes * MAX_VERTICES_PER_CUBE;
        let max_triangles = cubes * MAX_TRIANGLES_PER_CUBE;

        let vertex_bytes = (max_vertices * std::mem::size_of::<[f32; 4]>()) as u64;
        let index_bytes = (max_triangles * 3 * std::mem::size_of::<u32>()) as u64;
        self.gpu.check_storage_size("vertex buffer", vertex_bytes)?;
        self.gpu.check_storage_size("index buffer", index_bytes)?;

        let (max_vertices, max_triangles) = match (u32::try_from(max_vertices), u32::try_from(max_triangles)) {
            (Ok(v), Ok(t)) => (v, t),
            _ => return Err(Error::Gpu(format!("{} cubes exceed 32-bit output counters", cubes))),
        };

        let samples = grid.gather(field);
        let params = ChunkParams {
            cubes: [grid.cubes[0] as u32, grid.cubes[1] as u32, grid.cubes[2] as u32, 0],
            origin: [grid.origin[0] as f32, grid.origin[1] as f32, grid.origin[2] as f32, 0.0],
            threshold,
            max_vertices,
            max_triangles,
            _padding: 0,
        };

        let (values_buffer, params_buffer, vertex_buffer, index_buffer, counter_buffer) = self
            .gpu
            .with_error_scope("marching cubes buffers", |gpu| {
                let storage_out = wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC;
                (
                    gpu.create_buffer_init("Density Values Buffer", &samples, wgpu::BufferUsages::STORAGE),
                    gpu.create_buffer_init("Marching Cubes Params Buffer", &[params], wgpu::BufferUsages::UNIFORM),
                    gpu.create_buffer("Vertex Output Buffer", vertex_bytes, storage_out),
                    gpu.create_buffer("Index Output Buffer", index_bytes, storage_out),
                    gpu.create_buffer_init("Counter Buffer", &[0u32; 2], storage_out),
                )
            })
            .await?;

        let bind_group = self.gpu.create_bind_group(
            "Marching Cubes Bind Group",
            &self.pipeline.get_bind_group_layout(0),
            &[
                &values_buffer,
                &self.edge_table,
                &self.triangle_table,
                &params_buffer,
                &vertex_buffer,
                &index_buffer,
                &counter_buffer,
            ],
        );

        let workgroups = [
            params.cubes[0].div_ceil(WORKGROUP_SIZE),
            params.cubes[1].div_ceil(WORKGROUP_SIZE),
            params.cubes[2].div_ceil(WORKGROUP_SIZE),
        ];
        self.gpu
            .dispatch("Marching Cubes Pass", &self.pipeline, &bind_group, workgroups);

        let counters: Vec<u32> = self.gpu.read_buffer(&counter_buffer, 2).await?;
        let (vertex_count, triangle_count) = (counters[0] as usize, counters[1] as usize);
        if vertex_count > max_vertices as usize || triangle_count > max_triangles as usize {
            return Err(Error::Gpu(format!(
                "marching cubes overflowed its output: {} vertices, {} triangles",
                vertex_count, triangle_count
            )));
        }

        let raw_vertices: Vec<[f32; 4]> = self.gpu.read_buffer(&vertex_buffer, vertex_count).await?;
        let raw_indices: Vec<u32> = self.gpu.read_buffer(&index_buffer, triangle_count * 3).await?;

        let vertices = raw_vertices
            .iter()
            .map(|v| Point3f::new(v[0], v[1], v[2]))
            .collect();
        let faces = raw_indices
            .chunks_exact(3)
            .map(|t| [t[0] as usize, t[1] as usize, t[2] as usize])
            .collect();

        Ok(TriangleMesh::from_vertices_and_faces(vertices, faces))
    }
}

impl IsosurfaceExtractor for GpuMarchingCubes<'_> {
    #[tracing::instrument(skip_all, fields(resolution = field.resolution(), threshold = threshold))]
    fn extract(&self, field: &DensityField, threshold: f32) -> TriangleMesh {
        pollster::block_on(self.extract_async(field, threshold))
    }
}

impl std::fmt::Debug for GpuMarchingCubes<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuMarchingCubes")
            .field("chunk_cubes", &self.chunk_cubes)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::try_create_gpu_context;
    use triplanar_render::{CpuMarchingCubes, MarchingCubesConfig};

    fn sphere_field(resolution: usize) -> DensityField {
        DensityField::from_fn(resolution, 0.87, |p| 0.5 - p.coords.norm()).unwrap()
    }

    #[test]
    fn test_params_layout() {
        assert_eq!(std::mem::size_of::<ChunkParams>(), 48);
    }

    #[test]
    fn test_matches_cpu_counts() {
        pollster::block_on(async {
            let Some(gpu) = try_create_gpu_context().await else {
                return;
            };

            let field = sphere_field(40);
            let cpu = CpuMarchingCubes::new(MarchingCubesConfig::default()).extract(&field, 0.0);
            let mesh = GpuMarchingCubes::new(&gpu).extract_async(&field, 0.0).await;

            assert_eq!(mesh.vertex_count(), cpu.vertex_count());
            assert_eq!(mesh.face_count(), cpu.face_count());
            assert!(mesh.validate().is_ok());

            let spacing = 2.0 * 0.87 / 39.0;
            assert!(mesh
                .vertices
                .iter()
                .all(|v| (v.coords.norm() - 0.5).abs() < spacing));
        });
    }

    #[test]
    fn test_chunking_is_transparent() {
        pollster::block_on(async {
            let Some(gpu) = try_create_gpu_context().await else {
                return;
            };

            let field = DensityField::from_fn(50, 1.0, |p| {
                0.6 - (p.x * p.x + 2.0 * p.y * p.y + 0.5 * p.z * p.z).sqrt()
            })
            .unwrap();

            let whole = GpuMarchingCubes::new(&gpu)
                .with_chunk_cubes(0)
                .extract_async(&field, 0.0)
                .await;
            assert!(whole.face_count() > 0);

            for chunk in [7, 16, 32] {
                let mesh = GpuMarchingCubes::new(&gpu)
                    .with_chunk_cubes(chunk)
                    .extract_async(&field, 0.0)
                    .await;
                assert_eq!(mesh.vertex_count(), whole.vertex_count(), "chunk {}", chunk);
                assert_eq!(mesh.face_count(), whole.face_count(), "chunk {}", chunk);
                assert!(mesh.validate().is_ok());
            }
        });
    }

    #[test]
    fn test_no_crossing_gives_empty_mesh() {
        let Some(gpu) = pollster::block_on(try_create_gpu_context()) else {
            return;
        };

        let field = DensityField::from_fn(16, 1.0, |_| 3.0).unwrap();
        let mesh = GpuMarchingCubes::new(&gpu).extract(&field, 0.0);
        assert!(mesh.is_empty());
    }
}
