//! Extract a colored mesh from the synthetic scene and write it as OBJ
//!
//! ```text
//! cargo run --release -p triplanar-demos --bin extract_mesh -- --resolution 256
//! cargo run --release -p triplanar-demos --bin extract_mesh -- --gpu --chunk-cubes 64
//! ```

mod scene;

use anyhow::Context;
use clap::Parser;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use triplanar_core::{IsosurfaceExtractor, TriangleMesh};
use triplanar_gpu::{GpuContext, GpuMarchingCubes, GpuTriplaneSampler};
use triplanar_render::{
    CpuMarchingCubes, MarchingCubesConfig, MeshExtractionConfig, MeshExtractor, RenderConfig,
    VolumeRenderer,
};

/// Extract an isosurface mesh from a triplane scene
#[derive(Parser, Debug)]
#[command(name = "extract_mesh")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Density grid samples per axis
    #[arg(long, default_value_t = 256)]
    resolution: usize,

    /// Density level of the surface
    #[arg(long, default_value_t = 25.0)]
    threshold: f32,

    /// Cubes per marching cubes chunk axis (0 for the whole grid)
    #[arg(long, default_value_t = 32)]
    chunk_cubes: usize,

    /// Points per decoder call (0 evaluates all points at once)
    #[arg(long, default_value_t = 8192)]
    chunk_size: i64,

    /// Triplane resolution
    #[arg(long, default_value_t = 64)]
    triplane_size: usize,

    /// Skip per-vertex colors
    #[arg(long)]
    no_colors: bool,

    /// Run sampling and marching cubes on the GPU
    #[arg(long)]
    gpu: bool,

    /// Output OBJ path
    #[arg(short, long, default_value = "mesh.obj")]
    output: PathBuf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let triplane = scene::position_triplane(args.triplane_size)?;
    let decoder = scene::SnowmanDecoder::default();
    let render_config = RenderConfig::default().with_chunk_size(args.chunk_size);
    let mesh_config = MeshExtractionConfig::default()
        .with_resolution(args.resolution)
        .with_threshold(args.threshold)
        .with_vertex_colors(!args.no_colors);

    let mesh = if args.gpu {
        let gpu = pollster::block_on(GpuContext::new())?;
        let sampler = GpuTriplaneSampler::new(&gpu, render_config.feature_reduction);
        let renderer = VolumeRenderer::with_sampler(render_config, sampler)?;
        let marching_cubes = GpuMarchingCubes::new(&gpu).with_chunk_cubes(args.chunk_cubes);
        extract(&MeshExtractor::new(&renderer, mesh_config)?, &decoder, &triplane, &marching_cubes)?
    } else {
        let renderer = VolumeRenderer::new(render_config)?;
        let marching_cubes =
            CpuMarchingCubes::new(MarchingCubesConfig::default().with_chunk_cubes(args.chunk_cubes));
        extract(&MeshExtractor::new(&renderer, mesh_config)?, &decoder, &triplane, &marching_cubes)?
    };

    write_obj(&mesh, &args.output)?;
    info!(
        path = %args.output.display(),
        vertices = mesh.vertex_count(),
        faces = mesh.face_count(),
        "wrote mesh"
    );
    Ok(())
}

fn extract<S: triplanar_core::FeatureSampler>(
    extractor: &MeshExtractor<'_, S>,
    decoder: &scene::SnowmanDecoder,
    triplane: &triplanar_core::Triplane,
    marching_cubes: &dyn IsosurfaceExtractor,
) -> anyhow::Result<TriangleMesh> {
    extractor
        .extract(decoder, triplane, marching_cubes)
        .context("mesh extraction failed")
}

/// OBJ with optional `v x y z r g b` vertex colors
fn write_obj(mesh: &TriangleMesh, path: &Path) -> anyhow::Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut out = BufWriter::new(file);

    writeln!(out, "# triplanar mesh")?;
    match &mesh.vertex_colors {
        Some(colors) => {
            for (v, c) in mesh.vertices.iter().zip(colors) {
                writeln!(out, "v {} {} {} {} {} {}", v.x, v.y, v.z, c[0], c[1], c[2])?;
            }
        }
        None => {
            for v in &mesh.vertices {
                writeln!(out, "v {} {} {}", v.x, v.y, v.z)?;
            }
        }
    }
    for face in &mesh.faces {
        writeln!(out, "f {} {} {}", face[0] + 1, face[1] + 1, face[2] + 1)?;
    }

    out.flush()?;
    Ok(())
}
