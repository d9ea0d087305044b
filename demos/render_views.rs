//! Render a ring of views of the synthetic scene to PNG files
//!
//! ```text
//! cargo run -p triplanar-demos --bin render_views -- --views 8 --size 128
//! RUST_LOG=debug cargo run -p triplanar-demos --bin render_views -- --gpu
//! ```

mod scene;

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use triplanar_core::{FeatureSampler, Triplane};
use triplanar_gpu::{GpuContext, GpuTriplaneSampler};
use triplanar_render::{spherical_cameras, Camera, RenderConfig, VolumeRenderer};

/// Render views of a triplane scene
#[derive(Parser, Debug)]
#[command(name = "render_views")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of views evenly spaced in azimuth
    #[arg(long, default_value_t = 4)]
    views: usize,

    /// Camera elevation in degrees
    #[arg(long, default_value_t = 20.0)]
    elevation: f32,

    /// Camera distance from the origin
    #[arg(long, default_value_t = 1.9)]
    distance: f32,

    /// Vertical field of view in degrees
    #[arg(long, default_value_t = 40.0)]
    fov: f32,

    /// Output image height and width in pixels
    #[arg(long, default_value_t = 128)]
    size: usize,

    /// Triplane resolution
    #[arg(long, default_value_t = 64)]
    triplane_size: usize,

    /// JSON file with renderer settings; missing fields keep their defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override samples per ray
    #[arg(long)]
    samples: Option<usize>,

    /// Override decoder chunk size (0 evaluates all points at once)
    #[arg(long)]
    chunk_size: Option<i64>,

    /// Composite over a white background
    #[arg(long)]
    white_background: bool,

    /// Sample the triplane on the GPU
    #[arg(long)]
    gpu: bool,

    /// Directory for the rendered PNG files
    #[arg(short, long, default_value = "renders")]
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
    let config = load_config(&args)?;
    let triplane = scene::position_triplane(args.triplane_size)?;
    let cameras = spherical_cameras(args.views, args.elevation, args.distance, args.fov)?;
    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("creating {}", args.output.display()))?;

    if args.gpu {
        let gpu = pollster::block_on(GpuContext::new())?;
        let sampler = GpuTriplaneSampler::new(&gpu, config.feature_reduction);
        let renderer = VolumeRenderer::with_sampler(config, sampler)?;
        render_views(&renderer, &triplane, &cameras, &args)
    } else {
        let renderer = VolumeRenderer::new(config)?;
        render_views(&renderer, &triplane, &cameras, &args)
    }
}

fn load_config(args: &Args) -> anyhow::Result<RenderConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str::<RenderConfig>(&text)
                .with_context(|| format!("parsing {}", path.display()))?
        }
        None => RenderConfig::default(),
    };

    if let Some(samples) = args.samples {
        config = config.with_samples_per_ray(samples);
    }
    if let Some(chunk_size) = args.chunk_size {
        config = config.with_chunk_size(chunk_size);
    }
    if args.white_background {
        config = config.with_white_background(true);
    }
    config.validate()?;
    Ok(config)
}

fn render_views<S: FeatureSampler>(
    renderer: &VolumeRenderer<S>,
    triplane: &Triplane,
    cameras: &[Camera],
    args: &Args,
) -> anyhow::Result<()> {
    let decoder = scene::SnowmanDecoder::default();
    let size = args.size;

    for (index, camera) in cameras.iter().enumerate() {
        let rays = camera.generate_rays(size, size);
        let image = renderer.render_image(&decoder, triplane, &rays, size, size)?;

        let png = image::RgbaImage::from_fn(size as u32, size as u32, |x, y| {
            let pixel = image.slice(ndarray::s![y as usize, x as usize, ..]);
            image::Rgba([
                to_byte(pixel[0]),
                to_byte(pixel[1]),
                to_byte(pixel[2]),
                to_byte(pixel[3]),
            ])
        });

        let path = args.output.join(format!("view_{:03}.png", index));
        png.save(&path)
            .with_context(|| format!("writing {}", path.display()))?;
        info!(view = index, path = %path.display(), "saved render");
    }

    Ok(())
}

fn to_byte(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}
