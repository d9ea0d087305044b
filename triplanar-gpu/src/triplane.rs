//! GPU triplane feature sampling
//!
//! Same bilinear grid-sample as the CPU sampler, one invocation per point.
//! The triplane is copied into a call-scoped storage buffer from its
//! contiguous device view.

use crate::device::GpuContext;
use bytemuck::{Pod, Zeroable};
use ndarray::Array2;
use tracing::debug;
use triplanar_core::{Error, FeatureReduction, FeatureSampler, Point3f, Result, Triplane};

const WORKGROUP_SIZE: u32 = 64;

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct SampleParams {
    channels: u32,
    height: u32,
    width: u32,
    reduction: u32,
    count: u32,
    row_stride: u32,
    out_dim: u32,
    _padding: u32,
}

/// Triplane sampler backed by a wgpu compute pipeline
pub struct GpuTriplaneSampler<'a> {
    gpu: &'a GpuContext,
    pipeline: wgpu::ComputePipeline,
    reduction: FeatureReduction,
}

impl<'a> GpuTriplaneSampler<'a> {
    pub fn new(gpu: &'a GpuContext, reduction: FeatureReduction) -> Self {
        let shader = gpu.create_shader_module(
            "Triplane Sample Shader",
            include_str!("shaders/triplane_sample.wgsl"),
        );
        let pipeline = gpu.create_compute_pipeline("Triplane Sample Pipeline", &shader, "main");
        Self {
            gpu,
            pipeline,
            reduction,
        }
    }

    /// Sample `[M, D]` features for `M` normalized positions
    pub async fn sample_async(&self, triplane: &Triplane, positions: &[Point3f]) -> Result<Array2<f32>> {
        let dim = self.reduction.output_dim(triplane.channels());
        if positions.is_empty() {
            return Ok(Array2::zeros((0, dim)));
        }

        let view = triplane.device_view()?;
        let output_len = positions.len() * dim;
        let output_bytes = (output_len * std::mem::size_of::<f32>()) as u64;
        self.gpu
            .check_storage_size("triplane buffer", view.as_bytes().len() as u64)?;
        self.gpu.check_storage_size("feature buffer", output_bytes)?;

        let count = u32::try_from(positions.len())
            .map_err(|_| Error::Gpu(format!("{} points exceed one dispatch", positions.len())))?;
        let groups = count.div_ceil(WORKGROUP_SIZE);
        let max_groups = self.gpu.device.limits().max_compute_workgroups_per_dimension;
        let groups_x = groups.min(max_groups);
        let groups_y = groups.div_ceil(groups_x);

        let params = SampleParams {
            channels: triplane.channels() as u32,
            height: triplane.height() as u32,
            width: triplane.width() as u32,
            reduction: match self.reduction {
                FeatureReduction::Concat => 0,
                FeatureReduction::Mean => 1,
            },
            count,
            row_stride: groups_x * WORKGROUP_SIZE,
            out_dim: dim as u32,
            _padding: 0,
        };

        let padded: Vec<[f32; 4]> = positions.iter().map(|p| [p.x, p.y, p.z, 0.0]).collect();
        let (plane_buffer, position_buffer, params_buffer, feature_buffer) = self
            .gpu
            .with_error_scope("triplane sample buffers", |gpu| {
                (
                    gpu.create_buffer_init("Triplane Buffer", view.values(), wgpu::BufferUsages::STORAGE),
                    gpu.create_buffer_init("Sample Position Buffer", &padded, wgpu::BufferUsages::STORAGE),
                    gpu.create_buffer_init("Sample Params Buffer", &[params], wgpu::BufferUsages::UNIFORM),
                    gpu.create_buffer(
                        "Feature Output Buffer",
                        output_bytes,
                        wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
                    ),
                )
            })
            .await?;

        let bind_group = self.gpu.create_bind_group(
            "Triplane Sample Bind Group",
            &self.pipeline.get_bind_group_layout(0),
            &[&plane_buffer, &position_buffer, &params_buffer, &feature_buffer],
        );
        self.gpu
            .dispatch("Triplane Sample Pass", &self.pipeline, &bind_group, [groups_x, groups_y, 1]);

        let features: Vec<f32> = self.gpu.read_buffer(&feature_buffer, output_len).await?;
        debug!(points = positions.len(), dim, groups_x, groups_y, "sampled triplane on GPU");
        Ok(Array2::from_shape_vec((positions.len(), dim), features)?)
    }
}

impl FeatureSampler for GpuTriplaneSampler<'_> {
    fn reduction(&self) -> FeatureReduction {
        self.reduction
    }

    fn sample(&self, triplane: &Triplane, positions: &[Point3f]) -> Result<Array2<f32>> {
        pollster::block_on(self.sample_async(triplane, positions))
    }
}

impl std::fmt::Debug for GpuTriplaneSampler<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuTriplaneSampler")
            .field("reduction", &self.reduction)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::try_create_gpu_context;
    use approx::assert_relative_eq;
    use rand::Rng;
    use triplanar_render::TriplaneSampler;

    fn textured_triplane(channels: usize, height: usize, width: usize) -> Triplane {
        Triplane::from_fn(channels, height, width, |p, c, row, col| {
            ((p * 7 + c * 3 + row * 5 + col) % 11) as f32 * 0.1 - 0.5
        })
        .unwrap()
    }

    fn random_points(n: usize) -> Vec<Point3f> {
        let mut rng = rand::thread_rng();
        // a margin past the cube exercises zero padding
        (0..n)
            .map(|_| {
                Point3f::new(
                    rng.gen_range(-1.1..1.1),
                    rng.gen_range(-1.1..1.1),
                    rng.gen_range(-1.1..1.1),
                )
            })
            .collect()
    }

    #[test]
    fn test_params_layout() {
        assert_eq!(std::mem::size_of::<SampleParams>(), 32);
    }

    #[test]
    fn test_matches_cpu_sampler() {
        let Some(gpu) = pollster::block_on(try_create_gpu_context()) else {
            return;
        };

        let triplane = textured_triplane(5, 12, 9);
        let points = random_points(1000);

        for reduction in [FeatureReduction::Concat, FeatureReduction::Mean] {
            let expected = TriplaneSampler::new(reduction).sample(&triplane, &points).unwrap();
            let actual = GpuTriplaneSampler::new(&gpu, reduction)
                .sample(&triplane, &points)
                .unwrap();

            assert_eq!(actual.shape(), expected.shape());
            for (a, e) in actual.iter().zip(expected.iter()) {
                assert_relative_eq!(*a, *e, epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn test_empty_positions() {
        let Some(gpu) = pollster::block_on(try_create_gpu_context()) else {
            return;
        };

        let triplane = textured_triplane(4, 8, 8);
        let features = GpuTriplaneSampler::new(&gpu, FeatureReduction::Concat)
            .sample(&triplane, &[])
            .unwrap();
        assert_eq!(features.shape(), &[0, 12]);
    }

    #[test]
    fn test_drives_volume_renderer() {
        use triplanar_core::DecoderOutput;
        use triplanar_render::{spherical_cameras, RenderConfig, VolumeRenderer};

        let Some(gpu) = pollster::block_on(try_create_gpu_context()) else {
            return;
        };

        let decoder = |features: ndarray::ArrayView2<'_, f32>| -> Result<DecoderOutput> {
            let n = features.nrows();
            let density = ndarray::Array1::from_shape_fn(n, |r| features.row(r).sum());
            let color = Array2::from_shape_fn((n, 3), |(r, c)| features[[r, c]]);
            DecoderOutput::new(density, color)
        };

        let triplane = textured_triplane(3, 16, 16);
        let rays = spherical_cameras(1, 10.0, 2.0, 40.0).unwrap()[0].generate_rays(6, 6);
        let config = RenderConfig::default().with_samples_per_ray(24);

        let cpu = VolumeRenderer::new(config.clone())
            .unwrap()
            .render(&decoder, &triplane, &rays)
            .unwrap();
        let sampler = GpuTriplaneSampler::new(&gpu, FeatureReduction::Concat);
        let gpu_render = VolumeRenderer::with_sampler(config, sampler)
            .unwrap()
            .render(&decoder, &triplane, &rays)
            .unwrap();

        for (a, e) in gpu_render.iter().zip(cpu.iter()) {
            assert_relative_eq!(*a, *e, epsilon = 1e-3);
        }
    }
}
