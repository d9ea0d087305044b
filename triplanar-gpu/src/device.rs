//! GPU device management

use tracing::{info, warn};
use triplanar_core::{Error, Result};
use wgpu::util::DeviceExt;

/// GPU context shared by the compute kernels
#[derive(Debug)]
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter: wgpu::Adapter,
}

impl GpuContext {
    /// Create a new GPU context on the highest-performance adapter
    pub async fn new() -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags: wgpu::InstanceFlags::default(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| Error::Gpu("Failed to find suitable adapter".to_string()))?;

        // Large grids need the adapter's full storage buffer limits
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Triplanar GPU Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: adapter.limits(),
                },
                None,
            )
            .await
            .map_err(|e| Error::Gpu(format!("Failed to create device: {}", e)))?;

        let adapter_info = adapter.get_info();
        info!(
            adapter = %adapter_info.name,
            backend = ?adapter_info.backend,
            "created GPU context"
        );

        Ok(Self {
            device,
            queue,
            adapter,
        })
    }

    /// Create a buffer from data
    pub fn create_buffer_init<T: bytemuck::Pod>(
        &self,
        label: &str,
        data: &[T],
        usage: wgpu::BufferUsages,
    ) -> wgpu::Buffer {
        self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(data),
            usage,
        })
    }

    /// Create an empty buffer
    pub fn create_buffer(&self, label: &str, size: u64, usage: wgpu::BufferUsages) -> wgpu::Buffer {
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage,
            mapped_at_creation: false,
        })
    }

    /// Create a compute pipeline with an inferred layout
    pub fn create_compute_pipeline(
        &self,
        label: &str,
        shader: &wgpu::ShaderModule,
        entry_point: &str,
    ) -> wgpu::ComputePipeline {
        self.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(label),
            layout: None,
            module: shader,
            entry_point,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        })
    }

    /// Create a shader module from WGSL source
    pub fn create_shader_module(&self, label: &str, source: &str) -> wgpu::ShaderModule {
        self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        })
    }

    /// Create a bind group over whole buffers, bound in order from binding 0
    pub fn create_bind_group(
        &self,
        label: &str,
        layout: &wgpu::BindGroupLayout,
        buffers: &[&wgpu::Buffer],
    ) -> wgpu::BindGroup {
        let entries: Vec<wgpu::BindGroupEntry> = buffers
            .iter()
            .enumerate()
            .map(|(binding, buffer)| wgpu::BindGroupEntry {
                binding: binding as u32,
                resource: buffer.as_entire_binding(),
            })
            .collect();

        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &entries,
        })
    }

    /// Largest storage buffer a kernel can bind on this device
    pub fn max_storage_bytes(&self) -> u64 {
        let limits = self.device.limits();
        (limits.max_storage_buffer_binding_size as u64).min(limits.max_buffer_size)
    }

    /// Fail early when a storage buffer would exceed the device limits
    pub fn check_storage_size(&self, label: &str, size: u64) -> Result<()> {
        let max = self.max_storage_bytes();
        if size > max {
            return Err(Error::Gpu(format!(
                "{} needs {} bytes, device allows {}",
                label, size, max
            )));
        }
        Ok(())
    }

    /// Run `allocate` inside out-of-memory and validation error scopes.
    ///
    /// Allocation failures are reported as [`Error::Gpu`] instead of reaching
    /// the device's uncaptured error handler.
    pub async fn with_error_scope<R>(&self, label: &str, allocate: impl FnOnce(&Self) -> R) -> Result<R> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = allocate(self);
        let validation = self.device.pop_error_scope().await;
        let out_of_memory = self.device.pop_error_scope().await;

        match out_of_memory.or(validation) {
            Some(e) => Err(Error::Gpu(format!("{}: {}", label, e))),
            None => Ok(value),
        }
    }

    /// Record one compute pass, submit it and wait for completion
    pub fn dispatch(
        &self,
        label: &str,
        pipeline: &wgpu::ComputePipeline,
        bind_group: &wgpu::BindGroup,
        workgroups: [u32; 3],
    ) {
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some(label),
        });

        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(label),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(pipeline);
            compute_pass.set_bind_group(0, bind_group, &[]);
            compute_pass.dispatch_workgroups(workgroups[0], workgroups[1], workgroups[2]);
        }

        self.queue.submit(Some(encoder.finish()));
        self.device.poll(wgpu::Maintain::Wait);
    }

    /// Copy the first `count` elements of `source` back to the host
    pub async fn read_buffer<T: bytemuck::Pod>(&self, source: &wgpu::Buffer, count: usize) -> Result<Vec<T>> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let size = (count * std::mem::size_of::<T>()) as u64;
        let staging_buffer = self.create_buffer(
            "Readback Staging Buffer",
            size,
            wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        );

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Readback Encoder"),
        });
        encoder.copy_buffer_to_buffer(source, 0, &staging_buffer, 0, size);
        self.queue.submit(Some(encoder.finish()));

        let buffer_slice = staging_buffer.slice(..);
        let (sender, receiver) = flume::bounded(1);
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });

        self.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv_async()
            .await
            .map_err(|_| Error::Gpu("Failed to receive mapping result".into()))??;

        let data = buffer_slice.get_mapped_range();
        let values: Vec<T> = bytemuck::cast_slice(&data).to_vec();

        drop(data);
        staging_buffer.unmap();

        Ok(values)
    }

    /// Wait for outstanding work so buffers dropped by the caller are reclaimed
    pub fn release_transient(&self) {
        self.device.poll(wgpu::Maintain::Wait);
    }
}

/// Create a GPU context, or `None` when no adapter is available
pub async fn try_create_gpu_context() -> Option<GpuContext> {
    match GpuContext::new().await {
        Ok(gpu) => Some(gpu),
        Err(e) => {
            warn!("GPU not available: {}", e);
            None
        }
    }
}
