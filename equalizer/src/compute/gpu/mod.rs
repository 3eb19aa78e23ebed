mod program;

use std::borrow::Cow;
use std::sync::mpsc;
use std::sync::Arc;

use wgpu::util::DeviceExt;

pub use self::program::GpuProgram;

use super::{validate_dispatch, BufferDesc, ComputeBackend, Kernel, KernelSource};
use crate::common::{Error, Result};

/// Invocations per workgroup; matches `WORKGROUP_SIZE` in the shaders.
const WORKGROUP_SIZE: u32 = 256;

/// GPU context holding wgpu device and queue for compute operations.
#[derive(Debug, Clone)]
pub struct Gpu {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    info: wgpu::AdapterInfo,
}

impl Gpu {
    /// Creates a new GPU context, initializing wgpu with default settings.
    pub fn new() -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| {
            Error::GpuUnavailable(format!("failed to find suitable GPU adapter: {}", e))
        })?;

        let (device, queue) =
            pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor::default()))
                .map_err(|e| Error::GpuUnavailable(format!("failed to create device: {}", e)))?;

        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            info: adapter.get_info(),
        })
    }

    /// Returns a reference to the wgpu device.
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Returns a reference to the wgpu queue.
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.info
    }

    /// Blocks until all submitted work has completed.
    pub fn wait(&self) -> Result<()> {
        self.device
            .poll(wgpu::PollType::Wait)
            .map(|_| ())
            .map_err(|e| Error::DeviceResource(format!("device poll failed: {}", e)))
    }

    /// Runs `f` inside a validation/out-of-memory error scope.
    fn scoped<T>(
        &self,
        filter: wgpu::ErrorFilter,
        f: impl FnOnce() -> T,
    ) -> (T, Option<wgpu::Error>) {
        self.device.push_error_scope(filter);
        let value = f();
        let error = pollster::block_on(self.device.pop_error_scope());
        (value, error)
    }
}

/// Device buffer. The allocation is padded to whole words for WGSL `array<u32>` access.
#[derive(Debug)]
pub struct GpuBuffer {
    desc: BufferDesc,
    buffer: wgpu::Buffer,
    padded_size: u64,
}

impl GpuBuffer {
    pub fn desc(&self) -> &BufferDesc {
        &self.desc
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct Params {
    global_size: u32,
    _padding: [u32; 3],
}

/// Compute-shader backend over wgpu.
#[derive(Debug, Clone)]
pub struct GpuBackend {
    gpu: Gpu,
}

impl GpuBackend {
    pub fn new() -> Result<Self> {
        Ok(Self::with_gpu(Gpu::new()?))
    }

    pub fn with_gpu(gpu: Gpu) -> Self {
        Self { gpu }
    }

    pub fn gpu(&self) -> &Gpu {
        &self.gpu
    }
}

impl ComputeBackend for GpuBackend {
    type Buffer = GpuBuffer;
    type Program = GpuProgram;

    fn name(&self) -> String {
        let info = self.gpu.adapter_info();
        format!("GPU ({:?}, {})", info.backend, info.name)
    }

    fn compile(&self, source: &KernelSource) -> Result<GpuProgram> {
        GpuProgram::new(&self.gpu, source)
    }

    fn allocate(&self, desc: BufferDesc) -> Result<GpuBuffer> {
        let padded_size = (desc.size_in_bytes()? as u64)
            .next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT)
            .max(wgpu::COPY_BUFFER_ALIGNMENT);

        let limits = self.gpu.device().limits();
        let max_size = limits
            .max_buffer_size
            .min(limits.max_storage_buffer_binding_size as u64);
        if padded_size > max_size {
            return Err(Error::DeviceResource(format!(
                "buffer '{}' needs {} bytes, device allows {}",
                desc.label, padded_size, max_size
            )));
        }

        let (buffer, error) = self.gpu.scoped(wgpu::ErrorFilter::OutOfMemory, || {
            self.gpu.device().create_buffer(&wgpu::BufferDescriptor {
                label: Some(desc.label),
                size: padded_size,
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_SRC
                    | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        });
        if let Some(error) = error {
            return Err(Error::DeviceResource(format!(
                "failed to allocate '{}': {}",
                desc.label, error
            )));
        }

        Ok(GpuBuffer {
            desc,
            buffer,
            padded_size,
        })
    }

    fn buffer_desc<'b>(&self, buffer: &'b GpuBuffer) -> &'b BufferDesc {
        &buffer.desc
    }

    fn write(&self, buffer: &GpuBuffer, offset: usize, data: &[u8]) -> Result<()> {
        buffer.desc.check_transfer(offset, data.len())?;
        if data.is_empty() {
            return Ok(());
        }

        let align = wgpu::COPY_BUFFER_ALIGNMENT as usize;
        let reaches_end = offset + data.len() == buffer.desc.size_in_bytes()?;
        if offset % align != 0 || (data.len() % align != 0 && !reaches_end) {
            return Err(Error::DeviceResource(format!(
                "write of {} bytes at offset {} into '{}' is not {}-byte aligned",
                data.len(),
                offset,
                buffer.desc.label,
                align
            )));
        }

        // the tail word of a padded allocation is owned by this buffer alone
        let bytes: Cow<[u8]> = if data.len() % align == 0 {
            Cow::Borrowed(data)
        } else {
            let mut padded = data.to_vec();
            padded.resize(data.len().next_multiple_of(align), 0);
            Cow::Owned(padded)
        };

        self.gpu
            .queue()
            .write_buffer(&buffer.buffer, offset as u64, &bytes);
        self.gpu.queue().submit(std::iter::empty());

        self.gpu.wait()
    }

    fn read(&self, buffer: &GpuBuffer, offset: usize, out: &mut [u8]) -> Result<()> {
        buffer.desc.check_transfer(offset, out.len())?;
        if out.is_empty() {
            return Ok(());
        }

        let align = wgpu::COPY_BUFFER_ALIGNMENT;
        let start = offset as u64 / align * align;
        let end = ((offset + out.len()) as u64).next_multiple_of(align);
        debug_assert!(end <= buffer.padded_size);
        let size = end - start;

        let staging_buffer = self.gpu.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some("equalizer_staging"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .gpu
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("equalizer_download_encoder"),
            });
        encoder.copy_buffer_to_buffer(&buffer.buffer, start, &staging_buffer, 0, size);
        self.gpu.queue().submit(std::iter::once(encoder.finish()));

        let (sender, receiver) = mpsc::channel();
        let buffer_slice = staging_buffer.slice(..);
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });

        self.gpu.wait()?;

        receiver
            .recv()
            .map_err(|e| Error::DeviceResource(format!("map callback dropped: {}", e)))?
            .map_err(|e| {
                Error::DeviceResource(format!("failed to map '{}': {}", buffer.desc.label, e))
            })?;

        let skip = offset - start as usize;
        let data = buffer_slice.get_mapped_range();
        out.copy_from_slice(&data[skip..skip + out.len()]);
        drop(data);
        staging_buffer.unmap();

        Ok(())
    }

    fn dispatch(
        &self,
        program: &GpuProgram,
        kernel: Kernel,
        args: &[&GpuBuffer],
        problem_size: usize,
    ) -> Result<()> {
        let pipeline = program.pipeline(kernel)?;
        validate_dispatch(kernel, args, GpuBuffer::desc, problem_size)?;

        let global_size = u32::try_from(problem_size)
            .map_err(|_| Error::dispatch(kernel, "problem size exceeds u32 range"))?;
        let device = self.gpu.device();
        let limits = device.limits();
        let (groups_x, groups_y) = workgroup_grid(
            invocations(kernel, global_size),
            limits.max_compute_workgroups_per_dimension,
        );
        if groups_y > limits.max_compute_workgroups_per_dimension {
            return Err(Error::dispatch(
                kernel,
                format!("{} work-items exceed the device dispatch limit", problem_size),
            ));
        }

        let params = Params {
            global_size,
            _padding: [0; 3],
        };
        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("equalizer_params_buffer"),
            contents: bytemuck::cast_slice(&[params]),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: params_buffer.as_entire_binding(),
        }];
        entries.extend(args.iter().enumerate().map(|(index, buffer)| {
            wgpu::BindGroupEntry {
                binding: index as u32 + 1,
                resource: buffer.buffer.as_entire_binding(),
            }
        }));

        let ((), error) = self.gpu.scoped(wgpu::ErrorFilter::Validation, || {
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(kernel.entry_point()),
                layout: &pipeline.bind_group_layout,
                entries: &entries,
            });

            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(kernel.entry_point()),
            });
            {
                let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some(kernel.entry_point()),
                    timestamp_writes: None,
                });
                compute_pass.set_pipeline(&pipeline.compute_pipeline);
                compute_pass.set_bind_group(0, &bind_group, &[]);
                compute_pass.dispatch_workgroups(groups_x, groups_y, 1);
            }

            self.gpu.queue().submit(std::iter::once(encoder.finish()));
        });
        if let Some(error) = error {
            return Err(Error::dispatch(kernel, error.to_string()));
        }

        log::trace!(
            "dispatched {} over {} work-items ({}x{} workgroups)",
            kernel,
            problem_size,
            groups_x,
            groups_y
        );

        Ok(())
    }

    fn synchronize(&self) -> Result<()> {
        self.gpu.queue().submit(std::iter::empty());
        self.gpu.wait()
    }
}

/// Shader invocations needed for `global_size` work-items.
fn invocations(kernel: Kernel, global_size: u32) -> u32 {
    match kernel {
        // each invocation packs one output word of four pixels
        Kernel::Reproject => global_size.div_ceil(4),
        Kernel::Histogram | Kernel::Cumulative | Kernel::Lut => global_size,
    }
}

/// Splits the workgroup count over x and y when x alone would exceed `max_per_dim`.
fn workgroup_grid(invocations: u32, max_per_dim: u32) -> (u32, u32) {
    let groups = invocations.div_ceil(WORKGROUP_SIZE);
    if groups <= max_per_dim {
        (groups, 1)
    } else {
        (max_per_dim, groups.div_ceil(max_per_dim))
    }
}

#[cfg(test)]
mod tests;
