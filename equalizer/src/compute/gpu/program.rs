use hashbrown::HashMap;

use super::Gpu;
use crate::common::{Error, Result};
use crate::compute::{Kernel, KernelSource};

/// Compiled pipeline for one kernel.
#[derive(Debug)]
pub(super) struct KernelPipeline {
    pub(super) compute_pipeline: wgpu::ComputePipeline,
    pub(super) bind_group_layout: wgpu::BindGroupLayout,
}

/// Compiled kernel program. Create once and reuse for every run.
#[derive(Debug)]
pub struct GpuProgram {
    label: String,
    pipelines: HashMap<Kernel, KernelPipeline>,
}

impl GpuProgram {
    pub(super) fn new(gpu: &Gpu, source: &KernelSource) -> Result<Self> {
        let mut problems = source.structural_problems();
        let mut pipelines = HashMap::new();

        if problems.is_empty() {
            for (kernel, wgsl) in &source.kernels {
                match build_pipeline(gpu, *kernel, wgsl) {
                    Ok(pipeline) => {
                        pipelines.insert(*kernel, pipeline);
                    }
                    Err(log) => problems.push(format!("{}: {}", kernel, log)),
                }
            }
        }

        if !problems.is_empty() {
            let log = problems.join("\n");
            log::error!("Build log for '{}':\n{}", source.label, log);
            return Err(Error::KernelBuild {
                label: source.label.clone(),
                log,
            });
        }

        Ok(Self {
            label: source.label.clone(),
            pipelines,
        })
    }

    pub(super) fn pipeline(&self, kernel: Kernel) -> Result<&KernelPipeline> {
        self.pipelines.get(&kernel).ok_or_else(|| {
            Error::dispatch(
                kernel,
                format!("kernel is not part of program '{}'", self.label),
            )
        })
    }
}

fn build_pipeline(gpu: &Gpu, kernel: Kernel, wgsl: &str) -> std::result::Result<KernelPipeline, String> {
    let device = gpu.device();

    let (pipeline, error) = gpu.scoped(wgpu::ErrorFilter::Validation, || {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(kernel.entry_point()),
            source: wgpu::ShaderSource::Wgsl(wgsl.into()),
        });

        // Params uniform, then one storage binding per kernel argument
        let entries: Vec<wgpu::BindGroupLayoutEntry> = std::iter::once(wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        })
        .chain(
            kernel
                .args()
                .iter()
                .enumerate()
                .map(|(index, spec)| wgpu::BindGroupLayoutEntry {
                    binding: index as u32 + 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage {
                            read_only: !spec.access.writes(),
                        },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }),
        )
        .collect();

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(kernel.entry_point()),
            entries: &entries,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(kernel.entry_point()),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let compute_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(kernel.entry_point()),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some(kernel.entry_point()),
            compilation_options: Default::default(),
            cache: None,
        });

        KernelPipeline {
            compute_pipeline,
            bind_group_layout,
        }
    });

    match error {
        Some(error) => Err(error.to_string()),
        None => Ok(pipeline),
    }
}
