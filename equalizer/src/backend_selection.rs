use crate::common::Result;
#[cfg(not(feature = "wgpu"))]
use crate::common::Error;
use crate::compute::{ComputeBackend, CpuBackend};
#[cfg(feature = "wgpu")]
use crate::compute::GpuBackend;
use crate::config::{BackendKind, EqualizerConfig};
use crate::image::GrayImage;
use crate::pipeline::{Equalization, Pipeline};

/// Backend chosen for a run.
#[derive(Debug)]
pub enum SelectedBackend {
    Cpu(CpuBackend),
    #[cfg(feature = "wgpu")]
    Gpu(GpuBackend),
}

impl SelectedBackend {
    pub fn name(&self) -> String {
        match self {
            SelectedBackend::Cpu(backend) => backend.name(),
            #[cfg(feature = "wgpu")]
            SelectedBackend::Gpu(backend) => backend.name(),
        }
    }

    pub fn equalize(&self, image: &GrayImage, verify: bool) -> Result<Equalization> {
        match self {
            SelectedBackend::Cpu(backend) => run(backend, image, verify),
            #[cfg(feature = "wgpu")]
            SelectedBackend::Gpu(backend) => run(backend, image, verify),
        }
    }
}

fn run<B: ComputeBackend>(backend: &B, image: &GrayImage, verify: bool) -> Result<Equalization> {
    Pipeline::new(backend)?.verify(verify).run(image)
}

/// Resolves `kind` to a backend. `Auto` falls back to the CPU when no GPU is usable.
pub fn select_backend(kind: BackendKind) -> Result<SelectedBackend> {
    match kind {
        BackendKind::Cpu => Ok(SelectedBackend::Cpu(CpuBackend::new())),
        BackendKind::Gpu => gpu_backend(),
        BackendKind::Auto => match gpu_backend() {
            Ok(backend) => Ok(backend),
            Err(e) => {
                log::warn!("{}, falling back to CPU", e);
                Ok(SelectedBackend::Cpu(CpuBackend::new()))
            }
        },
    }
}

#[cfg(feature = "wgpu")]
fn gpu_backend() -> Result<SelectedBackend> {
    Ok(SelectedBackend::Gpu(GpuBackend::new()?))
}

#[cfg(not(feature = "wgpu"))]
fn gpu_backend() -> Result<SelectedBackend> {
    Err(Error::GpuUnavailable(
        "built without the `wgpu` feature".to_string(),
    ))
}

/// Selects the configured backend and runs the whole pipeline on `image`.
pub fn equalize(image: &GrayImage, config: &EqualizerConfig) -> Result<Equalization> {
    let backend = select_backend(config.backend)?;
    log::info!("Using {}", backend.name());

    backend.equalize(image, config.verify)
}
