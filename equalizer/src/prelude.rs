// Error handling
pub use crate::common::{Error, Result};

// Image types
pub use crate::image::{GrayImage, ImageDesc, SUPPORTED_EXTENSIONS};

// Tables
pub use crate::tables::{Bins, CumulativeHistogram, Histogram, Lut, Normalization, BINS};

// Pipeline
pub use crate::pipeline::{
    BufferRole, Equalization, Pipeline, PipelineState, Stage, StageTimings,
};

// Backends
pub use crate::backend_selection::{equalize, select_backend, SelectedBackend};
pub use crate::compute::{ComputeBackend, CpuBackend, Kernel, KernelSource};
#[cfg(feature = "wgpu")]
pub use crate::compute::{Gpu, GpuBackend};

// Configuration
pub use crate::config::{BackendKind, EqualizerConfig};
