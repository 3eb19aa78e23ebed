use std::io;

use crate::compute::Kernel;
use crate::pipeline::PipelineState;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Allocation or host/device transfer failure.
    #[error("Device resource error: {0}")]
    DeviceResource(String),
    /// Kernel source failed to compile. `log` carries the compiler output.
    #[error("Kernel build failed for '{label}':\n{log}")]
    KernelBuild { label: String, log: String },
    #[error("Dispatch of kernel '{kernel}' failed: {reason}")]
    Dispatch { kernel: Kernel, reason: String },
    #[error("Invariant violated after {stage:?}: {reason}")]
    Invariant { stage: PipelineState, reason: String },
    #[error("Invalid image: {0}")]
    InvalidImage(String),
    #[error("Image codec error: {0}")]
    Codec(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("GPU backend unavailable: {0}")]
    GpuUnavailable(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn dispatch(kernel: Kernel, reason: impl Into<String>) -> Self {
        Error::Dispatch {
            kernel,
            reason: reason.into(),
        }
    }
}

impl From<image::ImageError> for Error {
    fn from(e: image::ImageError) -> Self {
        match e {
            image::ImageError::IoError(e) => Error::Io(e),
            e => Error::Codec(e.to_string()),
        }
    }
}

impl From<common::FileExtensionError> for Error {
    fn from(e: common::FileExtensionError) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<common::SerdeFormatError> for Error {
    fn from(e: common::SerdeFormatError) -> Self {
        let detail = std::error::Error::source(&e)
            .map(|source| source.to_string())
            .unwrap_or_default();
        Error::Config(format!("{}: {}", e, detail))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
