use super::buffers::{BufferRole, DeviceBuffers};
use super::PipelineState;
use crate::common::Result;
use crate::compute::{ComputeBackend, Kernel};
use crate::tables::BINS;

/// One step of the pipeline: a kernel bound to its buffers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum Stage {
    Histogram,
    Cumulative,
    Lut,
    Reprojection,
}

impl Stage {
    /// Dependency order; each stage reads what the previous one wrote.
    pub const ALL: [Stage; 4] = [
        Stage::Histogram,
        Stage::Cumulative,
        Stage::Lut,
        Stage::Reprojection,
    ];

    pub fn kernel(self) -> Kernel {
        match self {
            Stage::Histogram => Kernel::Histogram,
            Stage::Cumulative => Kernel::Cumulative,
            Stage::Lut => Kernel::Lut,
            Stage::Reprojection => Kernel::Reproject,
        }
    }

    pub fn arguments(self) -> &'static [BufferRole] {
        use BufferRole::*;

        match self {
            Stage::Histogram => &[InputImage, Histogram],
            Stage::Cumulative => &[Histogram, Cumulative],
            Stage::Lut => &[Cumulative, Lut],
            Stage::Reprojection => &[InputImage, Lut, OutputImage],
        }
    }

    /// Work-items per dispatch, counted in elements.
    pub fn problem_size(self, pixel_count: usize) -> usize {
        match self {
            Stage::Histogram | Stage::Reprojection => pixel_count,
            Stage::Cumulative | Stage::Lut => BINS,
        }
    }

    pub fn completed_state(self) -> PipelineState {
        match self {
            Stage::Histogram => PipelineState::HistogramDone,
            Stage::Cumulative => PipelineState::CumulativeDone,
            Stage::Lut => PipelineState::LutDone,
            Stage::Reprojection => PipelineState::ReprojectionDone,
        }
    }

    /// Dispatches the stage and fences, so its writes are visible to the next one.
    pub(crate) fn run<B: ComputeBackend>(
        self,
        backend: &B,
        program: &B::Program,
        buffers: &DeviceBuffers<'_, B>,
        pixel_count: usize,
    ) -> Result<()> {
        let args: Vec<&B::Buffer> = self
            .arguments()
            .iter()
            .map(|&role| buffers.get(role))
            .collect();

        backend.dispatch(program, self.kernel(), &args, self.problem_size(pixel_count))?;
        backend.synchronize()
    }
}
