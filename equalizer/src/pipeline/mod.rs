//! Host driver sequencing the four equalization stages on a compute backend.

mod buffers;
mod stages;
#[cfg(test)]
mod tests;

use std::fmt;
use std::time::{Duration, Instant};

pub use buffers::BufferRole;
pub use stages::Stage;

use self::buffers::DeviceBuffers;
use crate::common::{Error, Result};
use crate::compute::{ComputeBackend, KernelSource};
use crate::image::GrayImage;
use crate::tables::{CumulativeHistogram, Histogram, Lut, BINS};

/// Progress of the most recent run. `ReprojectionDone` and `Failed` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum PipelineState {
    Init,
    HistogramDone,
    CumulativeDone,
    #[strum(serialize = "LUTDone")]
    LutDone,
    ReprojectionDone,
    Failed,
}

/// Wall-clock time spent in each stage, fence included.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StageTimings {
    pub histogram: Duration,
    pub cumulative: Duration,
    pub lut: Duration,
    pub reprojection: Duration,
}

impl StageTimings {
    pub fn get(&self, stage: Stage) -> Duration {
        match stage {
            Stage::Histogram => self.histogram,
            Stage::Cumulative => self.cumulative,
            Stage::Lut => self.lut,
            Stage::Reprojection => self.reprojection,
        }
    }

    fn record(&mut self, stage: Stage, elapsed: Duration) {
        match stage {
            Stage::Histogram => self.histogram = elapsed,
            Stage::Cumulative => self.cumulative = elapsed,
            Stage::Lut => self.lut = elapsed,
            Stage::Reprojection => self.reprojection = elapsed,
        }
    }

    pub fn total(&self) -> Duration {
        Stage::ALL.iter().map(|&stage| self.get(stage)).sum()
    }
}

impl fmt::Display for StageTimings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for stage in Stage::ALL {
            write!(f, "{}: {:?}, ", stage, self.get(stage))?;
        }
        write!(f, "total: {:?}", self.total())
    }
}

/// Everything a successful run produces.
#[derive(Clone, Debug)]
pub struct Equalization {
    pub histogram: Histogram,
    pub cumulative: CumulativeHistogram,
    pub lut: Lut,
    pub image: GrayImage,
    pub timings: StageTimings,
}

/// Equalization driver. The kernel program is compiled once in [`Pipeline::new`]
/// and every [`Pipeline::run`] allocates and releases its own buffers.
pub struct Pipeline<'a, B: ComputeBackend> {
    backend: &'a B,
    program: B::Program,
    verify: bool,
    state: PipelineState,
}

impl<'a, B: ComputeBackend> Pipeline<'a, B> {
    pub fn new(backend: &'a B) -> Result<Self> {
        let program = backend.compile(&KernelSource::equalization())?;
        log::debug!("Compiled equalization kernels for {}", backend.name());

        Ok(Self {
            backend,
            program,
            verify: false,
            state: PipelineState::Init,
        })
    }

    /// Check the table and output invariants on the host after each run.
    pub fn verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn run(&mut self, image: &GrayImage) -> Result<Equalization> {
        self.state = PipelineState::Init;

        match self.run_stages(image) {
            Ok(equalization) => Ok(equalization),
            Err(e) => {
                log::error!("Equalization failed after {}: {}", self.state, e);
                self.state = PipelineState::Failed;
                Err(e)
            }
        }
    }

    fn run_stages(&mut self, image: &GrayImage) -> Result<Equalization> {
        let pixel_count = image.pixel_count();
        // bins are i32 on the device
        if pixel_count > i32::MAX as usize {
            return Err(Error::InvalidImage(format!(
                "{} pixels overflow the histogram counters",
                pixel_count
            )));
        }

        let buffers = DeviceBuffers::allocate(self.backend, pixel_count)?;
        let zeros = [0i32; BINS];
        buffers.upload(BufferRole::InputImage, image.bytes())?;
        buffers.upload(BufferRole::Histogram, &zeros)?;
        buffers.upload(BufferRole::Cumulative, &zeros)?;
        buffers.upload(BufferRole::Lut, &zeros)?;

        let mut timings = StageTimings::default();
        for stage in Stage::ALL {
            let start = Instant::now();
            stage.run(self.backend, &self.program, &buffers, pixel_count)?;
            timings.record(stage, start.elapsed());

            self.state = stage.completed_state();
            log::debug!("{} ({:?})", self.state, timings.get(stage));
        }

        let mut histogram = [0i32; BINS];
        let mut cumulative = [0i32; BINS];
        let mut lut = [0i32; BINS];
        let mut output = GrayImage::new_black(*image.desc());
        buffers.download(BufferRole::Histogram, &mut histogram)?;
        buffers.download(BufferRole::Cumulative, &mut cumulative)?;
        buffers.download(BufferRole::Lut, &mut lut)?;
        buffers.download(BufferRole::OutputImage, output.bytes_mut())?;

        let equalization = Equalization {
            histogram: Histogram::new(histogram),
            cumulative: CumulativeHistogram::new(cumulative),
            lut: Lut::new(lut),
            image: output,
            timings,
        };

        if self.verify {
            check_invariants(image, &equalization)?;
        }

        Ok(equalization)
    }
}

fn check_invariants(input: &GrayImage, result: &Equalization) -> Result<()> {
    let pixel_count = input.pixel_count();
    let invariant = |stage: PipelineState| {
        move |reason: String| Error::Invariant { stage, reason }
    };

    result
        .histogram
        .check(pixel_count)
        .map_err(invariant(PipelineState::HistogramDone))?;
    result
        .cumulative
        .check(pixel_count)
        .map_err(invariant(PipelineState::CumulativeDone))?;
    result
        .lut
        .check()
        .map_err(invariant(PipelineState::LutDone))?;

    if result.lut.apply(input) != result.image {
        return Err(invariant(PipelineState::ReprojectionDone)(
            "output image is not the lookup table applied to the input".to_string(),
        ));
    }

    Ok(())
}
