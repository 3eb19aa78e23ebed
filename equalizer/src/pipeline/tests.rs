use rand::{Rng, SeedableRng};
use strum::IntoEnumIterator;

use super::*;
use crate::compute::{
    BufferDesc, CpuBackend, CpuBuffer, CpuProgram, ElementType, Kernel, KernelSource,
};
use crate::tables::Lut;

fn run_cpu(image: &GrayImage) -> Equalization {
    let backend = CpuBackend::new();
    let mut pipeline = Pipeline::new(&backend).unwrap().verify(true);
    let result = pipeline.run(image).unwrap();
    assert_eq!(pipeline.state(), PipelineState::ReprojectionDone);
    result
}

#[test]
fn evenly_spread_image_is_unchanged() {
    let image = GrayImage::new(2, 2, vec![0, 85, 170, 255]).unwrap();
    let result = run_cpu(&image);

    for level in [0u8, 85, 170, 255] {
        assert_eq!(result.histogram.get(level), 1);
    }
    assert_eq!(result.histogram.total(), 4);
    assert_eq!(
        [0, 85, 170, 255].map(|level| result.cumulative.get(level)),
        [1, 2, 3, 4]
    );
    assert_eq!(
        [0, 85, 170, 255].map(|level| result.lut.get(level)),
        [0, 85, 170, 255]
    );
    assert_eq!(result.image, image);
}

#[test]
fn constant_image_uses_identity_lut() {
    let image = GrayImage::new(8, 4, vec![128; 32]).unwrap();
    let result = run_cpu(&image);

    assert_eq!(result.histogram.get(128), 32);
    assert_eq!(result.histogram.total(), 32);
    assert!(result.cumulative.bins()[128..].iter().all(|&v| v == 32));
    assert_eq!(result.lut, Lut::identity());
    assert_eq!(result.image, image);
}

#[test]
fn single_pixel_image() {
    let image = GrayImage::new(1, 1, vec![200]).unwrap();
    let result = run_cpu(&image);

    assert_eq!(result.cumulative.total(), 1);
    assert_eq!(result.lut, Lut::identity());
    assert_eq!(result.image, image);
}

#[test]
fn empty_image_is_valid() {
    let image = GrayImage::new(0, 0, vec![]).unwrap();
    let result = run_cpu(&image);

    assert_eq!(result.histogram.bins(), &[0; BINS]);
    assert_eq!(result.cumulative.bins(), &[0; BINS]);
    assert_eq!(result.lut, Lut::identity());
    assert_eq!(result.image.pixel_count(), 0);
}

#[test]
fn random_images_match_host_reference() {
    let mut rng = rand::rngs::StdRng::seed_from_u64(0x5eed);
    let backend = CpuBackend::new();
    let mut pipeline = Pipeline::new(&backend).unwrap().verify(true);

    for _ in 0..8 {
        let width = rng.random_range(16..300);
        let height = rng.random_range(16..200);
        let low = rng.random_range(0..128u8);
        let high = rng.random_range(128..=255u8);
        let bytes = (0..width * height)
            .map(|_| rng.random_range(low..=high))
            .collect();
        let image = GrayImage::new(width, height, bytes).unwrap();

        let result = pipeline.run(&image).unwrap();
        let histogram = Histogram::of(&image);
        let cumulative = histogram.cumulative();
        let lut = cumulative.lut();

        assert_eq!(result.histogram, histogram);
        assert_eq!(result.cumulative, cumulative);
        assert_eq!(result.lut, lut);
        assert_eq!(result.image, lut.apply(&image));
        assert_eq!(result.lut.get(low), 0);
        assert_eq!(result.lut.get(high), 255);
    }
}

#[test]
fn uniform_histogram_is_a_fixed_point() {
    // every level appears four times
    let bytes: Vec<u8> = (0..4).flat_map(|_| 0..=255u8).collect();
    let image = GrayImage::new(256, 4, bytes).unwrap();

    let first = run_cpu(&image);
    for (&out, &input) in first.image.bytes().iter().zip(image.bytes()) {
        assert!((out as i32 - input as i32).abs() <= 1, "{} -> {}", input, out);
    }

    let second = run_cpu(&first.image);
    assert_eq!(second.image, first.image);
}

#[test]
fn pipeline_is_reusable() {
    let backend = CpuBackend::new();
    let mut pipeline = Pipeline::new(&backend).unwrap();
    assert_eq!(pipeline.state(), PipelineState::Init);

    let dark = GrayImage::new(2, 2, vec![10, 10, 20, 30]).unwrap();
    let bright = GrayImage::new(2, 1, vec![250, 255]).unwrap();

    let first = pipeline.run(&dark).unwrap();
    let second = pipeline.run(&bright).unwrap();

    assert_eq!(first.image.bytes(), &[0, 0, 128, 255]);
    assert_eq!(second.image.bytes(), &[0, 255]);
    assert_eq!(second.histogram.total(), 2);
}

#[test]
fn buffer_roles_are_sized_by_elements() {
    for role in BufferRole::iter() {
        let desc = role.desc(1000);
        match role {
            BufferRole::InputImage | BufferRole::OutputImage => {
                assert_eq!(desc.elem, ElementType::U8);
                assert_eq!(desc.len, 1000);
            }
            BufferRole::Histogram | BufferRole::Cumulative | BufferRole::Lut => {
                assert_eq!(desc.elem, ElementType::I32);
                assert_eq!(desc.len, BINS);
                assert_eq!(desc.size_in_bytes().unwrap(), BINS * 4);
            }
        }
    }
    assert_eq!(Stage::Cumulative.problem_size(1000), BINS);
    assert_eq!(Stage::Reprojection.problem_size(1000), 1000);
}

#[derive(Clone, Copy)]
enum Fault {
    /// Dispatch returns an error.
    Fail(Kernel),
    /// Dispatch silently does nothing.
    Skip(Kernel),
}

/// CPU backend with one broken kernel.
struct FaultyBackend {
    inner: CpuBackend,
    fault: Fault,
}

impl ComputeBackend for FaultyBackend {
    type Buffer = CpuBuffer;
    type Program = CpuProgram;

    fn name(&self) -> String {
        "faulty".to_string()
    }

    fn compile(&self, source: &KernelSource) -> Result<CpuProgram> {
        self.inner.compile(source)
    }

    fn allocate(&self, desc: BufferDesc) -> Result<CpuBuffer> {
        self.inner.allocate(desc)
    }

    fn buffer_desc<'b>(&self, buffer: &'b CpuBuffer) -> &'b BufferDesc {
        self.inner.buffer_desc(buffer)
    }

    fn write(&self, buffer: &CpuBuffer, offset: usize, data: &[u8]) -> Result<()> {
        self.inner.write(buffer, offset, data)
    }

    fn read(&self, buffer: &CpuBuffer, offset: usize, out: &mut [u8]) -> Result<()> {
        self.inner.read(buffer, offset, out)
    }

    fn dispatch(
        &self,
        program: &CpuProgram,
        kernel: Kernel,
        args: &[&CpuBuffer],
        problem_size: usize,
    ) -> Result<()> {
        match self.fault {
            Fault::Fail(broken) if broken == kernel => {
                Err(Error::dispatch(kernel, "device lost"))
            }
            Fault::Skip(broken) if broken == kernel => Ok(()),
            _ => self.inner.dispatch(program, kernel, args, problem_size),
        }
    }

    fn synchronize(&self) -> Result<()> {
        self.inner.synchronize()
    }
}

#[test]
fn stage_failure_leaves_pipeline_failed() {
    let backend = FaultyBackend {
        inner: CpuBackend::new(),
        fault: Fault::Fail(Kernel::Lut),
    };
    let mut pipeline = Pipeline::new(&backend).unwrap();
    let image = GrayImage::new(2, 2, vec![1, 2, 3, 4]).unwrap();

    match pipeline.run(&image) {
        Err(Error::Dispatch { kernel, reason }) => {
            assert_eq!(kernel, Kernel::Lut);
            assert_eq!(reason, "device lost");
        }
        other => panic!("expected dispatch error, got {:?}", other.map(|r| r.image)),
    }
    assert_eq!(pipeline.state(), PipelineState::Failed);
}

#[test]
fn verification_catches_missing_stage_output() {
    let backend = FaultyBackend {
        inner: CpuBackend::new(),
        fault: Fault::Skip(Kernel::Histogram),
    };
    let image = GrayImage::new(2, 2, vec![1, 2, 3, 4]).unwrap();

    let mut unchecked = Pipeline::new(&backend).unwrap();
    assert!(unchecked.run(&image).is_ok());
    assert_eq!(unchecked.state(), PipelineState::ReprojectionDone);

    let mut checked = Pipeline::new(&backend).unwrap().verify(true);
    match checked.run(&image) {
        Err(Error::Invariant { stage, .. }) => assert_eq!(stage, PipelineState::HistogramDone),
        other => panic!("expected invariant error, got {:?}", other.map(|r| r.image)),
    }
    assert_eq!(checked.state(), PipelineState::Failed);
}

#[test]
fn state_names_follow_stage_order() {
    let states: Vec<String> = Stage::ALL
        .iter()
        .map(|stage| stage.completed_state().to_string())
        .collect();
    assert_eq!(
        states,
        ["HistogramDone", "CumulativeDone", "LUTDone", "ReprojectionDone"]
    );
}
