use rand::{Rng, SeedableRng};

use super::*;
use crate::compute::{BufferAccess, CpuBackend, ElementType};
use crate::image::GrayImage;
use crate::pipeline::Pipeline;

fn test_gpu() -> Option<GpuBackend> {
    match GpuBackend::new() {
        Ok(backend) => Some(backend),
        Err(e) => {
            eprintln!("Skipping GPU test: {}", e);
            None
        }
    }
}

fn random_image(width: u32, height: u32, seed: u64) -> GrayImage {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let bytes = (0..width * height)
        .map(|_| rng.random_range(40..=200u8))
        .collect();
    GrayImage::new(width, height, bytes).unwrap()
}

#[test]
fn gpu_matches_cpu() {
    let Some(gpu) = test_gpu() else {
        return;
    };
    let cpu = CpuBackend::new();

    let mut gpu_pipeline = Pipeline::new(&gpu).unwrap();
    let mut cpu_pipeline = Pipeline::new(&cpu).unwrap();

    let images = [
        GrayImage::new(2, 2, vec![0, 85, 170, 255]).unwrap(),
        GrayImage::new(3, 3, vec![128; 9]).unwrap(),
        GrayImage::new(1, 1, vec![7]).unwrap(),
        GrayImage::new(0, 0, vec![]).unwrap(),
        // pixel count not a multiple of four
        random_image(37, 23, 1),
        random_image(640, 480, 2),
    ];

    for image in &images {
        let on_gpu = gpu_pipeline.run(image).unwrap();
        let on_cpu = cpu_pipeline.run(image).unwrap();

        assert_eq!(on_gpu.histogram, on_cpu.histogram, "{:?}", image.desc());
        assert_eq!(on_gpu.cumulative, on_cpu.cumulative, "{:?}", image.desc());
        // f32 division on the device is not correctly rounded, so a level
        // landing exactly on .5 may round down instead of up
        for (level, (&gpu_level, &cpu_level)) in on_gpu
            .lut
            .bins()
            .iter()
            .zip(on_cpu.lut.bins())
            .enumerate()
        {
            assert!(
                (gpu_level - cpu_level).abs() <= 1,
                "level {} of {:?}: gpu={}, cpu={}",
                level,
                image.desc(),
                gpu_level,
                cpu_level
            );
        }
        assert!(on_gpu.lut.check().is_ok());
        assert_eq!(on_gpu.image, on_gpu.lut.apply(image), "{:?}", image.desc());
    }
}

#[test]
fn invalid_wgsl_reports_build_log() {
    let Some(gpu) = test_gpu() else {
        return;
    };

    let source = KernelSource::new("broken").with_kernel(Kernel::Histogram, "fn hist( {");
    let err = gpu.compile(&source).unwrap_err();

    match err {
        Error::KernelBuild { label, log } => {
            assert_eq!(label, "broken");
            assert!(log.starts_with("hist:"), "{}", log);
        }
        e => panic!("unexpected error: {}", e),
    }
}

#[test]
fn unaligned_tail_round_trips() {
    let Some(gpu) = test_gpu() else {
        return;
    };

    let desc = BufferDesc::new("tail", ElementType::U8, 5, BufferAccess::ReadWrite);
    let buffer = gpu.allocate(desc).unwrap();
    gpu.write(&buffer, 0, &[1, 2, 3, 4, 5]).unwrap();

    let mut all = [0u8; 5];
    gpu.read(&buffer, 0, &mut all).unwrap();
    assert_eq!(all, [1, 2, 3, 4, 5]);

    let mut middle = [0u8; 3];
    gpu.read(&buffer, 1, &mut middle).unwrap();
    assert_eq!(middle, [2, 3, 4]);

    // a short write that does not reach the end cannot be padded safely
    assert!(matches!(
        gpu.write(&buffer, 0, &[9, 9]),
        Err(Error::DeviceResource(_))
    ));
}

#[test]
fn workgroup_grid_splits_large_dispatches() {
    assert_eq!(workgroup_grid(0, 65535), (0, 1));
    assert_eq!(workgroup_grid(1, 65535), (1, 1));
    assert_eq!(workgroup_grid(256, 65535), (1, 1));
    assert_eq!(workgroup_grid(257, 65535), (2, 1));
    assert_eq!(workgroup_grid(256 * 10, 4), (4, 3));
}

#[test]
fn reproject_runs_one_invocation_per_word() {
    assert_eq!(invocations(Kernel::Reproject, 0), 0);
    assert_eq!(invocations(Kernel::Reproject, 5), 2);
    assert_eq!(invocations(Kernel::Reproject, 8), 2);
    assert_eq!(invocations(Kernel::Histogram, 5), 5);
    assert_eq!(invocations(Kernel::Cumulative, 256), 256);
}
