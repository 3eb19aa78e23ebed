use std::sync::atomic::{AtomicI32, Ordering};

use common::parallel::{auto_chunk_size, ParChunksAuto};
use rayon::prelude::*;

use crate::tables::Normalization;

/// Adds one count per pixel to `bins`, keeping whatever the bins already held.
pub(super) fn histogram(image: &[u8], bins: &mut [i32]) {
    let counters: Vec<AtomicI32> = bins.iter().map(|&count| AtomicI32::new(count)).collect();

    image.par_chunks_auto().for_each(|chunk| {
        for &pixel in chunk {
            counters[pixel as usize].fetch_add(1, Ordering::Relaxed);
        }
    });

    for (bin, counter) in bins.iter_mut().zip(counters) {
        *bin = counter.into_inner();
    }
}

/// Inclusive prefix sum.
pub(super) fn cumulative(histogram: &[i32], cumulative: &mut [i32]) {
    let mut running = 0i32;
    for (out, &count) in cumulative.iter_mut().zip(histogram) {
        running = running.wrapping_add(count);
        *out = running;
    }
}

pub(super) fn lut_scale(cumulative: &[i32], lut: &mut [i32]) {
    let normalization = Normalization::from_cumulative(cumulative);

    lut.par_iter_mut()
        .zip(cumulative.par_iter())
        .enumerate()
        .for_each(|(level, (out, &ch))| *out = normalization.level(level, ch));
}

pub(super) fn reproject(image: &[u8], lut: &[i32], output: &mut [u8]) {
    let chunk_size = auto_chunk_size(image.len());

    output
        .par_chunks_mut(chunk_size)
        .zip(image.par_chunks(chunk_size))
        .for_each(|(out, input)| {
            for (o, &pixel) in out.iter_mut().zip(input) {
                *o = lut[pixel as usize].clamp(0, 255) as u8;
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::BINS;

    #[test]
    fn histogram_counts_every_pixel() {
        let image: Vec<u8> = (0..10_000u32).map(|i| (i % 7) as u8).collect();
        let mut bins = vec![0; BINS];

        histogram(&image, &mut bins);

        assert_eq!(bins.iter().sum::<i32>(), 10_000);
        assert_eq!(bins[0], 1429);
        assert_eq!(bins[6], 1428);
        assert!(bins[7..].iter().all(|&b| b == 0));
    }

    #[test]
    fn histogram_accumulates_onto_existing_counts() {
        let mut bins = vec![0; BINS];
        bins[3] = 5;

        histogram(&[3, 3, 4], &mut bins);

        assert_eq!(bins[3], 7);
        assert_eq!(bins[4], 1);
    }

    #[test]
    fn histogram_of_empty_image_is_zero() {
        let mut bins = vec![0; BINS];
        histogram(&[], &mut bins);
        assert!(bins.iter().all(|&b| b == 0));
    }

    #[test]
    fn cumulative_is_inclusive() {
        let mut out = [0; 5];
        cumulative(&[1, 0, 2, 3, 0], &mut out);
        assert_eq!(out, [1, 1, 3, 6, 6]);
    }

    #[test]
    fn reproject_maps_through_lut() {
        let lut: Vec<i32> = (0..BINS as i32).map(|level| 255 - level).collect();
        let image = [0u8, 1, 128, 255];
        let mut output = [0u8; 4];

        reproject(&image, &lut, &mut output);

        assert_eq!(output, [255, 254, 127, 0]);
    }
}
