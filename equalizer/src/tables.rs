//! Host-side views of the three 256-entry tables the pipeline produces.

use std::fmt;

use crate::image::GrayImage;

/// Number of intensity levels of an 8-bit image.
pub const BINS: usize = 256;

pub type Bins = [i32; BINS];

macro_rules! bin_table {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq)]
        pub struct $name {
            bins: Bins,
        }

        impl $name {
            pub fn new(bins: Bins) -> Self {
                Self { bins }
            }

            pub fn bins(&self) -> &Bins {
                &self.bins
            }

            pub fn get(&self, level: u8) -> i32 {
                self.bins[level as usize]
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "[")?;
                for (index, value) in self.bins.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", value)?;
                }
                write!(f, "]")
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", stringify!($name), self)
            }
        }
    };
}

bin_table!(
    /// Count of pixels per intensity level.
    Histogram
);
bin_table!(
    /// Inclusive prefix sum of a [`Histogram`].
    CumulativeHistogram
);
bin_table!(
    /// Intensity remapping table.
    Lut
);

fn is_non_decreasing(bins: &Bins) -> bool {
    bins.windows(2).all(|pair| pair[0] <= pair[1])
}

impl Histogram {
    /// Host reference computation.
    pub fn of(image: &GrayImage) -> Self {
        let mut bins = [0; BINS];
        for &pixel in image.bytes() {
            bins[pixel as usize] += 1;
        }
        Self { bins }
    }

    pub fn total(&self) -> i64 {
        self.bins.iter().map(|&count| count as i64).sum()
    }

    pub fn check(&self, pixel_count: usize) -> Result<(), String> {
        if let Some(level) = self.bins.iter().position(|&count| count < 0) {
            return Err(format!("bin {} holds a negative count", level));
        }
        if self.total() != pixel_count as i64 {
            return Err(format!(
                "bins sum to {} but the image has {} pixels",
                self.total(),
                pixel_count
            ));
        }
        Ok(())
    }

    /// Host reference computation.
    pub fn cumulative(&self) -> CumulativeHistogram {
        let mut bins = [0; BINS];
        let mut running = 0;
        for (out, &count) in bins.iter_mut().zip(&self.bins) {
            running += count;
            *out = running;
        }
        CumulativeHistogram { bins }
    }
}

impl CumulativeHistogram {
    /// Number of pixels at or below the top level.
    pub fn total(&self) -> i32 {
        self.bins[BINS - 1]
    }

    pub fn is_non_decreasing(&self) -> bool {
        is_non_decreasing(&self.bins)
    }

    pub fn check(&self, pixel_count: usize) -> Result<(), String> {
        if !self.is_non_decreasing() {
            return Err("cumulative histogram decreases".to_string());
        }
        if self.total() as i64 != pixel_count as i64 {
            return Err(format!(
                "last bin is {} but the image has {} pixels",
                self.total(),
                pixel_count
            ));
        }
        Ok(())
    }

    pub fn normalization(&self) -> Normalization {
        Normalization::from_cumulative(&self.bins)
    }

    /// Host reference computation.
    pub fn lut(&self) -> Lut {
        let normalization = self.normalization();
        let mut bins = [0; BINS];
        for (level, (out, &ch)) in bins.iter_mut().zip(&self.bins).enumerate() {
            *out = normalization.level(level, ch);
        }
        Lut { bins }
    }
}

impl Lut {
    pub fn identity() -> Self {
        let mut bins = [0; BINS];
        for (level, out) in bins.iter_mut().enumerate() {
            *out = level as i32;
        }
        Self { bins }
    }

    pub fn is_non_decreasing(&self) -> bool {
        is_non_decreasing(&self.bins)
    }

    pub fn check(&self) -> Result<(), String> {
        if let Some(level) = self.bins.iter().position(|v| !(0..=255).contains(v)) {
            return Err(format!(
                "entry {} is {}, outside [0, 255]",
                level, self.bins[level]
            ));
        }
        if !self.is_non_decreasing() {
            return Err("lookup table inverts intensity order".to_string());
        }
        Ok(())
    }

    /// Host reference computation.
    pub fn apply(&self, image: &GrayImage) -> GrayImage {
        let mut output = GrayImage::new_black(*image.desc());
        for (out, &pixel) in output.bytes_mut().iter_mut().zip(image.bytes()) {
            *out = self.bins[pixel as usize].clamp(0, 255) as u8;
        }
        output
    }
}

/// Equalization scale derived from a cumulative histogram.
///
/// `ch_min` is the smallest non-zero cumulative value. When every pixel
/// shares one level (or there are none) `ch_min == total` and the mapping
/// is the identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Normalization {
    pub ch_min: i32,
    pub total: i32,
}

impl Normalization {
    pub fn from_cumulative(cumulative: &[i32]) -> Self {
        let total = cumulative.last().copied().unwrap_or(0);
        let ch_min = cumulative
            .iter()
            .copied()
            .find(|&value| value != 0)
            .unwrap_or(total);

        Self { ch_min, total }
    }

    pub fn is_degenerate(&self) -> bool {
        self.total == self.ch_min
    }

    /// Remapped level, half-up rounded in f32. The scale by 255 comes before the
    /// only division so the WGSL kernel rounds the same value.
    pub fn level(&self, level: usize, ch: i32) -> i32 {
        if self.is_degenerate() {
            return level as i32;
        }

        let scaled = (ch - self.ch_min) as f32 * 255.0 / (self.total - self.ch_min) as f32;
        ((scaled + 0.5).floor() as i32).clamp(0, 255)
    }
}
