//! Change detection via histogram comparison.
//!
//! A snapshot's fingerprint is its per-channel intensity histogram. Comparing
//! histograms instead of pixels ignores sub-pixel jitter and anti-aliasing
//! while still reacting to a new icon anywhere in the panel.

use anyhow::{bail, Result};
use image::RgbImage;

/// Bins per channel.
const BINS: usize = 256;

/// Histogram length: R, G and B bins concatenated.
pub const HISTOGRAM_LEN: usize = BINS * 3;

/// One cropped and masked view of the Hall of Fame panel.
#[derive(Clone, Debug)]
pub struct Snapshot {
    image: RgbImage,
    histogram: Vec<u32>,
}

impl Snapshot {
    pub fn new(image: RgbImage) -> Self {
        let histogram = channel_histogram(&image);
        Self { image, histogram }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn histogram(&self) -> &[u32] {
        &self.histogram
    }
}

/// Counts how often each value occurs in each channel.
///
/// Layout: `[0..256)` red, `[256..512)` green, `[512..768)` blue.
pub fn channel_histogram(img: &RgbImage) -> Vec<u32> {
    let mut histogram = vec![0u32; HISTOGRAM_LEN];
    for pixel in img.pixels() {
        histogram[pixel[0] as usize] += 1;
        histogram[BINS + pixel[1] as usize] += 1;
        histogram[2 * BINS + pixel[2] as usize] += 1;
    }
    histogram
}

/// Root-mean-square distance between two histograms.
pub fn histogram_rms(h1: &[u32], h2: &[u32]) -> f64 {
    if h1.is_empty() {
        return 0.0;
    }
    let sum: f64 = h1
        .iter()
        .zip(h2)
        .map(|(&a, &b)| {
            let d = a as f64 - b as f64;
            d * d
        })
        .sum();
    (sum / h1.len() as f64).sqrt()
}

/// Scores how different two snapshots look. 0.0 means identical histograms.
///
/// Both snapshots must come from the same crop; differently sized inputs are
/// rejected.
pub fn difference_score(a: &Snapshot, b: &Snapshot) -> Result<f64> {
    if a.dimensions() != b.dimensions() {
        bail!(
            "Snapshot size mismatch: {:?} vs {:?}",
            a.dimensions(),
            b.dimensions()
        );
    }
    Ok(histogram_rms(a.histogram(), b.histogram()))
}
