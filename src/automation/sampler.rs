//! Frame sampling: capture, crop and mask one view of the player panel.

use anyhow::{anyhow, bail, Context, Result};
use image::imageops::{self, FilterType};
use image::{GrayImage, Rgb, RgbImage};
use std::path::Path;
use std::sync::Arc;

use crate::automation::detection::Snapshot;
use crate::automation::diagnostics::{FrameStage, ScanObserver};
use crate::capture::{CaptureSource, CropBox, ScreenRect};

/// Grayscale mask; 255 keeps the panel pixel, 0 blacks it out.
#[derive(Clone, Debug)]
pub struct Mask {
    image: GrayImage,
}

impl Mask {
    #[cfg(test)]
    pub fn new(image: GrayImage) -> Self {
        Self { image }
    }

    /// Loads a mask image and scales it to the crop size.
    pub fn load(path: &Path, size: (u32, u32)) -> Result<Self> {
        let image = image::open(path)
            .with_context(|| format!("Failed to open mask {}", path.display()))?
            .to_luma8();
        let image = if image.dimensions() == size {
            image
        } else {
            imageops::resize(&image, size.0, size.1, FilterType::Triangle)
        };
        Ok(Self { image })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Composites `crop` over a black background using the mask as alpha.
    pub fn apply(&self, crop: &RgbImage) -> Result<RgbImage> {
        if crop.dimensions() != self.image.dimensions() {
            bail!(
                "Mask is {:?} but crop is {:?}",
                self.image.dimensions(),
                crop.dimensions()
            );
        }
        let mut out = RgbImage::new(crop.width(), crop.height());
        for ((dst, src), m) in out.pixels_mut().zip(crop.pixels()).zip(self.image.pixels()) {
            let alpha = m[0] as u32;
            let blend = |c: u8| ((c as u32 * alpha + 127) / 255) as u8;
            *dst = Rgb([blend(src[0]), blend(src[1]), blend(src[2])]);
        }
        Ok(out)
    }
}

/// Loads the mask for `crop_size`, or warns and returns `None` so the scan
/// can continue unmasked.
pub fn load_mask(path: &Path, crop_size: (u32, u32), observer: &dyn ScanObserver) -> Option<Mask> {
    match Mask::load(path, crop_size) {
        Ok(mask) => {
            let (w, h) = mask.dimensions();
            observer.debug(&format!("Mask loaded from {} ({}x{})", path.display(), w, h));
            Some(mask)
        }
        Err(e) => {
            observer.warn(&format!("Problem with mask - {:#}", e));
            None
        }
    }
}

/// Crops the player panel out of a raw capture and applies the mask.
#[derive(Clone, Debug)]
pub struct RegionExtractor {
    crop: CropBox,
    mask: Option<Mask>,
}

impl RegionExtractor {
    pub fn new(crop: CropBox) -> Self {
        Self { crop, mask: None }
    }

    pub fn with_mask(mut self, mask: Option<Mask>) -> Self {
        self.mask = mask;
        self
    }

    pub fn is_masked(&self) -> bool {
        self.mask.is_some()
    }

    /// Size of the panel cut out of a `raw_size` capture.
    pub fn cropped_size(&self, raw_size: (u32, u32)) -> Result<(u32, u32)> {
        let (w, h) = raw_size;
        let c = &self.crop;
        let width = w
            .checked_sub(c.left + c.right)
            .filter(|&v| v > 0)
            .ok_or_else(|| anyhow!("Crop insets {:?} do not fit a {}x{} capture", c, w, h))?;
        let height = h
            .checked_sub(c.top + c.bottom)
            .filter(|&v| v > 0)
            .ok_or_else(|| anyhow!("Crop insets {:?} do not fit a {}x{} capture", c, w, h))?;
        Ok((width, height))
    }

    /// Removes the crop insets from a raw capture.
    pub fn crop(&self, raw: &RgbImage) -> Result<RgbImage> {
        let (width, height) = self.cropped_size(raw.dimensions())?;
        Ok(imageops::crop_imm(raw, self.crop.left, self.crop.top, width, height).to_image())
    }

    /// Crops and, when a mask is present, masks a raw capture.
    pub fn extract(&self, raw: &RgbImage, observer: &dyn ScanObserver) -> Result<RgbImage> {
        let cropped = self.crop(raw)?;
        observer.frame(FrameStage::Cropped, &cropped);

        match &self.mask {
            Some(mask) => {
                let masked = mask.apply(&cropped)?;
                observer.frame(FrameStage::Masked, &masked);
                Ok(masked)
            }
            None => Ok(cropped),
        }
    }
}

/// Produces one `Snapshot` of the configured screen rectangle per call.
pub struct FrameSampler {
    source: Box<dyn CaptureSource>,
    rect: ScreenRect,
    extractor: RegionExtractor,
    observer: Arc<dyn ScanObserver>,
}

impl FrameSampler {
    pub fn new(
        source: Box<dyn CaptureSource>,
        rect: ScreenRect,
        extractor: RegionExtractor,
        observer: Arc<dyn ScanObserver>,
    ) -> Self {
        if !extractor.is_masked() {
            observer.warn("Masking unavailable - comparing unmasked panel");
        }
        Self {
            source,
            rect,
            extractor,
            observer,
        }
    }

    /// Captures, crops and masks the current view.
    pub fn sample(&mut self) -> Result<Snapshot> {
        let raw = self
            .source
            .grab(&self.rect)
            .with_context(|| format!("Screen capture of {} failed", self.rect))?;
        self.observer.frame(FrameStage::Raw, &raw);
        let panel = self.extractor.extract(&raw, self.observer.as_ref())?;
        Ok(Snapshot::new(panel))
    }
}
