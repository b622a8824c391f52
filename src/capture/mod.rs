//! Screen capture functionality for the Hall of Fame view.
//!
//! This module provides:
//! - Screen geometry (`ScreenRect`, `CropBox`)
//! - The `CaptureSource` seam the scan engine grabs frames through
//! - Window discovery and crop insets (`window`)
//! - GDI screen capture on Windows (`screen`)

#[cfg(windows)]
pub mod screen;
pub mod window;

use anyhow::Result;
use image::RgbImage;

#[cfg(windows)]
pub use screen::ScreenCapture;
pub use window::{crop_box_for, resolve_capture_rect};

/// A rectangle in absolute screen coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScreenRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl ScreenRect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }
}

impl std::fmt::Display for ScreenRect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}, {}, {}, {}) {}x{}",
            self.left,
            self.top,
            self.right,
            self.bottom,
            self.width(),
            self.height()
        )
    }
}

/// Border insets removed from each side of a raw capture.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CropBox {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

/// Produces a raw bitmap of a screen rectangle.
///
/// A failed grab means the run cannot continue.
pub trait CaptureSource {
    fn grab(&mut self, rect: &ScreenRect) -> Result<RgbImage>;
}
