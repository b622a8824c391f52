//! Diagnostics hooks for the frame sampler and scan loop.
//!
//! The scan core never logs or writes debug images directly; it reports to a
//! `ScanObserver`. `NoopObserver` discards everything, `ConsoleObserver` is
//! what the executable uses.

use image::RgbImage;
use std::path::PathBuf;

use crate::automation::state::{Position, StopReason};

/// Intermediate images produced while sampling one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStage {
    /// Full capture of the game rectangle
    Raw,
    /// Player panel after applying the crop insets
    Cropped,
    /// Cropped panel composited through the mask
    Masked,
}

impl FrameStage {
    fn file_name(self) -> &'static str {
        match self {
            FrameStage::Raw => "raw_img_debug.png",
            FrameStage::Cropped => "crop_img_debug.png",
            FrameStage::Masked => "masked_final_img_debug.png",
        }
    }
}

/// Outcome of one evaluated position.
#[derive(Clone, Debug)]
pub struct StepReport<'a> {
    /// Position that was evaluated
    pub position: Position,
    /// Number of steps completed before this one
    pub step: u32,
    /// Largest pairwise difference seen for this position
    pub max_diff: f64,
    /// All positions found so far, including this one if it was flagged
    pub found: &'a [Position],
}

/// Receives progress and debug output from the scan.
///
/// Every method defaults to doing nothing.
pub trait ScanObserver {
    fn debug(&self, _message: &str) {}

    fn warn(&self, _message: &str) {}

    fn frame(&self, _stage: FrameStage, _image: &RgbImage) {}

    fn countdown(&self, _start: Position, _seconds_left: u32) {}

    fn step_finished(&self, _report: &StepReport<'_>) {}

    fn position_found(&self, _position: Position) {}

    fn stopped(&self, _reason: StopReason, _found: &[Position]) {}
}

/// Discards all diagnostics.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ScanObserver for NoopObserver {}

/// Writes progress to the console/log file and, in debug mode, dumps the
/// intermediate frames into a directory.
#[derive(Debug, Clone)]
pub struct ConsoleObserver {
    debug: bool,
    dump_dir: Option<PathBuf>,
}

impl ConsoleObserver {
    pub fn new(debug: bool, dump_dir: Option<PathBuf>) -> Self {
        Self { debug, dump_dir }
    }
}

impl ScanObserver for ConsoleObserver {
    fn debug(&self, message: &str) {
        if self.debug {
            crate::log(&format!("[DEBUG] {}", message));
        }
    }

    fn warn(&self, message: &str) {
        crate::log(&format!("Warning: {}", message));
    }

    fn frame(&self, stage: FrameStage, image: &RgbImage) {
        let Some(dir) = &self.dump_dir else {
            return;
        };
        let path = dir.join(stage.file_name());
        if let Err(e) = image.save(&path) {
            crate::log(&format!(
                "Warning: Could not save debug image {}: {}",
                path.display(),
                e
            ));
        }
    }

    fn countdown(&self, start: Position, seconds_left: u32) {
        crate::log(&format!(
            "Click into game to player on HoF position {} in next {} seconds!",
            start, seconds_left
        ));
    }

    fn step_finished(&self, report: &StepReport<'_>) {
        if report.step % 100 == 0 {
            crate::log("Press and hold 'q', 'z' or 'esc' to exit program");
        }
        crate::log(&format!(
            "Pos: {}\tDiff: {:.2}\tFound: {:?}",
            report.position, report.max_diff, report.found
        ));
    }

    fn position_found(&self, position: Position) {
        crate::log(&format!(
            "Player with missing item found! Position: {}",
            position
        ));
    }

    fn stopped(&self, reason: StopReason, found: &[Position]) {
        crate::log(&format!("Scan stopped: {}", reason));
        if found.is_empty() {
            crate::log("0 players found :(");
        } else {
            crate::log(&format!(
                "{} players with items to scrapbook found",
                found.len()
            ));
            crate::log(&format!("Player's Hall of Fame positions: {:?}", found));
        }
    }
}
