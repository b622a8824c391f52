//! Auto stop when findings pile up in an implausible pattern.
//!
//! A misaligned mask or a UI change makes every position look "found". The
//! guard compares the oldest and newest entry of the trailing window of
//! findings and stops the scan once their distance exceeds `max_span`.

use crate::automation::config::AnomalyConfig;
use crate::automation::state::Position;

#[derive(Clone, Debug, PartialEq)]
pub struct AnomalyGuard {
    min_findings: usize,
    window: usize,
    max_span: Position,
}

impl Default for AnomalyGuard {
    fn default() -> Self {
        Self::new(&AnomalyConfig::default())
    }
}

impl AnomalyGuard {
    pub fn new(config: &AnomalyConfig) -> Self {
        Self {
            min_findings: config.min_findings,
            window: config.window.max(1),
            max_span: config.max_span,
        }
    }

    /// Returns true when the scan should stop.
    ///
    /// With fewer than `min_findings` entries there is no verdict. A trailing
    /// window that is not yet full has no span either.
    pub fn check(&self, found: &[Position]) -> bool {
        if found.len() < self.min_findings {
            return false;
        }
        let Some(first) = found.len().checked_sub(self.window) else {
            return false;
        };
        let last = found.len() - 1;
        (found[first] - found[last]).abs() > self.max_span
    }
}
