//! Configuration types for the Hall of Fame scan.
//!
//! Loads settings from config.json at startup. Every field has a default, so
//! a partial file only overrides what it names. Out-of-range values are
//! clamped the same way the operator docs describe.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use crate::automation::input::Direction;
use crate::automation::state::Position;

/// Global configuration instance, initialized once at startup.
static CONFIG: OnceLock<ScanConfig> = OnceLock::new();

/// Highest Hall of Fame position / scan count accepted.
pub const MAX_POSITION: Position = 1_000_000_000;

/// Thresholds for the finding-density auto stop.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// No verdict until this many positions were found
    pub min_findings: usize,
    /// Number of trailing findings whose first and last entries are compared
    pub window: usize,
    /// Position span inside the window above which the scan stops
    pub max_span: Position,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            min_findings: 50,
            window: 51,
            max_span: 501,
        }
    }
}

/// Complete scan configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Black out volatile parts of the panel (timer, guild chat, XP bar).
    /// Off by default; needs a mask image at `mask_path`.
    pub mask: bool,
    /// Grayscale mask image, relative to the executable directory
    pub mask_path: String,
    /// Substring of the game window title
    pub window_title: String,
    /// Capture `[width, height]` from the screen origin instead of locating the window
    pub window_size: Option<[u32; 2]>,
    /// Hall of Fame position to start at (prompted when unset)
    pub start_position: Option<Position>,
    /// Scan direction (prompted when unset)
    pub scan_direction: Option<Direction>,
    /// Append found positions to a timestamped file
    pub file_save: bool,
    /// Pause divisor: 2.0 halves every wait
    pub speed: f64,
    /// Debug logging and debug image dumps
    pub debug: bool,
    /// Maximum number of positions scanned in one run
    pub scan_limit: u32,
    /// Difference score above which a position counts as found
    pub diff_limit: f64,
    /// Lowest position the scan may evaluate
    pub position_floor: Position,
    /// Seconds the operator gets to focus the game before scanning
    pub countdown_secs: u32,
    /// Difference score below which the view is considered not redrawn
    pub stale_threshold: f64,
    /// Finding-density auto stop
    pub anomaly: AnomalyConfig,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            mask: false,
            mask_path: "mask.png".to_string(),
            window_title: "Shakes & Fidget".to_string(),
            window_size: None,
            start_position: None,
            scan_direction: None,
            file_save: true,
            speed: 1.0,
            debug: false,
            scan_limit: 5000,
            diff_limit: 3.0,
            position_floor: 1,
            countdown_secs: 5,
            stale_threshold: 50.0,
            anomaly: AnomalyConfig::default(),
        }
    }
}

impl ScanConfig {
    /// Clamps out-of-range values back into their accepted ranges.
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();

        self.start_position = match self.start_position {
            Some(p) if p < 1 => None,
            Some(p) => Some(p.min(MAX_POSITION)),
            None => None,
        };

        if self.speed.is_nan() || self.speed <= 0.0 {
            self.speed = defaults.speed;
        } else if self.speed > 10.0 {
            self.speed = 10.0;
        }

        if self.scan_limit < 10 {
            self.scan_limit = defaults.scan_limit;
        } else if self.scan_limit as Position > MAX_POSITION {
            self.scan_limit = MAX_POSITION as u32;
        }

        if self.diff_limit.is_nan() || self.diff_limit < 0.1 {
            self.diff_limit = defaults.diff_limit;
        } else if self.diff_limit > 1000.0 {
            self.diff_limit = 1000.0;
        }

        if self.anomaly.window == 0 {
            self.anomaly.window = defaults.anomaly.window;
        }

        self
    }

    /// Writes every setting to the log (debug mode only).
    pub fn log_settings(&self) {
        crate::log("[DEBUG] CONFIG FILE DONE");
        crate::log(&format!("[DEBUG] mask={} ({})", self.mask, self.mask_path));
        crate::log(&format!("[DEBUG] window_size={:?}", self.window_size));
        crate::log(&format!("[DEBUG] start_position={:?}", self.start_position));
        crate::log(&format!("[DEBUG] scan_direction={:?}", self.scan_direction));
        crate::log(&format!("[DEBUG] file_save={}", self.file_save));
        crate::log(&format!("[DEBUG] speed={}", self.speed));
        crate::log(&format!("[DEBUG] scan_limit={}", self.scan_limit));
        crate::log(&format!("[DEBUG] diff_limit={}", self.diff_limit));
    }
}

/// Loads configuration from `path`, falling back to defaults when the file
/// is missing or malformed.
pub fn load_config_from(path: &Path) -> ScanConfig {
    crate::log(&format!("Looking for config at: {}", path.display()));

    if path.exists() {
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<ScanConfig>(&contents) {
                Ok(config) => {
                    crate::log("Config loaded from config.json");
                    return config.sanitized();
                }
                Err(e) => {
                    crate::log(&format!(
                        "Warning: Failed to parse config.json: {}. Using defaults.",
                        e
                    ));
                }
            },
            Err(e) => {
                crate::log(&format!(
                    "Warning: Failed to read config.json: {}. Using defaults.",
                    e
                ));
            }
        }
    } else {
        crate::log("config.json not found. Using default config.");
    }

    ScanConfig::default()
}

/// Loads configuration from config.json next to the executable.
fn load_config() -> ScanConfig {
    load_config_from(&crate::paths::get_exe_dir().join("config.json"))
}

/// Initializes the global configuration. Call once at startup.
pub fn init_config() {
    let _ = CONFIG.set(load_config());
}

/// Returns a reference to the global configuration, or the defaults when
/// `init_config()` has not run.
pub fn get_config() -> &'static ScanConfig {
    CONFIG.get_or_init(ScanConfig::default)
}
