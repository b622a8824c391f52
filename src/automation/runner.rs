//! Scan runner - wires config, operator prompts and the platform pieces into
//! a `ScanEngine` and runs it to completion.

use anyhow::{bail, Result};
use std::io::{BufRead, Write};

use crate::automation::config::MAX_POSITION;
use crate::automation::input::Direction;
use crate::automation::state::Position;

/// Parses an operator-entered start position, clamped to `1..=MAX_POSITION`.
///
/// Returns `None` when the input is not an integer.
pub fn parse_start_position(input: &str) -> Option<Position> {
    input
        .trim()
        .parse::<Position>()
        .ok()
        .map(|p| p.clamp(1, MAX_POSITION))
}

/// `1` scans down the list, anything else scans up.
pub fn parse_direction(input: &str) -> Direction {
    if input.trim() == "1" {
        Direction::Advance
    } else {
        Direction::Retreat
    }
}

/// Asks for the start position until an integer is entered.
pub fn prompt_start_position<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> Result<Position> {
    loop {
        write!(output, "Enter the Hall of Fame position to start from: ")?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            bail!("No start position entered");
        }
        match parse_start_position(&line) {
            Some(position) => return Ok(position),
            None => writeln!(output, "'{}' is not a whole number", line.trim())?,
        }
    }
}

/// Asks for the scan direction. End of input scans up.
pub fn prompt_direction<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> Result<Direction> {
    write!(
        output,
        "Enter 1 to scan down the list (higher positions), anything else to scan up: "
    )?;
    output.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(parse_direction(&line))
}

#[cfg(windows)]
pub use session::run_scan_session;

#[cfg(windows)]
mod session {
    use anyhow::{Context, Result};
    use std::fs;
    use std::io::{self, BufRead, Write};
    use std::sync::Arc;

    use super::{prompt_direction, prompt_start_position};
    use crate::automation::abort::ExitKeys;
    use crate::automation::config::get_config;
    use crate::automation::diagnostics::{ConsoleObserver, ScanObserver};
    use crate::automation::input::KeyboardInput;
    use crate::automation::results::{read_positions, DiscardResults, ResultFile, ResultSink};
    use crate::automation::sampler::{load_mask, FrameSampler, RegionExtractor};
    use crate::automation::state::{ScanEngine, ScanParams};
    use crate::capture::window::find_game_window;
    use crate::capture::{crop_box_for, resolve_capture_rect, CaptureSource, ScreenCapture};

    /// Runs one interactive scan session against the game window.
    pub fn run_scan_session() -> Result<()> {
        let config = get_config().clone();
        if config.debug {
            config.log_settings();
        }

        let stdin = io::stdin();
        let mut input = stdin.lock();
        let mut output = io::stdout();

        let start = match config.start_position {
            Some(position) => position,
            None => prompt_start_position(&mut input, &mut output)?,
        };
        let direction = match config.scan_direction {
            Some(direction) => direction,
            None => prompt_direction(&mut input, &mut output)?,
        };
        crate::log(&format!("Scanning {} from position {}", direction, start));

        let rect = resolve_capture_rect(config.window_size, || {
            find_game_window(&config.window_title)
        });
        crate::log(&format!("Capture area: {}", rect));

        let dump_dir = if config.debug {
            let dir = crate::paths::get_debug_dir();
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
            Some(dir)
        } else {
            None
        };
        let observer: Arc<dyn ScanObserver> =
            Arc::new(ConsoleObserver::new(config.debug, dump_dir));

        // The mask is resized to the crop, so learn its size from a real capture
        let mut source = ScreenCapture::new();
        let extractor = RegionExtractor::new(crop_box_for(&rect));
        let first_frame = source.grab(&rect).context("Initial capture failed")?;
        let crop_size = extractor.cropped_size(first_frame.dimensions())?;

        let mask = if config.mask {
            let mask_path = crate::paths::get_exe_dir().join(&config.mask_path);
            load_mask(&mask_path, crop_size, observer.as_ref())
        } else {
            None
        };

        let sampler = FrameSampler::new(
            Box::new(source),
            rect,
            extractor.with_mask(mask),
            observer.clone(),
        );

        let mut result_path = None;
        let sink: Box<dyn ResultSink> = if config.file_save {
            let file = ResultFile::timestamped(&crate::paths::get_output_dir());
            crate::log(&format!("Results file: {}", file.path().display()));
            result_path = Some(file.path().to_path_buf());
            Box::new(file)
        } else {
            Box::new(DiscardResults)
        };

        let params = ScanParams::from_config(&config, start, direction);
        let mut engine = ScanEngine::new(
            params,
            sampler,
            Box::new(KeyboardInput::new()),
            sink,
            Box::new(ExitKeys),
        )
        .with_observer(observer);

        let result = engine.run();
        if let Err(e) = &result {
            crate::log(&format!("Scan failed at position {}: {:#}", engine.position, e));
        }
        if let Some(path) = result_path.filter(|p| p.exists()) {
            match read_positions(&path) {
                Ok(saved) => crate::log(&format!(
                    "{} positions saved to {}",
                    saved.len(),
                    path.display()
                )),
                Err(e) => crate::log(&format!("Warning: Result file unreadable: {:#}", e)),
            }
        }

        write!(output, "Press Enter to exit")?;
        output.flush()?;
        let mut line = String::new();
        let _ = input.read_line(&mut line);

        result.map(|_| ())
    }
}
