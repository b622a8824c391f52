//! Result file for found Hall of Fame positions.
//!
//! One position per line, appended as soon as it is found. The file is
//! opened for each write so a crash mid-scan keeps everything found so far.

use anyhow::{Context, Result};
use chrono::Local;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::automation::state::Position;

/// Durably records found positions.
pub trait ResultSink {
    fn append(&mut self, position: Position) -> Result<()>;
}

/// Append-only text file, one integer per line.
#[derive(Debug, Clone)]
pub struct ResultFile {
    path: PathBuf,
}

impl ResultFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// `<dir>/bot_output_YYYY_MM_DD_HH_MM_SS.txt`
    pub fn timestamped(dir: &Path) -> Self {
        let file_name = Local::now()
            .format("bot_output_%Y_%m_%d_%H_%M_%S.txt")
            .to_string();
        Self::new(dir.join(file_name))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultSink for ResultFile {
    fn append(&mut self, position: Position) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open {} for append", self.path.display()))?;
        writeln!(file, "{}", position).context("Failed to write result line")?;
        Ok(())
    }
}

/// Used when saving is turned off in config.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardResults;

impl ResultSink for DiscardResults {
    fn append(&mut self, _position: Position) -> Result<()> {
        Ok(())
    }
}

/// Reads a result file back into positions, skipping blank lines.
pub fn read_positions(path: &Path) -> Result<Vec<Position>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            line.trim()
                .parse::<Position>()
                .with_context(|| format!("Invalid position on line {}: {:?}", i + 1, line))
        })
        .collect()
}
