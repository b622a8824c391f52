//! Shakes & Fidget Scrapbook Bot
//!
//! A Windows console tool that walks the game's Hall of Fame list one player
//! at a time and writes down the positions whose item panel flickers, which
//! marks items missing from the operator's scrapbook.

// The Win32 glue is the only caller of parts of the core
#![cfg_attr(not(windows), allow(dead_code))]

mod automation;
mod capture;
mod paths;

use anyhow::Result;
use chrono::Local;
use std::fs::OpenOptions;
use std::io::Write;

/// Logs a message to both console and log file with timestamp.
pub fn log(msg: &str) {
    let timestamp = Local::now().format("%H:%M:%S%.3f");
    let line = format!("[{}] {}\n", timestamp, msg);
    print!("{}", line);
    let log_path = paths::get_logs_dir().join("scrapbook_bot.log");
    if let Ok(mut file) = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        let _ = file.write_all(line.as_bytes());
    }
}

fn main() -> Result<()> {
    std::panic::set_hook(Box::new(|panic_info| {
        let msg = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        let location = panic_info
            .location()
            .map(|loc| format!(" at {}:{}:{}", loc.file(), loc.line(), loc.column()))
            .unwrap_or_default();
        let log_msg = format!("[PANIC]{} {}\n", location, msg);
        eprintln!("{}", log_msg);
        let log_path = paths::get_logs_dir().join("scrapbook_bot.log");
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(log_path) {
            let _ = file.write_all(log_msg.as_bytes());
        }
    }));

    paths::ensure_directories()?;

    log("Welcome to SFGame-ScrapbookBot");
    log("Open the Hall of Fame in the game before the countdown ends.");

    automation::init_config();

    run()
}

#[cfg(windows)]
fn run() -> Result<()> {
    automation::runner::run_scan_session()
}

#[cfg(not(windows))]
fn run() -> Result<()> {
    anyhow::bail!("scrapbook-bot drives the game through Win32 and only runs on Windows")
}
