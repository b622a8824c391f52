//! Hall of Fame scan automation.
//!
//! This module provides:
//! - The histogram difference metric and per-frame sampling (crop + mask)
//! - The scan state machine with stale-view recovery and multi-sampling
//! - Keyboard navigation, operator abort and result file output
//! - Config loading and the interactive runner

pub mod abort;
pub mod config;
pub mod detection;
pub mod diagnostics;
pub mod guard;
pub mod input;
pub mod results;
pub mod runner;
pub mod sampler;
pub mod state;
pub mod timing;

pub use config::init_config;
