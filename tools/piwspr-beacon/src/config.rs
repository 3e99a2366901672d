// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Beacon configuration.
//!
//! The full option set can live in a JSON file (`--config beacon.json`);
//! every command-line flag overrides its file counterpart. Unset fields
//! fall back to the defaults below.
//!
//! ```json
//! {
//!   "mode": "wspr",
//!   "callsign": "K1ABC",
//!   "grid_square": "FN42",
//!   "power_dbm": 10,
//!   "frequencies": "20m,0,40m",
//!   "use_ntp": true,
//!   "use_offset": true,
//!   "power_level": 7,
//!   "tx_iterations": 0,
//!   "loop_tx": true
//! }
//! ```

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Encoded WSPR frames on the cadence windows.
    Wspr,
    /// A continuous test tone at `test_tone` Hz.
    Tone,
}

/// The resolved option set the pass loop runs on.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BeaconConfig {
    /// WSPR or test tone.
    pub mode: Mode,
    /// Station callsign (WSPR mode).
    pub callsign: String,
    /// Maidenhead grid square (WSPR mode).
    pub grid_square: String,
    /// Reported EIRP in dBm (WSPR mode).
    pub power_dbm: i32,
    /// Comma-separated band tokens or numeric frequencies; `0` skips a
    /// window.
    pub frequencies: String,
    /// Static drift calibration in ppm, used when NTP tracking is off.
    pub ppm: f64,
    /// Track the time daemon for drift updates.
    pub use_ntp: bool,
    /// Randomize each pass within the band's dither range.
    pub use_offset: bool,
    /// Pad drive strength 0..=7 (~ -3.4 dBm to +10.6 dBm).
    pub power_level: u8,
    /// Passes through the frequency list (0 = one pass) unless looping.
    pub tx_iterations: u32,
    /// Repeat the frequency list until stopped.
    pub loop_tx: bool,
    /// Tone frequency in Hz for tone mode.
    pub test_tone: f64,
    /// Real-time priority of the transmit worker.
    pub priority: i32,
}

impl Default for BeaconConfig {
    fn default() -> BeaconConfig {
        BeaconConfig {
            mode: Mode::Wspr,
            callsign: String::new(),
            grid_square: String::new(),
            power_dbm: 10,
            frequencies: "20m".to_string(),
            ppm: 0.0,
            use_ntp: true,
            use_offset: false,
            power_level: 7,
            tx_iterations: 0,
            loop_tx: false,
            test_tone: 730_000.0,
            priority: 30,
        }
    }
}

impl BeaconConfig {
    /// Load a JSON config file.
    pub fn load(path: &Path) -> Result<BeaconConfig> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("parsing config file {}", path.display()))
    }
}
