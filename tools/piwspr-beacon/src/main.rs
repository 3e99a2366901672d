// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! piwspr beacon CLI
//!
//! Drives the piwspr transmitter through a frequency list on the WSPR
//! cadence, or holds a test tone.
//!
//! # Usage
//!
//! ```bash
//! # Classic 20 m beacon
//! piwspr-beacon --callsign K1ABC --grid FN42 --power-dbm 10 --frequencies 20m
//!
//! # Alternate 20 m / silent / 40 m, forever, with random offsets
//! piwspr-beacon -c K1ABC -g FN42 --frequencies 20m,0,40m --loop-tx --use-offset
//!
//! # Everything from a file, flags still win
//! piwspr-beacon --config /etc/piwspr.json --power-level 5
//!
//! # 730 kHz test tone until Ctrl-C
//! piwspr-beacon --mode tone --test-tone 730000
//! ```
//!
//! Needs root (or CAP_SYS_RAWIO and friends) for `/dev/mem` and
//! `/dev/vcio`. Logging follows `RUST_LOG` (default `info`).

mod config;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;

use config::{BeaconConfig, Mode};
use piwspr::{
    band, PassOutcome, PpmSource, SchedPolicy, TransmissionSpec, Transmitter, TxMode,
};

#[derive(Parser)]
#[command(name = "piwspr-beacon")]
#[command(author = "naskel.com")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Software-defined WSPR beacon for Raspberry Pi class boards")]
#[command(long_about = None)]
struct Cli {
    /// JSON configuration file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Operating mode
    #[arg(short, long, value_enum)]
    mode: Option<Mode>,

    /// Station callsign (WSPR mode)
    #[arg(short, long)]
    callsign: Option<String>,

    /// Maidenhead grid square (WSPR mode)
    #[arg(short, long)]
    grid: Option<String>,

    /// Reported EIRP in dBm (WSPR mode)
    #[arg(short, long)]
    power_dbm: Option<i32>,

    /// Comma-separated band tokens or frequencies; 0 skips a window
    #[arg(short, long)]
    frequencies: Option<String>,

    /// Static clock calibration in ppm (used when NTP tracking is off)
    #[arg(long)]
    ppm: Option<f64>,

    /// Track the time daemon for drift updates
    #[arg(long)]
    use_ntp: Option<bool>,

    /// Randomize each pass within the band's dither window
    #[arg(long)]
    use_offset: bool,

    /// Pad drive strength 0..=7 (2 mA / -3.4 dBm up to 16 mA / +10.6 dBm)
    #[arg(long)]
    power_level: Option<u8>,

    /// Passes through the frequency list (0 = one pass)
    #[arg(long)]
    tx_iterations: Option<u32>,

    /// Repeat the frequency list until stopped
    #[arg(long)]
    loop_tx: bool,

    /// Tone frequency in Hz (tone mode)
    #[arg(long)]
    test_tone: Option<f64>,

    /// Real-time priority of the transmit worker (SCHED_FIFO)
    #[arg(long)]
    priority: Option<i32>,

    /// Accept frequencies outside the amateur allocations
    #[arg(long)]
    no_validate: bool,
}

impl Cli {
    /// File config (if any) with flag overrides folded in.
    fn into_config(self) -> Result<(BeaconConfig, bool)> {
        let mut cfg = match &self.config {
            Some(path) => BeaconConfig::load(path)?,
            None => BeaconConfig::default(),
        };
        if let Some(v) = self.mode {
            cfg.mode = v;
        }
        if let Some(v) = self.callsign {
            cfg.callsign = v;
        }
        if let Some(v) = self.grid {
            cfg.grid_square = v;
        }
        if let Some(v) = self.power_dbm {
            cfg.power_dbm = v;
        }
        if let Some(v) = self.frequencies {
            cfg.frequencies = v;
        }
        if let Some(v) = self.ppm {
            cfg.ppm = v;
        }
        if let Some(v) = self.use_ntp {
            cfg.use_ntp = v;
        }
        if self.use_offset {
            cfg.use_offset = true;
        }
        if let Some(v) = self.power_level {
            cfg.power_level = v;
        }
        if let Some(v) = self.tx_iterations {
            cfg.tx_iterations = v;
        }
        if self.loop_tx {
            cfg.loop_tx = true;
        }
        if let Some(v) = self.test_tone {
            cfg.test_tone = v;
        }
        if let Some(v) = self.priority {
            cfg.priority = v;
        }
        Ok((cfg, self.no_validate))
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let (cfg, no_validate) = Cli::parse().into_config()?;

    let mut ppm_source = if cfg.use_ntp {
        PpmSource::ntp_tracked(cfg.ppm)
    } else {
        PpmSource::fixed(cfg.ppm)
    };

    let mut tx = Transmitter::new(ppm_source.handle());

    // Ctrl-C raises the cooperative stop flag; the worker winds down on
    // its own and the pass loop below exits.
    let stop = tx.stop_handle();
    ctrlc::set_handler(move || {
        log::info!("interrupt received, stopping after the current symbol");
        stop.request_stop();
    })
    .context("installing the Ctrl-C handler")?;

    let result = match cfg.mode {
        Mode::Tone => run_tone(&mut tx, &cfg),
        Mode::Wspr => run_wspr(&mut tx, &cfg, no_validate),
    };

    tx.shutdown_transmitter();
    tx.dma_cleanup().ok();
    ppm_source.stop();
    result
}

/// Hold the test tone until interrupted.
fn run_tone(tx: &mut Transmitter, cfg: &BeaconConfig) -> Result<()> {
    log::info!(
        "transmitting test tone on {}",
        band::freq_display_string(cfg.test_tone)
    );
    tx.setup_transmission(TransmissionSpec {
        frequency_hz: cfg.test_tone,
        mode: TxMode::Tone,
        power_level: cfg.power_level,
        ..TransmissionSpec::default()
    })?;
    log::info!("{}", tx.print_parameters());
    tx.start_threaded_transmission(SchedPolicy::Fifo, cfg.priority)?;
    tx.join_transmission()?;
    Ok(())
}

/// Walk the frequency list on the WSPR cadence.
fn run_wspr(tx: &mut Transmitter, cfg: &BeaconConfig, no_validate: bool) -> Result<()> {
    if cfg.callsign.is_empty() || cfg.grid_square.is_empty() {
        bail!("WSPR mode needs --callsign and --grid");
    }

    let entries: Vec<band::ResolvedFrequency> = cfg
        .frequencies
        .split(',')
        .map(|token| {
            band::resolve_with(token, !no_validate)
                .with_context(|| format!("frequency entry {token:?}"))
        })
        .collect::<Result<_>>()?;
    if entries.is_empty() {
        bail!("the frequency list is empty");
    }

    let passes = if cfg.loop_tx {
        None
    } else {
        Some(cfg.tx_iterations.max(1))
    };

    let mut iteration = 0u32;
    'outer: loop {
        if let Some(total) = passes {
            if iteration >= total {
                break;
            }
        }
        iteration += 1;
        log::info!("frequency list pass {}", iteration);

        for entry in &entries {
            if tx.is_stopping() {
                break 'outer;
            }

            tx.setup_transmission(TransmissionSpec {
                frequency_hz: entry.frequency_hz,
                wspr15: entry.wspr15,
                mode: TxMode::Wspr,
                callsign: Some(cfg.callsign.clone()),
                locator: Some(cfg.grid_square.clone()),
                power_dbm: Some(cfg.power_dbm),
                use_offset: cfg.use_offset,
                power_level: cfg.power_level,
                ..TransmissionSpec::default()
            })?;
            log::info!("{}", tx.print_parameters());

            tx.start_threaded_transmission(SchedPolicy::Fifo, cfg.priority)?;
            match tx.join_transmission()? {
                PassOutcome::Completed => log::info!("pass complete"),
                PassOutcome::Skipped => log::info!("window skipped"),
                PassOutcome::Cancelled => {
                    log::info!("pass cancelled");
                    break 'outer;
                }
            }
        }
    }
    Ok(())
}
