// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The transmit scheduler.
//!
//! A straight-line procedure on the worker thread: arm, wait, transmit,
//! tear down. No async runtime is involved anywhere in the transmit path;
//! the ring-update deadline while symbols are in flight is on the order of
//! 100 us, far below any executor's scheduling jitter.
//!
//! # Windows
//!
//! WSPR receivers decode transmissions that start one second past an even
//! UTC minute (WSPR-2) or one second past a quarter hour (WSPR-15). The
//! wait is cooperative: at most one second of sleep per iteration, with
//! the stop flag checked in between, so cancellation during the wait takes
//! effect within about a second.

use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use super::engine::RfEngine;
use super::transmitter::PassOutcome;
use super::{TxParams, TxShared};
use crate::band::freq_display_string;
use crate::dma::symbol::{transmit_symbol, SymbolOutcome};
use crate::hw::{
    PeripheralMap, CM_GP0CTL_BUS, CM_PASSWORD, GPIO_BUS_BASE, PADS_GPIO_0_27_BUS,
};
use crate::ppm::PpmHandle;
use crate::Result;

/// Nominal WSPR symbol duration: 8192 samples at 12 kHz.
pub const WSPR_SYMTIME: f64 = 8192.0 / 12000.0;

/// Random-offset range for WSPR-2 passes, Hz.
const WSPR2_RAND_OFFSET: f64 = 80.0;
/// Random-offset range for WSPR-15 passes, Hz.
const WSPR15_RAND_OFFSET: f64 = 8.0;

/// GP0CTL: clock source PLLD.
const GP0_SRC_PLLD: u32 = 6;
/// GP0CTL: 3-stage MASH noise shaping on the fractional divider.
const GP0_MASH3: u32 = 3 << 9;
/// GP0CTL: enable bit.
const GP0_ENABLE: u32 = 1 << 4;
/// GP0CTL: busy flag.
const GP0_BUSY: u32 = 1 << 7;
/// Bits of GP0CTL preserved across the disable write.
const GP0_KEEP_MASK: u32 = 0x7EF;

/// Transmission cadence and symbol timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxWindow {
    /// 2-minute cadence, ~110.6 s frame, 1.4648 Hz tone spacing.
    Wspr2,
    /// 15-minute cadence, 5x symbol length, one fifth the tone spacing.
    Wspr15,
    /// No alignment: a continuous carrier (test tone).
    Continuous,
}

impl TxWindow {
    /// Symbol dwell in seconds.
    pub fn symtime(self) -> f64 {
        match self {
            TxWindow::Wspr15 => 5.0 * WSPR_SYMTIME,
            _ => WSPR_SYMTIME,
        }
    }

    /// MFSK tone spacing in Hz (the reciprocal of the dwell).
    pub fn tone_spacing(self) -> f64 {
        1.0 / self.symtime()
    }

    /// Half-range of the per-pass random frequency offset.
    pub fn rand_offset_bound(self) -> f64 {
        match self {
            TxWindow::Wspr2 => WSPR2_RAND_OFFSET,
            TxWindow::Wspr15 => WSPR15_RAND_OFFSET,
            TxWindow::Continuous => 0.0,
        }
    }

    /// Time until the next permitted start: one second past the next
    /// cadence boundary, strictly in the future.
    pub fn next_delay(self, now: DateTime<Utc>) -> Duration {
        let period_us: i64 = match self {
            TxWindow::Continuous => return Duration::ZERO,
            TxWindow::Wspr2 => 120 * 1_000_000,
            TxWindow::Wspr15 => 900 * 1_000_000,
        };
        let now_us = now.timestamp_micros();
        let cycle_start = now_us.div_euclid(period_us) * period_us;
        let mut target = cycle_start + 1_000_000;
        if target <= now_us {
            target += period_us;
        }
        Duration::from_micros((target - now_us) as u64)
    }

    /// The UTC instant `next_delay` is aiming for (for logging).
    fn next_start(self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + chrono::Duration::from_std(self.next_delay(now))
            .unwrap_or_else(|_| chrono::Duration::zero())
    }
}

/// Uniform random offset in `[-bound, +bound]`.
pub(crate) fn random_offset(rng: &mut fastrand::Rng, bound: f64) -> f64 {
    (rng.f64() * 2.0 - 1.0) * bound
}

/// Execute one transmission pass. The engine is armed only for real
/// transmissions; a zero-frequency pass consumes its window silently.
pub(crate) fn run_pass(
    engine: &mut RfEngine,
    params: &TxParams,
    shared: &TxShared,
    ppm: &PpmHandle,
    rng: &mut fastrand::Rng,
) -> Result<PassOutcome> {
    if shared.stopping() {
        return Ok(PassOutcome::Cancelled);
    }

    if params.frequency_hz == 0.0 {
        log::info!("[TX] skip entry: staying silent through this window");
        return Ok(if wait_for_window(params.window, shared) {
            PassOutcome::Skipped
        } else {
            PassOutcome::Cancelled
        });
    }

    // One PPM sample per arming; the tuning table absorbs it.
    let ppm_now = ppm.current_ppm();
    let dither = if params.use_offset {
        random_offset(rng, params.window.rand_offset_bound())
    } else {
        0.0
    };
    let center_desired = params.frequency_hz + params.offset_hz + dither;
    let plld_actual = engine.board.plld_hz * (1.0 - ppm_now * 1e-6);
    let center_actual =
        engine
            .tuning
            .rebuild(center_desired, params.window.tone_spacing(), plld_actual);

    log::info!(
        "[TX] pass armed: {} (ppm {:.3}, dither {:+.1} Hz)",
        freq_display_string(center_actual),
        ppm_now,
        dither
    );

    arm(engine, params.power_level);
    engine.ring.activate(&engine.periph);

    let outcome = if wait_for_window(params.window, shared) {
        execute(engine, params, shared, rng)
    } else {
        Ok(PassOutcome::Cancelled)
    };

    teardown(engine);
    outcome
}

/// Emit the configured signal until it completes or the stop flag wins.
fn execute(
    engine: &mut RfEngine,
    params: &TxParams,
    shared: &TxShared,
    rng: &mut fastrand::Rng,
) -> Result<PassOutcome> {
    match &params.frame {
        Some(frame) => {
            let dwell = params.window.symtime();
            log::info!("[TX] transmitting {} WSPR symbols", frame.symbols().len());
            for (i, &symbol) in frame.symbols().iter().enumerate() {
                if shared.stopping() {
                    log::info!("[TX] cancelled after {} symbols", i);
                    return Ok(PassOutcome::Cancelled);
                }
                let out = transmit_symbol(
                    &engine.periph,
                    &mut engine.ring,
                    &engine.tuning,
                    symbol as usize,
                    Some(dwell),
                    rng,
                    &shared.stop,
                )?;
                if out == SymbolOutcome::Cancelled {
                    log::info!("[TX] cancelled inside symbol {}", i);
                    return Ok(PassOutcome::Cancelled);
                }
            }
            log::info!("[TX] frame complete");
            Ok(PassOutcome::Completed)
        }
        None => {
            log::info!("[TX] transmitting tone until stopped");
            let out = transmit_symbol(
                &engine.periph,
                &mut engine.ring,
                &engine.tuning,
                0,
                None,
                rng,
                &shared.stop,
            )?;
            debug_assert_eq!(out, SymbolOutcome::Cancelled);
            Ok(PassOutcome::Cancelled)
        }
    }
}

/// Sleep until the window opens. Returns false when cancelled first.
fn wait_for_window(window: TxWindow, shared: &TxShared) -> bool {
    let now = Utc::now();
    let delay = window.next_delay(now);
    if delay.is_zero() {
        return !shared.stopping();
    }
    log::info!(
        "[TX] waiting {:.1} s for window at {}",
        delay.as_secs_f64(),
        window.next_start(now).format("%H:%M:%S")
    );

    let deadline = Instant::now() + delay;
    let mut gate = shared.gate.lock();
    loop {
        if shared.stopping() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        let chunk = (deadline - now).min(Duration::from_secs(1));
        let _ = shared.cv.wait_for(&mut gate, chunk);
    }
}

/// Route GPCLK0 to the antenna pin and start the carrier.
///
/// Drive strength maps roughly to output power: 0 = 2 mA (-3.4 dBm) up to
/// 7 = 16 mA (+10.6 dBm).
fn arm(engine: &mut RfEngine, power_level: u8) {
    let periph = &engine.periph;

    // GPIO4 function select ALT0 = GPCLK0 (GPFSEL0 bits 14..12 = 0b100).
    periph.set_bit(GPIO_BUS_BASE, 14);
    periph.clear_bit(GPIO_BUS_BASE, 13);
    periph.clear_bit(GPIO_BUS_BASE, 12);

    periph.write(
        PADS_GPIO_0_27_BUS,
        CM_PASSWORD | (0x18 + u32::from(power_level.min(7))),
    );

    disable_clock(periph);

    // Source PLLD with 3-stage MASH, then enable.
    periph.write(CM_GP0CTL_BUS, CM_PASSWORD | GP0_MASH3 | GP0_SRC_PLLD);
    periph.write(
        CM_GP0CTL_BUS,
        CM_PASSWORD | GP0_MASH3 | GP0_ENABLE | GP0_SRC_PLLD,
    );
}

/// Stop the carrier, reset the DMA channel, park the pin as an input.
fn teardown(engine: &mut RfEngine) {
    disable_clock(&engine.periph);
    engine.ring.reset(&engine.periph);

    engine.periph.clear_bit(GPIO_BUS_BASE, 14);
    engine.periph.clear_bit(GPIO_BUS_BASE, 13);
    engine.periph.clear_bit(GPIO_BUS_BASE, 12);
    log::debug!("[TX] carrier down, DMA reset, GPIO4 parked");
}

/// Clear the enable bit (keeping the rest of the control word) and spin
/// until the clock reports not busy. Register operations carry no
/// timeout: a clock manager that never settles is unrecoverable anyway.
pub(crate) fn disable_clock(periph: &PeripheralMap) {
    let settings = periph.read(CM_GP0CTL_BUS);
    periph.write(CM_GP0CTL_BUS, (settings & GP0_KEEP_MASK) | CM_PASSWORD);
    while periph.read(CM_GP0CTL_BUS) & GP0_BUSY != 0 {
        thread::sleep(Duration::from_micros(10));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, h, m, s).unwrap()
    }

    #[test]
    fn test_wspr2_waits_to_next_even_minute() {
        // 00:59:30 -> window at 01:00:01.
        assert_eq!(
            TxWindow::Wspr2.next_delay(at(0, 59, 30)),
            Duration::from_secs(31)
        );
    }

    #[test]
    fn test_wspr2_at_window_start_skips_ahead() {
        // Exactly on the boundary second: the next window is two minutes
        // out.
        assert_eq!(
            TxWindow::Wspr2.next_delay(at(1, 0, 1)),
            Duration::from_secs(120)
        );
    }

    #[test]
    fn test_wspr2_just_before_boundary() {
        let now = at(1, 0, 0) + chrono::Duration::milliseconds(500);
        assert_eq!(TxWindow::Wspr2.next_delay(now), Duration::from_millis(500));
    }

    #[test]
    fn test_wspr2_even_minute_mid_cycle() {
        // 00:58:30 sits in the 00:58 cycle whose start already passed.
        assert_eq!(
            TxWindow::Wspr2.next_delay(at(0, 58, 30)),
            Duration::from_secs(91)
        );
    }

    #[test]
    fn test_wspr15_quarter_hour() {
        assert_eq!(
            TxWindow::Wspr15.next_delay(at(0, 7, 30)),
            Duration::from_secs(451)
        );
        assert_eq!(
            TxWindow::Wspr15.next_delay(at(0, 44, 59)),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn test_continuous_never_waits() {
        assert_eq!(TxWindow::Continuous.next_delay(at(3, 33, 33)), Duration::ZERO);
    }

    #[test]
    fn test_symtime_ratio() {
        assert!((TxWindow::Wspr2.symtime() - 0.682_666_666).abs() < 1e-6);
        assert_eq!(TxWindow::Wspr15.symtime(), 5.0 * TxWindow::Wspr2.symtime());
        assert!((TxWindow::Wspr2.tone_spacing() - 1.464_843_75).abs() < 1e-9);
    }

    #[test]
    fn test_random_offset_bounds_and_variation() {
        let mut rng = fastrand::Rng::with_seed(42);
        let a = random_offset(&mut rng, 80.0);
        let b = random_offset(&mut rng, 80.0);
        assert!((-80.0..=80.0).contains(&a));
        assert!((-80.0..=80.0).contains(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn test_tone_mode_has_no_offset_range() {
        assert_eq!(TxWindow::Continuous.rand_offset_bound(), 0.0);
    }
}
