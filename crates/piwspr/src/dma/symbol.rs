// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-symbol dwell.
//!
//! A symbol is one MFSK tone held for a fixed number of PWM clocks. The
//! tone itself is synthesized by alternating between the slot pair
//! `(2s, 2s + 1)` of the tuning table; the proportion of time spent on the
//! low slot is chosen so the cumulative average lands on the exact tone
//! frequency. Chunk lengths are randomized (~1000 ± 500 PWM clocks) so the
//! alternation rate is spread across frequency instead of concentrating
//! into a spur pair.
//!
//! Symbol boundaries are defined by PWM-clock count, not wall-clock
//! polling: once the descriptors are queued, timing belongs to hardware.

use std::sync::atomic::{AtomicBool, Ordering};

use super::ring::CbRing;
use super::tuning::TuningTable;
use super::{F_PWM_CLK, PWM_CLOCKS_PER_ITER_NOMINAL};
use crate::hw::PeripheralMap;
use crate::Result;

/// How a symbol dwell ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolOutcome {
    /// The full dwell was queued to the engine.
    Completed,
    /// The stop flag was observed between chunks.
    Cancelled,
}

/// Transmit symbol `symbol` (0..=3) for `dwell_secs`, or until cancelled
/// when `dwell_secs` is `None` (continuous tone).
///
/// The stop flag is re-checked between dither chunks, so cancellation is
/// visible within tens of microseconds of queued dwell plus one busy-wait.
///
/// # Errors
///
/// [`crate::Error::HardwareHung`] if the engine stops advancing.
pub fn transmit_symbol(
    periph: &PeripheralMap,
    ring: &mut CbRing,
    tuning: &TuningTable,
    symbol: usize,
    dwell_secs: Option<f64>,
    rng: &mut fastrand::Rng,
    stop: &AtomicBool,
) -> Result<SymbolOutcome> {
    debug_assert!(symbol < 4);

    let f0_slot = 2 * symbol;
    let f1_slot = f0_slot + 1;
    let f0_freq = tuning.dma_freq(f0_slot);
    let f1_freq = tuning.dma_freq(f1_slot);
    let tone_freq = tuning.tone_freq(symbol);

    // Fraction of the dwell spent on the low divisor. The table builder
    // guarantees f0 <= tone <= f1; clamp only against float dust.
    let f0_ratio = (1.0 - (tone_freq - f0_freq) / (f1_freq - f0_freq)).clamp(0.0, 1.0);
    debug_assert!((0.0..=1.0).contains(&f0_ratio));

    let total: Option<i64> = dwell_secs.map(|t| (F_PWM_CLK * t).round() as i64);

    let mut queued: i64 = 0;
    let mut queued_f0: i64 = 0;

    loop {
        if stop.load(Ordering::Relaxed) {
            return Ok(SymbolOutcome::Cancelled);
        }
        if let Some(total) = total {
            if queued >= total {
                return Ok(SymbolOutcome::Completed);
            }
        }

        // Randomized chunk length, clamped to the remaining dwell.
        let jitter = ((rng.f64() - 0.5) * PWM_CLOCKS_PER_ITER_NOMINAL as f64).round() as i64;
        let mut chunk = PWM_CLOCKS_PER_ITER_NOMINAL + jitter;
        if let Some(total) = total {
            chunk = chunk.min(total - queued);
        }

        // Split the chunk so the running f0 share tracks f0_ratio.
        let n_f0 = ((f0_ratio * (queued + chunk) as f64).round() as i64 - queued_f0)
            .clamp(0, chunk);
        let n_f1 = chunk - n_f0;

        queue_half(periph, ring, tuning.slot_bus(f0_slot), n_f0)?;
        queue_half(periph, ring, tuning.slot_bus(f1_slot), n_f1)?;

        queued += chunk;
        queued_f0 += n_f0;
    }
}

/// Queue one (retune, dwell) pair: point the next divider block at a
/// tuning slot and set the paired pacing block's length.
fn queue_half(
    periph: &PeripheralMap,
    ring: &mut CbRing,
    slot_bus: u32,
    pwm_clocks: i64,
) -> Result<()> {
    let (divider, pacing) = ring.next_pair();
    ring.wait_not_current(periph, &divider)?;
    divider.set_source(slot_bus);
    ring.wait_not_current(periph, &pacing)?;
    pacing.set_txfr_len(pwm_clocks as u32);
    Ok(())
}
