// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transmission scheduling and the public facade.
//!
//! One transmission pass is: sample the PPM estimate, rebuild the tuning
//! table, arm the carrier, sleep to the next UTC window, then either play
//! the 162 WSPR symbols or hold a tone until cancelled, and tear the
//! hardware back down. The facade ([`transmitter::Transmitter`]) owns the
//! hardware engine and leases it to a dedicated worker thread for each
//! pass; the scheduler ([`sched`]) is the straight-line procedure that
//! thread runs.
//!
//! Cancellation is a single atomic flag plus a condition variable: every
//! wait in the pass re-checks the flag at least once per second (and every
//! few tens of microseconds while symbols are in flight).

pub(crate) mod engine;
pub mod sched;
pub mod transmitter;

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Condvar, Mutex};

use crate::codec::WsprFrame;
use sched::TxWindow;

/// Cancellation and liveness state shared between the facade, the worker
/// thread and any signal handler holding a stop handle.
pub(crate) struct TxShared {
    /// Cooperative stop flag; checked by every wait loop.
    pub stop: AtomicBool,
    /// True while a worker thread is executing a pass.
    pub running: AtomicBool,
    /// Paired with `cv` for the interruptible boundary wait.
    pub gate: Mutex<()>,
    pub cv: Condvar,
}

impl TxShared {
    pub fn new() -> TxShared {
        TxShared {
            stop: AtomicBool::new(false),
            running: AtomicBool::new(false),
            gate: Mutex::new(()),
            cv: Condvar::new(),
        }
    }

    /// Raise the stop flag and wake any boundary wait.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
        self.cv.notify_all();
    }

    pub fn stopping(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }
}

/// Everything one pass needs, frozen at `setup_transmission` time.
#[derive(Clone)]
pub(crate) struct TxParams {
    /// Requested center frequency; 0.0 is the aligned-skip sentinel.
    pub frequency_hz: f64,
    /// Fixed operator offset added to the center.
    pub offset_hz: f64,
    /// Cadence and symbol timing.
    pub window: TxWindow,
    /// Add a per-pass random offset within the band's dither range.
    pub use_offset: bool,
    /// Pad drive-strength field (0..=7).
    pub power_level: u8,
    /// Encoded WSPR frame; `None` transmits a bare tone.
    pub frame: Option<WsprFrame>,
}
