// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The transmitter facade.
//!
//! Owns the hardware engine and the single transmit worker thread. The
//! lifecycle of one pass:
//!
//! ```text
//! setup_transmission --> start_threaded_transmission --> join_transmission
//!        |                        |                            |
//!   validate inputs          lease engine                recover engine
//!   encode message           to the worker               and the outcome
//!   (init engine once)
//! ```
//!
//! `shutdown_transmitter` is the only sanctioned termination path: it
//! raises the stop flag, wakes the boundary wait, joins the worker, and
//! forces the carrier and DMA channel idle. It is idempotent.
//!
//! Exactly one facade may exist per process: the peripheral window, the
//! mailbox allocation and DMA channel 0 are global hardware.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::engine::RfEngine;
use super::sched::{self, TxWindow};
use super::{TxParams, TxShared};
use crate::band::freq_display_string;
use crate::codec::WsprFrame;
use crate::ppm::PpmHandle;
use crate::{Error, Result};

/// Scheduling policy for the transmit worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedPolicy {
    /// `SCHED_FIFO` real-time (recommended; needs privileges).
    Fifo,
    /// `SCHED_RR` real-time.
    RoundRobin,
    /// Default time-sharing policy; priority is ignored.
    Other,
}

/// Transmission mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxMode {
    /// Encoded WSPR frame aligned to the cadence windows.
    Wspr,
    /// Continuous carrier at the configured frequency.
    Tone,
}

/// How a pass ended, as reported by [`Transmitter::join_transmission`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// The full frame went out.
    Completed,
    /// A zero-frequency entry consumed its window silently.
    Skipped,
    /// The stop flag ended the pass early. Not an error.
    Cancelled,
}

/// Inputs for one configured transmission.
#[derive(Debug, Clone)]
pub struct TransmissionSpec {
    /// Center frequency in Hz; 0.0 requests an aligned silent skip.
    pub frequency_hz: f64,
    /// Fixed offset added to the center frequency.
    pub offset_hz: f64,
    /// Use the 15-minute cadence (WSPR mode only).
    pub wspr15: bool,
    /// WSPR frame or bare tone.
    pub mode: TxMode,
    /// Callsign, required in WSPR mode.
    pub callsign: Option<String>,
    /// Maidenhead grid square, required in WSPR mode.
    pub locator: Option<String>,
    /// Reported EIRP in dBm, required in WSPR mode.
    pub power_dbm: Option<i32>,
    /// Randomize each pass within the band's dither range.
    pub use_offset: bool,
    /// Pad drive strength 0..=7 (~ -3.4 to +10.6 dBm into 50 ohm).
    pub power_level: u8,
}

impl Default for TransmissionSpec {
    fn default() -> TransmissionSpec {
        TransmissionSpec {
            frequency_hz: 0.0,
            offset_hz: 0.0,
            wspr15: false,
            mode: TxMode::Wspr,
            callsign: None,
            locator: None,
            power_dbm: None,
            use_offset: false,
            power_level: 7,
        }
    }
}

/// Clone-able stop trigger for signal handlers and control surfaces.
#[derive(Clone)]
pub struct StopHandle {
    shared: Arc<TxShared>,
}

impl StopHandle {
    /// Raise the cooperative stop flag.
    pub fn request_stop(&self) {
        self.shared.request_stop();
    }

    /// Observe the flag.
    pub fn is_stopping(&self) -> bool {
        self.shared.stopping()
    }
}

/// The one-per-process transmitter.
pub struct Transmitter {
    shared: Arc<TxShared>,
    ppm: PpmHandle,
    engine: Option<RfEngine>,
    params: Option<TxParams>,
    rng: fastrand::Rng,
    worker: Option<JoinHandle<(RfEngine, Result<PassOutcome>)>>,
}

impl Transmitter {
    /// Create an idle facade. No hardware is touched until
    /// [`setup_transmission`](Transmitter::setup_transmission).
    pub fn new(ppm: PpmHandle) -> Transmitter {
        Transmitter {
            shared: Arc::new(TxShared::new()),
            ppm,
            engine: None,
            params: None,
            rng: fastrand::Rng::new(),
            worker: None,
        }
    }

    /// Validate and store one transmission's parameters, encoding the
    /// WSPR message up front. The hardware engine (peripheral map, page
    /// pool, ring) is initialized on the first call and reused afterward.
    ///
    /// # Errors
    ///
    /// Argument-shape errors ([`Error::InvalidCallsign`],
    /// [`Error::InvalidLocator`], [`Error::InvalidState`]) and fatal
    /// hardware-initialization failures.
    pub fn setup_transmission(&mut self, spec: TransmissionSpec) -> Result<()> {
        if self.worker.is_some() {
            return Err(Error::AlreadyRunning);
        }

        let (window, frame) = match spec.mode {
            TxMode::Tone => (TxWindow::Continuous, None),
            TxMode::Wspr => {
                let callsign = spec
                    .callsign
                    .as_deref()
                    .ok_or_else(|| Error::InvalidState("WSPR mode needs a callsign".into()))?;
                let locator = spec
                    .locator
                    .as_deref()
                    .ok_or_else(|| Error::InvalidState("WSPR mode needs a grid square".into()))?;
                let power = spec
                    .power_dbm
                    .ok_or_else(|| Error::InvalidState("WSPR mode needs a power level".into()))?;
                let frame = WsprFrame::encode(callsign, locator, power)?;
                let window = if spec.wspr15 {
                    TxWindow::Wspr15
                } else {
                    TxWindow::Wspr2
                };
                (window, Some(frame))
            }
        };

        if self.engine.is_none() {
            self.engine = Some(RfEngine::init()?);
        }

        self.params = Some(TxParams {
            frequency_hz: spec.frequency_hz,
            offset_hz: spec.offset_hz,
            window,
            use_offset: spec.use_offset,
            power_level: spec.power_level,
            frame,
        });
        Ok(())
    }

    /// Rebuild the tuning table for a new drift estimate.
    ///
    /// Valid only between passes; the scheduler performs the same rebuild
    /// itself at arming time.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] while a worker is running or before setup.
    pub fn update_dma_for_ppm(&mut self, ppm: f64) -> Result<()> {
        if self.worker.is_some() {
            return Err(Error::InvalidState(
                "cannot retune while a pass is running".into(),
            ));
        }
        let params = self
            .params
            .as_ref()
            .ok_or_else(|| Error::InvalidState("no transmission configured".into()))?;
        let engine = self
            .engine
            .as_mut()
            .ok_or_else(|| Error::InvalidState("engine not initialized".into()))?;

        let plld_actual = engine.board.plld_hz * (1.0 - ppm * 1e-6);
        engine.tuning.rebuild(
            params.frequency_hz + params.offset_hz,
            params.window.tone_spacing(),
            plld_actual,
        );
        Ok(())
    }

    /// Launch the worker thread for the configured pass.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyRunning`] with a live worker (state unchanged);
    /// [`Error::InvalidState`] before `setup_transmission`.
    pub fn start_threaded_transmission(
        &mut self,
        policy: SchedPolicy,
        priority: i32,
    ) -> Result<()> {
        if self.worker.is_some() {
            return Err(Error::AlreadyRunning);
        }
        let params = self
            .params
            .clone()
            .ok_or_else(|| Error::InvalidState("no transmission configured".into()))?;
        let mut engine = self
            .engine
            .take()
            .ok_or_else(|| Error::InvalidState("no transmission configured".into()))?;

        // The stop flag is sticky: a pass started after a stop request
        // cancels immediately instead of racing the requester.
        self.shared
            .running
            .store(true, std::sync::atomic::Ordering::Relaxed);

        let shared = Arc::clone(&self.shared);
        let ppm = self.ppm.clone();
        let mut rng = self.rng.fork();

        #[allow(clippy::expect_used)] // thread spawn failure is unrecoverable
        let worker = thread::Builder::new()
            .name("piwspr-tx".to_string())
            .spawn(move || {
                apply_sched_policy(policy, priority);
                let result = sched::run_pass(&mut engine, &params, &shared, &ppm, &mut rng);
                if let Err(e) = &result {
                    log::error!("[TX] pass failed: {}", e);
                }
                shared
                    .running
                    .store(false, std::sync::atomic::Ordering::Relaxed);
                (engine, result)
            })
            .expect("failed to spawn transmit worker");

        self.worker = Some(worker);
        Ok(())
    }

    /// Block until the worker finishes and recover the engine.
    ///
    /// A cooperative stop is reported as [`PassOutcome::Cancelled`], not
    /// as an error.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] with no worker to join or after a worker
    /// panic; any error the pass itself surfaced (e.g.
    /// [`Error::HardwareHung`]).
    pub fn join_transmission(&mut self) -> Result<PassOutcome> {
        let worker = self
            .worker
            .take()
            .ok_or_else(|| Error::InvalidState("no transmission running".into()))?;
        match worker.join() {
            Ok((engine, result)) => {
                self.engine = Some(engine);
                result
            }
            Err(_) => Err(Error::InvalidState("transmit worker panicked".into())),
        }
    }

    /// Observe the cooperative stop flag.
    pub fn is_stopping(&self) -> bool {
        self.shared.stopping()
    }

    /// True while a worker thread is executing a pass.
    pub fn is_running(&self) -> bool {
        self.shared
            .running
            .load(std::sync::atomic::Ordering::Relaxed)
    }

    /// A cloneable stop trigger, safe to move into a signal handler.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Raise the stop flag, join the worker, and force the hardware idle.
    /// Safe to call at any time, any number of times.
    pub fn shutdown_transmitter(&mut self) {
        self.shared.request_stop();
        if self.worker.is_some() {
            match self.join_transmission() {
                Ok(outcome) => log::info!("[TX] shutdown complete ({:?})", outcome),
                Err(e) => log::warn!("[TX] shutdown: worker reported {}", e),
            }
        }
        // The scheduler tears down on every exit path, but a shutdown must
        // leave the hardware idle even after a worker panic.
        if let Some(engine) = &mut self.engine {
            sched::disable_clock(&engine.periph);
            engine.ring.reset(&engine.periph);
        }
    }

    /// Release the ring, tuning page, pool and peripheral mapping.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] while a worker is still running; call
    /// [`shutdown_transmitter`](Transmitter::shutdown_transmitter) first.
    pub fn dma_cleanup(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Err(Error::InvalidState(
                "shutdown the transmitter before cleanup".into(),
            ));
        }
        self.engine = None;
        Ok(())
    }

    /// Human-readable summary of the configured transmission.
    pub fn print_parameters(&self) -> String {
        let Some(params) = &self.params else {
            return "no transmission configured".to_string();
        };
        let mode = match (&params.frame, params.window) {
            (None, _) => "tone".to_string(),
            (Some(_), TxWindow::Wspr15) => "WSPR-15".to_string(),
            (Some(_), _) => "WSPR-2".to_string(),
        };
        let dither = if params.use_offset {
            format!("+/-{:.0} Hz dither", params.window.rand_offset_bound())
        } else {
            "no dither".to_string()
        };
        format!(
            "{} on {} ({}), drive level {}, ppm {:.3}",
            mode,
            freq_display_string(params.frequency_hz + params.offset_hz),
            dither,
            params.power_level,
            self.ppm.current_ppm(),
        )
    }
}

impl Drop for Transmitter {
    fn drop(&mut self) {
        self.shutdown_transmitter();
    }
}

/// Promote the calling thread to the requested scheduling policy. Failure
/// is logged, not fatal: the DMA ring tolerates a best-effort worker, just
/// with more busy-wait overshoot.
fn apply_sched_policy(policy: SchedPolicy, priority: i32) {
    let (policy_c, priority) = match policy {
        SchedPolicy::Fifo => (libc::SCHED_FIFO, priority),
        SchedPolicy::RoundRobin => (libc::SCHED_RR, priority),
        SchedPolicy::Other => (libc::SCHED_OTHER, 0),
    };
    let param = libc::sched_param {
        sched_priority: priority,
    };
    // SAFETY: pthread_self is always valid; param outlives the call.
    let ret = unsafe { libc::pthread_setschedparam(libc::pthread_self(), policy_c, &param) };
    if ret != 0 {
        log::warn!(
            "[TX] could not apply scheduling policy (error {}); running best-effort",
            ret
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ppm::PpmSource;

    #[test]
    fn test_default_spec_is_wspr_skip() {
        let spec = TransmissionSpec::default();
        assert_eq!(spec.frequency_hz, 0.0);
        assert_eq!(spec.mode, TxMode::Wspr);
        assert_eq!(spec.power_level, 7);
    }

    #[test]
    fn test_wspr_setup_requires_message_fields() {
        let ppm = PpmSource::fixed(0.0);
        let mut tx = Transmitter::new(ppm.handle());
        let err = tx
            .setup_transmission(TransmissionSpec {
                frequency_hz: 14_097_100.0,
                ..TransmissionSpec::default()
            })
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[test]
    fn test_bad_callsign_surfaces_before_hardware_touch() {
        let ppm = PpmSource::fixed(0.0);
        let mut tx = Transmitter::new(ppm.handle());
        let err = tx
            .setup_transmission(TransmissionSpec {
                frequency_hz: 14_097_100.0,
                callsign: Some("K1ABC/P".into()),
                locator: Some("FN42".into()),
                power_dbm: Some(10),
                ..TransmissionSpec::default()
            })
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCallsign(_)));
    }

    #[test]
    fn test_join_without_worker_is_invalid_state() {
        let ppm = PpmSource::fixed(0.0);
        let mut tx = Transmitter::new(ppm.handle());
        assert!(matches!(
            tx.join_transmission(),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_shutdown_is_idempotent_without_worker() {
        let ppm = PpmSource::fixed(0.0);
        let mut tx = Transmitter::new(ppm.handle());
        tx.shutdown_transmitter();
        tx.shutdown_transmitter();
        assert!(tx.is_stopping());
    }

    #[test]
    fn test_stop_handle_sets_flag() {
        let ppm = PpmSource::fixed(0.0);
        let tx = Transmitter::new(ppm.handle());
        let handle = tx.stop_handle();
        assert!(!tx.is_stopping());
        handle.request_stop();
        assert!(tx.is_stopping());
    }

    #[test]
    fn test_print_parameters_unconfigured() {
        let ppm = PpmSource::fixed(0.0);
        let tx = Transmitter::new(ppm.handle());
        assert_eq!(tx.print_parameters(), "no transmission configured");
    }
}
