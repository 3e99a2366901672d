// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Clock-drift estimation.
//!
//! The crystal feeding PLLD drifts with temperature and age; the time
//! daemon already measures that drift to keep the wall clock honest, so
//! the beacon borrows its number. A [`PpmSource`] is either a fixed value
//! (operator-supplied calibration) or a background thread that refreshes
//! once a minute from `chronyc tracking`, falling back to the kernel's
//! `adjtimex` frequency word when chrony is not installed.
//!
//! A failed query keeps the previous estimate; the scheduler samples
//! [`PpmHandle::current_ppm`] exactly once per transmission arming.

use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

/// Refresh cadence of the tracking thread.
const POLL_INTERVAL: Duration = Duration::from_secs(60);

struct PpmInner {
    value: Mutex<f64>,
    stop: AtomicBool,
}

/// Cloneable read handle onto a [`PpmSource`].
#[derive(Clone)]
pub struct PpmHandle {
    inner: Arc<PpmInner>,
}

impl PpmHandle {
    /// Latest drift estimate in parts-per-million.
    pub fn current_ppm(&self) -> f64 {
        *self.inner.value.lock()
    }
}

/// Owns the optional tracking thread.
pub struct PpmSource {
    inner: Arc<PpmInner>,
    worker: Option<JoinHandle<()>>,
}

impl PpmSource {
    /// A fixed drift value; no background activity.
    pub fn fixed(ppm: f64) -> PpmSource {
        PpmSource {
            inner: Arc::new(PpmInner {
                value: Mutex::new(ppm),
                stop: AtomicBool::new(false),
            }),
            worker: None,
        }
    }

    /// Track the time daemon, starting from `initial` until the first
    /// successful query.
    pub fn ntp_tracked(initial: f64) -> PpmSource {
        let inner = Arc::new(PpmInner {
            value: Mutex::new(initial),
            stop: AtomicBool::new(false),
        });
        let thread_inner = Arc::clone(&inner);

        #[allow(clippy::expect_used)] // thread spawn failure is unrecoverable
        let worker = thread::Builder::new()
            .name("piwspr-ppm".to_string())
            .spawn(move || track_loop(&thread_inner))
            .expect("failed to spawn PPM tracking thread");

        PpmSource {
            inner,
            worker: Some(worker),
        }
    }

    /// Read handle for the scheduler.
    pub fn handle(&self) -> PpmHandle {
        PpmHandle {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Stop and join the tracking thread, if any.
    pub fn stop(&mut self) {
        self.inner.stop.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for PpmSource {
    fn drop(&mut self) {
        self.stop();
    }
}

fn track_loop(inner: &PpmInner) {
    loop {
        match query_ppm() {
            Some(ppm) => {
                let mut value = inner.value.lock();
                if (*value - ppm).abs() > f64::EPSILON {
                    log::info!("[PPM] drift estimate updated: {:.4} ppm", ppm);
                    *value = ppm;
                }
            }
            None => {
                log::debug!("[PPM] query failed, keeping previous estimate");
            }
        }

        // Sleep in 1 s slices so stop() returns promptly.
        let mut slept = Duration::ZERO;
        while slept < POLL_INTERVAL {
            if inner.stop.load(Ordering::Relaxed) {
                return;
            }
            thread::sleep(Duration::from_secs(1));
            slept += Duration::from_secs(1);
        }
        if inner.stop.load(Ordering::Relaxed) {
            return;
        }
    }
}

/// One estimate, preferring chrony over the kernel.
fn query_ppm() -> Option<f64> {
    query_chronyc().or_else(query_adjtimex)
}

/// Parse the `Frequency` line of `chronyc tracking`.
fn query_chronyc() -> Option<f64> {
    let output = Command::new("chronyc").arg("tracking").output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout);
    for line in text.lines() {
        if line.trim_start().starts_with("Frequency") {
            // "Frequency : 6.855 ppm slow"
            return line
                .split(':')
                .nth(1)?
                .split_whitespace()
                .next()?
                .parse::<f64>()
                .ok();
        }
    }
    None
}

/// Kernel frequency word via `adjtimex`, scaled from 16.16 fixed point.
fn query_adjtimex() -> Option<f64> {
    // SAFETY: timex is a plain-data struct the kernel fills in; modes = 0
    // requests a read-only query.
    unsafe {
        let mut tx: libc::timex = std::mem::zeroed();
        tx.modes = 0;
        if libc::adjtimex(&mut tx) < 0 {
            return None;
        }
        Some(tx.freq as f64 / f64::from(1 << 16))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_source_returns_value() {
        let src = PpmSource::fixed(-3.25);
        assert_eq!(src.handle().current_ppm(), -3.25);
    }

    #[test]
    fn test_handle_sees_updates() {
        let src = PpmSource::fixed(0.0);
        let handle = src.handle();
        *src.inner.value.lock() = 1.5;
        assert_eq!(handle.current_ppm(), 1.5);
    }

    #[test]
    fn test_tracked_source_stops_promptly() {
        let mut src = PpmSource::ntp_tracked(0.75);
        src.stop();
        assert!(src.worker.is_none());
        // Idempotent.
        src.stop();
    }
}
