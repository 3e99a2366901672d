// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # piwspr - software-defined WSPR beacon for BCM283x/BCM2711 boards
//!
//! Generates a narrow-band 4-FSK WSPR signal (or a plain carrier) directly
//! on GPIO4 by programming the SoC's fractional clock divider through a
//! DMA-driven control-block ring. There is no external modulator: the RF is
//! the GPCLK0 output itself, dithered between two divisor values so the
//! time-averaged frequency resolves well below the divider's native 2^-12
//! step.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use piwspr::{band, PpmSource, TransmissionSpec, Transmitter, SchedPolicy};
//!
//! fn main() -> piwspr::Result<()> {
//!     let resolved = band::resolve("20m")?;
//!     let ppm = PpmSource::fixed(0.0);
//!
//!     let mut tx = Transmitter::new(ppm.handle());
//!     tx.setup_transmission(TransmissionSpec {
//!         frequency_hz: resolved.frequency_hz,
//!         wspr15: resolved.wspr15,
//!         callsign: Some("K1ABC".into()),
//!         locator: Some("FN42".into()),
//!         power_dbm: Some(10),
//!         ..TransmissionSpec::default()
//!     })?;
//!     tx.start_threaded_transmission(SchedPolicy::Fifo, 30)?;
//!     tx.join_transmission()?;
//!     tx.shutdown_transmitter();
//!     tx.dma_cleanup()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------------+
//! |                        Transmitter facade                          |
//! |    setup / start / join / shutdown / cleanup   (worker thread)     |
//! +--------------------------------------------------------------------+
//! |                        Transmit scheduler                          |
//! |   UTC window wait | PPM sample | arming | 162-symbol loop | tone   |
//! +--------------------------------------------------------------------+
//! |  WSPR codec  |  band resolver  |  PPM source  |  tuning table      |
//! +--------------------------------------------------------------------+
//! |                      DMA control-block ring                        |
//! |   divider writes to CM_GP0DIV paced by PWM-FIFO DREQ transfers     |
//! +--------------------------------------------------------------------+
//! |             peripheral map  |  VideoCore mailbox pool              |
//! |        /dev/mem window         uncached contiguous pages           |
//! +--------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Transmitter`] | Owns the hardware engine and the worker thread |
//! | [`TransmissionSpec`] | One configured transmission (WSPR or tone) |
//! | [`PpmSource`] | Clock-drift estimate, fixed or NTP-tracked |
//! | [`codec::WsprFrame`] | 162 channel symbols for a (call, grid, dBm) |
//! | [`band::ResolvedFrequency`] | Band token or numeric string, in Hz |
//!
//! ## Hardware notes
//!
//! Requires root (or equivalent capabilities) for `/dev/mem` and
//! `/dev/vcio`. Exactly one [`Transmitter`] may exist per process: the
//! peripheral window, the mailbox allocation and DMA channel 0 are
//! process-wide singletons.

/// Band-token and numeric frequency resolution against amateur allocations.
pub mod band;
/// WSPR type-1 message encoding (packing, FEC, interleave, sync overlay).
pub mod codec;
/// DMA signal synthesizer: control blocks, ring, tuning table, symbols.
pub mod dma;
/// Hardware access layer: SoC probe, peripheral map, mailbox page pool.
pub mod hw;
/// Clock-drift (parts-per-million) estimation.
pub mod ppm;
/// Transmission scheduling and the transmitter facade.
pub mod tx;

pub use ppm::{PpmHandle, PpmSource};
pub use tx::sched::TxWindow;
pub use tx::transmitter::{
    PassOutcome, SchedPolicy, StopHandle, TransmissionSpec, Transmitter, TxMode,
};

/// Errors returned by piwspr operations.
///
/// Hardware-initialization failures are fatal for the facade; argument-shape
/// errors are surfaced before the worker thread starts. A cooperative stop
/// is *not* an error (see [`PassOutcome::Cancelled`]).
#[derive(Debug)]
pub enum Error {
    // ========================================================================
    // Hardware initialization
    // ========================================================================
    /// `/dev/mem` open or peripheral mmap failed.
    MappingFailed(std::io::Error),
    /// VideoCore mailbox open, property call, or memory allocation failed.
    MailboxFailed(String),
    /// The device tree names a SoC this crate does not know how to clock.
    UnknownSoc(String),
    /// The uncached page pool was asked for more pages than it holds.
    PoolExhausted,

    // ========================================================================
    // Argument shape
    // ========================================================================
    /// Numeric frequency outside every amateur allocation (validation on).
    InvalidFrequency(f64),
    /// Unknown band token or unparseable frequency string.
    InvalidBand(String),
    /// Callsign does not fit the supported type-1 WSPR packing.
    InvalidCallsign(String),
    /// Locator is not a 4-character (or truncatable 6-character) Maidenhead
    /// grid square.
    InvalidLocator(String),

    // ========================================================================
    // Facade state
    // ========================================================================
    /// `start_threaded_transmission` called while a worker is joinable.
    AlreadyRunning,
    /// Operation is not valid in the facade's current state.
    InvalidState(String),
    /// A DMA busy-wait exceeded its outer timeout; the engine never
    /// advanced past a control block.
    HardwareHung(&'static str),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::MappingFailed(e) => write!(f, "peripheral mapping failed: {}", e),
            Error::MailboxFailed(msg) => write!(f, "mailbox failure: {}", msg),
            Error::UnknownSoc(token) => write!(f, "unknown SoC family: {}", token),
            Error::PoolExhausted => write!(f, "uncached page pool exhausted"),
            Error::InvalidFrequency(hz) => {
                write!(f, "frequency {} Hz is outside every amateur band", hz)
            }
            Error::InvalidBand(token) => write!(f, "unknown band or frequency: {:?}", token),
            Error::InvalidCallsign(call) => write!(f, "unsupported callsign: {:?}", call),
            Error::InvalidLocator(loc) => write!(f, "invalid grid square: {:?}", loc),
            Error::AlreadyRunning => write!(f, "a transmission worker is already running"),
            Error::InvalidState(msg) => write!(f, "invalid state: {}", msg),
            Error::HardwareHung(what) => {
                write!(f, "hardware hung: {} never advanced", what)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::MappingFailed(e) => Some(e),
            _ => None,
        }
    }
}

/// Convenience result type for piwspr operations.
pub type Result<T> = std::result::Result<T, Error>;
