// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Runtime SoC discovery.
//!
//! Two device-tree files tell us everything the synthesizer needs to know
//! about the board it is running on:
//!
//! - `/proc/device-tree/soc/ranges` holds the physical base of the
//!   peripheral window (big-endian u32 at byte offset 4; newer trees use a
//!   64-bit child address, pushing it to offset 8).
//! - `/sys/firmware/devicetree/base/compatible` is a NUL-separated list of
//!   `vendor,model` strings whose `bcmNNNN` token identifies the SoC
//!   family, which in turn selects the PLLD nominal frequency and the
//!   mailbox memory-allocation flag.
//!
//! The parsers are pure functions over byte slices so they can be tested
//! without a Pi on the desk.

use std::fs;

use crate::{Error, Result};

const DT_RANGES: &str = "/proc/device-tree/soc/ranges";
const DT_COMPATIBLE: &str = "/sys/firmware/devicetree/base/compatible";

/// Peripheral base used when the device tree is silent (original BCM2835).
const FALLBACK_PERI_BASE: u32 = 0x2000_0000;

/// BCM283x / BCM2711 SoC families this crate knows how to clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocFamily {
    /// Pi 1 / Zero class.
    Bcm2835,
    /// Pi 2.
    Bcm2836,
    /// Pi 3 / Zero 2.
    Bcm2837,
    /// Pi 4 / Pi 400 / CM4.
    Bcm2711,
}

impl SocFamily {
    /// Nominal PLLD frequency in Hz.
    ///
    /// On the BCM2835 class a systematic 2.5 ppm offset between the
    /// NTP-reported correction and the actual crystal error has been
    /// measured in the field; it is folded into the nominal value so the
    /// PPM source does not have to know about it.
    pub fn plld_hz(self) -> f64 {
        match self {
            SocFamily::Bcm2835 => 500_000_000.0 * (1.0 - 2.500e-6),
            SocFamily::Bcm2836 | SocFamily::Bcm2837 => 500_000_000.0,
            SocFamily::Bcm2711 => 750_000_000.0,
        }
    }

    /// Mailbox memory-allocation flag for uncached contiguous RAM.
    ///
    /// The BCM2835 wants the L1/L2-coherent alias (0x0C); everything newer
    /// uses the direct alias (0x04).
    pub fn mem_flag(self) -> u32 {
        match self {
            SocFamily::Bcm2835 => 0x0C,
            _ => 0x04,
        }
    }
}

impl std::fmt::Display for SocFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SocFamily::Bcm2835 => "BCM2835",
            SocFamily::Bcm2836 => "BCM2836",
            SocFamily::Bcm2837 => "BCM2837",
            SocFamily::Bcm2711 => "BCM2711",
        };
        f.write_str(name)
    }
}

/// Everything the synthesizer needs to know about the board, probed once.
#[derive(Debug, Clone)]
pub struct BoardInfo {
    /// SoC family from the device tree.
    pub family: SocFamily,
    /// Physical address of the peripheral window.
    pub peripheral_base: u32,
    /// Nominal PLLD frequency in Hz (before PPM correction).
    pub plld_hz: f64,
    /// Mailbox memory-allocation flag.
    pub mem_flag: u32,
}

impl BoardInfo {
    /// Probe the running board through the device tree.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownSoc`] when the compatible string names no
    /// supported `bcmNNNN` token. A missing or unreadable `soc/ranges`
    /// falls back to the BCM2835 base rather than failing.
    pub fn probe() -> Result<BoardInfo> {
        let compatible = fs::read(DT_COMPATIBLE)
            .map_err(|e| Error::UnknownSoc(format!("{}: {}", DT_COMPATIBLE, e)))?;
        let family = parse_compatible(&compatible).ok_or_else(|| {
            Error::UnknownSoc(String::from_utf8_lossy(&compatible).into_owned())
        })?;

        let peripheral_base = fs::read(DT_RANGES)
            .ok()
            .and_then(|ranges| parse_ranges(&ranges))
            .unwrap_or(FALLBACK_PERI_BASE);

        log::info!(
            "[BOARD] {} detected, peripherals at {:#010x}, PLLD {:.0} Hz",
            family,
            peripheral_base,
            family.plld_hz()
        );

        Ok(BoardInfo {
            family,
            peripheral_base,
            plld_hz: family.plld_hz(),
            mem_flag: family.mem_flag(),
        })
    }
}

/// Extract the peripheral base from a raw `soc/ranges` blob.
///
/// The second cell (offset 4) is the parent bus address on classic trees;
/// when it reads zero the tree uses a 64-bit child address and the base
/// lives one cell later (offset 8). Returns `None` for a blob too short to
/// hold either.
pub(crate) fn parse_ranges(ranges: &[u8]) -> Option<u32> {
    let cell = |offset: usize| -> Option<u32> {
        let bytes: [u8; 4] = ranges.get(offset..offset + 4)?.try_into().ok()?;
        Some(u32::from_be_bytes(bytes))
    };
    match cell(4)? {
        0 => cell(8).filter(|&base| base != 0),
        base => Some(base),
    }
}

/// Find the first `bcmNNNN` token in a NUL-separated compatible list.
///
/// The downstream `bcm2708/9/10` names are aliases for the mainline
/// `bcm2835/6/7` families and map accordingly.
pub(crate) fn parse_compatible(compatible: &[u8]) -> Option<SocFamily> {
    let text = String::from_utf8_lossy(compatible);
    for token in text.split(|c: char| c == '\0' || c == ',') {
        let family = match token.trim().to_ascii_lowercase().as_str() {
            "bcm2835" | "bcm2708" => Some(SocFamily::Bcm2835),
            "bcm2836" | "bcm2709" => Some(SocFamily::Bcm2836),
            "bcm2837" | "bcm2710" => Some(SocFamily::Bcm2837),
            "bcm2711" => Some(SocFamily::Bcm2711),
            _ => None,
        };
        if family.is_some() {
            return family;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_compatible_pi4() {
        let blob = b"raspberrypi,4-model-b\0brcm,bcm2711\0";
        assert_eq!(parse_compatible(blob), Some(SocFamily::Bcm2711));
    }

    #[test]
    fn test_parse_compatible_pi1_downstream_alias() {
        let blob = b"raspberrypi,model-b\0brcm,bcm2708\0";
        assert_eq!(parse_compatible(blob), Some(SocFamily::Bcm2835));
    }

    #[test]
    fn test_parse_compatible_unknown() {
        let blob = b"acme,frobnicator\0";
        assert_eq!(parse_compatible(blob), None);
    }

    #[test]
    fn test_parse_ranges_classic() {
        // <0x7e000000 0x3f000000 0x01000000>
        let blob = [
            0x7E, 0x00, 0x00, 0x00, 0x3F, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00,
        ];
        assert_eq!(parse_ranges(&blob), Some(0x3F00_0000));
    }

    #[test]
    fn test_parse_ranges_64bit_child() {
        // <0x7e000000 0x0 0xfe000000 0x01800000> (Pi 4 layout)
        let blob = [
            0x7E, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xFE, 0x00, 0x00, 0x00, 0x01, 0x80,
            0x00, 0x00,
        ];
        assert_eq!(parse_ranges(&blob), Some(0xFE00_0000));
    }

    #[test]
    fn test_parse_ranges_truncated() {
        assert_eq!(parse_ranges(&[0x7E, 0x00]), None);
    }

    #[test]
    fn test_plld_pi1_offset_applied() {
        let plld = SocFamily::Bcm2835.plld_hz();
        assert!(plld < 500_000_000.0);
        assert!((plld - 500_000_000.0 * (1.0 - 2.5e-6)).abs() < 1e-3);
    }

    #[test]
    fn test_mem_flags() {
        assert_eq!(SocFamily::Bcm2835.mem_flag(), 0x0C);
        assert_eq!(SocFamily::Bcm2711.mem_flag(), 0x04);
    }
}
