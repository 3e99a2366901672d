// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Band tokens and frequency parsing.
//!
//! The beacon accepts a frequency list whose entries are either band
//! tokens (`"20m"`, `"lf-15"`) or numeric frequencies with an optional
//! unit (`"7.040100 MHz"`, `"137500"`, `"1.4e5 kHz"`). Tokens resolve to
//! the standard WSPR dial + 1500 Hz center for the band; the `-15` suffix
//! selects the WSPR-15 cadence. Numeric input is checked against the
//! amateur allocations unless the caller opts out.
//!
//! `"0"` resolves to 0 Hz: the scheduler treats it as "consume this
//! window silently".

use crate::{Error, Result};

/// A parsed frequency-list entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedFrequency {
    /// Center frequency in Hz; 0.0 is the skip sentinel.
    pub frequency_hz: f64,
    /// True when the entry selects the 15-minute WSPR cadence.
    pub wspr15: bool,
}

/// WSPR center frequencies (dial + 1500 Hz) by band token, lowercase.
const WSPR_TOKENS: &[(&str, f64)] = &[
    ("lf", 137_500.0),
    ("lf-15", 137_612.5),
    ("mf", 475_700.0),
    ("mf-15", 475_812.5),
    ("160m", 1_838_100.0),
    ("160m-15", 1_838_212.5),
    ("80m", 3_570_100.0),
    ("60m", 5_288_700.0),
    ("40m", 7_040_100.0),
    ("30m", 10_140_200.0),
    ("20m", 14_097_100.0),
    ("17m", 18_106_100.0),
    ("15m", 21_096_100.0),
    ("12m", 24_926_100.0),
    ("10m", 28_126_100.0),
    ("6m", 50_294_500.0),
    ("4m", 70_092_500.0),
    ("2m", 144_490_500.0),
];

/// Amateur allocations, 2200 m through 1 mm, in Hz.
const HAM_BANDS: &[(u64, u64, &str)] = &[
    (135_700, 137_800, "2200M"),
    (472_000, 479_000, "630M"),
    (1_800_000, 2_000_000, "160M"),
    (3_500_000, 4_000_000, "80M"),
    (5_332_000, 5_405_000, "60M (Channelized)"),
    (7_000_000, 7_300_000, "40M"),
    (10_100_000, 10_150_000, "30M"),
    (14_000_000, 14_350_000, "20M"),
    (18_068_000, 18_168_000, "17M"),
    (21_000_000, 21_450_000, "15M"),
    (24_890_000, 24_990_000, "12M"),
    (28_000_000, 29_700_000, "10M"),
    (50_000_000, 54_000_000, "6M"),
    (144_000_000, 148_000_000, "2M"),
    (222_000_000, 225_000_000, "1.25M"),
    (420_000_000, 450_000_000, "70CM"),
    (902_000_000, 928_000_000, "33CM"),
    (1_240_000_000, 1_300_000_000, "23CM"),
    (2_300_000_000, 2_450_000_000, "13CM"),
    (3_300_000_000, 3_500_000_000, "9CM"),
    (5_650_000_000, 5_925_000_000, "6CM"),
    (10_000_000_000, 10_500_000_000, "3CM"),
    (24_000_000_000, 24_250_000_000, "1.2CM"),
    (47_000_000_000, 47_200_000_000, "6MM"),
    (75_500_000_000, 81_000_000_000, "4MM"),
    (122_250_000_000, 123_000_000_000, "2.5MM"),
    (134_000_000_000, 141_000_000_000, "2MM"),
    (241_000_000_000, 250_000_000_000, "1MM"),
];

/// Resolve a band token or numeric frequency, validating numeric input
/// against the amateur allocations.
///
/// # Errors
///
/// [`Error::InvalidBand`] for unknown tokens or unparseable strings,
/// [`Error::InvalidFrequency`] for numeric input outside every band.
pub fn resolve(input: &str) -> Result<ResolvedFrequency> {
    resolve_with(input, true)
}

/// [`resolve`], with allocation validation optional.
pub fn resolve_with(input: &str, validate: bool) -> Result<ResolvedFrequency> {
    let token = input.trim().to_ascii_lowercase();

    for (name, hz) in WSPR_TOKENS {
        if *name == token {
            return Ok(ResolvedFrequency {
                frequency_hz: *hz,
                wspr15: name.ends_with("-15"),
            });
        }
    }

    let hz = parse_frequency_string(&token)?;
    if hz == 0.0 {
        // Skip sentinel: aligned silence.
        return Ok(ResolvedFrequency {
            frequency_hz: 0.0,
            wspr15: false,
        });
    }
    if validate && band_for(hz).is_none() {
        return Err(Error::InvalidFrequency(hz));
    }
    Ok(ResolvedFrequency {
        frequency_hz: hz,
        wspr15: false,
    })
}

/// Parse a frequency string: a float (decimal or scientific) with an
/// optional case-insensitive `Hz`/`kHz`/`MHz`/`GHz` suffix; a bare number
/// is Hz.
///
/// # Errors
///
/// [`Error::InvalidBand`] when nothing numeric can be extracted.
pub fn parse_frequency_string(input: &str) -> Result<f64> {
    let text = input.trim();
    if let Ok(hz) = text.parse::<f64>() {
        return Ok(hz);
    }

    let lower = text.to_ascii_lowercase();
    // Longest suffixes first, or "hz" would shadow the scaled units.
    for (unit, scale) in [("ghz", 1e9), ("mhz", 1e6), ("khz", 1e3), ("hz", 1.0)] {
        if let Some(number) = lower.strip_suffix(unit) {
            if let Ok(value) = number.trim().parse::<f64>() {
                return Ok(value * scale);
            }
        }
    }
    Err(Error::InvalidBand(input.to_string()))
}

/// Name of the amateur band containing `hz`, if any.
pub fn band_for(hz: f64) -> Option<&'static str> {
    if !hz.is_finite() || hz < 0.0 {
        return None;
    }
    let hz = hz as u64;
    HAM_BANDS
        .iter()
        .find(|(lo, hi, _)| (*lo..=*hi).contains(&hz))
        .map(|(_, _, name)| *name)
}

/// Human-readable rendering with the unit chosen by magnitude.
pub fn freq_display_string(hz: f64) -> String {
    if hz >= 1e9 {
        format!("{:.9} GHz", hz / 1e9)
    } else if hz >= 1e6 {
        format!("{:.6} MHz", hz / 1e6)
    } else if hz >= 1e3 {
        format!("{:.3} kHz", hz / 1e3)
    } else {
        format!("{:.0} Hz", hz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_lookup() {
        let r = resolve("20m").unwrap();
        assert_eq!(r.frequency_hz, 14_097_100.0);
        assert!(!r.wspr15);
    }

    #[test]
    fn test_token_is_case_and_space_insensitive() {
        assert_eq!(resolve("20M").unwrap(), resolve("20m").unwrap());
        assert_eq!(resolve("  20m  ").unwrap(), resolve("20m").unwrap());
    }

    #[test]
    fn test_wspr15_token() {
        let r = resolve("lf-15").unwrap();
        assert_eq!(r.frequency_hz, 137_612.5);
        assert!(r.wspr15);
    }

    #[test]
    fn test_numeric_with_unit() {
        let r = resolve("7.040100 MHz").unwrap();
        assert_eq!(r.frequency_hz, 7_040_100.0);
        assert!(!r.wspr15);
    }

    #[test]
    fn test_numeric_scientific_notation() {
        assert_eq!(parse_frequency_string("1.4e5 kHz").unwrap(), 1.4e8);
        assert_eq!(parse_frequency_string("7.0401e6").unwrap(), 7_040_100.0);
    }

    #[test]
    fn test_bare_number_is_hz() {
        assert_eq!(parse_frequency_string("137500").unwrap(), 137_500.0);
    }

    #[test]
    fn test_unknown_token_rejected() {
        assert!(matches!(resolve("99m"), Err(Error::InvalidBand(_))));
    }

    #[test]
    fn test_out_of_band_numeric_rejected() {
        assert!(matches!(
            resolve("13000000"),
            Err(Error::InvalidFrequency(_))
        ));
        // ...unless validation is off.
        let r = resolve_with("13000000", false).unwrap();
        assert_eq!(r.frequency_hz, 13_000_000.0);
    }

    #[test]
    fn test_zero_is_skip_sentinel() {
        let r = resolve("0").unwrap();
        assert_eq!(r.frequency_hz, 0.0);
    }

    #[test]
    fn test_band_for() {
        assert_eq!(band_for(14_097_100.0), Some("20M"));
        assert_eq!(band_for(137_612.5), Some("2200M"));
        assert_eq!(band_for(13_000_000.0), None);
        assert_eq!(band_for(-1.0), None);
    }

    #[test]
    fn test_display_string_units() {
        assert_eq!(freq_display_string(14_097_100.0), "14.097100 MHz");
        assert_eq!(freq_display_string(137_612.5), "137.613 kHz");
        assert_eq!(freq_display_string(780.0), "780 Hz");
        assert_eq!(freq_display_string(10_368_200_000.0), "10.368200000 GHz");
    }

    #[test]
    fn test_display_parse_round_trip() {
        for hz in [14_097_100.0, 7_040_100.0, 475_700.0, 137_500.0] {
            let displayed = freq_display_string(hz);
            let parsed = parse_frequency_string(&displayed).unwrap();
            assert!((parsed - hz).abs() < 1.0, "{hz} -> {displayed} -> {parsed}");
        }
    }
}
