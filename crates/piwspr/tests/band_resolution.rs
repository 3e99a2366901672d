// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! End-to-end checks of the frequency-list surface: band tokens, numeric
//! strings with units, allocation validation, and the skip sentinel.

use piwspr::band::{freq_display_string, parse_frequency_string, resolve, resolve_with};
use piwspr::Error;

#[test]
fn canonical_band_scenarios() {
    let twenty = resolve("20m").unwrap();
    assert_eq!(twenty.frequency_hz, 14_097_100.0);
    assert!(!twenty.wspr15);

    let lf15 = resolve("lf-15").unwrap();
    assert_eq!(lf15.frequency_hz, 137_612.5);
    assert!(lf15.wspr15);

    let forty = resolve("7.040100 MHz").unwrap();
    assert_eq!(forty.frequency_hz, 7_040_100.0);

    assert!(matches!(resolve("99m"), Err(Error::InvalidBand(_))));

    let skip = resolve("0").unwrap();
    assert_eq!(skip.frequency_hz, 0.0);
}

#[test]
fn resolution_ignores_case_and_whitespace() {
    let reference = resolve("20m").unwrap();
    assert_eq!(resolve("20M").unwrap(), reference);
    assert_eq!(resolve("  20m  ").unwrap(), reference);
    assert_eq!(resolve("\t20M\n").unwrap(), reference);
}

#[test]
fn unit_suffixes_scale_correctly() {
    assert_eq!(parse_frequency_string("1 GHz").unwrap(), 1e9);
    assert_eq!(parse_frequency_string("475.812 khz").unwrap(), 475_812.0);
    assert_eq!(parse_frequency_string("780000 Hz").unwrap(), 780_000.0);
    assert_eq!(parse_frequency_string("780000").unwrap(), 780_000.0);
}

#[test]
fn validation_gates_numeric_input_only() {
    // 13 MHz is no-man's-land between 30m and 20m.
    assert!(matches!(
        resolve("13.0 MHz"),
        Err(Error::InvalidFrequency(_))
    ));
    assert_eq!(
        resolve_with("13.0 MHz", false).unwrap().frequency_hz,
        13_000_000.0
    );
}

#[test]
fn display_and_parse_agree() {
    for &hz in &[137_500.0, 475_700.0, 1_838_100.0, 7_040_100.0, 14_097_100.0] {
        let shown = freq_display_string(hz);
        let parsed = parse_frequency_string(&shown).unwrap();
        assert!(
            (parsed - hz).abs() < 1.0,
            "{hz} displayed as {shown}, parsed back to {parsed}"
        );
    }
}

#[test]
fn wspr15_flag_follows_token_suffix() {
    for token in ["lf", "mf", "160m"] {
        assert!(!resolve(token).unwrap().wspr15, "{token}");
        let with_suffix = format!("{token}-15");
        assert!(resolve(&with_suffix).unwrap().wspr15, "{with_suffix}");
    }
}
