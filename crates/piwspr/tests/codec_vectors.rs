// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Golden-vector tests for the WSPR encoder.
//!
//! The full 162-symbol frames below were produced by a known-good encoder
//! and decode cleanly in WSJT-X; any change to packing, FEC, interleave
//! or sync overlay shows up here immediately.

use piwspr::codec::{WsprFrame, SYMBOL_COUNT};

const K1ABC_FN42_10: [u8; SYMBOL_COUNT] = [
    3, 3, 0, 0, 2, 2, 0, 2, 1, 2, 2, 0, 1, 1, 1, 0, 2, 2, 1, 2, 0, 1, 2, 3, 1, 1, 3, 2, 2, 2, 2,
    2, 0, 0, 3, 2, 0, 3, 2, 1, 2, 2, 0, 2, 2, 0, 3, 0, 1, 1, 0, 2, 3, 1, 2, 3, 0, 2, 2, 1, 3, 2,
    1, 0, 2, 2, 0, 1, 3, 2, 3, 2, 3, 2, 1, 2, 1, 0, 2, 1, 2, 2, 3, 0, 1, 3, 2, 0, 0, 1, 3, 2, 3,
    0, 3, 2, 2, 0, 3, 2, 2, 2, 2, 0, 1, 0, 2, 3, 0, 0, 1, 3, 1, 0, 3, 3, 0, 2, 3, 3, 2, 3, 2, 0,
    2, 1, 3, 1, 2, 0, 0, 0, 0, 3, 0, 1, 2, 0, 1, 1, 2, 2, 2, 2, 2, 2, 2, 1, 3, 2, 3, 0, 3, 1, 2,
    0, 0, 1, 1, 2, 2, 2,
];

const AA0NT_EM18_20: [u8; SYMBOL_COUNT] = [
    1, 3, 2, 0, 0, 0, 0, 2, 3, 0, 2, 0, 1, 1, 1, 0, 0, 0, 3, 0, 2, 3, 2, 1, 1, 1, 3, 0, 0, 0, 0,
    2, 2, 2, 3, 0, 0, 1, 2, 3, 0, 0, 2, 2, 2, 0, 1, 2, 1, 1, 2, 0, 3, 3, 2, 1, 0, 0, 0, 3, 1, 0,
    3, 0, 2, 2, 2, 1, 3, 0, 1, 0, 3, 0, 3, 2, 3, 0, 0, 3, 0, 0, 3, 2, 3, 3, 2, 0, 2, 1, 3, 2, 1,
    0, 3, 0, 2, 2, 3, 2, 2, 0, 2, 0, 3, 2, 2, 3, 2, 2, 1, 3, 1, 0, 3, 1, 0, 2, 1, 3, 0, 1, 0, 2,
    2, 1, 1, 1, 0, 0, 0, 2, 2, 1, 0, 3, 0, 2, 1, 1, 0, 2, 0, 0, 2, 2, 2, 3, 1, 0, 3, 0, 3, 3, 2,
    0, 0, 1, 1, 0, 0, 2,
];

#[test]
fn k1abc_fn42_10_matches_golden_frame() {
    let frame = WsprFrame::encode("K1ABC", "FN42", 10).unwrap();
    assert_eq!(frame.symbols(), &K1ABC_FN42_10);
}

#[test]
fn aa0nt_em18_20_matches_golden_frame() {
    let frame = WsprFrame::encode("AA0NT", "EM18", 20).unwrap();
    assert_eq!(frame.symbols(), &AA0NT_EM18_20);
}

#[test]
fn golden_frame_head_and_tail() {
    let frame = WsprFrame::encode("K1ABC", "FN42", 10).unwrap();
    assert_eq!(&frame.symbols()[..8], &[3, 3, 0, 0, 2, 2, 0, 2]);
    assert_eq!(frame.symbols()[SYMBOL_COUNT - 1], 2);
}

#[test]
fn encoding_is_case_insensitive() {
    let upper = WsprFrame::encode("K1ABC", "FN42", 10).unwrap();
    let lower = WsprFrame::encode("k1abc", "fn42", 10).unwrap();
    assert_eq!(upper, lower);
}

#[test]
fn six_char_locator_encodes_like_its_square() {
    let four = WsprFrame::encode("AA0NT", "EM18", 20).unwrap();
    let six = WsprFrame::encode("AA0NT", "EM18pd", 20).unwrap();
    assert_eq!(four, six);
}

#[test]
fn clamped_power_encodes_like_the_bound() {
    let at_bound = WsprFrame::encode("K1ABC", "FN42", 60).unwrap();
    let beyond = WsprFrame::encode("K1ABC", "FN42", 61).unwrap();
    assert_eq!(at_bound, beyond);

    let at_zero = WsprFrame::encode("K1ABC", "FN42", 0).unwrap();
    let below = WsprFrame::encode("K1ABC", "FN42", -1).unwrap();
    assert_eq!(at_zero, below);
}

#[test]
fn every_valid_frame_is_162_small_symbols() {
    for (call, grid, dbm) in [
        ("K1ABC", "FN42", 37),
        ("W1AW", "FN31", 30),
        ("G0ABC", "IO91", 23),
        ("VK2XYZ", "QF56", 10),
    ] {
        let frame = WsprFrame::encode(call, grid, dbm).unwrap();
        assert_eq!(frame.symbols().len(), SYMBOL_COUNT);
        assert!(frame.symbols().iter().all(|&s| s <= 3), "{call}");
    }
}
