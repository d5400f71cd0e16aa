// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! DPT 9.001 two-byte floating point codec.
//!
//! Neasmart temperature registers (setpoints, room and flow temperatures) carry
//! a KNX DPT 9.001 value:
//!
//! ```text
//!  15  14 13 12 11  10 ........................ 0
//! ┌───┬────────────┬─────────────────────────────┐
//! │ S │  exponent  │   mantissa (low 11 bits)    │
//! └───┴────────────┴─────────────────────────────┘
//! value = 0.01 * M * 2^E,  M = 12-bit two's complement (S is its top bit)
//! ```
//!
//! Precision halves with every exponent step: 0.01 at `E = 0`, 327.68 at
//! `E = 15`. Values outside [`MIN_VALUE`, `MAX_VALUE`] and non-finite input are
//! rejected with a [`CodecError`], never clamped.
//!
//! # Example
//!
//! ```
//! use neasmart_core::dpt9001;
//!
//! let raw = dpt9001::encode(21.5).unwrap();
//! assert_eq!(raw, 0x0C33);
//! assert_eq!(dpt9001::decode(raw), 21.5);
//! ```

use crate::error::CodecError;

/// Smallest representable value.
pub const MIN_VALUE: f64 = -671_088.64;

/// Largest representable value.
pub const MAX_VALUE: f64 = 670_760.96;

const MANTISSA_MIN: i64 = -2048;
const MANTISSA_MAX: i64 = 2047;
const MAX_EXPONENT: u32 = 15;
const SIGN_BIT: u16 = 0x8000;
const MANTISSA_MASK: u16 = 0x07FF;

/// Returns the closed range of encodable values.
pub const fn valid_range() -> (f64, f64) {
    (MIN_VALUE, MAX_VALUE)
}

/// Returns `true` if `value` is finite and inside [`valid_range`].
pub fn is_valid(value: f64) -> bool {
    value.is_finite() && (MIN_VALUE..=MAX_VALUE).contains(&value)
}

/// Encodes `value` as a DPT 9.001 register word.
///
/// The smallest exponent whose shifted mantissa fits in 12 signed bits is
/// chosen, so small values keep their 0.01 resolution.
pub fn encode(value: f64) -> Result<u16, CodecError> {
    let (mantissa, exponent) = split(value)?;

    // Low 11 bits of the two's complement mantissa; the sign goes to bit 15.
    let sign = if mantissa < 0 { SIGN_BIT } else { 0 };
    let low = (mantissa as u16) & MANTISSA_MASK;

    Ok(sign | ((exponent as u16) << 11) | low)
}

/// Decodes a DPT 9.001 register word.
pub fn decode(raw: u16) -> f64 {
    let exponent = u32::from((raw >> 11) & 0x0F);
    let low = i64::from(raw & MANTISSA_MASK);
    let mantissa = if raw & SIGN_BIT != 0 { low - 2048 } else { low };

    // Integer scaling keeps decode exact and repeatable.
    (mantissa << exponent) as f64 / 100.0
}

/// Returns the quantization step `encode` applies to `value`.
pub fn resolution(value: f64) -> Result<f64, CodecError> {
    let (_, exponent) = split(value)?;
    Ok(0.01 * f64::from(1u32 << exponent))
}

/// Validates `value` and returns its `(mantissa, exponent)` pair.
fn split(value: f64) -> Result<(i64, u32), CodecError> {
    if !value.is_finite() {
        return Err(CodecError::NotFinite { value });
    }
    if !(MIN_VALUE..=MAX_VALUE).contains(&value) {
        return Err(CodecError::out_of_range(value));
    }

    let hundredths = (value * 100.0).round() as i64;
    for exponent in 0..=MAX_EXPONENT {
        let mantissa = hundredths >> exponent;
        if (MANTISSA_MIN..=MANTISSA_MAX).contains(&mantissa) {
            return Ok((mantissa, exponent));
        }
    }

    Err(CodecError::out_of_range(value))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_room_temperature() {
        let raw = encode(21.5).unwrap();
        // 2150 needs one halving: mantissa 1075, exponent 1.
        assert_eq!(raw, (1 << 11) | 1075);
        assert_eq!(decode(raw), 21.5);
    }

    #[test]
    fn test_encode_zero() {
        assert_eq!(encode(0.0).unwrap(), 0);
        assert_eq!(decode(0), 0.0);
    }

    #[test]
    fn test_encode_small_values_keep_full_resolution() {
        let raw = encode(20.47).unwrap();
        assert_eq!(raw >> 11, 0);
        assert_eq!(decode(raw), 20.47);
    }

    #[test]
    fn test_encode_negative() {
        let raw = encode(-1.0).unwrap();
        assert_ne!(raw & SIGN_BIT, 0);
        assert_eq!(decode(raw), -1.0);

        let raw = encode(-0.01).unwrap();
        assert_eq!(raw, 0x87FF);
        assert_eq!(decode(raw), -0.01);
    }

    #[test]
    fn test_range_limits() {
        assert_eq!(valid_range(), (MIN_VALUE, MAX_VALUE));

        let max = encode(MAX_VALUE).unwrap();
        assert_eq!(max, 0x7FFF);
        assert_eq!(decode(max), MAX_VALUE);

        let min = encode(MIN_VALUE).unwrap();
        assert_eq!(min, 0xF800);
        assert_eq!(decode(min), MIN_VALUE);
    }

    #[test]
    fn test_large_value_uses_coarse_exponent() {
        let raw = encode(670_760.0).unwrap();
        assert_eq!((raw >> 11) & 0x0F, 15);
        let decoded = decode(raw);
        assert!((decoded - 670_760.0).abs() <= resolution(670_760.0).unwrap());
        assert_eq!(decoded, 670_433.28);
    }

    #[test]
    fn test_rejects_out_of_range() {
        assert!(matches!(
            encode(MAX_VALUE + 1.0),
            Err(CodecError::OutOfRange { .. })
        ));
        assert!(matches!(
            encode(MIN_VALUE - 1.0),
            Err(CodecError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_rejects_non_finite() {
        assert!(matches!(encode(f64::NAN), Err(CodecError::NotFinite { .. })));
        assert!(matches!(
            encode(f64::INFINITY),
            Err(CodecError::NotFinite { .. })
        ));
        assert!(matches!(
            encode(f64::NEG_INFINITY),
            Err(CodecError::NotFinite { .. })
        ));
    }

    #[test]
    fn test_is_valid() {
        assert!(is_valid(0.0));
        assert!(is_valid(MIN_VALUE));
        assert!(is_valid(MAX_VALUE));
        assert!(!is_valid(MAX_VALUE + 0.01));
        assert!(!is_valid(f64::NAN));
    }

    #[test]
    fn test_round_trip_within_resolution() {
        let samples = [
            -671_088.64, -40_000.5, -273.15, -12.34, -0.5, 0.01, 5.0, 18.25, 21.5, 22.0,
            35.7, 99.99, 1_234.56, 50_000.0, 670_760.96,
        ];
        for value in samples {
            let decoded = decode(encode(value).unwrap());
            let step = resolution(value).unwrap();
            assert!(
                (decoded - value).abs() <= step,
                "value {value} decoded to {decoded} (step {step})"
            );
        }
    }

    #[test]
    fn test_decode_encode_is_idempotent() {
        let mut value = MIN_VALUE;
        while value <= MAX_VALUE {
            let once = decode(encode(value).unwrap());
            let twice = decode(encode(once).unwrap());
            assert_eq!(once, twice, "drift for {value}");
            value += 1_234.567;
        }
    }

    #[test]
    fn test_decode_every_word_re_encodes_to_same_value() {
        for raw in 0..=u16::MAX {
            let value = decode(raw);
            assert_eq!(decode(encode(value).unwrap()), value, "raw {raw:#06x}");
        }
    }
}
