//! Conversion between `M:SS` / `M:SS.fff` lyric timestamps and seconds.

use crate::error::{CoreError, Result};

/// Parse a lyric timestamp such as `"0:12"` or `"1:05.250"` into seconds.
///
/// Surrounding whitespace is ignored. The input must contain exactly one
/// `:`; the left side is whole minutes, the right side a non-negative
/// decimal number of seconds. Seconds are not range-checked, so `"0:75"`
/// parses as 75 seconds.
///
/// # Errors
///
/// Returns [`CoreError::TimestampFormat`] when the input does not have the
/// `minutes:seconds` shape or either part is not a number.
pub fn parse_timestamp(input: &str) -> Result<f64> {
    let trimmed = input.trim();
    let mut parts = trimmed.split(':');

    let (Some(minutes), Some(seconds), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(format_error(input, "expected exactly one ':' separator"));
    };

    let minutes: u32 = minutes
        .trim()
        .parse()
        .map_err(|_| format_error(input, "minutes are not a whole number"))?;

    let seconds: f64 = seconds
        .trim()
        .parse()
        .map_err(|_| format_error(input, "seconds are not a number"))?;

    if !seconds.is_finite() || seconds < 0.0 {
        return Err(format_error(input, "seconds must be a finite, non-negative number"));
    }

    Ok(f64::from(minutes) * 60.0 + seconds)
}

/// Format seconds as `M:SS.fff`, the inverse of [`parse_timestamp`].
///
/// Negative and non-finite inputs are formatted as `0:00.000`.
#[must_use]
pub fn format_timestamp(seconds: f64) -> String {
    let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };

    // Clamped to a non-negative finite value above.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let total_millis = (seconds * 1000.0).round() as u64;

    let minutes = total_millis / 60_000;
    let secs = (total_millis % 60_000) / 1000;
    let millis = total_millis % 1000;

    format!("{minutes}:{secs:02}.{millis:03}")
}

fn format_error(input: &str, reason: &str) -> CoreError {
    CoreError::TimestampFormat {
        input: input.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minutes_and_seconds() {
        assert!((parse_timestamp("0:12").unwrap() - 12.0).abs() < 1e-9);
        assert!((parse_timestamp("1:05.25").unwrap() - 65.25).abs() < 1e-9);
        assert!((parse_timestamp("12:00.000").unwrap() - 720.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_trims_whitespace() {
        assert!((parse_timestamp("  0:03.5 ").unwrap() - 3.5).abs() < 1e-9);
        assert!((parse_timestamp("0 : 03").unwrap() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_trailing_dot() {
        // "0:03." is accepted, matching the marker grammar `\d+:\d+(\.\d*)?`
        assert!((parse_timestamp("0:03.").unwrap() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for input in ["abc", "1:2:3", "1:", ":30", "", "-1:00", "1:-2", "x:10", "1:NaN", "1:inf"] {
            let err = parse_timestamp(input).unwrap_err();
            assert!(
                matches!(err, CoreError::TimestampFormat { .. }),
                "expected format error for {input:?}, got {err:?}"
            );
        }
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0.0), "0:00.000");
        assert_eq!(format_timestamp(65.25), "1:05.250");
        assert_eq!(format_timestamp(600.5), "10:00.500");
        assert_eq!(format_timestamp(-3.0), "0:00.000");
        assert_eq!(format_timestamp(f64::NAN), "0:00.000");
    }

    #[test]
    fn test_format_then_parse_round_trip() {
        for minutes in [0_u32, 1, 7, 59, 120] {
            for millis in (0..60_000_u32).step_by(1337) {
                let expected = f64::from(minutes) * 60.0 + f64::from(millis) / 1000.0;
                let parsed = parse_timestamp(&format_timestamp(expected)).unwrap();
                assert!(
                    (parsed - expected).abs() < 1e-6,
                    "{minutes}m {millis}ms: {parsed} != {expected}"
                );
            }
        }
    }
}
