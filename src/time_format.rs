//! Conversion between whole seconds and the `HH:MM:SS` clock strings shown in
//! the timing table.

use crate::error::{Error, Result};

/// Formats seconds as a zero-padded `HH:MM:SS` string. Hours are not capped,
/// so 100 hours renders as `100:00:00`.
pub fn format(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    format!("{hours:02}:{minutes:02}:{secs:02}")
}

/// Formats a signed difference, `+` for zero and above.
pub fn format_signed(delta_seconds: i64) -> String {
    let sign = if delta_seconds >= 0 { '+' } else { '-' };
    format!("{sign}{}", format(delta_seconds.unsigned_abs()))
}

/// Parses `H:MM:SS` or `HH:MM:SS` back into seconds.
///
/// Minutes and seconds must be exactly two digits; hours one or two. Longer
/// hour fields are only accepted in the form [`format`] produces them (no
/// leading zero), so every formatted value parses back. Anything else (signs,
/// whitespace, extra fields, overflow) is rejected with
/// [`Error::InvalidFormat`].
pub fn parse(value: &str) -> Result<u64> {
    let invalid = || Error::InvalidFormat(value.to_string());

    let mut fields = value.split(':');
    let (Some(hours), Some(minutes), Some(seconds), None) =
        (fields.next(), fields.next(), fields.next(), fields.next())
    else {
        return Err(invalid());
    };

    let wide_hours = hours.len() > 2 && !hours.starts_with('0');
    if !((1..=2).contains(&hours.len()) || wide_hours) || minutes.len() != 2 || seconds.len() != 2
    {
        return Err(invalid());
    }

    let digits = |field: &str| -> Result<u64> {
        if field.bytes().all(|b| b.is_ascii_digit()) {
            field.parse::<u64>().map_err(|_| invalid())
        } else {
            Err(invalid())
        }
    };

    let (h, m, s) = (digits(hours)?, digits(minutes)?, digits(seconds)?);
    h.checked_mul(3600)
        .and_then(|total| total.checked_add(m * 60 + s))
        .ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_format_pads_every_field() {
        assert_eq!(format(0), "00:00:00");
        assert_eq!(format(59), "00:00:59");
        assert_eq!(format(61), "00:01:01");
        assert_eq!(format(3_661), "01:01:01");
    }

    #[test]
    fn test_format_hours_are_unbounded() {
        assert_eq!(format(100 * 3600), "100:00:00");
    }

    #[test]
    fn test_format_signed() {
        assert_eq!(format_signed(0), "+00:00:00");
        assert_eq!(format_signed(90), "+00:01:30");
        assert_eq!(format_signed(-90), "-00:01:30");
        assert_eq!(format_signed(-100), "-00:01:40");
    }

    #[test]
    fn test_format_signed_extremes() {
        assert!(format_signed(i64::MIN).starts_with('-'));
        assert!(format_signed(i64::MAX).starts_with('+'));
    }

    #[test]
    fn test_signed_tail_matches_unsigned_format() {
        for delta in [-7_200_i64, -3_599, -1, 0, 1, 59, 86_400] {
            let signed = format_signed(delta);
            assert_eq!(signed.starts_with('+'), delta >= 0);
            assert_eq!(&signed[1..], format(delta.unsigned_abs()));
        }
    }

    #[test]
    fn test_parse_accepts_one_or_two_hour_digits() {
        assert_eq!(parse("0:00:00").unwrap(), 0);
        assert_eq!(parse("1:02:03").unwrap(), 3_723);
        assert_eq!(parse("12:34:56").unwrap(), 45_296);
    }

    #[test]
    fn test_parse_rejects_malformed_input() {
        for bad in [
            "", "1:2:3", "01:02", "001:00:00", "00:0:00", "00:00:0", "-1:00:00", "+1:00:00",
            "aa:bb:cc", " 1:00:00", "1:00:00 ", "1:00:00:00", "1::00",
        ] {
            assert_matches!(parse(bad), Err(Error::InvalidFormat(s)) if s == bad);
        }
    }

    #[test]
    fn test_parse_wide_hours_only_in_canonical_form() {
        assert_eq!(parse("100:00:00").unwrap(), 360_000);
        assert_matches!(parse("0100:00:00"), Err(Error::InvalidFormat(_)));
    }

    #[test]
    fn test_parse_rejects_overflow() {
        assert_matches!(
            parse("99999999999999999999:00:00"),
            Err(Error::InvalidFormat(_))
        );
    }

    #[test]
    fn test_roundtrip() {
        for seconds in [
            0,
            1,
            59,
            60,
            3_599,
            3_600,
            45_296,
            99 * 3600 + 59 * 60 + 59,
            360_000,
            u64::MAX / 2,
            u64::MAX,
        ] {
            assert_eq!(parse(&format(seconds)).unwrap(), seconds);
        }
    }
}
