//! Low level text helpers shared by the leader, directory and data record readers.
use std::fmt::Display;

use pest::Parser;

use crate::format_specs::{IsoParser, Rule};

/// A subfield's text did not match its numeric type.
///
/// Callers know the tag and offset of the subfield, so they turn this into
/// [`crate::iso_error::IsoError::InvalidValue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BadValue {
    pub(crate) t: &'static str,
    pub(crate) reason: String,
}

impl Display for BadValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "not a valid {}: {}", self.t, self.reason)
    }
}

type Result<T> = std::result::Result<T, BadValue>;

/// Read an unsigned decimal from fixed-width ASCII digits.
///
/// Returns `None` if `bytes` is empty, has anything other than `0`-`9`, or
/// overflows a `usize`.
pub(crate) fn ascii_decimal(bytes: &[u8]) -> Option<usize> {
    if bytes.is_empty() {
        return None;
    }

    bytes.iter().try_fold(0usize, |acc, &b| {
        if !b.is_ascii_digit() {
            return None;
        }
        acc.checked_mul(10)?.checked_add((b - b'0') as usize)
    })
}

/// Parse implicit point (`I`) text: an optionally signed run of digits.
pub(crate) fn parse_implicit_point(s: &str) -> Result<i64> {
    const T: &str = "implicit point integer";
    IsoParser::parse(Rule::implicit_point, s)
        .map_err(|_| BadValue { t: T, reason: format!("'{s}' does not match the expected pattern") })?;
    s.parse().map_err(|e| BadValue { t: T, reason: format!("{e}") })
}

/// Parse explicit point (`R`) text, e.g. "12.5", "-.5" or "7".
pub(crate) fn parse_explicit_point(s: &str) -> Result<f64> {
    const T: &str = "explicit point number";
    IsoParser::parse(Rule::explicit_point, s)
        .map_err(|_| BadValue { t: T, reason: format!("'{s}' does not match the expected pattern") })?;
    s.parse().map_err(|e| BadValue { t: T, reason: format!("{e}") })
}

/// Parse scaled explicit point (`S`) text: a mantissa and a base 10 exponent, e.g. "1.5E3".
pub(crate) fn parse_scaled_point(s: &str) -> Result<f64> {
    const T: &str = "scaled explicit point number";
    IsoParser::parse(Rule::scaled_point, s)
        .map_err(|_| BadValue { t: T, reason: format!("'{s}' does not match the expected pattern") })?;
    s.parse().map_err(|e| BadValue { t: T, reason: format!("{e}") })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_decimal() {
        assert_eq!(ascii_decimal(b"00042"), Some(42));
        assert_eq!(ascii_decimal(b"0"), Some(0));
        assert_eq!(ascii_decimal(b""), None);
        assert_eq!(ascii_decimal(b" 42"), None);
        assert_eq!(ascii_decimal(b"4-2"), None);
        assert_eq!(ascii_decimal(b"99999999999999999999999999"), None);
    }

    #[test]
    fn test_implicit_point() {
        assert_eq!(parse_implicit_point("42"), Ok(42));
        assert_eq!(parse_implicit_point("-0042"), Ok(-42));
        assert_eq!(parse_implicit_point("+7"), Ok(7));
        assert!(parse_implicit_point("4.2").is_err());
        assert!(parse_implicit_point("").is_err());
        assert!(parse_implicit_point("12a").is_err());
        assert!(parse_implicit_point("99999999999999999999").is_err(), "Overflow should be an error");
    }

    #[test]
    fn test_explicit_point() {
        assert_eq!(parse_explicit_point("12.5"), Ok(12.5));
        assert_eq!(parse_explicit_point("-.5"), Ok(-0.5));
        assert_eq!(parse_explicit_point("7"), Ok(7.0));
        assert_eq!(parse_explicit_point("7."), Ok(7.0));
        assert!(parse_explicit_point("1.5E3").is_err(), "Exponents belong to the scaled type");
        assert!(parse_explicit_point("inf").is_err());
        assert!(parse_explicit_point(".").is_err());
    }

    #[test]
    fn test_scaled_point() {
        assert_eq!(parse_scaled_point("1.5E3"), Ok(1500.0));
        assert_eq!(parse_scaled_point("-25e-1"), Ok(-2.5));
        assert!(parse_scaled_point("1.5").is_err(), "The exponent is required");
        assert!(parse_scaled_point("E3").is_err());
    }
}
