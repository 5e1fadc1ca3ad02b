//! RUT tax identifier with mod-11 check digit.
//!
//! Every party in a DTE is identified by a RUT: a numeric body plus a
//! verification digit (`0`-`9` or `K`). The authority's formats expect the
//! canonical `body-dv` rendering without thousands separators.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced when parsing a RUT.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RutError {
    /// Input was empty or had no check digit.
    #[error("Malformed RUT: {0}")]
    Malformed(String),

    /// The check digit does not match the body.
    #[error("Invalid check digit for RUT body {body}: expected {expected}, got {got}")]
    InvalidCheckDigit {
        /// Numeric body.
        body: u32,
        /// Digit computed from the body.
        expected: char,
        /// Digit supplied in the input.
        got: char,
    },
}

/// A validated RUT (numeric body + verification digit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rut {
    body: u32,
    dv: char,
}

impl Rut {
    /// Builds a RUT from its numeric body, computing the check digit.
    #[must_use]
    pub fn from_body(body: u32) -> Self {
        Self {
            body,
            dv: check_digit(body),
        }
    }

    /// The numeric body (no check digit).
    #[must_use]
    pub const fn body(&self) -> u32 {
        self.body
    }

    /// The verification digit (`'0'`-`'9'` or `'K'`).
    #[must_use]
    pub const fn dv(&self) -> char {
        self.dv
    }

    /// Parses a RUT from `body-dv` form. Dots are tolerated, case of the
    /// `K` digit is ignored.
    ///
    /// # Errors
    ///
    /// Returns `RutError` if the input is malformed or the check digit is
    /// wrong.
    pub fn parse(input: &str) -> Result<Self, RutError> {
        let cleaned: String = input
            .chars()
            .filter(|c| *c != '.' && !c.is_whitespace())
            .collect();

        let (body_str, dv_str) = cleaned
            .rsplit_once('-')
            .ok_or_else(|| RutError::Malformed(input.to_string()))?;

        let body: u32 = body_str
            .parse()
            .map_err(|_| RutError::Malformed(input.to_string()))?;

        let got = dv_str
            .chars()
            .next()
            .filter(|_| dv_str.chars().count() == 1)
            .map(|c| c.to_ascii_uppercase())
            .ok_or_else(|| RutError::Malformed(input.to_string()))?;

        let expected = check_digit(body);
        if got != expected {
            return Err(RutError::InvalidCheckDigit {
                body,
                expected,
                got,
            });
        }

        Ok(Self { body, dv: got })
    }
}

impl std::fmt::Display for Rut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.body, self.dv)
    }
}

impl std::str::FromStr for Rut {
    type Err = RutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Rut {
    type Error = RutError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Rut> for String {
    fn from(rut: Rut) -> Self {
        rut.to_string()
    }
}

/// Computes the mod-11 verification digit for a RUT body.
fn check_digit(body: u32) -> char {
    let mut remaining = body;
    let mut factor = 2u32;
    let mut sum = 0u32;

    while remaining > 0 {
        sum += (remaining % 10) * factor;
        remaining /= 10;
        factor = if factor == 7 { 2 } else { factor + 1 };
    }

    match 11 - (sum % 11) {
        11 => '0',
        10 => 'K',
        d => char::from_digit(d, 10).unwrap_or('0'),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    // Published reference RUTs
    #[rstest]
    #[case(76_192_083, '9')]
    #[case(12_345_678, '5')]
    #[case(11_111_111, '1')]
    #[case(24_965_885, '5')]
    #[case(24_965_888, 'K')]
    fn test_known_check_digits(#[case] body: u32, #[case] expected: char) {
        assert_eq!(check_digit(body), expected);
    }

    #[test]
    fn test_parse_valid() {
        let rut = Rut::parse("76192083-9").unwrap();
        assert_eq!(rut.body(), 76_192_083);
        assert_eq!(rut.dv(), '9');
        assert_eq!(rut.to_string(), "76192083-9");
    }

    #[test]
    fn test_parse_with_dots_and_lowercase_k() {
        let rut = Rut::parse("24.965.888-k").unwrap();
        assert_eq!(rut.dv(), 'K');
        assert_eq!(rut.to_string(), "24965888-K");
    }

    #[test]
    fn test_parse_invalid_check_digit() {
        assert_eq!(
            Rut::parse("76192083-1"),
            Err(RutError::InvalidCheckDigit {
                body: 76_192_083,
                expected: '9',
                got: '1',
            })
        );
    }

    #[test]
    fn test_parse_malformed() {
        assert!(matches!(Rut::parse(""), Err(RutError::Malformed(_))));
        assert!(matches!(Rut::parse("761920839"), Err(RutError::Malformed(_))));
        assert!(matches!(Rut::parse("abc-9"), Err(RutError::Malformed(_))));
        assert!(matches!(
            Rut::parse("76192083-99"),
            Err(RutError::Malformed(_))
        ));
    }

    #[test]
    fn test_from_body_round_trip() {
        let rut = Rut::from_body(60_803_000);
        let parsed = Rut::parse(&rut.to_string()).unwrap();
        assert_eq!(rut, parsed);
    }
}

#[cfg(test)]
mod props {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// For any body, formatting then parsing yields the same RUT.
        #[test]
        fn prop_format_parse_round_trip(body in 1u32..99_999_999) {
            let rut = Rut::from_body(body);
            let parsed = Rut::parse(&rut.to_string()).unwrap();
            prop_assert_eq!(rut, parsed);
        }

        /// For any body, exactly one of the eleven candidate digits is valid.
        #[test]
        fn prop_single_valid_check_digit(body in 1u32..99_999_999) {
            let valid: Vec<char> = "0123456789K"
                .chars()
                .filter(|dv| Rut::parse(&format!("{body}-{dv}")).is_ok())
                .collect();
            prop_assert_eq!(valid.len(), 1);
        }
    }
}
