//! Resource quantities
//!
//! Parses the fixed-point resource amounts used in cluster resource
//! requirements, e.g. `"250m"` CPU or `"1.5Gi"` memory.
//!
//! ```text
//! <quantity>        ::= <signedNumber><suffix>
//! <signedNumber>    ::= [+-] <number>
//! <number>          ::= <digits> | <digits>.<digits> | <digits>. | .<digits>
//! <suffix>          ::= <binarySI> | <decimalExponent> | <decimalSI>
//! <binarySI>        ::= Ki | Mi | Gi | Ti | Pi | Ei
//! <decimalSI>       ::= n | u | m | "" | k | M | G | T | P | E
//! <decimalExponent> ::= e <signedDigits> | E <signedDigits>
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors produced while parsing a quantity
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    #[error("quantity is empty")]
    Empty,

    #[error("invalid number in quantity {0:?}")]
    InvalidNumber(String),

    #[error("invalid suffix {suffix:?} in quantity {quantity:?}")]
    InvalidSuffix { quantity: String, suffix: String },
}

/// A validated resource quantity
///
/// The original textual form is preserved and is what gets serialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quantity {
    text: String,
}

impl Quantity {
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl FromStr for Quantity {
    type Err = QuantityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(QuantityError::Empty);
        }

        let (number, suffix) = split_number(s);
        if !is_number(number) {
            return Err(QuantityError::InvalidNumber(s.to_string()));
        }
        if !is_suffix(suffix) {
            return Err(QuantityError::InvalidSuffix {
                quantity: s.to_string(),
                suffix: suffix.to_string(),
            });
        }

        Ok(Quantity {
            text: s.to_string(),
        })
    }
}

/// Splits the leading signed number from the suffix
fn split_number(s: &str) -> (&str, &str) {
    let end = s
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || c == '.' || (i == 0 && (c == '+' || c == '-'))))
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    s.split_at(end)
}

fn is_number(number: &str) -> bool {
    let unsigned = number.strip_prefix(['+', '-']).unwrap_or(number);
    let digits_only = |s: &str| s.chars().all(|c| c.is_ascii_digit());

    match unsigned.split_once('.') {
        Some((whole, fraction)) => {
            (!whole.is_empty() || !fraction.is_empty())
                && digits_only(whole)
                && digits_only(fraction)
        }
        None => !unsigned.is_empty() && digits_only(unsigned),
    }
}

fn is_suffix(suffix: &str) -> bool {
    const SI: [&str; 16] = [
        "Ki", "Mi", "Gi", "Ti", "Pi", "Ei", "n", "u", "m", "", "k", "M", "G", "T", "P", "E",
    ];
    if SI.contains(&suffix) {
        return true;
    }

    // decimal exponent, e.g. "e3" or "E-2"
    let Some(exponent) = suffix.strip_prefix(['e', 'E']) else {
        return false;
    };
    let digits = exponent.strip_prefix(['+', '-']).unwrap_or(exponent);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Quantity {
        s.parse().unwrap()
    }

    #[test]
    fn test_decimal_si() {
        for valid in ["500m", "2", "1k", "1.5G", "100n", "+3u", "1E"] {
            assert_eq!(parse(valid).as_str(), valid);
        }
    }

    #[test]
    fn test_binary_si() {
        for valid in ["128Mi", "1Ki", "2Gi", "0.5Ti", "1Pi", "3Ei"] {
            assert!(valid.parse::<Quantity>().is_ok(), "{valid}");
        }
        assert!("1KI".parse::<Quantity>().is_err());
    }

    #[test]
    fn test_exponents() {
        for valid in ["12e3", "5E-1", "1e+6"] {
            assert!(valid.parse::<Quantity>().is_ok(), "{valid}");
        }
        assert!("1e".parse::<Quantity>().is_err());
        assert!("1e-".parse::<Quantity>().is_err());
        assert!("1e3.5".parse::<Quantity>().is_err());
    }

    #[test]
    fn test_fraction_forms() {
        for valid in [".5", "1.", "-1.25Ki"] {
            assert!(valid.parse::<Quantity>().is_ok(), "{valid}");
        }
    }

    #[test]
    fn test_preserves_text() {
        let q = parse("0.25");
        assert_eq!(q.as_str(), "0.25");
        assert_eq!(q.to_string(), "0.25");
        assert_eq!(serde_json::to_string(&q).unwrap(), "\"0.25\"");
    }

    #[test]
    fn test_invalid_quantities() {
        assert_eq!("".parse::<Quantity>(), Err(QuantityError::Empty));
        assert!(matches!(
            "lots".parse::<Quantity>(),
            Err(QuantityError::InvalidNumber(_))
        ));
        assert!(matches!(
            ".".parse::<Quantity>(),
            Err(QuantityError::InvalidNumber(_))
        ));
        assert!(matches!(
            "1.2.3".parse::<Quantity>(),
            Err(QuantityError::InvalidNumber(_))
        ));
        assert_eq!(
            "100mb".parse::<Quantity>(),
            Err(QuantityError::InvalidSuffix {
                quantity: "100mb".to_string(),
                suffix: "mb".to_string()
            })
        );
        assert!(" 1".parse::<Quantity>().is_err());
    }

    #[test]
    fn test_deserialize_rejects_invalid() {
        assert!(serde_json::from_str::<Quantity>("\"1Gi\"").is_ok());
        assert!(serde_json::from_str::<Quantity>("\"one gig\"").is_err());
    }
}
