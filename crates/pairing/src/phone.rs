//! Phone number normalization
//!
//! Callers submit numbers in whatever shape they typed them. The protocol
//! client only accepts the bare digit string, so every non-digit character
//! is dropped before the number is used anywhere.

use std::fmt;

use crate::constants::{MAX_NUMBER_DIGITS, MIN_NUMBER_DIGITS};
use crate::error::{Error, Result};

/// A phone number reduced to its digits and checked for a plausible length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Normalize `raw` and reject it unless 7-15 digits remain.
    pub fn parse(raw: &str) -> Result<Self> {
        let digits = normalize(raw);
        if digits.len() < MIN_NUMBER_DIGITS || digits.len() > MAX_NUMBER_DIGITS {
            return Err(Error::InvalidNumber(format!(
                "expected {MIN_NUMBER_DIGITS}-{MAX_NUMBER_DIGITS} digits, got {}",
                digits.len()
            )));
        }
        Ok(Self(digits))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Strip every non-digit character.
pub fn normalize(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_formatting_characters() {
        assert_eq!(normalize("+1 (555) 123-4567"), "15551234567");
    }

    #[test]
    fn drops_letters_and_unicode_digits() {
        // Arabic-Indic digits are not ASCII and must not survive
        assert_eq!(normalize("tel:+44 20 ٧٩٤٦ 0958"), "44200958");
    }

    #[test]
    fn parse_accepts_formatted_number() {
        let number = PhoneNumber::parse("+1 (555) 123-4567").unwrap();
        assert_eq!(number.as_str(), "15551234567");
        assert_eq!(number.to_string(), "15551234567");
    }

    #[test]
    fn parse_accepts_length_bounds() {
        assert!(PhoneNumber::parse("1234567").is_ok());
        assert!(PhoneNumber::parse("123456789012345").is_ok());
    }

    #[test]
    fn parse_rejects_too_short_and_too_long() {
        assert!(matches!(
            PhoneNumber::parse("123456"),
            Err(Error::InvalidNumber(_))
        ));
        assert!(matches!(
            PhoneNumber::parse("1234567890123456"),
            Err(Error::InvalidNumber(_))
        ));
    }

    #[test]
    fn parse_rejects_empty_input() {
        let err = PhoneNumber::parse("").unwrap_err();
        assert!(err.to_string().contains("got 0"), "got: {err}");
    }
}
