//! Phone number type.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`Phone`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PhoneError {
    /// The input is empty after trimming.
    #[error("phone number is required")]
    Empty,
    /// The input is not an optional `+` followed by 8 to 15 digits.
    #[error("phone number must be 8 to 15 digits, optionally starting with +")]
    Invalid,
}

/// A phone number as accepted at checkout and registration.
///
/// Format: optional leading `+` followed by 8 to 15 ASCII digits, no
/// separators. Surrounding whitespace is trimmed.
///
/// ```
/// use simonia_core::Phone;
///
/// assert!(Phone::parse("+37369123456").is_ok());
/// assert!(Phone::parse("069123456").is_ok());
/// assert!(Phone::parse("069 123 456").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Phone(String);

impl Phone {
    /// Minimum number of digits.
    pub const MIN_DIGITS: usize = 8;
    /// Maximum number of digits.
    pub const MAX_DIGITS: usize = 15;

    /// Parse a `Phone` from user input.
    ///
    /// # Errors
    ///
    /// Returns [`PhoneError::Empty`] for blank input and
    /// [`PhoneError::Invalid`] when the format does not match.
    pub fn parse(s: &str) -> Result<Self, PhoneError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(PhoneError::Empty);
        }

        let digits = s.strip_prefix('+').unwrap_or(s);
        let valid = (Self::MIN_DIGITS..=Self::MAX_DIGITS).contains(&digits.len())
            && digits.bytes().all(|b| b.is_ascii_digit());

        if valid {
            Ok(Self(s.to_owned()))
        } else {
            Err(PhoneError::Invalid)
        }
    }

    /// Returns the phone number as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the `Phone` and returns its inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Phone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Phone {
    type Err = PhoneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        assert!(Phone::parse("12345678").is_ok());
        assert!(Phone::parse("+123456789012345").is_ok());
        assert_eq!(
            Phone::parse(" +37369123456 ").map(Phone::into_inner),
            Ok("+37369123456".to_owned())
        );
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(Phone::parse(""), Err(PhoneError::Empty));
        assert_eq!(Phone::parse("  \t"), Err(PhoneError::Empty));
    }

    #[test]
    fn test_parse_length_bounds() {
        assert_eq!(Phone::parse("1234567"), Err(PhoneError::Invalid));
        assert_eq!(Phone::parse("1234567890123456"), Err(PhoneError::Invalid));
        assert_eq!(Phone::parse("+"), Err(PhoneError::Invalid));
    }

    #[test]
    fn test_parse_rejects_separators() {
        assert_eq!(Phone::parse("069-123-456"), Err(PhoneError::Invalid));
        assert_eq!(Phone::parse("++37369123456"), Err(PhoneError::Invalid));
        assert_eq!(Phone::parse("3736912345+"), Err(PhoneError::Invalid));
    }
}
