//! Phone-number validation and normalization
//!
//! Numbers reach the dispatcher as free-form strings (`"+972-54-684-4668"`,
//! `"054 684 4668"`). Before a call-id is spent on them they are reduced to
//! digits and normalized to the local dialing format the switch expects.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Minimum number of digits a dialable number must have
pub const MIN_DIGITS: usize = 7;

const COUNTRY_CODE: &str = "972";
const MOBILE_PREFIX: &str = "05";

/// Errors produced when a number cannot be used
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NumberError {
    #[error("Phone number is empty")]
    Empty,

    #[error("Invalid phone number '{input}': expected at least {min} digits", min = MIN_DIGITS)]
    TooShort { input: String },

    #[error("Normalized number does not start with '{prefix}': {normalized}", prefix = MOBILE_PREFIX)]
    NotMobile { normalized: String },
}

/// A validated, digits-only phone number
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Normalizes a call target to the local mobile format
    ///
    /// Non-digits are stripped, a leading `972` country code becomes `0`, and a
    /// missing leading `0` is added. The result must start with `05`.
    ///
    /// ```
    /// use outdial::phone::PhoneNumber;
    ///
    /// let number = PhoneNumber::parse_target("+972-54-684-4668").unwrap();
    /// assert_eq!(number.as_str(), "0546844668");
    /// ```
    pub fn parse_target(input: &str) -> Result<Self, NumberError> {
        let digits = checked_digits(input)?;

        let normalized = if let Some(rest) = digits.strip_prefix(COUNTRY_CODE) {
            format!("0{}", rest)
        } else if digits.starts_with('0') {
            digits
        } else {
            format!("0{}", digits)
        };

        if !normalized.starts_with(MOBILE_PREFIX) {
            return Err(NumberError::NotMobile { normalized });
        }

        Ok(Self(normalized))
    }

    /// Validates the number calls are placed from
    ///
    /// Source numbers identify a line on the switch and are not reformatted,
    /// only reduced to their digits.
    pub fn parse_source(input: &str) -> Result<Self, NumberError> {
        checked_digits(input).map(Self)
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

impl AsRef<str> for PhoneNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Returns only the ASCII digits of `input`
pub fn digits_only(input: &str) -> String {
    input.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Checks that `input` has at least [`MIN_DIGITS`] digits once non-digits are removed
pub fn is_valid_number(input: &str) -> bool {
    digits_only(input).len() >= MIN_DIGITS
}

fn checked_digits(input: &str) -> Result<String, NumberError> {
    if input.trim().is_empty() {
        return Err(NumberError::Empty);
    }

    let digits = digits_only(input);
    if digits.len() < MIN_DIGITS {
        return Err(NumberError::TooShort {
            input: input.to_string(),
        });
    }

    Ok(digits)
}
