//! Access key (`claveAcceso`) generation.
//!
//! The key is 49 digits:
//! `[date:8][docType:2][taxId:13][env:1][series:6][sequence:9][numericCode:8][emissionType:1][checkDigit:1]`.
mod checksum;

pub use checksum::{CHECKSUM_INPUT_LEN, check_digit};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Length of a complete access key, check digit included.
pub const ACCESS_KEY_LEN: usize = CHECKSUM_INPUT_LEN + 1;

/// Access key errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessKeyError {
    #[error("checksum input must be exactly 48 digits, got {input:?}")]
    InvalidInput { input: String },
    #[error("emission date must be dd/mm/yyyy, got {input:?}")]
    InvalidDateFormat { input: String },
    #[error("access key body must be 48 characters, got {len} ({body:?})")]
    KeyLength { len: usize, body: String },
    #[error("invalid access key {input:?}: {reason}")]
    Malformed { input: String, reason: &'static str },
}

/// Raw components of an access key.
///
/// Values are taken as written by the emitter; padding happens in [`generate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessKeyParts {
    pub emission_date: String,
    pub document_type: String,
    pub tax_id: String,
    pub environment: String,
    pub series: String,
    pub sequential: String,
    pub numeric_code: String,
    pub emission_type: String,
}

/// A checked 49-digit access key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccessKey(String);

impl AccessKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The trailing check digit.
    pub fn check_digit(&self) -> u8 {
        self.0.as_bytes()[CHECKSUM_INPUT_LEN] - b'0'
    }

    /// Emission date portion as `ddmmyyyy`.
    pub fn emission_date(&self) -> &str {
        &self.0[0..8]
    }

    pub fn document_type(&self) -> &str {
        &self.0[8..10]
    }

    pub fn tax_id(&self) -> &str {
        &self.0[10..23]
    }

    pub fn environment(&self) -> &str {
        &self.0[23..24]
    }

    pub fn series(&self) -> &str {
        &self.0[24..30]
    }

    pub fn sequential(&self) -> &str {
        &self.0[30..39]
    }

    pub fn numeric_code(&self) -> &str {
        &self.0[39..47]
    }

    pub fn emission_type(&self) -> &str {
        &self.0[47..48]
    }
}

impl fmt::Display for AccessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for AccessKey {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl FromStr for AccessKey {
    type Err = AccessKeyError;

    /// Parses an existing key, re-checking its length and check digit.
    fn from_str(s: &str) -> Result<Self, AccessKeyError> {
        if s.len() != ACCESS_KEY_LEN || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AccessKeyError::Malformed {
                input: s.to_string(),
                reason: "expected 49 digits",
            });
        }
        let expected = check_digit(&s[..CHECKSUM_INPUT_LEN])?;
        if s.as_bytes()[CHECKSUM_INPUT_LEN] - b'0' != expected {
            return Err(AccessKeyError::Malformed {
                input: s.to_string(),
                reason: "check digit mismatch",
            });
        }
        Ok(AccessKey(s.to_string()))
    }
}

impl TryFrom<String> for AccessKey {
    type Error = AccessKeyError;
    fn try_from(value: String) -> Result<Self, AccessKeyError> {
        value.parse()
    }
}

impl From<AccessKey> for String {
    fn from(key: AccessKey) -> Self {
        key.0
    }
}

/// Builds the 49-digit access key from its parts.
///
/// # Examples
/// ```rust
/// use factura_core::access_key::{AccessKeyParts, generate};
///
/// let key = generate(&AccessKeyParts {
///     emission_date: "15/06/2024".into(),
///     document_type: "01".into(),
///     tax_id: "1790012345001".into(),
///     environment: "1".into(),
///     series: "001001".into(),
///     sequential: "1".into(),
///     numeric_code: "12345678".into(),
///     emission_type: "1".into(),
/// })?;
/// assert_eq!(key.as_str(), "1506202401179001234500110010010000000011234567812");
/// # Ok::<(), factura_core::access_key::AccessKeyError>(())
/// ```
///
/// # Errors
/// - [`AccessKeyError::InvalidDateFormat`] if the date is not `dd/mm/yyyy`.
/// - [`AccessKeyError::KeyLength`] if the padded components do not add up to 48 characters.
/// - [`AccessKeyError::InvalidInput`] if the body contains anything but digits.
pub fn generate(parts: &AccessKeyParts) -> Result<AccessKey, AccessKeyError> {
    let date = compact_date(&parts.emission_date)?;

    let mut body = String::with_capacity(ACCESS_KEY_LEN);
    body.push_str(&date);
    body.push_str(&left_pad(&parts.document_type, 2));
    body.push_str(&parts.tax_id);
    body.push_str(&left_pad(&parts.environment, 1));
    body.push_str(&left_pad(&parts.series, 6));
    body.push_str(&left_pad(&parts.sequential, 9));
    body.push_str(&left_pad(&parts.numeric_code, 8));
    body.push_str(&left_pad(&parts.emission_type, 1));

    let len = body.chars().count();
    if len != CHECKSUM_INPUT_LEN {
        return Err(AccessKeyError::KeyLength { len, body });
    }

    let digit = check_digit(&body)?;
    body.push(char::from(b'0' + digit));
    Ok(AccessKey(body))
}

/// `dd/mm/yyyy` to `ddmmyyyy`. Day and month may omit their leading zero.
fn compact_date(date: &str) -> Result<String, AccessKeyError> {
    let invalid = || AccessKeyError::InvalidDateFormat {
        input: date.to_string(),
    };

    let components: Vec<&str> = date.trim().split('/').collect();
    let [day, month, year] = *components.as_slice() else {
        return Err(invalid());
    };

    let numeric = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !numeric(day) || !numeric(month) || !numeric(year) {
        return Err(invalid());
    }
    if day.len() > 2 || month.len() > 2 || year.len() != 4 {
        return Err(invalid());
    }

    Ok(format!("{}{}{}", left_pad(day, 2), left_pad(month, 2), year))
}

fn left_pad(value: &str, width: usize) -> String {
    format!("{:0>width$}", value.trim(), width = width)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_parts() -> AccessKeyParts {
        AccessKeyParts {
            emission_date: "15/06/2024".into(),
            document_type: "01".into(),
            tax_id: "1790012345001".into(),
            environment: "1".into(),
            series: "001001".into(),
            sequential: "1".into(),
            numeric_code: "12345678".into(),
            emission_type: "1".into(),
        }
    }

    #[test]
    fn generates_documented_prefix_and_check_digit() {
        let key = generate(&sample_parts()).expect("key");
        let prefix = "150620240117900123450011001001000000001123456781";
        assert_eq!(key.as_str().len(), 49);
        assert!(key.as_str().starts_with(prefix));
        assert_eq!(key.check_digit(), check_digit(prefix).expect("digit"));
        assert_eq!(key.as_str(), "1506202401179001234500110010010000000011234567812");
    }

    #[test]
    fn accessors_slice_fields() {
        let key = generate(&sample_parts()).expect("key");
        assert_eq!(key.emission_date(), "15062024");
        assert_eq!(key.document_type(), "01");
        assert_eq!(key.tax_id(), "1790012345001");
        assert_eq!(key.environment(), "1");
        assert_eq!(key.series(), "001001");
        assert_eq!(key.sequential(), "000000001");
        assert_eq!(key.numeric_code(), "12345678");
        assert_eq!(key.emission_type(), "1");
    }

    #[test]
    fn pads_short_components() {
        let mut parts = sample_parts();
        parts.emission_date = "5/6/2024".into();
        parts.document_type = "1".into();
        parts.series = "1001".into();
        parts.numeric_code = "345678".into();
        let key = generate(&parts).expect("key");
        assert!(key.as_str().starts_with("0506202401"));
        assert_eq!(key.series(), "001001");
        assert_eq!(key.numeric_code(), "00345678");
    }

    #[test]
    fn date_must_have_three_components() {
        for date in ["2024-06-15", "15/06", "15/06/2024/1", "", "15/ab/2024", "15/06/24"] {
            let mut parts = sample_parts();
            parts.emission_date = date.into();
            assert!(
                matches!(generate(&parts), Err(AccessKeyError::InvalidDateFormat { .. })),
                "date {date:?} should be rejected"
            );
        }
    }

    #[test]
    fn oversized_component_fails_length_check() {
        let mut parts = sample_parts();
        parts.sequential = "1234567890".into();
        assert!(matches!(
            generate(&parts),
            Err(AccessKeyError::KeyLength { len: 49, .. })
        ));

        let mut parts = sample_parts();
        parts.tax_id = "179001234500".into();
        assert!(matches!(
            generate(&parts),
            Err(AccessKeyError::KeyLength { len: 47, .. })
        ));
    }

    #[test]
    fn non_digit_body_is_invalid_input() {
        let mut parts = sample_parts();
        parts.tax_id = "17900123450AB".into();
        assert!(matches!(
            generate(&parts),
            Err(AccessKeyError::InvalidInput { .. })
        ));
    }

    #[test]
    fn parse_rechecks_digit() {
        let key: AccessKey = "1506202401179001234500110010010000000011234567812"
            .parse()
            .expect("valid key");
        assert_eq!(key.check_digit(), 2);

        let err = "1506202401179001234500110010010000000011234567813"
            .parse::<AccessKey>()
            .unwrap_err();
        assert!(matches!(
            err,
            AccessKeyError::Malformed {
                reason: "check digit mismatch",
                ..
            }
        ));
        assert!("123".parse::<AccessKey>().is_err());
    }
}
