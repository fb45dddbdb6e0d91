use super::AccessKeyError;

/// Number of digits the check digit is computed over.
pub const CHECKSUM_INPUT_LEN: usize = 48;

const WEIGHTS: [u32; 6] = [7, 6, 5, 4, 3, 2];

/// Weighted modulo-11 check digit over a 48-digit string.
///
/// Weights cycle `7,6,5,4,3,2` starting at the leftmost digit. The raw value
/// `11 - (sum mod 11)` maps `11` to `0` and `10` to `1`.
///
/// # Examples
/// ```rust
/// use factura_core::access_key::check_digit;
///
/// let digit = check_digit("150620240117900123450011001001000000001123456781")?;
/// assert_eq!(digit, 2);
/// # Ok::<(), factura_core::access_key::AccessKeyError>(())
/// ```
///
/// # Errors
/// Returns [`AccessKeyError::InvalidInput`] unless the input is exactly 48 ASCII digits.
pub fn check_digit(digits: &str) -> Result<u8, AccessKeyError> {
    if digits.len() != CHECKSUM_INPUT_LEN || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AccessKeyError::InvalidInput {
            input: digits.to_string(),
        });
    }

    let sum: u32 = digits
        .bytes()
        .zip(WEIGHTS.iter().cycle())
        .map(|(b, w)| u32::from(b - b'0') * w)
        .sum();

    let digit = match 11 - sum % 11 {
        11 => 0,
        10 => 1,
        raw => raw,
    };
    Ok(digit as u8)
}
