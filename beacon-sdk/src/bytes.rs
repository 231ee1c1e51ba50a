//! Byte and hex helpers used when moving values between the chain's big
//! integer representation and fixed-width byte arrays.

use crate::error::InvalidArgument;

/// Left-pads `bytes` with zeroes to exactly 32 bytes.
///
/// Big integers coming back from the chain drop their leading zero bytes, so
/// anything shorter than 32 bytes is padded. Longer input is rejected.
pub fn left_pad_to_32_bytes(bytes: &[u8]) -> Result<[u8; 32], InvalidArgument> {
    if bytes.len() > 32 {
        return Err(InvalidArgument::ValueTooLarge(32));
    }
    let mut padded = [0u8; 32];
    padded[32 - bytes.len()..].copy_from_slice(bytes);
    Ok(padded)
}

/// Normalizes a hex string to lowercase without a `0x` prefix, checking that
/// it encodes exactly `expected_len` bytes.
pub fn normalize_hex(input: &str, expected_len: usize) -> Result<String, InvalidArgument> {
    let trimmed = input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
        .unwrap_or(input);
    let decoded = hex::decode(trimmed).map_err(|e| InvalidArgument::InvalidHex(e.to_string()))?;
    if decoded.len() != expected_len {
        return Err(InvalidArgument::WrongLength {
            expected: expected_len,
            actual: decoded.len(),
        });
    }
    Ok(hex::encode(decoded))
}
