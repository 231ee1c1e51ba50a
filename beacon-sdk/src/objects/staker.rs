use crate::error::InvalidArgument;
use std::fmt;
use std::str::FromStr;

/// Address identifying a staker on chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StakerAddress([u8; 20]);

impl StakerAddress {
    pub const LENGTH: usize = 20;

    pub fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl FromStr for StakerAddress {
    type Err = InvalidArgument;

    /// Parses a hex address, with or without the `0x` prefix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.strip_prefix("0x").unwrap_or(s);
        let decoded =
            hex::decode(trimmed).map_err(|e| InvalidArgument::InvalidHex(e.to_string()))?;
        let bytes: [u8; 20] =
            decoded
                .as_slice()
                .try_into()
                .map_err(|_| InvalidArgument::WrongLength {
                    expected: Self::LENGTH,
                    actual: decoded.len(),
                })?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for StakerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let text = "0x00112233445566778899aabbccddeeff00112233";
        let address: StakerAddress = text.parse().unwrap();
        assert_eq!(address.as_bytes()[0], 0x00);
        assert_eq!(address.as_bytes()[19], 0x33);
        assert_eq!(address.to_string(), text);

        let upper: StakerAddress = "00112233445566778899AABBCCDDEEFF00112233".parse().unwrap();
        assert_eq!(upper, address);
    }

    #[test]
    fn test_parse_wrong_length() {
        let err = "0x0011".parse::<StakerAddress>().unwrap_err();
        assert_eq!(
            err,
            InvalidArgument::WrongLength {
                expected: 20,
                actual: 2
            }
        );
    }
}
