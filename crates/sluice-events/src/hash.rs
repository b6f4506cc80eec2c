//! Torrent identity shared by every crate in the workspace.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Length of a v1 info-hash in bytes.
pub const INFO_HASH_LEN: usize = 20;

/// Fixed-size content hash identifying a torrent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct InfoHash([u8; INFO_HASH_LEN]);

/// Error returned when a hash cannot be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InfoHashParseError {
    /// Input had the wrong number of characters or bytes.
    InvalidLength {
        /// Length that was provided.
        actual: usize,
    },
    /// Input contained a non-hex character.
    InvalidHex,
}

impl Display for InfoHashParseError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidLength { .. } => formatter.write_str("info hash has invalid length"),
            Self::InvalidHex => formatter.write_str("info hash is not valid hex"),
        }
    }
}

impl std::error::Error for InfoHashParseError {}

impl InfoHash {
    /// Wrap raw hash bytes.
    #[must_use]
    pub const fn new(bytes: [u8; INFO_HASH_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw hash bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; INFO_HASH_LEN] {
        &self.0
    }

    /// Lowercase hex rendering used for file names and logs.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl TryFrom<&[u8]> for InfoHash {
    type Error = InfoHashParseError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; INFO_HASH_LEN] =
            value
                .try_into()
                .map_err(|_| InfoHashParseError::InvalidLength {
                    actual: value.len(),
                })?;
        Ok(Self(bytes))
    }
}

impl FromStr for InfoHash {
    type Err = InfoHashParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.len() != INFO_HASH_LEN * 2 {
            return Err(InfoHashParseError::InvalidLength {
                actual: trimmed.len(),
            });
        }
        let mut bytes = [0_u8; INFO_HASH_LEN];
        hex::decode_to_slice(trimmed, &mut bytes).map_err(|_| InfoHashParseError::InvalidHex)?;
        Ok(Self(bytes))
    }
}

impl Display for InfoHash {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.to_hex())
    }
}

impl Serialize for InfoHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for InfoHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "0123456789abcdef0123456789abcdef01234567";

    #[test]
    fn parses_and_renders_lowercase_hex() {
        let hash: InfoHash = SAMPLE.to_uppercase().parse().expect("valid hash");
        assert_eq!(hash.to_string(), SAMPLE);
        assert_eq!(hash.as_bytes()[0], 0x01);
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(
            "abc".parse::<InfoHash>(),
            Err(InfoHashParseError::InvalidLength { actual: 3 })
        );
        let bad = "zz23456789abcdef0123456789abcdef01234567";
        assert_eq!(bad.parse::<InfoHash>(), Err(InfoHashParseError::InvalidHex));
        assert!(InfoHash::try_from(&[0_u8; 4][..]).is_err());
    }

    #[test]
    fn serde_uses_hex_string() {
        let hash: InfoHash = SAMPLE.parse().expect("valid hash");
        let json = serde_json::to_string(&hash).expect("serialize");
        assert_eq!(json, format!("\"{SAMPLE}\""));
        let back: InfoHash = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, hash);
    }
}
