//! Census tract identifiers (11-digit GEOID)

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A census tract GEOID: 2-digit state FIPS, 3-digit county FIPS, 6-digit tract code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TractId([u8; 11]);

impl TractId {
    pub const LEN: usize = 11;

    /// Build from numeric FIPS codes; each is reduced to its field width
    pub fn from_codes(state: u32, county: u32, tract: u32) -> Self {
        let mut buf = [b'0'; 11];
        write_digits(&mut buf[..2], state % 100);
        write_digits(&mut buf[2..5], county % 1_000);
        write_digits(&mut buf[5..], tract % 1_000_000);
        Self(buf)
    }

    pub fn as_str(&self) -> &str {
        // Only ASCII digits are ever stored
        std::str::from_utf8(&self.0).unwrap_or_default()
    }

    /// Two-digit state FIPS code
    pub fn state(&self) -> &str {
        &self.as_str()[..2]
    }

    /// Three-digit county FIPS code (within the state)
    pub fn county(&self) -> &str {
        &self.as_str()[2..5]
    }

    /// Six-digit tract code
    pub fn tract(&self) -> &str {
        &self.as_str()[5..]
    }

    /// Five-digit state+county FIPS
    pub fn county_fips(&self) -> &str {
        &self.as_str()[..5]
    }
}

fn write_digits(field: &mut [u8], mut value: u32) {
    for slot in field.iter_mut().rev() {
        *slot = b'0' + (value % 10) as u8;
        value /= 10;
    }
}

impl FromStr for TractId {
    type Err = TractIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != Self::LEN {
            return Err(TractIdError::InvalidLength);
        }
        if !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TractIdError::NonDigit);
        }
        let mut buf = [0u8; 11];
        buf.copy_from_slice(s.as_bytes());
        Ok(Self(buf))
    }
}

impl fmt::Display for TractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TractId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TractId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TractIdError {
    #[error("tract id must be 11 digits")]
    InvalidLength,

    #[error("tract id must contain only digits")]
    NonDigit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_geoid_components() {
        let tract: TractId = "36061000100".parse().unwrap();
        assert_eq!(tract.state(), "36");
        assert_eq!(tract.county(), "061");
        assert_eq!(tract.tract(), "000100");
        assert_eq!(tract.county_fips(), "36061");
        assert_eq!(tract.to_string(), "36061000100");
    }

    #[test]
    fn rejects_malformed_ids() {
        assert_eq!("3606100010".parse::<TractId>(), Err(TractIdError::InvalidLength));
        assert_eq!("3606100010X".parse::<TractId>(), Err(TractIdError::NonDigit));
        assert_eq!("".parse::<TractId>(), Err(TractIdError::InvalidLength));
    }

    #[test]
    fn from_codes_zero_pads() {
        assert_eq!(TractId::from_codes(1, 1, 20100).as_str(), "01001020100");
        assert_eq!(TractId::from_codes(6, 37, 206300).as_str(), "06037206300");
    }

    #[test]
    fn serde_uses_plain_string() {
        let tract: TractId = "06037206300".parse().unwrap();
        let json = serde_json::to_string(&tract).unwrap();
        assert_eq!(json, "\"06037206300\"");
        let back: TractId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tract);
        assert!(serde_json::from_str::<TractId>("\"abc\"").is_err());
    }
}
