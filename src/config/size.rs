//! Byte sizes parsed from nginx-style suffix strings.
//!
//! Directives such as `client_max_body_size` accept values like `"512"`,
//! `"64k"`, `"10m"` or `"1g"`. A [`Size`] keeps the resolved byte count and
//! remembers nothing about the spelling it was parsed from.

use std::fmt;

use serde::Deserialize;

use crate::config::error::ConfigError;

const KILOBYTE: u64 = 1024;
const MEGABYTE: u64 = 1024 * KILOBYTE;
const GIGABYTE: u64 = 1024 * MEGABYTE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Size(u64);

impl Size {
    pub const fn from_bytes(bytes: u64) -> Self {
        Size(bytes)
    }

    pub const fn from_kilobytes(kb: u64) -> Self {
        Size(kb * KILOBYTE)
    }

    pub const fn from_megabytes(mb: u64) -> Self {
        Size(mb * MEGABYTE)
    }

    pub const fn from_gigabytes(gb: u64) -> Self {
        Size(gb * GIGABYTE)
    }

    pub fn bytes(&self) -> u64 {
        self.0
    }

    /// Parses `"512"`, `"64k"`, `"10m"`, `"1g"` (suffix case-insensitive).
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::InvalidSize(input.to_string()));
        }

        let (digits, multiplier) = match trimmed.chars().last() {
            Some('k') | Some('K') => (&trimmed[..trimmed.len() - 1], KILOBYTE),
            Some('m') | Some('M') => (&trimmed[..trimmed.len() - 1], MEGABYTE),
            Some('g') | Some('G') => (&trimmed[..trimmed.len() - 1], GIGABYTE),
            Some(c) if c.is_ascii_digit() => (trimmed, 1),
            _ => return Err(ConfigError::InvalidSize(input.to_string())),
        };

        let value: u64 = digits
            .parse()
            .map_err(|_| ConfigError::InvalidSize(input.to_string()))?;

        value
            .checked_mul(multiplier)
            .map(Size)
            .ok_or_else(|| ConfigError::InvalidSize(input.to_string()))
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 >= GIGABYTE && self.0 % GIGABYTE == 0 {
            write!(f, "{}g", self.0 / GIGABYTE)
        } else if self.0 >= MEGABYTE && self.0 % MEGABYTE == 0 {
            write!(f, "{}m", self.0 / MEGABYTE)
        } else if self.0 >= KILOBYTE && self.0 % KILOBYTE == 0 {
            write!(f, "{}k", self.0 / KILOBYTE)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Accepts either a bare integer (bytes) or a suffixed string in TOML.
impl<'de> Deserialize<'de> for Size {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Bytes(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Bytes(n) => Ok(Size::from_bytes(n)),
            Raw::Text(s) => Size::parse(&s).map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_bytes() {
        assert_eq!(Size::parse("512").unwrap().bytes(), 512);
    }

    #[test]
    fn parses_suffixes() {
        assert_eq!(Size::parse("64k").unwrap().bytes(), 64 * 1024);
        assert_eq!(Size::parse("10M").unwrap().bytes(), 10 * 1024 * 1024);
        assert_eq!(Size::parse("1g").unwrap().bytes(), 1024 * 1024 * 1024);
    }

    #[test]
    fn rejects_garbage() {
        assert!(Size::parse("").is_err());
        assert!(Size::parse("10x").is_err());
        assert!(Size::parse("m").is_err());
        assert!(Size::parse("-1k").is_err());
    }

    #[test]
    fn display_uses_shortest_suffix() {
        assert_eq!(Size::from_megabytes(10).to_string(), "10m");
        assert_eq!(Size::from_bytes(1536).to_string(), "1536");
        assert_eq!(Size::from_kilobytes(2048).to_string(), "2m");
    }
}
