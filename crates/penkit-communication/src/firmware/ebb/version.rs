//! Firmware version parsing and capability checks.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Dotted firmware version, e.g. `2.5.3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FirmwareVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl FirmwareVersion {
    /// First release with the LM command.
    pub const LM_MINIMUM: FirmwareVersion = FirmwareVersion::new(2, 5, 3);

    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse the reply to `V`, taking the version from its last
    /// whitespace-separated token. Missing minor or patch parts read as 0.
    pub fn parse_reply(reply: &str) -> Option<Self> {
        let token = reply.split_whitespace().last()?;
        let mut parts = token.split('.').map(|p| p.parse::<u32>());
        let major = parts.next()?.ok()?;
        let minor = parts.next().unwrap_or(Ok(0)).ok()?;
        let patch = parts.next().unwrap_or(Ok(0)).ok()?;
        Some(Self::new(major, minor, patch))
    }

    /// Whether this firmware accepts the low-level `LM` move.
    pub fn supports_lm(&self) -> bool {
        *self >= Self::LM_MINIMUM
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reply() {
        let v = FirmwareVersion::parse_reply("EBBv13_and_above EB Firmware Version 2.5.3").unwrap();
        assert_eq!(v, FirmwareVersion::new(2, 5, 3));
        assert_eq!(v.to_string(), "2.5.3");
        assert!(v.supports_lm());
    }

    #[test]
    fn test_supports_lm_boundaries() {
        let cases = [
            ("2.5.2", false),
            ("2.5.3", true),
            ("2.6.0", true),
            ("3.0", true),
            ("2.4.9", false),
            ("1.9.9", false),
        ];
        for (token, expected) in cases {
            let v = FirmwareVersion::parse_reply(&format!("Version {}", token)).unwrap();
            assert_eq!(v.supports_lm(), expected, "{}", token);
        }
    }

    #[test]
    fn test_unparseable_versions() {
        assert_eq!(FirmwareVersion::parse_reply(""), None);
        assert_eq!(FirmwareVersion::parse_reply("EBB Firmware Version"), None);
        assert_eq!(FirmwareVersion::parse_reply("Version 2.x.1"), None);
    }
}
