//! Toolchain selection

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which pipeline variant a request targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolchainKind {
    Arduino,
    #[serde(rename = "platformio")]
    PlatformIO,
}

impl ToolchainKind {
    pub const ALL: [ToolchainKind; 2] = [ToolchainKind::Arduino, ToolchainKind::PlatformIO];

    /// Path segment and serialized name
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolchainKind::Arduino => "arduino",
            ToolchainKind::PlatformIO => "platformio",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ToolchainKind::Arduino => "Arduino CLI",
            ToolchainKind::PlatformIO => "PlatformIO Core",
        }
    }

    /// Executable name looked up on PATH when no path is configured
    pub fn default_binary(&self) -> &'static str {
        match self {
            ToolchainKind::Arduino => "arduino-cli",
            ToolchainKind::PlatformIO => "pio",
        }
    }
}

impl fmt::Display for ToolchainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolchainKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "arduino" | "arduino-cli" => Ok(ToolchainKind::Arduino),
            "platformio" | "pio" => Ok(ToolchainKind::PlatformIO),
            other => Err(format!(
                "unknown toolchain '{}', expected 'arduino' or 'platformio'",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aliases() {
        assert_eq!("pio".parse::<ToolchainKind>(), Ok(ToolchainKind::PlatformIO));
        assert_eq!("Arduino".parse::<ToolchainKind>(), Ok(ToolchainKind::Arduino));
        assert!("make".parse::<ToolchainKind>().is_err());
    }

    #[test]
    fn test_serialized_name_matches_path_segment() {
        for kind in ToolchainKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }
}
