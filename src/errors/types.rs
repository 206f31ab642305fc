//! Error types for the flashing engine

use serde::{Deserialize, Serialize};
use std::fmt;

/// Main error type for flasher operations
#[derive(Debug)]
pub enum FlasherError {
    /// Bad request: missing artifact, malformed target, missing field
    Validation(String),
    /// A conflicting operation already owns the resource
    Busy(String),
    /// The requested board or environment is not in the current snapshot
    UnknownTarget(String),
    /// Board details requested for an FQBN the toolchain does not know
    UnknownBoard(String),
    /// Unknown core or library identifier
    NotFound(String),
    /// Non-zero subprocess exit, with the captured standard error
    Toolchain { message: String, stderr: String },
    /// Package index or download host unreachable
    Network(String),
    /// A bounded operation exceeded its deadline, with any stderr seen before the kill
    Timeout { message: String, stderr: String },
    /// Remote agent process failure
    Agent(String),
    /// Operation not offered by the active toolchain
    Unsupported(String),
    /// Uploaded file exceeds the configured limit
    TooLarge { size: u64, limit: u64 },
    /// Configuration related errors
    Config(String),
    /// General I/O errors
    Io(std::io::Error),
    /// Serialization errors
    Serialization(String),
}

/// Machine-stable error classification carried by every error response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Busy,
    UnknownTarget,
    UnknownBoard,
    NotFound,
    Toolchain,
    Network,
    Timeout,
    Agent,
    Unsupported,
    TooLarge,
    Config,
    Io,
    Serialization,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Busy => "busy",
            ErrorKind::UnknownTarget => "unknown_target",
            ErrorKind::UnknownBoard => "unknown_board",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Toolchain => "toolchain",
            ErrorKind::Network => "network",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Agent => "agent",
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::TooLarge => "too_large",
            ErrorKind::Config => "config",
            ErrorKind::Io => "io",
            ErrorKind::Serialization => "serialization",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FlasherError {
    /// Build a toolchain failure from a message and the captured stderr tail
    pub fn toolchain(message: impl Into<String>, stderr: impl Into<String>) -> Self {
        FlasherError::Toolchain {
            message: message.into(),
            stderr: stderr.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        FlasherError::Timeout {
            message: message.into(),
            stderr: String::new(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            FlasherError::Validation(_) => ErrorKind::Validation,
            FlasherError::Busy(_) => ErrorKind::Busy,
            FlasherError::UnknownTarget(_) => ErrorKind::UnknownTarget,
            FlasherError::UnknownBoard(_) => ErrorKind::UnknownBoard,
            FlasherError::NotFound(_) => ErrorKind::NotFound,
            FlasherError::Toolchain { .. } => ErrorKind::Toolchain,
            FlasherError::Network(_) => ErrorKind::Network,
            FlasherError::Timeout { .. } => ErrorKind::Timeout,
            FlasherError::Agent(_) => ErrorKind::Agent,
            FlasherError::Unsupported(_) => ErrorKind::Unsupported,
            FlasherError::TooLarge { .. } => ErrorKind::TooLarge,
            FlasherError::Config(_) => ErrorKind::Config,
            FlasherError::Io(_) => ErrorKind::Io,
            FlasherError::Serialization(_) => ErrorKind::Serialization,
        }
    }

    /// Captured standard error, for failures that carry one
    pub fn stderr(&self) -> Option<&str> {
        match self {
            FlasherError::Toolchain { stderr, .. } | FlasherError::Timeout { stderr, .. }
                if !stderr.is_empty() =>
            {
                Some(stderr)
            }
            _ => None,
        }
    }

    /// The message without its classification prefix
    pub fn message(&self) -> String {
        match self {
            FlasherError::Validation(msg)
            | FlasherError::Busy(msg)
            | FlasherError::UnknownTarget(msg)
            | FlasherError::NotFound(msg)
            | FlasherError::Network(msg)
            | FlasherError::Agent(msg)
            | FlasherError::Unsupported(msg)
            | FlasherError::Config(msg)
            | FlasherError::Serialization(msg) => msg.clone(),
            FlasherError::UnknownBoard(fqbn) => format!("Unknown board {}", fqbn),
            FlasherError::Toolchain { message, .. } | FlasherError::Timeout { message, .. } => {
                message.clone()
            }
            FlasherError::TooLarge { size, limit } => {
                format!("{} bytes exceeds the {} byte limit", size, limit)
            }
            FlasherError::Io(err) => err.to_string(),
        }
    }
}

impl fmt::Display for FlasherError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlasherError::Validation(msg) => write!(f, "Validation error: {}", msg),
            FlasherError::Busy(msg) => write!(f, "Busy: {}", msg),
            FlasherError::UnknownTarget(msg) => write!(f, "Unknown target: {}", msg),
            FlasherError::UnknownBoard(fqbn) => write!(f, "Unknown board: {}", fqbn),
            FlasherError::NotFound(id) => write!(f, "Not found: {}", id),
            FlasherError::Toolchain { message, .. } => write!(f, "Toolchain error: {}", message),
            FlasherError::Network(msg) => write!(f, "Network error: {}", msg),
            FlasherError::Timeout { message, .. } => write!(f, "Timed out: {}", message),
            FlasherError::Agent(msg) => write!(f, "Remote agent error: {}", msg),
            FlasherError::Unsupported(msg) => write!(f, "Unsupported: {}", msg),
            FlasherError::TooLarge { size, limit } => write!(
                f,
                "File too large: {} bytes exceeds the {} byte limit",
                size, limit
            ),
            FlasherError::Config(msg) => write!(f, "Configuration error: {}", msg),
            FlasherError::Io(err) => write!(f, "I/O error: {}", err),
            FlasherError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for FlasherError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FlasherError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for FlasherError {
    fn from(err: std::io::Error) -> Self {
        FlasherError::Io(err)
    }
}

impl From<serde_json::Error> for FlasherError {
    fn from(err: serde_json::Error) -> Self {
        FlasherError::Serialization(err.to_string())
    }
}

impl From<ron::Error> for FlasherError {
    fn from(err: ron::Error) -> Self {
        FlasherError::Serialization(err.to_string())
    }
}

impl From<ron::error::SpannedError> for FlasherError {
    fn from(err: ron::error::SpannedError) -> Self {
        FlasherError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for FlasherError {
    fn from(err: toml::de::Error) -> Self {
        FlasherError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for FlasherError {
    fn from(err: toml::ser::Error) -> Self {
        FlasherError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for FlasherError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FlasherError::timeout(err.to_string())
        } else {
            FlasherError::Network(err.to_string())
        }
    }
}

/// Result type alias for flasher operations
pub type Result<T> = std::result::Result<T, FlasherError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_strings_are_snake_case() {
        assert_eq!(ErrorKind::UnknownTarget.as_str(), "unknown_target");
        let json = serde_json::to_string(&ErrorKind::TooLarge).unwrap();
        assert_eq!(json, "\"too_large\"");
    }

    #[test]
    fn test_stderr_only_for_toolchain_failures() {
        let err = FlasherError::toolchain("compile failed", "sketch.ino:3: expected ';'");
        assert_eq!(err.kind(), ErrorKind::Toolchain);
        assert_eq!(err.stderr(), Some("sketch.ino:3: expected ';'"));

        let err = FlasherError::toolchain("compile failed", "");
        assert_eq!(err.stderr(), None);
        assert_eq!(FlasherError::Busy("x".into()).stderr(), None);
    }

    #[test]
    fn test_message_drops_the_classification() {
        let err = FlasherError::Validation("The fqbn field is missing".into());
        assert_eq!(err.to_string(), "Validation error: The fqbn field is missing");
        assert_eq!(err.message(), "The fqbn field is missing");

        let err = FlasherError::Timeout {
            message: "pre-flash hook did not finish within 1s".into(),
            stderr: "printer busy".into(),
        };
        assert_eq!(err.message(), "pre-flash hook did not finish within 1s");
        assert_eq!(err.stderr(), Some("printer busy"));
        assert_eq!(FlasherError::timeout("slow").stderr(), None);
    }

    #[test]
    fn test_io_error_keeps_source() {
        use std::error::Error;
        let err: FlasherError =
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.source().is_some());
    }
}
