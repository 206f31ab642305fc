//! Boards, environments and flash targets

use serde::{Deserialize, Serialize};

use super::toolchain::ToolchainKind;

/// One installable board as reported by `board listall`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardSummary {
    pub name: String,
    pub fqbn: String,
}

impl BoardSummary {
    /// Core (`vendor:arch`) this board belongs to
    pub fn core_id(&self) -> &str {
        core_of(&self.fqbn)
    }
}

/// `vendor:arch:board` -> `vendor:arch`
pub fn core_of(fqbn: &str) -> &str {
    match fqbn.match_indices(':').nth(1) {
        Some((idx, _)) => &fqbn[..idx],
        None => fqbn,
    }
}

/// A selectable value of a board option
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigValue {
    pub value: String,
    pub label: String,
    pub is_default: bool,
}

/// Board configuration option (CPU, upload speed, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigOption {
    pub name: String,
    pub label: String,
    pub values: Vec<ConfigValue>,
}

impl ConfigOption {
    pub fn default_value(&self) -> Option<&ConfigValue> {
        self.values
            .iter()
            .find(|v| v.is_default)
            .or_else(|| self.values.first())
    }
}

/// A chosen `(option, value)` pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardOption {
    pub name: String,
    pub value: String,
}

impl BoardOption {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// What a flash job builds for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    /// Arduino board plus its ordered option selection
    Board {
        fqbn: String,
        #[serde(default)]
        options: Vec<BoardOption>,
    },
    /// PlatformIO build environment
    Environment { name: String },
}

impl Target {
    pub fn board(fqbn: impl Into<String>, options: Vec<BoardOption>) -> Self {
        Target::Board {
            fqbn: fqbn.into(),
            options,
        }
    }

    pub fn environment(name: impl Into<String>) -> Self {
        Target::Environment { name: name.into() }
    }

    /// Toolchain this target is meaningful for
    pub fn kind(&self) -> ToolchainKind {
        match self {
            Target::Board { .. } => ToolchainKind::Arduino,
            Target::Environment { .. } => ToolchainKind::PlatformIO,
        }
    }

    /// Board FQBN or environment name
    pub fn name(&self) -> &str {
        match self {
            Target::Board { fqbn, .. } => fqbn,
            Target::Environment { name } => name,
        }
    }

    /// FQBN with the option selection appended, as `arduino-cli --fqbn` expects it
    pub fn qualified_fqbn(&self) -> Option<String> {
        match self {
            Target::Board { fqbn, options } if options.is_empty() => Some(fqbn.clone()),
            Target::Board { fqbn, options } => {
                let opts: Vec<String> = options
                    .iter()
                    .map(|o| format!("{}={}", o.name, o.value))
                    .collect();
                Some(format!("{}:{}", fqbn, opts.join(",")))
            }
            Target::Environment { .. } => None,
        }
    }
}
