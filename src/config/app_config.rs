//! Installation-wide configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{FlasherError, Result};
use crate::models::ToolchainKind;

/// Main configuration, passed explicitly into every component at construction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlasherConfig {
    /// Durable state file and uploaded artifacts live here
    pub data_dir: PathBuf,
    /// Default serial port for uploads
    pub serial_port: Option<String>,
    pub arduino: ArduinoSettings,
    pub platformio: PlatformIoSettings,
    pub hooks: HookSettings,
    pub limits: Limits,
    pub installer: InstallerSettings,
    pub server: ServerSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArduinoSettings {
    /// Path to `arduino-cli`; PATH lookup when unset
    pub cli_path: Option<PathBuf>,
    /// Extra board manager index URLs
    pub additional_urls: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformIoSettings {
    /// Path to `pio`/`platformio`; PATH lookup when unset
    pub cli_path: Option<PathBuf>,
    pub remote_agent: RemoteAgentSettings,
}

/// Remote agent supervision settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteAgentSettings {
    /// Delegate build+upload to the agent while it is running
    pub enabled: bool,
    /// Agent name announced to the PlatformIO remote service
    pub name: Option<String>,
    /// Passed as `PLATFORMIO_AUTH_TOKEN`
    pub auth_token: Option<String>,
    /// Output line that confirms the agent is connected; empty means "running once spawned"
    pub ready_pattern: String,
}

impl Default for RemoteAgentSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            name: None,
            auth_token: None,
            ready_pattern: r"(?i)(successfully (connected|authorized)|agent.*started)".to_string(),
        }
    }
}

/// Pre/post flash hooks
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HookSettings {
    /// Shell command run before building
    pub pre_flash_script: Option<String>,
    pub pre_flash_delay_secs: u64,
    /// Shell command run after a successful upload
    pub post_flash_script: Option<String>,
    pub post_flash_delay_secs: u64,
}

impl HookSettings {
    pub fn has_pre_hook(&self) -> bool {
        self.pre_flash_script.is_some() || self.pre_flash_delay_secs > 0
    }

    pub fn has_post_hook(&self) -> bool {
        self.post_flash_script.is_some() || self.post_flash_delay_secs > 0
    }
}

/// Timeouts and size caps
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub compile_timeout_secs: u64,
    pub upload_timeout_secs: u64,
    pub package_timeout_secs: u64,
    pub hook_timeout_secs: u64,
    pub install_timeout_secs: u64,
    /// Lines of standard error kept for failure reports
    pub max_error_lines: usize,
    pub max_upload_size_mb: u64,
    /// Progress publisher buffer per subscriber
    pub event_buffer: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            compile_timeout_secs: 600,
            upload_timeout_secs: 300,
            package_timeout_secs: 300,
            hook_timeout_secs: 120,
            install_timeout_secs: 900,
            max_error_lines: 200,
            max_upload_size_mb: 20,
            event_buffer: 1024,
        }
    }
}

impl Limits {
    pub fn compile_timeout(&self) -> Duration {
        Duration::from_secs(self.compile_timeout_secs)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }

    pub fn package_timeout(&self) -> Duration {
        Duration::from_secs(self.package_timeout_secs)
    }

    pub fn hook_timeout(&self) -> Duration {
        Duration::from_secs(self.hook_timeout_secs)
    }

    pub fn install_timeout(&self) -> Duration {
        Duration::from_secs(self.install_timeout_secs)
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_size_mb.saturating_mul(1024 * 1024)
    }
}

/// Where a toolchain bootstrap script comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallerSource {
    Url(String),
    Path(PathBuf),
}

/// How one toolchain is bootstrapped
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapRecipe {
    pub source: InstallerSource,
    /// Program that runs the script (`sh`, `python3`)
    pub interpreter: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Executable expected after a successful run, relative to the install dir
    pub executable: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallerSettings {
    /// Install root; defaults to `<data_dir>/toolchains`
    pub install_dir: Option<PathBuf>,
    pub arduino: BootstrapRecipe,
    pub platformio: BootstrapRecipe,
}

impl Default for InstallerSettings {
    fn default() -> Self {
        Self {
            install_dir: None,
            arduino: BootstrapRecipe {
                source: InstallerSource::Url(
                    "https://raw.githubusercontent.com/arduino/arduino-cli/master/install.sh"
                        .to_string(),
                ),
                interpreter: "sh".to_string(),
                args: Vec::new(),
                executable: PathBuf::from("arduino-cli/bin/arduino-cli"),
            },
            platformio: BootstrapRecipe {
                source: InstallerSource::Url(
                    "https://raw.githubusercontent.com/platformio/platformio-core-installer/master/get-platformio.py"
                        .to_string(),
                ),
                interpreter: "python3".to_string(),
                args: Vec::new(),
                executable: PathBuf::from("platformio/penv/bin/platformio"),
            },
        }
    }
}

impl InstallerSettings {
    pub fn recipe(&self, kind: ToolchainKind) -> &BootstrapRecipe {
        match kind {
            ToolchainKind::Arduino => &self.arduino,
            ToolchainKind::PlatformIO => &self.platformio,
        }
    }
}

/// HTTP request surface settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind_address: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 8087,
        }
    }
}

impl Default for FlasherConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            serial_port: None,
            arduino: ArduinoSettings::default(),
            platformio: PlatformIoSettings::default(),
            hooks: HookSettings::default(),
            limits: Limits::default(),
            installer: InstallerSettings::default(),
            server: ServerSettings::default(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("marlin-flasher")
}

impl FlasherConfig {
    /// Load from a TOML file; missing fields take their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            FlasherError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: FlasherConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load when the file exists, defaults otherwise
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            log::info!(
                "No configuration at {}, using defaults",
                path.display()
            );
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// A configuration rooted in `data_dir`, for embedding and tests
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    pub fn cli_path(&self, kind: ToolchainKind) -> Option<&PathBuf> {
        match kind {
            ToolchainKind::Arduino => self.arduino.cli_path.as_ref(),
            ToolchainKind::PlatformIO => self.platformio.cli_path.as_ref(),
        }
    }

    pub fn state_file(&self) -> PathBuf {
        self.data_dir.join("state.ron")
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    pub fn install_dir(&self) -> PathBuf {
        self.installer
            .install_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("toolchains"))
    }
}
