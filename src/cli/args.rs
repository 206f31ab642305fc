//! Command line argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::models::{BoardOption, ToolchainKind};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "marlin-flasher")]
#[command(about = "Build and flash Marlin firmware with arduino-cli or PlatformIO")]
pub struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short = 'v', long = "verbose", global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Decrease logging verbosity (only errors)
    #[arg(short = 'q', long = "quiet", global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Serve the HTTP/WebSocket API
    Serve {
        /// Bind address (overrides the configuration)
        #[arg(short, long)]
        bind: Option<String>,
        /// Port to listen on (overrides the configuration)
        #[arg(short, long)]
        port: Option<u16>,
        /// Log one JSON object per line
        #[arg(long)]
        structured_logs: bool,
        /// Append logs to this file instead of stdout
        #[arg(long)]
        log_file: Option<PathBuf>,
    },
    /// Write the default configuration file
    Config {
        /// Where to write it (defaults to the --config path)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// List boards (Arduino) or environments (PlatformIO)
    Boards {
        /// arduino or platformio
        kind: ToolchainKind,
        /// Show the configuration options of one board
        #[arg(long)]
        fqbn: Option<String>,
        /// PlatformIO project to read environments from
        #[arg(short, long)]
        artifact: Option<PathBuf>,
    },
    /// Build and upload one firmware, printing progress
    Flash {
        /// arduino or platformio
        kind: ToolchainKind,
        /// Sketch (.ino or folder) or PlatformIO project directory
        #[arg(short, long)]
        artifact: PathBuf,
        /// Board FQBN (Arduino) or environment name (PlatformIO)
        #[arg(short, long)]
        target: String,
        /// Board option as NAME=VALUE, repeatable (Arduino only)
        #[arg(short = 'o', long = "option", value_parser = parse_board_option)]
        options: Vec<BoardOption>,
        /// Serial port to upload to
        #[arg(short, long)]
        port: Option<String>,
        /// Skip the configured pre/post flash hooks
        #[arg(long)]
        skip_hooks: bool,
    },
    /// Install arduino-cli or PlatformIO Core
    InstallToolchain {
        /// arduino or platformio
        kind: ToolchainKind,
    },
    /// List serial ports
    Ports,
}

/// Parse `NAME=VALUE` into a board option
pub fn parse_board_option(s: &str) -> Result<BoardOption, String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", s))?;
    let (name, value) = (name.trim(), value.trim());
    if name.is_empty() || value.is_empty() {
        return Err(format!("expected NAME=VALUE, got '{}'", s));
    }
    Ok(BoardOption::new(name, value))
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// The --config path, or the per-user default
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(|| {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("marlin-flasher")
                .join("flasher.toml")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_board_option() {
        assert_eq!(
            parse_board_option("cpu=atmega2560").unwrap(),
            BoardOption::new("cpu", "atmega2560")
        );
        assert!(parse_board_option("cpu").is_err());
        assert!(parse_board_option("=x").is_err());
    }

    #[test]
    fn test_flash_arguments() {
        let cli = Cli::try_parse_from([
            "marlin-flasher",
            "flash",
            "arduino",
            "--artifact",
            "Marlin",
            "--target",
            "arduino:avr:mega",
            "-o",
            "cpu=atmega2560",
            "--port",
            "/dev/ttyACM0",
        ])
        .unwrap();
        match cli.command {
            Commands::Flash {
                kind,
                options,
                port,
                skip_hooks,
                ..
            } => {
                assert_eq!(kind, ToolchainKind::Arduino);
                assert_eq!(options, vec![BoardOption::new("cpu", "atmega2560")]);
                assert_eq!(port.as_deref(), Some("/dev/ttyACM0"));
                assert!(!skip_hooks);
            }
            _ => panic!("expected the flash command"),
        }
    }
}
