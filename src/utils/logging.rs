//! Logging initialization for the CLI and the server

use anyhow::Result;
use env_logger::{Builder, Target};
use log::LevelFilter;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

/// Level for `-v`/`-q` style flags
pub fn level_from_flags(verbose: u8, quiet: bool) -> LevelFilter {
    match (quiet, verbose) {
        (true, _) => LevelFilter::Error,
        (false, 0) => LevelFilter::Info,
        (false, 1) => LevelFilter::Debug,
        (false, _) => LevelFilter::Trace,
    }
}

/// Stderr logging for one-shot commands; `RUST_LOG` still applies
pub fn init_cli_logging(verbose: u8, quiet: bool) -> Result<()> {
    let level = level_from_flags(verbose, quiet);
    Builder::from_default_env()
        .target(Target::Stderr)
        .filter_level(level)
        .format_timestamp_secs()
        .format_module_path(false)
        .try_init()?;

    #[cfg(debug_assertions)]
    log_panics::init();

    log::debug!("Logging initialized with level: {:?}", level);
    Ok(())
}

/// Server logging: human readable on stdout, or one JSON object per line
pub fn init_server_logging(
    structured: bool,
    log_file: Option<&Path>,
    level: Option<LevelFilter>,
) -> Result<()> {
    let level = level.unwrap_or(LevelFilter::Info);
    let target: Box<dyn Write + Send> = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            Box::new(OpenOptions::new().create(true).append(true).open(path)?)
        }
        None => Box::new(std::io::stdout()),
    };

    let mut builder = Builder::from_default_env();
    builder.target(Target::Pipe(target)).filter_level(level);
    if structured {
        builder.format(|buf, record| {
            let json = serde_json::json!({
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "level": record.level().to_string(),
                "module": record.module_path().unwrap_or("unknown"),
                "message": record.args().to_string(),
            });
            writeln!(buf, "{}", json)
        });
    } else {
        builder.format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {}: {}",
                buf.timestamp(),
                record.level(),
                record.module_path().unwrap_or("unknown"),
                record.args()
            )
        });
    }
    builder.try_init()?;

    // Panics in spawned jobs should land in the log
    log_panics::init();

    log::info!("Server logging initialized with level: {:?}", level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_from_flags() {
        assert_eq!(level_from_flags(0, false), LevelFilter::Info);
        assert_eq!(level_from_flags(1, false), LevelFilter::Debug);
        assert_eq!(level_from_flags(3, false), LevelFilter::Trace);
        assert_eq!(level_from_flags(2, true), LevelFilter::Error);
    }
}
