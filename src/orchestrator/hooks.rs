//! Pre/post flash hooks: an optional shell command followed by an optional delay

use log::info;
use std::time::Duration;

use crate::config::{HookSettings, Limits};
use crate::errors::Result;
use crate::toolchain::{LineSink, ToolCommand};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPhase {
    PreFlash,
    PostFlash,
}

/// Runs the installation-wide hooks around a flash
#[derive(Debug, Clone)]
pub struct HookRunner {
    settings: HookSettings,
    limits: Limits,
}

impl HookRunner {
    pub fn new(settings: HookSettings, limits: Limits) -> Self {
        Self { settings, limits }
    }

    pub fn is_configured(&self, phase: HookPhase) -> bool {
        match phase {
            HookPhase::PreFlash => self.settings.has_pre_hook(),
            HookPhase::PostFlash => self.settings.has_post_hook(),
        }
    }

    /// Run the hook for `phase`; a failing script fails the job with its stderr
    pub async fn run(&self, phase: HookPhase, sink: &LineSink) -> Result<()> {
        let (script, delay_secs) = match phase {
            HookPhase::PreFlash => (
                self.settings.pre_flash_script.as_deref(),
                self.settings.pre_flash_delay_secs,
            ),
            HookPhase::PostFlash => (
                self.settings.post_flash_script.as_deref(),
                self.settings.post_flash_delay_secs,
            ),
        };

        if let Some(script) = script.filter(|s| !s.trim().is_empty()) {
            info!("🪝 Running {:?} hook: {}", phase, script);
            sink(&format!("🪝 Executing: {}", script));
            ToolCommand::shell(script)
                .timeout(self.limits.hook_timeout())
                .max_error_lines(self.limits.max_error_lines)
                .run(Some(sink))
                .await?;
        }

        if delay_secs > 0 {
            sink(&format!("⏳ Waiting {}s", delay_secs));
            tokio::time::sleep(Duration::from_secs(delay_secs)).await;
        }
        Ok(())
    }
}
