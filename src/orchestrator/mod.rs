//! Flash job orchestration
//!
//! Both toolchains run the same state machine through their own
//! [`FlashPipeline`]; jobs are serialized per toolchain only.

pub mod hooks;
pub mod job;
pub mod pipeline;

pub use hooks::{HookPhase, HookRunner};
pub use job::FlashJob;
pub use pipeline::{FlashPipeline, PipelineParts};

use std::collections::HashMap;

use crate::errors::{FlasherError, Result};
use crate::models::{FlashRequest, FlashStatus, JobHandle, LastFlashOptions, ToolchainKind};

/// Routes flash requests to the pipeline for their toolchain
#[derive(Clone, Default)]
pub struct FlashOrchestrator {
    pipelines: HashMap<ToolchainKind, FlashPipeline>,
}

impl FlashOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pipeline(mut self, pipeline: FlashPipeline) -> Self {
        self.pipelines.insert(pipeline.kind(), pipeline);
        self
    }

    pub fn pipeline(&self, kind: ToolchainKind) -> Result<&FlashPipeline> {
        self.pipelines.get(&kind).ok_or_else(|| {
            FlasherError::Unsupported(format!("No {} pipeline is configured", kind.display_name()))
        })
    }

    /// Accept a flash request for `kind`; progress arrives on the publisher
    pub async fn start_flash(&self, kind: ToolchainKind, request: FlashRequest) -> Result<JobHandle> {
        self.pipeline(kind)?.start(request).await
    }

    pub async fn status(&self, kind: ToolchainKind) -> Result<FlashStatus> {
        Ok(self.pipeline(kind)?.status().await)
    }

    pub async fn last_options(&self, kind: ToolchainKind) -> Result<Option<LastFlashOptions>> {
        Ok(self.pipeline(kind)?.last_options().get(kind).await)
    }
}
