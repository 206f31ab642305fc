//! Last accepted flash options per toolchain

use chrono::Local;
use std::sync::Arc;

use super::state::StateStore;
use crate::errors::Result;
use crate::models::{FlashRequest, LastFlashOptions, ToolchainKind};

/// Last-write-wins record, overwritten on every accepted flash request
#[derive(Clone)]
pub struct LastOptionsStore {
    state: Arc<StateStore>,
}

impl LastOptionsStore {
    pub fn new(state: Arc<StateStore>) -> Self {
        Self { state }
    }

    pub async fn get(&self, kind: ToolchainKind) -> Option<LastFlashOptions> {
        self.state.last_flash_options(kind).await
    }

    pub async fn put(&self, kind: ToolchainKind, options: LastFlashOptions) -> Result<()> {
        self.state.set_last_flash_options(kind, options).await
    }

    /// Record an accepted request
    pub async fn record(&self, kind: ToolchainKind, request: &FlashRequest) -> Result<()> {
        self.put(
            kind,
            LastFlashOptions {
                target: request.target.clone(),
                port: request.port.clone(),
                accepted_at: Local::now(),
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BoardOption, Target};

    #[tokio::test]
    async fn test_put_overwrites() {
        let store = LastOptionsStore::new(Arc::new(StateStore::in_memory()));
        assert!(store.get(ToolchainKind::Arduino).await.is_none());

        let first = FlashRequest::new(Target::board(
            "arduino:avr:mega",
            vec![BoardOption::new("cpu", "atmega2560")],
        ));
        store.record(ToolchainKind::Arduino, &first).await.unwrap();

        let second = FlashRequest::new(Target::board("arduino:avr:uno", vec![]));
        store.record(ToolchainKind::Arduino, &second).await.unwrap();

        let stored = store.get(ToolchainKind::Arduino).await.unwrap();
        assert_eq!(stored.target, second.target);
        assert!(store.get(ToolchainKind::PlatformIO).await.is_none());
    }
}
