//! Package client: search/install/uninstall cores and libraries

use log::{info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::boards::BoardResolver;
use crate::errors::{FlasherError, Result};
use crate::models::{CoreDescriptor, LibraryDescriptor, ToolchainKind};
use crate::toolchain::Toolchain;

/// Synchronous round-trips to the toolchain's package manager.
///
/// Operations on the same identifier are serialized; different identifiers
/// run concurrently. Core changes invalidate the resolver's caches.
pub struct PackageClient {
    toolchain: Arc<dyn Toolchain>,
    resolver: Arc<BoardResolver>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl PackageClient {
    pub fn new(toolchain: Arc<dyn Toolchain>, resolver: Arc<BoardResolver>) -> Self {
        Self {
            toolchain,
            resolver,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn kind(&self) -> ToolchainKind {
        self.toolchain.kind()
    }

    /// Run `op` while holding the lock for `key`; the entry is dropped once unused
    async fn serialized<T, F>(&self, key: String, op: F) -> T
    where
        F: std::future::Future<Output = T>,
    {
        let lock = self
            .locks
            .lock()
            .await
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let result = {
            let _guard = lock.lock().await;
            op.await
        };

        let mut locks = self.locks.lock().await;
        // Only the map and this caller still reference it
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&key);
        }
        result
    }

    fn require_id(id: &str, field: &str) -> Result<()> {
        if id.trim().is_empty() {
            return Err(FlasherError::Validation(format!(
                "The {} field is missing",
                field
            )));
        }
        Ok(())
    }

    pub async fn search_cores(&self, query: &str) -> Result<Vec<CoreDescriptor>> {
        self.toolchain.search_cores(query).await
    }

    pub async fn install_core(&self, id: &str) -> Result<CoreDescriptor> {
        Self::require_id(id, "core")?;
        let result = self
            .serialized(format!("core:{}", id), async {
                let result = self.toolchain.install_core(id).await;
                // A failed install may still have left partial files behind
                self.resolver.invalidate_core(id).await;
                result
            })
            .await;
        match &result {
            Ok(core) => info!("✅ Installed core {} ({:?})", core.id, core.installed),
            Err(e) => warn!("❌ Core install {} failed: {}", id, e),
        }
        result
    }

    pub async fn uninstall_core(&self, id: &str) -> Result<()> {
        Self::require_id(id, "core")?;
        let result = self
            .serialized(format!("core:{}", id), async {
                let result = self.toolchain.uninstall_core(id).await;
                self.resolver.invalidate_core(id).await;
                result
            })
            .await;
        if let Err(e) = &result {
            warn!("❌ Core uninstall {} failed: {}", id, e);
        }
        result
    }

    pub async fn search_libs(&self, query: &str) -> Result<Vec<LibraryDescriptor>> {
        self.toolchain.search_libs(query).await
    }

    pub async fn install_lib(&self, name: &str) -> Result<LibraryDescriptor> {
        Self::require_id(name, "lib")?;
        self.serialized(format!("lib:{}", name), self.toolchain.install_lib(name))
            .await
    }

    pub async fn uninstall_lib(&self, name: &str) -> Result<()> {
        Self::require_id(name, "lib")?;
        self.serialized(format!("lib:{}", name), self.toolchain.uninstall_lib(name))
            .await
    }
}
