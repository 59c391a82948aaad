use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::ServerConfig;

/// Per-server transfer id generator. Ids are unique within the process and
/// carry a random suffix so they are not guessable across restarts.
#[derive(Debug, Default)]
pub struct TransferIds {
    counter: AtomicU64,
}

impl TransferIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_upload(&self) -> String {
        self.next("U")
    }

    pub fn next_download(&self) -> String {
        self.next("D")
    }

    fn next(&self, prefix: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!("{}{}_{}", prefix, n, &suffix[..8])
    }
}

/// Everything a handler may read besides its own session.
#[derive(Debug, Clone)]
pub struct ServerContext {
    pub config: Arc<ServerConfig>,
    pub ids: Arc<TransferIds>,
}

impl ServerContext {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(config),
            ids: Arc::new(TransferIds::new()),
        }
    }

    pub fn storage_path(&self, filename: &str) -> PathBuf {
        self.config.storage_dir.join(filename)
    }
}
