use std::fmt;
use std::path::PathBuf;

use tokio::fs::File;
use tracing::{debug, info, warn};

/// Privilege level of a connection. Ordered: `Guest < Low < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Level {
    #[default]
    Guest,
    Low,
    High,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Guest => "GUEST",
            Level::Low => "LOW",
            Level::High => "HIGH",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An in-progress upload. Bytes go to `temp_path` and are renamed onto the
/// final name only at finish.
#[derive(Debug)]
pub struct UploadTransfer {
    pub upload_id: String,
    pub final_name: String,
    pub final_path: PathBuf,
    pub temp_path: PathBuf,
    pub declared_size: u64,
    pub received_size: u64,
    pub next_index: u64,
    pub chunk_size: u32,
    pub file: Option<File>,
}

#[derive(Debug)]
pub struct DownloadTransfer {
    pub download_id: String,
    pub filename: String,
    pub path: PathBuf,
    pub file_size: u64,
    pub next_index: u64,
    pub chunk_size: u32,
    pub offset: u64,
    pub file: File,
}

/// Per-connection state, owned by the connection task.
#[derive(Debug, Default)]
pub struct Session {
    pub level: Level,
    pub username: String,
    pub low_username: String,
    pub upload: Option<UploadTransfer>,
    pub download: Option<DownloadTransfer>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Step one level down. Returns the new level.
    pub async fn logout(&mut self) -> Level {
        match self.level {
            Level::High => {
                self.release_transfers().await;
                self.level = Level::Low;
                self.username = self.low_username.clone();
            }
            Level::Low => {
                self.level = Level::Guest;
                self.username.clear();
                self.low_username.clear();
            }
            Level::Guest => {}
        }
        self.level
    }

    /// Drop the active upload, closing its handle and deleting the temp file.
    pub async fn abort_upload(&mut self) {
        let Some(mut upload) = self.upload.take() else {
            return;
        };
        drop(upload.file.take());
        match tokio::fs::remove_file(&upload.temp_path).await {
            Ok(()) => debug!("Removed partial upload {:?}", upload.temp_path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove partial upload {:?}: {}", upload.temp_path, e),
        }
    }

    /// Drop the active download. The source file is never touched.
    pub fn reset_download(&mut self) {
        self.download = None;
    }

    pub async fn release_transfers(&mut self) {
        if let Some(upload) = &self.upload {
            info!("Releasing upload {} ({})", upload.upload_id, upload.final_name);
        }
        self.abort_upload().await;
        self.reset_download();
    }

    /// Connection teardown.
    pub async fn cleanup(&mut self) {
        self.release_transfers().await;
        self.level = Level::Guest;
        self.username.clear();
        self.low_username.clear();
    }
}
