use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use anyhow::{bail, Context, Result};

use crate::crypto::{self, KEY_LEN};

pub const DEFAULT_PORT: u16 = 9000;
pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024; // 100MB
pub const DEFAULT_MAX_CHUNK_BYTES: u32 = 64 * 1024;
/// Largest chunk whose base64 form still fits the codec's string limit
pub const MAX_CHUNK_BYTES_LIMIT: u32 = 96 * 1024;
pub const DEFAULT_CONFIG_FILE: &str = "remoted.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverwritePolicy {
    Reject,
    Overwrite,
    Rename,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowUser {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_ip: String,
    pub port: u16,
    pub storage_dir: PathBuf,
    pub auto_create_directories: bool,
    pub max_file_size: u64,
    pub max_chunk_bytes: u32,
    pub overwrite: OverwritePolicy,
    /// Shared password accepted for any non-empty low username
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low_password: Option<String>,
    pub admin_user: String,
    pub admin_pass_plain: String,
    pub des_key_hex: String,
    pub allow_remote_exec: bool,
    pub low_users: Vec<LowUser>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_ip: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            storage_dir: PathBuf::from("./storage"),
            auto_create_directories: true,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_chunk_bytes: DEFAULT_MAX_CHUNK_BYTES,
            overwrite: OverwritePolicy::Rename,
            low_password: None,
            admin_user: "admin".to_string(),
            admin_pass_plain: "admin123".to_string(),
            des_key_hex: "0123456789ABCDEF".to_string(),
            allow_remote_exec: false,
            low_users: vec![LowUser {
                username: "user".to_string(),
                password: "1234".to_string(),
            }],
        }
    }
}

impl ServerConfig {
    pub fn load_or_create(config_path: Option<&str>) -> Result<Self> {
        let config_file = config_path.unwrap_or(DEFAULT_CONFIG_FILE);

        let config = if std::path::Path::new(config_file).exists() {
            let content = std::fs::read_to_string(config_file)
                .with_context(|| format!("failed to read config: {}", config_file))?;
            let config: ServerConfig = toml::from_str(&content)
                .with_context(|| format!("failed to parse config: {}", config_file))?;
            tracing::info!("Config loaded from {}", config_file);
            config
        } else {
            let config = Self::default();
            config.save(config_file)?;
            tracing::warn!("Config not found, wrote defaults to {}", config_file);
            config
        };

        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, config_path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            bail!("invalid field: port");
        }
        if self.bind_ip.parse::<IpAddr>().is_err() {
            bail!("invalid field: bind_ip ({})", self.bind_ip);
        }
        if self.storage_dir.as_os_str().is_empty() {
            bail!("invalid field: storage_dir");
        }
        if self.max_file_size == 0 {
            bail!("invalid field: max_file_size");
        }
        if self.max_chunk_bytes == 0 || self.max_chunk_bytes > MAX_CHUNK_BYTES_LIMIT {
            bail!(
                "invalid field: max_chunk_bytes (1..={})",
                MAX_CHUNK_BYTES_LIMIT
            );
        }
        if self.low_users.is_empty() && self.low_password.is_none() {
            bail!("invalid or missing field: low_users");
        }
        if self.low_users.iter().any(|u| u.username.is_empty()) {
            bail!("invalid low_users.username");
        }
        if self.admin_user.is_empty() {
            bail!("invalid or missing field: admin_user");
        }
        self.key_bytes()?;
        Ok(())
    }

    pub fn key_bytes(&self) -> Result<[u8; KEY_LEN]> {
        crypto::parse_key(&self.des_key_hex)
            .map_err(|_| anyhow::anyhow!("invalid des_key_hex (need 16 hex chars)"))
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .bind_ip
            .parse()
            .with_context(|| format!("invalid bind_ip: {}", self.bind_ip))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Match against the configured credential set.
    pub fn check_low_credentials(&self, username: &str, password: &str) -> bool {
        if self
            .low_users
            .iter()
            .any(|u| u.username == username && u.password == password)
        {
            return true;
        }
        matches!(&self.low_password, Some(shared) if !username.is_empty() && shared == password)
    }

    pub fn ensure_directories(&self) -> Result<()> {
        if self.auto_create_directories && !self.storage_dir.exists() {
            std::fs::create_dir_all(&self.storage_dir).with_context(|| {
                format!("failed to create storage_dir: {:?}", self.storage_dir)
            })?;
            tracing::info!("Created storage directory: {:?}", self.storage_dir);
        }
        if !self.storage_dir.is_dir() {
            bail!("storage_dir is not a directory: {:?}", self.storage_dir);
        }
        Ok(())
    }
}
