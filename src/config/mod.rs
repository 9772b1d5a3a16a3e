//! Application Configuration
//!
//! Engine and pool settings stored in TOML format.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::engine::{EngineSettings, OcrBackend, PoolSettings};
use crate::scan::ScanSettings;

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// OCR engine settings
    pub engine: EngineConfig,
    /// Engine pool settings
    pub pool: PoolConfig,
}

/// OCR engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Which recognizer backend to use
    pub backend: OcrBackend,
    /// Recognition language (e.g. "eng")
    pub language: String,
    /// Optional override for the language model directory
    pub datapath: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: OcrBackend::default(),
            language: "eng".to_string(),
            datapath: None,
        }
    }
}

/// Engine pool and per-request timing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of pre-initialized engine handles
    pub size: usize,
    /// How long a request waits for a free handle (ms)
    pub acquire_timeout_ms: u64,
    /// Hard bound on one recognition call (ms)
    pub recognition_timeout_ms: u64,
    /// How long shutdown waits for in-flight scans (ms)
    pub drain_timeout_ms: u64,
    /// Initial backoff before rebuilding a lost handle (ms)
    pub replace_backoff_ms: u64,
    /// Upper bound for the replacement backoff (ms)
    pub replace_backoff_cap_ms: u64,
    /// Rebuild attempts before giving up on a slot
    pub replace_attempts: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: 2,
            acquire_timeout_ms: 5000,
            recognition_timeout_ms: 30000,
            drain_timeout_ms: 10000,
            replace_backoff_ms: 500,
            replace_backoff_cap_ms: 30000,
            replace_attempts: 5,
        }
    }
}

impl AppConfig {
    /// Engine construction settings for the configured backend
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            language: self.engine.language.clone(),
            datapath: self.engine.datapath.clone(),
        }
    }

    /// Pool sizing and replacement settings
    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            size: self.pool.size,
            replace_backoff: Duration::from_millis(self.pool.replace_backoff_ms),
            replace_backoff_cap: Duration::from_millis(self.pool.replace_backoff_cap_ms),
            replace_attempts: self.pool.replace_attempts,
        }
    }

    /// Per-request timeouts for the orchestrator
    pub fn scan_settings(&self) -> ScanSettings {
        ScanSettings {
            acquire_timeout: Duration::from_millis(self.pool.acquire_timeout_ms),
            recognition_timeout: Duration::from_millis(self.pool.recognition_timeout_ms),
        }
    }

    /// Shutdown drain window
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.pool.drain_timeout_ms)
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
