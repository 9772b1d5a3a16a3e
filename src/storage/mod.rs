//! Storage Layer Boundary
//!
//! The scan pipeline does not persist records itself; on confirmation the
//! extracted fields are handed to a record store keyed by student ID. This
//! module specifies that boundary and ships an in-memory implementation.

pub mod memory;

use std::path::PathBuf;
use std::time::SystemTime;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::scan::ExtractedFields;

pub use memory::MemoryStore;

/// A confirmed, persisted scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentRecord {
    /// Record identity
    pub id: Uuid,
    /// Card holder name
    pub name: String,
    /// Organizational branch
    pub branch: String,
    /// Student identifier (unique key)
    #[serde(rename = "studentId")]
    pub student_id: String,
    /// Set on confirmation; a fresh scan is never verified
    pub verified: bool,
    /// When the record was stored
    #[serde(rename = "scannedAt")]
    pub scanned_at: SystemTime,
}

/// Errors from the record store
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// A record with this student ID already exists (maps to HTTP 409)
    #[error("student ID {0} already exists")]
    DuplicateKey(String),
}

/// Record store contract.
///
/// `create` persists confirmed fields with `verified: true` and rejects
/// duplicate student IDs; `list` returns records newest first.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn create(&self, fields: ExtractedFields) -> Result<StudentRecord, StoreError>;

    async fn list(&self) -> Vec<StudentRecord>;
}

/// Get the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("com", "gatescan", "GateScan")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

    let config_dir = proj_dirs.config_dir().to_path_buf();
    std::fs::create_dir_all(&config_dir)?;

    Ok(config_dir)
}
