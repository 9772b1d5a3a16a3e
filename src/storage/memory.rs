//! In-memory record store
//!
//! Reference implementation of the record store boundary; a database-backed
//! store is an external collaborator with the same contract.

use std::time::SystemTime;

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::scan::ExtractedFields;

use super::{RecordStore, StoreError, StudentRecord};

/// Record store backed by process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Vec<StudentRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn create(&self, fields: ExtractedFields) -> Result<StudentRecord, StoreError> {
        let mut records = self.records.lock();

        if records.iter().any(|r| r.student_id == fields.student_id) {
            return Err(StoreError::DuplicateKey(fields.student_id));
        }

        let record = StudentRecord {
            id: Uuid::new_v4(),
            name: fields.name,
            branch: fields.branch,
            student_id: fields.student_id,
            verified: true,
            scanned_at: SystemTime::now(),
        };
        records.push(record.clone());
        Ok(record)
    }

    async fn list(&self) -> Vec<StudentRecord> {
        let mut records = self.records.lock().clone();
        records.sort_by(|a, b| b.scanned_at.cmp(&a.scanned_at));
        records
    }
}
