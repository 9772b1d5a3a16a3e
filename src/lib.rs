//! GateScan - student ID card scan pipeline
//!
//! Validates a base64/data-URI image payload, runs OCR through a bounded
//! pool of recognizer engines, and parses the recognized text into
//! structured fields. The HTTP layer, camera UI, and persistent storage are
//! external collaborators; this crate exposes their boundaries (outcome to
//! status-code mapping, the record store trait, and the pool readiness
//! predicate).

pub mod config;
pub mod engine;
pub mod scan;
pub mod storage;
