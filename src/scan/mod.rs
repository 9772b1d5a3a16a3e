//! Scan Pipeline
//!
//! Orchestrates one ID card scan: syntactic validation, engine acquisition
//! from the bounded pool, recognition, and field extraction, classified into
//! a single outcome per request. The pool is the only shared state; the
//! validator and extractor are pure.

pub mod extract;
pub mod validate;

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::engine::EnginePool;

pub use extract::ExtractedFields;

/// Data-URI prefix stripped before base64 decoding
static DATA_URI_STRIP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^data:image/\w+;base64,").expect("valid regex"));

/// Result of one scan request; exactly one variant per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Recognition and extraction produced at least one field
    Success(ExtractedFields),
    /// The payload is not a plausible image encoding
    ValidationError,
    /// No engine handle could be acquired in time
    EngineUnavailable,
    /// The engine failed or timed out on this input
    RecognitionError,
    /// Recognition succeeded but produced no text
    NoTextFound,
    /// Text was produced but none of the field rules matched
    NoFieldsIdentified,
}

impl ScanOutcome {
    /// HTTP status the routing layer maps this outcome to
    pub fn status_code(&self) -> u16 {
        match self {
            ScanOutcome::Success(_) => 200,
            ScanOutcome::ValidationError => 400,
            ScanOutcome::EngineUnavailable => 503,
            ScanOutcome::RecognitionError
            | ScanOutcome::NoTextFound
            | ScanOutcome::NoFieldsIdentified => 422,
        }
    }

    /// Guidance message for non-success outcomes
    pub fn client_message(&self) -> Option<&'static str> {
        match self {
            ScanOutcome::Success(_) => None,
            ScanOutcome::ValidationError => Some("Invalid image data provided"),
            ScanOutcome::EngineUnavailable => {
                Some("OCR service unavailable. Please try again later.")
            }
            ScanOutcome::RecognitionError => {
                Some("Error processing image. Please try again with a clearer image.")
            }
            ScanOutcome::NoTextFound => Some("Could not extract text from image"),
            ScanOutcome::NoFieldsIdentified => Some(
                "Could not identify ID card format. Please ensure the image is clear and well-lit.",
            ),
        }
    }
}

/// Wire shape of a successful scan: extracted fields plus the verification
/// flag, false for a fresh scan until the caller confirms the record.
#[derive(Debug, Clone, Serialize)]
pub struct ScanResponse {
    pub name: String,
    pub branch: String,
    #[serde(rename = "studentId")]
    pub student_id: String,
    pub verified: bool,
}

impl From<ExtractedFields> for ScanResponse {
    fn from(fields: ExtractedFields) -> Self {
        Self {
            name: fields.name,
            branch: fields.branch,
            student_id: fields.student_id,
            verified: false,
        }
    }
}

/// Per-request timeouts for the orchestrator
#[derive(Debug, Clone)]
pub struct ScanSettings {
    /// How long a request may wait for a free engine handle
    pub acquire_timeout: Duration,
    /// Hard bound on one recognition call
    pub recognition_timeout: Duration,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            acquire_timeout: Duration::from_secs(5),
            recognition_timeout: Duration::from_secs(30),
        }
    }
}

/// Scan orchestrator: validate, acquire, recognize, extract, classify.
#[derive(Clone)]
pub struct Scanner {
    pool: EnginePool,
    settings: ScanSettings,
}

impl Scanner {
    pub fn new(pool: EnginePool, settings: ScanSettings) -> Self {
        Self { pool, settings }
    }

    /// Run one scan request end to end.
    ///
    /// The engine lease is released exactly once on every path out of this
    /// function, including engine errors and recognition timeouts.
    pub async fn scan(&self, image: &str) -> ScanOutcome {
        if !validate::is_valid_image_data(image) {
            debug!("Payload rejected by validator ({} bytes)", image.len());
            return ScanOutcome::ValidationError;
        }

        let mut lease = match self.pool.acquire(self.settings.acquire_timeout).await {
            Ok(lease) => lease,
            Err(e) => {
                warn!("Engine acquisition failed: {}", e);
                return ScanOutcome::EngineUnavailable;
            }
        };

        debug!("Scan leased engine handle {:?}", lease.engine_id());

        let bytes = match decode_payload(image) {
            Some(bytes) => bytes,
            None => {
                debug!("Payload passed the predicate but did not decode");
                return ScanOutcome::ValidationError;
            }
        };

        let recognized = tokio::time::timeout(
            self.settings.recognition_timeout,
            lease.recognize(bytes),
        )
        .await;

        let recognition = match recognized {
            Err(_) => {
                warn!(
                    "Recognition exceeded {:?}; orphaned handle will be replaced",
                    self.settings.recognition_timeout
                );
                return ScanOutcome::RecognitionError;
            }
            Ok(Err(e)) => {
                warn!("Recognition failed: {}", e);
                return ScanOutcome::RecognitionError;
            }
            Ok(Ok(recognition)) => recognition,
        };
        // Extraction needs no engine; free the handle before parsing.
        drop(lease);

        if recognition.text.is_empty() {
            debug!("Recognition produced no text");
            return ScanOutcome::NoTextFound;
        }

        let fields = extract::extract(&recognition.text);
        if fields.is_empty() {
            debug!(
                "No fields identified in {} bytes of recognized text",
                recognition.text.len()
            );
            return ScanOutcome::NoFieldsIdentified;
        }

        info!(
            "Scan succeeded (student_id: {:?}, confidence: {:?})",
            fields.student_id, recognition.confidence
        );
        ScanOutcome::Success(fields)
    }

    /// Readiness of the underlying engine pool
    pub fn is_ready(&self) -> bool {
        self.pool.is_ready()
    }
}

/// Strip any data-URI prefix and decode the payload to raw bytes.
///
/// Returns None when the remainder is not decodable base64 or decodes to an
/// empty byte sequence; the recognizer never sees such a payload.
fn decode_payload(image: &str) -> Option<Vec<u8>> {
    let stripped = DATA_URI_STRIP.replace(image, "");
    let bytes = BASE64.decode(stripped.as_bytes()).ok()?;
    if bytes.is_empty() {
        return None;
    }
    Some(bytes)
}
