//! OCR Engine Layer
//!
//! Wraps the recognizer behind a backend-agnostic trait and manages instance
//! lifecycle through a bounded pool. Supported backends:
//! - Tesseract via leptess (feature `backend-tesseract`)
//! - Mock engine, always available, used for development and tests

pub mod mock;
pub mod pool;
#[cfg(feature = "backend-tesseract")]
pub mod tesseract;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use mock::MockEngine;
pub use pool::{AcquireError, EngineFactory, EngineLease, EnginePool, PoolSettings};

/// Errors raised by an OCR engine instance
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine could not be constructed or primed
    #[error("engine initialization failed: {0}")]
    Init(String),

    /// Recognition failed on this input; the instance itself is still usable
    #[error("recognition failed: {0}")]
    Recognition(String),

    /// The instance is no longer usable and must be discarded
    #[error("engine lost: {0}")]
    EngineLost(String),
}

impl EngineError {
    /// Whether the instance that raised this error must be replaced
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::EngineLost(_))
    }
}

/// Text produced by one recognition call
#[derive(Debug, Clone)]
pub struct Recognition {
    /// Recognized text, as reported by the engine
    pub text: String,
    /// Engine-reported mean confidence (0.0 - 1.0), when available
    pub confidence: Option<f32>,
}

/// Common interface for all OCR engines.
///
/// `recognize` takes `&mut self`: engines are not assumed reentrant, and the
/// pool guarantees exclusive access while a handle is leased out.
pub trait OcrEngine: Send {
    fn name(&self) -> &'static str;

    fn recognize(&mut self, image: &[u8]) -> Result<Recognition, EngineError>;
}

/// OCR backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrBackend {
    /// Mock engine (decodes the image, returns scripted text)
    #[default]
    Mock,
    /// Tesseract OCR via leptess
    Tesseract,
}

/// Engine construction settings shared by all backends
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Recognition language (e.g. "eng")
    pub language: String,
    /// Optional override for the language model directory
    pub datapath: Option<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            datapath: None,
        }
    }
}

/// Construct a recognizer instance for the selected backend.
///
/// Initialization is the expensive step (a language model is loaded), which
/// is why instances are built once at pool startup rather than per request.
pub fn create_engine(
    backend: OcrBackend,
    settings: &EngineSettings,
) -> Result<Box<dyn OcrEngine>, EngineError> {
    match backend {
        OcrBackend::Mock => Ok(Box::new(MockEngine::new())),
        #[cfg(feature = "backend-tesseract")]
        OcrBackend::Tesseract => Ok(Box::new(tesseract::TesseractEngine::new(settings)?)),
        #[cfg(not(feature = "backend-tesseract"))]
        OcrBackend::Tesseract => Err(EngineError::Init(format!(
            "tesseract backend not compiled in (language {})",
            settings.language
        ))),
    }
}
