//! Tesseract OCR backend
//!
//! Uses leptess (Tesseract + Leptonica bindings). Constructing an instance
//! loads the language model, which is the expensive step the pool amortizes
//! across requests.

use leptess::LepTess;
use tracing::{debug, info};

use super::{EngineError, EngineSettings, OcrEngine, Recognition};

/// Tesseract engine instance
pub struct TesseractEngine {
    tess: LepTess,
}

impl TesseractEngine {
    /// Load the language model and prime a Tesseract instance
    pub fn new(settings: &EngineSettings) -> Result<Self, EngineError> {
        info!(
            "Initializing Tesseract engine (language: {})",
            settings.language
        );

        let tess = LepTess::new(settings.datapath.as_deref(), &settings.language)
            .map_err(|e| EngineError::Init(format!("tesseract init: {e}")))?;

        Ok(Self { tess })
    }
}

impl OcrEngine for TesseractEngine {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    fn recognize(&mut self, image: &[u8]) -> Result<Recognition, EngineError> {
        self.tess
            .set_image_from_mem(image)
            .map_err(|e| EngineError::Recognition(format!("unreadable image: {e}")))?;

        let text = self
            .tess
            .get_utf8_text()
            .map_err(|e| EngineError::EngineLost(format!("tesseract output: {e}")))?;

        let confidence = self.tess.mean_text_conf();
        debug!(
            "Tesseract recognized {} bytes of text (mean confidence {})",
            text.len(),
            confidence
        );

        Ok(Recognition {
            text,
            confidence: Some(confidence as f32 / 100.0),
        })
    }
}
