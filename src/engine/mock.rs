//! Mock OCR engine
//!
//! Development and test backend. Decodes the submitted bytes so that corrupt
//! image data still surfaces as a recognition error, then returns scripted
//! text. Tests use the builder methods to inject delays, failures, and a
//! concurrency probe.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{EngineError, OcrEngine, Recognition};

/// What the mock does with a recognize call
#[derive(Debug, Clone)]
enum Script {
    /// Decode the image, answer with empty text
    DecodeOnly,
    /// Answer with fixed text, no decoding
    Text(String),
    /// Recoverable recognition failure
    Fail(String),
    /// Unrecoverable engine loss
    Fatal(String),
}

/// Records observed recognition concurrency across engine instances.
///
/// Shared by tests to assert that the pool never runs more recognitions at
/// once than it has handles.
#[derive(Debug, Default)]
pub struct ConcurrencyProbe {
    current: AtomicUsize,
    max: AtomicUsize,
    calls: AtomicUsize,
}

impl ConcurrencyProbe {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    /// Highest number of simultaneous recognitions observed
    pub fn max_concurrency(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }

    /// Total recognition calls observed
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Scriptable mock recognizer
#[derive(Debug)]
pub struct MockEngine {
    script: Script,
    delay: Option<Duration>,
    probe: Option<Arc<ConcurrencyProbe>>,
}

impl MockEngine {
    /// Mock that decodes the image and reports no text
    pub fn new() -> Self {
        Self {
            script: Script::DecodeOnly,
            delay: None,
            probe: None,
        }
    }

    /// Mock that answers every call with the given text
    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            script: Script::Text(text.into()),
            delay: None,
            probe: None,
        }
    }

    /// Mock whose calls fail recoverably
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            script: Script::Fail(message.into()),
            delay: None,
            probe: None,
        }
    }

    /// Mock whose calls report the instance as lost
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            script: Script::Fatal(message.into()),
            delay: None,
            probe: None,
        }
    }

    /// Sleep this long inside every recognize call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Report call concurrency to the given probe
    pub fn with_probe(mut self, probe: Arc<ConcurrencyProbe>) -> Self {
        self.probe = Some(probe);
        self
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl OcrEngine for MockEngine {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn recognize(&mut self, image: &[u8]) -> Result<Recognition, EngineError> {
        if let Some(probe) = &self.probe {
            probe.enter();
        }
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        let result = match &self.script {
            Script::DecodeOnly => image::load_from_memory(image)
                .map(|_| Recognition {
                    text: String::new(),
                    confidence: Some(1.0),
                })
                .map_err(|e| EngineError::Recognition(format!("undecodable image: {e}"))),
            Script::Text(text) => Ok(Recognition {
                text: text.clone(),
                confidence: Some(1.0),
            }),
            Script::Fail(message) => Err(EngineError::Recognition(message.clone())),
            Script::Fatal(message) => Err(EngineError::EngineLost(message.clone())),
        };

        if let Some(probe) = &self.probe {
            probe.exit();
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_text() {
        let mut engine = MockEngine::with_text("ID: AB12");
        let recognition = engine.recognize(b"anything").unwrap();
        assert_eq!(recognition.text, "ID: AB12");
        assert_eq!(recognition.confidence, Some(1.0));
    }

    #[test]
    fn test_decode_only_rejects_garbage() {
        let mut engine = MockEngine::new();
        let err = engine.recognize(b"not an image").unwrap_err();
        assert!(matches!(err, EngineError::Recognition(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_fatal_script() {
        let mut engine = MockEngine::fatal("segfault");
        let err = engine.recognize(b"x").unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_probe_counts_calls() {
        let probe = Arc::new(ConcurrencyProbe::default());
        let mut engine = MockEngine::with_text("x").with_probe(Arc::clone(&probe));
        engine.recognize(b"a").unwrap();
        engine.recognize(b"b").unwrap();
        assert_eq!(probe.calls(), 2);
        assert_eq!(probe.max_concurrency(), 1);
    }
}
