//! Scripted recognition engine for pipeline tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use crate::engine::{EngineError, RecognitionEngine};
use crate::models::{BoundingBox, LanguageConfig, RecognitionResult, WordBox};

/// Build a one-word result.
pub(crate) fn word_result(text: &str, confidence: f32) -> RecognitionResult {
    RecognitionResult::from_words(vec![WordBox {
        text: text.to_string(),
        confidence,
        bounds: BoundingBox {
            x: 1,
            y: 2,
            width: 30,
            height: 12,
        },
        block: 1,
        paragraph: 1,
        line: 1,
    }])
}

struct PageScript {
    delay: Duration,
    /// Fail the first `fail_times` calls with this reason; `usize::MAX`
    /// means always.
    fail: Option<(String, usize)>,
    result: RecognitionResult,
    calls: AtomicUsize,
}

/// Recognition engine driven by per-page scripts, keyed by the image file
/// stem. Pages without a script succeed with the default result after the
/// default delay.
pub(crate) struct ScriptedEngine {
    scripts: HashMap<String, PageScript>,
    default_result: RecognitionResult,
    default_delay: Duration,
}

impl ScriptedEngine {
    pub(crate) fn new() -> Self {
        Self {
            scripts: HashMap::new(),
            default_result: word_result("stub", 90.0),
            default_delay: Duration::ZERO,
        }
    }

    pub(crate) fn with_default(mut self, result: RecognitionResult) -> Self {
        self.default_result = result;
        self
    }

    pub(crate) fn with_default_delay(mut self, millis: u64) -> Self {
        self.default_delay = Duration::from_millis(millis);
        self
    }

    /// Script a page to succeed after a delay.
    pub(crate) fn page(mut self, stem: &str, delay_ms: u64, result: RecognitionResult) -> Self {
        self.scripts.insert(
            stem.to_string(),
            PageScript {
                delay: Duration::from_millis(delay_ms),
                fail: None,
                result,
                calls: AtomicUsize::new(0),
            },
        );
        self
    }

    /// Script a page to always fail.
    pub(crate) fn failing_page(mut self, stem: &str, delay_ms: u64, reason: &str) -> Self {
        self.scripts.insert(
            stem.to_string(),
            PageScript {
                delay: Duration::from_millis(delay_ms),
                fail: Some((reason.to_string(), usize::MAX)),
                result: RecognitionResult::default(),
                calls: AtomicUsize::new(0),
            },
        );
        self
    }

    /// Script a page to fail `times` calls, then succeed.
    pub(crate) fn flaky_page(
        mut self,
        stem: &str,
        times: usize,
        result: RecognitionResult,
    ) -> Self {
        self.scripts.insert(
            stem.to_string(),
            PageScript {
                delay: Duration::ZERO,
                fail: Some(("flaky engine".to_string(), times)),
                result,
                calls: AtomicUsize::new(0),
            },
        );
        self
    }
}

impl RecognitionEngine for ScriptedEngine {
    fn recognize(
        &self,
        image: &Path,
        _languages: &LanguageConfig,
    ) -> Result<RecognitionResult, EngineError> {
        let stem = image
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        let Some(script) = self.scripts.get(stem) else {
            if !self.default_delay.is_zero() {
                thread::sleep(self.default_delay);
            }
            return Ok(self.default_result.clone());
        };

        if !script.delay.is_zero() {
            thread::sleep(script.delay);
        }
        let call = script.calls.fetch_add(1, Ordering::SeqCst);
        if let Some((reason, times)) = &script.fail {
            if call < *times {
                return Err(EngineError::Recognition(reason.clone()));
            }
        }
        Ok(script.result.clone())
    }

    fn is_available(&self) -> bool {
        true
    }

    fn availability_hint(&self) -> String {
        "scripted engine is always available".to_string()
    }
}
