//! Document model: identity, language configuration, confidence thresholds.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ordered set of language models combined into one recognition pass.
///
/// Rendered in the engine's `+`-joined form, e.g. `tam_new+eng` for a
/// primary Tamil model with a Latin-script fallback. Order matters: the
/// first model drives script detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LanguageConfig(Vec<String>);

impl LanguageConfig {
    /// Build from an ordered list of model identifiers. Empty entries are
    /// dropped; an empty list falls back to the default.
    pub fn new(models: Vec<String>) -> Self {
        let models: Vec<String> = models
            .into_iter()
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .collect();
        if models.is_empty() {
            Self::default()
        } else {
            Self(models)
        }
    }

    /// Single-model configuration.
    pub fn single(model: &str) -> Self {
        Self::new(vec![model.to_string()])
    }

    pub fn models(&self) -> &[String] {
        &self.0
    }

    /// `+`-joined rendering as passed to the engine.
    pub fn joined(&self) -> String {
        if self.0.is_empty() {
            "eng".to_string()
        } else {
            self.0.join("+")
        }
    }
}

impl Default for LanguageConfig {
    fn default() -> Self {
        Self(vec!["eng".to_string()])
    }
}

impl fmt::Display for LanguageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.joined())
    }
}

impl FromStr for LanguageConfig {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let models: Vec<String> = s
            .split('+')
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .collect();
        if models.is_empty() {
            return Err(format!("no language models in {s:?}"));
        }
        Ok(Self(models))
    }
}

/// An open document and its recognition settings.
///
/// Created when a file is opened, replaced wholesale when the next one is.
/// The confidence threshold is document-scoped with optional per-page
/// overrides; both only affect the view projection, never stored results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    /// Path the document was opened from.
    pub source: PathBuf,
    pub languages: LanguageConfig,
    threshold: u8,
    page_thresholds: HashMap<usize, u8>,
}

impl Document {
    pub fn new(source: &Path, languages: LanguageConfig, threshold: u8) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: source.to_path_buf(),
            languages,
            threshold: threshold.min(100),
            page_thresholds: HashMap::new(),
        }
    }

    /// Document-wide confidence threshold, 0-100.
    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    pub fn set_threshold(&mut self, threshold: u8) {
        self.threshold = threshold.min(100);
    }

    /// Effective threshold for a page: its override, or the document default.
    pub fn threshold_for(&self, page: usize) -> u8 {
        self.page_thresholds
            .get(&page)
            .copied()
            .unwrap_or(self.threshold)
    }

    /// Set or clear a per-page threshold override.
    pub fn set_page_threshold(&mut self, page: usize, threshold: Option<u8>) {
        match threshold {
            Some(t) => {
                self.page_thresholds.insert(page, t.min(100));
            }
            None => {
                self.page_thresholds.remove(&page);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_config_joined() {
        let langs = LanguageConfig::new(vec!["tam_new".to_string(), "eng".to_string()]);
        assert_eq!(langs.joined(), "tam_new+eng");
    }

    #[test]
    fn test_language_config_parse() {
        let langs: LanguageConfig = "tam_new+eng".parse().unwrap();
        assert_eq!(langs.models(), ["tam_new", "eng"]);
        assert!("  +  ".parse::<LanguageConfig>().is_err());
    }

    #[test]
    fn test_empty_language_config_falls_back() {
        let langs = LanguageConfig::new(vec![]);
        assert_eq!(langs.joined(), "eng");
    }

    #[test]
    fn test_page_threshold_override() {
        let mut doc = Document::new(Path::new("/tmp/a.pdf"), LanguageConfig::default(), 40);
        assert_eq!(doc.threshold_for(2), 40);
        doc.set_page_threshold(2, Some(70));
        assert_eq!(doc.threshold_for(2), 70);
        assert_eq!(doc.threshold_for(1), 40);
        doc.set_page_threshold(2, None);
        assert_eq!(doc.threshold_for(2), 40);
    }

    #[test]
    fn test_threshold_clamped() {
        let mut doc = Document::new(Path::new("/tmp/a.pdf"), LanguageConfig::default(), 200);
        assert_eq!(doc.threshold(), 100);
        doc.set_page_threshold(0, Some(250));
        assert_eq!(doc.threshold_for(0), 100);
    }
}
