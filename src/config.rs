//! Pipeline configuration.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::models::LanguageConfig;
use crate::pipeline::PoolOptions;

/// Default confidence threshold (percent).
pub const DEFAULT_CONFIDENCE_THRESHOLD: u8 = 40;

/// Default rasterization resolution for PDF pages.
pub const DEFAULT_DPI: u32 = 300;

/// Upper bound on recognition workers regardless of core count; each engine
/// call is itself CPU-heavy.
pub const MAX_WORKERS: usize = 4;

/// Default budget for a single engine call, in seconds.
pub const DEFAULT_JOB_TIMEOUT_SECS: u64 = 120;

/// Knobs for the recognition pipeline, loadable from a TOML file and
/// overridable from the command line.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Concurrent recognition workers.
    pub workers: usize,
    /// Queued jobs beyond which submission blocks.
    pub queue_bound: usize,
    /// Per-job timeout in seconds; a timed-out page is a failed page.
    pub job_timeout_secs: u64,
    /// PDF rasterization resolution.
    pub dpi: u32,
    /// Language models combined into one recognition pass.
    pub languages: LanguageConfig,
    /// Document-wide confidence threshold, 0-100.
    pub confidence_threshold: u8,
    /// Bounded retry for failed engine calls, clamped to at most one.
    /// Timed-out calls are never retried.
    pub max_retries: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let workers = default_workers();
        Self {
            workers,
            queue_bound: workers * 4,
            job_timeout_secs: DEFAULT_JOB_TIMEOUT_SECS,
            dpi: DEFAULT_DPI,
            languages: LanguageConfig::default(),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            max_retries: 0,
        }
    }
}

/// Available cores, capped so the pool never oversubscribes the engine.
fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2)
        .clamp(1, MAX_WORKERS)
}

impl PipelineConfig {
    /// Load from a TOML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw)?;
        Ok(config)
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self.queue_bound = self.queue_bound.max(self.workers);
        self
    }

    pub fn with_languages(mut self, languages: LanguageConfig) -> Self {
        self.languages = languages;
        self
    }

    pub fn with_threshold(mut self, threshold: u8) -> Self {
        self.confidence_threshold = threshold.min(100);
        self
    }

    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = dpi;
        self
    }

    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries.min(1);
        self
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub(crate) fn pool_options(&self) -> PoolOptions {
        PoolOptions {
            workers: self.workers.max(1),
            queue_bound: self.queue_bound.max(1),
            job_timeout: self.job_timeout(),
            max_retries: self.max_retries.min(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert!(config.workers >= 1 && config.workers <= MAX_WORKERS);
        assert_eq!(config.queue_bound, config.workers * 4);
        assert_eq!(config.confidence_threshold, DEFAULT_CONFIDENCE_THRESHOLD);
        assert_eq!(config.dpi, DEFAULT_DPI);
        assert_eq!(config.languages.joined(), "eng");
        assert_eq!(config.max_retries, 0);
    }

    #[test]
    fn test_parse_toml() {
        let config: PipelineConfig = toml::from_str(
            r#"
            workers = 2
            languages = ["tam_new", "eng"]
            confidence_threshold = 55
            "#,
        )
        .unwrap();
        assert_eq!(config.workers, 2);
        assert_eq!(config.languages.joined(), "tam_new+eng");
        assert_eq!(config.confidence_threshold, 55);
        // Unset fields keep their defaults.
        assert_eq!(config.dpi, DEFAULT_DPI);
    }

    #[test]
    fn test_unknown_fields_rejected() {
        assert!(toml::from_str::<PipelineConfig>("cores = 8").is_err());
    }

    #[test]
    fn test_retries_clamped() {
        let config = PipelineConfig::default().with_max_retries(5);
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.pool_options().max_retries, 1);
    }
}
