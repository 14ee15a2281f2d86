use std::path::PathBuf;

use thiserror::Error;

use crate::fetch::FetchSettings;
use crate::filename::OutputLayout;
use crate::filter::ReferenceFilter;
use crate::persist::{ensure_output_dir, PersistError};
use crate::rate::RateLimitSpec;

const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 8;

/// Problems detected before a session starts; nothing has touched the network yet.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid rate limit {input:?}: {reason}")]
    InvalidRateLimit { input: String, reason: String },
    #[error(transparent)]
    OutputDir(#[from] PersistError),
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub output: OutputLayout,
    pub rate_limit: Option<RateLimitSpec>,
    pub filters: ReferenceFilter,
    pub max_concurrent_fetches: usize,
    pub fetch: FetchSettings,
}

impl EngineConfig {
    /// Recursive mirroring into `<root>/<host>/<path>`.
    pub fn mirror(root: impl Into<PathBuf>) -> Self {
        Self::with_layout(OutputLayout::Mirror { root: root.into() })
    }

    /// Plain downloads written directly into `dir`.
    pub fn flat(dir: impl Into<PathBuf>) -> Self {
        Self::with_layout(OutputLayout::Flat { dir: dir.into() })
    }

    fn with_layout(output: OutputLayout) -> Self {
        Self {
            output,
            rate_limit: None,
            filters: ReferenceFilter::default(),
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
            fetch: FetchSettings::default(),
        }
    }

    pub fn with_rate_limit(mut self, rate_limit: Option<RateLimitSpec>) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    /// Parse and apply a human rate string such as `"200k"`.
    pub fn with_rate_limit_str(self, raw: Option<&str>) -> Result<Self, ConfigError> {
        let spec = raw
            .filter(|raw| !raw.trim().is_empty())
            .map(RateLimitSpec::parse)
            .transpose()?;
        Ok(self.with_rate_limit(spec))
    }

    pub fn with_filters(mut self, filters: ReferenceFilter) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_max_concurrent_fetches(mut self, max: usize) -> Self {
        self.max_concurrent_fetches = max.max(1);
        self
    }

    pub fn with_fetch_settings(mut self, fetch: FetchSettings) -> Self {
        self.fetch = fetch;
        self
    }

    pub fn is_mirror(&self) -> bool {
        matches!(self.output, OutputLayout::Mirror { .. })
    }

    /// Validate the output directory, creating it when missing.
    pub fn prepare(&self) -> Result<(), ConfigError> {
        ensure_output_dir(self.output.root())?;
        Ok(())
    }
}
