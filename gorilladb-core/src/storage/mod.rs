//! Storage layer - time-windowed series and the series registry

mod manifest;
mod series;
mod store;

pub use manifest::{BlockMeta, SeriesManifest};
pub use series::{CompressionStats, Series, SeriesSnapshot};
pub use store::{Store, StoreStats};

use crate::compression::WindowStrategy;
use crate::{GorillaError, Result};

/// Series configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesConfig {
    /// Time span covered by one block, in timestamp units
    pub block_duration: i64,
    /// Window reuse heuristic of the value encoders
    pub window_strategy: WindowStrategy,
}

impl SeriesConfig {
    /// Set the block duration
    pub fn with_block_duration(mut self, block_duration: i64) -> Self {
        self.block_duration = block_duration;
        self
    }

    /// Set the window strategy
    pub fn with_window_strategy(mut self, window_strategy: WindowStrategy) -> Self {
        self.window_strategy = window_strategy;
        self
    }

    /// Reject unusable settings
    pub fn validate(&self) -> Result<()> {
        if self.block_duration <= 0 {
            return Err(GorillaError::Config(format!(
                "block duration must be positive, got {}",
                self.block_duration
            )));
        }
        Ok(())
    }
}

impl Default for SeriesConfig {
    fn default() -> Self {
        Self {
            block_duration: crate::config::DEFAULT_BLOCK_DURATION_MS,
            window_strategy: WindowStrategy::Standard,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_and_validation() {
        let config = SeriesConfig::default();
        assert_eq!(config.block_duration, 7_200_000);
        assert_eq!(config.window_strategy, WindowStrategy::Standard);
        assert!(config.validate().is_ok());

        let bad = config.with_block_duration(0);
        assert!(matches!(bad.validate(), Err(GorillaError::Config(_))));

        let verified = config.with_window_strategy(WindowStrategy::Verification);
        assert_eq!(verified.window_strategy, WindowStrategy::Verification);
    }
}
