//! Reconciler configuration.

use std::env;
use std::time::Duration;

/// Default quiet period before a burst of increments is pushed.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1500);

/// Reconciler settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Quiet period after the last increment before the snapshot is pushed
    pub debounce: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

impl ReconcilerConfig {
    /// Load overrides from the environment.
    ///
    /// - `TALLY_DEBOUNCE_MS` - debounce interval in milliseconds (default: `1500`)
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(raw) = env::var("TALLY_DEBOUNCE_MS") {
            let millis: u64 = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue("TALLY_DEBOUNCE_MS", raw))?;
            config.debounce = Duration::from_millis(millis);
        }

        Ok(config)
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("invalid value for {0}: {1:?}")]
    InvalidValue(&'static str, String),
}
