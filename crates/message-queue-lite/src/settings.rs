//! Queue settings and configuration loading.

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix used by [`QueueSettings::load`].
///
/// Keys use a double-underscore separator, e.g. `MQL__MAX_RETRY_COUNT=5`.
pub const ENV_PREFIX: &str = "MQL";

const DEFAULT_LEASE_DURATION_SECONDS: u64 = 1800;
const DEFAULT_LEASE_MONITORING_INTERVAL_SECONDS: u64 = 60;
const DEFAULT_MAX_RETRY_COUNT: u32 = 3;

/// Upper bound for the lease duration and the monitoring interval (one year).
///
/// Timer deadlines are computed by adding these to the current instant,
/// which must not overflow.
pub const MAX_DURATION_SECONDS: u64 = 365 * 24 * 60 * 60;

/// Settings for a single queue, immutable once the queue is constructed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSettings {
    /// Base lease granted to a consumer before an unacknowledged message is
    /// redelivered. Scaled by the retry count on later deliveries.
    #[serde(default = "default_lease_duration_seconds")]
    pub lease_duration_seconds: u64,

    /// How often the lease monitor scans in-flight messages
    #[serde(default = "default_lease_monitoring_interval_seconds")]
    pub lease_monitoring_interval_seconds: u64,

    /// Number of lease expiries tolerated before a message is discarded
    #[serde(default = "default_max_retry_count")]
    pub max_retry_count: u32,
}

fn default_lease_duration_seconds() -> u64 {
    DEFAULT_LEASE_DURATION_SECONDS
}

fn default_lease_monitoring_interval_seconds() -> u64 {
    DEFAULT_LEASE_MONITORING_INTERVAL_SECONDS
}

fn default_max_retry_count() -> u32 {
    DEFAULT_MAX_RETRY_COUNT
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            lease_duration_seconds: DEFAULT_LEASE_DURATION_SECONDS,
            lease_monitoring_interval_seconds: DEFAULT_LEASE_MONITORING_INTERVAL_SECONDS,
            max_retry_count: DEFAULT_MAX_RETRY_COUNT,
        }
    }
}

impl QueueSettings {
    /// Base lease as a `Duration`
    pub fn lease_duration(&self) -> Duration {
        Duration::from_secs(self.lease_duration_seconds)
    }

    /// Lease monitor period as a `Duration`
    pub fn lease_monitoring_interval(&self) -> Duration {
        Duration::from_secs(self.lease_monitoring_interval_seconds)
    }

    /// Lease allowed for a delivery of a message that has already been
    /// retried `retry_count` times.
    ///
    /// The first two deliveries both get the base lease; after that the lease
    /// grows linearly with the retry count.
    pub fn allowed_lease(&self, retry_count: u32) -> Duration {
        self.lease_duration()
            .checked_mul(retry_count.max(1))
            .unwrap_or(Duration::MAX)
    }

    /// Check the settings can drive a queue
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.lease_duration_seconds == 0 {
            return Err(ConfigurationError::Invalid {
                message: "lease_duration_seconds must be greater than zero".to_string(),
            });
        }

        if self.lease_monitoring_interval_seconds == 0 {
            return Err(ConfigurationError::Invalid {
                message: "lease_monitoring_interval_seconds must be greater than zero"
                    .to_string(),
            });
        }

        if self.lease_duration_seconds > MAX_DURATION_SECONDS {
            return Err(ConfigurationError::Invalid {
                message: format!(
                    "lease_duration_seconds must not exceed {}",
                    MAX_DURATION_SECONDS
                ),
            });
        }

        if self.lease_monitoring_interval_seconds > MAX_DURATION_SECONDS {
            return Err(ConfigurationError::Invalid {
                message: format!(
                    "lease_monitoring_interval_seconds must not exceed {}",
                    MAX_DURATION_SECONDS
                ),
            });
        }

        Ok(())
    }

    /// Load settings from built-in defaults, an optional file and the
    /// environment, in that order of precedence (later sources win).
    ///
    /// The file format is taken from the extension (`.yaml`, `.toml`,
    /// `.json`). Environment variables use the [`ENV_PREFIX`] prefix.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigurationError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigurationError::Invalid {
                    message: format!("configuration file not found: {}", path.display()),
                });
            }
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings: QueueSettings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }
}

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;
