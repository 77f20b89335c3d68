//! Cache configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_expiration_secs() -> f64 {
    30.0
}

fn default_retry_secs() -> f64 {
    0.0
}

/// Per-cache tuning, shared by every resource of a [`ResourceService`].
///
/// Durations are stored as fractional seconds so the struct reads naturally
/// from config files:
///
/// ```toml
/// expiration_secs_f64 = 10.0
/// retry_secs_f64 = 1.5
/// ```
///
/// [`ResourceService`]: crate::lifecycle::ResourceService
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Age after which `load_if_needed` reloads the entity.
    ///
    /// Default: 30 seconds
    #[serde(default = "default_expiration_secs")]
    pub expiration_secs_f64: f64,

    /// After a failure newer than the entity, `load_if_needed` waits this
    /// long before trying again. Zero disables the back-off.
    ///
    /// Default: 0
    #[serde(default = "default_retry_secs")]
    pub retry_secs_f64: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            expiration_secs_f64: default_expiration_secs(),
            retry_secs_f64: default_retry_secs(),
        }
    }
}

impl CacheConfig {
    pub fn expiration(&self) -> Duration {
        secs_to_duration(self.expiration_secs_f64)
    }

    pub fn retry_time(&self) -> Duration {
        secs_to_duration(self.retry_secs_f64)
    }

    pub fn with_expiration(mut self, expiration: Duration) -> Self {
        self.expiration_secs_f64 = expiration.as_secs_f64();
        self
    }

    pub fn with_retry_time(mut self, retry_time: Duration) -> Self {
        self.retry_secs_f64 = retry_time.as_secs_f64();
        self
    }
}

// Negative, NaN and overflowing values collapse to zero.
fn secs_to_duration(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
}
