//! Runtime tuning knobs, deserialized from the host application's config.
//!
//! Every field has a default so a missing or partial section degrades to the
//! built-in behavior. Settings structs are plain data; they convert into the
//! richer runtime configs ([`RetryConfig`], [`ReconnectConfig`]) at startup.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::client::RetryConfig;
use crate::reconnect::ReconnectConfig;
use crate::throttle::ThrottleProfile;

/// Top-level configuration for the resilience core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Per-request retry tuning.
    pub retry: RetrySettings,
    /// Reconnect probe schedule tuning.
    pub reconnect: ReconnectSettings,
    /// Named throttle profiles available to connectors.
    pub throttle_profiles: Vec<ThrottleProfile>,
}

/// Retry tuning as it appears in config files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Maximum attempts per request, including the first.
    pub max_attempts: u32,
    /// Base backoff delay in milliseconds.
    pub base_delay_ms: u64,
    /// Backoff delay cap in milliseconds.
    pub max_delay_ms: u64,
    /// Backoff multiplier.
    pub multiplier: f64,
    /// Jitter fraction in `0..=1`.
    pub jitter_fraction: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let config = RetryConfig::default();
        Self {
            max_attempts: config.max_attempts,
            base_delay_ms: config.base_delay.as_millis() as u64,
            max_delay_ms: config.max_delay.as_millis() as u64,
            multiplier: config.multiplier,
            jitter_fraction: config.jitter_fraction,
        }
    }
}

impl RetrySettings {
    /// Converts into the runtime retry config, keeping the default retryable
    /// error set.
    #[must_use]
    pub fn to_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            multiplier: self.multiplier,
            jitter_fraction: self.jitter_fraction,
            ..RetryConfig::default()
        }
    }
}

/// Reconnect schedule tuning as it appears in config files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectSettings {
    /// Delay before the first probe, in seconds.
    pub base_delay_secs: u64,
    /// Probe delay cap, in seconds.
    pub max_delay_secs: u64,
    /// Backoff multiplier.
    pub multiplier: f64,
    /// Jitter fraction in `0..=1`.
    pub jitter_fraction: f64,
    /// Probe attempt bound; 0 = unbounded.
    pub max_attempts: u32,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        let config = ReconnectConfig::default();
        Self {
            base_delay_secs: config.base_delay.as_secs(),
            max_delay_secs: config.max_delay.as_secs(),
            multiplier: config.multiplier,
            jitter_fraction: config.jitter_fraction,
            max_attempts: config.max_attempts,
        }
    }
}

impl ReconnectSettings {
    /// Converts into the runtime reconnect config.
    #[must_use]
    pub fn to_config(&self) -> ReconnectConfig {
        ReconnectConfig {
            base_delay: Duration::from_secs(self.base_delay_secs),
            max_delay: Duration::from_secs(self.max_delay_secs),
            multiplier: self.multiplier,
            jitter_fraction: self.jitter_fraction,
            max_attempts: self.max_attempts,
        }
    }
}
