//! Named rate-limit configuration applied to a connector's queue.
//!
//! A [`ThrottleProfile`] is read-only at dispatch time; the dispatcher
//! resolves a connector's profile once when its worker starts and snapshots
//! it. Profile changes take effect only via configuration update.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Name of the built-in fallback profile.
pub const DEFAULT_PROFILE_NAME: &str = "default";

/// Named rate-limit configuration for a connector's request queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleProfile {
    /// Profile name; connectors reference profiles by name.
    pub name: String,
    /// Sustained request rate; admissions are spaced at `60 / rpm` seconds.
    pub requests_per_minute: u32,
    /// Hard cap on admissions per UTC day; `None` means unlimited.
    pub daily_budget: Option<u32>,
    /// Admissions allowed per window before cooling down.
    pub batch_size: u32,
    /// Cooldown between admission windows, in seconds.
    pub batch_cooldown_secs: u64,
    /// Cooldown forced by an observed rate-limit error, in seconds.
    pub rate_limit_pause_secs: u64,
}

impl Default for ThrottleProfile {
    fn default() -> Self {
        Self {
            name: DEFAULT_PROFILE_NAME.to_string(),
            requests_per_minute: 60,
            daily_budget: None,
            batch_size: 10,
            batch_cooldown_secs: 5,
            rate_limit_pause_secs: 60,
        }
    }
}

impl ThrottleProfile {
    /// Returns the cooldown applied after a full admission window.
    #[must_use]
    pub fn batch_cooldown(&self) -> Duration {
        Duration::from_secs(self.batch_cooldown_secs)
    }

    /// Returns the cooldown forced by an observed rate-limit error.
    #[must_use]
    pub fn rate_limit_pause(&self) -> Duration {
        Duration::from_secs(self.rate_limit_pause_secs)
    }

    /// Returns the minimum spacing between admissions implied by
    /// `requests_per_minute`. A zero rate degrades to one request per minute
    /// rather than dividing by zero.
    #[must_use]
    pub fn min_spacing(&self) -> Duration {
        Duration::from_secs_f64(60.0 / f64::from(self.requests_per_minute.max(1)))
    }
}
