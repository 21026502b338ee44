//! Reconciliation job configuration.
//!
//! Controls the periodic pass that expires due intentions, notifies their
//! owners and erases them once their plan's retention window has elapsed.
//!
//! # Example
//!
//! ```toml
//! [reconciliation]
//! enabled = true
//! interval_secs = 3600
//! batch_size = 200
//! concurrency = 5
//!
//! [reconciliation.retention]
//! premium_days = 60
//! standard_days = 30
//! ```

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::models::{Plan, RetentionCutoffs};

/// Reconciliation job configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct ReconciliationConfig {
    /// Whether the long-lived worker runs at all.
    /// Default: true
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between passes of the long-lived worker.
    /// Default: 3600 (hourly)
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Maximum records handled per pass. Due records fill the batch first,
    /// expired records still awaiting notification or erasure take what is
    /// left. Older records go first; the rest are picked up by later passes.
    /// Default: 200
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Records processed concurrently within a pass.
    /// Default: 5
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// If true, log blob and row deletions without performing them.
    /// Status transitions and notifications still happen.
    /// Default: false
    #[serde(default)]
    pub dry_run: bool,

    /// Per-plan retention thresholds.
    #[serde(default)]
    pub retention: RetentionThresholds,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_interval_secs(),
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            dry_run: false,
            retention: RetentionThresholds::default(),
        }
    }
}

impl ReconciliationConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Validation(
                "reconciliation.batch_size must be at least 1".into(),
            ));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::Validation(
                "reconciliation.concurrency must be at least 1".into(),
            ));
        }
        if self.interval_secs == 0 {
            return Err(ConfigError::Validation(
                "reconciliation.interval_secs must be at least 1".into(),
            ));
        }
        self.retention.validate()
    }
}

/// Days past expiration after which an intention is erased.
///
/// A record is erased only when strictly more than this many whole days
/// have elapsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct RetentionThresholds {
    /// Default: 60
    #[serde(default = "default_premium_days")]
    pub premium_days: u32,

    /// Applies to every non-premium plan.
    /// Default: 30
    #[serde(default = "default_standard_days")]
    pub standard_days: u32,
}

impl Default for RetentionThresholds {
    fn default() -> Self {
        Self {
            premium_days: default_premium_days(),
            standard_days: default_standard_days(),
        }
    }
}

impl RetentionThresholds {
    pub fn days_for(&self, plan: Plan) -> u32 {
        match plan {
            Plan::Premium => self.premium_days,
            Plan::Standard => self.standard_days,
        }
    }

    /// Whether a record of `plan`, expired `days_since_expiration` days ago,
    /// is past its retention window.
    pub fn is_eligible(&self, plan: Plan, days_since_expiration: i64) -> bool {
        days_since_expiration > i64::from(self.days_for(plan))
    }

    /// Latest expiration instants that are eligible as of `now`.
    ///
    /// A cutoff before the earliest representable instant saturates to it.
    pub fn cutoffs(&self, now: DateTime<Utc>) -> RetentionCutoffs {
        let cutoff = |days: u32| {
            TimeDelta::try_days(i64::from(days) + 1)
                .and_then(|window| now.checked_sub_signed(window))
                .unwrap_or(DateTime::<Utc>::MIN_UTC)
        };
        RetentionCutoffs {
            premium_before: cutoff(self.premium_days),
            standard_before: cutoff(self.standard_days),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (name, days) in [
            ("premium_days", self.premium_days),
            ("standard_days", self.standard_days),
        ] {
            if days > MAX_RETENTION_DAYS {
                return Err(ConfigError::Validation(format!(
                    "reconciliation.retention.{name} must be at most {MAX_RETENTION_DAYS} (got {days})"
                )));
            }
        }
        Ok(())
    }
}

/// Upper bound for a retention threshold, roughly one hundred years.
pub const MAX_RETENTION_DAYS: u32 = 36_500;

fn default_true() -> bool {
    true
}

fn default_interval_secs() -> u64 {
    3600
}

fn default_batch_size() -> u32 {
    200
}

fn default_concurrency() -> usize {
    5
}

fn default_premium_days() -> u32 {
    60
}

fn default_standard_days() -> u32 {
    30
}
