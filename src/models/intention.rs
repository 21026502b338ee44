use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::validators::is_valid_template_id;

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Reasons a due row is rejected before any statement is issued for it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IntentionValidationError {
    #[error("Missing intention_id")]
    MissingId,

    #[error("Missing template_id")]
    MissingTemplateId,

    #[error("Template id {0:?} is not a safe identifier")]
    UnsafeTemplateId(String),

    #[error("Missing expires_in")]
    MissingExpiration,

    #[error("Unparseable expires_in: {0:?}")]
    InvalidExpiration(String),
}

/// A template id that has passed the identifier allow-list.
///
/// The only way to obtain one is [`TemplateId::parse`], so repository code
/// can interpolate [`TemplateId::table_name`] into SQL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TemplateId(String);

impl TemplateId {
    pub fn parse(value: impl Into<String>) -> Result<Self, IntentionValidationError> {
        let value = value.into();
        if value.is_empty() {
            return Err(IntentionValidationError::MissingTemplateId);
        }
        if !is_valid_template_id(&value) {
            return Err(IntentionValidationError::UnsafeTemplateId(value));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the side table holding this template's form data.
    pub fn table_name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Subscription tier. Anything other than `premium` is standard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    Premium,
    #[default]
    Standard,
}

impl Plan {
    pub fn from_raw(raw: Option<&str>) -> Self {
        match raw {
            Some(value) if value.trim().eq_ignore_ascii_case("premium") => Plan::Premium,
            _ => Plan::Standard,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Premium => "premium",
            Plan::Standard => "standard",
        }
    }
}

/// Lifecycle status shared by the intention row and its side row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentionStatus {
    Approved,
    Expired,
}

impl IntentionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentionStatus::Approved => "approved",
            IntentionStatus::Expired => "expired",
        }
    }
}

impl std::str::FromStr for IntentionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approved" => Ok(IntentionStatus::Approved),
            "expired" => Ok(IntentionStatus::Expired),
            _ => Err(format!("Invalid intention status: {}", s)),
        }
    }
}

/// A due row exactly as the store returned it, before validation.
#[derive(Debug, Clone, Default)]
pub struct DueIntentionRow {
    pub intention_id: Option<String>,
    pub email: Option<String>,
    pub plan: Option<String>,
    pub template_id: Option<String>,
    pub expires_in: Option<String>,
    pub expiration_notified_at: Option<String>,
    pub qr_code: Option<String>,
}

/// Expiration instants at or before which an expired intention is past its
/// retention period, per plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionCutoffs {
    pub premium_before: DateTime<Utc>,
    pub standard_before: DateTime<Utc>,
}

/// A validated intention ready to be reconciled.
#[derive(Debug, Clone)]
pub struct Intention {
    pub id: String,
    pub email: String,
    pub plan: Plan,
    pub template_id: TemplateId,
    pub expires_at: DateTime<Utc>,
    /// Raw `expiration_notified_at`; any non-null value means the owner was notified.
    pub expiration_notified_at: Option<String>,
    pub qr_code: Option<String>,
}

impl Intention {
    pub fn is_notified(&self) -> bool {
        self.expiration_notified_at.is_some()
    }

    /// Whole 24-hour periods elapsed since expiration, floored.
    pub fn days_since_expiration(&self, now: DateTime<Utc>) -> i64 {
        now.signed_duration_since(self.expires_at)
            .num_seconds()
            .div_euclid(SECONDS_PER_DAY)
    }
}

impl TryFrom<DueIntentionRow> for Intention {
    type Error = IntentionValidationError;

    fn try_from(row: DueIntentionRow) -> Result<Self, Self::Error> {
        let id = non_empty(row.intention_id).ok_or(IntentionValidationError::MissingId)?;
        let template_id = non_empty(row.template_id)
            .ok_or(IntentionValidationError::MissingTemplateId)
            .and_then(TemplateId::parse)?;
        let raw_expiration =
            non_empty(row.expires_in).ok_or(IntentionValidationError::MissingExpiration)?;
        let expires_at = parse_timestamp(&raw_expiration)
            .ok_or(IntentionValidationError::InvalidExpiration(raw_expiration))?;

        Ok(Intention {
            id,
            email: row.email.unwrap_or_default().trim().to_string(),
            plan: Plan::from_raw(row.plan.as_deref()),
            template_id,
            expires_at,
            expiration_notified_at: non_empty(row.expiration_notified_at),
            qr_code: non_empty(row.qr_code),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Parse a stored timestamp.
///
/// Accepts RFC 3339 (what the approval flow writes), PostgreSQL's text
/// rendering of `timestamptz`, naive date-times (taken as UTC) and bare dates.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
