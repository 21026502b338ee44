//! Expiration notification configuration.
//!
//! # Example
//!
//! ```toml
//! [notifications]
//! api_key = "${BREVO_API_KEY}"
//! sender = "Dedicart <no-reply@dedicart.com.br>"
//! reply_to = "dedicart.help@gmail.com"
//! site_domain = "dedicart.com.br"
//!
//! [notifications.retry]
//! max_attempts = 3
//! backoff_base_ms = 500
//!
//! [notifications.template_labels]
//! nossa_historia = "Nossa História"
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Transactional email settings.
///
/// Leaving `api_key` unset disables notification dispatch. Records are
/// still marked expired and still erased once their retention elapses.
#[derive(Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct NotificationsConfig {
    /// Brevo API key.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Sender, either `"Name <address>"` or a bare address.
    #[serde(default)]
    pub sender: Option<String>,

    /// Optional reply-to address.
    #[serde(default)]
    pub reply_to: Option<String>,

    /// Domain used to build the renewal link.
    #[serde(default = "default_site_domain")]
    pub site_domain: String,

    /// Transactional email endpoint.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Sender name used when `sender` is a bare address.
    #[serde(default = "default_brand_name")]
    pub brand_name: String,

    /// Human-readable template names shown in the email body.
    #[serde(default = "default_template_labels")]
    pub template_labels: HashMap<String, String>,

    /// Retry policy for retryable send failures.
    #[serde(default)]
    pub retry: NotificationRetryConfig,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            sender: None,
            reply_to: None,
            site_domain: default_site_domain(),
            api_url: default_api_url(),
            timeout_secs: default_timeout_secs(),
            brand_name: default_brand_name(),
            template_labels: default_template_labels(),
            retry: NotificationRetryConfig::default(),
        }
    }
}

impl std::fmt::Debug for NotificationsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationsConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "****"))
            .field("sender", &self.sender)
            .field("reply_to", &self.reply_to)
            .field("site_domain", &self.site_domain)
            .field("api_url", &self.api_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("brand_name", &self.brand_name)
            .field("template_labels", &self.template_labels)
            .field("retry", &self.retry)
            .finish()
    }
}

impl NotificationsConfig {
    /// Whether an API key is configured.
    pub fn is_enabled(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }

    /// Renewal page linked from the email.
    pub fn renewal_url(&self) -> String {
        format!("https://{}/my-dedications", self.site_domain)
    }

    /// Label for a template, falling back to the raw id.
    pub fn template_label<'a>(&'a self, template_id: &'a str) -> &'a str {
        self.template_labels
            .get(template_id)
            .map(String::as_str)
            .unwrap_or(template_id)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.is_enabled()
            && self.sender.as_deref().is_none_or(|s| s.trim().is_empty())
        {
            return Err(ConfigError::Validation(
                "notifications.sender is required when notifications.api_key is set \
                 (e.g. \"Dedicart <no-reply@dedicart.com.br>\")"
                    .into(),
            ));
        }
        if url::Url::parse(&self.api_url).is_err() {
            return Err(ConfigError::Validation(format!(
                "notifications.api_url is not a valid URL: {}",
                self.api_url
            )));
        }
        self.retry.validate()
    }
}

/// Retry policy for the notifier.
///
/// The wait before attempt `n + 1` is `backoff_base_ms * n`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct NotificationRetryConfig {
    /// Total attempts, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base backoff in milliseconds.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

impl Default for NotificationRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

impl NotificationRetryConfig {
    /// Wait after the 1-based failed `attempt`, before the next one.
    pub fn delay_for_attempt(&self, attempt: u32) -> std::time::Duration {
        std::time::Duration::from_millis(self.backoff_base_ms.saturating_mul(u64::from(attempt)))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Validation(
                "notifications.retry.max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn default_site_domain() -> String {
    "dedicart.com.br".to_string()
}

fn default_api_url() -> String {
    "https://api.brevo.com/v3/smtp/email".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_brand_name() -> String {
    "Dedicart".to_string()
}

fn default_template_labels() -> HashMap<String, String> {
    HashMap::from([("nossa_historia".to_string(), "Nossa História".to_string())])
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    500
}
