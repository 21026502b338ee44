//! Brevo transactional email notifier.

use std::{sync::LazyLock, time::Duration};

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, instrument};

use super::{ExpirationNotice, Notifier, NotifyError, email::render_expiration_email};
use crate::{config::NotificationsConfig, models::is_valid_email};

static SENDER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*)<(.+@.+)>$").expect("Invalid sender regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct Contact {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    email: String,
}

impl Contact {
    fn address(email: impl Into<String>) -> Self {
        Self {
            name: None,
            email: email.into(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendEmailRequest<'a> {
    sender: &'a Contact,
    to: Vec<Contact>,
    subject: String,
    html_content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<Contact>,
}

/// Split `"Name <addr>"` into a named contact. A bare address gets
/// `fallback_name`, as does a display name that is empty after trimming
/// whitespace and surrounding quotes.
fn parse_sender(raw: &str, fallback_name: &str) -> Contact {
    let (name, email) = match SENDER_REGEX.captures(raw) {
        Some(caps) => {
            let name = caps[1].trim();
            let name = name.strip_prefix('"').unwrap_or(name);
            let name = name.strip_suffix('"').unwrap_or(name);
            (name.to_string(), caps[2].trim().to_string())
        }
        None => (String::new(), raw.trim().to_string()),
    };
    let name = if name.is_empty() {
        fallback_name.to_string()
    } else {
        name
    };
    Contact {
        name: Some(name),
        email,
    }
}

/// Sends expiration emails through the Brevo `smtp/email` API.
///
/// Each `send` is a single HTTP request; wrap it with
/// [`send_with_retry`](super::send_with_retry) for retries.
pub struct BrevoNotifier {
    client: Client,
    api_key: String,
    sender: Contact,
    config: NotificationsConfig,
}

impl BrevoNotifier {
    /// Build a notifier. Fails if the API key or sender is missing.
    pub fn new(config: &NotificationsConfig) -> Result<Self, NotifyError> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| NotifyError::Config("notifications.api_key is not set".into()))?
            .to_string();
        let sender = config
            .sender
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(|s| parse_sender(s, &config.brand_name))
            .ok_or_else(|| {
                NotifyError::Config(
                    "notifications.sender is not set (e.g. \"Dedicart <no-reply@dedicart.com.br>\")"
                        .into(),
                )
            })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key,
            sender,
            config: config.clone(),
        })
    }
}

#[async_trait]
impl Notifier for BrevoNotifier {
    #[instrument(skip(self, notice), fields(intention_id = %notice.intention_id))]
    async fn send(&self, notice: &ExpirationNotice) -> Result<(), NotifyError> {
        if !is_valid_email(&notice.recipient) {
            return Err(NotifyError::InvalidRecipient(notice.recipient.clone()));
        }

        let email = render_expiration_email(&self.config, &notice.template_id, notice.expires_at);
        let body = SendEmailRequest {
            sender: &self.sender,
            to: vec![Contact::address(&notice.recipient)],
            subject: email.subject,
            html_content: email.html,
            reply_to: self.config.reply_to.as_deref().map(Contact::address),
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!(status = status.as_u16(), "Expiration email accepted");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(NotifyError::Status {
            status: status.as_u16(),
            body,
        })
    }

    fn name(&self) -> &'static str {
        "brevo"
    }
}
