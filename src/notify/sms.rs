use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use super::NotificationError;
use crate::config::SmsConfig;
use crate::models::{Channel, NotificationOutcome};

/// Prepended to every outgoing text.
pub const SMS_PREFIX: &str = "[EHR System] ";

/// Carrier limit for a single concatenated message.
pub const MAX_SMS_CHARS: usize = 1600;

static E164: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\+\d{10,15}$").unwrap());

/// Strip everything but digits, prefix `+`, and accept only 10–15 digits.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    let candidate = format!("+{digits}");
    E164.is_match(&candidate).then_some(candidate)
}

/// Prefix and cap an SMS body.
pub fn format_body(message: &str) -> String {
    format!("{SMS_PREFIX}{message}")
        .chars()
        .take(MAX_SMS_CHARS)
        .collect()
}

/// Carrier-side delivery. Returns the provider message id.
#[async_trait]
pub trait SmsTransport: Send + Sync {
    async fn send(&self, to: &str, body: &str) -> Result<String, NotificationError>;
}

/// SMS delivery channel. `Disabled` is chosen once at startup when
/// credentials are missing and never attempts a send.
#[derive(Clone)]
pub enum SmsChannel {
    Enabled(Arc<dyn SmsTransport>),
    Disabled,
}

impl SmsChannel {
    pub fn from_config(config: Option<&SmsConfig>) -> Self {
        match config {
            Some(config) => match TwilioSmsTransport::new(config.clone()) {
                Ok(transport) => {
                    tracing::info!("SMS transport initialized");
                    Self::Enabled(Arc::new(transport))
                }
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        "SMS transport initialization failed, SMS disabled"
                    );
                    Self::Disabled
                }
            },
            None => {
                tracing::warn!("SMS credentials not configured, SMS disabled");
                Self::Disabled
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled(_))
    }

    /// Best-effort send. Every failure is logged and reported as undelivered.
    pub async fn send(&self, to: &str, message: &str, operation: &str) -> NotificationOutcome {
        let transport = match self {
            Self::Enabled(transport) => transport,
            Self::Disabled => {
                tracing::warn!(operation, "SMS not sent, transport not configured");
                return NotificationOutcome::dropped(Channel::Sms);
            }
        };

        if to.is_empty() || message.is_empty() {
            tracing::warn!(operation, "SMS not sent, missing recipient or message");
            return NotificationOutcome::dropped(Channel::Sms);
        }

        let Some(number) = normalize_phone(to) else {
            tracing::warn!(operation, "SMS not sent, invalid phone number format");
            return NotificationOutcome::dropped(Channel::Sms);
        };

        match transport.send(&number, &format_body(message)).await {
            Ok(sid) => {
                tracing::info!(operation, sid = sid.as_str(), "SMS sent");
                NotificationOutcome::delivered(Channel::Sms)
            }
            Err(e) => {
                tracing::error!(operation, error = %e, "SMS delivery failed");
                NotificationOutcome::dropped(Channel::Sms)
            }
        }
    }
}

// ─── Twilio transport ─────────────────────────────────────────────────────────

/// Twilio Messages API client.
pub struct TwilioSmsTransport {
    client: reqwest::Client,
    config: SmsConfig,
}

#[derive(Deserialize)]
struct MessageResponse {
    sid: String,
}

impl TwilioSmsTransport {
    pub fn new(config: SmsConfig) -> Result<Self, NotificationError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .map_err(|e| NotificationError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.config.api_base.trim_end_matches('/'),
            self.config.account_sid
        )
    }
}

#[async_trait]
impl SmsTransport for TwilioSmsTransport {
    async fn send(&self, to: &str, body: &str) -> Result<String, NotificationError> {
        let form = [
            ("To", to),
            ("From", self.config.from_number.as_str()),
            ("Body", body),
        ];

        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&form)
            .send()
            .await
            .map_err(|e| NotificationError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotificationError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: MessageResponse = response
            .json()
            .await
            .map_err(|e| NotificationError::Transport(e.to_string()))?;
        Ok(parsed.sid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::testing::RecordingSms;

    #[test]
    fn rejects_short_numbers() {
        assert!(normalize_phone("12345").is_none());
    }

    #[test]
    fn accepts_international_number() {
        assert_eq!(
            normalize_phone("+917735030422").as_deref(),
            Some("+917735030422")
        );
    }

    #[test]
    fn strips_formatting() {
        assert_eq!(
            normalize_phone("+1 (555) 010-2030").as_deref(),
            Some("+15550102030")
        );
        assert_eq!(normalize_phone("919900011122").as_deref(), Some("+919900011122"));
    }

    #[test]
    fn rejects_too_long() {
        assert!(normalize_phone("+1234567890123456").is_none());
    }

    #[test]
    fn body_prefixed_and_capped() {
        assert_eq!(format_body("hi"), "[EHR System] hi");
        let long = "x".repeat(5000);
        assert_eq!(format_body(&long).chars().count(), MAX_SMS_CHARS);
    }

    #[test]
    fn messages_url_uses_account() {
        let transport = TwilioSmsTransport::new(SmsConfig {
            api_base: "https://api.twilio.com/".into(),
            account_sid: "AC123".into(),
            auth_token: "tok".into(),
            from_number: "+15550001111".into(),
        })
        .unwrap();
        assert_eq!(
            transport.messages_url(),
            "https://api.twilio.com/2010-04-01/Accounts/AC123/Messages.json"
        );
    }

    #[tokio::test]
    async fn disabled_channel_never_sends() {
        let outcome = SmsChannel::Disabled.send("+917735030422", "hello", "test").await;
        assert!(!outcome.delivered);
        assert_eq!(outcome.channel, Channel::Sms);
    }

    #[tokio::test]
    async fn invalid_number_short_circuits() {
        let sms = RecordingSms::new();
        let channel = SmsChannel::Enabled(sms.clone());
        let outcome = channel.send("12345", "hello", "test").await;
        assert!(!outcome.delivered);
        assert!(sms.sent().is_empty());
    }

    #[tokio::test]
    async fn valid_number_sent_with_prefix() {
        let sms = RecordingSms::new();
        let channel = SmsChannel::Enabled(sms.clone());
        let outcome = channel.send("+91 77350 30422", "hello", "test").await;
        assert!(outcome.delivered);
        assert_eq!(
            sms.sent(),
            vec![("+917735030422".to_string(), "[EHR System] hello".to_string())]
        );
    }

    #[tokio::test]
    async fn transport_failure_reported_not_raised() {
        let sms = RecordingSms::failing();
        let channel = SmsChannel::Enabled(sms.clone());
        let outcome = channel.send("+917735030422", "hello", "test").await;
        assert!(!outcome.delivered);
        assert_eq!(sms.sent().len(), 1);
    }

    #[test]
    fn missing_config_disables_channel() {
        assert!(!SmsChannel::from_config(None).is_enabled());
    }
}
