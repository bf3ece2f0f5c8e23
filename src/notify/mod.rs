//! Best-effort patient notifications.
//!
//! Delivery failures never propagate: each channel logs and reports a
//! boolean outcome. Email and SMS for one operation run concurrently.

pub mod email;
pub mod sms;

use thiserror::Error;

use crate::config::AppConfig;
use crate::models::{Channel, NotificationOutcome, Notifications};

pub use email::{
    ArtifactStore, EmailChannel, EmailMessage, EmailTransport, HttpEmailTransport, MailEnvelope,
};
pub use sms::{normalize_phone, SmsChannel, SmsTransport, TwilioSmsTransport};

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Provider rejected message ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// SMS request from the orchestrator.
#[derive(Debug, Clone)]
pub struct SmsMessage {
    pub to: String,
    pub body: String,
}

/// Fans one operation's notifications out to both channels.
#[derive(Clone)]
pub struct NotificationDispatcher {
    email: EmailChannel,
    sms: SmsChannel,
}

impl NotificationDispatcher {
    pub fn new(email: EmailChannel, sms: SmsChannel) -> Self {
        Self { email, sms }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let store = ArtifactStore::new(config.artifacts.output_dir.clone());
        Self::new(
            EmailChannel::from_config(config.mail.as_ref(), store),
            SmsChannel::from_config(config.sms.as_ref()),
        )
    }

    pub fn email(&self) -> &EmailChannel {
        &self.email
    }

    pub fn sms(&self) -> &SmsChannel {
        &self.sms
    }

    /// Send whichever messages are present, concurrently. A missing
    /// message counts as undelivered on its channel.
    pub async fn dispatch(
        &self,
        operation: &str,
        email: Option<EmailMessage>,
        sms: Option<SmsMessage>,
    ) -> Notifications {
        let email_fut = async {
            match email {
                Some(message) => self.email.send(message).await,
                None => NotificationOutcome::dropped(Channel::Email),
            }
        };
        let sms_fut = async {
            match &sms {
                Some(message) => self.sms.send(&message.to, &message.body, operation).await,
                None => NotificationOutcome::dropped(Channel::Sms),
            }
        };

        let (email_outcome, sms_outcome) = tokio::join!(email_fut, sms_fut);
        tracing::debug!(
            operation,
            email = email_outcome.delivered,
            sms = sms_outcome.delivered,
            "Notifications dispatched"
        );
        Notifications::from_outcomes(email_outcome, sms_outcome)
    }
}
