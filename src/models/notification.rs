use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Sms,
}

/// Result of one delivery attempt on one channel. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationOutcome {
    pub channel: Channel,
    pub delivered: bool,
}

impl NotificationOutcome {
    pub fn delivered(channel: Channel) -> Self {
        Self { channel, delivered: true }
    }

    pub fn dropped(channel: Channel) -> Self {
        Self { channel, delivered: false }
    }
}

/// Per-channel delivery flags reported back to the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notifications {
    pub email: bool,
    pub sms: bool,
}

impl Notifications {
    pub fn from_outcomes(email: NotificationOutcome, sms: NotificationOutcome) -> Self {
        Self {
            email: email.delivered,
            sms: sms.delivered,
        }
    }
}
