//! Run outcome notifications
//!
//! A finished (or failed) run is reported to a chat channel through an incoming
//! webhook. Nothing is sent when the endpoint or the channel is unconfigured.

use crate::config::NotifierConfig;
use crate::error::Result;
#[cfg(feature = "http")]
use crate::error::Error;
use serde::{Deserialize, Serialize};

/// Attachment color for a successful run
pub const SUCCESS_COLOR: &str = "#36a64f";

/// Attachment color for a failed run
pub const FAILURE_COLOR: &str = "#d00000";

/// Colored block of text in a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub color: String,
    pub text: String,
}

/// Webhook message body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub channel: String,
    pub username: String,
    pub attachments: Vec<Attachment>,
}

impl Notification {
    /// Message reporting success (green) or failure (red)
    pub fn outcome(
        channel: impl Into<String>,
        username: impl Into<String>,
        success: bool,
        text: impl Into<String>,
    ) -> Self {
        let color = if success { SUCCESS_COLOR } else { FAILURE_COLOR };
        Self {
            channel: channel.into(),
            username: username.into(),
            attachments: vec![Attachment {
                color: color.to_string(),
                text: text.into(),
            }],
        }
    }
}

/// Delivery of notification payloads
pub trait Notifier {
    /// Post `payload` to `endpoint`, returning the HTTP status
    ///
    /// Returns `Ok(None)` without sending anything when `endpoint` or `channel` is empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint cannot be reached.
    fn post(&self, endpoint: &str, channel: &str, payload: &Notification) -> Result<Option<u16>>;
}

/// Report a run outcome using the configured channel and sender identity
///
/// # Errors
///
/// Returns an error if the notifier fails to deliver the message.
pub fn notify_outcome(
    notifier: &dyn Notifier,
    config: &NotifierConfig,
    success: bool,
    message: &str,
) -> Result<Option<u16>> {
    if !config.is_configured() {
        log::debug!("Notifier not configured, skipping");
        return Ok(None);
    }
    let endpoint = config.endpoint.as_deref().unwrap_or_default();
    let channel = config.channel.as_deref().unwrap_or_default();
    let payload = Notification::outcome(channel, config.username.as_str(), success, message);
    notifier.post(endpoint, channel, &payload)
}

/// Notifier posting JSON to an incoming webhook
#[cfg(feature = "http")]
#[derive(Debug, Clone, Default)]
pub struct WebhookNotifier {
    client: reqwest::blocking::Client,
}

#[cfg(feature = "http")]
impl WebhookNotifier {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(feature = "http")]
impl Notifier for WebhookNotifier {
    fn post(&self, endpoint: &str, channel: &str, payload: &Notification) -> Result<Option<u16>> {
        if endpoint.trim().is_empty() || channel.trim().is_empty() {
            return Ok(None);
        }
        let response = self
            .client
            .post(endpoint)
            .json(payload)
            .send()
            .map_err(|e| Error::Notify(format!("webhook for {channel} unreachable: {e}")))?;
        let status = response.status();
        if status.is_success() {
            log::info!("📣 Notified {channel} ({status})");
        } else {
            log::warn!("Notification to {channel} answered {status}");
        }
        Ok(Some(status.as_u16()))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder {
        sent: RefCell<Vec<(String, String, Notification)>>,
    }

    impl Notifier for Recorder {
        fn post(&self, endpoint: &str, channel: &str, payload: &Notification) -> Result<Option<u16>> {
            self.sent
                .borrow_mut()
                .push((endpoint.to_string(), channel.to_string(), payload.clone()));
            Ok(Some(200))
        }
    }

    fn configured() -> NotifierConfig {
        NotifierConfig {
            endpoint: Some("https://hooks.local/T0/B0".into()),
            channel: Some("#ops".into()),
            username: "grafana-backup".into(),
        }
    }

    #[test]
    fn test_payload_shape() {
        let payload = Notification::outcome("#ops", "grafana-backup", true, "3 items backed up");
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "channel": "#ops",
                "username": "grafana-backup",
                "attachments": [{"color": "#36a64f", "text": "3 items backed up"}]
            })
        );
    }

    #[test]
    fn test_failure_is_red() {
        let recorder = Recorder::default();
        let status = notify_outcome(&recorder, &configured(), false, "boom").unwrap();
        assert_eq!(status, Some(200));

        let sent = recorder.sent.borrow();
        assert_eq!(sent[0].0, "https://hooks.local/T0/B0");
        assert_eq!(sent[0].2.attachments[0].color, FAILURE_COLOR);
    }

    #[test]
    fn test_unconfigured_is_noop() {
        let recorder = Recorder::default();
        let mut config = configured();
        config.channel = None;

        assert_eq!(notify_outcome(&recorder, &config, true, "ok").unwrap(), None);
        assert!(recorder.sent.borrow().is_empty());
    }

    #[cfg(feature = "http")]
    #[test]
    fn test_webhook_skips_empty_channel() {
        let payload = Notification::outcome("", "u", true, "ok");
        let status = WebhookNotifier::new()
            .post("https://hooks.local/x", "", &payload)
            .unwrap();
        assert_eq!(status, None);
    }
}
