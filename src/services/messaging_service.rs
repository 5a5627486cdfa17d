// src/services/messaging_service.rs
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::{
    config::FcmConfig,
    errors::RideShareError,
    services::repository::Repository,
};

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("FCM send failed: {0}")]
    FcmError(String),

    #[error("No device token registered for user {0}")]
    NoDeviceToken(String),

    #[error("Recipient not found: {0}")]
    UnknownRecipient(String),
}

impl From<NotificationError> for RideShareError {
    fn from(err: NotificationError) -> Self {
        RideShareError::Notification(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationTemplate {
    Welcome,
    RideAccepted,
    RideRejected,
    RideCompleted,
    PaymentCompleted,
    PaymentFailed,
}

impl NotificationTemplate {
    pub fn kind(&self) -> &'static str {
        match self {
            NotificationTemplate::Welcome => "welcome",
            NotificationTemplate::RideAccepted => "ride_accepted",
            NotificationTemplate::RideRejected => "ride_rejected",
            NotificationTemplate::RideCompleted => "ride_completed",
            NotificationTemplate::PaymentCompleted => "payment_completed",
            NotificationTemplate::PaymentFailed => "payment_failed",
        }
    }

    /// Title and body shown on the device.
    pub fn render(&self, data: &Value) -> (String, String) {
        let field = |name: &str| match data.get(name) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };

        match self {
            NotificationTemplate::Welcome => (
                "Karibu!".to_string(),
                format!("Welcome {}, your account is ready.", field("first_name")),
            ),
            NotificationTemplate::RideAccepted => (
                "Driver on the way".to_string(),
                format!("Your ride {} has been accepted.", field("ride_id")),
            ),
            NotificationTemplate::RideRejected => (
                "Ride request declined".to_string(),
                "A driver declined your request. Please request again.".to_string(),
            ),
            NotificationTemplate::RideCompleted => (
                "Ride completed".to_string(),
                format!("Your fare is KES {}.", field("fare")),
            ),
            NotificationTemplate::PaymentCompleted => (
                "Payment received".to_string(),
                format!("M-Pesa receipt {}.", field("receipt_number")),
            ),
            NotificationTemplate::PaymentFailed => (
                "Payment failed".to_string(),
                "Your M-Pesa payment did not go through.".to_string(),
            ),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, recipient: &str, template: NotificationTemplate, data: Value) -> Result<(), NotificationError>;
}

/// Send and swallow the failure, handing back a message for the response
/// payload instead.
pub async fn notify_best_effort(
    notifier: &dyn Notifier,
    recipient: &str,
    template: NotificationTemplate,
    data: Value,
) -> Option<String> {
    match notifier.send(recipient, template, data).await {
        Ok(()) => None,
        Err(e) => {
            tracing::warn!("{} notification to {} failed: {}", template.kind(), recipient, e);
            Some(format!("{} notification not delivered: {}", template.kind(), e))
        }
    }
}

/// Legacy FCM HTTP API, one request per registered device token.
pub struct FcmNotifier {
    config: FcmConfig,
    client: reqwest::Client,
    repository: Arc<dyn Repository>,
}

impl FcmNotifier {
    pub fn new(config: FcmConfig, repository: Arc<dyn Repository>) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            repository,
        }
    }

    async fn send_to_device(&self, device_token: &str, template: NotificationTemplate, data: &Value) -> Result<(), NotificationError> {
        let (title, body) = template.render(data);
        let mut payload = data.clone();
        if let Value::Object(map) = &mut payload {
            map.insert("type".to_string(), json!(template.kind()));
        }

        let message = json!({
            "to": device_token,
            "notification": {
                "title": title,
                "body": body,
                "sound": "default"
            },
            "priority": "high",
            "data": payload,
        });

        let response = self
            .client
            .post(&self.config.url)
            .header("Authorization", format!("key={}", self.config.server_key))
            .json(&message)
            .send()
            .await
            .map_err(|e| NotificationError::FcmError(e.to_string()))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            tracing::error!("FCM request failed: {}", error_text);
            return Err(NotificationError::FcmError(error_text));
        }

        tracing::debug!("FCM notification sent successfully");
        Ok(())
    }
}

#[async_trait]
impl Notifier for FcmNotifier {
    async fn send(&self, recipient: &str, template: NotificationTemplate, data: Value) -> Result<(), NotificationError> {
        let user = self
            .repository
            .get_user(recipient)
            .await
            .map_err(|e| NotificationError::FcmError(e.to_string()))?
            .ok_or_else(|| NotificationError::UnknownRecipient(recipient.to_string()))?;

        if user.device_tokens.is_empty() {
            return Err(NotificationError::NoDeviceToken(recipient.to_string()));
        }

        tracing::info!("Sending {} notification to {}", template.kind(), recipient);
        for token in &user.device_tokens {
            self.send_to_device(token, template, &data).await?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentNotification {
    pub recipient: String,
    pub template: NotificationTemplate,
    pub data: Value,
}

/// Logs instead of delivering. Used when no FCM key is configured; keeps what
/// it "sent" so callers can inspect it.
#[derive(Debug, Default)]
pub struct LogNotifier {
    sent: Mutex<Vec<SentNotification>>,
}

impl LogNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, recipient: &str, template: NotificationTemplate, data: Value) -> Result<(), NotificationError> {
        let (title, body) = template.render(&data);
        tracing::info!("[MOCK] Would notify {}: {} - {}", recipient, title, body);

        if let Ok(mut sent) = self.sent.lock() {
            sent.push(SentNotification {
                recipient: recipient.to_string(),
                template,
                data,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn send(&self, recipient: &str, _: NotificationTemplate, _: Value) -> Result<(), NotificationError> {
            Err(NotificationError::NoDeviceToken(recipient.to_string()))
        }
    }

    #[test]
    fn templates_render_data() {
        let (title, body) = NotificationTemplate::RideCompleted.render(&json!({"fare": 150.0}));
        assert_eq!(title, "Ride completed");
        assert_eq!(body, "Your fare is KES 150.0.");

        let (_, body) = NotificationTemplate::Welcome.render(&json!({"first_name": "Njeri"}));
        assert_eq!(body, "Welcome Njeri, your account is ready.");
    }

    #[tokio::test]
    async fn log_notifier_records_what_it_sends() {
        let notifier = LogNotifier::new();
        let warning = notify_best_effort(&notifier, "usr-1", NotificationTemplate::RideAccepted, json!({"ride_id": "rid-1"})).await;
        assert!(warning.is_none());

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient, "usr-1");
        assert_eq!(sent[0].template, NotificationTemplate::RideAccepted);
    }

    #[tokio::test]
    async fn failures_become_warnings() {
        let warning = notify_best_effort(&FailingNotifier, "usr-1", NotificationTemplate::PaymentFailed, json!({})).await;
        assert!(warning.unwrap().contains("payment_failed"));

        let err: RideShareError = NotificationError::NoDeviceToken("usr-1".into()).into();
        assert!(matches!(err, RideShareError::Notification(_)));
    }
}
