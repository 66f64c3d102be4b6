use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::NotificationConfig;

pub const SUBMISSION_RECEIVED: &str = "submission_received";
pub const ADMIN_NEW_SUBMISSION: &str = "admin_new_submission";
pub const PROFILE_APPROVED: &str = "profile_approved";
pub const PROFILE_REJECTED: &str = "profile_rejected";

/// Outbound message handed to the email collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub template: String,
    pub to: String,
    pub from: String,
    pub variables: BTreeMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationFailure {
    #[error("email delivery is not configured")]
    Disabled,
    #[error("email transport failed: {0}")]
    Transport(String),
    #[error("email service rejected message with status {status}")]
    Rejected { status: u16 },
}

/// Boundary to the external email service.
#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotificationFailure>;
}

/// Posts messages as JSON to an HTTP email API.
pub struct HttpEmailTransport {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpEmailTransport {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, NotificationFailure> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| NotificationFailure::Transport(format!("build client: {err}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        })
    }
}

#[async_trait]
impl EmailTransport for HttpEmailTransport {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotificationFailure> {
        let mut request = self.client.post(&self.endpoint).json(message);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request
            .send()
            .await
            .map_err(|err| NotificationFailure::Transport(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotificationFailure::Rejected {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

/// Transport used when no email endpoint is configured.
#[derive(Debug, Default)]
pub struct DisabledTransport;

#[async_trait]
impl EmailTransport for DisabledTransport {
    async fn send(&self, _message: &EmailMessage) -> Result<(), NotificationFailure> {
        Err(NotificationFailure::Disabled)
    }
}

/// Best-effort notification dispatch. Failures are logged and reported as `false`, never raised.
#[derive(Clone)]
pub struct Notifier {
    transport: Arc<dyn EmailTransport>,
    sender: String,
    admin_email: Option<String>,
}

impl Notifier {
    pub fn new(transport: Arc<dyn EmailTransport>, sender: impl Into<String>) -> Self {
        Self {
            transport,
            sender: sender.into(),
            admin_email: None,
        }
    }

    pub fn disabled() -> Self {
        Self::new(Arc::new(DisabledTransport), "directory@localhost")
    }

    pub fn with_admin_email(mut self, admin_email: Option<String>) -> Self {
        self.admin_email = admin_email;
        self
    }

    /// Builds the HTTP transport when an endpoint is configured, otherwise a disabled one.
    pub fn from_config(config: &NotificationConfig) -> Self {
        let transport: Arc<dyn EmailTransport> = match &config.endpoint {
            Some(endpoint) => match HttpEmailTransport::new(
                endpoint.clone(),
                config.api_key.clone(),
                Duration::from_millis(config.timeout_ms),
            ) {
                Ok(transport) => Arc::new(transport),
                Err(err) => {
                    warn!(error = %err, "email transport unavailable; notifications disabled");
                    Arc::new(DisabledTransport)
                }
            },
            None => Arc::new(DisabledTransport),
        };
        Self::new(transport, config.sender.clone()).with_admin_email(config.admin_email.clone())
    }

    pub fn admin_email(&self) -> Option<&str> {
        self.admin_email.as_deref()
    }

    pub async fn notify(
        &self,
        template: &str,
        recipient: &str,
        variables: BTreeMap<String, String>,
    ) -> bool {
        let message = EmailMessage {
            template: template.to_string(),
            to: recipient.to_string(),
            from: self.sender.clone(),
            variables,
        };

        match self.transport.send(&message).await {
            Ok(()) => {
                debug!(template, recipient, "notification accepted");
                true
            }
            Err(NotificationFailure::Disabled) => {
                debug!(template, recipient, "notification skipped; email disabled");
                false
            }
            Err(err) => {
                warn!(template, recipient, error = %err, "notification failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_transport_reports_not_accepted() {
        let notifier = Notifier::disabled();
        assert!(
            !notifier
                .notify(PROFILE_APPROVED, "jane@talentbridge.io", BTreeMap::new())
                .await
        );
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_swallowed() {
        let config = NotificationConfig {
            endpoint: Some("http://127.0.0.1:9/send".to_string()),
            api_key: None,
            sender: "directory@localhost".to_string(),
            admin_email: None,
            timeout_ms: 200,
        };
        let notifier = Notifier::from_config(&config);
        assert!(
            !notifier
                .notify(PROFILE_REJECTED, "jane@talentbridge.io", BTreeMap::new())
                .await
        );
    }
}
