// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SMTP alert delivery.
//!
//! Operational alerts (failed health checks, reconciliation page failures,
//! dead-lettered retries) are mailed to the configured recipients through an
//! async `lettre` transport.

use async_trait::async_trait;
use courier_config::model::EmailAlertConfig;
use courier_core::types::Alert;
use courier_core::{AdapterType, AlertSink, CourierError, HealthStatus, PluginAdapter};
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, warn};

/// Port that speaks TLS from the first byte instead of upgrading.
const IMPLICIT_TLS_PORT: u16 = 465;

pub struct EmailAlertSink {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
    subject_prefix: String,
}

impl EmailAlertSink {
    /// Builds the transport. No connection is made until the first alert.
    pub fn new(config: &EmailAlertConfig) -> Result<Self, CourierError> {
        let from = parse_mailbox("alert.email.from", &config.from)?;
        let to = config
            .to
            .iter()
            .map(|addr| parse_mailbox("alert.email.to", addr))
            .collect::<Result<Vec<_>, _>>()?;
        if to.is_empty() {
            return Err(CourierError::Config(
                "alert.email.to must list at least one recipient".into(),
            ));
        }

        let builder = if config.smtp_port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
        }
        .map_err(|e| CourierError::Config(format!("invalid alert.email.smtp_host: {e}")))?;

        let mut builder = builder.port(config.smtp_port);
        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
            to,
            subject_prefix: config.subject_prefix.clone(),
        })
    }

    /// Renders an alert as a plain-text message.
    pub fn build_message(&self, alert: &Alert) -> Result<Message, CourierError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(format!("{} {}: {}", self.subject_prefix, alert.kind, alert.subject))
            .header(ContentType::TEXT_PLAIN);
        for to in &self.to {
            builder = builder.to(to.clone());
        }
        let body = format!(
            "{}\n\nkind: {}\nraised at: {}\n",
            alert.detail,
            alert.kind,
            alert.raised_at.to_rfc3339()
        );
        builder
            .body(body)
            .map_err(|e| CourierError::Internal(format!("failed to build alert email: {e}")))
    }
}

fn parse_mailbox(field: &str, raw: &str) -> Result<Mailbox, CourierError> {
    raw.parse::<Mailbox>()
        .map_err(|e| CourierError::Config(format!("invalid {field} `{raw}`: {e}")))
}

#[async_trait]
impl PluginAdapter for EmailAlertSink {
    fn name(&self) -> &str {
        "email"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Alert
    }

    async fn health_check(&self) -> Result<HealthStatus, CourierError> {
        match self.transport.test_connection().await {
            Ok(true) => Ok(HealthStatus::Healthy),
            Ok(false) => Ok(HealthStatus::Degraded("SMTP relay refused the connection".into())),
            Err(e) => Ok(HealthStatus::Unhealthy(format!("SMTP relay unreachable: {e}"))),
        }
    }

    async fn shutdown(&self) -> Result<(), CourierError> {
        Ok(())
    }
}

#[async_trait]
impl AlertSink for EmailAlertSink {
    async fn send_alert(&self, alert: &Alert) -> Result<(), CourierError> {
        let message = self.build_message(alert)?;
        match self.transport.send(message).await {
            Ok(_) => {
                debug!(kind = %alert.kind, recipients = self.to.len(), "alert email sent");
                Ok(())
            }
            Err(e) => {
                warn!(kind = %alert.kind, error = %e, "alert email failed");
                Err(CourierError::Transient(format!("SMTP delivery failed: {e}")))
            }
        }
    }
}
