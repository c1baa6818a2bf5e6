//! Email delivery channel.
//!
//! The SMTP (or HTTP API) client and the template engine are collaborators
//! behind `MailTransport` and `TemplateRenderer`; this channel only composes
//! the outgoing message.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{ChannelError, EmailBody, EmailPayload};
use crate::ports::DeliveryChannel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Plain,
    Html,
}

/// Fully composed message handed to the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub from: String,
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
    pub content_type: ContentType,
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn deliver(&self, message: &EmailMessage) -> Result<(), ChannelError>;
}

/// Renders `(template name, context)` into an HTML body.
pub trait TemplateRenderer: Send + Sync {
    fn render(
        &self,
        name: &str,
        context: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<String, ChannelError>;
}

/// Renderer used when no template engine is wired in.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredTemplates;

impl TemplateRenderer for UnconfiguredTemplates {
    fn render(
        &self,
        name: &str,
        _context: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<String, ChannelError> {
        Err(ChannelError::Template(format!(
            "no template engine configured (template {name:?})"
        )))
    }
}

pub struct EmailChannel {
    from: String,
    transport: Arc<dyn MailTransport>,
    templates: Arc<dyn TemplateRenderer>,
}

impl EmailChannel {
    pub fn new(from: impl Into<String>, transport: Arc<dyn MailTransport>) -> Self {
        Self {
            from: from.into(),
            transport,
            templates: Arc::new(UnconfiguredTemplates),
        }
    }

    pub fn with_templates(mut self, templates: Arc<dyn TemplateRenderer>) -> Self {
        self.templates = templates;
        self
    }

    /// Plain bodies go out as text/plain, rendered templates as text/html.
    pub fn compose(&self, payload: &EmailPayload) -> Result<EmailMessage, ChannelError> {
        let (body, content_type) = match &payload.body {
            EmailBody::Plain { text } => (text.clone(), ContentType::Plain),
            EmailBody::Template { name, context } => {
                (self.templates.render(name, context)?, ContentType::Html)
            }
        };
        Ok(EmailMessage {
            from: self.from.clone(),
            recipients: payload.recipients.iter().cloned().collect(),
            subject: payload.subject.clone(),
            body,
            content_type,
        })
    }
}

#[async_trait]
impl DeliveryChannel for EmailChannel {
    type Payload = EmailPayload;

    async fn send(&self, payload: &EmailPayload) -> Result<(), ChannelError> {
        let message = self.compose(payload)?;
        match self.transport.deliver(&message).await {
            Ok(()) => {
                tracing::info!(recipients = ?message.recipients, "Email sent");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    recipients = ?message.recipients,
                    error = %e,
                    "Email delivery failed"
                );
                Err(e)
            }
        }
    }
}
