//! Development transport: logs instead of delivering.

use async_trait::async_trait;

use super::email::{EmailMessage, MailTransport};
use super::sms::{SmsMessage, SmsTransport};
use crate::domain::ChannelError;

#[derive(Debug, Clone, Copy, Default)]
pub struct LogTransport;

#[async_trait]
impl MailTransport for LogTransport {
    async fn deliver(&self, message: &EmailMessage) -> Result<(), ChannelError> {
        tracing::info!(
            from = %message.from,
            recipients = ?message.recipients,
            subject = %message.subject,
            content_type = ?message.content_type,
            bytes = message.body.len(),
            "[log transport] email"
        );
        Ok(())
    }
}

#[async_trait]
impl SmsTransport for LogTransport {
    async fn deliver(&self, message: &SmsMessage) -> Result<(), ChannelError> {
        tracing::info!(
            from = %message.from,
            to = %message.to,
            chars = message.body.chars().count(),
            "[log transport] sms"
        );
        Ok(())
    }
}
