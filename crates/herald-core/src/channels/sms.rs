//! SMS delivery channel.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{ChannelError, SmsPayload};
use crate::ports::DeliveryChannel;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsMessage {
    pub from: String,
    pub to: String,
    pub body: String,
}

/// SMS provider client (vendor REST API, gateway, ...).
#[async_trait]
pub trait SmsTransport: Send + Sync {
    async fn deliver(&self, message: &SmsMessage) -> Result<(), ChannelError>;
}

/// Sends from a fixed number owned by the provider account.
pub struct SmsChannel {
    from: String,
    transport: Arc<dyn SmsTransport>,
}

impl SmsChannel {
    pub fn new(from: impl Into<String>, transport: Arc<dyn SmsTransport>) -> Self {
        Self {
            from: from.into(),
            transport,
        }
    }
}

#[async_trait]
impl DeliveryChannel for SmsChannel {
    type Payload = SmsPayload;

    async fn send(&self, payload: &SmsPayload) -> Result<(), ChannelError> {
        let message = SmsMessage {
            from: self.from.clone(),
            to: payload.to.clone(),
            body: payload.body.clone(),
        };
        match self.transport.deliver(&message).await {
            Ok(()) => {
                tracing::info!(to = %message.to, "SMS sent");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(to = %message.to, error = %e, "SMS delivery failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<SmsMessage>>,
    }

    #[async_trait]
    impl SmsTransport for RecordingTransport {
        async fn deliver(&self, message: &SmsMessage) -> Result<(), ChannelError> {
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn sends_from_the_configured_number() {
        let transport = Arc::new(RecordingTransport::default());
        let channel = SmsChannel::new("+15551111", transport.clone());

        channel
            .send(&SmsPayload::new("+15550000", "test"))
            .await
            .unwrap();

        let sent = transport.sent.lock().unwrap();
        assert_eq!(
            sent.as_slice(),
            &[SmsMessage {
                from: "+15551111".to_string(),
                to: "+15550000".to_string(),
                body: "test".to_string(),
            }]
        );
    }
}
