//! DeliveryChannel port: "send one notification".
//!
//! Two layers, the same way handlers are usually registered:
//! - `DeliveryChannel`: typed, implemented by `EmailChannel`, `SmsChannel`, mocks.
//! - `DynChannel`: object-safe, what the worker pool actually calls.

use async_trait::async_trait;

use crate::domain::{Channel, ChannelError, EmailPayload, Payload, SmsPayload};

/// A payload type that belongs to exactly one channel.
pub trait ChannelPayload: Send + Sync + 'static {
    const CHANNEL: Channel;

    fn from_payload(payload: &Payload) -> Option<&Self>;
}

impl ChannelPayload for EmailPayload {
    const CHANNEL: Channel = Channel::Email;

    fn from_payload(payload: &Payload) -> Option<&Self> {
        match payload {
            Payload::Email(p) => Some(p),
            _ => None,
        }
    }
}

impl ChannelPayload for SmsPayload {
    const CHANNEL: Channel = Channel::Sms;

    fn from_payload(payload: &Payload) -> Option<&Self> {
        match payload {
            Payload::Sms(p) => Some(p),
            _ => None,
        }
    }
}

/// Sends one notification through a provider.
///
/// Implementations report every failure, timeouts included, as a
/// `ChannelError` and never retry on their own.
#[async_trait]
pub trait DeliveryChannel: Send + Sync + 'static {
    type Payload: ChannelPayload;

    async fn send(&self, payload: &Self::Payload) -> Result<(), ChannelError>;
}

#[async_trait]
pub trait DynChannel: Send + Sync {
    async fn send_dyn(&self, payload: &Payload) -> Result<(), ChannelError>;

    fn channel(&self) -> Channel;
}
