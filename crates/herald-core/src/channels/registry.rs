//! ChannelRegistry: one delivery channel per `Channel`.
//!
//! Typed channels are wrapped in `TypedChannel<C>` and stored as
//! `Arc<dyn DynChannel>`, so the worker pool can dispatch on
//! `Task::channel()` without knowing concrete payload types.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{Channel, ChannelError, Payload};
use crate::ports::{ChannelPayload, DeliveryChannel, DynChannel};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("a delivery channel for {0} is already registered")]
    AlreadyRegistered(Channel),
}

struct TypedChannel<C: DeliveryChannel> {
    inner: C,
}

#[async_trait]
impl<C: DeliveryChannel> DynChannel for TypedChannel<C> {
    async fn send_dyn(&self, payload: &Payload) -> Result<(), ChannelError> {
        let typed = C::Payload::from_payload(payload).ok_or(ChannelError::PayloadMismatch {
            channel: C::Payload::CHANNEL,
            got: payload.channel(),
        })?;
        self.inner.send(typed).await
    }

    fn channel(&self) -> Channel {
        C::Payload::CHANNEL
    }
}

/// Built during startup, read-only afterwards (shared through `Arc`).
#[derive(Default)]
pub struct ChannelRegistry {
    channels: HashMap<Channel, Arc<dyn DynChannel>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<C: DeliveryChannel>(&mut self, channel: C) -> Result<(), RegistryError> {
        let kind = C::Payload::CHANNEL;
        if self.channels.contains_key(&kind) {
            return Err(RegistryError::AlreadyRegistered(kind));
        }
        self.channels
            .insert(kind, Arc::new(TypedChannel { inner: channel }));
        Ok(())
    }

    pub fn get(&self, channel: Channel) -> Option<Arc<dyn DynChannel>> {
        self.channels.get(&channel).cloned()
    }

    /// Registered channels, sorted.
    pub fn registered(&self) -> Vec<Channel> {
        let mut channels: Vec<Channel> = self.channels.keys().copied().collect();
        channels.sort();
        channels
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
