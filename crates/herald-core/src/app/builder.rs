//! AppBuilder: wires config, queue, result store and channels into an `App`.
//!
//! `build()` fails fast: an invalid config, an unusable queue backend, or a
//! channel listed in `expect_channels` but never registered is reported at
//! startup instead of as failed tasks later.

use std::sync::Arc;

use crate::channels::{ChannelRegistry, RegistryError};
use crate::config::{Config, ConfigError};
use crate::domain::Channel;
use crate::impls::InMemoryResultStore;
use crate::ports::{
    Clock, DeliveryChannel, IdGenerator, QueueError, ResultStore, SystemClock, TaskQueue,
    UlidGenerator,
};
use crate::queue::QueueBackend;

use super::dispatcher::Dispatcher;
use super::worker_pool::{PoolOptions, WorkerPool};

/// # Example
/// ```ignore
/// let app = AppBuilder::new(Config::from_env()?)
///     .register(EmailChannel::new(from, transport))?
///     .expect_channels(&[Channel::Email])
///     .build()?;
/// let pool = app.spawn_workers();
/// let id = app.dispatcher().submit_email(payload).await?;
/// ```
pub struct AppBuilder {
    config: Config,
    channels: ChannelRegistry,
    expected_channels: Option<Vec<Channel>>,
    clock: Option<Arc<dyn Clock>>,
    queue: Option<Arc<dyn TaskQueue>>,
    results: Option<Arc<dyn ResultStore>>,
    ids: Option<Arc<dyn IdGenerator>>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing delivery channels: {0:?}; they were expected but not registered")]
    MissingChannels(Vec<Channel>),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("invalid config: {0}")]
    Config(#[from] ConfigError),

    #[error("queue backend: {0}")]
    Queue(#[from] QueueError),
}

impl AppBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            channels: ChannelRegistry::new(),
            expected_channels: None,
            clock: None,
            queue: None,
            results: None,
            ids: None,
        }
    }

    pub fn register<C: DeliveryChannel>(mut self, channel: C) -> Result<Self, BuildError> {
        self.channels.register(channel)?;
        Ok(self)
    }

    pub fn expect_channels(mut self, channels: &[Channel]) -> Self {
        self.expected_channels = Some(channels.to_vec());
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Use this queue instead of opening `queue_backend_url`.
    pub fn with_queue(mut self, queue: Arc<dyn TaskQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn with_result_store(mut self, results: Arc<dyn ResultStore>) -> Self {
        self.results = Some(results);
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn build(self) -> Result<App, BuildError> {
        self.config.validate()?;

        let registered = self.channels.registered();
        if let Some(expected) = &self.expected_channels {
            let missing: Vec<Channel> = expected
                .iter()
                .filter(|c| !registered.contains(c))
                .copied()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingChannels(missing));
            }
        }
        for channel in Channel::ALL {
            if !registered.contains(&channel) {
                tracing::warn!(channel = %channel, "No delivery channel registered; such tasks will fail");
            }
        }

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let queue = match self.queue {
            Some(queue) => queue,
            None => {
                let backend = QueueBackend::parse(&self.config.queue_backend_url)?;
                Arc::new(backend.open(self.config.queue_options(), Arc::clone(&clock))?)
            }
        };
        let results = self
            .results
            .unwrap_or_else(|| Arc::new(InMemoryResultStore::new()));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&clock))));

        let dispatcher = Dispatcher::new(
            Arc::clone(&queue),
            Arc::clone(&results),
            ids,
            Arc::clone(&clock),
        );

        tracing::info!(
            backend = %self.config.queue_backend_url,
            channels = ?registered,
            "Dispatcher ready"
        );

        Ok(App {
            config: self.config,
            dispatcher,
            queue,
            results,
            channels: Arc::new(self.channels),
            clock,
        })
    }
}

/// A wired dispatcher plus everything needed to start workers for it.
pub struct App {
    config: Config,
    dispatcher: Dispatcher,
    queue: Arc<dyn TaskQueue>,
    results: Arc<dyn ResultStore>,
    channels: Arc<ChannelRegistry>,
    clock: Arc<dyn Clock>,
}

impl App {
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn channels(&self) -> &ChannelRegistry {
        &self.channels
    }

    pub fn spawn_workers(&self) -> WorkerPool {
        WorkerPool::spawn(
            PoolOptions::from_config(&self.config),
            Arc::clone(&self.queue),
            Arc::clone(&self.channels),
            Arc::clone(&self.results),
            Arc::clone(&self.clock),
        )
    }
}
