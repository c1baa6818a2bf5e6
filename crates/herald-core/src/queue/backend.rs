//! Queue backend selection from `queue_backend_url`.

use std::path::PathBuf;
use std::sync::Arc;

use super::memory::{InMemoryTaskQueue, QueueOptions};
use crate::ports::{Clock, QueueError};

/// Parsed form of `queue_backend_url`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueBackend {
    /// `memory://`: nothing survives the process.
    Memory,
    /// `file://<path>`: journal at `path`.
    File(PathBuf),
}

impl QueueBackend {
    pub fn parse(url: &str) -> Result<Self, QueueError> {
        let url = url.trim();
        if url == "memory" || url == "memory://" {
            return Ok(QueueBackend::Memory);
        }
        if let Some(path) = url.strip_prefix("file://")
            && !path.is_empty()
        {
            return Ok(QueueBackend::File(PathBuf::from(path)));
        }
        Err(QueueError::UnsupportedBackend(url.to_string()))
    }

    pub fn open(
        &self,
        options: QueueOptions,
        clock: Arc<dyn Clock>,
    ) -> Result<InMemoryTaskQueue, QueueError> {
        match self {
            QueueBackend::Memory => Ok(InMemoryTaskQueue::new(options, clock)),
            QueueBackend::File(path) => InMemoryTaskQueue::with_journal(path, options, clock),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("memory://", QueueBackend::Memory)]
    #[case("memory", QueueBackend::Memory)]
    #[case("file:///var/lib/herald/queue.jsonl", QueueBackend::File(PathBuf::from("/var/lib/herald/queue.jsonl")))]
    #[case("file://queue.jsonl", QueueBackend::File(PathBuf::from("queue.jsonl")))]
    fn parses_supported_urls(#[case] url: &str, #[case] expected: QueueBackend) {
        assert_eq!(QueueBackend::parse(url).unwrap(), expected);
    }

    #[rstest]
    #[case("redis://localhost:6379/9")]
    #[case("file://")]
    #[case("")]
    fn rejects_other_urls(#[case] url: &str) {
        assert!(matches!(
            QueueBackend::parse(url),
            Err(QueueError::UnsupportedBackend(_))
        ));
    }
}
