//! Error taxonomy for submission and delivery.
//!
//! - `ValidationError`: rejected at submission, never enqueued.
//! - `ChannelError`: raised by a delivery channel; classified by `kind()`.
//! - `ExhaustedRetries`: terminal detail once the retry budget is spent.

use std::time::Duration;

use thiserror::Error;

use super::payload::Channel;

/// How the worker should treat a channel failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Worth another attempt after backoff.
    Transient,
    /// Retrying cannot help.
    Permanent,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("email must have at least one recipient")]
    NoRecipients,

    #[error("invalid email address: {0:?}")]
    InvalidAddress(String),

    #[error("email subject must not be empty")]
    EmptySubject,

    #[error("template name must not be empty")]
    EmptyTemplateName,

    #[error("invalid phone number: {0:?}")]
    InvalidPhoneNumber(String),

    #[error("sms body must not be empty")]
    EmptySmsBody,

    #[error("sms body has {len} characters, limit is {max}")]
    SmsBodyTooLong { len: usize, max: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("provider unreachable: {0}")]
    Unreachable(String),

    #[error("provider rejected message: {0}")]
    Rejected(String),

    #[error("send timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("channel panicked: {0}")]
    Panicked(String),

    #[error("no delivery channel registered for {0}")]
    NotRegistered(Channel),

    #[error("{channel} channel cannot send a {got} payload")]
    PayloadMismatch { channel: Channel, got: Channel },

    #[error("template rendering failed: {0}")]
    Template(String),
}

impl ChannelError {
    pub fn unreachable(message: impl Into<String>) -> Self {
        ChannelError::Unreachable(message.into())
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        ChannelError::Rejected(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            // Anything the provider or its collaborators report gets the
            // full attempt budget.
            ChannelError::Unreachable(_)
            | ChannelError::Rejected(_)
            | ChannelError::Timeout(_)
            | ChannelError::Panicked(_)
            | ChannelError::Template(_) => ErrorKind::Transient,
            // Wiring mistakes: no attempt can succeed.
            ChannelError::NotRegistered(_) | ChannelError::PayloadMismatch { .. } => {
                ErrorKind::Permanent
            }
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

/// Terminal failure once the retry budget is spent. Only ever recorded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("gave up after {attempts} attempt(s): {last_error}")]
pub struct ExhaustedRetries {
    pub attempts: u32,
    pub last_error: ChannelError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_failures_are_transient() {
        assert!(ChannelError::unreachable("conn refused").is_transient());
        assert!(ChannelError::rejected("bad number").is_transient());
        assert!(ChannelError::Timeout(Duration::from_secs(10)).is_transient());
        assert!(ChannelError::Panicked("boom".into()).is_transient());
        assert!(ChannelError::Template("missing".into()).is_transient());
    }

    #[test]
    fn wiring_errors_are_permanent() {
        assert_eq!(
            ChannelError::NotRegistered(Channel::Sms).kind(),
            ErrorKind::Permanent
        );
        assert_eq!(
            ChannelError::PayloadMismatch {
                channel: Channel::Sms,
                got: Channel::Email
            }
            .kind(),
            ErrorKind::Permanent
        );
    }

    #[test]
    fn messages_are_readable() {
        let e = ChannelError::Timeout(Duration::from_millis(1500));
        assert_eq!(e.to_string(), "send timed out after 1500ms");

        let e = ExhaustedRetries {
            attempts: 3,
            last_error: ChannelError::unreachable("smtp down"),
        };
        assert_eq!(
            e.to_string(),
            "gave up after 3 attempt(s): provider unreachable: smtp down"
        );
    }
}
