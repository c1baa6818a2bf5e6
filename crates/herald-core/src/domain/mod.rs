//! Domain model: ids, payloads, tasks, results, errors.

pub mod errors;
pub mod ids;
pub mod payload;
pub mod result;
pub mod state;
pub mod task;

pub use self::errors::{ChannelError, ErrorKind, ExhaustedRetries, ValidationError};
pub use self::ids::TaskId;
pub use self::payload::{Channel, EmailBody, EmailPayload, MAX_SMS_BODY_CHARS, Payload, SmsPayload};
pub use self::result::{DeliveryOutcome, DeliveryResult};
pub use self::state::TaskStatus;
pub use self::task::Task;
