//! Delivery channels and their registry.

pub mod email;
pub mod log_transport;
pub mod registry;
pub mod sms;

pub use self::email::{
    ContentType, EmailChannel, EmailMessage, MailTransport, TemplateRenderer, UnconfiguredTemplates,
};
pub use self::log_transport::LogTransport;
pub use self::registry::{ChannelRegistry, RegistryError};
pub use self::sms::{SmsChannel, SmsMessage, SmsTransport};
