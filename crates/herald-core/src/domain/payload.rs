//! Notification payloads and their shape validation.
//!
//! Validation happens at submission time so that malformed tasks never reach
//! the queue.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::errors::ValidationError;

/// SMS providers concatenate segments up to this many characters.
pub const MAX_SMS_BODY_CHARS: usize = 1600;

/// Delivery medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Sms,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Email, Channel::Sms];
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Email => write!(f, "email"),
            Channel::Sms => write!(f, "sms"),
        }
    }
}

/// Body of an email: either literal text or a template reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EmailBody {
    Plain {
        text: String,
    },
    Template {
        name: String,
        #[serde(default)]
        context: serde_json::Map<String, serde_json::Value>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailPayload {
    pub recipients: BTreeSet<String>,
    pub subject: String,
    pub body: EmailBody,
}

impl EmailPayload {
    pub fn plain<I, S>(recipients: I, subject: impl Into<String>, text: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            recipients: collect_recipients(recipients),
            subject: subject.into(),
            body: EmailBody::Plain { text: text.into() },
        }
    }

    pub fn template<I, S>(
        recipients: I,
        subject: impl Into<String>,
        name: impl Into<String>,
        context: serde_json::Map<String, serde_json::Value>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            recipients: collect_recipients(recipients),
            subject: subject.into(),
            body: EmailBody::Template {
                name: name.into(),
                context,
            },
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.recipients.is_empty() {
            return Err(ValidationError::NoRecipients);
        }
        if let Some(bad) = self.recipients.iter().find(|r| !is_email_address(r)) {
            return Err(ValidationError::InvalidAddress(bad.clone()));
        }
        if self.subject.trim().is_empty() {
            return Err(ValidationError::EmptySubject);
        }
        if let EmailBody::Template { name, .. } = &self.body
            && name.trim().is_empty()
        {
            return Err(ValidationError::EmptyTemplateName);
        }
        Ok(())
    }
}

fn collect_recipients<I, S>(recipients: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    recipients
        .into_iter()
        .map(|r| r.into().trim().to_string())
        .collect()
}

/// Shape check only; deliverability is the provider's call.
fn is_email_address(addr: &str) -> bool {
    if addr.chars().any(char::is_whitespace) {
        return false;
    }
    let mut parts = addr.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsPayload {
    pub to: String,
    pub body: String,
}

impl SmsPayload {
    pub fn new(to: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into().trim().to_string(),
            body: body.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !is_phone_number(&self.to) {
            return Err(ValidationError::InvalidPhoneNumber(self.to.clone()));
        }
        if self.body.trim().is_empty() {
            return Err(ValidationError::EmptySmsBody);
        }
        let len = self.body.chars().count();
        if len > MAX_SMS_BODY_CHARS {
            return Err(ValidationError::SmsBodyTooLong {
                len,
                max: MAX_SMS_BODY_CHARS,
            });
        }
        Ok(())
    }
}

/// Optional `+` followed by 4..=15 digits (E.164 allows at most 15).
fn is_phone_number(to: &str) -> bool {
    let digits = to.strip_prefix('+').unwrap_or(to);
    (4..=15).contains(&digits.len()) && digits.bytes().all(|b| b.is_ascii_digit())
}

/// What a task asks to deliver, tagged by channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "channel", rename_all = "lowercase")]
pub enum Payload {
    Email(EmailPayload),
    Sms(SmsPayload),
}

impl Payload {
    pub fn channel(&self) -> Channel {
        match self {
            Payload::Email(_) => Channel::Email,
            Payload::Sms(_) => Channel::Sms,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Payload::Email(p) => p.validate(),
            Payload::Sms(p) => p.validate(),
        }
    }

    /// Short description of the destination, for logs.
    pub fn destination(&self) -> String {
        match self {
            Payload::Email(p) => p
                .recipients
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(", "),
            Payload::Sms(p) => p.to.clone(),
        }
    }
}

impl From<EmailPayload> for Payload {
    fn from(p: EmailPayload) -> Self {
        Payload::Email(p)
    }
}

impl From<SmsPayload> for Payload {
    fn from(p: SmsPayload) -> Self {
        Payload::Sms(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn plain_email_is_valid() {
        let p = EmailPayload::plain(["a@x.com"], "Hi", "test");
        assert!(p.validate().is_ok());
    }

    #[test]
    fn recipients_are_trimmed_and_deduplicated() {
        let p = EmailPayload::plain([" a@x.com", "a@x.com ", "b@x.com"], "Hi", "test");
        assert_eq!(p.recipients.len(), 2);
    }

    #[test]
    fn email_without_recipients_is_rejected() {
        let p = EmailPayload::plain(Vec::<String>::new(), "Hi", "test");
        assert!(matches!(p.validate(), Err(ValidationError::NoRecipients)));
    }

    #[rstest]
    #[case("plainaddress")]
    #[case("@x.com")]
    #[case("a@")]
    #[case("a@b@x.com")]
    #[case("a@localhost")]
    #[case("a@.x.com")]
    #[case("a b@x.com")]
    fn malformed_addresses_are_rejected(#[case] addr: &str) {
        let p = EmailPayload::plain(["ok@x.com", addr], "Hi", "test");
        assert!(matches!(
            p.validate(),
            Err(ValidationError::InvalidAddress(bad)) if bad == addr.trim()
        ));
    }

    #[test]
    fn blank_subject_is_rejected() {
        let p = EmailPayload::plain(["a@x.com"], "   ", "test");
        assert!(matches!(p.validate(), Err(ValidationError::EmptySubject)));
    }

    #[test]
    fn template_needs_a_name() {
        let p = EmailPayload::template(["a@x.com"], "Hi", "", serde_json::Map::new());
        assert!(matches!(p.validate(), Err(ValidationError::EmptyTemplateName)));

        let p = EmailPayload::template(["a@x.com"], "Hi", "welcome", serde_json::Map::new());
        assert!(p.validate().is_ok());
    }

    #[rstest]
    #[case("+15550000", true)]
    #[case("15550000", true)]
    #[case("+123", false)]
    #[case("+1234567890123456", false)]
    #[case("+1 555 0000", false)]
    #[case("", false)]
    #[case("+", false)]
    fn phone_number_shapes(#[case] to: &str, #[case] ok: bool) {
        let p = SmsPayload::new(to, "test");
        assert_eq!(p.validate().is_ok(), ok, "to={to:?}");
    }

    #[test]
    fn sms_body_limits() {
        assert!(matches!(
            SmsPayload::new("+15550000", " ").validate(),
            Err(ValidationError::EmptySmsBody)
        ));
        let long = "x".repeat(MAX_SMS_BODY_CHARS + 1);
        assert!(matches!(
            SmsPayload::new("+15550000", long).validate(),
            Err(ValidationError::SmsBodyTooLong { len, max }) if len == max + 1
        ));
    }

    #[test]
    fn payload_is_tagged_by_channel() {
        let p = Payload::from(SmsPayload::new("+15550000", "test"));
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v["channel"], "sms");
        assert_eq!(v["to"], "+15550000");
        assert_eq!(p.channel(), Channel::Sms);

        let p = Payload::from(EmailPayload::plain(["a@x.com"], "Hi", "test"));
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v["channel"], "email");
        assert_eq!(v["body"]["kind"], "plain");
    }
}
