//! Decoded message records handed to the aggregator.

use chrono::{DateTime, Utc};

use super::address::EmailAddress;

/// Whether a message was sent from this mailbox or received into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Sent,
    Received,
}

/// One message as produced by a message source.
///
/// Read-only to the aggregator.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Message {
    /// Byte offset of the record in its archive, or the file index for EML sources.
    pub offset: u64,

    /// `Message-ID` header without angle brackets, if present.
    pub message_id: Option<String>,

    /// Sender (first `From:` address).
    pub sender: EmailAddress,

    /// `To`, `Cc` and `Bcc` recipients, in that order.
    pub recipients: Vec<EmailAddress>,

    /// Parsed `Date:` header, falling back to the MBOX separator date.
    pub date: Option<DateTime<Utc>>,

    /// Decoded subject line.
    pub subject: String,

    /// Plain-text body, already truncated to the configured limit.
    pub body: String,

    /// Gmail labels from `X-Gmail-Labels`.
    pub labels: Vec<String>,

    pub direction: Direction,
}

impl Message {
    /// Minimal sent message, mostly for tests and benchmarks.
    pub fn sent(
        sender: &str,
        recipients: &str,
        date: Option<DateTime<Utc>>,
        subject: &str,
        body: &str,
    ) -> Self {
        Self {
            offset: 0,
            message_id: None,
            sender: EmailAddress::parse(sender),
            recipients: EmailAddress::parse_list(recipients),
            date,
            subject: subject.to_string(),
            body: body.to_string(),
            labels: Vec::new(),
            direction: Direction::Sent,
        }
    }

    /// Builder-style setter for the `Message-ID`.
    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    /// Builder-style setter for the direction flag.
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn is_sent(&self) -> bool {
        self.direction == Direction::Sent
    }
}
