//! Logical-clock-stamped broadcast messages.
//!
//! # Wire Form
//!
//! ```text
//! {sender}-{timestamp}-{body}
//! ```
//!
//! Only the first two `-` are structural; the body may contain more. Two
//! control tags ride on top of the body:
//!
//! - `ack:{sender}-{timestamp}` acknowledges the broadcast with that identity
//! - `app:{payload}` is an application submission to the receiving process
//!
//! The tag is parsed once, at decode time, into a [`MessageKind`].
//!
//! # Ordering
//!
//! Messages are totally ordered by `(timestamp, sender)`. The sender breaks
//! ties between equal timestamps, so every process sorts the same set of
//! messages identically.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use bytes::Bytes;

use crate::error::{Error, Result};

/// Body prefix of an acknowledgment.
pub const ACK_TAG: &str = "ack:";

/// Body prefix of an application submission.
pub const APP_TAG: &str = "app:";

const SEPARATOR: char = '-';

/// Identity of a group member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct ProcessId(pub u64);

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ProcessId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Logical clock value.
pub type Timestamp = u64;

/// Identity key of one broadcast event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId {
    /// Originating process.
    pub sender: ProcessId,
    /// Sender's clock at broadcast time.
    pub timestamp: Timestamp,
}

impl MessageId {
    /// Create an identity key.
    pub const fn new(sender: ProcessId, timestamp: Timestamp) -> Self {
        Self { sender, timestamp }
    }
}

impl Ord for MessageId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.sender.cmp(&other.sender))
    }
}

impl PartialOrd for MessageId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.sender, SEPARATOR, self.timestamp)
    }
}

impl FromStr for MessageId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (sender, timestamp) = s
            .split_once(SEPARATOR)
            .ok_or_else(|| Error::Malformed(format!("identity {s:?} has no separator")))?;
        Ok(Self {
            sender: ProcessId(parse_field("sender", sender)?),
            timestamp: parse_field("timestamp", timestamp)?,
        })
    }
}

fn parse_field(name: &str, field: &str) -> Result<u64> {
    field
        .parse()
        .map_err(|_| Error::Malformed(format!("{name} {field:?} is not an integer")))
}

/// What a message means to the receiving process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    /// A peer's primary broadcast.
    Original { body: String },
    /// Acknowledgment of a previously broadcast message.
    Ack { of: MessageId },
    /// Payload injected by the local application, to be broadcast.
    AppSubmission { payload: String },
}

impl MessageKind {
    /// Classify a wire body.
    pub fn from_body(body: &str) -> Result<Self> {
        if let Some(reference) = body.strip_prefix(ACK_TAG) {
            return Ok(Self::Ack {
                of: reference.parse()?,
            });
        }
        if let Some(payload) = body.strip_prefix(APP_TAG) {
            return Ok(Self::AppSubmission {
                payload: payload.to_string(),
            });
        }
        Ok(Self::Original {
            body: body.to_string(),
        })
    }

    /// Wire body for this kind.
    pub fn body(&self) -> Cow<'_, str> {
        match self {
            Self::Original { body } => Cow::Borrowed(body),
            Self::Ack { of } => Cow::Owned(format!("{ACK_TAG}{of}")),
            Self::AppSubmission { payload } => Cow::Owned(format!("{APP_TAG}{payload}")),
        }
    }
}

/// Reserved tag an original body starts with, if any.
pub fn reserved_tag(body: &str) -> Option<&'static str> {
    [ACK_TAG, APP_TAG]
        .into_iter()
        .find(|tag| body.starts_with(tag))
}

/// An immutable broadcast event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    sender: ProcessId,
    timestamp: Timestamp,
    kind: MessageKind,
}

impl Message {
    /// Create a message of any kind.
    pub fn new(sender: ProcessId, timestamp: Timestamp, kind: MessageKind) -> Self {
        Self {
            sender,
            timestamp,
            kind,
        }
    }

    /// Primary broadcast.
    pub fn original(sender: ProcessId, timestamp: Timestamp, body: impl Into<String>) -> Self {
        Self::new(sender, timestamp, MessageKind::Original { body: body.into() })
    }

    /// Acknowledgment of `of`.
    pub fn ack(sender: ProcessId, timestamp: Timestamp, of: MessageId) -> Self {
        Self::new(sender, timestamp, MessageKind::Ack { of })
    }

    /// Application submission addressed to `sender`'s own process.
    pub fn app_submission(
        sender: ProcessId,
        timestamp: Timestamp,
        payload: impl Into<String>,
    ) -> Self {
        Self::new(
            sender,
            timestamp,
            MessageKind::AppSubmission {
                payload: payload.into(),
            },
        )
    }

    pub fn sender(&self) -> ProcessId {
        self.sender
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn kind(&self) -> &MessageKind {
        &self.kind
    }

    /// Identity key `(sender, timestamp)`.
    pub fn id(&self) -> MessageId {
        MessageId::new(self.sender, self.timestamp)
    }

    /// Wire body, including any control tag.
    pub fn body(&self) -> Cow<'_, str> {
        self.kind.body()
    }

    /// Total order: timestamp first, sender breaks ties.
    pub fn compare(&self, other: &Self) -> Ordering {
        self.id().cmp(&other.id())
    }

    /// Encode as `{sender}-{timestamp}-{body}`.
    pub fn encode(&self) -> Bytes {
        Bytes::from(format!(
            "{}{sep}{}{sep}{}",
            self.sender,
            self.timestamp,
            self.body(),
            sep = SEPARATOR
        ))
    }

    /// Decode a wire frame.
    ///
    /// A frame with only `{sender}-{timestamp}` decodes to an original with
    /// an empty body.
    pub fn decode(raw: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(raw)
            .map_err(|e| Error::Malformed(format!("frame is not UTF-8: {e}")))?;
        let mut fields = text.splitn(3, SEPARATOR);

        let sender = fields.next().unwrap_or_default();
        let timestamp = fields
            .next()
            .ok_or_else(|| Error::Malformed(format!("frame {text:?} has fewer than two fields")))?;
        let body = fields.next().unwrap_or_default();

        Ok(Self {
            sender: ProcessId(parse_field("sender", sender)?),
            timestamp: parse_field("timestamp", timestamp)?,
            kind: MessageKind::from_body(body)?,
        })
    }
}
