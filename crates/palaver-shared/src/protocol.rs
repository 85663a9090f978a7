//! Wire protocol for the palaver relay.
//!
//! Every record crosses the wire as one newline-terminated line of four
//! pipe-delimited fields:
//!
//! ```text
//! TYPE|SENDER_OR_LABEL|CONTENT|TIMESTAMP
//! ```
//!
//! The format defines no escaping rule, so a delimiter inside a field would
//! shift the field boundaries for every reader. [`Frame::new`] therefore
//! replaces the delimiter in the sender and content fields with a space,
//! and [`Frame::decode`] rejects any line that does not split into exactly
//! four fields. A length-prefixed or escaped encoding would lift the
//! restriction but is not part of the protocol today.

use crate::constants::FIELD_SEPARATOR;
use crate::error::ProtocolError;

/// The eight record kinds the relay emits or accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// A user joined; broadcast to everyone.
    UserJoin,
    /// A user left; broadcast to the remaining peers.
    UserLeave,
    /// Ordinary chat text; broadcast to everyone.
    Chat,
    /// Server-originated notice addressed to one peer or everyone.
    Server,
    /// Greeting sent to a freshly registered peer.
    Welcome,
    /// Comma-joined list of online names, sent at registration.
    UserList,
    /// Direct message between two peers.
    Private,
    /// Negative reply to the originating peer only.
    Error,
}

impl MessageKind {
    /// Canonical wire spelling of the TYPE field.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::UserJoin => "USER_JOIN",
            MessageKind::UserLeave => "USER_LEAVE",
            MessageKind::Chat => "CHAT_MESSAGE",
            MessageKind::Server => "SERVER_MESSAGE",
            MessageKind::Welcome => "WELCOME",
            MessageKind::UserList => "USER_LIST",
            MessageKind::Private => "PRIVATE",
            MessageKind::Error => "ERROR",
        }
    }

    /// Parse a wire TYPE field.
    ///
    /// `CHAT` and `SYSTEM` are accepted as the short spellings of
    /// `CHAT_MESSAGE` and `SERVER_MESSAGE`.
    pub fn from_wire(s: &str) -> Result<Self, ProtocolError> {
        match s {
            "USER_JOIN" => Ok(MessageKind::UserJoin),
            "USER_LEAVE" => Ok(MessageKind::UserLeave),
            "CHAT_MESSAGE" | "CHAT" => Ok(MessageKind::Chat),
            "SERVER_MESSAGE" | "SYSTEM" => Ok(MessageKind::Server),
            "WELCOME" => Ok(MessageKind::Welcome),
            "USER_LIST" => Ok(MessageKind::UserList),
            "PRIVATE" => Ok(MessageKind::Private),
            "ERROR" => Ok(MessageKind::Error),
            other => Err(ProtocolError::UnknownKind(other.to_string())),
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One wire record. Constructed per send, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: MessageKind,
    pub sender: String,
    pub content: String,
    pub timestamp: String,
}

impl Frame {
    /// Build a record, replacing any field delimiter inside the sender and
    /// content fields with a space so the line stays parseable.
    pub fn new(
        kind: MessageKind,
        sender: impl Into<String>,
        content: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            sender: sanitize(sender.into()),
            content: sanitize(content.into()),
            timestamp: timestamp.into(),
        }
    }

    /// Render the record as one wire line (no trailing newline).
    pub fn encode(&self) -> String {
        format!(
            "{kind}{sep}{sender}{sep}{content}{sep}{ts}",
            kind = self.kind.as_str(),
            sender = self.sender,
            content = self.content,
            ts = self.timestamp,
            sep = FIELD_SEPARATOR,
        )
    }

    /// Parse one wire line. Lines that do not split into exactly four
    /// fields are rejected rather than guessed at.
    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return Err(ProtocolError::Empty);
        }

        let fields: Vec<&str> = line.split(FIELD_SEPARATOR).collect();
        if fields.len() != 4 {
            return Err(ProtocolError::FieldCount(fields.len()));
        }

        Ok(Self {
            kind: MessageKind::from_wire(fields[0])?,
            sender: fields[1].to_string(),
            content: fields[2].to_string(),
            timestamp: fields[3].to_string(),
        })
    }
}

fn sanitize(field: String) -> String {
    if field.contains(FIELD_SEPARATOR) {
        field.replace(FIELD_SEPARATOR, " ")
    } else {
        field
    }
}
