//! Queue/persistence unit: wire payload plus metadata

use crate::core::message::Message;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Direction of a message relative to this side of the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Sent,
    Received,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Sent => write!(f, "SENT"),
            Direction::Received => write!(f, "RECEIVED"),
        }
    }
}

/// Message metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub direction: Direction,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
}

impl Metadata {
    /// Metadata stamped with the current time
    pub fn now(direction: Direction) -> Self {
        Self {
            direction,
            timestamp: Utc::now(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }
}

/// A message as it travels through queues and onto disk
///
/// `payload` is the wire text. `message` is the decoded form, present when the
/// client decoded it (or when the caller sent a structured message).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedMessage {
    pub payload: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    pub metadata: Metadata,
}

impl EncodedMessage {
    pub fn new(payload: impl Into<String>, message: Option<Message>, metadata: Metadata) -> Self {
        Self {
            payload: payload.into(),
            message,
            metadata,
        }
    }

    /// Received message stamped with the arrival time
    pub fn new_received(payload: impl Into<String>) -> Self {
        Self::new(payload, None, Metadata::now(Direction::Received))
    }

    /// Sent message stamped with the current time
    pub fn new_sent(payload: impl Into<String>) -> Self {
        Self::new(payload, None, Metadata::now(Direction::Sent))
    }

    pub fn with_message(mut self, message: Message) -> Self {
        self.message = Some(message);
        self
    }

    /// Copy for send listeners: SENT direction, fresh timestamp, same metadata fields
    pub fn to_sent_copy(&self) -> Self {
        Self {
            payload: self.payload.clone(),
            message: self.message.clone(),
            metadata: Metadata {
                direction: Direction::Sent,
                timestamp: Utc::now(),
                fields: self.metadata.fields.clone(),
            },
        }
    }

    #[inline]
    pub fn direction(&self) -> Direction {
        self.metadata.direction
    }

    #[inline]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.metadata.timestamp
    }

    #[inline]
    pub fn is_received(&self) -> bool {
        self.metadata.direction == Direction::Received
    }
}
