//! Structured message model
//!
//! A [`Message`] is an ordered list of string fields plus named sub-messages
//! (repeating groups). Messages are immutable: they are produced by a
//! [`MessageBuilder`], and building never shares storage with the builder, so
//! a builder can be reused without touching messages it already produced.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reserved field holding the message type
pub const MSG_TYPE: &str = "MsgType";

/// Reserved field holding the type of a sub-message
pub const SUB_MSG_TYPE: &str = "SubMsgType";

/// Immutable structured message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    fields: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    sub_messages: Vec<Message>,
}

impl Message {
    /// Start building a new message
    pub fn builder() -> MessageBuilder {
        MessageBuilder::new()
    }

    /// Get a field value by name
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Check whether a field is present
    pub fn contains_field(&self, name: &str) -> bool {
        self.fields.iter().any(|(n, _)| n == name)
    }

    /// Iterate fields in insertion order
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Field names in insertion order
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    /// Number of fields (sub-messages not included)
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.sub_messages.is_empty()
    }

    /// The `MsgType` field, if set
    pub fn msg_type(&self) -> Option<&str> {
        self.field(MSG_TYPE)
    }

    /// The `SubMsgType` field, if set
    pub fn sub_msg_type(&self) -> Option<&str> {
        self.field(SUB_MSG_TYPE)
    }

    /// All sub-messages in insertion order
    pub fn sub_messages(&self) -> &[Message] {
        &self.sub_messages
    }

    /// Sub-messages whose `SubMsgType` equals `sub_type`
    pub fn sub_messages_of<'a>(&'a self, sub_type: &'a str) -> impl Iterator<Item = &'a Message> {
        self.sub_messages
            .iter()
            .filter(move |m| m.sub_msg_type() == Some(sub_type))
    }

    /// Builder pre-filled with this message's content
    pub fn to_builder(&self) -> MessageBuilder {
        MessageBuilder {
            fields: self.fields.clone(),
            sub_messages: self.sub_messages.clone(),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_indented(self, f, 0)
    }
}

fn write_indented(message: &Message, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
    let indent = "  ".repeat(depth);
    for (name, value) in &message.fields {
        writeln!(f, "{}{} = {}", indent, name, value)?;
    }
    for sub in &message.sub_messages {
        writeln!(f, "{}Sub-message '{}':", indent, sub.sub_msg_type().unwrap_or(""))?;
        write_indented(sub, f, depth + 1)?;
    }
    Ok(())
}

/// Builder for [`Message`]
///
/// Setting a field twice replaces its value but keeps its original position.
#[derive(Debug, Clone, Default)]
pub struct MessageBuilder {
    fields: Vec<(String, String)>,
    sub_messages: Vec<Message>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field
    pub fn field(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.fields.push((name, value)),
        }
        self
    }

    /// Set the `MsgType` field
    pub fn msg_type(&mut self, msg_type: impl Into<String>) -> &mut Self {
        self.field(MSG_TYPE, msg_type)
    }

    /// Remove a field if present
    pub fn remove_field(&mut self, name: &str) -> &mut Self {
        self.fields.retain(|(n, _)| n != name);
        self
    }

    /// Append a sub-message; its `SubMsgType` is set to `sub_type`
    pub fn sub_message(&mut self, sub_type: impl Into<String>, sub: Message) -> &mut Self {
        let mut builder = sub.to_builder();
        builder.field(SUB_MSG_TYPE, sub_type);
        self.sub_messages.push(builder.build());
        self
    }

    /// Produce a message; the builder keeps its content and can be reused
    pub fn build(&self) -> Message {
        Message {
            fields: self.fields.clone(),
            sub_messages: self.sub_messages.clone(),
        }
    }
}
