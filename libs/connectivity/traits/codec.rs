use crate::core::message::{Message, MSG_TYPE};
use crate::error::{ConnectivityError, Result};

/// Encode/decode contract between structured messages and wire text
///
/// Implementations must be usable from several threads at once: the receiver
/// worker decodes while callers of `send_message` encode.
pub trait Codec: Send + Sync {
    /// Short codec name used in logs
    fn name(&self) -> &str;

    /// Turn a message into wire text
    ///
    /// # Errors
    /// `ConnectivityError::Encode` when the message violates the codec's rules
    fn encode(&self, message: &Message) -> Result<String>;

    /// Turn wire text into a message
    ///
    /// `msg_type` is the expected type, when the caller knows it. Without it
    /// the codec resolves the type on its own.
    ///
    /// # Errors
    /// `ConnectivityError::Decode` when the text can't be resolved or parsed
    fn decode(&self, text: &str, msg_type: Option<&str>) -> Result<Message>;
}

/// Codec that keeps the wire text as-is in a single field
///
/// Used where a message needs a structured view but no dictionary exists.
pub struct RawTextCodec;

impl RawTextCodec {
    /// Field holding the raw text
    pub const MESSAGE_FIELD: &'static str = "Message";
}

impl Codec for RawTextCodec {
    fn name(&self) -> &str {
        "RawText"
    }

    fn encode(&self, message: &Message) -> Result<String> {
        message
            .field(Self::MESSAGE_FIELD)
            .map(str::to_string)
            .ok_or_else(|| {
                ConnectivityError::Encode(format!("Field '{}' is absent", Self::MESSAGE_FIELD))
            })
    }

    fn decode(&self, text: &str, msg_type: Option<&str>) -> Result<Message> {
        let mut builder = Message::builder();
        builder.field(Self::MESSAGE_FIELD, text);
        if let Some(t) = msg_type {
            builder.field(MSG_TYPE, t);
        }
        Ok(builder.build())
    }
}
