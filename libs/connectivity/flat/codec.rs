use crate::core::message::{Message, MSG_TYPE};
use crate::error::{ConnectivityError, Result};
use crate::flat::dictionary::{Alignment, FlatDictionary, FlatMessageDesc};
use crate::traits::Codec;
use std::sync::Arc;
use tracing::trace;

/// Dictionary-driven fixed-width codec
///
/// Fields are placed by column; gaps between fields are spaces. Values longer
/// than their field are cut, shorter ones padded on the side opposite to the
/// field's alignment.
#[derive(Debug, Clone)]
pub struct FlatMessageCodec {
    dictionary: Arc<FlatDictionary>,
}

impl FlatMessageCodec {
    pub const NAME: &'static str = "Flat";

    pub fn new(dictionary: Arc<FlatDictionary>) -> Self {
        Self { dictionary }
    }

    pub fn dictionary(&self) -> &FlatDictionary {
        &self.dictionary
    }

    fn resolve_desc(&self, text: &str, msg_type: Option<&str>) -> Result<&FlatMessageDesc> {
        match msg_type {
            None => self.dictionary.find_fitting(text).ok_or_else(|| {
                ConnectivityError::Decode("Message definition not found in dictionary.".to_string())
            }),
            Some(msg_type) => {
                let desc = self.dictionary.message_desc(msg_type).ok_or_else(|| {
                    ConnectivityError::Decode(format!(
                        "Message definition with type '{}' not found in dictionary.",
                        msg_type
                    ))
                })?;
                // Explicit types are checked against whatever detection conditions they declare
                if desc.type_conditions().iter().all(|c| c.is_met(text)) {
                    Ok(desc)
                } else {
                    Err(ConnectivityError::Decode(format!(
                        "Message definition with type '{}' doesn't fit.",
                        msg_type
                    )))
                }
            }
        }
    }
}

impl Codec for FlatMessageCodec {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn encode(&self, message: &Message) -> Result<String> {
        trace!("Trying to encode Flat message:\n{}", message);

        let msg_type = message.msg_type().filter(|t| !t.is_empty()).ok_or_else(|| {
            ConnectivityError::Encode(format!(
                "Unable to identify message. Field '{}' is absent.",
                MSG_TYPE
            ))
        })?;
        let desc = self.dictionary.message_desc(msg_type).ok_or_else(|| {
            ConnectivityError::Encode(format!(
                "Message definition with type '{}' not found in dictionary.",
                msg_type
            ))
        })?;

        let mut result = String::with_capacity(desc.min_length());
        let mut cursor = 0;
        for field in desc.fields() {
            if field.start() > cursor {
                push_spaces(&mut result, field.start() - cursor);
            }
            cursor = field.end();

            let value: String = message.field(&field.name).unwrap_or("").chars().take(field.length).collect();
            let padding = field.length - value.chars().count();
            match field.alignment {
                Alignment::Left => {
                    result.push_str(&value);
                    push_spaces(&mut result, padding);
                }
                Alignment::Right => {
                    push_spaces(&mut result, padding);
                    result.push_str(&value);
                }
            }
        }

        trace!("Encoded message:\n{}", result);
        Ok(result)
    }

    fn decode(&self, text: &str, msg_type: Option<&str>) -> Result<Message> {
        trace!("Trying to decode Flat message:\n{}", text);

        let desc = self.resolve_desc(text, msg_type)?;
        if let Some(failed) = desc.conditions().iter().find(|c| !c.is_met(text)) {
            return Err(ConnectivityError::Decode(format!(
                "Message of type '{}' doesn't meet condition {}",
                desc.msg_type(),
                failed
            )));
        }

        let chars: Vec<char> = text.chars().collect();
        let mut builder = Message::builder();
        for field in desc.fields() {
            if field.end() > chars.len() {
                return Err(ConnectivityError::Decode(format!(
                    "Unexpected end of message: expected it to be at least {} characters long",
                    field.end()
                )));
            }
            let value: String = chars[field.start()..field.end()].iter().collect();
            builder.field(field.name.as_str(), value);
        }
        builder.msg_type(desc.msg_type());

        Ok(builder.build())
    }
}

fn push_spaces(target: &mut String, count: usize) {
    target.extend(std::iter::repeat(' ').take(count));
}

#[cfg(test)]
mod tests {
    use super::*;

    const DICTIONARY: &str = r#"
messages:
  - type: ORDER
    type_conditions: [{ value: "^A" }]
    fields:
      - { name: ID, position: 1, length: 5 }
      - { name: QTY, position: 6, length: 4, alignment: right }
  - type: GAPPED
    type_conditions: [{ value: "^G" }]
    conditions: [{ value: "X$", invert: true }]
    fields:
      - { name: CODE, position: 1, length: 2 }
      - { name: PRICE, position: 5, length: 3, alignment: right }
"#;

    fn codec() -> FlatMessageCodec {
        FlatMessageCodec::new(Arc::new(FlatDictionary::from_yaml(DICTIONARY).unwrap()))
    }

    #[test]
    fn test_encode_pads_and_truncates() {
        let codec = codec();
        let short = Message::builder().msg_type("ORDER").field("ID", "A1").field("QTY", "7").build();
        assert_eq!(codec.encode(&short).unwrap(), "A1      7");

        let long = Message::builder()
            .msg_type("ORDER")
            .field("ID", "A1234567")
            .field("QTY", "123456")
            .build();
        assert_eq!(codec.encode(&long).unwrap(), "A12341234");
    }

    #[test]
    fn test_encode_fills_gaps_and_missing_fields() {
        let message = Message::builder().msg_type("GAPPED").field("PRICE", "9").build();
        assert_eq!(codec().encode(&message).unwrap(), "      9");
    }

    #[test]
    fn test_encode_errors() {
        let codec = codec();
        let untyped = Message::builder().field("ID", "A1").build();
        let err = codec.encode(&untyped).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Encode error: Unable to identify message. Field 'MsgType' is absent."
        );

        let unknown = Message::builder().msg_type("NOPE").build();
        assert!(matches!(codec.encode(&unknown), Err(ConnectivityError::Encode(_))));
    }

    #[test]
    fn test_decode_auto_detects_type() {
        let message = codec().decode("A1      7", None).unwrap();
        assert_eq!(message.msg_type(), Some("ORDER"));
        assert_eq!(message.field("ID"), Some("A1   "));
        assert_eq!(message.field("QTY"), Some("   7"));
    }

    #[test]
    fn test_decode_errors() {
        let codec = codec();
        assert!(matches!(codec.decode("Z1      7", None), Err(ConnectivityError::Decode(_))));
        assert!(matches!(codec.decode("A1      7", Some("GAPPED")), Err(ConnectivityError::Decode(_))));
        assert!(matches!(codec.decode("A1      7", Some("NOPE")), Err(ConnectivityError::Decode(_))));

        let err = codec.decode("A1", None).unwrap_err();
        assert!(err.to_string().contains("at least 5 characters"), "{}", err);

        assert!(matches!(codec.decode("G1    9X", None), Err(ConnectivityError::Decode(_))));
    }

    #[test]
    fn test_decode_counts_characters() {
        let message = codec().decode("Aé    €42", None).unwrap();
        assert_eq!(message.field("ID"), Some("Aé   "));
        assert_eq!(message.field("QTY"), Some(" €42"));
    }
}
