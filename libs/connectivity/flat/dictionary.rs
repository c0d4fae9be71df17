//! Fixed-width message dictionary
//!
//! ```yaml
//! messages:
//!   - type: ORDER
//!     type_conditions:
//!       - value: "^A"
//!     conditions:
//!       - value: "CANCEL"
//!         invert: true
//!     fields:
//!       - { name: ID, position: 1, length: 5 }
//!       - { name: QTY, position: 6, length: 4, alignment: right }
//! ```
//!
//! Positions are 1-based. Each field must start at or after the end of the
//! previous one. Types are auto-detected in declaration order.

use crate::error::{ConnectivityError, Result};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, trace};

/// Side a value sticks to inside its field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum Alignment {
    #[default]
    Left,
    Right,
}

impl TryFrom<String> for Alignment {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(Alignment::Left),
            "right" => Ok(Alignment::Right),
            _ => Err(format!("unknown alignment '{}', expected 'left' or 'right'", value)),
        }
    }
}

/// One positional field
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FieldDesc {
    pub name: String,
    /// 1-based start column
    pub position: usize,
    pub length: usize,
    #[serde(default)]
    pub alignment: Alignment,
}

impl FieldDesc {
    /// 0-based start offset
    pub fn start(&self) -> usize {
        self.position - 1
    }

    /// 0-based offset just past the field
    pub fn end(&self) -> usize {
        self.start() + self.length
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ConditionDef {
    value: String,
    #[serde(default)]
    invert: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct MessageDef {
    #[serde(rename = "type")]
    msg_type: String,
    #[serde(default)]
    type_conditions: Vec<ConditionDef>,
    #[serde(default)]
    conditions: Vec<ConditionDef>,
    #[serde(default)]
    fields: Vec<FieldDesc>,
}

#[derive(Debug, Clone, Deserialize)]
struct DictionaryDef {
    #[serde(default)]
    messages: Vec<MessageDef>,
}

/// Regular expression that must be found in (or absent from) the raw text
#[derive(Debug, Clone)]
pub struct RegexCondition {
    regex: Regex,
    invert: bool,
}

impl RegexCondition {
    pub fn new(pattern: &str, invert: bool) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|e| {
            ConnectivityError::DictionaryLoad(format!("Invalid condition '{}': {}", pattern, e))
        })?;
        Ok(Self { regex, invert })
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    pub fn is_inverted(&self) -> bool {
        self.invert
    }

    pub fn is_met(&self, text: &str) -> bool {
        self.regex.is_match(text) != self.invert
    }
}

impl std::fmt::Display for RegexCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.invert {
            write!(f, "not '{}'", self.regex.as_str())
        } else {
            write!(f, "'{}'", self.regex.as_str())
        }
    }
}

/// Layout of one message type
#[derive(Debug, Clone)]
pub struct FlatMessageDesc {
    msg_type: String,
    fields: Vec<FieldDesc>,
    type_conditions: Vec<RegexCondition>,
    conditions: Vec<RegexCondition>,
}

impl FlatMessageDesc {
    pub fn msg_type(&self) -> &str {
        &self.msg_type
    }

    pub fn fields(&self) -> &[FieldDesc] {
        &self.fields
    }

    pub fn type_conditions(&self) -> &[RegexCondition] {
        &self.type_conditions
    }

    pub fn conditions(&self) -> &[RegexCondition] {
        &self.conditions
    }

    /// Whether `text` looks like this type
    ///
    /// A type without detection conditions never matches.
    pub fn fits(&self, text: &str) -> bool {
        !self.type_conditions.is_empty() && self.type_conditions.iter().all(|c| c.is_met(text))
    }

    /// Minimum length of a message of this type, in characters
    pub fn min_length(&self) -> usize {
        self.fields.last().map(FieldDesc::end).unwrap_or(0)
    }

    fn compile(def: MessageDef) -> Result<Self> {
        if def.msg_type.trim().is_empty() {
            return Err(ConnectivityError::DictionaryLoad(
                "Message definition without type".to_string(),
            ));
        }

        let mut previous: Option<&FieldDesc> = None;
        for field in &def.fields {
            if field.position == 0 {
                return Err(ConnectivityError::DictionaryLoad(format!(
                    "Field '{}' of type '{}': positions start at 1",
                    field.name, def.msg_type
                )));
            }
            if field.length == 0 {
                return Err(ConnectivityError::DictionaryLoad(format!(
                    "Field '{}' of type '{}' has zero length",
                    field.name, def.msg_type
                )));
            }
            if let Some(prev) = previous {
                if field.start() < prev.end() {
                    return Err(ConnectivityError::DictionaryLoad(format!(
                        "Field '{}' of type '{}' starts at {}, before the end of field '{}' ({})",
                        field.name,
                        def.msg_type,
                        field.position,
                        prev.name,
                        prev.end() + 1
                    )));
                }
            }
            previous = Some(field);
        }

        let build = |defs: &[ConditionDef]| -> Result<Vec<RegexCondition>> {
            defs.iter().map(|c| RegexCondition::new(&c.value, c.invert)).collect()
        };
        let type_conditions = build(&def.type_conditions)?;
        let conditions = build(&def.conditions)?;

        Ok(Self {
            msg_type: def.msg_type,
            fields: def.fields,
            type_conditions,
            conditions,
        })
    }
}

/// Validated set of fixed-width message layouts
#[derive(Debug, Clone)]
pub struct FlatDictionary {
    descs: Vec<FlatMessageDesc>,
    by_type: HashMap<String, usize>,
}

impl FlatDictionary {
    /// Load and validate a YAML dictionary file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        trace!("Reading dictionary from file '{}'", path.display());
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConnectivityError::DictionaryLoad(format!("Failed to read '{}': {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    /// Parse and validate a YAML dictionary
    pub fn from_yaml(content: &str) -> Result<Self> {
        let def: DictionaryDef = serde_yaml::from_str(content).map_err(|e| {
            ConnectivityError::DictionaryLoad(format!("Error occurred while loading dictionary: {}", e))
        })?;

        let mut descs = Vec::with_capacity(def.messages.len());
        let mut by_type = HashMap::with_capacity(def.messages.len());
        for message in def.messages {
            let desc = FlatMessageDesc::compile(message)?;
            if by_type.contains_key(desc.msg_type()) {
                return Err(ConnectivityError::DictionaryLoad(format!(
                    "Dictionary contains multiple descriptions of type '{}'",
                    desc.msg_type()
                )));
            }
            by_type.insert(desc.msg_type().to_string(), descs.len());
            descs.push(desc);
        }

        debug!("Dictionary loaded with {} message type(s)", descs.len());
        Ok(Self { descs, by_type })
    }

    pub fn message_desc(&self, msg_type: &str) -> Option<&FlatMessageDesc> {
        self.by_type.get(msg_type).map(|&i| &self.descs[i])
    }

    /// Layouts in declaration order
    pub fn message_descs(&self) -> &[FlatMessageDesc] {
        &self.descs
    }

    /// First type, in declaration order, whose detection conditions hold
    pub fn find_fitting(&self, text: &str) -> Option<&FlatMessageDesc> {
        self.descs.iter().find(|d| d.fits(text))
    }

    pub fn len(&self) -> usize {
        self.descs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_preserves_declaration_order() {
        let dict = FlatDictionary::from_yaml(
            r#"
messages:
  - type: TRADE
    type_conditions: [{ value: "^T" }]
    fields: [{ name: ID, position: 1, length: 3 }]
  - type: ORDER
    type_conditions: [{ value: "^O" }]
    fields:
      - { name: ID, position: 1, length: 5, alignment: LEFT }
      - { name: QTY, position: 8, length: 4, alignment: Right }
"#,
        )
        .unwrap();

        let types: Vec<&str> = dict.message_descs().iter().map(|d| d.msg_type()).collect();
        assert_eq!(types, vec!["TRADE", "ORDER"]);

        let order = dict.message_desc("ORDER").unwrap();
        assert_eq!(order.fields()[0].alignment, Alignment::Left);
        assert_eq!(order.fields()[1].alignment, Alignment::Right);
        assert_eq!(order.min_length(), 11);
    }

    #[test]
    fn test_alignment_defaults_to_left() {
        let dict = FlatDictionary::from_yaml(
            "messages: [{ type: A, fields: [{ name: X, position: 1, length: 2 }] }]",
        )
        .unwrap();
        assert_eq!(dict.message_desc("A").unwrap().fields()[0].alignment, Alignment::Left);
    }

    #[test]
    fn test_rejects_overlapping_fields() {
        let err = FlatDictionary::from_yaml(
            r#"
messages:
  - type: ORDER
    fields:
      - { name: ID, position: 1, length: 5 }
      - { name: QTY, position: 4, length: 4 }
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConnectivityError::DictionaryLoad(_)));
        assert!(err.to_string().contains("QTY"));
    }

    #[test]
    fn test_rejects_unknown_alignment() {
        let err = FlatDictionary::from_yaml(
            "messages: [{ type: A, fields: [{ name: X, position: 1, length: 2, alignment: center }] }]",
        )
        .unwrap_err();
        assert!(matches!(err, ConnectivityError::DictionaryLoad(_)));
    }

    #[test]
    fn test_rejects_invalid_layouts() {
        let cases = [
            "messages: [{ type: A }, { type: A }]",
            "messages: [{ type: A, fields: [{ name: X, position: 0, length: 2 }] }]",
            "messages: [{ type: A, fields: [{ name: X, position: 1, length: 0 }] }]",
            "messages: [{ type: A, type_conditions: [{ value: '([' }] }]",
            "messages: [{ type: '' }]",
        ];
        for yaml in cases {
            assert!(
                matches!(FlatDictionary::from_yaml(yaml), Err(ConnectivityError::DictionaryLoad(_))),
                "accepted: {}",
                yaml
            );
        }
    }

    #[test]
    fn test_conditions_use_find_semantics() {
        let found = RegexCondition::new("QTY", false).unwrap();
        assert!(found.is_met("ORDER QTY 5"));
        assert!(!found.is_met("ORDER"));

        let inverted = RegexCondition::new("CANCEL", true).unwrap();
        assert!(inverted.is_met("ORDER"));
        assert!(!inverted.is_met("CANCEL ORDER"));
    }

    #[test]
    fn test_type_without_conditions_never_fits() {
        let dict = FlatDictionary::from_yaml("messages: [{ type: A }]").unwrap();
        assert!(!dict.message_desc("A").unwrap().fits("anything"));
        assert!(dict.find_fitting("anything").is_none());
    }
}
