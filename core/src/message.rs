//! Server-reported messages and the error map derived from them.
//!
//! Every response body may carry a `messages` array. Each element becomes
//! one immutable `Message`. Error-level messages are grouped by `context`
//! into an `ErrorMap`, which is how validation and business-rule failures
//! reach the caller.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Context used for errors that do not apply to a specific field.
pub const BASE_CONTEXT: &str = "base";

/// Severity of a message. Unrecognised levels are kept verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "String")]
pub enum Level {
    Error,
    Warning,
    #[default]
    Info,
    Other(String),
}

impl Level {
    pub fn as_str(&self) -> &str {
        match self {
            Level::Error => "error",
            Level::Warning => "warning",
            Level::Info => "info",
            Level::Other(level) => level,
        }
    }
}

impl From<Option<String>> for Level {
    fn from(level: Option<String>) -> Self {
        match level.as_deref() {
            None => Level::Info,
            Some("error") => Level::Error,
            Some("warning") => Level::Warning,
            Some("info") => Level::Info,
            Some(other) => Level::Other(other.to_string()),
        }
    }
}

impl From<Level> for String {
    fn from(level: Level) -> Self {
        level.as_str().to_string()
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a response's `messages` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, deserialize_with = "null_as_default")]
    code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sub_code: Option<String>,
    #[serde(default)]
    level: Level,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    context: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    message: String,
    /// Extension keys such as `entity_id`.
    #[serde(flatten)]
    attributes: Map<String, Value>,
}

/// A JSON `null` reads as the type's default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl Message {
    pub fn new(
        code: impl Into<String>,
        level: Level,
        context: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            sub_code: None,
            level,
            context,
            message: message.into(),
            attributes: Map::new(),
        }
    }

    /// Decode a single element of a `messages` array.
    pub fn from_value(value: &Value) -> Result<Self> {
        if !value.is_object() {
            return Err(Error::Decode(format!("message is not an object: {value}")));
        }
        Ok(Message::deserialize(value)?)
    }

    /// Decode a whole `messages` array.
    pub fn parse(raw: &[Value]) -> Result<Vec<Message>> {
        raw.iter().map(Message::from_value).collect()
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn sub_code(&self) -> Option<&str> {
        self.sub_code.as_deref()
    }

    pub fn level(&self) -> &Level {
        &self.level
    }

    pub fn is_error(&self) -> bool {
        self.level == Level::Error
    }

    /// Dotted field path the message applies to, e.g. `card.number`.
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.context {
            Some(context) => write!(f, "[{}] {}: {}", self.level, context, self.message),
            None => write!(f, "[{}] {}", self.level, self.message),
        }
    }
}

/// Error-level message texts grouped by context.
///
/// Contexts are kept in first-seen order and texts in encounter order. An
/// empty map means the record has no errors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ErrorMap {
    entries: IndexMap<String, Vec<String>>,
}

impl ErrorMap {
    pub fn from_messages<'a>(messages: impl IntoIterator<Item = &'a Message>) -> Self {
        let mut entries: IndexMap<String, Vec<String>> = IndexMap::new();
        for msg in messages.into_iter().filter(|m| m.is_error()) {
            let context = match msg.context() {
                Some(c) if !c.is_empty() => c,
                _ => BASE_CONTEXT,
            };
            entries
                .entry(context.to_string())
                .or_default()
                .push(msg.message().to_string());
        }
        ErrorMap { entries }
    }

    pub fn get(&self, context: &str) -> Option<&[String]> {
        self.entries.get(context).map(Vec::as_slice)
    }

    /// Errors that do not apply to a specific field.
    pub fn base(&self) -> Option<&[String]> {
        self.get(BASE_CONTEXT)
    }

    pub fn contains(&self, context: &str) -> bool {
        self.entries.contains_key(context)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of distinct contexts.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(c, texts)| (c.as_str(), texts.as_slice()))
    }

    /// Every error text, flattened in map order.
    pub fn full_messages(&self) -> Vec<&str> {
        self.entries
            .values()
            .flat_map(|texts| texts.iter().map(String::as_str))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn sample() -> Vec<Value> {
        vec![
            json!({"level": "error", "context": "card.number", "code": "card_number_blank", "message": "Card number cannot be blank"}),
            json!({"level": "error", "context": "card.number", "code": "other", "message": "extra"}),
            json!({"level": "warning", "context": "x", "code": "w", "message": "ignored"}),
        ]
    }

    #[test]
    fn parse_maps_known_keys_and_keeps_extensions() {
        let raw = vec![json!({
            "code": "resource_not_found",
            "sub_code": "token_consumed",
            "level": "error",
            "context": "TokenEntity[abc]",
            "message": "Requested resource not found",
            "entity_id": "abc"
        })];
        let messages = Message::parse(&raw).unwrap();
        assert_eq!(messages.len(), 1);
        let msg = &messages[0];
        assert_eq!(msg.code(), "resource_not_found");
        assert_eq!(msg.sub_code(), Some("token_consumed"));
        assert_eq!(msg.level(), &Level::Error);
        assert_eq!(msg.context(), Some("TokenEntity[abc]"));
        assert_eq!(msg.message(), "Requested resource not found");
        assert_eq!(msg.attribute("entity_id"), Some(&json!("abc")));
        assert!(msg.attribute("code").is_none());
    }

    #[test]
    fn unknown_level_passes_through() {
        let msg = Message::from_value(&json!({"code": "c", "level": "debug", "message": "m"})).unwrap();
        assert_eq!(msg.level(), &Level::Other("debug".into()));
        assert_eq!(serde_json::to_value(&msg).unwrap()["level"], "debug");
    }

    #[test]
    fn missing_level_defaults_to_info() {
        let msg = Message::from_value(&json!({"code": "c", "message": "m"})).unwrap();
        assert_eq!(msg.level(), &Level::Info);
    }

    #[test]
    fn non_object_message_is_rejected() {
        let err = Message::from_value(&json!("oops")).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn error_map_groups_error_level_by_context() {
        let messages = Message::parse(&sample()).unwrap();
        let errors = ErrorMap::from_messages(&messages);
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors.get("card.number").unwrap(),
            ["Card number cannot be blank", "extra"]
        );
        assert!(!errors.contains("x"));
        assert_eq!(
            serde_json::to_value(&errors).unwrap(),
            json!({"card.number": ["Card number cannot be blank", "extra"]})
        );
    }

    #[test]
    fn missing_or_empty_context_groups_under_base() {
        let raw = vec![
            json!({"level": "error", "code": "a", "message": "Amount to capture exceeds the authorized amount"}),
            json!({"level": "error", "context": "", "code": "b", "message": "second"}),
        ];
        let messages = Message::parse(&raw).unwrap();
        let errors = ErrorMap::from_messages(&messages);
        assert_eq!(
            errors.base().unwrap(),
            ["Amount to capture exceeds the authorized amount", "second"]
        );
    }

    #[test]
    fn only_non_error_messages_yield_empty_map() {
        let raw = vec![
            json!({"level": "info", "code": "card_cvv_matched", "message": "CVV matched"}),
            json!({"level": "warning", "code": "w", "message": "careful"}),
        ];
        let messages = Message::parse(&raw).unwrap();
        let errors = ErrorMap::from_messages(&messages);
        assert!(errors.is_empty());
        assert!(errors.full_messages().is_empty());
    }

    #[test]
    fn contexts_keep_first_seen_order() {
        let raw = vec![
            json!({"level": "error", "context": "card.cvv", "message": "one"}),
            json!({"level": "error", "context": "card.exp_month", "message": "two"}),
            json!({"level": "error", "context": "card.cvv", "message": "three"}),
        ];
        let errors = ErrorMap::from_messages(&Message::parse(&raw).unwrap());
        let contexts: Vec<&str> = errors.iter().map(|(c, _)| c).collect();
        assert_eq!(contexts, ["card.cvv", "card.exp_month"]);
        assert_eq!(errors.full_messages(), ["one", "three", "two"]);
    }

    #[test]
    fn null_code_and_message_decode_as_empty() {
        let msg = Message::from_value(&json!({
            "level": "error", "code": null, "context": "card.number", "message": null
        }))
        .unwrap();
        assert_eq!(msg.code(), "");
        assert_eq!(msg.message(), "");
        assert_eq!(msg.context(), Some("card.number"));
        assert!(msg.is_error());
    }
}
