//! The dynamic record behind every resource.
//!
//! # Design
//! The field set of a response is decided by the server and differs per
//! endpoint and per outcome (a failed call may return a `messages`-only
//! body). A `Record` therefore keeps the decoded JSON object as an ordered
//! attribute bag and offers generic `get`/`set` access to it. Resource types
//! wrap a `Record` and add typed accessors for the fields they know about.
//!
//! `messages` is reserved: it stays in the bag so the record re-encodes to
//! the JSON it came from, but it is only readable as decoded `Message`
//! values and can never be written through `set`.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::client::Gateway;
use crate::error::{Error, Result};
use crate::message::{ErrorMap, Message};

/// Key of the reserved messages array.
pub const MESSAGES_KEY: &str = "messages";

/// Ordered attribute bag plus a handle to the gateway that produced it.
#[derive(Clone)]
pub struct Record {
    attributes: Map<String, Value>,
    messages: Vec<Message>,
    gateway: Gateway,
}

impl Record {
    /// Wrap an attribute bag. The `messages` array, if any, is left
    /// undecoded until the record is built from a response.
    pub fn new(attributes: Map<String, Value>, gateway: Gateway) -> Self {
        Self {
            attributes,
            messages: Vec::new(),
            gateway,
        }
    }

    /// Build a record from a decoded response body, decoding `messages`.
    pub fn from_response(attributes: Map<String, Value>, gateway: Gateway) -> Result<Self> {
        let messages = match attributes.get(MESSAGES_KEY) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(raw)) => Message::parse(raw)?,
            Some(other) => {
                return Err(Error::Decode(format!(
                    "`messages` must be an array, got {other}"
                )))
            }
        };
        Ok(Self {
            attributes,
            messages,
            gateway,
        })
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// Raw value of a field. Always `None` for `messages`.
    pub fn value(&self, field: &str) -> Option<&Value> {
        if field == MESSAGES_KEY {
            return None;
        }
        self.attributes.get(field)
    }

    /// Typed value of a field. `None` when the field is unset, null, or of a
    /// different type.
    pub fn get<T: DeserializeOwned>(&self, field: &str) -> Option<T> {
        self.value(field)
            .filter(|v| !v.is_null())
            .and_then(|v| T::deserialize(v).ok())
    }

    /// Value reached by a dotted path, e.g. `method.fingerprint`.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.value(parts.next()?)?;
        for part in parts {
            current = match current {
                Value::Object(map) => map.get(part)?,
                Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Nested object stored under `field`.
    pub fn object(&self, field: &str) -> Option<&Map<String, Value>> {
        self.value(field).and_then(Value::as_object)
    }

    /// Like `value`, but a missing field is an error.
    pub fn attribute(&self, field: &str) -> Result<&Value> {
        self.value(field)
            .ok_or_else(|| Error::AttributeNotSet(field.to_string()))
    }

    /// Typed value of a field that must be present.
    pub fn require<T: DeserializeOwned>(&self, field: &str) -> Result<T> {
        let value = self.attribute(field)?;
        if value.is_null() {
            return Err(Error::AttributeNotSet(field.to_string()));
        }
        T::deserialize(value).map_err(|err| Error::Decode(format!("`{field}`: {err}")))
    }

    /// Write a field. Never triggers a network call.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        let field = field.into();
        if field == MESSAGES_KEY {
            return Err(Error::ReservedAttribute(field));
        }
        self.attributes.insert(field, value.into());
        Ok(())
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        if field == MESSAGES_KEY {
            return None;
        }
        self.attributes.shift_remove(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        field != MESSAGES_KEY && self.attributes.contains_key(field)
    }

    /// Names of the readable fields, in response order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.attributes
            .keys()
            .map(String::as_str)
            .filter(|k| *k != MESSAGES_KEY)
    }

    /// The full bag, including the raw `messages` array.
    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    /// The bag without `messages`, as sent back on a save.
    pub fn writable_attributes(&self) -> Map<String, Value> {
        self.attributes
            .iter()
            .filter(|(k, _)| k.as_str() != MESSAGES_KEY)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn into_attributes(self) -> Map<String, Value> {
        self.attributes
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn has_messages(&self) -> bool {
        !self.messages.is_empty()
    }

    /// Error-level messages grouped by context. Empty when the call
    /// succeeded.
    pub fn errors(&self) -> ErrorMap {
        ErrorMap::from_messages(&self.messages)
    }

    pub fn has_errors(&self) -> bool {
        self.messages.iter().any(Message::is_error)
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.attributes.clone())
    }

    /// Take over the state of `other`, keeping this record (and every
    /// reference to it) valid.
    pub fn replace(&mut self, other: Record) {
        self.attributes = other.attributes;
        self.messages = other.messages;
    }

    pub fn id(&self) -> Option<String> {
        self.get("id")
    }

    pub fn status(&self) -> Option<String> {
        self.get("status")
    }

    pub fn amount(&self) -> Option<i64> {
        self.get("amount")
    }

    pub fn currency(&self) -> Option<String> {
        self.get("currency")
    }

    pub fn reference(&self) -> Option<String> {
        self.get("reference")
    }

    /// The `type` field.
    pub fn type_name(&self) -> Option<String> {
        self.get("type")
    }

    pub fn created(&self) -> Option<String> {
        self.get("created")
    }

    /// Same entity: both ids present and equal.
    pub fn same_entity(&self, other: &Record) -> bool {
        match (self.value("id"), other.value("id")) {
            (Some(a), Some(b)) => !a.is_null() && a == b,
            _ => false,
        }
    }

    /// Id for use in a request path.
    pub(crate) fn require_id(&self) -> Result<String> {
        match self.attribute("id")? {
            Value::String(id) => Ok(id.clone()),
            Value::Null => Err(Error::AttributeNotSet("id".into())),
            other => Ok(other.to_string()),
        }
    }
}

impl Serialize for Record {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.attributes.serialize(serializer)
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("attributes", &self.attributes)
            .field("messages", &self.messages)
            .finish_non_exhaustive()
    }
}

/// A typed view over a `Record`.
///
/// Implemented by every resource returned from the gateway. The response
/// processor builds the `Record` and hands it to `from_record`.
pub trait Resource: Sized {
    /// Singular name used in logs.
    const NAME: &'static str;

    fn from_record(record: Record) -> Self;

    fn record(&self) -> &Record;

    fn record_mut(&mut self) -> &mut Record;

    fn into_record(self) -> Record;
}

impl Resource for Record {
    const NAME: &'static str = "record";

    fn from_record(record: Record) -> Self {
        record
    }

    fn record(&self) -> &Record {
        self
    }

    fn record_mut(&mut self) -> &mut Record {
        self
    }

    fn into_record(self) -> Record {
        self
    }
}

/// Decode a nested array of objects into resources sharing `gateway`.
/// `extra` is merged into every element.
pub(crate) fn nested<R: Resource>(
    value: Option<&Value>,
    gateway: &Gateway,
    extra: &[(&str, Value)],
) -> Vec<R> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(Value::as_object)
        .map(|attrs| {
            let mut attrs = attrs.clone();
            for (k, v) in extra {
                attrs.insert((*k).to_string(), v.clone());
            }
            R::from_record(Record::new(attrs, gateway.clone()))
        })
        .collect()
}
