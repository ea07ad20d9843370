use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize, Serializer};

/// Simple AMQP value as it appears in application properties, annotations and in list or map
/// bodies.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

/// Application data section of a message.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Body {
    #[default]
    Empty,
    Text(String),
    Binary(Bytes),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Serialize for Body {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Body::Empty => serializer.serialize_none(),
            Body::Text(s) => serializer.serialize_str(s),
            Body::Binary(b) => serializer.serialize_str(&String::from_utf8_lossy(b)),
            Body::List(items) => items.serialize(serializer),
            Body::Map(entries) => entries.serialize(serializer),
        }
    }
}

/// A message sent or received by the clients: header, properties, application properties,
/// annotations and body in one flat structure.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Message {
    // header
    pub durable: bool,
    pub priority: Option<u8>,
    /// Time to live in milliseconds.
    pub ttl: Option<u32>,
    pub first_acquirer: bool,
    pub delivery_count: u32,
    // properties
    pub message_id: Option<String>,
    pub user_id: Option<String>,
    pub to: Option<String>,
    pub subject: Option<String>,
    pub reply_to: Option<String>,
    pub correlation_id: Option<String>,
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub absolute_expiry_time: Option<u64>,
    pub creation_time: Option<u64>,
    pub group_id: Option<String>,
    pub group_sequence: Option<u32>,
    pub reply_to_group_id: Option<String>,
    pub application_properties: BTreeMap<String, Value>,
    pub message_annotations: BTreeMap<String, Value>,
    pub body: Body,
}

impl From<&str> for Message {
    fn from(value: &str) -> Self {
        Self {
            body: Body::Text(value.to_owned()),
            ..Default::default()
        }
    }
}

impl Message {
    pub fn text(mut self, value: &str) -> Self {
        self.body = Body::Text(value.to_owned());
        self
    }

    pub fn to(mut self, address: &str) -> Self {
        self.to = Some(address.to_owned());
        self
    }

    pub fn reply_to(mut self, address: &str) -> Self {
        self.reply_to = Some(address.to_owned());
        self
    }
}
