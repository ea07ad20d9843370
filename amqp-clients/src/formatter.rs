//! Printing of sent and received messages.
//!
//! `json` is plain JSON, the other formats print Python literals so that the output can be
//! evaluated by the test suites of other clients.

use std::collections::BTreeMap;

use amqp_engine::{Body, Message, Value};
use serde_json::Value as JsonValue;

use crate::model::MessageFormat;

pub fn format_message(message: &Message, format: MessageFormat) -> String {
    match format {
        MessageFormat::Body => python_literals(&to_json(&message.body)),
        MessageFormat::Dict => python_literals(&render_object(&standard_fields(message))),
        MessageFormat::Interop => python_literals(&render_object(&interop_fields(message))),
        MessageFormat::Json => render_object(&interop_fields(message)),
        MessageFormat::Upstream => {
            let pairs = standard_fields(message)
                .iter()
                .map(|(key, value)| format!("{key}: {value}"))
                .collect::<Vec<_>>()
                .join(", ");

            python_literals(&pairs)
        }
    }
}

type Fields = Vec<(&'static str, JsonValue)>;

fn to_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_owned())
}

fn opt<T: serde::Serialize>(value: &Option<T>) -> JsonValue {
    serde_json::to_value(value).unwrap_or(JsonValue::Null)
}

fn render_object(fields: &Fields) -> String {
    let body = fields
        .iter()
        .map(|(key, value)| format!("{}:{}", to_json(key), value))
        .collect::<Vec<_>>()
        .join(",");

    format!("{{{body}}}")
}

fn properties(message: &Message) -> BTreeMap<String, Value> {
    let mut props = message.application_properties.clone();

    props.remove("NATIVE_MESSAGE_ID");
    props
}

fn standard_fields(message: &Message) -> Fields {
    vec![
        ("durable", message.durable.into()),
        ("priority", opt(&message.priority)),
        ("ttl", opt(&message.ttl)),
        ("first_acquirer", message.first_acquirer.into()),
        ("delivery_count", message.delivery_count.into()),
        ("id", opt(&message.message_id)),
        ("user_id", opt(&message.user_id)),
        ("to", opt(&message.to)),
        ("subject", opt(&message.subject)),
        ("reply_to", opt(&message.reply_to)),
        ("correlation_id", opt(&message.correlation_id)),
        ("content_type", opt(&message.content_type)),
        ("content_encoding", opt(&message.content_encoding)),
        ("absolute-expiry-time", opt(&message.absolute_expiry_time)),
        ("creation_time", opt(&message.creation_time)),
        ("group-id", opt(&message.group_id)),
        ("group-sequence", opt(&message.group_sequence)),
        ("reply-to-group-id", opt(&message.reply_to_group_id)),
        ("properties", serde_json::to_value(properties(message)).unwrap_or(JsonValue::Null)),
        ("content", serde_json::to_value(&message.body).unwrap_or(JsonValue::Null)),
        (
            "message-annotations",
            serde_json::to_value(&message.message_annotations).unwrap_or(JsonValue::Null),
        ),
    ]
}

fn interop_fields(message: &Message) -> Fields {
    let strip = |value: &Option<String>, prefix: &str| -> JsonValue {
        match value {
            Some(v) => JsonValue::String(v.replacen(prefix, "", 1)),
            None => JsonValue::Null,
        }
    };

    let properties = properties(message)
        .into_iter()
        .map(|(k, v)| (k, round_value(v)))
        .collect::<BTreeMap<_, _>>();

    let content = match &message.body {
        Body::List(items) => Body::List(items.iter().cloned().map(round_value).collect()),
        Body::Map(entries) => Body::Map(entries.iter().map(|(k, v)| (k.clone(), round_value(v.clone()))).collect()),
        other => other.clone(),
    };

    vec![
        ("durable", message.durable.into()),
        ("priority", opt(&message.priority)),
        ("ttl", opt(&message.ttl)),
        ("first-acquirer", message.first_acquirer.into()),
        ("delivery-count", message.delivery_count.into()),
        ("id", strip(&message.message_id, "ID:")),
        ("user-id", opt(&message.user_id)),
        ("address", strip(&message.to, "topic://")),
        ("subject", opt(&message.subject)),
        ("reply-to", opt(&message.reply_to)),
        ("correlation-id", strip(&message.correlation_id, "ID:")),
        ("content-type", opt(&message.content_type)),
        ("content-encoding", opt(&message.content_encoding)),
        ("absolute-expiry-time", opt(&message.absolute_expiry_time)),
        ("creation-time", opt(&message.creation_time)),
        ("group-id", opt(&message.group_id)),
        ("group-sequence", opt(&message.group_sequence)),
        ("reply-to-group-id", opt(&message.reply_to_group_id)),
        ("properties", serde_json::to_value(properties).unwrap_or(JsonValue::Null)),
        ("content", serde_json::to_value(&content).unwrap_or(JsonValue::Null)),
    ]
}

/// Floats are printed with at most five decimals.
fn round_value(value: Value) -> Value {
    match value {
        Value::Double(d) => Value::Double((d * 100_000.0).round() / 100_000.0),
        other => other,
    }
}

fn python_literals(s: &str) -> String {
    s.replace("null", "None")
        .replace("true", "True")
        .replace("false", "False")
        .replace("{}", "None")
}
