//! Message codec
//!
//! Encodes commands into the tagged-union wire format and decodes stream messages into
//! discriminated `StreamEvent`s.
//!
//! Decoding never fails on unknown keys or on a single malformed payload: the key is
//! skipped and the rest of the message still decodes. Only a frame that is not JSON at
//! all (or is neither an object nor a string) is an error.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{trace, warn};

use crate::protocol::{Capability, DecodedMessage, QueueCause, QueueItem, StreamEvent};
use crate::{Error, Result};

/// Key wrapping the connect-time snapshot
pub const SESSION_CONNECTED_RESPONSE: &str = "SESSION_CONNECTED_RESPONSE";

/// Encode a command
///
/// Unit variants become `"TAG"`, variants with parameters become `{"TAG": {...}}`.
pub fn encode_command<C: Serialize>(command: &C) -> Result<String> {
    serde_json::to_string(command).map_err(|e| Error::Encode(e.to_string()))
}

/// Decode one inbound text frame
pub fn decode_message(text: &str) -> Result<DecodedMessage> {
    let value: Value = serde_json::from_str(text).map_err(|e| Error::Decode(e.to_string()))?;

    match value {
        Value::String(tag) => Ok(DecodedMessage {
            tag: Some(tag),
            ..Default::default()
        }),
        Value::Object(map) => {
            let mut decoded = DecodedMessage::default();
            decode_object(map, &mut decoded);
            Ok(decoded)
        }
        other => Err(Error::Decode(format!(
            "expected object or string message, got {}",
            json_kind(&other)
        ))),
    }
}

/// Render a `wanted_info` query value (`QUEUE,HEALTH`)
pub fn wanted_info_query(wanted: &[Capability]) -> String {
    wanted
        .iter()
        .map(Capability::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse a `wanted_info` query value, dropping duplicates
pub fn parse_wanted_info(query: &str) -> Result<Vec<Capability>> {
    let mut wanted = Vec::new();
    for part in query.split(',').filter(|p| !p.trim().is_empty()) {
        let capability: Capability = part.parse()?;
        if !wanted.contains(&capability) {
            wanted.push(capability);
        }
    }
    Ok(wanted)
}

fn decode_object(map: Map<String, Value>, out: &mut DecodedMessage) {
    for (key, payload) in map {
        if payload.is_null() {
            trace!("Skipping null payload for '{}'", key);
            continue;
        }

        match key.to_ascii_uppercase().as_str() {
            SESSION_CONNECTED_RESPONSE => match payload {
                Value::Object(inner) => {
                    out.snapshot = true;
                    decode_object(inner, out);
                }
                other => warn!(
                    "Dropping snapshot: expected object, got {}",
                    json_kind(&other)
                ),
            },
            "QUEUE" => push_queue(out, &key, payload, QueueCause::Update),
            "HEALTH" => push(out, &key, serde_json::from_value(payload).map(StreamEvent::Health)),
            "AUDIO_STATE_INFO" => push(
                out,
                &key,
                serde_json::from_value(payload).map(StreamEvent::AudioState),
            ),
            "NODE_INFO" => push(out, &key, serde_json::from_value(payload).map(StreamEvent::NodeInfo)),
            "DOWNLOADS" | "DOWNLOAD" => push(
                out,
                &key,
                serde_json::from_value(payload).map(StreamEvent::Downloads),
            ),
            "SOURCES" => push(out, &key, serde_json::from_value(payload).map(StreamEvent::Sources)),
            tag @ ("ADD_QUEUE_ITEM_RESPONSE"
            | "REMOVE_QUEUE_ITEM_RESPONSE"
            | "MOVE_QUEUE_ITEM_RESPONSE"
            | "READ_QUEUE_ITEMS_RESPONSE") => {
                if let Some(cause) = QueueCause::from_response_tag(tag) {
                    push_queue(out, &key, field(&payload, "queue"), cause);
                }
            }
            "ADD_SOURCE_RESPONSE" | "READ_SOURCES_RESPONSE" => push(
                out,
                &key,
                serde_json::from_value(field(&payload, "sources")).map(StreamEvent::Sources),
            ),
            "SET_ACTIVE_SOURCE_RESPONSE" => push(
                out,
                &key,
                serde_json::from_value(field(&payload, "sourceName")).map(StreamEvent::ActiveSource),
            ),
            "FINISHED_DOWNLOADING_AUDIO" => {
                let queue = field(&payload, "queue");
                if !queue.is_null() {
                    push_queue(out, &key, queue, QueueCause::DownloadFinished);
                }
                let error = payload
                    .get("error")
                    .and_then(Value::as_str)
                    .map(str::to_owned);
                out.events.push(StreamEvent::DownloadFinished { error });
            }
            "ERROR" => {
                let message = match &payload {
                    Value::String(message) => message.clone(),
                    Value::Object(inner) => inner
                        .get("error")
                        .and_then(Value::as_str)
                        .map(str::to_owned)
                        .unwrap_or_else(|| payload.to_string()),
                    other => other.to_string(),
                };
                out.events.push(StreamEvent::ServerError(message));
            }
            _ => trace!("Skipping unknown key '{}'", key),
        }
    }
}

fn field(payload: &Value, name: &str) -> Value {
    payload.get(name).cloned().unwrap_or(Value::Null)
}

fn push_queue(out: &mut DecodedMessage, key: &str, payload: Value, cause: QueueCause) {
    push(
        out,
        key,
        QueueItem::deserialize_queue(payload).map(|items| StreamEvent::Queue { items, cause }),
    );
}

fn push(out: &mut DecodedMessage, key: &str, result: serde_json::Result<StreamEvent>) {
    match result {
        Ok(event) => out.events.push(event),
        Err(e) => warn!("Dropping malformed '{}' payload: {}", key, e),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
