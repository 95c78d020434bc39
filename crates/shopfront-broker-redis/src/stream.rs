//! Stream entry encoding and reply parsing.

use redis::Value;
use shopfront_messaging::BrokerMessage;

use crate::error::{RedisBrokerError, RedisBrokerResult};

pub(crate) const FIELD_MESSAGE_ID: &str = "message_id";
pub(crate) const FIELD_SUBJECT: &str = "subject";
pub(crate) const FIELD_CORRELATION_ID: &str = "correlation_id";
pub(crate) const FIELD_BODY: &str = "body";
pub(crate) const FIELD_REASON: &str = "dead_letter_reason";
pub(crate) const FIELD_DESCRIPTION: &str = "dead_letter_description";

/// A stream entry decoded into a broker message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StreamEntry {
    /// The Redis entry ID (e.g., "1234567890-0").
    pub entry_id: String,
    pub message: BrokerMessage,
}

/// Field/value pairs written by XADD for `message`.
pub(crate) fn encode(message: &BrokerMessage) -> Vec<(&'static str, String)> {
    let mut fields = vec![
        (FIELD_MESSAGE_ID, message.message_id.clone()),
        (FIELD_SUBJECT, message.subject.clone()),
        (FIELD_BODY, message.body.clone()),
    ];
    if let Some(correlation_id) = &message.correlation_id {
        fields.push((FIELD_CORRELATION_ID, correlation_id.clone()));
    }
    fields
}

/// Stream key that receives dead letters for one subscription.
pub(crate) fn dead_letter_key(topic: &str, subscription: &str) -> String {
    format!("{topic}:{subscription}:deadletter")
}

/// Parses an XREADGROUP reply for a single stream.
///
/// Reply format: `[[stream_key, [[entry_id, [field, value, ...]], ...]]]`,
/// or nil when the block timeout expires.
pub(crate) fn parse_read_reply(value: &Value) -> RedisBrokerResult<Vec<StreamEntry>> {
    match value {
        Value::Nil => Ok(Vec::new()),
        Value::Array(streams) => {
            let mut entries = Vec::new();
            for stream in streams {
                let Value::Array(parts) = stream else {
                    return Err(protocol("expected array for stream", stream));
                };
                let Some(stream_entries) = parts.get(1) else {
                    return Err(RedisBrokerError::Protocol("stream entry too short".into()));
                };
                entries.extend(parse_entries(stream_entries)?);
            }
            Ok(entries)
        }
        Value::Map(streams) => {
            let mut entries = Vec::new();
            for (_key, stream_entries) in streams {
                entries.extend(parse_entries(stream_entries)?);
            }
            Ok(entries)
        }
        other => Err(protocol("unexpected XREADGROUP reply", other)),
    }
}

/// Parses an XAUTOCLAIM reply.
///
/// Reply format: `[next_start_id, [[entry_id, [field, value, ...]], ...], [deleted_id, ...]]`.
pub(crate) fn parse_autoclaim_reply(value: &Value) -> RedisBrokerResult<Vec<StreamEntry>> {
    let Value::Array(parts) = value else {
        return Err(protocol("unexpected XAUTOCLAIM reply", value));
    };
    match parts.get(1) {
        Some(entries) => parse_entries(entries),
        None => Err(RedisBrokerError::Protocol("XAUTOCLAIM reply too short".into())),
    }
}

fn parse_entries(value: &Value) -> RedisBrokerResult<Vec<StreamEntry>> {
    let Value::Array(entries) = value else {
        return Err(protocol("expected array for entries", value));
    };
    let mut parsed = Vec::with_capacity(entries.len());
    for entry in entries {
        // Entries deleted while pending come back as nil.
        if let Some(entry) = parse_entry(entry)? {
            parsed.push(entry);
        }
    }
    Ok(parsed)
}

fn parse_entry(value: &Value) -> RedisBrokerResult<Option<StreamEntry>> {
    let Value::Array(parts) = value else {
        return Err(protocol("expected array for entry", value));
    };
    let Some(entry_id) = parts.first().and_then(as_string) else {
        return Err(RedisBrokerError::Protocol("entry without id".into()));
    };
    let fields = match parts.get(1) {
        Some(Value::Array(fields)) => fields.as_slice(),
        Some(Value::Nil) | None => return Ok(None),
        Some(other) => return Err(protocol("expected array for fields", other)),
    };

    let mut message = BrokerMessage {
        message_id: entry_id.clone(),
        subject: String::new(),
        correlation_id: None,
        body: String::new(),
    };
    for pair in fields.chunks_exact(2) {
        let (Some(name), Some(value)) = (as_string(&pair[0]), as_string(&pair[1])) else {
            continue;
        };
        match name.as_str() {
            FIELD_MESSAGE_ID => message.message_id = value,
            FIELD_SUBJECT => message.subject = value,
            FIELD_CORRELATION_ID => message.correlation_id = Some(value),
            FIELD_BODY => message.body = value,
            _ => {}
        }
    }
    Ok(Some(StreamEntry { entry_id, message }))
}

fn as_string(value: &Value) -> Option<String> {
    match value {
        Value::BulkString(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        Value::SimpleString(s) => Some(s.clone()),
        _ => None,
    }
}

fn protocol(context: &str, value: &Value) -> RedisBrokerError {
    RedisBrokerError::Protocol(format!("{context}, got {value:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bulk(s: &str) -> Value {
        Value::BulkString(s.as_bytes().to_vec())
    }

    fn entry(id: &str, fields: &[(&str, &str)]) -> Value {
        Value::Array(vec![
            bulk(id),
            Value::Array(
                fields
                    .iter()
                    .flat_map(|(name, value)| [bulk(name), bulk(value)])
                    .collect(),
            ),
        ])
    }

    #[test]
    fn test_parse_read_reply_extracts_message_fields() {
        let reply = Value::Array(vec![Value::Array(vec![
            bulk("catalog"),
            Value::Array(vec![entry(
                "1700000000000-0",
                &[
                    ("message_id", "m-1"),
                    ("subject", "catalog.product_created"),
                    ("correlation_id", "req-1"),
                    ("body", "{}"),
                ],
            )]),
        ])]);

        let entries = parse_read_reply(&reply).unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].entry_id, "1700000000000-0");
        assert_eq!(
            entries[0].message,
            BrokerMessage {
                message_id: "m-1".into(),
                subject: "catalog.product_created".into(),
                correlation_id: Some("req-1".into()),
                body: "{}".into(),
            }
        );
    }

    #[test]
    fn test_parse_read_reply_nil_is_empty() {
        assert!(parse_read_reply(&Value::Nil).unwrap().is_empty());
    }

    #[test]
    fn test_entry_without_fields_falls_back_to_entry_id() {
        let reply = Value::Array(vec![Value::Array(vec![
            bulk("catalog"),
            Value::Array(vec![entry("1-0", &[("unrelated", "x")])]),
        ])]);

        let entries = parse_read_reply(&reply).unwrap();

        assert_eq!(entries[0].message.message_id, "1-0");
        assert!(entries[0].message.body.is_empty());
    }

    #[test]
    fn test_parse_autoclaim_reply_skips_deleted_entries() {
        let reply = Value::Array(vec![
            bulk("0-0"),
            Value::Array(vec![
                entry("5-0", &[("message_id", "m-5"), ("body", "{}")]),
                Value::Array(vec![bulk("6-0"), Value::Nil]),
            ]),
            Value::Array(vec![]),
        ]);

        let entries = parse_autoclaim_reply(&reply).unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message.message_id, "m-5");
    }

    #[test]
    fn test_unexpected_reply_is_a_protocol_error() {
        let result = parse_read_reply(&Value::Int(3));

        assert!(matches!(result, Err(RedisBrokerError::Protocol(_))));
    }

    #[test]
    fn test_encode_omits_missing_correlation_id() {
        let fields = encode(&BrokerMessage {
            message_id: "m-1".into(),
            subject: "s".into(),
            correlation_id: None,
            body: "{}".into(),
        });

        assert!(fields.iter().all(|(name, _)| *name != FIELD_CORRELATION_ID));
        assert_eq!(fields.len(), 3);
    }

    #[test]
    fn test_dead_letter_key_is_scoped_to_subscription() {
        assert_eq!(dead_letter_key("catalog", "cart"), "catalog:cart:deadletter");
    }
}
