//! Record validation and content addressing
//!
//! A record is a CBOR map keyed by the integers 0..4:
//! 0 = payload, 1 = magic number, 2 = content type,
//! 3 = content encoding, 4 = content language. Payload and magic
//! number are mandatory; the rest are optional strings. A validated
//! record is re-encoded canonically (fixed key order, exactly the
//! present fields) and its keccak256 hash is the record's identity,
//! which is what makes cross-envelope deduplication work.

use crate::types::{is_hex_string, keccak256, Hash};
use ciborium::value::{Integer, Value};

/// Record schema violations. Any of these rejects the whole
/// envelope the record arrived in.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SchemaError {
    #[error("record element is not a map")]
    NotAMap,

    #[error("mandatory payload (key 0) missing")]
    MissingPayload,

    #[error("payload is not a byte string or hexadecimal text")]
    InvalidPayload,

    #[error("mandatory magic number (key 1) missing")]
    MissingMagicNumber,

    #[error("magic number is not an unsigned 64-bit integer")]
    InvalidMagicNumber,

    #[error("optional field (key {0}) is not a string")]
    NonStringOptional(u8),
}

/// One validated metadata record, prior to graph merge
#[derive(Debug, Clone, PartialEq)]
pub struct RecordContent {
    pub payload: Vec<u8>,
    pub magic_number: u64,
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub content_language: Option<String>,
}

const KEY_PAYLOAD: u64 = 0;
const KEY_MAGIC_NUMBER: u64 = 1;
const KEY_CONTENT_TYPE: u64 = 2;
const KEY_CONTENT_ENCODING: u64 = 3;
const KEY_CONTENT_LANGUAGE: u64 = 4;

fn map_get(entries: &[(Value, Value)], key: u64) -> Option<&Value> {
    let key = Integer::from(key);
    entries
        .iter()
        .find(|(k, _)| matches!(k, Value::Integer(i) if *i == key))
        .map(|(_, v)| v)
}

/// Payloads may arrive as CBOR bytes or as text. Text payloads
/// carry an optional diagnostic `h'...'` wrapper and must be valid
/// hex once unwrapped.
fn payload_bytes(value: &Value) -> Result<Vec<u8>, SchemaError> {
    match value {
        Value::Bytes(bytes) => Ok(bytes.clone()),
        Value::Text(text) => {
            let unwrapped = text
                .strip_prefix("h'")
                .and_then(|rest| rest.strip_suffix('\''))
                .unwrap_or(text);
            if !is_hex_string(unwrapped) {
                return Err(SchemaError::InvalidPayload);
            }
            hex::decode(unwrapped).map_err(|_| SchemaError::InvalidPayload)
        }
        _ => Err(SchemaError::InvalidPayload),
    }
}

fn optional_text(
    entries: &[(Value, Value)],
    key: u64,
) -> Result<Option<String>, SchemaError> {
    match map_get(entries, key) {
        None => Ok(None),
        Some(Value::Text(text)) => Ok(Some(text.clone())),
        Some(_) => Err(SchemaError::NonStringOptional(key as u8)),
    }
}

impl RecordContent {
    /// Validate one decoded envelope element against the record
    /// schema.
    pub fn from_value(value: &Value) -> Result<Self, SchemaError> {
        let entries = value.as_map().ok_or(SchemaError::NotAMap)?;

        let payload = map_get(entries, KEY_PAYLOAD).ok_or(SchemaError::MissingPayload)?;
        let payload = payload_bytes(payload)?;

        let magic_number = match map_get(entries, KEY_MAGIC_NUMBER) {
            None => return Err(SchemaError::MissingMagicNumber),
            Some(Value::Integer(i)) => {
                u64::try_from(*i).map_err(|_| SchemaError::InvalidMagicNumber)?
            }
            Some(_) => return Err(SchemaError::InvalidMagicNumber),
        };

        Ok(Self {
            payload,
            magic_number,
            content_type: optional_text(entries, KEY_CONTENT_TYPE)?,
            content_encoding: optional_text(entries, KEY_CONTENT_ENCODING)?,
            content_language: optional_text(entries, KEY_CONTENT_LANGUAGE)?,
        })
    }

    /// Canonical re-encoding: a definite-length CBOR map holding
    /// exactly the present fields, keys in the order 0,1,[2],[3],[4],
    /// payload as bytes and the magic number as an unsigned integer.
    /// Identical field sets always canonicalize to identical bytes.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut entries = vec![
            (
                Value::Integer(Integer::from(KEY_PAYLOAD)),
                Value::Bytes(self.payload.clone()),
            ),
            (
                Value::Integer(Integer::from(KEY_MAGIC_NUMBER)),
                Value::Integer(Integer::from(self.magic_number)),
            ),
        ];

        if let Some(content_type) = &self.content_type {
            entries.push((
                Value::Integer(Integer::from(KEY_CONTENT_TYPE)),
                Value::Text(content_type.clone()),
            ));
        }
        if let Some(content_encoding) = &self.content_encoding {
            entries.push((
                Value::Integer(Integer::from(KEY_CONTENT_ENCODING)),
                Value::Text(content_encoding.clone()),
            ));
        }
        if let Some(content_language) = &self.content_language {
            entries.push((
                Value::Integer(Integer::from(KEY_CONTENT_LANGUAGE)),
                Value::Text(content_language.clone()),
            ));
        }

        let mut out = Vec::new();
        // Writing a Value::Map cannot fail on a Vec writer.
        ciborium::ser::into_writer(&Value::Map(entries), &mut out)
            .unwrap_or_else(|_| unreachable!("vec write cannot fail"));
        out
    }

    /// Content address: keccak256 of the canonical bytes
    pub fn content_id(&self) -> Hash {
        keccak256(&self.canonical_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::AUTHORING_META_MAGIC;

    fn entry(key: u64, value: Value) -> (Value, Value) {
        (Value::Integer(Integer::from(key)), value)
    }

    fn minimal_map() -> Vec<(Value, Value)> {
        vec![
            entry(0, Value::Bytes(vec![0xaa, 0xbb])),
            entry(1, Value::Integer(Integer::from(AUTHORING_META_MAGIC))),
        ]
    }

    #[test]
    fn accepts_minimal_record() {
        let content = RecordContent::from_value(&Value::Map(minimal_map())).unwrap();
        assert_eq!(content.payload, vec![0xaa, 0xbb]);
        assert_eq!(content.magic_number, AUTHORING_META_MAGIC);
        assert!(content.content_type.is_none());
    }

    #[test]
    fn accepts_wrapped_text_payload() {
        let mut map = minimal_map();
        map[0] = entry(0, Value::Text("h'aabb'".into()));
        let content = RecordContent::from_value(&Value::Map(map)).unwrap();
        assert_eq!(content.payload, vec![0xaa, 0xbb]);
    }

    #[test]
    fn rejects_non_hex_text_payload() {
        let mut map = minimal_map();
        map[0] = entry(0, Value::Text("h'zz'".into()));
        assert_eq!(
            RecordContent::from_value(&Value::Map(map)),
            Err(SchemaError::InvalidPayload)
        );
    }

    #[test]
    fn rejects_missing_mandatory_keys() {
        let map = vec![entry(2, Value::Text("application/json".into()))];
        assert_eq!(
            RecordContent::from_value(&Value::Map(map)),
            Err(SchemaError::MissingPayload)
        );

        let map = vec![entry(0, Value::Bytes(vec![0xaa]))];
        assert_eq!(
            RecordContent::from_value(&Value::Map(map)),
            Err(SchemaError::MissingMagicNumber)
        );
    }

    #[test]
    fn rejects_wrong_typed_optional() {
        let mut map = minimal_map();
        map.push(entry(3, Value::Integer(Integer::from(9u64))));
        assert_eq!(
            RecordContent::from_value(&Value::Map(map)),
            Err(SchemaError::NonStringOptional(3))
        );
    }

    #[test]
    fn rejects_non_map_element() {
        assert_eq!(
            RecordContent::from_value(&Value::Integer(Integer::from(1u64))),
            Err(SchemaError::NotAMap)
        );
    }

    #[test]
    fn canonical_encoding_is_deterministic() {
        let a = RecordContent {
            payload: vec![0x01, 0x02],
            magic_number: AUTHORING_META_MAGIC,
            content_type: Some("application/json".into()),
            content_encoding: None,
            content_language: None,
        };
        let b = a.clone();
        assert_eq!(a.canonical_bytes(), b.canonical_bytes());
        assert_eq!(a.content_id(), b.content_id());
    }

    #[test]
    fn absent_and_empty_optionals_differ() {
        let absent = RecordContent {
            payload: vec![0x01],
            magic_number: 1,
            content_type: None,
            content_encoding: None,
            content_language: None,
        };
        let empty = RecordContent {
            content_type: Some(String::new()),
            ..absent.clone()
        };
        assert_ne!(absent.content_id(), empty.content_id());
    }

    #[test]
    fn canonical_map_size_counts_present_optionals() {
        let content = RecordContent {
            payload: vec![0xaa],
            magic_number: 1,
            content_type: Some("a".into()),
            content_encoding: None,
            content_language: Some("en".into()),
        };
        // 0xa4: definite-length map of four entries
        assert_eq!(content.canonical_bytes()[0], 0xa4);
    }
}
