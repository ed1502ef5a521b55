//! Shape dispatch over the decoded envelope payload
//!
//! The payload after the document magic number is CBOR: either a
//! single record map or several top-level items concatenated back to
//! back (an RFC 8742 CBOR sequence). Decoding classifies the payload
//! into a closed three-variant shape; everything that is not a clean
//! map or sequence of items rejects the envelope.

use ciborium::value::Value;
use std::io::Cursor;

/// Decoded shape of one envelope payload
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedMeta {
    /// Two or more concatenated top-level CBOR items
    Sequence(Vec<Value>),
    /// Exactly one top-level item, and it is a map
    Single(Value),
    /// Undecodable bytes, an empty payload, or a lone non-map item
    Other,
}

/// Decode the magic-stripped payload bytes.
pub fn decode_meta(bytes: &[u8]) -> DecodedMeta {
    let mut cursor = Cursor::new(bytes);
    let mut items = Vec::new();

    while (cursor.position() as usize) < bytes.len() {
        match ciborium::de::from_reader::<Value, _>(&mut cursor) {
            Ok(value) => items.push(value),
            Err(_) => return DecodedMeta::Other,
        }
    }

    match items.len() {
        0 => DecodedMeta::Other,
        1 => match items.pop() {
            Some(item) if item.is_map() => DecodedMeta::Single(item),
            _ => DecodedMeta::Other,
        },
        _ => DecodedMeta::Sequence(items),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ciborium::value::Integer;

    fn encode(value: &Value) -> Vec<u8> {
        let mut out = Vec::new();
        ciborium::ser::into_writer(value, &mut out).unwrap();
        out
    }

    fn sample_map(tag: u64) -> Value {
        Value::Map(vec![(
            Value::Integer(Integer::from(0u64)),
            Value::Integer(Integer::from(tag)),
        )])
    }

    #[test]
    fn single_map() {
        let bytes = encode(&sample_map(1));
        match decode_meta(&bytes) {
            DecodedMeta::Single(v) => assert!(v.is_map()),
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn concatenated_items_form_a_sequence() {
        let mut bytes = encode(&sample_map(1));
        bytes.extend(encode(&sample_map(2)));
        match decode_meta(&bytes) {
            DecodedMeta::Sequence(items) => assert_eq!(items.len(), 2),
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn lone_scalar_is_other() {
        let bytes = encode(&Value::Integer(Integer::from(42u64)));
        assert_eq!(decode_meta(&bytes), DecodedMeta::Other);
    }

    #[test]
    fn garbage_and_empty_are_other() {
        assert_eq!(decode_meta(&[]), DecodedMeta::Other);
        // 0xff alone is a CBOR "break" outside any container
        assert_eq!(decode_meta(&[0xff]), DecodedMeta::Other);
    }

    #[test]
    fn trailing_garbage_rejects_everything() {
        let mut bytes = encode(&sample_map(1));
        bytes.push(0xff);
        assert_eq!(decode_meta(&bytes), DecodedMeta::Other);
    }
}
