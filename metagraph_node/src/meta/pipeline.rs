//! Transactional envelope controller
//!
//! One envelope is evaluated against one owner record. Acceptance
//! is all-or-nothing: magic number present, every decoded element a
//! valid record, and at least one record carrying the owner's
//! designated constructor tag. Everything produced on the way is
//! staged in an [`EnvelopeBatch`] and only committed by the caller
//! after acceptance, so a rejection never leaves partial writes.

use super::content::{RecordContent, SchemaError};
use super::decode::{decode_meta, DecodedMeta};
use super::envelope::strip_document_magic;
use super::graph::EnvelopeBatch;
use crate::store::{GraphStore, KeyValueStore, StoreError};
use crate::types::{keccak256, Address, Hash};
use log::debug;
use std::collections::HashSet;

/// Why an envelope was refused. All variants have the same
/// observable outcome: no owner, no records, no envelope persisted.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum EnvelopeRejection {
    #[error("document magic number absent")]
    MissingMagicNumber,

    #[error("payload is not a CBOR map or sequence")]
    MalformedPayload,

    #[error("invalid record: {0}")]
    InvalidRecord(#[from] SchemaError),

    #[error("no record carries the constructor tag")]
    MissingConstructorMeta,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("envelope rejected: {0}")]
    Rejected(#[from] EnvelopeRejection),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A fully validated envelope, staged and ready to commit
#[derive(Debug)]
pub struct AcceptedEnvelope {
    pub batch: EnvelopeBatch,
    /// Raw original envelope bytes, owed to the owner's
    /// constructor metadata (not the canonical record bytes)
    pub constructor_meta: Vec<u8>,
    pub constructor_meta_hash: Hash,
}

/// The owner-side surface the controller needs: a meta
/// back-reference set and a write-once constructor metadata slot.
pub trait MetaOwner {
    fn address(&self) -> Address;
    fn meta_mut(&mut self) -> &mut HashSet<Hash>;
    fn has_constructor_meta(&self) -> bool;
    fn set_constructor_meta(&mut self, meta: Vec<u8>, hash: Hash);
    /// Transaction attached when the owner was registered, deleted
    /// with the owner on rollback
    fn deploy_transaction(&self) -> Option<Hash>;
}

/// Run detection, decoding, validation, content addressing and
/// graph merge for one envelope. Nothing is persisted here; the
/// caller commits the returned batch (and its owner update) on
/// acceptance, or drops it on rejection.
pub fn evaluate_envelope<S: KeyValueStore>(
    store: &GraphStore<S>,
    raw_meta: &[u8],
    owner: Address,
    constructor_tag: u64,
) -> Result<AcceptedEnvelope, PipelineError> {
    let stripped =
        strip_document_magic(raw_meta).ok_or(EnvelopeRejection::MissingMagicNumber)?;

    let contents = match decode_meta(&stripped) {
        DecodedMeta::Sequence(items) => items
            .iter()
            .map(RecordContent::from_value)
            .collect::<Result<Vec<_>, _>>()
            .map_err(EnvelopeRejection::from)?,
        DecodedMeta::Single(item) => {
            vec![RecordContent::from_value(&item).map_err(EnvelopeRejection::from)?]
        }
        DecodedMeta::Other => return Err(EnvelopeRejection::MalformedPayload.into()),
    };

    let mut batch = EnvelopeBatch::open(store, raw_meta)?;
    let mut constructor_found = false;

    for content in &contents {
        let id = batch.merge_record(store, content, owner)?;
        debug!(
            "merged record {id:#x} magic {:#018x} for owner {owner:#x}",
            content.magic_number
        );
        if content.magic_number == constructor_tag {
            constructor_found = true;
        }
    }

    if !constructor_found {
        return Err(EnvelopeRejection::MissingConstructorMeta.into());
    }

    Ok(AcceptedEnvelope {
        batch,
        constructor_meta: raw_meta.to_vec(),
        constructor_meta_hash: keccak256(raw_meta),
    })
}

/// Fold an accepted envelope into its owner: constructor metadata
/// from the raw envelope bytes, and the envelope plus every staged
/// record unioned into the owner's meta set.
pub fn apply_acceptance<O: MetaOwner>(owner: &mut O, accepted: &AcceptedEnvelope) {
    owner.set_constructor_meta(
        accepted.constructor_meta.clone(),
        accepted.constructor_meta_hash,
    );

    let envelope_id = accepted.batch.envelope.id;
    owner.meta_mut().insert(envelope_id);
    let ids: Vec<Hash> = accepted.batch.record_ids().collect();
    for id in ids {
        owner.meta_mut().insert(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{AUTHORING_META_MAGIC, CONTRACT_META_MAGIC, META_DOCUMENT_MAGIC};
    use crate::store::MemoryStore;
    use ciborium::value::{Integer, Value};

    fn magic_prefix() -> Vec<u8> {
        META_DOCUMENT_MAGIC.to_be_bytes().to_vec()
    }

    fn encode_record(payload: &[u8], magic_number: u64) -> Vec<u8> {
        let map = Value::Map(vec![
            (
                Value::Integer(Integer::from(0u64)),
                Value::Bytes(payload.to_vec()),
            ),
            (
                Value::Integer(Integer::from(1u64)),
                Value::Integer(Integer::from(magic_number)),
            ),
        ]);
        let mut out = Vec::new();
        ciborium::ser::into_writer(&map, &mut out).unwrap();
        out
    }

    fn envelope_of(records: &[Vec<u8>]) -> Vec<u8> {
        let mut raw = magic_prefix();
        for record in records {
            raw.extend_from_slice(record);
        }
        raw
    }

    #[test]
    fn accepts_envelope_with_constructor_record() {
        let store = GraphStore::new(MemoryStore::new());
        let raw = envelope_of(&[
            encode_record(&[0xaa], AUTHORING_META_MAGIC),
            encode_record(&[0xbb], CONTRACT_META_MAGIC),
        ]);

        let accepted = evaluate_envelope(
            &store,
            &raw,
            Address::repeat_byte(0x01),
            AUTHORING_META_MAGIC,
        )
        .unwrap();

        assert_eq!(accepted.batch.envelope.sequence.len(), 2);
        assert_eq!(accepted.constructor_meta, raw);
        assert_eq!(accepted.constructor_meta_hash, keccak256(&raw));
    }

    #[test]
    fn rejects_envelope_without_magic() {
        let store = GraphStore::new(MemoryStore::new());
        let err = evaluate_envelope(
            &store,
            &[0x12, 0x34],
            Address::repeat_byte(0x01),
            AUTHORING_META_MAGIC,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Rejected(EnvelopeRejection::MissingMagicNumber)
        ));
    }

    #[test]
    fn rejects_envelope_without_constructor_tag() {
        let store = GraphStore::new(MemoryStore::new());
        let raw = envelope_of(&[encode_record(&[0xaa], CONTRACT_META_MAGIC)]);
        let err = evaluate_envelope(
            &store,
            &raw,
            Address::repeat_byte(0x01),
            AUTHORING_META_MAGIC,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Rejected(EnvelopeRejection::MissingConstructorMeta)
        ));
    }

    #[test]
    fn one_bad_element_rejects_the_whole_envelope() {
        let store = GraphStore::new(MemoryStore::new());

        // Three valid records followed by a map missing both
        // mandatory keys.
        let bad = {
            let map = Value::Map(vec![(
                Value::Integer(Integer::from(2u64)),
                Value::Integer(Integer::from(123u64)),
            )]);
            let mut out = Vec::new();
            ciborium::ser::into_writer(&map, &mut out).unwrap();
            out
        };
        let raw = envelope_of(&[
            encode_record(&[0xaa], 1),
            encode_record(&[0xbb], 2),
            encode_record(&[0xcc], 3),
            bad,
        ]);

        let err = evaluate_envelope(
            &store,
            &raw,
            Address::repeat_byte(0x01),
            AUTHORING_META_MAGIC,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Rejected(EnvelopeRejection::InvalidRecord(_))
        ));
        // Nothing persisted by a rejected run.
        assert_eq!(store.count::<crate::meta::MetaRecord>().unwrap(), 0);
        assert_eq!(store.count::<crate::meta::MetaEnvelope>().unwrap(), 0);
    }

    #[test]
    fn lone_scalar_payload_is_malformed() {
        let store = GraphStore::new(MemoryStore::new());
        let mut raw = magic_prefix();
        let mut scalar = Vec::new();
        ciborium::ser::into_writer(&Value::Integer(Integer::from(5u64)), &mut scalar).unwrap();
        raw.extend(scalar);

        let err = evaluate_envelope(
            &store,
            &raw,
            Address::repeat_byte(0x01),
            AUTHORING_META_MAGIC,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Rejected(EnvelopeRejection::MalformedPayload)
        ));
    }
}
