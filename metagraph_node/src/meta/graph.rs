//! Metadata graph entities and the merge engine
//!
//! Envelope and record identities are pure functions of content, so
//! distinct emitters converge on shared graph nodes. Back-reference
//! sets (`parents`, `contracts`, `sequence`) are hash sets: union
//! inserts are idempotent and membership is O(1).

use super::content::RecordContent;
use super::META_DOCUMENT_MAGIC;
use crate::store::{Entity, GraphStore, KeyValueStore, Result};
use crate::types::{keccak256, Address, Hash};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// The outer envelope entity, identified by the keccak256 of its
/// full raw bytes (document magic included)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaEnvelope {
    pub id: Hash,
    pub raw_bytes: Vec<u8>,
    pub magic_number: u64,
    /// Content ids of the records this envelope introduced
    pub sequence: HashSet<Hash>,
    /// Addresses that emitted this envelope
    pub contracts: HashSet<Address>,
}

impl Entity for MetaEnvelope {
    const KIND: &'static str = "envelope";
    type Id = Hash;

    fn id(&self) -> Hash {
        self.id
    }
}

impl MetaEnvelope {
    /// Envelope identity for a raw blob
    pub fn id_for(raw_bytes: &[u8]) -> Hash {
        keccak256(raw_bytes)
    }

    pub fn new(raw_bytes: Vec<u8>) -> Self {
        Self {
            id: Self::id_for(&raw_bytes),
            raw_bytes,
            magic_number: META_DOCUMENT_MAGIC,
            sequence: HashSet::new(),
            contracts: HashSet::new(),
        }
    }
}

/// One content-addressed metadata record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaRecord {
    pub id: Hash,
    /// Canonical CBOR re-encoding of the present fields
    pub raw_bytes: Vec<u8>,
    pub payload: Vec<u8>,
    pub magic_number: u64,
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub content_language: Option<String>,
    /// Envelope ids that introduced this record
    pub parents: HashSet<Hash>,
    /// Addresses referencing this record
    pub contracts: HashSet<Address>,
}

impl Entity for MetaRecord {
    const KIND: &'static str = "record";
    type Id = Hash;

    fn id(&self) -> Hash {
        self.id
    }
}

impl MetaRecord {
    fn from_content(content: &RecordContent) -> Self {
        let raw_bytes = content.canonical_bytes();
        Self {
            id: keccak256(&raw_bytes),
            raw_bytes,
            payload: content.payload.clone(),
            magic_number: content.magic_number,
            content_type: content.content_type.clone(),
            content_encoding: content.content_encoding.clone(),
            content_language: content.content_language.clone(),
            parents: HashSet::new(),
            contracts: HashSet::new(),
        }
    }
}

/// In-memory staging area for one envelope run. Nothing in the
/// batch reaches the store until [`EnvelopeBatch::commit`]; a
/// rejected envelope is dropped wholesale, which is what keeps
/// rejection free of partial writes.
#[derive(Debug)]
pub struct EnvelopeBatch {
    pub envelope: MetaEnvelope,
    records: HashMap<Hash, MetaRecord>,
}

impl EnvelopeBatch {
    /// Start a batch for the given raw envelope bytes, resuming
    /// from the persisted envelope when one exists.
    pub fn open<S: KeyValueStore>(store: &GraphStore<S>, raw_bytes: &[u8]) -> Result<Self> {
        let id = MetaEnvelope::id_for(raw_bytes);
        let envelope = match store.load::<MetaEnvelope>(&id)? {
            Some(existing) => existing,
            None => MetaEnvelope::new(raw_bytes.to_vec()),
        };
        Ok(Self {
            envelope,
            records: HashMap::new(),
        })
    }

    /// Merge one validated record into the graph: upsert by content
    /// id, then union this envelope into its parents, the owner into
    /// its contracts and the record into the envelope sequence.
    /// Returns the record's content id.
    pub fn merge_record<S: KeyValueStore>(
        &mut self,
        store: &GraphStore<S>,
        content: &RecordContent,
        owner: Address,
    ) -> Result<Hash> {
        let id = content.content_id();

        let record = match self.records.remove(&id) {
            Some(staged) => staged,
            None => match store.load::<MetaRecord>(&id)? {
                Some(persisted) => persisted,
                None => MetaRecord::from_content(content),
            },
        };

        let mut record = record;
        record.parents.insert(self.envelope.id);
        record.contracts.insert(owner);
        self.records.insert(id, record);

        self.envelope.sequence.insert(id);
        self.envelope.contracts.insert(owner);
        Ok(id)
    }

    /// Content ids staged so far, in no particular order
    pub fn record_ids(&self) -> impl Iterator<Item = Hash> + '_ {
        self.records.keys().copied()
    }

    pub fn record(&self, id: &Hash) -> Option<&MetaRecord> {
        self.records.get(id)
    }

    /// Persist the envelope and every staged record. Only called
    /// once the envelope has been accepted.
    pub fn commit<S: KeyValueStore>(self, store: &GraphStore<S>) -> Result<()> {
        store.save(&self.envelope)?;
        for record in self.records.values() {
            store.save(record)?;
        }
        Ok(())
    }
}
