//! Generic record store
//!
//! The metadata graph sits on top of a plain key-value store with no
//! transactional primitives; the envelope pipeline serializes its own
//! all-or-nothing logic in front of it by deferring every write until
//! an envelope has been fully accepted.

pub mod memory;

pub use memory::MemoryStore;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Store-specific Result type
pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("backend error: {0}")]
    Backend(String),
}

/// Minimal synchronous key-value contract the graph runs against.
/// Durability and atomicity are the backend's own business.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;
    fn delete(&self, key: &[u8]) -> Result<()>;

    fn exists(&self, key: &[u8]) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    fn list_keys(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>>;
}

/// A persisted entity: one serializable record under one kind
/// namespace, addressed by an id rendered to key bytes.
pub trait Entity: Serialize + DeserializeOwned {
    /// Kind namespace, used as the key prefix
    const KIND: &'static str;

    type Id: EntityId;

    fn id(&self) -> Self::Id;
}

/// Id types that can be rendered into store key bytes
pub trait EntityId {
    fn key_bytes(&self) -> Vec<u8>;
}

impl EntityId for crate::types::Address {
    fn key_bytes(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

impl EntityId for crate::types::Hash {
    fn key_bytes(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

fn entity_key<E: Entity>(id: &E::Id) -> Vec<u8> {
    let id_bytes = id.key_bytes();
    let mut key = Vec::with_capacity(E::KIND.len() + 1 + id_bytes.len());
    key.extend_from_slice(E::KIND.as_bytes());
    key.push(b'/');
    key.extend_from_slice(&id_bytes);
    key
}

/// Typed view over a key-value backend: entities are bincode-encoded
/// under `<kind>/<id>` keys.
pub struct GraphStore<S: KeyValueStore> {
    inner: S,
}

impl<S: KeyValueStore> GraphStore<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn load<E: Entity>(&self, id: &E::Id) -> Result<Option<E>> {
        match self.inner.get(&entity_key::<E>(id))? {
            Some(raw) => Ok(Some(bincode::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn save<E: Entity>(&self, entity: &E) -> Result<()> {
        let raw = bincode::serialize(entity)?;
        self.inner.put(&entity_key::<E>(&entity.id()), &raw)
    }

    pub fn delete<E: Entity>(&self, id: &E::Id) -> Result<()> {
        self.inner.delete(&entity_key::<E>(id))
    }

    pub fn exists<E: Entity>(&self, id: &E::Id) -> Result<bool> {
        self.inner.exists(&entity_key::<E>(id))
    }

    /// Number of persisted entities of one kind
    pub fn count<E: Entity>(&self) -> Result<usize> {
        let mut prefix = E::KIND.as_bytes().to_vec();
        prefix.push(b'/');
        Ok(self.inner.list_keys(&prefix)?.len())
    }
}
