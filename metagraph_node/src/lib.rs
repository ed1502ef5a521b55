//! Content-addressed contract metadata graph node
//!
//! Ingests self-describing metadata envelopes emitted by on-chain
//! contracts, validates and canonicalizes their records, merges them
//! into a deduplicated content-addressed graph, and decompiles
//! interpreter bytecode into a canonical opcode numbering so that
//! semantically identical programs compare equal across deployments.

pub mod bytecode;
pub mod config;
pub mod entities;
pub mod events;
pub mod extrospection;
pub mod meta;
pub mod store;
pub mod types;

pub use config::NodeConfig;
pub use events::{ChainEvent, Dispatcher, TransactionInfo};
pub use extrospection::{Extrospection, MockExtrospection};
pub use meta::{MetaEnvelope, MetaRecord};
pub use store::{GraphStore, MemoryStore};
pub use types::{Address, Hash};
