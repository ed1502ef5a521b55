//! Metadata envelope pipeline
//!
//! An envelope is a self-describing byte container emitted alongside
//! an on-chain action: an 8-byte document magic number followed by a
//! CBOR-encoded payload of one or more metadata records. The modules
//! here sniff the magic number, decode and validate the records,
//! canonicalize them for content addressing and merge the result
//! into the deduplicated metadata graph.

pub mod content;
pub mod decode;
pub mod envelope;
pub mod graph;
pub mod pipeline;

pub use content::{RecordContent, SchemaError};
pub use decode::DecodedMeta;
pub use envelope::strip_document_magic;
pub use graph::{EnvelopeBatch, MetaEnvelope, MetaRecord};
pub use pipeline::{evaluate_envelope, EnvelopeRejection};

// Metadata magic numbers. The document magic tags the outer
// envelope; the rest tag the semantic meaning of a record payload.
/// Outer envelope prefix
pub const META_DOCUMENT_MAGIC: u64 = 0xff0a_89c6_74ee_7874;

/// Op meta for an interpreter deployment
pub const OP_META_MAGIC: u64 = 0xffe5_282f_43e4_95b4;

/// Contract constructor meta emitted by caller contracts
pub const CONTRACT_META_MAGIC: u64 = 0xffc2_1bbf_86cc_199b;

/// Authoring meta emitted by expression deployers
pub const AUTHORING_META_MAGIC: u64 = 0xffe9_e3a0_2ca8_e235;

/// Canonicalized deployer bytecode meta
pub const DEPLOYER_BYTECODE_MAGIC: u64 = 0xffdb_988a_8cd0_4d32;

/// Content type fixed on deployer bytecode records
pub const OCTET_STREAM_CONTENT_TYPE: &str = "application/octet-stream";
