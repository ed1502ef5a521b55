//! Envelope detector
//!
//! Eligibility is decided on the hexadecimal text rendering of the
//! raw blob: the document magic number may appear anywhere, and
//! everything up to and including it is discarded before decoding.
//! Blobs without the magic number are rejected outright.

use super::META_DOCUMENT_MAGIC;

/// Check a raw blob for the envelope document magic number and
/// return the payload bytes that follow it.
///
/// Returns `None` when the magic number is absent or when the bytes
/// after it do not re-align to whole bytes (a nibble-offset match
/// cannot carry a valid payload).
pub fn strip_document_magic(raw: &[u8]) -> Option<Vec<u8>> {
    let text = hex::encode(raw);
    let magic = format!("{META_DOCUMENT_MAGIC:016x}");

    let at = text.find(&magic)?;
    let rest = &text[at + magic.len()..];
    hex::decode(rest).ok()
}
