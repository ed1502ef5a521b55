//! Bytecode opcode canonicalization
//!
//! Interpreter deployments assign their own jump-table orderings to
//! the same logical operations, so raw bytecode from two deployments
//! is not directly comparable. Rewriting each opcode to its index in
//! the deployment's function-pointer table removes that skew: two
//! functionally identical programs canonicalize, and therefore hash,
//! identically.

use crate::types::to_hex;

/// Width in bytes of one function pointer, and of one opcode or
/// operand token half
pub const POINTER_WIDTH: usize = 2;

/// Width in bytes of one (opcode, operand) token
pub const TOKEN_WIDTH: usize = 2 * POINTER_WIDTH;

pub type Result<T> = std::result::Result<T, BytecodeError>;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum BytecodeError {
    #[error("function pointer table length {0} is not a multiple of {POINTER_WIDTH}")]
    MalformedPointerTable(usize),

    #[error("function pointer table has {0} entries, more than a 2-byte index can address")]
    OversizedPointerTable(usize),

    #[error("source length {0} is not a multiple of {TOKEN_WIDTH}")]
    TruncatedSource(usize),

    #[error("opcode {0} not present in the function pointer table")]
    UnknownOpcode(String),
}

/// A deployment's ordered function-pointer table. Every entry's
/// position must fit a 2-byte canonical index, so a table holds at
/// most `u16::MAX + 1` pointers.
#[derive(Debug)]
pub struct PointerTable<'a> {
    pointers: Vec<&'a [u8]>,
}

impl<'a> PointerTable<'a> {
    pub fn parse(raw: &'a [u8]) -> Result<Self> {
        if raw.len() % POINTER_WIDTH != 0 {
            return Err(BytecodeError::MalformedPointerTable(raw.len()));
        }
        let pointers: Vec<&[u8]> = raw.chunks(POINTER_WIDTH).collect();
        if pointers.len() > u16::MAX as usize + 1 {
            return Err(BytecodeError::OversizedPointerTable(pointers.len()));
        }
        Ok(Self { pointers })
    }

    /// Canonical index of an opcode, by position in the table
    fn index_of(&self, opcode: &[u8]) -> Option<u16> {
        self.pointers
            .iter()
            .position(|p| *p == opcode)
            .and_then(|i| u16::try_from(i).ok())
    }
}

/// Rewrite one bytecode blob into canonical opcode numbering. Each
/// (opcode, operand) token becomes (table index, operand); the
/// operand passes through unchanged. An opcode absent from the
/// table fails the whole operation.
pub fn canonicalize(table: &PointerTable<'_>, source: &[u8]) -> Result<Vec<u8>> {
    if source.len() % TOKEN_WIDTH != 0 {
        return Err(BytecodeError::TruncatedSource(source.len()));
    }

    let mut out = Vec::with_capacity(source.len());
    for token in source.chunks(TOKEN_WIDTH) {
        let (opcode, operand) = token.split_at(POINTER_WIDTH);
        let index = table
            .index_of(opcode)
            .ok_or_else(|| BytecodeError::UnknownOpcode(to_hex(opcode)))?;
        out.extend_from_slice(&index.to_be_bytes());
        out.extend_from_slice(operand);
    }
    Ok(out)
}

/// Canonicalize a batch of source blobs against one table, one
/// output blob per input blob.
pub fn canonicalize_sources(
    raw_table: &[u8],
    sources: &[Vec<u8>],
) -> Result<Vec<Vec<u8>>> {
    let table = PointerTable::parse(raw_table)?;
    sources
        .iter()
        .map(|source| canonicalize(&table, source))
        .collect()
}
