//! Contract introspection boundary
//!
//! Deployed bytecode lookup, minimal-proxy detection and interpreter
//! scanning are served by an on-chain introspection contract. The
//! node talks to it through this trait; the address of the deployed
//! service comes from [`crate::config::NodeConfig`].

use crate::types::{keccak256, Address, Hash};

pub type Result<T> = std::result::Result<T, ExtrospectionError>;

#[derive(Debug, thiserror::Error)]
pub enum ExtrospectionError {
    #[error("no code at address {0:#x}")]
    NoCode(Address),

    #[error("introspection call failed: {0}")]
    CallFailed(String),
}

/// Introspection calls the metadata handlers depend on
pub trait Extrospection: Send + Sync {
    /// Deployed bytecode of an address
    fn bytecode(&self, address: Address) -> Result<Vec<u8>>;

    /// keccak256 of the deployed bytecode
    fn bytecode_hash(&self, address: Address) -> Result<Hash> {
        Ok(keccak256(&self.bytecode(address)?))
    }

    /// ERC1167 minimal-proxy check; `Some(delegate)` when the
    /// address is a proxy
    fn is_erc1167_proxy(&self, address: Address) -> Result<Option<Address>>;

    /// Whether an interpreter's bytecode contains only allowed
    /// opcodes
    fn scan_allowed_opcodes(&self, address: Address) -> Result<bool>;

    /// The interpreter's function pointer table, when it exposes one
    fn function_pointers(&self, address: Address) -> Result<Option<Vec<u8>>>;
}

/// Table-driven implementation for tests and offline runs
#[derive(Debug, Default)]
pub struct MockExtrospection {
    bytecodes: std::collections::HashMap<Address, Vec<u8>>,
    proxies: std::collections::HashMap<Address, Address>,
    disallowed: std::collections::HashSet<Address>,
    pointer_tables: std::collections::HashMap<Address, Vec<u8>>,
}

impl MockExtrospection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bytecode(mut self, address: Address, bytecode: Vec<u8>) -> Self {
        self.bytecodes.insert(address, bytecode);
        self
    }

    pub fn with_proxy(mut self, proxy: Address, delegate: Address) -> Self {
        self.proxies.insert(proxy, delegate);
        self
    }

    pub fn with_disallowed_interpreter(mut self, address: Address) -> Self {
        self.disallowed.insert(address);
        self
    }

    pub fn with_function_pointers(mut self, address: Address, table: Vec<u8>) -> Self {
        self.pointer_tables.insert(address, table);
        self
    }
}

impl Extrospection for MockExtrospection {
    fn bytecode(&self, address: Address) -> Result<Vec<u8>> {
        self.bytecodes
            .get(&address)
            .cloned()
            .ok_or(ExtrospectionError::NoCode(address))
    }

    fn is_erc1167_proxy(&self, address: Address) -> Result<Option<Address>> {
        Ok(self.proxies.get(&address).copied())
    }

    fn scan_allowed_opcodes(&self, address: Address) -> Result<bool> {
        Ok(!self.disallowed.contains(&address))
    }

    fn function_pointers(&self, address: Address) -> Result<Option<Vec<u8>>> {
        Ok(self.pointer_tables.get(&address).cloned())
    }
}
