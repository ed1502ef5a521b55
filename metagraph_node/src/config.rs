//! Node configuration
//!
//! The introspection service address is an explicit configuration
//! value injected at startup; there is no runtime branch keyed by a
//! network name.

use crate::types::Address;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Chain the node indexes, informational only
    pub chain_id: u64,
    /// Address of the deployed bytecode introspection service
    pub extrospection_address: Address,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            chain_id: 1,
            extrospection_address: Address::zero(),
        }
    }
}

impl NodeConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("reading config {}", path.as_ref().display()))?;
        let config: NodeConfig = serde_json::from_str(&raw).context("parsing config")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_json_round_trip() {
        let config = NodeConfig {
            chain_id: 137,
            extrospection_address: Address::repeat_byte(0x59),
        };
        let raw = serde_json::to_string(&config).unwrap();
        let parsed: NodeConfig = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.chain_id, 137);
        assert_eq!(parsed.extrospection_address, config.extrospection_address);
    }
}
