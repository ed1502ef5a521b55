//! Owner-side graph entities and load-or-create glue
//!
//! Everything here is straight-line bookkeeping: look a record up
//! by id, create it with copied fields when absent. The envelope
//! pipeline decides when any of it is persisted.

use crate::extrospection::Extrospection;
use crate::meta::pipeline::MetaOwner;
use crate::store::{Entity, GraphStore, KeyValueStore};
use crate::types::{Address, Hash};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Externally-owned account that signed a deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: Address,
}

impl Entity for Account {
    const KIND: &'static str = "account";
    type Id = Address;

    fn id(&self) -> Address {
        self.id
    }
}

/// Originating transaction of an on-chain event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Hash,
    pub block_number: u64,
    pub timestamp: u64,
}

impl Entity for Transaction {
    const KIND: &'static str = "transaction";
    type Id = Hash;

    fn id(&self) -> Hash {
        self.id
    }
}

/// Interpreter deployment referenced by a deployer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpreterInstance {
    pub id: Address,
}

impl Entity for InterpreterInstance {
    const KIND: &'static str = "interpreter_instance";
    type Id = Address;

    fn id(&self) -> Address {
        self.id
    }
}

/// Store deployment referenced by a deployer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreInstance {
    pub id: Address,
}

impl Entity for StoreInstance {
    const KIND: &'static str = "store_instance";
    type Id = Address;

    fn id(&self) -> Address {
        self.id
    }
}

/// Parser deployment referenced by a deployer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParserInstance {
    pub id: Address,
}

impl Entity for ParserInstance {
    const KIND: &'static str = "parser_instance";
    type Id = Address;

    fn id(&self) -> Address {
        self.id
    }
}

/// Expression deployer owner record. Exists in the store only once
/// its constructor metadata has been resolved, except for the
/// provisional registration window between interface registration
/// and the first envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployer {
    pub id: Address,
    pub bytecode: Option<Vec<u8>>,
    pub bytecode_hash: Option<Hash>,
    pub deployed_bytecode: Option<Vec<u8>>,
    pub deployed_bytecode_hash: Option<Hash>,
    pub function_pointers: Option<Vec<u8>>,
    pub interpreter: Option<Address>,
    pub store_instance: Option<Address>,
    pub parser: Option<Address>,
    pub account: Option<Address>,
    pub meta: HashSet<Hash>,
    pub constructor_meta: Option<Vec<u8>>,
    pub constructor_meta_hash: Option<Hash>,
    pub deploy_transaction: Option<Hash>,
}

impl Deployer {
    pub fn new(id: Address) -> Self {
        Self {
            id,
            bytecode: None,
            bytecode_hash: None,
            deployed_bytecode: None,
            deployed_bytecode_hash: None,
            function_pointers: None,
            interpreter: None,
            store_instance: None,
            parser: None,
            account: None,
            meta: HashSet::new(),
            constructor_meta: None,
            constructor_meta_hash: None,
            deploy_transaction: None,
        }
    }
}

impl Entity for Deployer {
    const KIND: &'static str = "deployer";
    type Id = Address;

    fn id(&self) -> Address {
        self.id
    }
}

impl MetaOwner for Deployer {
    fn address(&self) -> Address {
        self.id
    }

    fn meta_mut(&mut self) -> &mut HashSet<Hash> {
        &mut self.meta
    }

    fn has_constructor_meta(&self) -> bool {
        self.constructor_meta.is_some()
    }

    fn set_constructor_meta(&mut self, meta: Vec<u8>, hash: Hash) {
        self.constructor_meta = Some(meta);
        self.constructor_meta_hash = Some(hash);
    }

    fn deploy_transaction(&self) -> Option<Hash> {
        self.deploy_transaction
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractKind {
    Contract,
    Proxy,
}

/// Caller contract owner record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub id: Address,
    pub kind: ContractKind,
    pub bytecode_hash: Option<Hash>,
    /// Delegate address when this contract is an ERC1167 proxy
    pub implementation: Option<Address>,
    pub initial_deployer: Option<Address>,
    pub meta: HashSet<Hash>,
    pub constructor_meta: Option<Vec<u8>>,
    pub constructor_meta_hash: Option<Hash>,
    pub deploy_transaction: Option<Hash>,
}

impl Entity for Contract {
    const KIND: &'static str = "contract";
    type Id = Address;

    fn id(&self) -> Address {
        self.id
    }
}

impl MetaOwner for Contract {
    fn address(&self) -> Address {
        self.id
    }

    fn meta_mut(&mut self) -> &mut HashSet<Hash> {
        &mut self.meta
    }

    fn has_constructor_meta(&self) -> bool {
        self.constructor_meta.is_some()
    }

    fn set_constructor_meta(&mut self, meta: Vec<u8>, hash: Hash) {
        self.constructor_meta = Some(meta);
        self.constructor_meta_hash = Some(hash);
    }

    fn deploy_transaction(&self) -> Option<Hash> {
        self.deploy_transaction
    }
}

/// Load a transaction by hash or build a fresh one from event data
pub fn generate_transaction<S: KeyValueStore>(
    store: &GraphStore<S>,
    hash: Hash,
    block_number: u64,
    timestamp: u64,
) -> Result<Transaction> {
    Ok(match store.load::<Transaction>(&hash)? {
        Some(existing) => existing,
        None => Transaction {
            id: hash,
            block_number,
            timestamp,
        },
    })
}

/// Load a contract or stage a fresh one, chasing ERC1167 proxies so
/// the implementation entity always exists alongside the proxy.
/// Returns the contract plus any implementation-chain contracts
/// created along the way; the caller persists them (or not) with
/// the envelope's acceptance decision.
pub fn get_contract<S: KeyValueStore, X: Extrospection>(
    store: &GraphStore<S>,
    extro: &X,
    address: Address,
) -> Result<(Contract, Vec<Contract>)> {
    let mut created = Vec::new();
    let contract = contract_at(store, extro, address, &mut created, &mut HashSet::new())?;
    Ok((contract, created))
}

fn contract_at<S: KeyValueStore, X: Extrospection>(
    store: &GraphStore<S>,
    extro: &X,
    address: Address,
    created: &mut Vec<Contract>,
    visiting: &mut HashSet<Address>,
) -> Result<Contract> {
    if let Some(existing) = store.load::<Contract>(&address)? {
        return Ok(existing);
    }

    let mut contract = Contract {
        id: address,
        kind: ContractKind::Contract,
        bytecode_hash: extro.bytecode_hash(address).ok(),
        implementation: None,
        initial_deployer: None,
        meta: HashSet::new(),
        constructor_meta: None,
        constructor_meta_hash: None,
        deploy_transaction: None,
    };

    // Proxy chains stop at the first address already being chased.
    if visiting.insert(address) {
        if let Some(delegate) = extro.is_erc1167_proxy(address)? {
            let implementation = contract_at(store, extro, delegate, created, visiting)?;
            if !created.iter().any(|c| c.id == implementation.id)
                && !store.exists::<Contract>(&implementation.id)?
            {
                created.push(implementation.clone());
            }
            contract.kind = ContractKind::Proxy;
            contract.implementation = Some(implementation.id);
        }
    }

    Ok(contract)
}

/// Delete an owner that never resolved constructor metadata, along
/// with its deploy transaction. Owners that already carry
/// constructor metadata are left untouched. Returns whether a
/// deletion happened.
pub fn remove_provisional_owner<S, O>(store: &GraphStore<S>, address: Address) -> Result<bool>
where
    S: KeyValueStore,
    O: Entity<Id = Address> + MetaOwner,
{
    let Some(owner) = store.load::<O>(&address)? else {
        return Ok(false);
    };
    if owner.has_constructor_meta() {
        return Ok(false);
    }

    if let Some(tx) = owner.deploy_transaction() {
        store.delete::<Transaction>(&tx)?;
    }
    store.delete::<O>(&address)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extrospection::MockExtrospection;
    use crate::store::MemoryStore;
    use crate::types::keccak256;

    #[test]
    fn proxy_detection_stages_the_implementation() {
        let store = GraphStore::new(MemoryStore::new());
        let proxy = Address::repeat_byte(0x01);
        let delegate = Address::repeat_byte(0x02);
        let extro = MockExtrospection::new()
            .with_bytecode(proxy, vec![0x36, 0x3d])
            .with_bytecode(delegate, vec![0x60, 0x80])
            .with_proxy(proxy, delegate);

        let (contract, created) = get_contract(&store, &extro, proxy).unwrap();
        assert_eq!(contract.kind, ContractKind::Proxy);
        assert_eq!(contract.implementation, Some(delegate));
        assert_eq!(contract.bytecode_hash, Some(keccak256(&[0x36, 0x3d])));
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].id, delegate);
        // Nothing persisted until the caller decides.
        assert_eq!(store.count::<Contract>().unwrap(), 0);
    }

    #[test]
    fn existing_contract_is_loaded_not_rebuilt() {
        let store = GraphStore::new(MemoryStore::new());
        let address = Address::repeat_byte(0x03);
        let mut persisted = Contract {
            id: address,
            kind: ContractKind::Contract,
            bytecode_hash: None,
            implementation: None,
            initial_deployer: None,
            meta: HashSet::new(),
            constructor_meta: Some(vec![0x01]),
            constructor_meta_hash: Some(keccak256(&[0x01])),
            deploy_transaction: None,
        };
        persisted.meta.insert(keccak256(b"meta"));
        store.save(&persisted).unwrap();

        let extro = MockExtrospection::new();
        let (contract, created) = get_contract(&store, &extro, address).unwrap();
        assert_eq!(contract, persisted);
        assert!(created.is_empty());
    }

    #[test]
    fn provisional_owner_rollback_removes_owner_and_transaction() {
        let store = GraphStore::new(MemoryStore::new());
        let address = Address::repeat_byte(0x04);
        let tx_hash = keccak256(b"deploy tx");

        store
            .save(&Transaction {
                id: tx_hash,
                block_number: 10,
                timestamp: 1000,
            })
            .unwrap();
        let mut deployer = Deployer::new(address);
        deployer.deploy_transaction = Some(tx_hash);
        store.save(&deployer).unwrap();

        assert!(remove_provisional_owner::<_, Deployer>(&store, address).unwrap());
        assert!(!store.exists::<Deployer>(&address).unwrap());
        assert!(!store.exists::<Transaction>(&tx_hash).unwrap());
    }

    #[test]
    fn accepted_owner_survives_rollback_attempts() {
        let store = GraphStore::new(MemoryStore::new());
        let address = Address::repeat_byte(0x05);

        let mut deployer = Deployer::new(address);
        deployer.set_constructor_meta(vec![0xff], keccak256(&[0xff]));
        store.save(&deployer).unwrap();

        assert!(!remove_provisional_owner::<_, Deployer>(&store, address).unwrap());
        assert!(store.exists::<Deployer>(&address).unwrap());
    }
}
