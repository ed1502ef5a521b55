//! On-chain event model and dispatch
//!
//! The event source delivers raw envelope bytes, emitting addresses
//! and transaction context. A single-consumer loop processes events
//! strictly one at a time; each envelope is fully accepted or fully
//! rejected before the next event is looked at.

use crate::bytecode::{self, PointerTable};
use crate::entities::{
    generate_transaction, get_contract, remove_provisional_owner, Account, Deployer,
    InterpreterInstance, ParserInstance, StoreInstance,
};
use crate::extrospection::Extrospection;
use crate::meta::pipeline::{
    apply_acceptance, evaluate_envelope, AcceptedEnvelope, MetaOwner, PipelineError,
};
use crate::meta::{
    RecordContent, AUTHORING_META_MAGIC, CONTRACT_META_MAGIC, DEPLOYER_BYTECODE_MAGIC,
    OCTET_STREAM_CONTENT_TYPE,
};
use crate::store::{GraphStore, KeyValueStore};
use crate::types::{keccak256, Address, Hash};
use anyhow::Result;
use log::{info, warn};
use tokio::sync::mpsc;

/// Interface name a deployer registers under before its first
/// envelope arrives
pub fn deployer_interface_hash() -> Hash {
    keccak256(b"IExpressionDeployerV3")
}

/// Context of the transaction an event was emitted in
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionInfo {
    pub hash: Hash,
    pub block_number: u64,
    pub timestamp: u64,
    pub from: Address,
}

/// One on-chain occurrence, as delivered by the event source
#[derive(Debug, Clone)]
pub enum ChainEvent {
    /// Registry announcement of a deployer interface implementer
    InterfaceRegistered {
        account: Address,
        interface_hash: Hash,
        implementer: Address,
        tx: TransactionInfo,
    },
    /// A deployer announcing its interpreter/store/parser trio and
    /// authoring metadata envelope
    DeployerDeployed {
        deployer: Address,
        interpreter: Address,
        store: Address,
        parser: Address,
        meta: Vec<u8>,
        /// Creation bytecode with constructor arguments already
        /// stripped by the event source
        bytecode: Vec<u8>,
        tx: TransactionInfo,
    },
    /// A caller contract emitting its own metadata envelope
    CallerMeta {
        emitter: Address,
        meta: Vec<u8>,
        tx: TransactionInfo,
    },
}

fn canonicalize_bytecode(raw_table: &[u8], source: &[u8]) -> bytecode::Result<Vec<u8>> {
    let table = PointerTable::parse(raw_table)?;
    bytecode::canonicalize(&table, source)
}

pub struct Dispatcher<S: KeyValueStore, X: Extrospection> {
    graph: GraphStore<S>,
    extro: X,
}

impl<S: KeyValueStore, X: Extrospection> Dispatcher<S, X> {
    pub fn new(graph: GraphStore<S>, extro: X) -> Self {
        Self { graph, extro }
    }

    pub fn graph(&self) -> &GraphStore<S> {
        &self.graph
    }

    /// Consume events until the channel closes. Handler failures
    /// are logged and do not stop the loop; a bad envelope only
    /// ever affects its own owner.
    pub async fn run(&self, mut events: mpsc::Receiver<ChainEvent>) {
        while let Some(event) = events.recv().await {
            if let Err(e) = self.handle_event(event) {
                warn!("event handling failed: {e:#}");
            }
        }
    }

    pub fn handle_event(&self, event: ChainEvent) -> Result<()> {
        match event {
            ChainEvent::InterfaceRegistered {
                account,
                interface_hash,
                tx,
                ..
            } => self.handle_interface_registered(account, interface_hash, tx),
            ChainEvent::DeployerDeployed {
                deployer,
                interpreter,
                store,
                parser,
                meta,
                bytecode,
                tx,
            } => self.handle_deployer_deployed(
                deployer,
                interpreter,
                store,
                parser,
                &meta,
                bytecode,
                tx,
            ),
            ChainEvent::CallerMeta { emitter, meta, tx } => {
                self.handle_caller_meta(emitter, &meta, tx)
            }
        }
    }

    /// Registration creates a provisional deployer and its deploy
    /// transaction. This is the only speculative write the node
    /// makes; it is deleted again if no valid envelope confirms it.
    fn handle_interface_registered(
        &self,
        account: Address,
        interface_hash: Hash,
        tx: TransactionInfo,
    ) -> Result<()> {
        if interface_hash != deployer_interface_hash() {
            return Ok(());
        }

        let transaction =
            generate_transaction(&self.graph, tx.hash, tx.block_number, tx.timestamp)?;
        let mut deployer = self
            .graph
            .load::<Deployer>(&account)?
            .unwrap_or_else(|| Deployer::new(account));
        deployer.deploy_transaction = Some(transaction.id);

        self.graph.save(&transaction)?;
        self.graph.save(&deployer)?;
        info!("registered provisional deployer {account:#x}");
        Ok(())
    }

    fn handle_deployer_deployed(
        &self,
        address: Address,
        interpreter: Address,
        store_address: Address,
        parser: Address,
        meta: &[u8],
        bytecode: Vec<u8>,
        tx: TransactionInfo,
    ) -> Result<()> {
        if !self.extro.scan_allowed_opcodes(interpreter)? {
            info!("interpreter {interpreter:#x} not allowed, dropping deployer {address:#x}");
            remove_provisional_owner::<S, Deployer>(&self.graph, address)?;
            return Ok(());
        }

        let mut accepted =
            match evaluate_envelope(&self.graph, meta, address, AUTHORING_META_MAGIC) {
                Ok(accepted) => accepted,
                Err(PipelineError::Rejected(reason)) => {
                    info!("envelope rejected for deployer {address:#x}: {reason}");
                    remove_provisional_owner::<S, Deployer>(&self.graph, address)?;
                    return Ok(());
                }
                Err(PipelineError::Store(e)) => return Err(e.into()),
            };

        let mut owner = self
            .graph
            .load::<Deployer>(&address)?
            .unwrap_or_else(|| Deployer::new(address));
        owner.bytecode_hash = Some(keccak256(&bytecode));
        owner.deployed_bytecode = self.extro.bytecode(address).ok();
        owner.deployed_bytecode_hash = owner.deployed_bytecode.as_deref().map(keccak256);
        owner.function_pointers = self.extro.function_pointers(interpreter)?;
        owner.interpreter = Some(interpreter);
        owner.store_instance = Some(store_address);
        owner.parser = Some(parser);
        owner.account = Some(tx.from);

        // The deployer's own creation bytecode joins the envelope as
        // a bytecode record, canonicalized against the interpreter's
        // pointer table when one is exposed. Fingerprinting failure
        // only drops this record, never the envelope.
        let fingerprint = match &owner.function_pointers {
            Some(table) => match canonicalize_bytecode(table, &bytecode) {
                Ok(canonical) => Some(canonical),
                Err(e) => {
                    warn!("bytecode fingerprinting failed for deployer {address:#x}: {e}");
                    None
                }
            },
            None => Some(bytecode.clone()),
        };
        owner.bytecode = Some(bytecode);
        if let Some(payload) = fingerprint {
            let bytecode_record = RecordContent {
                payload,
                magic_number: DEPLOYER_BYTECODE_MAGIC,
                content_type: Some(OCTET_STREAM_CONTENT_TYPE.to_string()),
                content_encoding: None,
                content_language: None,
            };
            accepted
                .batch
                .merge_record(&self.graph, &bytecode_record, address)?;
        }

        apply_acceptance(&mut owner, &accepted);

        self.graph.save(&InterpreterInstance { id: interpreter })?;
        self.graph.save(&StoreInstance { id: store_address })?;
        self.graph.save(&ParserInstance { id: parser })?;
        self.graph.save(&Account { id: tx.from })?;

        self.commit_owner(accepted, &owner)
    }

    fn handle_caller_meta(&self, emitter: Address, meta: &[u8], tx: TransactionInfo) -> Result<()> {
        let accepted = match evaluate_envelope(&self.graph, meta, emitter, CONTRACT_META_MAGIC) {
            Ok(accepted) => accepted,
            Err(PipelineError::Rejected(reason)) => {
                // No caller state is staged before acceptance, so
                // there is nothing to roll back; a contract already
                // committed at this address survives the rejection.
                info!("envelope rejected for contract {emitter:#x}: {reason}");
                return Ok(());
            }
            Err(PipelineError::Store(e)) => return Err(e.into()),
        };

        let (mut contract, implementations) = get_contract(&self.graph, &self.extro, emitter)?;
        let transaction =
            generate_transaction(&self.graph, tx.hash, tx.block_number, tx.timestamp)?;
        contract.deploy_transaction = Some(transaction.id);

        apply_acceptance(&mut contract, &accepted);

        self.graph.save(&transaction)?;
        for implementation in &implementations {
            self.graph.save(implementation)?;
        }
        self.graph.save(&Account { id: tx.from })?;

        self.commit_owner(accepted, &contract)
    }

    /// Persist an accepted envelope and its owner: envelope and
    /// records first, owner last.
    fn commit_owner<O>(&self, accepted: AcceptedEnvelope, owner: &O) -> Result<()>
    where
        O: MetaOwner + crate::store::Entity,
    {
        accepted.batch.commit(&self.graph)?;
        self.graph.save(owner)?;
        info!("accepted envelope for owner {:#x}", owner.address());
        Ok(())
    }
}
