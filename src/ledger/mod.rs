//! Ledger primitives for a UTxO-model chain
//!
//! This module provides:
//! - Multi-asset values with conservation-friendly arithmetic
//! - Output references, outputs and UTxOs as observed from the indexer
//! - Transaction body / witness types and content hashing

pub mod transaction;
pub mod utxo;
pub mod value;

pub use transaction::{SpendRedeemer, Transaction, TransactionBody, TxId, VkeyWitness};
pub use utxo::{Address, Credential, KeyHash, OutputRef, ScriptHash, TxOutput, Utxo};
pub use value::{AssetId, Value};
