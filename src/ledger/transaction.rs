//! Transaction body, witnesses and content hashing

use crate::error::{OracleError, OracleResult};
use crate::ledger::utxo::{KeyHash, OutputRef, TxOutput};
use crate::ledger::value::AssetId;
use crate::plutus::PlutusData;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Sha3_256};
use std::collections::BTreeMap;
use std::fmt;

/// Transaction identifier: hash of the canonical body bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TxId(pub [u8; 32]);

impl Serialize for TxId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for TxId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        TxId::from_hex(&encoded).map_err(D::Error::custom)
    }
}

impl TxId {
    pub fn from_hex(encoded: &str) -> OracleResult<Self> {
        let bytes = hex::decode(encoded)
            .map_err(|e| OracleError::Internal(format!("invalid tx id hex: {}", e)))?;
        if bytes.len() != 32 {
            return Err(OracleError::Internal(format!(
                "tx id must be 32 bytes, got {}",
                bytes.len()
            )));
        }
        let mut id = [0u8; 32];
        id.copy_from_slice(&bytes);
        Ok(Self(id))
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Redeemer supplied for spending a script input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendRedeemer {
    pub input: OutputRef,
    pub data: PlutusData,
}

/// The body of a transaction. Inputs are kept sorted so that identical
/// requests against identical snapshots produce identical bytes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransactionBody {
    pub inputs: Vec<OutputRef>,
    pub outputs: Vec<TxOutput>,
    pub fee: u64,
    /// Positive quantities mint, negative quantities burn.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub mint: BTreeMap<AssetId, i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_signers: Vec<KeyHash>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub redeemers: Vec<SpendRedeemer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validity_start: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
}

impl TransactionBody {
    /// Canonical wire bytes of the body.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        // Serialization of a fixed struct shape cannot fail.
        ciborium::into_writer(self, &mut bytes)
            .expect("transaction body serialization is infallible");
        bytes
    }

    /// Content hash of the body; identifies the transaction and keys
    /// signing sessions.
    pub fn hash(&self) -> TxId {
        let digest = Sha3_256::digest(self.to_bytes());
        let mut id = [0u8; 32];
        id.copy_from_slice(&digest);
        TxId(id)
    }
}

/// A verification-key witness: the key and its signature over the body hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VkeyWitness {
    pub vkey: Vec<u8>,
    pub signature: Vec<u8>,
}

impl VkeyWitness {
    /// Credential this witness vouches for.
    pub fn key_hash(&self) -> KeyHash {
        KeyHash::of_vkey(&self.vkey)
    }
}

/// A transaction at any point of its signing lifecycle. Unsigned means an
/// empty witness list; fully signed means the witness credentials form a
/// superset of the required signer set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub body: TransactionBody,
    pub witnesses: Vec<VkeyWitness>,
}

impl Transaction {
    pub fn unsigned(body: TransactionBody) -> Self {
        Self {
            body,
            witnesses: Vec::new(),
        }
    }

    pub fn id(&self) -> TxId {
        self.body.hash()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        ciborium::into_writer(self, &mut bytes)
            .expect("transaction serialization is infallible");
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> OracleResult<Self> {
        ciborium::from_reader(bytes)
            .map_err(|e| OracleError::Internal(format!("transaction decode failed: {}", e)))
    }

    /// Credentials vouched for by the current witness set.
    pub fn witness_key_hashes(&self) -> Vec<KeyHash> {
        self.witnesses.iter().map(VkeyWitness::key_hash).collect()
    }
}
