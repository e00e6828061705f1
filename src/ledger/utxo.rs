//! Outputs, output references and addresses

use crate::error::{OracleError, OracleResult};
use crate::ledger::transaction::TxId;
use crate::ledger::value::Value;
use crate::plutus::PlutusData;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Sha3_256};
use std::fmt;

/// Length of a credential hash in bytes.
pub const KEY_HASH_LEN: usize = 28;

/// Hash of a verification key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyHash(pub [u8; KEY_HASH_LEN]);

// Hex strings on the wire, so credentials work as map keys in every serde
// format.
impl Serialize for KeyHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for KeyHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let bytes = hex::decode(&encoded).map_err(D::Error::custom)?;
        KeyHash::from_slice(&bytes).map_err(D::Error::custom)
    }
}

impl KeyHash {
    /// Derive the credential hash of a verification key.
    pub fn of_vkey(vkey: &[u8]) -> Self {
        let digest = Sha3_256::digest(vkey);
        let mut hash = [0u8; KEY_HASH_LEN];
        hash.copy_from_slice(&digest[..KEY_HASH_LEN]);
        Self(hash)
    }

    pub fn from_slice(bytes: &[u8]) -> OracleResult<Self> {
        if bytes.len() != KEY_HASH_LEN {
            return Err(OracleError::SchemaMismatch(format!(
                "credential hash must be {} bytes, got {}",
                KEY_HASH_LEN,
                bytes.len()
            )));
        }
        let mut hash = [0u8; KEY_HASH_LEN];
        hash.copy_from_slice(bytes);
        Ok(Self(hash))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for KeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Hash of a validator script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScriptHash(pub [u8; KEY_HASH_LEN]);

impl Serialize for ScriptHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for ScriptHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let bytes = hex::decode(&encoded).map_err(D::Error::custom)?;
        Ok(ScriptHash(KeyHash::from_slice(&bytes).map_err(D::Error::custom)?.0))
    }
}

impl ScriptHash {
    pub fn of_script(script: &[u8]) -> Self {
        let digest = Sha3_256::digest(script);
        let mut hash = [0u8; KEY_HASH_LEN];
        hash.copy_from_slice(&digest[..KEY_HASH_LEN]);
        Self(hash)
    }
}

impl fmt::Display for ScriptHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Payment credential of an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Credential {
    Key(KeyHash),
    Script(ScriptHash),
}

/// A ledger address: payment credential plus optional staking part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address {
    pub payment: Credential,
    pub stake: Option<KeyHash>,
}

impl Address {
    pub fn key(hash: KeyHash) -> Self {
        Self {
            payment: Credential::Key(hash),
            stake: None,
        }
    }

    pub fn script(hash: ScriptHash) -> Self {
        Self {
            payment: Credential::Script(hash),
            stake: None,
        }
    }

    /// Wire encoding used by the indexer interface: a tag byte followed by
    /// the payment hash, then the stake hash when present.
    pub fn to_hex(&self) -> String {
        let mut bytes = Vec::with_capacity(1 + 2 * KEY_HASH_LEN);
        match self.payment {
            Credential::Key(hash) => {
                bytes.push(0x00);
                bytes.extend_from_slice(&hash.0);
            }
            Credential::Script(hash) => {
                bytes.push(0x01);
                bytes.extend_from_slice(&hash.0);
            }
        }
        if let Some(stake) = self.stake {
            bytes.extend_from_slice(&stake.0);
        }
        hex::encode(bytes)
    }

    pub fn from_hex(encoded: &str) -> OracleResult<Self> {
        let bytes = hex::decode(encoded)
            .map_err(|e| OracleError::Config(format!("Invalid address hex: {}", e)))?;
        if bytes.len() != 1 + KEY_HASH_LEN && bytes.len() != 1 + 2 * KEY_HASH_LEN {
            return Err(OracleError::Config(format!(
                "Invalid address length: {}",
                bytes.len()
            )));
        }
        let payment_hash = &bytes[1..1 + KEY_HASH_LEN];
        let payment = match bytes[0] {
            0x00 => Credential::Key(KeyHash::from_slice(payment_hash)?),
            0x01 => Credential::Script(ScriptHash(
                KeyHash::from_slice(payment_hash)?.0,
            )),
            tag => {
                return Err(OracleError::Config(format!(
                    "Unknown address tag: {:#04x}",
                    tag
                )))
            }
        };
        let stake = if bytes.len() == 1 + 2 * KEY_HASH_LEN {
            Some(KeyHash::from_slice(&bytes[1 + KEY_HASH_LEN..])?)
        } else {
            None
        };
        Ok(Self { payment, stake })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Reference to a transaction output: source transaction plus index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OutputRef {
    pub tx_id: TxId,
    pub index: u16,
}

impl OutputRef {
    pub fn new(tx_id: TxId, index: u16) -> Self {
        Self { tx_id, index }
    }
}

impl fmt::Display for OutputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.tx_id, self.index)
    }
}

/// A transaction output: locked value plus optional datum / reference script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub address: Address,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datum: Option<PlutusData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<Vec<u8>>,
}

impl TxOutput {
    pub fn new(address: Address, value: Value) -> Self {
        Self {
            address,
            value,
            datum: None,
            script: None,
        }
    }

    pub fn with_datum(mut self, datum: PlutusData) -> Self {
        self.datum = Some(datum);
        self
    }

    pub fn with_script(mut self, script: Vec<u8>) -> Self {
        self.script = Some(script);
        self
    }
}

/// An unspent output as observed from the indexer. Immutable once observed;
/// consumed atomically by inclusion as a transaction input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub reference: OutputRef,
    pub output: TxOutput,
}
