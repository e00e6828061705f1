//! Multi-asset value arithmetic

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of a native asset: minting policy plus asset name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AssetId {
    pub policy: Vec<u8>,
    pub name: Vec<u8>,
}

impl AssetId {
    pub fn new(policy: Vec<u8>, name: Vec<u8>) -> Self {
        Self { policy, name }
    }
}

// Serialized as "policyhex.namehex" so asset ids work as map keys in every
// serde format.
impl Serialize for AssetId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AssetId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let (policy, name) = encoded
            .split_once('.')
            .ok_or_else(|| D::Error::custom("asset id must be policy.name"))?;
        Ok(AssetId {
            policy: hex::decode(policy).map_err(D::Error::custom)?,
            name: hex::decode(name).map_err(D::Error::custom)?,
        })
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}",
            hex::encode(&self.policy),
            hex::encode(&self.name)
        )
    }
}

/// A bundle of lovelace plus native assets locked by an output.
///
/// Quantities are unsigned; subtraction is checked so that value can never go
/// negative while balancing a transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Value {
    pub lovelace: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub assets: BTreeMap<AssetId, u64>,
}

impl Value {
    pub fn lovelace(amount: u64) -> Self {
        Self {
            lovelace: amount,
            assets: BTreeMap::new(),
        }
    }

    pub fn with_asset(mut self, asset: AssetId, quantity: u64) -> Self {
        if quantity > 0 {
            *self.assets.entry(asset).or_insert(0) += quantity;
        }
        self
    }

    pub fn asset(&self, asset: &AssetId) -> u64 {
        self.assets.get(asset).copied().unwrap_or(0)
    }

    pub fn is_ada_only(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn merge(&self, other: &Value) -> Value {
        let mut out = self.clone();
        out.lovelace += other.lovelace;
        for (asset, quantity) in &other.assets {
            *out.assets.entry(asset.clone()).or_insert(0) += quantity;
        }
        out
    }

    /// Subtract `other`, returning `None` if any component would go negative.
    /// Asset entries that reach zero are dropped.
    pub fn checked_sub(&self, other: &Value) -> Option<Value> {
        let lovelace = self.lovelace.checked_sub(other.lovelace)?;
        let mut assets = self.assets.clone();
        for (asset, quantity) in &other.assets {
            let held = assets.get_mut(asset)?;
            *held = held.checked_sub(*quantity)?;
            if *held == 0 {
                assets.remove(asset);
            }
        }
        Some(Value { lovelace, assets })
    }

    /// Check that every component of `other` is covered by `self`.
    pub fn contains(&self, other: &Value) -> bool {
        self.lovelace >= other.lovelace
            && other
                .assets
                .iter()
                .all(|(asset, quantity)| self.asset(asset) >= *quantity)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} lovelace", self.lovelace)?;
        for (asset, quantity) in &self.assets {
            write!(f, " + {} {}", quantity, asset)?;
        }
        Ok(())
    }
}
