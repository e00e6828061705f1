//! The canonical on-chain oracle record

use crate::error::{OracleError, OracleResult};
use crate::ledger::KeyHash;

use serde::{Deserialize, Serialize};

/// Fixed-point resolution for ratio and percentage settings.
pub const BPS_RESOLUTION: u64 = 10_000;

/// A price observation: value plus the on-chain time it was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataFeed {
    pub price: u64,
    pub updated_at: u64,
}

/// One registered node: its credential, its last submission and its
/// accumulated unclaimed reward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEntry {
    pub operator: KeyHash,
    pub feed: Option<DataFeed>,
    pub reward: u64,
}

impl NodeEntry {
    pub fn new(operator: KeyHash) -> Self {
        Self {
            operator,
            feed: None,
            reward: 0,
        }
    }
}

/// Reward amounts credited by a successful aggregation, in lovelace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardPolicy {
    pub node_reward: u64,
    pub aggregator_reward: u64,
    pub platform_reward: u64,
}

/// Owner authority: the owner credential plus platform co-signers.
/// `threshold` is the validator-side acceptance bound; the off-chain
/// coordinator collects signatures from the full listed set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformAuthority {
    pub owner: KeyHash,
    pub cosigners: Vec<KeyHash>,
    pub threshold: u32,
}

impl PlatformAuthority {
    /// Every credential whose signature owner-gated actions demand.
    pub fn required_signers(&self) -> Vec<KeyHash> {
        let mut signers = vec![self.owner];
        for cosigner in &self.cosigners {
            if !signers.contains(cosigner) {
                signers.push(*cosigner);
            }
        }
        signers
    }

    pub fn is_member(&self, key: &KeyHash) -> bool {
        self.owner == *key || self.cosigners.contains(key)
    }
}

/// Aggregation parameters and authority, replaced atomically by EditSettings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleSettings {
    /// Absolute minimum count of fresh submissions for an aggregation.
    pub min_fresh_nodes: u32,
    /// Required fresh-submission ratio over the registered node set, in
    /// basis points of `BPS_RESOLUTION`.
    pub fresh_ratio_bps: u32,
    /// Age past which a node submission no longer counts as fresh, in ms.
    pub staleness_ms: u64,
    /// Minimum age of the previous aggregate before the window reopens, ms.
    pub aggregate_interval_ms: u64,
    /// Price change that reopens the window early, in basis points.
    pub min_change_bps: u32,
    /// Minimum reserve that must remain locked with the state.
    pub min_deposit: u64,
    pub rewards: RewardPolicy,
    /// IQR multiplier for outlier rejection during consensus.
    pub iqr_multiplier: u32,
    /// Maximum divergence from the median for consensus membership, bps.
    pub divergence_bps: u32,
    pub platform: PlatformAuthority,
}

impl OracleSettings {
    /// Structural validation applied on decode and on EditSettings.
    pub fn validate(&self) -> OracleResult<()> {
        if u64::from(self.fresh_ratio_bps) > BPS_RESOLUTION {
            return Err(OracleError::SchemaMismatch(format!(
                "fresh_ratio_bps {} exceeds resolution {}",
                self.fresh_ratio_bps, BPS_RESOLUTION
            )));
        }
        if u64::from(self.min_change_bps) > BPS_RESOLUTION {
            return Err(OracleError::SchemaMismatch(format!(
                "min_change_bps {} exceeds resolution {}",
                self.min_change_bps, BPS_RESOLUTION
            )));
        }
        if self.staleness_ms == 0 || self.aggregate_interval_ms == 0 {
            return Err(OracleError::SchemaMismatch(
                "staleness and aggregation windows must be positive".into(),
            ));
        }
        if self.divergence_bps == 0 {
            return Err(OracleError::SchemaMismatch(
                "divergence_bps must be positive".into(),
            ));
        }
        if self.threshold_invalid() {
            return Err(OracleError::SchemaMismatch(format!(
                "platform threshold {} exceeds signer count {}",
                self.platform.threshold,
                self.platform.required_signers().len()
            )));
        }
        Ok(())
    }

    fn threshold_invalid(&self) -> bool {
        self.platform.threshold as usize > self.platform.required_signers().len()
            || self.platform.threshold == 0
    }
}

/// Lifecycle tag of the state object. `Closed` is terminal; the marker token
/// is burned by the same transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lifecycle {
    Active,
    Closed,
}

/// The canonical on-chain record. Exactly one exists at a time, identified
/// by the state marker token, and it changes only through a validated
/// transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleState {
    /// Last aggregated price; `None` until the first aggregation.
    pub feed: Option<DataFeed>,
    /// Registered nodes, ordered by operator credential.
    pub nodes: Vec<NodeEntry>,
    pub settings: OracleSettings,
    /// Accumulated platform reward not yet collected.
    pub platform_reward: u64,
    pub lifecycle: Lifecycle,
}

impl OracleState {
    pub fn node(&self, operator: &KeyHash) -> Option<&NodeEntry> {
        self.nodes.iter().find(|n| n.operator == *operator)
    }

    pub fn is_registered(&self, operator: &KeyHash) -> bool {
        self.node(operator).is_some()
    }

    /// Fresh-submission count needed to aggregate: the settings ratio over
    /// the registered set, floored, but never below the absolute minimum.
    pub fn required_fresh(&self) -> usize {
        let by_ratio = (self.nodes.len() as u64 * u64::from(self.settings.fresh_ratio_bps))
            / BPS_RESOLUTION;
        (by_ratio as usize).max(self.settings.min_fresh_nodes as usize)
    }

    /// Total reward lovelace still owed to nodes and platform.
    pub fn total_unclaimed(&self) -> u64 {
        self.nodes.iter().map(|n| n.reward).sum::<u64>() + self.platform_reward
    }

    /// Structural validation applied after decoding a datum.
    pub fn validate(&self) -> OracleResult<()> {
        self.settings.validate()?;
        let mut seen = std::collections::BTreeSet::new();
        for node in &self.nodes {
            if !seen.insert(node.operator) {
                return Err(OracleError::SchemaMismatch(format!(
                    "duplicate node operator {}",
                    node.operator
                )));
            }
        }
        Ok(())
    }
}
