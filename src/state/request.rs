//! Typed action requests
//!
//! An `ActionRequest` carries only the semantic delta of a transition, never
//! raw binary. Each variant maps to one redeemer constructor and one handler
//! in the transaction builder, so adding an action kind is compile-time
//! checked throughout the engine.

use crate::ledger::KeyHash;
use crate::state::model::{OracleSettings, OracleState};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionRequest {
    /// A node records its price observation.
    SubmitPrice { node: KeyHash, price: u64 },
    /// A node claims its accumulated reward.
    NodeCollect { node: KeyHash },
    /// The platform claims its accumulated reward.
    PlatformCollect { destination: KeyHash },
    /// Fold fresh node submissions into a new aggregate price.
    Aggregate { aggregator: KeyHash },
    /// Replace the oracle settings atomically.
    EditSettings { settings: OracleSettings },
    /// Register new node operators.
    AddNodes { operators: Vec<KeyHash> },
    /// Deregister node operators; their rewards must have been collected.
    RemoveNodes { operators: Vec<KeyHash> },
    /// Destroy the state object, burn the marker and return locked funds.
    Close,
    /// Increase the locked reserve.
    AddFunds { amount: u64 },
    /// Publish the validator as a reusable reference-script UTxO.
    CreateReferenceScript { script: Vec<u8> },
}

impl ActionRequest {
    /// Stable name for logs and error context.
    pub fn kind(&self) -> &'static str {
        match self {
            ActionRequest::SubmitPrice { .. } => "SubmitPrice",
            ActionRequest::NodeCollect { .. } => "NodeCollect",
            ActionRequest::PlatformCollect { .. } => "PlatformCollect",
            ActionRequest::Aggregate { .. } => "Aggregate",
            ActionRequest::EditSettings { .. } => "EditSettings",
            ActionRequest::AddNodes { .. } => "AddNodes",
            ActionRequest::RemoveNodes { .. } => "RemoveNodes",
            ActionRequest::Close => "Close",
            ActionRequest::AddFunds { .. } => "AddFunds",
            ActionRequest::CreateReferenceScript { .. } => "CreateReferenceScript",
        }
    }

    /// True for actions gated on the owner authority.
    pub fn is_owner_action(&self) -> bool {
        matches!(
            self,
            ActionRequest::EditSettings { .. }
                | ActionRequest::AddNodes { .. }
                | ActionRequest::RemoveNodes { .. }
                | ActionRequest::PlatformCollect { .. }
                | ActionRequest::Close
        )
    }

    /// The credentials whose signatures this action demands, derived from
    /// the oracle settings and the action kind. `wallet` is the credential
    /// of the party funding the transaction.
    pub fn required_signers(&self, settings: &OracleSettings, wallet: &KeyHash) -> Vec<KeyHash> {
        match self {
            ActionRequest::SubmitPrice { node, .. } => vec![*node],
            ActionRequest::NodeCollect { node } => vec![*node],
            ActionRequest::Aggregate { aggregator } => vec![*aggregator],
            ActionRequest::AddFunds { .. } | ActionRequest::CreateReferenceScript { .. } => {
                vec![*wallet]
            }
            ActionRequest::EditSettings { .. }
            | ActionRequest::AddNodes { .. }
            | ActionRequest::RemoveNodes { .. }
            | ActionRequest::PlatformCollect { .. }
            | ActionRequest::Close => settings.platform.required_signers(),
        }
    }
}

/// Check a signer set against the state's full allowed population: the
/// owner authority plus registered node operators. Used by the pre-sign
/// review of foreign-built transactions.
pub fn allowed_signer(state: &OracleState, key: &KeyHash) -> bool {
    state.settings.platform.is_member(key) || state.is_registered(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::model::fixtures::{operator, settings, state_with_nodes};

    #[test]
    fn node_actions_require_only_the_node() {
        let settings = settings();
        let wallet = operator("wallet");
        let node = operator("node-1");
        let request = ActionRequest::NodeCollect { node };
        assert_eq!(request.required_signers(&settings, &wallet), vec![node]);
    }

    #[test]
    fn owner_actions_require_the_full_platform_set() {
        let settings = settings();
        let wallet = operator("wallet");
        let request = ActionRequest::Close;
        let signers = request.required_signers(&settings, &wallet);
        assert_eq!(
            signers,
            vec![
                operator("owner"),
                operator("platform-1"),
                operator("platform-2")
            ]
        );
    }

    #[test]
    fn funding_actions_require_the_wallet() {
        let settings = settings();
        let wallet = operator("wallet");
        let request = ActionRequest::AddFunds { amount: 1 };
        assert_eq!(request.required_signers(&settings, &wallet), vec![wallet]);
    }

    #[test]
    fn allowed_signers_cover_platform_and_nodes() {
        let state = state_with_nodes(2);
        assert!(allowed_signer(&state, &operator("owner")));
        assert!(allowed_signer(&state, &operator("platform-2")));
        assert!(allowed_signer(&state, &operator("node-0")));
        assert!(!allowed_signer(&state, &operator("stranger")));
    }
}
