//! The oracle state machine
//!
//! The authoritative off-chain transition policy, enforced redundantly with
//! the validator. Every action request is checked here before a transaction
//! is built; a violated precondition fails with `IllegalTransition` without
//! any chain interaction.

use crate::error::{OracleError, OracleResult};
use crate::ledger::KeyHash;
use crate::state::aggregate::{self, Consensus};
use crate::state::model::{DataFeed, Lifecycle, NodeEntry, OracleSettings, OracleState};
use crate::state::request::ActionRequest;

/// A reward payment the transaction must emit as an output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payout {
    pub to: KeyHash,
    pub amount: u64,
}

/// A validated transition: the action plus everything derived while checking
/// its preconditions. Applying a transition is infallible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    SubmitPrice {
        node: KeyHash,
        price: u64,
        now_ms: u64,
    },
    NodeCollect {
        node: KeyHash,
        amount: u64,
    },
    PlatformCollect {
        destination: KeyHash,
        amount: u64,
    },
    Aggregate {
        aggregator: KeyHash,
        consensus: Consensus,
        now_ms: u64,
    },
    EditSettings {
        settings: OracleSettings,
    },
    AddNodes {
        operators: Vec<KeyHash>,
    },
    RemoveNodes {
        operators: Vec<KeyHash>,
    },
    Close {
        payouts: Vec<Payout>,
    },
    AddFunds {
        amount: u64,
    },
    PublishScript {
        script: Vec<u8>,
    },
}

fn illegal(request: &ActionRequest, reason: impl Into<String>) -> OracleError {
    OracleError::IllegalTransition {
        action: request.kind(),
        reason: reason.into(),
    }
}

/// Validate `request` against `state` at on-chain time `now_ms`, producing
/// the transition to apply. This is the single enforcement point for the
/// transition table.
pub fn plan(
    state: &OracleState,
    request: &ActionRequest,
    now_ms: u64,
) -> OracleResult<Transition> {
    if state.lifecycle == Lifecycle::Closed {
        return Err(illegal(request, "oracle is closed"));
    }

    match request {
        ActionRequest::SubmitPrice { node, price } => {
            if !state.is_registered(node) {
                return Err(illegal(request, format!("{} is not a registered node", node)));
            }
            if *price == 0 {
                return Err(illegal(request, "price must be positive"));
            }
            Ok(Transition::SubmitPrice {
                node: *node,
                price: *price,
                now_ms,
            })
        }

        ActionRequest::NodeCollect { node } => {
            let entry = state
                .node(node)
                .ok_or_else(|| illegal(request, format!("{} is not a registered node", node)))?;
            if entry.reward == 0 {
                return Err(illegal(request, "node has no unclaimed reward"));
            }
            Ok(Transition::NodeCollect {
                node: *node,
                amount: entry.reward,
            })
        }

        ActionRequest::PlatformCollect { destination } => {
            if state.platform_reward == 0 {
                return Err(illegal(request, "platform has no unclaimed reward"));
            }
            Ok(Transition::PlatformCollect {
                destination: *destination,
                amount: state.platform_reward,
            })
        }

        ActionRequest::Aggregate { aggregator } => {
            if !state.is_registered(aggregator) {
                return Err(illegal(
                    request,
                    format!("{} has no aggregation permission", aggregator),
                ));
            }
            let fresh = aggregate::fresh_feeds(state, now_ms);
            let required = state.required_fresh();
            if fresh.len() < required {
                return Err(illegal(
                    request,
                    format!(
                        "{} fresh submissions, {} required",
                        fresh.len(),
                        required
                    ),
                ));
            }
            let feeds: Vec<(KeyHash, u64)> = fresh
                .iter()
                .map(|(operator, feed)| (*operator, feed.price))
                .collect();
            let consensus = aggregate::run(&state.settings, &feeds)
                .ok_or_else(|| illegal(request, "no submissions survive consensus"))?;
            if !aggregate::window_open(state, now_ms, consensus.price) {
                return Err(illegal(
                    request,
                    "aggregation window closed: interval not elapsed and price unchanged",
                ));
            }
            Ok(Transition::Aggregate {
                aggregator: *aggregator,
                consensus,
                now_ms,
            })
        }

        ActionRequest::EditSettings { settings } => {
            settings
                .validate()
                .map_err(|e| illegal(request, e.to_string()))?;
            Ok(Transition::EditSettings {
                settings: settings.clone(),
            })
        }

        ActionRequest::AddNodes { operators } => {
            if operators.is_empty() {
                return Err(illegal(request, "no operators given"));
            }
            let mut seen = std::collections::BTreeSet::new();
            for operator in operators {
                if !seen.insert(*operator) {
                    return Err(illegal(request, format!("duplicate operator {}", operator)));
                }
                if state.is_registered(operator) {
                    return Err(illegal(
                        request,
                        format!("{} is already registered", operator),
                    ));
                }
            }
            Ok(Transition::AddNodes {
                operators: operators.clone(),
            })
        }

        ActionRequest::RemoveNodes { operators } => {
            if operators.is_empty() {
                return Err(illegal(request, "no operators given"));
            }
            for operator in operators {
                let entry = state.node(operator).ok_or_else(|| {
                    illegal(request, format!("{} is not a registered node", operator))
                })?;
                if entry.reward > 0 {
                    return Err(illegal(
                        request,
                        format!(
                            "{} holds {} lovelace of unclaimed reward",
                            operator, entry.reward
                        ),
                    ));
                }
            }
            Ok(Transition::RemoveNodes {
                operators: operators.clone(),
            })
        }

        ActionRequest::Close => {
            let mut payouts: Vec<Payout> = state
                .nodes
                .iter()
                .filter(|node| node.reward > 0)
                .map(|node| Payout {
                    to: node.operator,
                    amount: node.reward,
                })
                .collect();
            if state.platform_reward > 0 {
                payouts.push(Payout {
                    to: state.settings.platform.owner,
                    amount: state.platform_reward,
                });
            }
            Ok(Transition::Close { payouts })
        }

        ActionRequest::AddFunds { amount } => {
            if *amount == 0 {
                return Err(illegal(request, "amount must be positive"));
            }
            Ok(Transition::AddFunds { amount: *amount })
        }

        ActionRequest::CreateReferenceScript { script } => {
            if script.is_empty() {
                return Err(illegal(request, "script is empty"));
            }
            Ok(Transition::PublishScript {
                script: script.clone(),
            })
        }
    }
}

impl Transition {
    /// Produce the successor state and the payouts the transaction must
    /// emit. `None` means the state object is destroyed (Close).
    pub fn apply(&self, state: &OracleState) -> (Option<OracleState>, Vec<Payout>) {
        match self {
            Transition::SubmitPrice { node, price, now_ms } => {
                let mut next = state.clone();
                if let Some(entry) = next.nodes.iter_mut().find(|n| n.operator == *node) {
                    entry.feed = Some(DataFeed {
                        price: *price,
                        updated_at: *now_ms,
                    });
                }
                (Some(next), vec![])
            }

            Transition::NodeCollect { node, amount } => {
                let mut next = state.clone();
                if let Some(entry) = next.nodes.iter_mut().find(|n| n.operator == *node) {
                    entry.reward = 0;
                }
                (
                    Some(next),
                    vec![Payout {
                        to: *node,
                        amount: *amount,
                    }],
                )
            }

            Transition::PlatformCollect {
                destination,
                amount,
            } => {
                let mut next = state.clone();
                next.platform_reward = 0;
                (
                    Some(next),
                    vec![Payout {
                        to: *destination,
                        amount: *amount,
                    }],
                )
            }

            Transition::Aggregate {
                aggregator,
                consensus,
                now_ms,
            } => {
                let mut next = state.clone();
                next.feed = Some(DataFeed {
                    price: consensus.price,
                    updated_at: *now_ms,
                });
                let rewards = next.settings.rewards;
                for entry in next.nodes.iter_mut() {
                    if consensus.participants.contains(&entry.operator) {
                        entry.reward += rewards.node_reward;
                    }
                    if entry.operator == *aggregator {
                        entry.reward += rewards.aggregator_reward;
                    }
                }
                next.platform_reward += rewards.platform_reward;
                (Some(next), vec![])
            }

            Transition::EditSettings { settings } => {
                let mut next = state.clone();
                next.settings = settings.clone();
                (Some(next), vec![])
            }

            Transition::AddNodes { operators } => {
                let mut next = state.clone();
                for operator in operators {
                    next.nodes.push(NodeEntry::new(*operator));
                }
                next.nodes.sort_by(|a, b| a.operator.cmp(&b.operator));
                (Some(next), vec![])
            }

            Transition::RemoveNodes { operators } => {
                let mut next = state.clone();
                next.nodes.retain(|node| !operators.contains(&node.operator));
                (Some(next), vec![])
            }

            Transition::Close { payouts } => (None, payouts.clone()),

            // Value-level only; the datum is unchanged.
            Transition::AddFunds { .. } => (Some(state.clone()), vec![]),

            // Publishes a separate UTxO; the state object is untouched.
            Transition::PublishScript { .. } => (Some(state.clone()), vec![]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::model::fixtures::{operator, state_with_nodes};

    const NOW: u64 = 1_000_000;

    fn submit_all(state: &mut OracleState, base_price: u64, at: u64) {
        for (i, node) in state.nodes.iter_mut().enumerate() {
            node.feed = Some(DataFeed {
                price: base_price + i as u64,
                updated_at: at,
            });
        }
    }

    #[test]
    fn aggregate_needs_enough_fresh_submissions() {
        let mut state = state_with_nodes(5);
        let request = ActionRequest::Aggregate {
            aggregator: operator("node-0"),
        };

        // Only two fresh submissions out of five: rejected.
        for node in state.nodes.iter_mut().take(2) {
            node.feed = Some(DataFeed {
                price: 1000,
                updated_at: NOW - 1000,
            });
        }
        let err = plan(&state, &request, NOW).unwrap_err();
        assert!(matches!(err, OracleError::IllegalTransition { .. }));

        // Four fresh submissions: accepted, price recomputed, time advanced.
        submit_all(&mut state, 1000, NOW - 1000);
        state.nodes[4].feed = None;
        let transition = plan(&state, &request, NOW).unwrap();
        let (next, payouts) = transition.apply(&state);
        let next = next.unwrap();
        assert!(payouts.is_empty());
        let feed = next.feed.unwrap();
        assert_eq!(feed.updated_at, NOW);
        assert_eq!(feed.price, 1001);
    }

    #[test]
    fn aggregate_credits_rewards() {
        let mut state = state_with_nodes(4);
        submit_all(&mut state, 2000, NOW - 500);
        let transition = plan(
            &state,
            &ActionRequest::Aggregate {
                aggregator: operator("node-1"),
            },
            NOW,
        )
        .unwrap();
        let (next, _) = transition.apply(&state);
        let next = next.unwrap();

        let rewards = state.settings.rewards;
        assert_eq!(next.node(&operator("node-0")).unwrap().reward, rewards.node_reward);
        assert_eq!(
            next.node(&operator("node-1")).unwrap().reward,
            rewards.node_reward + rewards.aggregator_reward
        );
        assert_eq!(next.platform_reward, rewards.platform_reward);
    }

    #[test]
    fn unregistered_aggregator_is_rejected() {
        let mut state = state_with_nodes(3);
        submit_all(&mut state, 1000, NOW - 100);
        let err = plan(
            &state,
            &ActionRequest::Aggregate {
                aggregator: operator("stranger"),
            },
            NOW,
        )
        .unwrap_err();
        assert!(matches!(err, OracleError::IllegalTransition { .. }));
    }

    #[test]
    fn remove_requires_zero_reward() {
        let mut state = state_with_nodes(3);
        state.nodes[1].reward = 4_000_000;
        let target = state.nodes[1].operator;
        let request = ActionRequest::RemoveNodes {
            operators: vec![target],
        };

        let err = plan(&state, &request, NOW).unwrap_err();
        assert!(matches!(err, OracleError::IllegalTransition { .. }));

        // After the node collects, removal succeeds.
        let (collected, payouts) = plan(
            &state,
            &ActionRequest::NodeCollect { node: target },
            NOW,
        )
        .unwrap()
        .apply(&state);
        assert_eq!(payouts, vec![Payout { to: target, amount: 4_000_000 }]);
        let collected = collected.unwrap();

        let (next, _) = plan(&collected, &request, NOW).unwrap().apply(&collected);
        assert!(!next.unwrap().is_registered(&target));
    }

    #[test]
    fn add_rejects_duplicates_and_existing() {
        let state = state_with_nodes(2);
        let fresh = operator("node-9");
        assert!(plan(
            &state,
            &ActionRequest::AddNodes {
                operators: vec![fresh, fresh]
            },
            NOW,
        )
        .is_err());
        assert!(plan(
            &state,
            &ActionRequest::AddNodes {
                operators: vec![state.nodes[0].operator]
            },
            NOW,
        )
        .is_err());
        assert!(plan(
            &state,
            &ActionRequest::AddNodes {
                operators: vec![fresh]
            },
            NOW,
        )
        .is_ok());
    }

    #[test]
    fn close_pays_out_residual_rewards() {
        let mut state = state_with_nodes(2);
        state.nodes[0].reward = 1_500_000;
        state.platform_reward = 700_000;
        let transition = plan(&state, &ActionRequest::Close, NOW).unwrap();
        let (next, payouts) = transition.apply(&state);
        assert!(next.is_none());
        assert_eq!(payouts.len(), 2);
        assert_eq!(payouts[0].to, state.nodes[0].operator);
        assert_eq!(payouts[1].to, state.settings.platform.owner);
    }

    #[test]
    fn closed_oracle_accepts_nothing() {
        let mut state = state_with_nodes(2);
        state.lifecycle = Lifecycle::Closed;
        let err = plan(&state, &ActionRequest::AddFunds { amount: 1 }, NOW).unwrap_err();
        assert!(matches!(err, OracleError::IllegalTransition { .. }));
    }

    #[test]
    fn submit_price_updates_own_entry_only() {
        let state = state_with_nodes(2);
        let node = state.nodes[0].operator;
        let (next, _) = plan(
            &state,
            &ActionRequest::SubmitPrice { node, price: 777 },
            NOW,
        )
        .unwrap()
        .apply(&state);
        let next = next.unwrap();
        assert_eq!(next.node(&node).unwrap().feed.unwrap().price, 777);
        assert!(next.nodes[1].feed.is_none());
    }
}
