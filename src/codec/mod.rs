//! StateCodec: the fixed datum/redeemer schema
//!
//! Constructor indexes and field order are fixed by the deployed validator.
//! Encoding is total; decoding fails with `SchemaMismatch` on any unexpected
//! tag, arity or range. A mismatch means the engine and the validator
//! disagree about the schema version, so it is surfaced as fatal, never
//! coerced.
//!
//! Datum layout:
//!   OracleState   = Constr 0 [feed, nodes, settings, platform_reward, lifecycle]
//!   feed          = Constr 0 [price, updated_at] | Constr 1 []
//!   node entry    = Constr 0 [operator, feed, reward]
//!   settings      = Constr 0 [min_fresh_nodes, fresh_ratio_bps, staleness_ms,
//!                             aggregate_interval_ms, min_change_bps, min_deposit,
//!                             rewards, iqr_multiplier, divergence_bps, platform]
//!   rewards       = Constr 0 [node_reward, aggregator_reward, platform_reward]
//!   platform      = Constr 0 [owner, cosigners, threshold]
//!   lifecycle     = Constr 0 [] | Constr 1 []
//!
//! Redeemer constructors: SubmitPrice=0, NodeCollect=1, PlatformCollect=2,
//! Aggregate=3, EditSettings=4, AddNodes=5, RemoveNodes=6, Close=7,
//! AddFunds=8. CreateReferenceScript spends no script input and has no
//! redeemer.

use crate::error::{OracleError, OracleResult};
use crate::ledger::KeyHash;
use crate::plutus::PlutusData;
use crate::state::model::{
    DataFeed, Lifecycle, NodeEntry, OracleSettings, OracleState, PlatformAuthority, RewardPolicy,
};
use crate::state::request::ActionRequest;

fn key_hash(data: &PlutusData, what: &str) -> OracleResult<KeyHash> {
    KeyHash::from_slice(data.expect_bytes(what)?)
}

fn encode_feed(feed: &Option<DataFeed>) -> PlutusData {
    match feed {
        Some(feed) => PlutusData::constr(
            0,
            vec![
                PlutusData::int(feed.price),
                PlutusData::int(feed.updated_at),
            ],
        ),
        None => PlutusData::constr(1, vec![]),
    }
}

fn decode_feed(data: &PlutusData, what: &str) -> OracleResult<Option<DataFeed>> {
    match data {
        PlutusData::Constr { tag: 1, fields } if fields.is_empty() => Ok(None),
        _ => {
            let fields = data.expect_fields(0, 2, what)?;
            Ok(Some(DataFeed {
                price: fields[0].expect_u64(what)?,
                updated_at: fields[1].expect_u64(what)?,
            }))
        }
    }
}

fn encode_node(node: &NodeEntry) -> PlutusData {
    PlutusData::constr(
        0,
        vec![
            PlutusData::bytes(node.operator.as_bytes().to_vec()),
            encode_feed(&node.feed),
            PlutusData::int(node.reward),
        ],
    )
}

fn decode_node(data: &PlutusData) -> OracleResult<NodeEntry> {
    let fields = data.expect_fields(0, 3, "node entry")?;
    Ok(NodeEntry {
        operator: key_hash(&fields[0], "node operator")?,
        feed: decode_feed(&fields[1], "node feed")?,
        reward: fields[2].expect_u64("node reward")?,
    })
}

fn encode_settings(settings: &OracleSettings) -> PlutusData {
    PlutusData::constr(
        0,
        vec![
            PlutusData::int(settings.min_fresh_nodes),
            PlutusData::int(settings.fresh_ratio_bps),
            PlutusData::int(settings.staleness_ms),
            PlutusData::int(settings.aggregate_interval_ms),
            PlutusData::int(settings.min_change_bps),
            PlutusData::int(settings.min_deposit),
            PlutusData::constr(
                0,
                vec![
                    PlutusData::int(settings.rewards.node_reward),
                    PlutusData::int(settings.rewards.aggregator_reward),
                    PlutusData::int(settings.rewards.platform_reward),
                ],
            ),
            PlutusData::int(settings.iqr_multiplier),
            PlutusData::int(settings.divergence_bps),
            PlutusData::constr(
                0,
                vec![
                    PlutusData::bytes(settings.platform.owner.as_bytes().to_vec()),
                    PlutusData::List(
                        settings
                            .platform
                            .cosigners
                            .iter()
                            .map(|k| PlutusData::bytes(k.as_bytes().to_vec()))
                            .collect(),
                    ),
                    PlutusData::int(settings.platform.threshold),
                ],
            ),
        ],
    )
}

fn decode_settings(data: &PlutusData) -> OracleResult<OracleSettings> {
    let fields = data.expect_fields(0, 10, "oracle settings")?;

    let reward_fields = fields[6].expect_fields(0, 3, "reward policy")?;
    let rewards = RewardPolicy {
        node_reward: reward_fields[0].expect_u64("node reward")?,
        aggregator_reward: reward_fields[1].expect_u64("aggregator reward")?,
        platform_reward: reward_fields[2].expect_u64("platform reward")?,
    };

    let platform_fields = fields[9].expect_fields(0, 3, "platform authority")?;
    let cosigners = platform_fields[1]
        .expect_list("platform cosigners")?
        .iter()
        .map(|k| key_hash(k, "platform cosigner"))
        .collect::<OracleResult<Vec<_>>>()?;
    let platform = PlatformAuthority {
        owner: key_hash(&platform_fields[0], "platform owner")?,
        cosigners,
        threshold: platform_fields[2].expect_u32("platform threshold")?,
    };

    let settings = OracleSettings {
        min_fresh_nodes: fields[0].expect_u32("min fresh nodes")?,
        fresh_ratio_bps: fields[1].expect_u32("fresh ratio")?,
        staleness_ms: fields[2].expect_u64("staleness window")?,
        aggregate_interval_ms: fields[3].expect_u64("aggregation interval")?,
        min_change_bps: fields[4].expect_u32("min change")?,
        min_deposit: fields[5].expect_u64("min deposit")?,
        rewards,
        iqr_multiplier: fields[7].expect_u32("iqr multiplier")?,
        divergence_bps: fields[8].expect_u32("divergence")?,
        platform,
    };
    settings.validate()?;
    Ok(settings)
}

/// Encode the canonical state record as its on-chain datum.
pub fn encode_state(state: &OracleState) -> PlutusData {
    let lifecycle = match state.lifecycle {
        Lifecycle::Active => PlutusData::constr(0, vec![]),
        Lifecycle::Closed => PlutusData::constr(1, vec![]),
    };
    PlutusData::constr(
        0,
        vec![
            encode_feed(&state.feed),
            PlutusData::List(state.nodes.iter().map(encode_node).collect()),
            encode_settings(&state.settings),
            PlutusData::int(state.platform_reward),
            lifecycle,
        ],
    )
}

/// Decode and structurally validate an on-chain state datum.
pub fn decode_state(data: &PlutusData) -> OracleResult<OracleState> {
    let fields = data.expect_fields(0, 5, "oracle state")?;

    let nodes = fields[1]
        .expect_list("node set")?
        .iter()
        .map(decode_node)
        .collect::<OracleResult<Vec<_>>>()?;

    let lifecycle = match &fields[4] {
        PlutusData::Constr { tag: 0, fields } if fields.is_empty() => Lifecycle::Active,
        PlutusData::Constr { tag: 1, fields } if fields.is_empty() => Lifecycle::Closed,
        other => {
            return Err(OracleError::SchemaMismatch(format!(
                "lifecycle: unexpected shape {:?}",
                other
            )))
        }
    };

    let state = OracleState {
        feed: decode_feed(&fields[0], "aggregate feed")?,
        nodes,
        settings: decode_settings(&fields[2])?,
        platform_reward: fields[3].expect_u64("platform reward")?,
        lifecycle,
    };
    state.validate()?;
    Ok(state)
}

fn key_list(operators: &[KeyHash]) -> PlutusData {
    PlutusData::List(
        operators
            .iter()
            .map(|k| PlutusData::bytes(k.as_bytes().to_vec()))
            .collect(),
    )
}

fn decode_key_list(data: &PlutusData, what: &str) -> OracleResult<Vec<KeyHash>> {
    data.expect_list(what)?
        .iter()
        .map(|k| key_hash(k, what))
        .collect()
}

/// Encode an action request as its redeemer. `CreateReferenceScript` spends
/// no script input and therefore has no redeemer.
pub fn encode_request(request: &ActionRequest) -> Option<PlutusData> {
    let data = match request {
        ActionRequest::SubmitPrice { node, price } => PlutusData::constr(
            0,
            vec![
                PlutusData::bytes(node.as_bytes().to_vec()),
                PlutusData::int(*price),
            ],
        ),
        ActionRequest::NodeCollect { node } => {
            PlutusData::constr(1, vec![PlutusData::bytes(node.as_bytes().to_vec())])
        }
        ActionRequest::PlatformCollect { destination } => {
            PlutusData::constr(2, vec![PlutusData::bytes(destination.as_bytes().to_vec())])
        }
        ActionRequest::Aggregate { aggregator } => {
            PlutusData::constr(3, vec![PlutusData::bytes(aggregator.as_bytes().to_vec())])
        }
        ActionRequest::EditSettings { settings } => {
            PlutusData::constr(4, vec![encode_settings(settings)])
        }
        ActionRequest::AddNodes { operators } => PlutusData::constr(5, vec![key_list(operators)]),
        ActionRequest::RemoveNodes { operators } => {
            PlutusData::constr(6, vec![key_list(operators)])
        }
        ActionRequest::Close => PlutusData::constr(7, vec![]),
        ActionRequest::AddFunds { amount } => {
            PlutusData::constr(8, vec![PlutusData::int(*amount)])
        }
        ActionRequest::CreateReferenceScript { .. } => return None,
    };
    Some(data)
}

/// Decode a redeemer back into its action request.
pub fn decode_request(data: &PlutusData) -> OracleResult<ActionRequest> {
    match data {
        PlutusData::Constr { tag: 0, .. } => {
            let fields = data.expect_fields(0, 2, "SubmitPrice redeemer")?;
            Ok(ActionRequest::SubmitPrice {
                node: key_hash(&fields[0], "SubmitPrice node")?,
                price: fields[1].expect_u64("SubmitPrice price")?,
            })
        }
        PlutusData::Constr { tag: 1, .. } => {
            let fields = data.expect_fields(1, 1, "NodeCollect redeemer")?;
            Ok(ActionRequest::NodeCollect {
                node: key_hash(&fields[0], "NodeCollect node")?,
            })
        }
        PlutusData::Constr { tag: 2, .. } => {
            let fields = data.expect_fields(2, 1, "PlatformCollect redeemer")?;
            Ok(ActionRequest::PlatformCollect {
                destination: key_hash(&fields[0], "PlatformCollect destination")?,
            })
        }
        PlutusData::Constr { tag: 3, .. } => {
            let fields = data.expect_fields(3, 1, "Aggregate redeemer")?;
            Ok(ActionRequest::Aggregate {
                aggregator: key_hash(&fields[0], "Aggregate aggregator")?,
            })
        }
        PlutusData::Constr { tag: 4, .. } => {
            let fields = data.expect_fields(4, 1, "EditSettings redeemer")?;
            Ok(ActionRequest::EditSettings {
                settings: decode_settings(&fields[0])?,
            })
        }
        PlutusData::Constr { tag: 5, .. } => {
            let fields = data.expect_fields(5, 1, "AddNodes redeemer")?;
            Ok(ActionRequest::AddNodes {
                operators: decode_key_list(&fields[0], "AddNodes operators")?,
            })
        }
        PlutusData::Constr { tag: 6, .. } => {
            let fields = data.expect_fields(6, 1, "RemoveNodes redeemer")?;
            Ok(ActionRequest::RemoveNodes {
                operators: decode_key_list(&fields[0], "RemoveNodes operators")?,
            })
        }
        PlutusData::Constr { tag: 7, .. } => {
            data.expect_fields(7, 0, "Close redeemer")?;
            Ok(ActionRequest::Close)
        }
        PlutusData::Constr { tag: 8, .. } => {
            let fields = data.expect_fields(8, 1, "AddFunds redeemer")?;
            Ok(ActionRequest::AddFunds {
                amount: fields[0].expect_u64("AddFunds amount")?,
            })
        }
        other => Err(OracleError::SchemaMismatch(format!(
            "redeemer: unexpected shape {:?}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::model::fixtures::{operator, settings, state_with_nodes};

    #[test]
    fn state_round_trips_through_wire_bytes() {
        let mut state = state_with_nodes(3);
        state.feed = Some(DataFeed {
            price: 123_456,
            updated_at: 42,
        });
        state.nodes[0].feed = Some(DataFeed {
            price: 123_400,
            updated_at: 40,
        });
        state.nodes[1].reward = 2_000_000;
        state.platform_reward = 5_000_000;

        let bytes = encode_state(&state).to_bytes();
        let decoded = decode_state(&PlutusData::from_bytes(&bytes).unwrap()).unwrap();
        assert_eq!(decoded, state);
    }

    #[test]
    fn closed_lifecycle_round_trips() {
        let mut state = state_with_nodes(1);
        state.lifecycle = Lifecycle::Closed;
        let decoded = decode_state(&encode_state(&state)).unwrap();
        assert_eq!(decoded.lifecycle, Lifecycle::Closed);
    }

    #[test]
    fn every_redeemer_round_trips() {
        let requests = vec![
            ActionRequest::SubmitPrice {
                node: operator("node-0"),
                price: 999,
            },
            ActionRequest::NodeCollect {
                node: operator("node-0"),
            },
            ActionRequest::PlatformCollect {
                destination: operator("treasury"),
            },
            ActionRequest::Aggregate {
                aggregator: operator("node-1"),
            },
            ActionRequest::EditSettings {
                settings: settings(),
            },
            ActionRequest::AddNodes {
                operators: vec![operator("node-7"), operator("node-8")],
            },
            ActionRequest::RemoveNodes {
                operators: vec![operator("node-7")],
            },
            ActionRequest::Close,
            ActionRequest::AddFunds { amount: 9_000_000 },
        ];
        for request in requests {
            let encoded = encode_request(&request).expect("redeemer-bearing action");
            let decoded =
                decode_request(&PlutusData::from_bytes(&encoded.to_bytes()).unwrap()).unwrap();
            assert_eq!(decoded, request, "round trip failed for {}", request.kind());
        }
    }

    #[test]
    fn reference_script_has_no_redeemer() {
        assert!(encode_request(&ActionRequest::CreateReferenceScript {
            script: vec![0xde, 0xad],
        })
        .is_none());
    }

    #[test]
    fn wrong_constructor_is_schema_mismatch() {
        let data = PlutusData::constr(9, vec![]);
        assert!(matches!(
            decode_request(&data),
            Err(OracleError::SchemaMismatch(_))
        ));

        let truncated = PlutusData::constr(0, vec![PlutusData::int(1u64)]);
        assert!(matches!(
            decode_state(&truncated),
            Err(OracleError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn oversized_credential_is_schema_mismatch() {
        let data = PlutusData::constr(1, vec![PlutusData::bytes(vec![0u8; 32])]);
        assert!(matches!(
            decode_request(&data),
            Err(OracleError::SchemaMismatch(_))
        ));
    }
}
