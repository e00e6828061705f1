//! Consensus math for price aggregation
//!
//! The aggregate price is the median of fresh node submissions after outlier
//! rejection: a feed participates only if it lies within the interquartile
//! range scaled by the settings multiplier and diverges from the median by no
//! more than the settings bound. All math is integer with basis-point
//! resolution so that identical inputs always aggregate identically.

use crate::ledger::KeyHash;
use crate::state::model::{DataFeed, OracleSettings, OracleState, BPS_RESOLUTION};

/// Result of a successful consensus round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Consensus {
    /// The recomputed aggregate price.
    pub price: u64,
    /// Operators whose feeds entered consensus, in node-set order.
    pub participants: Vec<KeyHash>,
}

/// Median of a sorted slice; even lengths take the lower middle so the
/// result is deterministic.
fn median(sorted: &[u64]) -> u64 {
    sorted[(sorted.len() - 1) / 2]
}

fn first_quartile(sorted: &[u64]) -> u64 {
    let mid = sorted.len() / 2;
    median(&sorted[..mid])
}

fn third_quartile(sorted: &[u64]) -> u64 {
    let mid = sorted.len() / 2 + sorted.len() % 2;
    median(&sorted[mid..])
}

fn divergence_bps(price: u64, from: u64) -> u64 {
    (price.abs_diff(from) as u128 * BPS_RESOLUTION as u128 / from as u128) as u64
}

/// Run outlier rejection and compute the aggregate over `(operator, price)`
/// pairs. Returns `None` when no feed survives the filters.
pub fn run(settings: &OracleSettings, feeds: &[(KeyHash, u64)]) -> Option<Consensus> {
    if feeds.is_empty() {
        return None;
    }

    let mut prices: Vec<u64> = feeds.iter().map(|(_, price)| *price).collect();
    prices.sort_unstable();
    let mid = median(&prices);
    if mid == 0 {
        return None;
    }

    let (lower, upper) = if prices.len() >= 2 {
        let q1 = first_quartile(&prices) as i128;
        let q3 = third_quartile(&prices) as i128;
        let spread = (q3 - q1) * i128::from(settings.iqr_multiplier);
        (q1 - spread, q3 + spread)
    } else {
        (i128::from(prices[0]), i128::from(prices[0]))
    };

    let participants: Vec<KeyHash> = feeds
        .iter()
        .filter(|(_, price)| {
            let p = i128::from(*price);
            p >= lower
                && p <= upper
                && divergence_bps(*price, mid) <= u64::from(settings.divergence_bps)
        })
        .map(|(operator, _)| *operator)
        .collect();

    if participants.is_empty() {
        return None;
    }

    let mut surviving: Vec<u64> = feeds
        .iter()
        .filter(|(operator, _)| participants.contains(operator))
        .map(|(_, price)| *price)
        .collect();
    surviving.sort_unstable();

    Some(Consensus {
        price: median(&surviving),
        participants,
    })
}

/// A submission is fresh when it postdates the previous aggregate and is no
/// older than the staleness window at `now_ms`.
pub fn fresh_feeds(state: &OracleState, now_ms: u64) -> Vec<(KeyHash, DataFeed)> {
    state
        .nodes
        .iter()
        .filter_map(|node| node.feed.map(|feed| (node.operator, feed)))
        .filter(|(_, feed)| {
            let after_last_aggregate = match state.feed {
                Some(aggregate) => feed.updated_at > aggregate.updated_at,
                None => true,
            };
            after_last_aggregate
                && feed.updated_at <= now_ms
                && now_ms <= feed.updated_at + state.settings.staleness_ms
        })
        .collect()
}

/// The aggregation window is open when there is no previous aggregate, the
/// interval has elapsed, or the new price moved past the change threshold.
pub fn window_open(state: &OracleState, now_ms: u64, new_price: u64) -> bool {
    match state.feed {
        None => true,
        Some(previous) => {
            now_ms >= previous.updated_at + state.settings.aggregate_interval_ms
                || divergence_bps(new_price, previous.price)
                    >= u64::from(state.settings.min_change_bps)
        }
    }
}
