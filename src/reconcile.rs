// =============================================================================
// Position Reconciler — compare internal execution maps against the broker
// =============================================================================
//
// SAFETY POLICY: this module never cancels orders or closes positions. It
// only absorbs the broker's authoritative fill data into the local exec
// maps and flags identity conflicts for the pipeline to act on.
// =============================================================================

use chrono::{DateTime, Utc};

use crate::session::{ExecRecord, SessionState};
use crate::types::{Position, Side};

/// Fatal reconciliation failure: a broker position carries a session prefix
/// that does not match the currently active session for that side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityConflict {
    pub side: Side,
    pub ticket: i64,
}

impl std::fmt::Display for IdentityConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "identity conflict on {} ticket {}", self.side, self.ticket)
    }
}

/// Parse a trade comment against the grammar `^(buy|sell)_[0-9a-f]{8}_idx\d+$`.
///
/// Returns `(side, session_id, layer_index)` on a full, anchored match.
/// Matching is exact — a comment that merely contains the grammar as a
/// substring (e.g. with trailing garbage) does not match.
pub fn parse_comment(comment: &str) -> Option<(Side, String, u32)> {
    let idx_pos = comment.find("_idx")?;
    let (prefix, suffix) = comment.split_at(idx_pos);
    let index_str = &suffix[4..];

    if index_str.is_empty() || !index_str.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let index: u32 = index_str.parse().ok()?;

    let (side, hex_part) = if let Some(rest) = prefix.strip_prefix("buy_") {
        (Side::Buy, rest)
    } else if let Some(rest) = prefix.strip_prefix("sell_") {
        (Side::Sell, rest)
    } else {
        return None;
    };

    let is_lowercase_hex = hex_part.len() == 8
        && hex_part
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
    if !is_lowercase_hex {
        return None;
    }

    Some((side, prefix.to_string(), index))
}

/// Filter `positions` down to exactly those whose comment carries `side`'s
/// given `session_id` — i.e. the live broker-reported basket for one
/// session, as opposed to the engine's own (possibly stale) `exec_map`.
///
/// The take-profit and hedge evaluators both need "what does the broker
/// currently report for this basket", not "what did the engine last
/// record" — `exec_map` deliberately keeps entries for layers the broker
/// no longer reports (see `reconcile_positions`'s doc comment), so summing
/// from it would count positions that have since closed.
pub fn positions_for_session<'a>(
    positions: &'a [Position],
    side: Side,
    session_id: &str,
) -> impl Iterator<Item = &'a Position> {
    positions.iter().filter(move |pos| match parse_comment(&pos.comment) {
        Some((s, sid, _)) => s == side && sid == session_id,
        None => false,
    })
}

/// Absorb the tick's broker position list into `buy`/`sell`'s exec maps.
///
/// Positions whose comment does not match the session-id grammar are
/// ignored (the engine coexists with manually opened trades). On an
/// identity conflict, no mutation is applied and the offending conflict is
/// returned so the caller can set `error_status`.
pub fn reconcile_positions(
    positions: &[Position],
    buy: &mut SessionState,
    sell: &mut SessionState,
    now: DateTime<Utc>,
) -> Result<(), IdentityConflict> {
    let mut matched = Vec::new();

    for pos in positions {
        let Some((side, session_id, index)) = parse_comment(&pos.comment) else {
            continue;
        };

        let session: &SessionState = match side {
            Side::Buy => buy,
            Side::Sell => sell,
        };

        if session.session_id.as_deref() != Some(session_id.as_str()) {
            return Err(IdentityConflict {
                side,
                ticket: pos.ticket,
            });
        }

        matched.push((side, index, pos));
    }

    for (side, index, pos) in matched {
        let session: &mut SessionState = match side {
            Side::Buy => &mut *buy,
            Side::Sell => &mut *sell,
        };
        session.exec_map.insert(
            index,
            ExecRecord {
                index,
                entry_price: pos.price,
                volume: pos.volume,
                profit: pos.profit,
                timestamp: now,
                cumulative_volume: 0.0,
                cumulative_profit: 0.0,
            },
        );
    }

    buy.recompute_cumulative_stats();
    sell.recompute_cumulative_stats();

    Ok(())
}
