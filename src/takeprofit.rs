// =============================================================================
// Take-Profit Evaluator — decide whether an open basket should be closed
// =============================================================================

use crate::reconcile::positions_for_session;
use crate::session::SessionState;
use crate::settings::SideSettings;
use crate::types::{Position, Side, TpKind};

/// Outcome of evaluating a basket's take-profit condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TpVerdict {
    /// The side has no take-profit target configured (`tp_value <= 0`).
    Disabled,
    /// The side has no open basket to evaluate.
    NoPosition,
    /// A basket is open but has not yet reached its target.
    BelowTarget,
    /// The basket's cumulative profit has reached or exceeded its target.
    Reached,
}

/// Evaluate the take-profit condition for one side's open basket.
///
/// Sums `profit` straight from the tick's live `positions`, filtered down
/// to this side's active session id — never from the engine's own
/// `exec_map`, which may still carry a stale record for a layer the broker
/// has since closed (see `reconcile::positions_for_session`'s doc comment).
pub fn evaluate_take_profit(
    settings: &SideSettings,
    session: &SessionState,
    side: Side,
    positions: &[Position],
    equity: f64,
    balance: f64,
) -> TpVerdict {
    if settings.tp_value <= 0.0 {
        return TpVerdict::Disabled;
    }

    let Some(session_id) = session.session_id.as_deref() else {
        return TpVerdict::NoPosition;
    };

    let mut basket_profit = 0.0;
    let mut has_position = false;
    for pos in positions_for_session(positions, side, session_id) {
        has_position = true;
        basket_profit += pos.profit;
    }

    if !has_position {
        return TpVerdict::NoPosition;
    }

    let target = match settings.tp_kind {
        TpKind::EquityPct => equity * settings.tp_value / 100.0,
        TpKind::BalancePct => balance * settings.tp_value / 100.0,
        TpKind::FixedMoney => settings.tp_value,
    };

    if basket_profit >= target {
        TpVerdict::Reached
    } else {
        TpVerdict::BelowTarget
    }
}
