// =============================================================================
// Hedge Evaluator ("IronClad") — drawdown-triggered counter-volume deployment
// =============================================================================

use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::reconcile::positions_for_session;
use crate::session::{ExecRecord, SessionState};
use crate::settings::{GridRow, SideSettings};
use crate::types::{Position, Side};

/// Sum of the `profit` field across a basket's live broker-reported
/// positions — never the engine's own `exec_map`, which keeps a stale
/// record for a layer the broker no longer reports until a reset or
/// external-close fires (see `reconcile::positions_for_session`).
pub fn basket_profit(positions: &[Position], side: Side, session_id: &str) -> f64 {
    positions_for_session(positions, side, session_id)
        .map(|p| p.profit)
        .sum()
}

/// Total volume across a basket's live broker-reported positions — the
/// size of the counter-hedge to deploy on the opposite side, per
/// spec.md §4.5's `hedge_volume = Σ volume of all positions on the
/// losing side`.
pub fn basket_volume(positions: &[Position], side: Side, session_id: &str) -> f64 {
    positions_for_session(positions, side, session_id)
        .map(|p| p.volume)
        .sum()
}

/// Whether the losing side's drawdown has crossed its configured hedge
/// trigger. Pure — looks only at the losing side's own state plus the
/// tick's live positions for that side's session.
pub fn drawdown_triggered(
    settings: &SideSettings,
    session: &SessionState,
    side: Side,
    positions: &[Position],
) -> bool {
    if !session.enabled || session.hedge_triggered || settings.hedge_value <= 0.0 || session.is_closing {
        return false;
    }
    let Some(session_id) = session.session_id.as_deref() else {
        return false;
    };

    let mut has_live_position = false;
    let mut profit = 0.0;
    for pos in positions_for_session(positions, side, session_id) {
        has_live_position = true;
        profit += pos.profit;
    }

    has_live_position && profit <= -settings.hedge_value
}

/// Which shape the counter-hedge deployment takes on the opposite side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HedgeScenario {
    /// The opposite side is inactive or has no recorded layers: mint a
    /// fresh session and replace its layer table with a single hedge row.
    FreshSession,
    /// The opposite side is already running: append a new row past its
    /// current execution frontier.
    AppendRow { new_index: u32, gap: f64 },
}

/// Decide which scenario applies for the opposite side, or `None` if the
/// opposite side is mid-closure and the hedge must wait for a later tick.
pub fn choose_scenario(opposite: &SessionState, current_price: f64) -> Option<HedgeScenario> {
    if opposite.is_closing {
        return None;
    }

    let opposite_inactive =
        !opposite.enabled || opposite.session_id.is_none() || opposite.exec_map.is_empty();

    if opposite_inactive {
        Some(HedgeScenario::FreshSession)
    } else {
        let new_index = opposite.next_index();
        let last_price = opposite
            .last_executed_price()
            .unwrap_or(current_price);
        Some(HedgeScenario::AppendRow {
            new_index,
            gap: (current_price - last_price).abs(),
        })
    }
}

/// Result of deploying a hedge: what the pipeline needs to build the emitted
/// open-order action.
pub struct HedgeDeployment {
    pub session_id: String,
    pub index: u32,
    pub volume: f64,
}

/// Mutate the opposite side's settings and session to carry out `scenario`,
/// and stamp its grace-period clock. `new_session_id` is called only for
/// [`HedgeScenario::FreshSession`].
pub fn apply_hedge(
    scenario: HedgeScenario,
    volume: f64,
    opposite_settings: &mut SideSettings,
    opposite_session: &mut SessionState,
    current_price: f64,
    new_session_id: impl FnOnce() -> String,
    wall_clock_now: DateTime<Utc>,
    monotonic_now: Instant,
) -> HedgeDeployment {
    let deployment = match scenario {
        HedgeScenario::FreshSession => {
            let session_id = new_session_id();
            opposite_session.session_id = Some(session_id.clone());
            opposite_session.anchor_price = Some(current_price);
            opposite_session.exec_map.clear();
            opposite_session.enabled = true;
            opposite_session.waiting_for_limit = false;
            opposite_settings.rows = vec![GridRow {
                index: 0,
                gap: 0.0,
                volume,
                alert: true,
            }];
            opposite_session.exec_map.insert(
                0,
                ExecRecord {
                    index: 0,
                    entry_price: current_price,
                    volume,
                    profit: 0.0,
                    timestamp: wall_clock_now,
                    cumulative_volume: volume,
                    cumulative_profit: 0.0,
                },
            );
            HedgeDeployment {
                session_id,
                index: 0,
                volume,
            }
        }
        HedgeScenario::AppendRow { new_index, gap } => {
            opposite_settings.rows.push(GridRow {
                index: new_index,
                gap,
                volume,
                alert: true,
            });
            opposite_session.exec_map.insert(
                new_index,
                ExecRecord {
                    index: new_index,
                    entry_price: current_price,
                    volume,
                    profit: 0.0,
                    timestamp: wall_clock_now,
                    cumulative_volume: 0.0,
                    cumulative_profit: 0.0,
                },
            );
            opposite_session.recompute_cumulative_stats();
            HedgeDeployment {
                session_id: opposite_session.session_id.clone().unwrap_or_default(),
                index: new_index,
                volume,
            }
        }
    };

    opposite_session.last_order_sent_ts = monotonic_now;
    deployment
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(index: u32, entry_price: f64, volume: f64, profit: f64) -> ExecRecord {
        ExecRecord {
            index,
            entry_price,
            volume,
            profit,
            timestamp: Utc::now(),
            cumulative_volume: 0.0,
            cumulative_profit: 0.0,
        }
    }

    fn losing_session() -> SessionState {
        let mut s = SessionState::default();
        s.enabled = true;
        s.session_id = Some("buy_deadbeef".to_string());
        s.anchor_price = Some(100.0);
        s.exec_map.insert(0, record(0, 100.0, 0.2, -250.0));
        s.exec_map.insert(1, record(1, 98.0, 0.1, -250.0));
        s
    }

    fn position(ticket: i64, volume: f64, price: f64, profit: f64, comment: &str) -> Position {
        Position {
            ticket,
            symbol: "EURUSD".to_string(),
            kind: "BUY".to_string(),
            volume,
            price,
            profit,
            comment: comment.to_string(),
        }
    }

    fn losing_positions() -> Vec<Position> {
        vec![
            position(1, 0.2, 100.0, -250.0, "buy_deadbeef_idx0"),
            position(2, 0.1, 98.0, -250.0, "buy_deadbeef_idx1"),
        ]
    }

    #[test]
    fn drawdown_triggers_when_loss_meets_threshold() {
        let settings = SideSettings {
            hedge_value: 500.0,
            ..SideSettings::default()
        };
        let session = losing_session();
        let positions = losing_positions();
        assert!(drawdown_triggered(&settings, &session, Side::Buy, &positions));
    }

    #[test]
    fn drawdown_does_not_trigger_above_threshold() {
        let settings = SideSettings {
            hedge_value: 600.0,
            ..SideSettings::default()
        };
        let session = losing_session();
        let positions = losing_positions();
        assert!(!drawdown_triggered(&settings, &session, Side::Buy, &positions));
    }

    #[test]
    fn drawdown_does_not_retrigger_once_hedge_triggered() {
        let settings = SideSettings {
            hedge_value: 500.0,
            ..SideSettings::default()
        };
        let mut session = losing_session();
        session.hedge_triggered = true;
        let positions = losing_positions();
        assert!(!drawdown_triggered(&settings, &session, Side::Buy, &positions));
    }

    #[test]
    fn drawdown_does_not_trigger_when_broker_reports_no_live_positions() {
        // Regression: exec_map still carries both layers' stale losses, but
        // the broker now reports nothing open for this session — the
        // drawdown must not fire off stale exec_map data.
        let settings = SideSettings {
            hedge_value: 500.0,
            ..SideSettings::default()
        };
        let session = losing_session();
        assert!(!drawdown_triggered(&settings, &session, Side::Buy, &[]));
    }

    #[test]
    fn drawdown_uses_live_profit_not_stale_exec_map_profit() {
        // One layer was manually closed by the broker; only layer 0's -50
        // live loss remains, well short of the 500 hedge trigger, even
        // though exec_map still remembers layer 1's stale -250.
        let settings = SideSettings {
            hedge_value: 500.0,
            ..SideSettings::default()
        };
        let mut session = losing_session();
        session.exec_map.insert(0, record(0, 100.0, 0.2, -50.0));
        let positions = vec![position(1, 0.2, 100.0, -50.0, "buy_deadbeef_idx0")];
        assert!(!drawdown_triggered(&settings, &session, Side::Buy, &positions));
    }

    #[test]
    fn basket_profit_sums_only_the_sides_live_session_positions() {
        let positions = vec![
            position(1, 0.2, 100.0, -250.0, "buy_deadbeef_idx0"),
            position(2, 0.1, 98.0, -250.0, "buy_deadbeef_idx1"),
            position(3, 0.1, 98.0, 9000.0, "buy_ffffffff_idx0"),
            position(4, 0.1, 98.0, 9000.0, "sell_deadbeef_idx0"),
        ];
        assert_eq!(
            basket_profit(&positions, Side::Buy, "buy_deadbeef"),
            -500.0
        );
    }

    #[test]
    fn basket_volume_sums_only_the_sides_live_session_positions() {
        let positions = losing_positions();
        assert!((basket_volume(&positions, Side::Buy, "buy_deadbeef") - 0.3).abs() < 1e-9);
    }

    #[test]
    fn scenario_a_chosen_when_opposite_inactive() {
        let opposite = SessionState::default();
        assert_eq!(
            choose_scenario(&opposite, 95.0),
            Some(HedgeScenario::FreshSession)
        );
    }

    #[test]
    fn scenario_b_chosen_when_opposite_running() {
        let mut opposite = SessionState::default();
        opposite.enabled = true;
        opposite.session_id = Some("sell_cafebabe".to_string());
        opposite.exec_map.insert(0, record(0, 97.0, 0.1, 0.0));
        opposite.exec_map.insert(1, record(1, 96.2, 0.2, 0.0));

        match choose_scenario(&opposite, 95.0).unwrap() {
            HedgeScenario::AppendRow { new_index, gap } => {
                assert_eq!(new_index, 2);
                assert!((gap - 1.2).abs() < 1e-9);
            }
            other => panic!("expected AppendRow, got {other:?}"),
        }
    }

    #[test]
    fn blocked_when_opposite_is_closing() {
        let mut opposite = SessionState::default();
        opposite.is_closing = true;
        assert_eq!(choose_scenario(&opposite, 95.0), None);
    }

    #[test]
    fn apply_scenario_a_replaces_layer_table_and_mints_session() {
        let mut settings = SideSettings {
            rows: vec![GridRow {
                index: 0,
                gap: 5.0,
                volume: 0.05,
                alert: false,
            }],
            ..SideSettings::default()
        };
        let mut session = SessionState::default();

        let deployment = apply_hedge(
            HedgeScenario::FreshSession,
            0.3,
            &mut settings,
            &mut session,
            95.0,
            || "sell_11223344".to_string(),
            Utc::now(),
            Instant::now(),
        );

        assert_eq!(deployment.volume, 0.3);
        assert_eq!(settings.rows.len(), 1);
        assert_eq!(settings.rows[0].volume, 0.3);
        assert!(settings.rows[0].alert);
        assert_eq!(session.anchor_price, Some(95.0));
        assert_eq!(session.exec_map.len(), 1);
        assert!(session.enabled);
    }

    #[test]
    fn apply_scenario_b_appends_row_and_recomputes_cumulative_stats() {
        let mut settings = SideSettings::default();
        let mut session = SessionState::default();
        session.session_id = Some("sell_cafebabe".to_string());
        session.exec_map.insert(0, record(0, 97.0, 0.1, 0.0));

        let deployment = apply_hedge(
            HedgeScenario::AppendRow {
                new_index: 1,
                gap: 2.0,
            },
            0.3,
            &mut settings,
            &mut session,
            95.0,
            || unreachable!("fresh session id should not be requested in Scenario B"),
            Utc::now(),
            Instant::now(),
        );

        assert_eq!(deployment.index, 1);
        assert_eq!(settings.rows.len(), 1);
        assert_eq!(session.exec_map.len(), 2);
        assert_eq!(session.exec_map[&1].cumulative_volume, 0.4);
    }
}
