// =============================================================================
// Tick Decision Pipeline — the strict-priority state machine
// =============================================================================
//
// `Engine::on_tick` consumes one broker snapshot and emits exactly one
// action. The priority order below is load-bearing: a later check only
// runs when every earlier one declined to act.
// =============================================================================

use std::time::{Duration, Instant};

use chrono::Utc;

use crate::engine::{new_session_id, Engine};
use crate::grid;
use crate::hedge;
use crate::reconcile;
use crate::takeprofit::{self, TpVerdict};
use crate::types::{ActionResponse, PendingAction, Position, Side, TickRequest};

/// The grace period after an emitted order during which a zero-position
/// report is attributed to broker latency rather than an external closure.
const EXTERNAL_CLOSE_GRACE_PERIOD: Duration = Duration::from_millis(5000);

impl Engine {
    /// Process one tick and return the single action it produces.
    ///
    /// `now` is the monotonic instant used for the grace-period comparison;
    /// threading it explicitly keeps the pipeline deterministic under test.
    pub fn on_tick(&mut self, tick: TickRequest, now: Instant) -> ActionResponse {
        // 1. Error gate.
        if let Some(error) = self.runtime.error_status.clone() {
            return ActionResponse::wait_with_error(error);
        }

        // 2. Market update.
        let mid = (tick.ask + tick.bid) / 2.0;
        self.runtime.current_ask = tick.ask;
        self.runtime.current_bid = tick.bid;
        self.push_price_sample(mid, Utc::now());

        // 3. Reconcile positions.
        if let Err(conflict) =
            reconcile::reconcile_positions(&tick.positions, &mut self.buy, &mut self.sell, Utc::now())
        {
            self.runtime.error_status = Some(conflict.to_string());
            self.persist();
            return ActionResponse::wait_with_error(conflict.to_string());
        }

        // 4. Pending administrative action.
        if let Some(action) = self.runtime.pending_actions.pop_front() {
            let comment = match action {
                PendingAction::CloseSide(side) => {
                    self.session(side).session_id.clone().unwrap_or_default()
                }
                PendingAction::CloseEmergency => "CLOSE_ALL_EMERGENCY".to_string(),
            };
            self.persist();
            return ActionResponse::close_all(comment);
        }

        // 5. Closing-phase confirmation (buy before sell).
        for side in [Side::Buy, Side::Sell] {
            if !self.session(side).is_closing {
                continue;
            }

            let session_id = self.session(side).session_id.clone().unwrap_or_default();
            let remaining = count_session_positions(&tick.positions, side, &session_id);

            if remaining == 0 {
                let cyclic = self.runtime.cyclic_mode;
                self.session_mut(side).reset_after_confirmed_closure(cyclic, mid);
                self.persist();
                return ActionResponse::wait();
            }

            self.persist();
            return ActionResponse::close_all(session_id);
        }

        // 6. Hedge check (buy then sell).
        for side in [Side::Buy, Side::Sell] {
            if !hedge::drawdown_triggered(self.side_settings(side), self.session(side), side, &tick.positions) {
                continue;
            }

            let opposite = side.other();
            let current_price = match opposite {
                Side::Buy => tick.ask,
                Side::Sell => tick.bid,
            };

            let Some(scenario) = hedge::choose_scenario(self.session(opposite), current_price) else {
                continue;
            };

            let losing_session_id = self.session(side).session_id.clone().unwrap_or_default();
            let volume = hedge::basket_volume(&tick.positions, side, &losing_session_id);
            let (losing, opposite_settings, opposite_session) = self.losing_and_opposite_mut(side);
            losing.hedge_triggered = true;
            let deployment = hedge::apply_hedge(
                scenario,
                volume,
                opposite_settings,
                opposite_session,
                current_price,
                || new_session_id(opposite),
                Utc::now(),
                now,
            );

            self.persist();
            return ActionResponse::open(
                opposite,
                deployment.volume,
                format!("{}_idx{}", deployment.session_id, deployment.index),
                true,
            );
        }

        // 7. Take-profit check (buy then sell).
        for side in [Side::Buy, Side::Sell] {
            let verdict = takeprofit::evaluate_take_profit(
                self.side_settings(side),
                self.session(side),
                side,
                &tick.positions,
                tick.equity,
                tick.balance,
            );
            if verdict == TpVerdict::Reached {
                let session_id = self.session(side).session_id.clone().unwrap_or_default();
                self.session_mut(side).is_closing = true;
                self.persist();
                return ActionResponse::close_all(session_id);
            }
        }

        // 8. External-close detection.
        let mut resynced = false;
        for side in [Side::Buy, Side::Sell] {
            let session = self.session(side);
            if session.session_id.is_none() || session.exec_map.is_empty() || session.is_closing {
                continue;
            }
            if now.duration_since(session.last_order_sent_ts) < EXTERNAL_CLOSE_GRACE_PERIOD {
                continue;
            }

            let session_id = session.session_id.clone().unwrap_or_default();
            if count_session_positions(&tick.positions, side, &session_id) == 0 {
                let cyclic = self.runtime.cyclic_mode;
                self.session_mut(side).reset_after_confirmed_closure(cyclic, mid);
                resynced = true;
            }
        }
        if resynced {
            self.persist();
            return ActionResponse::wait();
        }

        // 9. Accumulation — buy side.
        if let Some(action) = self.accumulate(Side::Buy, tick.ask, now) {
            return action;
        }

        // 10. Accumulation — sell side.
        if let Some(action) = self.accumulate(Side::Sell, tick.bid, now) {
            return action;
        }

        // 11. Default.
        ActionResponse::wait()
    }

    /// Drive one side's accumulation state machine forward. Returns `Some`
    /// only when this side produced a terminal action for the tick.
    fn accumulate(&mut self, side: Side, current_price: f64, now: Instant) -> Option<ActionResponse> {
        if !self.session(side).enabled || self.session(side).is_closing || self.session(side).hedge_triggered {
            return None;
        }

        if self.session(side).session_id.is_none() {
            let session_id = new_session_id(side);
            let limit_price = self.side_settings(side).limit_price.unwrap_or(0.0);
            let session = self.session_mut(side);
            session.session_id = Some(session_id);
            if limit_price > 0.0 {
                session.anchor_price = Some(limit_price);
                session.waiting_for_limit = true;
            } else {
                session.anchor_price = Some(current_price);
                session.waiting_for_limit = false;
            }
            self.persist();
            // fall through to the trigger check below, same tick.
        }

        if self.session(side).waiting_for_limit {
            let limit = self.session(side).anchor_price.unwrap_or(f64::INFINITY);
            let crossed = match side {
                Side::Buy => current_price <= limit,
                Side::Sell => current_price >= limit,
            };
            if !crossed {
                return Some(ActionResponse::wait());
            }
            let session = self.session_mut(side);
            session.waiting_for_limit = false;
            session.anchor_price = Some(current_price);
            self.persist();
        }

        let index = self.session(side).next_index();
        let rows = &self.side_settings(side).rows;
        if (index as usize) >= rows.len() {
            return None;
        }
        let row = rows[index as usize].clone();

        if row.gap <= 0.0 || row.volume <= 0.0 {
            return Some(ActionResponse::wait());
        }

        // Layer 0 is the session's opening entry: it fires at the anchor
        // itself, the instant the anchor is established, rather than
        // waiting for a price crossing. Later layers fire when the price
        // crosses their cumulative-gap target (see `grid::trigger_price`).
        if index > 0 {
            let anchor = self.session(side).anchor_price.unwrap_or(current_price);
            let target = grid::trigger_price(side, anchor, &self.side_settings(side).rows, index)?;
            let crossed = match side {
                Side::Buy => current_price <= target,
                Side::Sell => current_price >= target,
            };
            if !crossed {
                return None;
            }
        }

        let session_id = self.session(side).session_id.clone().unwrap_or_default();
        {
            let session = self.session_mut(side);
            session.exec_map.insert(
                index,
                crate::session::ExecRecord {
                    index,
                    entry_price: current_price,
                    volume: row.volume,
                    profit: 0.0,
                    timestamp: Utc::now(),
                    cumulative_volume: 0.0,
                    cumulative_profit: 0.0,
                },
            );
            session.recompute_cumulative_stats();
            session.last_order_sent_ts = now;
        }
        self.persist();

        Some(ActionResponse::open(
            side,
            row.volume,
            format!("{session_id}_idx{index}"),
            row.alert,
        ))
    }
}

/// Count the tick's broker positions that carry the given side's active
/// session id in their comment.
fn count_session_positions(positions: &[Position], side: Side, session_id: &str) -> usize {
    reconcile::positions_for_session(positions, side, session_id).count()
}
