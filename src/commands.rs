// =============================================================================
// Command Surface — operator-facing controls: switches, cyclic, emergency
// close, settings updates
// =============================================================================

use std::collections::BTreeSet;

use crate::session::SessionState;
use crate::settings::{merge_rows, validate_side_settings, SideSettings, UserSettings};
use crate::store::EngineRuntime;
use crate::types::{PendingAction, Side};

/// Flip a side's master switch.
///
/// Turning a side off while it is running queues an administrative closure
/// and puts the session into its closing phase; turning it on is a no-op
/// beyond the flag itself — a fresh session is minted on the next tick that
/// observes no active id.
pub fn toggle_side(side: Side, enable: bool, session: &mut SessionState, runtime: &mut EngineRuntime) {
    if session.enabled && !enable {
        session.is_closing = true;
        runtime.pending_actions.push_back(PendingAction::CloseSide(side));
    }
    session.enabled = enable;
}

/// Set cyclic mode: on confirmed closure, immediately restart rather than
/// disabling the side.
pub fn set_cyclic(runtime: &mut EngineRuntime, enabled: bool) {
    runtime.cyclic_mode = enabled;
}

/// Disable both sides and cyclic mode, force both sessions into closing
/// phase, queue a generic emergency closure, and clear any fatal error —
/// this is the operator's override out of a stuck identity conflict.
pub fn emergency_close(buy: &mut SessionState, sell: &mut SessionState, runtime: &mut EngineRuntime) {
    buy.enabled = false;
    sell.enabled = false;
    runtime.cyclic_mode = false;
    buy.is_closing = true;
    sell.is_closing = true;
    runtime.pending_actions.push_back(PendingAction::CloseEmergency);
    runtime.error_status = None;
}

/// Apply an incoming settings payload, enforcing the layer-immutability rule
/// and rejecting negative TP/hedge values. On validation failure, `current`
/// is left untouched.
pub fn update_settings(
    current: &mut UserSettings,
    incoming: UserSettings,
    buy_session: &SessionState,
    sell_session: &SessionState,
) -> Result<(), crate::settings::SettingsError> {
    validate_side_settings(&incoming.buy)?;
    validate_side_settings(&incoming.sell)?;

    let buy_executed: BTreeSet<u32> = buy_session.exec_map.keys().copied().collect();
    let sell_executed: BTreeSet<u32> = sell_session.exec_map.keys().copied().collect();

    let merged_buy_rows = merge_rows(&current.buy.rows, &incoming.buy.rows, &buy_executed);
    let merged_sell_rows = merge_rows(&current.sell.rows, &incoming.sell.rows, &sell_executed);

    current.buy = SideSettings {
        rows: merged_buy_rows,
        ..incoming.buy
    };
    current.sell = SideSettings {
        rows: merged_sell_rows,
        ..incoming.sell
    };

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ExecRecord;
    use crate::settings::GridRow;
    use chrono::Utc;

    #[test]
    fn toggle_off_while_running_queues_close_and_sets_closing() {
        let mut session = SessionState::default();
        session.enabled = true;
        let mut runtime = EngineRuntime::default();

        toggle_side(Side::Buy, false, &mut session, &mut runtime);

        assert!(!session.enabled);
        assert!(session.is_closing);
        assert_eq!(runtime.pending_actions.len(), 1);
    }

    #[test]
    fn toggle_on_is_a_plain_flag_flip() {
        let mut session = SessionState::default();
        let mut runtime = EngineRuntime::default();

        toggle_side(Side::Buy, true, &mut session, &mut runtime);

        assert!(session.enabled);
        assert!(!session.is_closing);
        assert!(runtime.pending_actions.is_empty());
    }

    #[test]
    fn emergency_close_disables_both_sides_and_clears_error() {
        let mut buy = SessionState::default();
        buy.enabled = true;
        let mut sell = SessionState::default();
        sell.enabled = true;
        let mut runtime = EngineRuntime::default();
        runtime.cyclic_mode = true;
        runtime.error_status = Some("stuck".to_string());

        emergency_close(&mut buy, &mut sell, &mut runtime);

        assert!(!buy.enabled && !sell.enabled);
        assert!(buy.is_closing && sell.is_closing);
        assert!(!runtime.cyclic_mode);
        assert!(runtime.error_status.is_none());
        assert_eq!(runtime.pending_actions.len(), 1);
    }

    #[test]
    fn update_settings_rejects_negative_tp() {
        let mut current = UserSettings::default();
        let mut incoming = UserSettings::default();
        incoming.buy.tp_value = -5.0;

        let err = update_settings(
            &mut current,
            incoming,
            &SessionState::default(),
            &SessionState::default(),
        )
        .unwrap_err();

        assert_eq!(err, crate::settings::SettingsError::NegativeTakeProfit);
    }

    #[test]
    fn update_settings_preserves_executed_layer_gap_and_volume() {
        let mut current = UserSettings::default();
        current.buy.rows = vec![GridRow {
            index: 0,
            gap: 10.0,
            volume: 0.1,
            alert: false,
        }];

        let mut incoming = UserSettings::default();
        incoming.buy.rows = vec![GridRow {
            index: 0,
            gap: 999.0,
            volume: 999.0,
            alert: true,
        }];

        let mut buy_session = SessionState::default();
        buy_session.exec_map.insert(
            0,
            ExecRecord {
                index: 0,
                entry_price: 90.0,
                volume: 0.1,
                profit: 0.0,
                timestamp: Utc::now(),
                cumulative_volume: 0.1,
                cumulative_profit: 0.0,
            },
        );

        update_settings(&mut current, incoming, &buy_session, &SessionState::default()).unwrap();

        assert_eq!(current.buy.rows[0].gap, 10.0);
        assert_eq!(current.buy.rows[0].volume, 0.1);
        assert!(current.buy.rows[0].alert);
    }
}
