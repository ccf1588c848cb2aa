// =============================================================================
// User-configurable grid settings and the settings-update merge rule
// =============================================================================

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::types::TpKind;

/// One layer of the grid: how far from the anchor it sits and how big it is.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GridRow {
    pub index: u32,
    pub gap: f64,
    pub volume: f64,
    #[serde(default)]
    pub alert: bool,
}

/// Per-side configuration: entry limit, take-profit target, hedge sizing and
/// the layer table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SideSettings {
    #[serde(default)]
    pub limit_price: Option<f64>,
    #[serde(default)]
    pub tp_kind: TpKind,
    #[serde(default)]
    pub tp_value: f64,
    #[serde(default)]
    pub hedge_value: f64,
    #[serde(default)]
    pub rows: Vec<GridRow>,
}

impl Default for SideSettings {
    fn default() -> Self {
        Self {
            limit_price: None,
            tp_kind: TpKind::default(),
            tp_value: 0.0,
            hedge_value: 0.0,
            rows: Vec::new(),
        }
    }
}

/// The full user-controlled configuration: one [`SideSettings`] per side.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserSettings {
    #[serde(default)]
    pub buy: SideSettings,
    #[serde(default)]
    pub sell: SideSettings,
}

/// Error returned when an incoming settings update carries an invalid value.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingsError {
    NegativeTakeProfit,
    NegativeHedgeValue,
}

impl std::fmt::Display for SettingsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NegativeTakeProfit => write!(f, "take-profit value must not be negative"),
            Self::NegativeHedgeValue => write!(f, "hedge value must not be negative"),
        }
    }
}

impl std::error::Error for SettingsError {}

/// Validate that TP/hedge values on an incoming side-settings payload are
/// non-negative. Called before any field is applied.
pub fn validate_side_settings(incoming: &SideSettings) -> Result<(), SettingsError> {
    if incoming.tp_value < 0.0 {
        return Err(SettingsError::NegativeTakeProfit);
    }
    if incoming.hedge_value < 0.0 {
        return Err(SettingsError::NegativeHedgeValue);
    }
    Ok(())
}

/// Merge an incoming row list against the currently configured rows.
///
/// A row whose index has already executed keeps its existing `gap`/`volume`
/// — only `alert` may change for it. A row whose index has not executed is
/// replaced wholesale by the incoming definition. Rows with non-positive
/// `gap` or `volume` are dropped entirely.
pub fn merge_rows(
    current: &[GridRow],
    incoming: &[GridRow],
    executed_indices: &BTreeSet<u32>,
) -> Vec<GridRow> {
    let current_by_index: std::collections::HashMap<u32, &GridRow> =
        current.iter().map(|r| (r.index, r)).collect();

    incoming
        .iter()
        .filter(|row| row.gap > 0.0 && row.volume > 0.0)
        .map(|row| {
            if executed_indices.contains(&row.index) {
                if let Some(existing) = current_by_index.get(&row.index) {
                    return GridRow {
                        index: existing.index,
                        gap: existing.gap,
                        volume: existing.volume,
                        alert: row.alert,
                    };
                }
            }
            row.clone()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(index: u32, gap: f64, volume: f64, alert: bool) -> GridRow {
        GridRow {
            index,
            gap,
            volume,
            alert,
        }
    }

    #[test]
    fn validate_rejects_negative_tp() {
        let mut s = SideSettings::default();
        s.tp_value = -1.0;
        assert_eq!(
            validate_side_settings(&s),
            Err(SettingsError::NegativeTakeProfit)
        );
    }

    #[test]
    fn validate_rejects_negative_hedge() {
        let mut s = SideSettings::default();
        s.hedge_value = -0.01;
        assert_eq!(
            validate_side_settings(&s),
            Err(SettingsError::NegativeHedgeValue)
        );
    }

    #[test]
    fn validate_accepts_zero() {
        let s = SideSettings::default();
        assert!(validate_side_settings(&s).is_ok());
    }

    #[test]
    fn merge_keeps_executed_row_gap_and_volume() {
        let current = vec![row(0, 10.0, 0.1, false)];
        let incoming = vec![row(0, 999.0, 999.0, true)];
        let mut executed = BTreeSet::new();
        executed.insert(0u32);

        let merged = merge_rows(&current, &incoming, &executed);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].gap, 10.0);
        assert_eq!(merged[0].volume, 0.1);
        assert!(merged[0].alert);
    }

    #[test]
    fn merge_replaces_unexecuted_row_wholesale() {
        let current = vec![row(0, 10.0, 0.1, false)];
        let incoming = vec![row(0, 20.0, 0.2, true)];
        let executed = BTreeSet::new();

        let merged = merge_rows(&current, &incoming, &executed);
        assert_eq!(merged[0].gap, 20.0);
        assert_eq!(merged[0].volume, 0.2);
    }

    #[test]
    fn merge_drops_non_positive_rows() {
        let current = vec![];
        let incoming = vec![row(0, 0.0, 0.1, false), row(1, 10.0, -0.1, false)];
        let executed = BTreeSet::new();

        let merged = merge_rows(&current, &incoming, &executed);
        assert!(merged.is_empty());
    }

    #[test]
    fn merge_falls_back_to_incoming_when_executed_row_absent_from_current() {
        let current: Vec<GridRow> = vec![];
        let incoming = vec![row(3, 5.0, 0.2, true)];
        let mut executed = BTreeSet::new();
        executed.insert(3u32);

        let merged = merge_rows(&current, &incoming, &executed);
        assert_eq!(merged[0].gap, 5.0);
        assert_eq!(merged[0].volume, 0.2);
    }

    #[test]
    fn merge_drops_executed_row_when_incoming_placeholder_is_non_positive() {
        // The non-positive filter runs on the incoming row's own gap/volume,
        // before the executed-index substitution — a client resubmitting a
        // zeroed-out row for an already-executed index still drops it, even
        // though the substitution would otherwise have ignored those fields.
        let current = vec![row(0, 10.0, 0.1, false)];
        let incoming = vec![row(0, 0.0, 0.0, true)];
        let mut executed = BTreeSet::new();
        executed.insert(0u32);

        let merged = merge_rows(&current, &incoming, &executed);
        assert!(merged.is_empty());
    }
}
