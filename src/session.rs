// =============================================================================
// Per-side session state: the live grid basket and its execution ledger
// =============================================================================

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single filled layer, recorded once its trigger price is crossed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecRecord {
    pub index: u32,
    pub entry_price: f64,
    pub volume: f64,
    pub profit: f64,
    pub timestamp: DateTime<Utc>,
    pub cumulative_volume: f64,
    pub cumulative_profit: f64,
}

/// Runtime state for one side (buy or sell) of the grid.
///
/// `last_order_sent_ts` is the monotonic clock used for the external-close
/// grace period; it is process-local and is not persisted, so a restart
/// simply starts the grace-period clock over for any basket still open.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub anchor_price: Option<f64>,
    #[serde(default)]
    pub waiting_for_limit: bool,
    #[serde(default)]
    pub is_closing: bool,
    #[serde(default)]
    pub hedge_triggered: bool,
    #[serde(default)]
    pub exec_map: BTreeMap<u32, ExecRecord>,
    #[serde(skip, default = "Instant::now")]
    pub last_order_sent_ts: Instant,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            enabled: false,
            session_id: None,
            anchor_price: None,
            waiting_for_limit: false,
            is_closing: false,
            hedge_triggered: false,
            exec_map: BTreeMap::new(),
            last_order_sent_ts: Instant::now(),
        }
    }
}

impl SessionState {
    /// Reset a finished basket back to its idle shape, keeping `enabled` and
    /// `anchor_price` untouched — the caller decides those per the
    /// cyclic/non-cyclic rule.
    pub fn clear_basket(&mut self) {
        self.session_id = None;
        self.waiting_for_limit = false;
        self.is_closing = false;
        self.hedge_triggered = false;
        self.exec_map.clear();
    }

    /// Reset a confirmed-closed basket per the cyclic/non-cyclic rule:
    /// cyclic restarts immediately at the given mid price, non-cyclic also
    /// disables the side and zeroes the anchor.
    pub fn reset_after_confirmed_closure(&mut self, cyclic: bool, mid: f64) {
        self.clear_basket();
        if cyclic {
            self.anchor_price = Some(mid);
        } else {
            self.enabled = false;
            self.anchor_price = None;
        }
    }

    /// Number of layers currently recorded as filled.
    pub fn active_layer_count(&self) -> usize {
        self.exec_map.len()
    }

    /// Price of the most recently filled layer, or the anchor if none have
    /// filled yet.
    pub fn last_executed_price(&self) -> Option<f64> {
        self.exec_map
            .values()
            .max_by_key(|rec| rec.index)
            .map(|rec| rec.entry_price)
            .or(self.anchor_price)
    }

    /// The next free layer index — one past the highest recorded.
    pub fn next_index(&self) -> u32 {
        self.exec_map.len() as u32
    }

    /// Recompute `cumulative_volume`/`cumulative_profit` for every record in
    /// index order. Must be called after any mutation of `exec_map`.
    pub fn recompute_cumulative_stats(&mut self) {
        let mut running_volume = 0.0;
        let mut running_profit = 0.0;
        for record in self.exec_map.values_mut() {
            running_volume += record.volume;
            running_profit += record.profit;
            record.cumulative_volume = running_volume;
            record.cumulative_profit = running_profit;
        }
    }
}
