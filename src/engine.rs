// =============================================================================
// Engine — the owned state behind the global lock
// =============================================================================
//
// `Engine` bundles the user settings, both per-side sessions, and the shared
// runtime bookkeeping, plus the store used to persist them. It is always
// accessed through a single mutex (see `main.rs`); every public method here
// runs to completion without yielding.
// =============================================================================

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::session::SessionState;
use crate::settings::{SettingsError, UserSettings};
use crate::store::{EngineRuntime, EngineSnapshot, PersistenceStore, PricePoint, PRICE_HISTORY_CAPACITY};
use crate::types::{PriceDirection, Side};

pub struct Engine {
    pub(crate) settings: UserSettings,
    pub(crate) runtime: EngineRuntime,
    pub(crate) buy: SessionState,
    pub(crate) sell: SessionState,
    pub(crate) price_history: std::collections::VecDeque<PricePoint>,
    store: PersistenceStore,
}

impl Engine {
    pub fn new(store: PersistenceStore) -> Self {
        let snapshot = store.load();
        Self {
            settings: snapshot.settings,
            runtime: snapshot.runtime,
            buy: snapshot.buy,
            sell: snapshot.sell,
            price_history: snapshot.price_history,
            store,
        }
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            settings: self.settings.clone(),
            runtime: self.runtime.clone(),
            buy: self.buy.clone(),
            sell: self.sell.clone(),
            price_history: self.price_history.clone(),
        }
    }

    /// Record a new mid-price sample, updating direction relative to the
    /// previous sample and evicting the oldest entry once the ring is full.
    ///
    /// Direction is binary per tick (spec.md §4.6 step 2: "up if mid >
    /// previous mid else down") — a tie is `Down`, not a third neutral
    /// state. `Neutral` only ever applies to the very first sample, before
    /// there is a previous mid to compare against.
    pub(crate) fn push_price_sample(&mut self, mid: f64, at: DateTime<Utc>) {
        self.runtime.price_direction = match self.price_history.back() {
            Some(prev) if mid > prev.mid => PriceDirection::Up,
            Some(_) => PriceDirection::Down,
            None => PriceDirection::Neutral,
        };

        if self.price_history.len() >= PRICE_HISTORY_CAPACITY {
            self.price_history.pop_front();
        }
        self.price_history.push_back(PricePoint { timestamp: at, mid });
        self.runtime.last_update_ts = Some(at);
    }

    /// Persist the current state. Failures are logged and swallowed — a
    /// failed save must never block a tick or command from replying.
    pub(crate) fn persist(&self) {
        if let Err(err) = self.store.save(&self.snapshot()) {
            tracing::warn!(error = %err, "failed to persist engine state");
        }
    }

    pub fn session(&self, side: Side) -> &SessionState {
        match side {
            Side::Buy => &self.buy,
            Side::Sell => &self.sell,
        }
    }

    pub(crate) fn session_mut(&mut self, side: Side) -> &mut SessionState {
        match side {
            Side::Buy => &mut self.buy,
            Side::Sell => &mut self.sell,
        }
    }

    pub(crate) fn side_settings(&self, side: Side) -> &crate::settings::SideSettings {
        match side {
            Side::Buy => &self.settings.buy,
            Side::Sell => &self.settings.sell,
        }
    }

    /// Disjoint mutable borrows of the losing side's session and the
    /// opposite side's settings + session, for hedge deployment.
    pub(crate) fn losing_and_opposite_mut(
        &mut self,
        losing_side: Side,
    ) -> (&mut SessionState, &mut crate::settings::SideSettings, &mut SessionState) {
        match losing_side {
            Side::Buy => (&mut self.buy, &mut self.settings.sell, &mut self.sell),
            Side::Sell => (&mut self.sell, &mut self.settings.buy, &mut self.buy),
        }
    }

    pub fn toggle_side(&mut self, side: Side, enable: bool) {
        let session = match side {
            Side::Buy => &mut self.buy,
            Side::Sell => &mut self.sell,
        };
        crate::commands::toggle_side(side, enable, session, &mut self.runtime);
        self.persist();
    }

    pub fn set_cyclic(&mut self, enabled: bool) {
        crate::commands::set_cyclic(&mut self.runtime, enabled);
        self.persist();
    }

    pub fn emergency_close(&mut self) {
        crate::commands::emergency_close(&mut self.buy, &mut self.sell, &mut self.runtime);
        self.persist();
    }

    pub fn update_settings(&mut self, incoming: UserSettings) -> Result<(), SettingsError> {
        crate::commands::update_settings(&mut self.settings, incoming, &self.buy, &self.sell)?;
        self.persist();
        Ok(())
    }
}

/// Generate a fresh 8-lowercase-hex-char session token prefixed with its
/// side, matching the `^(buy|sell)_[0-9a-f]{8}$` grammar.
pub fn new_session_id(side: Side) -> String {
    let simple = Uuid::new_v4().simple().to_string();
    format!("{}_{}", side.token(), &simple[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_engine() -> Engine {
        let path = std::env::temp_dir().join(format!(
            "grid-engine-engine-test-{:?}-{}.json",
            std::thread::current().id(),
            Uuid::new_v4()
        ));
        Engine::new(PersistenceStore::new(path))
    }

    #[test]
    fn new_session_id_matches_grammar() {
        let id = new_session_id(Side::Buy);
        assert!(id.starts_with("buy_"));
        let hex = &id["buy_".len()..];
        assert_eq!(hex.len(), 8);
        assert!(hex.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)));
    }

    #[test]
    fn push_price_sample_first_sample_is_neutral() {
        let mut engine = test_engine();
        engine.push_price_sample(100.0, Utc::now());
        assert_eq!(engine.runtime.price_direction, PriceDirection::Neutral);
    }

    #[test]
    fn push_price_sample_tie_is_down_not_neutral() {
        let mut engine = test_engine();
        engine.push_price_sample(100.0, Utc::now());
        engine.push_price_sample(100.0, Utc::now());
        assert_eq!(engine.runtime.price_direction, PriceDirection::Down);
    }

    #[test]
    fn push_price_sample_sets_up_and_down() {
        let mut engine = test_engine();
        engine.push_price_sample(100.0, Utc::now());
        engine.push_price_sample(101.0, Utc::now());
        assert_eq!(engine.runtime.price_direction, PriceDirection::Up);
        engine.push_price_sample(99.0, Utc::now());
        assert_eq!(engine.runtime.price_direction, PriceDirection::Down);
    }

    #[test]
    fn price_history_evicts_oldest_beyond_capacity() {
        let mut engine = test_engine();
        for i in 0..(PRICE_HISTORY_CAPACITY + 10) {
            engine.push_price_sample(i as f64, Utc::now());
        }
        assert_eq!(engine.price_history.len(), PRICE_HISTORY_CAPACITY);
        assert_eq!(
            engine.price_history.back().unwrap().mid as usize,
            PRICE_HISTORY_CAPACITY + 9
        );
    }
}
