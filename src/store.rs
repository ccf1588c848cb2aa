// =============================================================================
// Persistence Store — full-snapshot load/save with an atomic tmp + rename
// =============================================================================
//
// The engine's entire state (settings, both sessions, pending actions, price
// history) is persisted as one JSON document after every tick that mutates
// it. Every field carries a serde default so that a snapshot written by an
// older build still loads cleanly.
// =============================================================================

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::session::SessionState;
use crate::settings::UserSettings;
use crate::types::{PendingAction, PriceDirection};

pub(crate) const PRICE_HISTORY_CAPACITY: usize = 100;

/// One recorded mid-price sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub mid: f64,
}

/// The mutable, non-per-side bookkeeping the engine carries: the pending
/// admin-action queue, the last fatal error (if any), and the latest
/// market snapshot. The price-history trail itself lives at the top level
/// of [`EngineSnapshot`], not here — see that type's docs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineRuntime {
    #[serde(default)]
    pub cyclic_mode: bool,
    #[serde(default)]
    pub pending_actions: VecDeque<PendingAction>,
    #[serde(default)]
    pub error_status: Option<String>,
    #[serde(default)]
    pub current_ask: f64,
    #[serde(default)]
    pub current_bid: f64,
    #[serde(default)]
    pub price_direction: PriceDirection,
    #[serde(default)]
    pub last_update_ts: Option<DateTime<Utc>>,
}

impl Default for EngineRuntime {
    fn default() -> Self {
        Self {
            cyclic_mode: false,
            pending_actions: VecDeque::new(),
            error_status: None,
            current_ask: 0.0,
            current_bid: 0.0,
            price_direction: PriceDirection::Neutral,
            last_update_ts: None,
        }
    }
}

impl EngineRuntime {
    pub fn current_mid(&self) -> f64 {
        (self.current_ask + self.current_bid) / 2.0
    }
}

/// The complete, serializable state of the engine.
///
/// `price_history` is a sibling of `settings`/`runtime`/`buy`/`sell`, not
/// nested inside `runtime` — this mirrors the persisted file's on-disk
/// shape, which stores the price trail as its own top-level array rather
/// than folding it into the runtime bookkeeping.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineSnapshot {
    #[serde(default)]
    pub settings: UserSettings,
    #[serde(default)]
    pub runtime: EngineRuntime,
    #[serde(default)]
    pub buy: SessionState,
    #[serde(default)]
    pub sell: SessionState,
    #[serde(default)]
    pub price_history: VecDeque<PricePoint>,
}

/// Loads and atomically saves an [`EngineSnapshot`] to a JSON file on disk.
pub struct PersistenceStore {
    path: PathBuf,
}

impl PersistenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load the snapshot from disk, falling back to defaults (with a warning)
    /// if the file is missing or fails to parse.
    pub fn load(&self) -> EngineSnapshot {
        match self.try_load() {
            Ok(snapshot) => {
                info!(path = %self.path.display(), "engine state loaded");
                snapshot
            }
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "falling back to default engine state");
                EngineSnapshot::default()
            }
        }
    }

    fn try_load(&self) -> Result<EngineSnapshot> {
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read engine state from {}", self.path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse engine state from {}", self.path.display()))
    }

    /// Persist `snapshot` using an atomic tmp + rename write. Failures are
    /// returned to the caller, who logs and swallows them — a failed save
    /// must never block a tick from returning its action.
    pub fn save(&self, snapshot: &EngineSnapshot) -> Result<()> {
        let content =
            serde_json::to_string_pretty(snapshot).context("failed to serialise engine state")?;

        let tmp_path = self.tmp_path();
        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp state to {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("failed to rename tmp state to {}", self.path.display()))?;

        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_owned())
            .unwrap_or_else(|| "engine_state.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
