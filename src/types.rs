// =============================================================================
// Shared types used across the grid engine
// =============================================================================

use serde::{Deserialize, Serialize};

/// Which half of the grid a session belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// The other side.
    pub fn other(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// Lowercase token used as the session-id prefix and comment grammar.
    pub fn token(self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }

    /// Broker position `type` string for this side.
    pub fn broker_type(self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.token())
    }
}

/// Direction the last market update moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceDirection {
    Up,
    Down,
    Neutral,
}

impl Default for PriceDirection {
    fn default() -> Self {
        Self::Neutral
    }
}

impl std::fmt::Display for PriceDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Up => write!(f, "up"),
            Self::Down => write!(f, "down"),
            Self::Neutral => write!(f, "neutral"),
        }
    }
}

/// How a basket's take-profit target is computed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TpKind {
    EquityPct,
    BalancePct,
    FixedMoney,
}

impl Default for TpKind {
    fn default() -> Self {
        Self::EquityPct
    }
}

/// A broker-reported open position, as supplied on a tick.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Position {
    pub ticket: i64,
    #[serde(default)]
    pub symbol: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub volume: f64,
    pub price: f64,
    pub profit: f64,
    #[serde(default)]
    pub comment: String,
}

/// One incoming market/account snapshot from the broker adapter.
#[derive(Debug, Clone, Deserialize)]
pub struct TickRequest {
    #[serde(default)]
    pub account_id: String,
    pub equity: f64,
    pub balance: f64,
    #[serde(default)]
    pub symbol: String,
    pub ask: f64,
    pub bid: f64,
    #[serde(default)]
    pub positions: Vec<Position>,
}

/// The single imperative action the engine emits per tick.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action")]
pub enum ActionResponse {
    #[serde(rename = "WAIT")]
    Wait {
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    #[serde(rename = "BUY")]
    Buy {
        volume: f64,
        comment: String,
        alert: bool,
    },
    #[serde(rename = "SELL")]
    Sell {
        volume: f64,
        comment: String,
        alert: bool,
    },
    #[serde(rename = "CLOSE_ALL")]
    CloseAll { comment: String },
}

impl ActionResponse {
    pub fn wait() -> Self {
        ActionResponse::Wait { error: None }
    }

    pub fn wait_with_error(error: impl Into<String>) -> Self {
        ActionResponse::Wait {
            error: Some(error.into()),
        }
    }

    pub fn open(side: Side, volume: f64, comment: String, alert: bool) -> Self {
        match side {
            Side::Buy => ActionResponse::Buy {
                volume,
                comment,
                alert,
            },
            Side::Sell => ActionResponse::Sell {
                volume,
                comment,
                alert,
            },
        }
    }

    pub fn close_all(comment: impl Into<String>) -> Self {
        ActionResponse::CloseAll {
            comment: comment.into(),
        }
    }
}

/// A queued administrative closure awaiting emission on the next tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PendingAction {
    CloseSide(Side),
    CloseEmergency,
}
