//! Prediction event lifecycle.

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::bet::{Bet, BetSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictionStatus {
    Active,
    Locked,
    Resolved,
    Canceled,
}

impl PredictionStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(Self::Active),
            "LOCKED" => Some(Self::Locked),
            "RESOLVED" => Some(Self::Resolved),
            "CANCELED" | "CANCEL_PENDING" => Some(Self::Canceled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    Win,
    Lose,
    Refund,
}

impl ResultKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "WIN" => Some(Self::Win),
            "LOSE" => Some(Self::Lose),
            "REFUND" => Some(Self::Refund),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Win => "WIN",
            Self::Lose => "LOSE",
            Self::Refund => "REFUND",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PredictionResult {
    pub kind: ResultKind,
    pub gained: i64,
}

/// Settled amounts for one resolved prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settlement {
    pub placed: i64,
    pub won: i64,
    pub gained: i64,
}

/// One tracked prediction event.
///
/// The broadcaster back-reference is the channel id; the dispatcher owns
/// the lookup, so removing the event can never leave dangling state.
#[derive(Debug, Clone)]
pub struct EventPrediction {
    pub event_id: String,
    pub channel_id: String,
    pub login: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    /// Seconds after `created_at` at which the bet fires (already adjusted
    /// by the delay mode).
    pub window_seconds: f64,
    pub status: PredictionStatus,
    pub bet: Bet,
    pub bet_placed: bool,
    pub bet_confirmed: bool,
    pub result: Option<PredictionResult>,
}

impl EventPrediction {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        event_id: String,
        channel_id: String,
        login: String,
        title: String,
        created_at: DateTime<Utc>,
        window_seconds: f64,
        status: PredictionStatus,
        outcomes: &[Value],
        settings: BetSettings,
    ) -> Self {
        Self {
            event_id,
            channel_id,
            login,
            title,
            created_at,
            window_seconds,
            status,
            bet: Bet::new(outcomes, settings),
            bet_placed: false,
            bet_confirmed: false,
            result: None,
        }
    }

    /// Seconds until the scheduled bet time, measured from `now`.
    pub fn closing_in(&self, now: DateTime<Utc>) -> f64 {
        let elapsed = (now - self.created_at).num_milliseconds() as f64 / 1000.0;
        self.window_seconds - elapsed
    }

    /// Parse the result record from a `prediction-result` event and store
    /// it. Returns the settlement amounts.
    ///
    /// A REFUND zeroes both sides; otherwise the placed amount is the
    /// decided stake and the gain is `won - placed`.
    pub fn settle(&mut self, result: &Value) -> Settlement {
        let kind = result["type"]
            .as_str()
            .and_then(ResultKind::parse)
            .unwrap_or(ResultKind::Lose);

        let decided = self
            .bet
            .decision
            .as_ref()
            .map(|d| d.amount as i64)
            .unwrap_or(0);

        let (placed, won) = match kind {
            ResultKind::Refund => (0, 0),
            _ => (decided, result["points_won"].as_i64().unwrap_or(0)),
        };

        let gained = match kind {
            ResultKind::Refund => 0,
            _ => won - placed,
        };

        self.result = Some(PredictionResult { kind, gained });
        self.status = PredictionStatus::Resolved;

        Settlement { placed, won, gained }
    }
}
