//! Bet profile and bet calculation.
//!
//! A `Bet` accumulates outcome statistics for one prediction event and
//! turns them into a decision (outcome + amount) according to the
//! configured strategy. Statistics are re-derived from the latest totals
//! right before the decision is made.

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    #[serde(rename = "MOST_VOTED")]
    MostVoted,
    #[serde(rename = "HIGH_ODDS")]
    HighOdds,
    #[serde(rename = "PERCENTAGE")]
    Percentage,
    #[serde(rename = "SMART_MONEY")]
    SmartMoney,
    #[serde(rename = "SMART")]
    Smart,
    #[serde(rename = "NUMBER_1")]
    Number1,
    #[serde(rename = "NUMBER_2")]
    Number2,
    #[serde(rename = "NUMBER_3")]
    Number3,
    #[serde(rename = "NUMBER_4")]
    Number4,
    #[serde(rename = "NUMBER_5")]
    Number5,
    #[serde(rename = "NUMBER_6")]
    Number6,
    #[serde(rename = "NUMBER_7")]
    Number7,
    #[serde(rename = "NUMBER_8")]
    Number8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Condition {
    Gt,
    Lt,
    Gte,
    Lte,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DelayMode {
    FromStart,
    FromEnd,
    Percentage,
}

/// Statistic an argmax or a filter condition can select on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKey {
    PercentageUsers,
    OddsPercentage,
    Odds,
    TopPoints,
    TotalUsers,
    TotalPoints,
    DecisionUsers,
    DecisionPoints,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    pub by: OutcomeKey,
    #[serde(rename = "where")]
    pub r#where: Condition,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BetSettings {
    pub strategy: Strategy,
    pub percentage: u32,
    pub percentage_gap: u32,
    pub max_points: u64,
    pub minimum_points: u64,
    pub stealth_mode: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_condition: Option<FilterCondition>,
    pub delay: f64,
    pub delay_mode: DelayMode,
}

impl Default for BetSettings {
    fn default() -> Self {
        Self {
            strategy: Strategy::Smart,
            percentage: 5,
            percentage_gap: 20,
            max_points: 50_000,
            minimum_points: 0,
            stealth_mode: false,
            filter_condition: None,
            delay: 6.0,
            delay_mode: DelayMode::FromEnd,
        }
    }
}

impl BetSettings {
    /// Adjust a raw prediction window according to the delay mode.
    ///
    /// The result is the number of seconds after event creation at which
    /// the bet fires; zero or negative means no bet can be scheduled.
    pub fn adjusted_window(&self, raw_window_seconds: f64) -> f64 {
        match self.delay_mode {
            DelayMode::FromStart => self.delay.min(raw_window_seconds),
            DelayMode::FromEnd => (raw_window_seconds - self.delay).max(0.0),
            DelayMode::Percentage => raw_window_seconds * self.delay,
        }
    }
}

/// One prediction outcome with its derived statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outcome {
    pub id: String,
    pub title: String,
    pub color: String,
    pub total_users: u64,
    pub total_points: u64,
    pub top_points: u64,
    pub percentage_users: f64,
    pub odds: f64,
    pub odds_percentage: f64,
}

impl Outcome {
    pub fn from_event(data: &Value) -> Self {
        Self {
            id: data["id"].as_str().unwrap_or_default().to_string(),
            title: data["title"].as_str().unwrap_or_default().to_string(),
            color: data["color"].as_str().unwrap_or_default().to_string(),
            total_users: data["total_users"].as_u64().unwrap_or(0),
            total_points: data["total_points"].as_u64().unwrap_or(0),
            ..Default::default()
        }
    }
}

/// The computed bet decision.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub choice: usize,
    pub outcome_id: String,
    pub amount: u64,
}

/// Outcome statistics plus the strategy that decides between them.
#[derive(Debug, Clone)]
pub struct Bet {
    pub outcomes: Vec<Outcome>,
    pub decision: Option<Decision>,
    pub total_users: u64,
    pub total_points: u64,
    pub settings: BetSettings,
}

impl Bet {
    pub fn new(outcomes: &[Value], settings: BetSettings) -> Self {
        Self {
            outcomes: outcomes.iter().map(Outcome::from_event).collect(),
            decision: None,
            total_users: 0,
            total_points: 0,
            settings,
        }
    }

    /// Merge the latest outcome totals and re-derive percentages and odds.
    ///
    /// Outcome ordering is fixed at event creation; updates are positional.
    pub fn update_outcomes(&mut self, outcomes: &[Value]) {
        for (i, data) in outcomes.iter().enumerate() {
            let Some(outcome) = self.outcomes.get_mut(i) else {
                break;
            };

            if let Some(users) = data["total_users"].as_u64() {
                outcome.total_users = users;
            }
            if let Some(points) = data["total_points"].as_u64() {
                outcome.total_points = points;
            }
            if let Some(top) = data["top_predictors"].as_array() {
                outcome.top_points = top
                    .iter()
                    .filter_map(|p| p["points"].as_u64())
                    .max()
                    .unwrap_or(0);
            }
        }

        self.total_users = self.outcomes.iter().map(|o| o.total_users).sum();
        self.total_points = self.outcomes.iter().map(|o| o.total_points).sum();

        if self.total_users > 0 && self.total_points > 0 {
            let total_users = self.total_users as f64;
            let total_points = self.total_points as f64;
            for outcome in &mut self.outcomes {
                outcome.percentage_users =
                    round2(outcome.total_users as f64 * 100.0 / total_users);
                if outcome.total_points > 0 {
                    outcome.odds = round2(total_points / outcome.total_points as f64);
                    outcome.odds_percentage = round2(100.0 / outcome.odds);
                }
            }
        }
    }

    fn outcome_value(&self, index: usize, key: OutcomeKey) -> f64 {
        let Some(o) = self.outcomes.get(index) else {
            return 0.0;
        };
        match key {
            OutcomeKey::PercentageUsers => o.percentage_users,
            OutcomeKey::OddsPercentage => o.odds_percentage,
            OutcomeKey::Odds => o.odds,
            OutcomeKey::TopPoints => o.top_points as f64,
            OutcomeKey::TotalUsers => o.total_users as f64,
            OutcomeKey::TotalPoints => o.total_points as f64,
            OutcomeKey::DecisionUsers | OutcomeKey::DecisionPoints => 0.0,
        }
    }

    /// Argmax over a statistic; the lowest index wins ties.
    fn choice_by(&self, key: OutcomeKey) -> usize {
        let mut largest = 0;
        for i in 1..self.outcomes.len() {
            if self.outcome_value(i, key) > self.outcome_value(largest, key) {
                largest = i;
            }
        }
        largest
    }

    /// Fixed-index strategies fall back to index 0 when out of range.
    fn number_choice(&self, number: usize) -> usize {
        if self.outcomes.len() > number {
            number
        } else {
            0
        }
    }

    /// Compute the decision for the current statistics and balance.
    ///
    /// Returns `None` when no outcome can be chosen (no outcomes, or SMART
    /// with fewer than two). The amount floor and the filter condition are
    /// the caller's checks; this only derives choice and raw amount.
    pub fn calculate(&mut self, balance: u64) -> Option<Decision> {
        self.decision = None;

        let choice = match self.settings.strategy {
            Strategy::MostVoted => self.choice_by(OutcomeKey::TotalUsers),
            Strategy::HighOdds => self.choice_by(OutcomeKey::Odds),
            Strategy::Percentage => self.choice_by(OutcomeKey::OddsPercentage),
            Strategy::SmartMoney => self.choice_by(OutcomeKey::TopPoints),
            Strategy::Number1 => self.number_choice(0),
            Strategy::Number2 => self.number_choice(1),
            Strategy::Number3 => self.number_choice(2),
            Strategy::Number4 => self.number_choice(3),
            Strategy::Number5 => self.number_choice(4),
            Strategy::Number6 => self.number_choice(5),
            Strategy::Number7 => self.number_choice(6),
            Strategy::Number8 => self.number_choice(7),
            Strategy::Smart => {
                if self.outcomes.len() < 2 {
                    return None;
                }
                let gap =
                    (self.outcomes[0].percentage_users - self.outcomes[1].percentage_users).abs();
                if gap < self.settings.percentage_gap as f64 {
                    self.choice_by(OutcomeKey::Odds)
                } else {
                    self.choice_by(OutcomeKey::TotalUsers)
                }
            }
        };

        let outcome = self.outcomes.get(choice)?;

        let mut amount =
            ((balance as f64) * (self.settings.percentage as f64 / 100.0)).floor() as u64;
        amount = amount.min(self.settings.max_points);

        if self.settings.stealth_mode && amount >= outcome.top_points {
            let reduce = rand::rng().random_range(1..5);
            amount = outcome.top_points.saturating_sub(reduce);
        }

        let decision = Decision {
            choice,
            outcome_id: outcome.id.clone(),
            amount,
        };
        self.decision = Some(decision.clone());
        Some(decision)
    }

    /// Evaluate the optional filter condition against the decided choice.
    ///
    /// Returns `(skip, compared_value)`; the bet is kept iff the comparator
    /// is satisfied.
    pub fn skip(&self, choice: usize) -> (bool, f64) {
        let Some(fc) = self.settings.filter_condition else {
            return (false, 0.0);
        };

        let fixed_key = match fc.by {
            OutcomeKey::DecisionUsers => OutcomeKey::TotalUsers,
            OutcomeKey::DecisionPoints => OutcomeKey::TotalPoints,
            other => other,
        };

        let compared = if matches!(fc.by, OutcomeKey::TotalUsers | OutcomeKey::TotalPoints) {
            if self.outcomes.len() >= 2 {
                self.outcome_value(0, fixed_key) + self.outcome_value(1, fixed_key)
            } else {
                0.0
            }
        } else {
            self.outcome_value(choice, fixed_key)
        };

        let keep = match fc.r#where {
            Condition::Gt => compared > fc.value,
            Condition::Lt => compared < fc.value,
            Condition::Gte => compared >= fc.value,
            Condition::Lte => compared <= fc.value,
        };

        (!keep, compared)
    }

    /// The chosen outcome, once a decision exists.
    pub fn decided_outcome(&self) -> Option<&Outcome> {
        self.decision
            .as_ref()
            .and_then(|d| self.outcomes.get(d.choice))
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
