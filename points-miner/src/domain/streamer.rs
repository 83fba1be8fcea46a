//! Broadcaster record and its synchronized surface.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::bet::BetSettings;
use super::goal::CommunityGoal;
use super::stream::Stream;
use super::Raid;

/// History ledger key written when a watch-streak reward arrives.
pub const REASON_WATCH_STREAK: &str = "WATCH_STREAK";

/// How long after `stream-up` a viewcount may trigger an online probe.
const STREAM_UP_SETTLE: Duration = Duration::from_secs(2 * 60);

/// Offline probes are suppressed this long after an offline transition.
const OFFLINE_PROBE_SUPPRESS: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChatPresence {
    Always,
    Never,
    Online,
    Offline,
}

/// Per-broadcaster feature toggles and bet profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamerSettings {
    pub make_predictions: bool,
    pub follow_raid: bool,
    pub claim_drops: bool,
    pub claim_moments: bool,
    pub watch_streak: bool,
    pub community_goals: bool,
    pub chat: ChatPresence,
    pub bet: BetSettings,
}

impl Default for StreamerSettings {
    fn default() -> Self {
        Self {
            make_predictions: true,
            follow_raid: true,
            claim_drops: true,
            claim_moments: true,
            watch_streak: true,
            community_goals: false,
            chat: ChatPresence::Online,
            bet: BetSettings::default(),
        }
    }
}

/// One (counter, amount) pair in the history ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryEntry {
    pub counter: i64,
    pub amount: i64,
}

#[derive(Debug, Default)]
struct LiveState {
    online: bool,
    stream_up: Option<Instant>,
    online_at: Option<Instant>,
    offline_at: Option<Instant>,
    points: u64,
    multipliers: Vec<f64>,
    goals: HashMap<String, CommunityGoal>,
    raid: Option<Raid>,
    history: BTreeMap<String, HistoryEntry>,
}

/// A tracked broadcaster.
///
/// Identity is immutable after load; live state is behind a lock so reads
/// are never torn and the (online, online-since, offline-since) triple
/// transitions as a single step.
#[derive(Debug)]
pub struct Streamer {
    login: String,
    channel_id: String,
    settings: RwLock<StreamerSettings>,
    state: RwLock<LiveState>,
    pub stream: Stream,
}

impl Streamer {
    pub fn new(login: impl Into<String>, channel_id: impl Into<String>, settings: StreamerSettings) -> Self {
        Self {
            login: login.into().to_lowercase(),
            channel_id: channel_id.into(),
            settings: RwLock::new(settings),
            state: RwLock::new(LiveState::default()),
            stream: Stream::new(),
        }
    }

    pub fn login(&self) -> &str {
        &self.login
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    pub fn settings(&self) -> StreamerSettings {
        self.settings.read().clone()
    }

    pub fn set_settings(&self, settings: StreamerSettings) {
        *self.settings.write() = settings;
    }

    pub fn bet_settings(&self) -> BetSettings {
        self.settings.read().bet.clone()
    }

    // ---- online transitions -------------------------------------------

    pub fn is_online(&self) -> bool {
        self.state.read().online
    }

    /// Time since the online transition, when online.
    pub fn online_age(&self) -> Option<Duration> {
        let state = self.state.read();
        state.online.then(|| {
            state
                .online_at
                .map(|at| at.elapsed())
                .unwrap_or(Duration::ZERO)
        })
    }

    /// Time since the last offline transition; `None` when never offline.
    pub fn offline_age(&self) -> Option<Duration> {
        self.state.read().offline_at.map(|at| at.elapsed())
    }

    /// Whether an online probe is allowed; suppressed briefly after an
    /// offline transition to let the edge settle.
    pub fn probe_allowed(&self) -> bool {
        match self.offline_age() {
            Some(age) => age >= OFFLINE_PROBE_SUPPRESS,
            None => true,
        }
    }

    /// Transition to online. The watch-streak tracking of the stream record
    /// is re-armed for the new session.
    pub fn set_online(&self) {
        let mut state = self.state.write();
        if !state.online {
            state.online = true;
            state.online_at = Some(Instant::now());
            self.stream.init_watch_streak();
        }
    }

    /// Transition to offline and reset the stream record.
    pub fn set_offline(&self) {
        let mut state = self.state.write();
        if state.online {
            state.online = false;
            state.online_at = None;
            state.offline_at = Some(Instant::now());
            self.stream.reset();
        }
    }

    pub fn mark_stream_up(&self) {
        self.state.write().stream_up = Some(Instant::now());
    }

    /// Whether the `stream-up` beacon is old enough (or absent) for a
    /// viewcount to confirm the online transition.
    pub fn stream_up_settled(&self) -> bool {
        match self.state.read().stream_up {
            None => true,
            Some(at) => at.elapsed() > STREAM_UP_SETTLE,
        }
    }

    // ---- points and history -------------------------------------------

    pub fn points(&self) -> u64 {
        self.state.read().points
    }

    pub fn set_points(&self, points: u64) {
        self.state.write().points = points;
    }

    /// Record one earn event in the history ledger.
    ///
    /// A WATCH_STREAK reason also clears the stream's pending flag.
    pub fn update_history(&self, reason: &str, earned: i64) {
        {
            let mut state = self.state.write();
            let entry = state.history.entry(reason.to_string()).or_default();
            entry.counter += 1;
            entry.amount += earned;
        }
        if reason == REASON_WATCH_STREAK {
            self.stream.clear_watch_streak();
        }
    }

    /// Adjust a ledger entry by explicit deltas (used by prediction
    /// settlement reversals).
    pub fn update_history_with(&self, reason: &str, amount_delta: i64, counter_delta: i64) {
        let mut state = self.state.write();
        let entry = state.history.entry(reason.to_string()).or_default();
        entry.counter += counter_delta;
        entry.amount += amount_delta;
    }

    pub fn history_entry(&self, reason: &str) -> Option<HistoryEntry> {
        self.state.read().history.get(reason).copied()
    }

    /// Ledger snapshot in key order, for the session report.
    pub fn history_snapshot(&self) -> Vec<(String, HistoryEntry)> {
        self.state
            .read()
            .history
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }

    // ---- multipliers, goals, raids ------------------------------------

    pub fn set_multipliers(&self, multipliers: Vec<f64>) {
        self.state.write().multipliers = multipliers;
    }

    pub fn has_points_multiplier(&self) -> bool {
        !self.state.read().multipliers.is_empty()
    }

    pub fn total_points_multiplier(&self) -> f64 {
        self.state.read().multipliers.iter().sum()
    }

    pub fn upsert_goal(&self, goal: CommunityGoal) {
        self.state.write().goals.insert(goal.goal_id.clone(), goal);
    }

    pub fn remove_goal(&self, goal_id: &str) {
        self.state.write().goals.remove(goal_id);
    }

    pub fn goals(&self) -> Vec<CommunityGoal> {
        self.state.read().goals.values().cloned().collect()
    }

    /// Record a raid; returns false when this raid id is already pending.
    pub fn register_raid(&self, raid: Raid) -> bool {
        let mut state = self.state.write();
        if state
            .raid
            .as_ref()
            .is_some_and(|r| r.raid_id == raid.raid_id)
        {
            return false;
        }
        state.raid = Some(raid);
        true
    }

    /// Whether this broadcaster currently counts for the DROPS priority.
    pub fn drops_eligible(&self) -> bool {
        self.settings.read().claim_drops
            && self.is_online()
            && !self.stream.campaign_ids().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn streamer() -> Streamer {
        Streamer::new("SomeStreamer", "123", StreamerSettings::default())
    }

    #[test]
    fn login_is_case_normalized() {
        assert_eq!(streamer().login(), "somestreamer");
    }

    #[test]
    fn online_transition_sets_timestamps_atomically() {
        let s = streamer();
        assert!(!s.is_online());
        assert!(s.online_age().is_none());

        s.set_online();
        assert!(s.is_online());
        assert!(s.online_age().is_some());
        assert!(s.offline_age().is_none());

        s.set_offline();
        assert!(!s.is_online());
        assert!(s.online_age().is_none(), "online-since cleared with the flag");
        assert!(s.offline_age().is_some());
    }

    #[test]
    fn offline_transition_resets_stream_record() {
        let s = streamer();
        s.set_online();
        s.stream.clear_watch_streak();
        s.stream.set_campaign_ids(vec!["c".into()]);

        s.set_offline();
        assert!(s.stream.watch_streak_pending());
        assert!(s.stream.campaign_ids().is_empty());
    }

    #[test]
    fn repeated_transitions_are_idempotent() {
        let s = streamer();
        s.set_offline();
        assert!(s.offline_age().is_none(), "offline->offline is a no-op");

        s.set_online();
        let first = s.online_age().unwrap();
        s.set_online();
        assert!(s.online_age().unwrap() >= first);
    }

    #[test]
    fn probe_suppressed_right_after_offline() {
        let s = streamer();
        assert!(s.probe_allowed(), "never offline: probes allowed");
        s.set_online();
        s.set_offline();
        assert!(!s.probe_allowed(), "fresh offline: probes suppressed");
    }

    #[test]
    fn history_accumulates_and_reverses() {
        let s = streamer();
        s.update_history("WATCH", 250);
        s.update_history("WATCH", 10);
        assert_eq!(
            s.history_entry("WATCH"),
            Some(HistoryEntry { counter: 2, amount: 260 })
        );

        s.update_history("PREDICTION", 750);
        s.update_history_with("PREDICTION", -1250, -1);
        assert_eq!(
            s.history_entry("PREDICTION"),
            Some(HistoryEntry { counter: 0, amount: -500 })
        );
    }

    #[test]
    fn watch_streak_reason_clears_pending_flag() {
        let s = streamer();
        s.set_online();
        assert!(s.stream.watch_streak_pending());

        s.update_history(REASON_WATCH_STREAK, 450);
        assert!(!s.stream.watch_streak_pending());
        assert_eq!(
            s.history_entry(REASON_WATCH_STREAK),
            Some(HistoryEntry { counter: 1, amount: 450 })
        );
    }

    #[test]
    fn duplicate_raid_is_rejected() {
        let s = streamer();
        let raid = Raid {
            raid_id: "r1".into(),
            target_login: "other".into(),
        };
        assert!(s.register_raid(raid.clone()));
        assert!(!s.register_raid(raid));
        assert!(s.register_raid(Raid {
            raid_id: "r2".into(),
            target_login: "other".into(),
        }));
    }

    #[test]
    fn multiplier_totals() {
        let s = streamer();
        assert!(!s.has_points_multiplier());
        s.set_multipliers(vec![0.1, 0.2]);
        assert!(s.has_points_multiplier());
        assert!((s.total_points_multiplier() - 0.3).abs() < 1e-9);
    }

    #[test]
    fn drops_eligibility_requires_online_and_campaigns() {
        let s = streamer();
        assert!(!s.drops_eligible());
        s.set_online();
        assert!(!s.drops_eligible(), "no campaign ids attached yet");
        s.stream.set_campaign_ids(vec!["camp".into()]);
        assert!(s.drops_eligible());
    }

    #[test]
    fn settings_deserialize_with_original_field_names() {
        let json = r#"{
            "makePredictions": false,
            "followRaid": true,
            "claimDrops": false,
            "claimMoments": true,
            "watchStreak": true,
            "communityGoals": true,
            "chat": "NEVER"
        }"#;
        let settings: StreamerSettings = serde_json::from_str(json).unwrap();
        assert!(!settings.make_predictions);
        assert!(settings.community_goals);
        assert_eq!(settings.chat, ChatPresence::Never);
        // Unspecified bet profile falls back to defaults.
        assert_eq!(settings.bet, BetSettings::default());
    }
}
