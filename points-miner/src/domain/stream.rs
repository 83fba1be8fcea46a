//! The stream record embedded in each broadcaster.
//!
//! Holds the per-broadcast metadata, the cached beacon payload and target
//! URL, and the minutes-watched accounting for the current session. Reset
//! wholesale on every online→offline transition.

use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use parking_lot::RwLock;
use serde_json::{json, Value};

use super::campaign::Campaign;
use super::{Game, Tag};

/// Metadata older than this triggers a refresh before use.
const METADATA_STALE_AFTER: Duration = Duration::from_secs(2 * 60);

#[derive(Debug, Default)]
struct StreamInner {
    broadcast_id: String,
    title: String,
    game: Option<Game>,
    tags: Vec<Tag>,
    viewers: u64,
    spade_url: Option<String>,
    campaign_ids: Vec<String>,
    campaigns: Vec<Campaign>,
    watch_streak_pending: bool,
    minutes_watched: f64,
    payload: Option<Value>,
    last_update: Option<Instant>,
    minute_watched_at: Option<Instant>,
}

/// Synchronized stream record.
#[derive(Debug)]
pub struct Stream {
    inner: RwLock<StreamInner>,
}

impl Default for Stream {
    fn default() -> Self {
        Self::new()
    }
}

impl Stream {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StreamInner {
                watch_streak_pending: true,
                ..StreamInner::default()
            }),
        }
    }

    pub fn update_metadata(
        &self,
        broadcast_id: String,
        title: String,
        game: Option<Game>,
        tags: Vec<Tag>,
        viewers: u64,
    ) {
        let mut inner = self.inner.write();
        inner.broadcast_id = broadcast_id;
        inner.title = title;
        inner.game = game;
        inner.tags = tags;
        inner.viewers = viewers;
        inner.last_update = Some(Instant::now());
    }

    /// Whether the metadata is missing or stale.
    pub fn update_required(&self) -> bool {
        match self.inner.read().last_update {
            None => true,
            Some(at) => at.elapsed() >= METADATA_STALE_AFTER,
        }
    }

    /// Age of the last metadata refresh; zero when never refreshed.
    pub fn metadata_age(&self) -> Duration {
        self.inner
            .read()
            .last_update
            .map(|at| at.elapsed())
            .unwrap_or(Duration::ZERO)
    }

    pub fn broadcast_id(&self) -> String {
        self.inner.read().broadcast_id.clone()
    }

    pub fn title(&self) -> String {
        self.inner.read().title.clone()
    }

    pub fn game_id(&self) -> String {
        self.inner
            .read()
            .game
            .as_ref()
            .map(|g| g.id.clone())
            .unwrap_or_default()
    }

    pub fn game_name(&self) -> String {
        self.inner
            .read()
            .game
            .as_ref()
            .map(|g| g.name.clone())
            .unwrap_or_default()
    }

    pub fn set_spade_url(&self, url: String) {
        self.inner.write().spade_url = Some(url);
    }

    pub fn spade_url(&self) -> Option<String> {
        self.inner.read().spade_url.clone()
    }

    pub fn set_campaign_ids(&self, ids: Vec<String>) {
        self.inner.write().campaign_ids = ids;
    }

    pub fn campaign_ids(&self) -> Vec<String> {
        self.inner.read().campaign_ids.clone()
    }

    pub fn set_campaigns(&self, campaigns: Vec<Campaign>) {
        self.inner.write().campaigns = campaigns;
    }

    pub fn campaigns(&self) -> Vec<Campaign> {
        self.inner.read().campaigns.clone()
    }

    /// Cache the beacon payload for the current broadcast.
    ///
    /// The payload is the JSON the spade endpoint expects, derived from the
    /// metadata stored by the last refresh.
    pub fn set_payload(&self, channel_id: &str, user_id: &str, login: &str) {
        let mut inner = self.inner.write();

        let mut properties = json!({
            "channel_id": channel_id,
            "broadcast_id": &inner.broadcast_id,
            "player": "site",
            "user_id": user_id,
            "live": true,
            "channel": login,
        });
        if let Some(game) = inner.game.as_ref().filter(|g| g.is_valid()) {
            properties["game"] = json!(&game.name);
            properties["game_id"] = json!(&game.id);
        }

        inner.payload = Some(json!([{
            "event": "minute-watched",
            "properties": properties,
        }]));
    }

    /// Base64-encode the cached beacon payload.
    pub fn encode_payload(&self) -> Option<String> {
        let inner = self.inner.read();
        let payload = inner.payload.as_ref()?;
        let bytes = serde_json::to_vec(payload).ok()?;
        Some(BASE64.encode(bytes))
    }

    /// Arm the watch-streak tracking for a fresh session.
    pub fn init_watch_streak(&self) {
        let mut inner = self.inner.write();
        inner.watch_streak_pending = true;
        inner.minutes_watched = 0.0;
        inner.minute_watched_at = None;
    }

    pub fn watch_streak_pending(&self) -> bool {
        self.inner.read().watch_streak_pending
    }

    pub fn clear_watch_streak(&self) {
        self.inner.write().watch_streak_pending = false;
    }

    pub fn minutes_watched(&self) -> f64 {
        self.inner.read().minutes_watched
    }

    /// Credit the wall time elapsed since the previous accepted beacon.
    pub fn record_minute_watched(&self) {
        let mut inner = self.inner.write();
        if let Some(at) = inner.minute_watched_at {
            inner.minutes_watched += at.elapsed().as_secs_f64() / 60.0;
        }
        inner.minute_watched_at = Some(Instant::now());
    }

    /// Drop all per-session state; called on the online→offline transition.
    pub fn reset(&self) {
        let mut inner = self.inner.write();
        *inner = StreamInner {
            watch_streak_pending: true,
            ..StreamInner::default()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_stream_requires_update_and_has_streak_pending() {
        let stream = Stream::new();
        assert!(stream.update_required());
        assert!(stream.watch_streak_pending());
        assert_eq!(stream.minutes_watched(), 0.0);
    }

    #[test]
    fn payload_round_trips_through_base64() {
        let stream = Stream::new();
        stream.update_metadata(
            "b-42".into(),
            "Speedrun".into(),
            Some(Game {
                id: "g-7".into(),
                name: "Tetris".into(),
                display_name: "Tetris".into(),
            }),
            vec![],
            123,
        );
        stream.set_payload("chan-1", "user-9", "somestreamer");

        let encoded = stream.encode_payload().unwrap();
        let decoded: Value =
            serde_json::from_slice(&BASE64.decode(encoded).unwrap()).unwrap();

        assert_eq!(decoded[0]["event"], "minute-watched");
        let props = &decoded[0]["properties"];
        assert_eq!(props["channel_id"], "chan-1");
        assert_eq!(props["broadcast_id"], "b-42");
        assert_eq!(props["user_id"], "user-9");
        assert_eq!(props["channel"], "somestreamer");
        assert_eq!(props["player"], "site");
        assert_eq!(props["live"], true);
        assert_eq!(props["game"], "Tetris");
        assert_eq!(props["game_id"], "g-7");
    }

    #[test]
    fn payload_omits_game_when_absent() {
        let stream = Stream::new();
        stream.update_metadata("b-1".into(), "Chatting".into(), None, vec![], 5);
        stream.set_payload("c", "u", "login");

        let encoded = stream.encode_payload().unwrap();
        let decoded: Value =
            serde_json::from_slice(&BASE64.decode(encoded).unwrap()).unwrap();
        assert!(decoded[0]["properties"].get("game").is_none());
    }

    #[test]
    fn encode_without_payload_is_none() {
        assert!(Stream::new().encode_payload().is_none());
    }

    #[test]
    fn minutes_watched_accumulates_between_beacons() {
        let stream = Stream::new();
        stream.record_minute_watched();
        assert_eq!(stream.minutes_watched(), 0.0, "first beacon starts the clock");
        stream.record_minute_watched();
        assert!(stream.minutes_watched() >= 0.0);
    }

    #[test]
    fn reset_clears_session_state() {
        let stream = Stream::new();
        stream.update_metadata("b-1".into(), "t".into(), None, vec![], 1);
        stream.set_spade_url("https://spade.example".into());
        stream.set_campaign_ids(vec!["c1".into()]);
        stream.clear_watch_streak();

        stream.reset();

        assert!(stream.update_required());
        assert!(stream.spade_url().is_none());
        assert!(stream.campaign_ids().is_empty());
        assert!(stream.watch_streak_pending());
    }
}
