//! Minute-watched scheduler.
//!
//! Every cycle: refresh the online set, pick up to two broadcasters by the
//! configured priority order, and emit one beacon per pick, spaced evenly
//! across the cycle. Both the cycle length and the intra-cycle spacing are
//! jittered so the traffic never looks metronomic.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use twitch_gql::{GqlError, TV_USER_AGENT};

use crate::api::{ApiHandle, TwitchApi};
use crate::config::{Priority, RateLimits};
use crate::domain::Streamer;
use crate::error::Result;

/// Hard cap on simultaneously watched broadcasters.
pub const MAX_SIMULTANEOUS_STREAMS: usize = 2;

/// A broadcaster only becomes selectable this long after its online
/// transition, so the stream metadata has settled.
const ONLINE_STABILIZATION: Duration = Duration::from_secs(30);

/// Metadata older than this is force-refreshed before selection.
const METADATA_REFRESH_AGE: Duration = Duration::from_secs(10 * 60);

/// Minimum gap a watch streak requires between sessions.
const STREAK_OFFLINE_GAP: Duration = Duration::from_secs(30 * 60);

/// Streak candidates are only pushed while under this many watched minutes.
const STREAK_MINUTES_CEILING: f64 = 7.0;

pub struct MinuteWatcher {
    api: Arc<ApiHandle>,
    streamers: Vec<Arc<Streamer>>,
    priorities: Vec<Priority>,
    limits: RateLimits,
    http: reqwest::Client,
    cancel: CancellationToken,
}

impl MinuteWatcher {
    pub fn new(
        api: Arc<ApiHandle>,
        streamers: Vec<Arc<Streamer>>,
        priorities: Vec<Priority>,
        limits: RateLimits,
        cancel: CancellationToken,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .user_agent(TV_USER_AGENT)
            .build()
            .unwrap_or_default();

        Self {
            api,
            streamers,
            priorities,
            limits,
            http,
            cancel,
        }
    }

    pub async fn run(self) {
        loop {
            if self.cancel.is_cancelled() {
                return;
            }

            self.process_cycle().await;

            let interval = Duration::from_secs(self.limits.minute_watched_interval);
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(jittered(interval)) => {}
            }
        }
    }

    async fn process_cycle(&self) {
        let online: Vec<usize> = (0..self.streamers.len())
            .filter(|&i| watchable(&self.streamers[i]))
            .collect();
        if online.is_empty() {
            return;
        }

        // Stale metadata would feed the beacon payload a dead broadcast id.
        for &idx in &online {
            if self.streamers[idx].stream.metadata_age() > METADATA_REFRESH_AGE {
                self.api.check_streamer_online(&self.streamers[idx]).await;
            }
        }

        let watching = select_streamers_to_watch(
            &self.streamers,
            &online,
            &self.priorities,
            MAX_SIMULTANEOUS_STREAMS,
        );
        if watching.is_empty() {
            return;
        }

        let names: Vec<&str> = watching
            .iter()
            .map(|&i| self.streamers[i].login())
            .collect();
        debug!(count = watching.len(), streamers = ?names, "watching streams");

        let spacing =
            Duration::from_secs(self.limits.minute_watched_interval) / watching.len() as u32;

        for &idx in &watching {
            let streamer = &self.streamers[idx];

            match self.send_minute_watched(streamer).await {
                Ok(()) => {
                    streamer.stream.record_minute_watched();
                    debug!(
                        streamer = streamer.login(),
                        minutes_watched = streamer.stream.minutes_watched(),
                        "sent minute watched"
                    );
                }
                Err(e) => {
                    debug!(streamer = streamer.login(), error = %e, "minute watched failed");
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(jittered(spacing)) => {}
            }
        }
    }

    /// Emit one beacon: touch the HLS chain like a player would, then POST
    /// the encoded payload to the spade URL.
    async fn send_minute_watched(&self, streamer: &Streamer) -> Result<()> {
        let client = self.api.client();
        let (sig, token) = client.get_playback_access_token(streamer.login()).await?;

        if let Err(e) = client
            .probe_stream_playback(streamer.login(), &sig, &token)
            .await
        {
            debug!(streamer = streamer.login(), error = %e, "playback probe failed");
        }

        let spade_url = streamer
            .stream
            .spade_url()
            .ok_or(GqlError::SpadeNotFound)?;
        let payload = streamer
            .stream
            .encode_payload()
            .ok_or_else(|| GqlError::malformed("no beacon payload cached"))?;

        let resp = self
            .http
            .post(spade_url)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(format!("data={payload}"))
            .send()
            .await
            .map_err(GqlError::Http)?;

        match resp.status().as_u16() {
            200 | 204 => Ok(()),
            status => {
                warn!(streamer = streamer.login(), status, "spade rejected beacon");
                Err(GqlError::malformed(format!("spade returned {status}")).into())
            }
        }
    }
}

/// Online and past the stabilization window.
fn watchable(streamer: &Streamer) -> bool {
    streamer
        .online_age()
        .is_some_and(|age| age > ONLINE_STABILIZATION)
}

/// Walk the priority list in order, adding candidates until the cap.
///
/// Selection order is preserved; beacons are emitted in exactly this
/// order within the cycle.
pub fn select_streamers_to_watch(
    streamers: &[Arc<Streamer>],
    online: &[usize],
    priorities: &[Priority],
    max: usize,
) -> Vec<usize> {
    let mut watching: Vec<usize> = Vec::with_capacity(max);

    let push = |watching: &mut Vec<usize>, idx: usize| -> bool {
        if !watching.contains(&idx) {
            watching.push(idx);
        }
        watching.len() >= max
    };

    for priority in priorities {
        if watching.len() >= max {
            break;
        }

        match priority {
            Priority::Order => {
                for &idx in online {
                    if push(&mut watching, idx) {
                        break;
                    }
                }
            }

            Priority::PointsAscending | Priority::PointsDescending => {
                let mut items: Vec<(usize, u64)> = online
                    .iter()
                    .map(|&idx| (idx, streamers[idx].points()))
                    .collect();
                items.sort_by_key(|&(_, points)| points);
                if *priority == Priority::PointsDescending {
                    items.reverse();
                }
                for (idx, _) in items {
                    if push(&mut watching, idx) {
                        break;
                    }
                }
            }

            Priority::Streak => {
                for &idx in online {
                    let s = &streamers[idx];
                    let offline_gap_ok = match s.offline_age() {
                        None => true,
                        Some(age) => age >= STREAK_OFFLINE_GAP,
                    };
                    if s.settings().watch_streak
                        && s.stream.watch_streak_pending()
                        && offline_gap_ok
                        && s.stream.minutes_watched() < STREAK_MINUTES_CEILING
                        && push(&mut watching, idx)
                    {
                        break;
                    }
                }
            }

            Priority::Drops => {
                for &idx in online {
                    if streamers[idx].drops_eligible() && push(&mut watching, idx) {
                        break;
                    }
                }
            }

            Priority::Subscribed => {
                let mut items: Vec<(usize, f64)> = online
                    .iter()
                    .filter(|&&idx| streamers[idx].has_points_multiplier())
                    .map(|&idx| (idx, streamers[idx].total_points_multiplier()))
                    .collect();
                items.sort_by(|a, b| b.1.total_cmp(&a.1));
                for (idx, _) in items {
                    if push(&mut watching, idx) {
                        break;
                    }
                }
            }
        }
    }

    watching
}

fn jittered(base: Duration) -> Duration {
    let jitter: f64 = rand::rng().random_range(-0.2..=0.2);
    base.mul_f64(1.0 + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StreamerSettings;

    fn streamer(login: &str) -> Arc<Streamer> {
        let s = Arc::new(Streamer::new(login, login.to_uppercase(), StreamerSettings::default()));
        s.set_online();
        s
    }

    fn online(streamers: &[Arc<Streamer>]) -> Vec<usize> {
        (0..streamers.len()).collect()
    }

    #[test]
    fn fresh_online_streamers_are_not_yet_watchable() {
        let s = streamer("a");
        assert!(!watchable(&s), "needs 30s of stabilization first");
        s.set_offline();
        assert!(!watchable(&s));
    }

    #[test]
    fn order_priority_takes_configuration_order_up_to_cap() {
        let streamers = vec![streamer("a"), streamer("b"), streamer("c")];
        let picked = select_streamers_to_watch(
            &streamers,
            &online(&streamers),
            &[Priority::Order],
            MAX_SIMULTANEOUS_STREAMS,
        );
        assert_eq!(picked, vec![0, 1]);
    }

    #[test]
    fn drops_then_order_prefers_drops_eligible() {
        // A and C have campaigns attached; selection is {A, C}.
        let streamers = vec![streamer("a"), streamer("b"), streamer("c"), streamer("d")];
        streamers[0].stream.set_campaign_ids(vec!["camp".into()]);
        streamers[2].stream.set_campaign_ids(vec!["camp".into()]);

        let picked = select_streamers_to_watch(
            &streamers,
            &online(&streamers),
            &[Priority::Drops, Priority::Order],
            MAX_SIMULTANEOUS_STREAMS,
        );
        assert_eq!(picked, vec![0, 2]);
    }

    #[test]
    fn drops_only_with_no_candidates_selects_nothing() {
        let streamers = vec![streamer("a"), streamer("b")];
        let picked = select_streamers_to_watch(
            &streamers,
            &online(&streamers),
            &[Priority::Drops],
            MAX_SIMULTANEOUS_STREAMS,
        );
        assert!(picked.is_empty());
    }

    #[test]
    fn points_ascending_prefers_poorest_channels() {
        let streamers = vec![streamer("a"), streamer("b"), streamer("c")];
        streamers[0].set_points(5000);
        streamers[1].set_points(10);
        streamers[2].set_points(700);

        let picked = select_streamers_to_watch(
            &streamers,
            &online(&streamers),
            &[Priority::PointsAscending],
            MAX_SIMULTANEOUS_STREAMS,
        );
        assert_eq!(picked, vec![1, 2]);

        let picked = select_streamers_to_watch(
            &streamers,
            &online(&streamers),
            &[Priority::PointsDescending],
            MAX_SIMULTANEOUS_STREAMS,
        );
        assert_eq!(picked, vec![0, 2]);
    }

    #[test]
    fn streak_priority_requires_pending_flag() {
        let streamers = vec![streamer("a"), streamer("b")];
        streamers[0].stream.clear_watch_streak();

        let picked = select_streamers_to_watch(
            &streamers,
            &online(&streamers),
            &[Priority::Streak],
            MAX_SIMULTANEOUS_STREAMS,
        );
        assert_eq!(picked, vec![1], "only the still-pending channel qualifies");
    }

    #[test]
    fn subscribed_priority_sorts_by_multiplier() {
        let streamers = vec![streamer("a"), streamer("b"), streamer("c")];
        streamers[0].set_multipliers(vec![0.1]);
        streamers[2].set_multipliers(vec![0.2, 0.15]);

        let picked = select_streamers_to_watch(
            &streamers,
            &online(&streamers),
            &[Priority::Subscribed],
            MAX_SIMULTANEOUS_STREAMS,
        );
        assert_eq!(picked, vec![2, 0]);
    }

    #[test]
    fn later_priorities_fill_remaining_slots_without_duplicates() {
        let streamers = vec![streamer("a"), streamer("b"), streamer("c")];
        streamers[1].stream.set_campaign_ids(vec!["camp".into()]);

        let picked = select_streamers_to_watch(
            &streamers,
            &online(&streamers),
            &[Priority::Drops, Priority::Order],
            MAX_SIMULTANEOUS_STREAMS,
        );
        assert_eq!(picked, vec![1, 0], "drops pick first, then config order");
    }

    #[test]
    fn selection_never_exceeds_the_cap() {
        let streamers: Vec<_> = (0..10).map(|i| streamer(&format!("s{i}"))).collect();
        let picked = select_streamers_to_watch(
            &streamers,
            &online(&streamers),
            &[Priority::Order, Priority::PointsAscending, Priority::Streak],
            MAX_SIMULTANEOUS_STREAMS,
        );
        assert_eq!(picked.len(), MAX_SIMULTANEOUS_STREAMS);
    }

    #[test]
    fn cycle_jitter_stays_within_twenty_percent() {
        let base = Duration::from_secs(60);
        for _ in 0..200 {
            let d = jittered(base);
            assert!(d >= Duration::from_secs(48));
            assert!(d <= Duration::from_secs(72));
        }
    }
}
