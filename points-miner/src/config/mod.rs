//! Application configuration.
//!
//! Loaded from a JSON file; unknown knobs fall back to defaults and the
//! rate-limit values are clamped into their documented bounds rather than
//! rejected, so a hand-edited config can never take the miner outside the
//! envelope Twitch tolerates.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::StreamerSettings;
use crate::error::{Error, Result};

/// Watch-priority classes, applied in configuration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Streak,
    Drops,
    Order,
    Subscribed,
    PointsAscending,
    PointsDescending,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub username: String,
    pub enable_analytics: bool,
    pub priority: Vec<Priority>,
    pub streamer_settings: StreamerSettings,
    pub streamers: Vec<StreamerConfig>,
    pub rate_limits: RateLimits,
    pub analytics: AnalyticsSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            username: String::new(),
            enable_analytics: false,
            priority: vec![Priority::Streak, Priority::Drops, Priority::Order],
            streamer_settings: StreamerSettings::default(),
            streamers: Vec::new(),
            rate_limits: RateLimits::default(),
            analytics: AnalyticsSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamerConfig {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<StreamerSettings>,
}

/// Pacing knobs; see the clamping bounds in `validate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RateLimits {
    /// Base seconds between PINGs on each socket, jittered ±2.5 s.
    pub websocket_ping_interval: u64,
    /// Minutes between campaign syncs.
    pub campaign_sync_interval: u64,
    /// Base seconds per watch cycle, jittered ±20 %.
    pub minute_watched_interval: u64,
    /// Seconds between paced API requests.
    pub request_delay: f64,
    /// Seconds a session waits before reconnecting.
    pub reconnect_delay: u64,
    /// Seconds between stream-status poll sweeps.
    pub stream_check_interval: u64,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            websocket_ping_interval: 27,
            campaign_sync_interval: 30,
            minute_watched_interval: 20,
            request_delay: 0.5,
            reconnect_delay: 60,
            stream_check_interval: 30,
        }
    }
}

impl RateLimits {
    fn validate(&mut self) {
        self.websocket_ping_interval = self.websocket_ping_interval.clamp(20, 60);
        self.campaign_sync_interval = self.campaign_sync_interval.clamp(5, 120);
        self.minute_watched_interval = self.minute_watched_interval.clamp(15, 60);
        self.request_delay = self.request_delay.clamp(0.1, 2.0);
        self.reconnect_delay = self.reconnect_delay.clamp(30, 300);
        self.stream_check_interval = self.stream_check_interval.clamp(15, 120);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalyticsSettings {
    /// Directory the analytics database is created in.
    pub db_dir: String,
}

impl Default for AnalyticsSettings {
    fn default() -> Self {
        Self {
            db_dir: "database".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let mut config: Config = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&mut self) -> Result<()> {
        if self.username.trim().is_empty() {
            return Err(Error::config("username must be set"));
        }
        self.username = self.username.trim().to_lowercase();
        self.rate_limits.validate();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let limits = RateLimits::default();
        assert_eq!(limits.websocket_ping_interval, 27);
        assert_eq!(limits.campaign_sync_interval, 30);
        assert_eq!(limits.minute_watched_interval, 20);
        assert_eq!(limits.reconnect_delay, 60);
        assert_eq!(limits.stream_check_interval, 30);

        let config = Config::default();
        assert_eq!(
            config.priority,
            vec![Priority::Streak, Priority::Drops, Priority::Order]
        );
    }

    #[test]
    fn rate_limits_are_clamped_into_bounds() {
        let mut limits = RateLimits {
            websocket_ping_interval: 5,
            campaign_sync_interval: 500,
            minute_watched_interval: 1,
            request_delay: 9.0,
            reconnect_delay: 1,
            stream_check_interval: 1000,
        };
        limits.validate();
        assert_eq!(limits.websocket_ping_interval, 20);
        assert_eq!(limits.campaign_sync_interval, 120);
        assert_eq!(limits.minute_watched_interval, 15);
        assert_eq!(limits.request_delay, 2.0);
        assert_eq!(limits.reconnect_delay, 30);
        assert_eq!(limits.stream_check_interval, 120);
    }

    #[test]
    fn parses_a_minimal_config() {
        let json = r#"{
            "username": "Miner",
            "priority": ["DROPS", "ORDER"],
            "streamers": [
                {"username": "alpha"},
                {"username": "beta", "settings": {"makePredictions": false}}
            ],
            "rateLimits": {"websocketPingInterval": 200}
        }"#;
        let mut config: Config = serde_json::from_str(json).unwrap();
        config.validate().unwrap();

        assert_eq!(config.username, "miner");
        assert_eq!(config.priority, vec![Priority::Drops, Priority::Order]);
        assert_eq!(config.streamers.len(), 2);
        assert!(config.streamers[0].settings.is_none());
        assert!(!config.streamers[1]
            .settings
            .as_ref()
            .unwrap()
            .make_predictions);
        assert_eq!(config.rate_limits.websocket_ping_interval, 60, "clamped");
    }

    #[test]
    fn empty_username_is_rejected() {
        let mut config = Config::default();
        assert!(config.validate().is_err());
    }
}
