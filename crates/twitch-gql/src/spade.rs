//! Spade beacon URL discovery.
//!
//! The minute-watched beacon is POSTed to a per-deployment "spade" URL that
//! is not part of any API. It is found by loading the channel page, locating
//! the `settings.*.js` asset it references, and pulling `spade_url` out of
//! that asset.

use std::sync::LazyLock;

use regex::Regex;

use crate::client::TwitchClient;
use crate::error::{GqlError, Result};
use crate::TWITCH_URL;

static SETTINGS_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(https://static\.twitchcdn\.net/config/settings.*?js|https://assets\.twitch\.tv/config/settings.*?\.js)",
    )
    .unwrap()
});

static SPADE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""spade_url":"(.*?)""#).unwrap());

impl TwitchClient {
    /// Discover the spade URL for a channel by scraping its public page.
    pub async fn fetch_spade_url(&self, login: &str) -> Result<String> {
        let page = self
            .http
            .get(format!("{TWITCH_URL}/{login}"))
            .send()
            .await?
            .text()
            .await?;

        let settings_url = SETTINGS_URL
            .find(&page)
            .map(|m| m.as_str().to_string())
            .ok_or(GqlError::SpadeNotFound)?;

        let settings = self.http.get(&settings_url).send().await?.text().await?;

        SPADE_URL
            .captures(&settings)
            .map(|caps| caps[1].to_string())
            .ok_or(GqlError::SpadeNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_settings_asset_url() {
        let page = r#"<link href="https://assets.twitch.tv/config/settings.ab12cd34.js" rel="preload">"#;
        let m = SETTINGS_URL.find(page).unwrap();
        assert_eq!(m.as_str(), "https://assets.twitch.tv/config/settings.ab12cd34.js");
    }

    #[test]
    fn finds_legacy_cdn_settings_url() {
        let page = r#"src="https://static.twitchcdn.net/config/settings.deadbeef.js""#;
        assert!(SETTINGS_URL.find(page).is_some());
    }

    #[test]
    fn extracts_spade_url_from_settings() {
        let settings = r#"{"spade_url":"https://video-edge-abc123.sfo01.hls.ttvnw.net/v1/segment","other":1}"#;
        let caps = SPADE_URL.captures(settings).unwrap();
        assert_eq!(
            &caps[1],
            "https://video-edge-abc123.sfo01.hls.ttvnw.net/v1/segment"
        );
    }

    #[test]
    fn missing_spade_url_yields_none() {
        assert!(SPADE_URL.captures(r#"{"tracking_url":"x"}"#).is_none());
    }
}
