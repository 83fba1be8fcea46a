//! Usher HLS playlist chain.
//!
//! Viewer presence is only credited when the player actually touches the
//! CDN, so the watcher walks the same chain a real player would: master
//! playlist from usher, one variant playlist, then a HEAD on the newest
//! segment. The lowest-quality variant (last in the master) keeps the
//! traffic negligible.

use std::time::Duration;

use m3u8_rs::Playlist;

use crate::client::TwitchClient;
use crate::error::{GqlError, Result};
use crate::USHER_URL;

const HLS_TIMEOUT: Duration = Duration::from_secs(20);

impl TwitchClient {
    /// Touch the HLS chain for a live channel using a playback access token.
    pub async fn probe_stream_playback(&self, login: &str, sig: &str, token: &str) -> Result<()> {
        let master_url = format!("{USHER_URL}/api/channel/hls/{login}.m3u8");
        let master = self.fetch_playlist(&master_url, &[("sig", sig), ("token", token)]).await?;

        let variant_url = match master {
            Playlist::MasterPlaylist(pl) => last_http_uri(pl.variants.iter().map(|v| v.uri.as_str()))
                .ok_or_else(|| GqlError::Playlist("no stream url in master playlist".into()))?,
            Playlist::MediaPlaylist(_) => {
                return Err(GqlError::Playlist("expected master playlist from usher".into()));
            }
        };

        let variant = self.fetch_playlist(&variant_url, &[]).await?;
        let segment_url = match variant {
            Playlist::MediaPlaylist(pl) => last_http_uri(pl.segments.iter().map(|s| s.uri.as_str()))
                .ok_or_else(|| GqlError::Playlist("no segment url in variant playlist".into()))?,
            Playlist::MasterPlaylist(_) => {
                return Err(GqlError::Playlist("expected media playlist for variant".into()));
            }
        };

        let resp = self
            .http
            .head(&segment_url)
            .timeout(HLS_TIMEOUT)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(GqlError::Playlist(format!(
                "segment HEAD returned {}",
                resp.status()
            )));
        }

        Ok(())
    }

    async fn fetch_playlist(&self, url: &str, query: &[(&str, &str)]) -> Result<Playlist> {
        let resp = self
            .http
            .get(url)
            .query(query)
            .timeout(HLS_TIMEOUT)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(GqlError::Playlist(format!(
                "playlist request returned {}",
                resp.status()
            )));
        }

        let body = resp.bytes().await?;
        m3u8_rs::parse_playlist_res(&body)
            .map_err(|e| GqlError::Playlist(format!("failed to parse playlist: {e}")))
    }
}

/// Last absolute URI in iteration order; usher sorts variants best-first,
/// so the last one is the cheapest rendition.
fn last_http_uri<'a>(uris: impl Iterator<Item = &'a str>) -> Option<String> {
    uris.filter(|u| u.starts_with("http"))
        .last()
        .map(str::to_string)
}
