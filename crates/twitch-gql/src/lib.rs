//! Twitch GraphQL and edge-service client.
//!
//! This crate owns the wire surface towards Twitch: persisted GraphQL
//! operations against `gql.twitch.tv`, the spade beacon URL discovery
//! scrape, and the usher HLS playlist chain. It knows nothing about the
//! miner's domain model; callers hand in logins and channel ids and get
//! thin typed results back.

pub mod client;
pub mod error;
pub mod hls;
pub mod ops;
pub mod spade;

pub use client::TwitchClient;
pub use error::{GqlError, Result};
pub use ops::GqlOperation;

/// Base URL of the public Twitch site.
pub const TWITCH_URL: &str = "https://www.twitch.tv";

/// GraphQL endpoint.
pub const GQL_URL: &str = "https://gql.twitch.tv/gql";

/// PubSub edge endpoint.
pub const PUBSUB_URL: &str = "wss://pubsub-edge.twitch.tv/v1";

/// Usher HLS endpoint.
pub const USHER_URL: &str = "https://usher.ttvnw.net";

/// OAuth device-code grant endpoint.
pub const OAUTH_DEVICE_URL: &str = "https://id.twitch.tv/oauth2/device";

/// OAuth token endpoint.
pub const OAUTH_TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";

/// Client id of the Twitch TV app; the one the device-code grant accepts.
pub const CLIENT_ID_TV: &str = "ue6666qo983tsx6so1t0vnawi233wa";

/// Client id of the web player, used for unauthenticated page requests.
pub const CLIENT_ID_BROWSER: &str = "kimne78kx3ncx6brgo4mv6wki5h1ko";

/// Fallback `Client-Version` header value when the build-id scrape fails.
pub const DEFAULT_CLIENT_VERSION: &str = "ef928475-9403-42f2-8a34-55784bd08e16";

/// User agent sent on every request.
pub const TV_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/108.0.0.0 Safari/537.36";

/// Scopes requested during the device-code login.
pub const OAUTH_SCOPES: &str =
    "channel_read chat:read user_blocks_edit user_blocks_read user_follows_edit user_read";

/// Generate a lowercase hex string of `bytes * 2` characters.
pub fn random_hex(bytes: usize) -> String {
    use rand::RngCore;

    let mut buf = vec![0u8; bytes];
    rand::rng().fill_bytes(&mut buf);
    buf.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_hex_length_and_charset() {
        let s = random_hex(15);
        assert_eq!(s.len(), 30);
        assert!(s.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn random_hex_is_not_constant() {
        assert_ne!(random_hex(16), random_hex(16));
    }
}
