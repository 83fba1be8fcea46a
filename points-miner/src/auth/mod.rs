//! Device-code OAuth login.
//!
//! Tokens are cached on disk per account. When no usable stored token
//! exists the user is walked through the device-code grant: print the
//! verification URL and code, poll the token endpoint until the grant is
//! approved or the code expires.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use twitch_gql::{CLIENT_ID_TV, OAUTH_DEVICE_URL, OAUTH_SCOPES, OAUTH_TOKEN_URL, TV_USER_AGENT};

use crate::error::{Error, Result};

const COOKIES_DIR: &str = "cookies";

#[derive(Debug, Deserialize)]
struct DeviceCodeResponse {
    device_code: String,
    expires_in: u64,
    interval: u64,
    user_code: String,
    verification_uri: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredAuth {
    auth_token: String,
    user_id: String,
    username: String,
}

/// Twitch credentials for one account.
pub struct TwitchAuth {
    username: String,
    device_id: String,
    token: String,
    user_id: String,
    http: reqwest::Client,
}

impl TwitchAuth {
    pub fn new(username: impl Into<String>, device_id: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(TV_USER_AGENT)
            .build()
            .unwrap_or_default();

        Self {
            username: username.into().trim().to_lowercase(),
            device_id: device_id.into(),
            token: String::new(),
            user_id: String::new(),
            http,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn set_user_id(&mut self, user_id: impl Into<String>) {
        self.user_id = user_id.into();
    }

    fn cookies_path(&self) -> PathBuf {
        PathBuf::from(COOKIES_DIR).join(format!("{}.json", self.username))
    }

    /// Use the stored token when present, otherwise run the device flow.
    pub async fn login(&mut self) -> Result<()> {
        if self.load_stored().is_ok() && !self.token.is_empty() {
            info!(username = %self.username, "using stored credentials");
            return Ok(());
        }
        self.device_flow_login().await
    }

    fn load_stored(&mut self) -> Result<()> {
        let data = std::fs::read_to_string(self.cookies_path())?;
        let stored: StoredAuth = serde_json::from_str(&data)?;
        self.token = stored.auth_token;
        self.user_id = stored.user_id;
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        std::fs::create_dir_all(COOKIES_DIR)?;
        let stored = StoredAuth {
            auth_token: self.token.clone(),
            user_id: self.user_id.clone(),
            username: self.username.clone(),
        };
        std::fs::write(
            self.cookies_path(),
            serde_json::to_string_pretty(&stored)?,
        )?;
        Ok(())
    }

    /// Discard credentials rejected by Twitch so the next start re-runs
    /// the device flow.
    pub fn invalidate(&mut self) {
        self.token.clear();
        if let Err(e) = std::fs::remove_file(self.cookies_path()) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(error = %e, "failed to delete stored credentials");
            }
        }
    }

    async fn device_flow_login(&mut self) -> Result<()> {
        let device = self.request_device_code().await?;

        println!("\n=== Twitch Login Required ===");
        println!("Open: {}", device.verification_uri);
        println!("Enter code: {}", device.user_code);
        println!("Code expires in {} minutes", device.expires_in / 60);
        println!("Waiting for authorization...");

        let token = self.poll_for_token(&device).await?;
        self.token = token.access_token;
        self.save()?;
        Ok(())
    }

    async fn request_device_code(&self) -> Result<DeviceCodeResponse> {
        let resp = self
            .http
            .post(OAUTH_DEVICE_URL)
            .header("Accept", "application/json")
            .header("Client-Id", CLIENT_ID_TV)
            .header("X-Device-Id", &self.device_id)
            .form(&[("client_id", CLIENT_ID_TV), ("scopes", OAUTH_SCOPES)])
            .send()
            .await
            .map_err(|e| Error::auth(format!("device code request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(Error::auth(format!(
                "device code request returned {}",
                resp.status()
            )));
        }

        resp.json()
            .await
            .map_err(|e| Error::auth(format!("bad device code response: {e}")))
    }

    async fn poll_for_token(&self, device: &DeviceCodeResponse) -> Result<TokenResponse> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(device.expires_in);
        let interval = Duration::from_secs(device.interval.max(1));

        while tokio::time::Instant::now() < deadline {
            tokio::time::sleep(interval).await;

            match self.request_token(&device.device_code).await? {
                Some(token) => return Ok(token),
                None => continue,
            }
        }

        Err(Error::auth("device code expired before authorization"))
    }

    /// One token poll; `None` means authorization is still pending.
    async fn request_token(&self, device_code: &str) -> Result<Option<TokenResponse>> {
        let resp = self
            .http
            .post(OAUTH_TOKEN_URL)
            .header("Accept", "application/json")
            .header("Client-Id", CLIENT_ID_TV)
            .header("X-Device-Id", &self.device_id)
            .form(&[
                ("client_id", CLIENT_ID_TV),
                ("device_code", device_code),
                ("grant_type", "urn:ietf:params:oauth:grant-type:device_code"),
            ])
            .send()
            .await
            .map_err(|e| Error::auth(format!("token request failed: {e}")))?;

        match resp.status().as_u16() {
            400 => Ok(None),
            200 => Ok(Some(resp.json().await.map_err(|e| {
                Error::auth(format!("bad token response: {e}"))
            })?)),
            status => Err(Error::auth(format!("token request returned {status}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_is_normalized() {
        let auth = TwitchAuth::new("  MixedCase  ", "d");
        assert_eq!(auth.username(), "mixedcase");
        assert_eq!(
            auth.cookies_path(),
            PathBuf::from("cookies/mixedcase.json")
        );
    }

    #[test]
    fn stored_auth_round_trips() {
        let stored = StoredAuth {
            auth_token: "tok".into(),
            user_id: "42".into(),
            username: "miner".into(),
        };
        let json = serde_json::to_string(&stored).unwrap();
        let back: StoredAuth = serde_json::from_str(&json).unwrap();
        assert_eq!(back.auth_token, "tok");
        assert_eq!(back.user_id, "42");
        assert_eq!(back.username, "miner");
    }
}
