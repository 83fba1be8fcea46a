//! GraphQL client with the header set Twitch's TV app sends.

use std::sync::LazyLock;
use std::time::Duration;

use parking_lot::RwLock;
use regex::Regex;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{GqlError, Result};
use crate::ops::{self, GqlOperation};
use crate::{random_hex, CLIENT_ID_TV, DEFAULT_CLIENT_VERSION, GQL_URL, TV_USER_AGENT, TWITCH_URL};

static TWILIGHT_BUILD_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"window\.__twilightBuildID\s*=\s*"([0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12})""#,
    )
    .unwrap()
});

/// Authenticated Twitch client.
///
/// One instance is shared by every component; all methods take `&self`.
pub struct TwitchClient {
    pub(crate) http: reqwest::Client,
    token: String,
    device_id: String,
    client_session: String,
    client_version: RwLock<String>,
}

impl TwitchClient {
    pub fn new(token: impl Into<String>, device_id: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(TV_USER_AGENT)
            .build()
            .unwrap_or_default();

        Self {
            http,
            token: token.into(),
            device_id: device_id.into(),
            client_session: random_hex(8),
            client_version: RwLock::new(DEFAULT_CLIENT_VERSION.to_string()),
        }
    }

    fn client_version(&self) -> String {
        self.client_version.read().clone()
    }

    /// Scrape the current `window.__twilightBuildID` from the Twitch front
    /// page and use it as the `Client-Version` header from now on. Failures
    /// keep the previous (or default) version.
    pub async fn update_client_version(&self) -> String {
        let body = match self.http.get(TWITCH_URL).send().await {
            Ok(resp) if resp.status().is_success() => resp.text().await.unwrap_or_default(),
            _ => return self.client_version(),
        };

        if let Some(caps) = TWILIGHT_BUILD_ID.captures(&body) {
            let version = caps[1].to_string();
            debug!(version = %version, "updated client version");
            *self.client_version.write() = version;
        }

        self.client_version()
    }

    /// POST one persisted-query operation and return the raw response value.
    pub async fn post_gql(&self, op: &GqlOperation) -> Result<Value> {
        let resp = self
            .http
            .post(GQL_URL)
            .header("Authorization", format!("OAuth {}", self.token))
            .header("Client-Id", CLIENT_ID_TV)
            .header("Client-Session-Id", &self.client_session)
            .header("Client-Version", self.client_version())
            .header("X-Device-Id", &self.device_id)
            .header("Content-Type", "application/json")
            .json(op)
            .send()
            .await?;

        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(GqlError::BadAuth);
        }

        let body: Value = resp.json().await?;
        debug!(operation = op.operation_name, "gql response received");
        Ok(body)
    }

    /// Resolve a login name to its channel id.
    pub async fn get_channel_id(&self, login: &str) -> Result<String> {
        let op = ops::get_id_from_login()
            .with_variables(json!({ "login": login.to_lowercase() }));
        let resp = self.post_gql(&op).await?;

        resp["data"]["user"]["id"]
            .as_str()
            .map(str::to_string)
            .ok_or(GqlError::StreamerNotFound)
    }

    /// Fetch the stream overlay info for a live channel.
    ///
    /// Returns the `user` object. A missing `user.stream` means the channel
    /// is offline, which is a flow signal rather than a failure.
    pub async fn get_stream_info(&self, login: &str) -> Result<Value> {
        let op = ops::video_player_stream_info_overlay_channel()
            .with_variables(json!({ "channel": login }));
        let resp = self.post_gql(&op).await?;

        let user = &resp["data"]["user"];
        if user.is_null() {
            return Err(GqlError::StreamerOffline);
        }
        if user["stream"].is_null() {
            return Err(GqlError::StreamerOffline);
        }

        Ok(user.clone())
    }

    /// Fetch the channel-points context (balance, multipliers, goals,
    /// pending claim) for a channel. Returns the `data` object.
    pub async fn channel_points_context(&self, login: &str) -> Result<Value> {
        let op = ops::channel_points_context()
            .with_variables(json!({ "channelLogin": login }));
        let resp = self.post_gql(&op).await?;

        let data = &resp["data"];
        if data["community"]["channel"].is_null() {
            return Err(GqlError::StreamerNotFound);
        }

        Ok(data.clone())
    }

    pub async fn claim_bonus(&self, channel_id: &str, claim_id: &str) -> Result<()> {
        let op = ops::claim_community_points().with_variables(json!({
            "input": { "channelID": channel_id, "claimID": claim_id },
        }));
        self.post_gql(&op).await?;
        Ok(())
    }

    pub async fn claim_moment(&self, moment_id: &str) -> Result<()> {
        let op = ops::community_moment_callout_claim().with_variables(json!({
            "input": { "momentID": moment_id },
        }));
        self.post_gql(&op).await?;
        Ok(())
    }

    pub async fn join_raid(&self, raid_id: &str) -> Result<()> {
        let op = ops::join_raid().with_variables(json!({
            "input": { "raidID": raid_id },
        }));
        self.post_gql(&op).await?;
        Ok(())
    }

    /// Place a bet on a prediction outcome.
    pub async fn make_prediction(
        &self,
        event_id: &str,
        outcome_id: &str,
        points: u64,
    ) -> Result<()> {
        let op = ops::make_prediction().with_variables(json!({
            "input": {
                "eventID": event_id,
                "outcomeID": outcome_id,
                "points": points,
                "transactionID": random_hex(16),
            },
        }));
        let resp = self.post_gql(&op).await?;

        if let Some(code) = resp["data"]["makePrediction"]["error"]["code"].as_str() {
            return Err(GqlError::PredictionRejected(code.to_string()));
        }
        Ok(())
    }

    pub async fn contribute_community_goal(
        &self,
        channel_id: &str,
        goal_id: &str,
        amount: u64,
    ) -> Result<()> {
        let op = ops::contribute_community_points_community_goal().with_variables(json!({
            "input": {
                "amount": amount,
                "channelID": channel_id,
                "goalID": goal_id,
                "transactionID": random_hex(16),
            },
        }));
        let resp = self.post_gql(&op).await?;

        let err = &resp["data"]["contributeCommunityPointsCommunityGoal"]["error"];
        if !err.is_null() {
            return Err(GqlError::ContributionRejected(err.to_string()));
        }
        Ok(())
    }

    /// Campaign ids currently highlighted on a channel.
    pub async fn get_campaign_ids(&self, channel_id: &str) -> Result<Vec<String>> {
        let op = ops::drops_highlight_service_available_drops()
            .with_variables(json!({ "channelID": channel_id }));
        let resp = self.post_gql(&op).await?;

        let ids = resp["data"]["channel"]["viewerDropCampaigns"]
            .as_array()
            .map(|campaigns| {
                campaigns
                    .iter()
                    .filter_map(|c| c["id"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        Ok(ids)
    }

    /// Fetch a playback access token for a live channel.
    ///
    /// Returns `(signature, token)` as expected by the usher query string.
    pub async fn get_playback_access_token(&self, login: &str) -> Result<(String, String)> {
        let op = ops::playback_access_token().with_variables(json!({
            "login": login,
            "isLive": true,
            "isVod": false,
            "vodID": "",
            "playerType": "site",
        }));
        let resp = self.post_gql(&op).await?;

        let data = &resp["data"];
        let token = if !data["streamPlaybackAccessToken"].is_null() {
            &data["streamPlaybackAccessToken"]
        } else if !data["streamAccessToken"].is_null() {
            &data["streamAccessToken"]
        } else {
            return Err(GqlError::malformed("no stream access token in response"));
        };

        match (token["signature"].as_str(), token["value"].as_str()) {
            (Some(sig), Some(value)) if !sig.is_empty() && !value.is_empty() => {
                Ok((sig.to_string(), value.to_string()))
            }
            _ => Err(GqlError::malformed("empty stream access token")),
        }
    }

    /// Fetch the user's drops inventory. Returns the `inventory` object,
    /// which may be `Null` when the account has none.
    pub async fn inventory(&self) -> Result<Value> {
        let resp = self.post_gql(&ops::inventory()).await?;
        Ok(resp["data"]["currentUser"]["inventory"].clone())
    }

    /// Fetch the viewer drops dashboard, optionally filtered by campaign
    /// status (e.g. `ACTIVE`).
    pub async fn drops_dashboard(&self, status: Option<&str>) -> Result<Vec<Value>> {
        let resp = self.post_gql(&ops::viewer_drops_dashboard()).await?;

        let campaigns = resp["data"]["currentUser"]["dropCampaigns"]
            .as_array()
            .map(|campaigns| {
                campaigns
                    .iter()
                    .filter(|c| match status {
                        Some(want) => c["status"].as_str() == Some(want),
                        None => true,
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        Ok(campaigns)
    }

    /// Claim a completed drop. Returns whether Twitch accepted the claim
    /// (including the already-claimed case).
    pub async fn claim_drop(&self, drop_instance_id: &str) -> Result<bool> {
        let op = ops::drops_page_claim_drop_rewards().with_variables(json!({
            "input": { "dropInstanceID": drop_instance_id },
        }));
        let resp = self.post_gql(&op).await?;

        let status = resp["data"]["claimDropRewards"]["status"].as_str();
        Ok(matches!(
            status,
            Some("ELIGIBLE_FOR_ALL") | Some("DROP_INSTANCE_ALREADY_CLAIMED")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn twilight_build_id_scrape() {
        let body = r#"<script>window.__twilightBuildID="0146cf4f-b95b-4217-a1dd-f54a56d3a1d8";</script>"#;
        let caps = TWILIGHT_BUILD_ID.captures(body).unwrap();
        assert_eq!(&caps[1], "0146cf4f-b95b-4217-a1dd-f54a56d3a1d8");
    }

    #[test]
    fn twilight_build_id_rejects_garbage() {
        assert!(TWILIGHT_BUILD_ID
            .captures(r#"window.__twilightBuildID="not-a-uuid""#)
            .is_none());
    }

    #[tokio::test]
    #[ignore]
    async fn live_client_version_scrape() {
        let client = TwitchClient::new("", random_hex(16));
        let version = client.update_client_version().await;
        assert!(!version.is_empty());
    }
}
