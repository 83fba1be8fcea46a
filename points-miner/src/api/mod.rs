//! Seam between the core and the Twitch client.
//!
//! The dispatcher and trackers call these operations; the trait exists so
//! their logic can be exercised against a recording implementation in
//! tests, in the same way the repositories are traited elsewhere.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use twitch_gql::TwitchClient;

use crate::domain::Streamer;
use crate::error::Result;
use crate::streamer as status;

/// Operations the core invokes against Twitch.
#[async_trait]
pub trait TwitchApi: Send + Sync {
    async fn claim_bonus(&self, channel_id: &str, claim_id: &str) -> Result<()>;
    async fn claim_moment(&self, moment_id: &str) -> Result<()>;
    async fn join_raid(&self, raid_id: &str) -> Result<()>;
    async fn place_prediction(&self, event_id: &str, outcome_id: &str, points: u64) -> Result<()>;
    async fn contribute_goal(&self, channel_id: &str, goal_id: &str, amount: u64) -> Result<()>;
    async fn claim_drop(&self, drop_instance_id: &str) -> Result<bool>;
    async fn inventory(&self) -> Result<Value>;
    async fn active_campaigns(&self) -> Result<Vec<Value>>;

    /// Probe and update a broadcaster's online state.
    async fn check_streamer_online(&self, streamer: &Arc<Streamer>);
}

/// Production implementation backed by the GQL client.
pub struct ApiHandle {
    client: Arc<TwitchClient>,
    user_id: String,
}

impl ApiHandle {
    pub fn new(client: Arc<TwitchClient>, user_id: impl Into<String>) -> Self {
        Self {
            client,
            user_id: user_id.into(),
        }
    }

    pub fn client(&self) -> &Arc<TwitchClient> {
        &self.client
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

#[async_trait]
impl TwitchApi for ApiHandle {
    async fn claim_bonus(&self, channel_id: &str, claim_id: &str) -> Result<()> {
        self.client.claim_bonus(channel_id, claim_id).await?;
        Ok(())
    }

    async fn claim_moment(&self, moment_id: &str) -> Result<()> {
        self.client.claim_moment(moment_id).await?;
        Ok(())
    }

    async fn join_raid(&self, raid_id: &str) -> Result<()> {
        self.client.join_raid(raid_id).await?;
        Ok(())
    }

    async fn place_prediction(&self, event_id: &str, outcome_id: &str, points: u64) -> Result<()> {
        self.client
            .make_prediction(event_id, outcome_id, points)
            .await?;
        Ok(())
    }

    async fn contribute_goal(&self, channel_id: &str, goal_id: &str, amount: u64) -> Result<()> {
        self.client
            .contribute_community_goal(channel_id, goal_id, amount)
            .await?;
        Ok(())
    }

    async fn claim_drop(&self, drop_instance_id: &str) -> Result<bool> {
        Ok(self.client.claim_drop(drop_instance_id).await?)
    }

    async fn inventory(&self) -> Result<Value> {
        Ok(self.client.inventory().await?)
    }

    async fn active_campaigns(&self) -> Result<Vec<Value>> {
        Ok(self.client.drops_dashboard(Some("ACTIVE")).await?)
    }

    async fn check_streamer_online(&self, streamer: &Arc<Streamer>) {
        status::check_streamer_online(&self.client, &self.user_id, streamer).await;
    }
}
