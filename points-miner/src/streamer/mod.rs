//! Streamer status probing and metadata refresh.
//!
//! This is the translation layer between the schemaless GQL responses and
//! the typed broadcaster graph: every untyped lookup lives here, nothing
//! downstream sees raw JSON.

use serde_json::Value;
use tracing::{debug, info, warn};

use twitch_gql::{GqlError, TwitchClient};

use crate::domain::{CommunityGoal, Game, Streamer, Tag};
use crate::error::Result;

/// Probe a broadcaster's live status and bring its state up to date.
///
/// Offline→online needs the spade URL and fresh metadata before the flag
/// flips; online streamers only refresh metadata, and a refresh that
/// reports no stream flips them offline. All failures degrade to offline.
pub async fn check_streamer_online(client: &TwitchClient, user_id: &str, streamer: &Streamer) {
    if !streamer.probe_allowed() {
        return;
    }

    if !streamer.is_online() {
        if let Err(e) = fetch_spade_url(client, streamer).await {
            debug!(streamer = streamer.login(), error = %e, "spade url lookup failed");
            streamer.set_offline();
            return;
        }
        if let Err(e) = update_stream(client, user_id, streamer).await {
            debug!(streamer = streamer.login(), error = %e, "stream metadata refresh failed");
            streamer.set_offline();
            return;
        }
        streamer.set_online();
        info!(streamer = streamer.login(), "streamer is online");
    } else if let Err(e) = update_stream(client, user_id, streamer).await {
        debug!(streamer = streamer.login(), error = %e, "stream lost");
        info!(streamer = streamer.login(), "streamer went offline");
        streamer.set_offline();
    }
}

async fn fetch_spade_url(client: &TwitchClient, streamer: &Streamer) -> Result<()> {
    if streamer.stream.spade_url().is_some() {
        return Ok(());
    }
    let url = client.fetch_spade_url(streamer.login()).await?;
    streamer.stream.set_spade_url(url);
    Ok(())
}

/// Refresh the stream record from the overlay-channel query when stale.
pub async fn update_stream(client: &TwitchClient, user_id: &str, streamer: &Streamer) -> Result<()> {
    if !streamer.stream.update_required() {
        return Ok(());
    }

    let user = client.get_stream_info(streamer.login()).await?;
    let stream = &user["stream"];
    if stream.is_null() {
        return Err(GqlError::StreamerOffline.into());
    }

    let broadcast_id = stream["id"].as_str().unwrap_or_default().to_string();
    let broadcast_settings = &user["broadcastSettings"];
    let title = broadcast_settings["title"]
        .as_str()
        .unwrap_or_default()
        .trim()
        .to_string();

    let game = broadcast_settings
        .get("game")
        .filter(|v| v.is_object())
        .map(Game::from_gql);

    let tags = stream["tags"]
        .as_array()
        .map(|tags| {
            tags.iter()
                .map(|t| Tag {
                    id: t["id"].as_str().unwrap_or_default().to_string(),
                    localized_name: t["localizedName"].as_str().unwrap_or_default().to_string(),
                })
                .collect()
        })
        .unwrap_or_default();

    let viewers = stream["viewersCount"].as_u64().unwrap_or(0);

    let has_valid_game = game.as_ref().is_some_and(Game::is_valid);
    streamer
        .stream
        .update_metadata(broadcast_id, title, game, tags, viewers);

    // Campaign ids attach at refresh time; the drops tracker intersects
    // against them later.
    if has_valid_game && streamer.settings().claim_drops {
        match client.get_campaign_ids(streamer.channel_id()).await {
            Ok(ids) => streamer.stream.set_campaign_ids(ids),
            Err(e) => debug!(streamer = streamer.login(), error = %e, "campaign id fetch failed"),
        }
    }

    streamer
        .stream
        .set_payload(streamer.channel_id(), user_id, streamer.login());

    Ok(())
}

/// Seed points, multipliers, goals and any pending claim from the
/// channel-points context at load time.
pub async fn load_points_context(client: &TwitchClient, streamer: &Streamer) -> Result<()> {
    let data = client.channel_points_context(streamer.login()).await?;
    let channel = &data["community"]["channel"];
    let community_points = &channel["self"]["communityPoints"];

    if let Some(balance) = community_points["balance"].as_u64() {
        streamer.set_points(balance);
    }

    streamer.set_multipliers(multiplier_factors(community_points));

    if streamer.settings().community_goals {
        if let Some(goals) = channel["communityPointsSettings"]["goals"].as_array() {
            for goal in goals {
                streamer.upsert_goal(CommunityGoal::from_gql(goal));
            }
        }
    }

    // A bonus may already be waiting when the miner starts.
    if let Some(claim_id) = community_points["availableClaim"]["id"].as_str() {
        if let Err(e) = client.claim_bonus(streamer.channel_id(), claim_id).await {
            warn!(streamer = streamer.login(), error = %e, "startup bonus claim failed");
        }
    }

    Ok(())
}

fn multiplier_factors(community_points: &Value) -> Vec<f64> {
    community_points["activeMultipliers"]
        .as_array()
        .map(|ms| ms.iter().filter_map(|m| m["factor"].as_f64()).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn multiplier_parsing_tolerates_missing_block() {
        assert!(multiplier_factors(&json!({})).is_empty());
        let factors = multiplier_factors(&json!({
            "activeMultipliers": [{"factor": 0.1}, {"factor": 0.25}, {"bogus": 1}],
        }));
        assert_eq!(factors, vec![0.1, 0.25]);
    }
}
