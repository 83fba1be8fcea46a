//! Drops tracker.
//!
//! On a long period: claim whatever the inventory says is ready, pull the
//! active campaign dashboard, keep only campaigns whose window covers now
//! and that still have unclaimed drops, reconcile them against the
//! inventory, and annotate each eligible broadcaster with the campaigns
//! that match its current game.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::api::TwitchApi;
use crate::domain::campaign::{Campaign, Drop};
use crate::domain::Streamer;
use crate::error::Result;

/// Gap between consecutive drop claims.
const CLAIM_SPACING: Duration = Duration::from_secs(5);

pub struct DropsTracker {
    api: Arc<dyn TwitchApi>,
    streamers: Vec<Arc<Streamer>>,
    sync_interval: Duration,
    cancel: CancellationToken,
}

impl DropsTracker {
    pub fn new(
        api: Arc<dyn TwitchApi>,
        streamers: Vec<Arc<Streamer>>,
        sync_interval_minutes: u64,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            api,
            streamers,
            sync_interval: Duration::from_secs(sync_interval_minutes * 60),
            cancel,
        }
    }

    pub async fn run(self) {
        loop {
            if self.cancel.is_cancelled() {
                return;
            }

            self.sync_campaigns().await;

            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(self.sync_interval) => {}
            }
        }
    }

    async fn sync_campaigns(&self) {
        self.claim_inventory_drops().await;

        let campaigns = match self.active_campaigns().await {
            Ok(campaigns) => campaigns,
            Err(e) => {
                error!(error = %e, "campaign dashboard fetch failed");
                return;
            }
        };

        let campaigns = self.reconcile_with_inventory(campaigns).await;
        self.attach_streamer_campaigns(&campaigns);
    }

    /// Pass one: walk the inventory and claim every drop that is ready.
    async fn claim_inventory_drops(&self) {
        let inventory = match self.api.inventory().await {
            Ok(v) => v,
            Err(e) => {
                error!(error = %e, "inventory fetch failed");
                return;
            }
        };
        let Some(in_progress) = inventory["dropCampaignsInProgress"].as_array() else {
            return;
        };

        for campaign in in_progress {
            let Some(drops) = campaign["timeBasedDrops"].as_array() else {
                continue;
            };
            for drop_data in drops {
                let drop = Drop::from_gql(drop_data);
                if !drop.is_claimable {
                    continue;
                }

                self.claim(&drop).await;

                tokio::select! {
                    _ = self.cancel.cancelled() => return,
                    _ = tokio::time::sleep(CLAIM_SPACING) => {}
                }
            }
        }
    }

    async fn claim(&self, drop: &Drop) {
        let Some(instance_id) = drop.drop_instance_id.as_deref() else {
            return;
        };
        match self.api.claim_drop(instance_id).await {
            Ok(true) => info!(drop = %drop.name, benefit = %drop.benefit, "claimed drop"),
            Ok(false) => debug!(drop = %drop.name, "drop claim not accepted"),
            // Transient; the next sync retries.
            Err(e) => error!(drop = %drop.name, error = %e, "drop claim failed"),
        }
    }

    /// Fetch ACTIVE campaigns and keep the ones worth tracking.
    async fn active_campaigns(&self) -> Result<Vec<Campaign>> {
        let raw = self.api.active_campaigns().await?;
        Ok(retain_current(raw, Utc::now()))
    }

    /// Merge inventory progress into the campaign set and claim anything
    /// that became eligible.
    async fn reconcile_with_inventory(&self, mut campaigns: Vec<Campaign>) -> Vec<Campaign> {
        let inventory = match self.api.inventory().await {
            Ok(v) => v,
            Err(e) => {
                error!(error = %e, "inventory fetch failed");
                return campaigns;
            }
        };
        let Some(in_progress) = inventory["dropCampaignsInProgress"].as_array() else {
            return campaigns;
        };

        let now = Utc::now();
        for campaign in &mut campaigns {
            campaign.clear_claimed_drops(now);

            let Some(progress) = in_progress
                .iter()
                .find(|p| p["id"].as_str() == Some(campaign.id.as_str()))
            else {
                continue;
            };
            campaign.in_inventory = true;

            if let Some(drops) = progress["timeBasedDrops"].as_array() {
                campaign.merge_inventory(drops);
            }

            for drop in &mut campaign.drops {
                if drop.is_claimable {
                    self.claim(drop).await;
                    drop.is_claimed = true;
                }
            }
            campaign.clear_claimed_drops(now);
        }

        campaigns
    }

    /// Attach to every eligible broadcaster the campaigns matching its
    /// current game and highlighted campaign ids.
    fn attach_streamer_campaigns(&self, campaigns: &[Campaign]) {
        for streamer in &self.streamers {
            if !streamer.drops_eligible() {
                continue;
            }

            let game_id = streamer.stream.game_id();
            let highlighted = streamer.stream.campaign_ids();
            let matching = matching_campaigns(campaigns, &game_id, &highlighted);

            debug!(
                streamer = streamer.login(),
                campaigns = matching.len(),
                "campaigns attached"
            );
            streamer.stream.set_campaigns(matching);
        }
    }
}

/// Keep campaigns whose window covers `now` and that still have drops.
fn retain_current(raw: Vec<Value>, now: chrono::DateTime<Utc>) -> Vec<Campaign> {
    raw.iter()
        .map(Campaign::from_gql)
        .filter_map(|mut c| {
            if !c.window_contains(now) {
                return None;
            }
            c.clear_claimed_drops(now);
            (!c.drops.is_empty()).then_some(c)
        })
        .collect()
}

/// Campaigns whose game matches and whose id is highlighted on the stream.
fn matching_campaigns(
    campaigns: &[Campaign],
    game_id: &str,
    highlighted_ids: &[String],
) -> Vec<Campaign> {
    if game_id.is_empty() {
        return Vec::new();
    }

    campaigns
        .iter()
        .filter(|c| !c.drops.is_empty())
        .filter(|c| c.game.as_ref().is_some_and(|g| g.id == game_id))
        .filter(|c| highlighted_ids.iter().any(|id| *id == c.id))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn campaign(id: &str, game_id: &str, start: &str, end: &str) -> Value {
        json!({
            "id": id,
            "name": id,
            "status": "ACTIVE",
            "game": {"id": game_id, "name": "Some Game"},
            "startAt": start,
            "endAt": end,
            "timeBasedDrops": [{
                "id": format!("{id}-drop"),
                "name": "Reward",
                "requiredMinutesWatched": 60,
                "startAt": start,
                "endAt": end,
            }],
        })
    }

    #[test]
    fn retain_current_drops_expired_campaigns() {
        let now = Utc::now();
        let kept = retain_current(
            vec![
                campaign("live", "g1", "2025-01-01T00:00:00Z", "2030-01-01T00:00:00Z"),
                campaign("old", "g1", "2020-01-01T00:00:00Z", "2020-06-01T00:00:00Z"),
            ],
            now,
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "live");
    }

    #[test]
    fn retain_current_drops_fully_claimed_campaigns() {
        let now = Utc::now();
        let mut raw = campaign("live", "g1", "2025-01-01T00:00:00Z", "2030-01-01T00:00:00Z");
        raw["timeBasedDrops"][0]["self"] = json!({"isClaimed": true});
        assert!(retain_current(vec![raw], now).is_empty());
    }

    #[test]
    fn matching_requires_game_and_highlight() {
        let now = Utc::now();
        let campaigns = retain_current(
            vec![
                campaign("c1", "g1", "2025-01-01T00:00:00Z", "2030-01-01T00:00:00Z"),
                campaign("c2", "g2", "2025-01-01T00:00:00Z", "2030-01-01T00:00:00Z"),
                campaign("c3", "g1", "2025-01-01T00:00:00Z", "2030-01-01T00:00:00Z"),
            ],
            now,
        );

        let highlighted = vec!["c1".to_string(), "c2".to_string()];
        let matched = matching_campaigns(&campaigns, "g1", &highlighted);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id, "c1", "c2 is the wrong game, c3 not highlighted");

        assert!(matching_campaigns(&campaigns, "", &highlighted).is_empty());
    }

    #[test]
    fn matching_ignores_campaigns_without_game() {
        let now = Utc::now();
        let mut raw = campaign("c1", "g1", "2025-01-01T00:00:00Z", "2030-01-01T00:00:00Z");
        raw["game"] = Value::Null;
        let campaigns = retain_current(vec![raw], now);
        assert!(campaigns[0].game.is_none());
        assert!(matching_campaigns(&campaigns, "g1", &["c1".to_string()]).is_empty());
    }
}
