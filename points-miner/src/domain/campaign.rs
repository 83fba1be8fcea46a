//! Drop campaigns and time-based drops.

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::Game;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CampaignStatus {
    Active,
    Expired,
    Unknown,
}

impl CampaignStatus {
    fn parse(s: &str) -> Self {
        match s {
            "ACTIVE" => Self::Active,
            "EXPIRED" => Self::Expired,
            _ => Self::Unknown,
        }
    }
}

/// A time-based drop inside a campaign.
#[derive(Debug, Clone, Default)]
pub struct Drop {
    pub id: String,
    pub name: String,
    pub benefit: String,
    pub required_minutes: u64,
    pub current_minutes: u64,
    pub percentage: u64,
    pub drop_instance_id: Option<String>,
    pub is_claimable: bool,
    pub is_claimed: bool,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
}

impl Drop {
    pub fn from_gql(data: &Value) -> Self {
        let benefit = data["benefitEdges"][0]["benefit"]["name"]
            .as_str()
            .unwrap_or_default()
            .to_string();

        let mut drop = Self {
            id: data["id"].as_str().unwrap_or_default().to_string(),
            name: data["name"].as_str().unwrap_or_default().to_string(),
            benefit,
            required_minutes: data["requiredMinutesWatched"].as_u64().unwrap_or(0),
            start_at: parse_rfc3339(&data["startAt"]),
            end_at: parse_rfc3339(&data["endAt"]),
            ..Default::default()
        };

        if let Some(self_data) = data.get("self").filter(|v| v.is_object()) {
            drop.update_self(self_data);
        }
        drop
    }

    /// Merge the viewer-specific `self` block from the inventory.
    ///
    /// A drop is claimable iff a drop instance exists, it has not been
    /// claimed, and the required minutes have been watched.
    pub fn update_self(&mut self, self_data: &Value) {
        if let Some(mins) = self_data["currentMinutesWatched"].as_u64() {
            self.current_minutes = mins;
        }
        if let Some(instance) = self_data["dropInstanceID"].as_str() {
            if !instance.is_empty() {
                self.drop_instance_id = Some(instance.to_string());
            }
        }
        if let Some(claimed) = self_data["isClaimed"].as_bool() {
            self.is_claimed = claimed;
        }

        if self.required_minutes > 0 {
            self.percentage = self.current_minutes * 100 / self.required_minutes;
        }

        self.is_claimable = self.drop_instance_id.is_some()
            && !self.is_claimed
            && self.current_minutes >= self.required_minutes;
    }

    /// Whether `now` falls inside the drop's own time window.
    pub fn window_contains(&self, now: DateTime<Utc>) -> bool {
        match (self.start_at, self.end_at) {
            (Some(start), Some(end)) => start < now && end > now,
            _ => false,
        }
    }
}

/// A drops campaign as shown on the viewer dashboard.
#[derive(Debug, Clone)]
pub struct Campaign {
    pub id: String,
    pub name: String,
    pub game: Option<Game>,
    pub status: CampaignStatus,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    /// Channel ids allowed to progress this campaign; empty means any.
    pub channels: Vec<String>,
    pub in_inventory: bool,
    pub drops: Vec<Drop>,
}

impl Campaign {
    pub fn from_gql(data: &Value) -> Self {
        let game = data.get("game").filter(|v| v.is_object()).map(Game::from_gql);

        let channels = data["allow"]["channels"]
            .as_array()
            .map(|chs| {
                chs.iter()
                    .filter_map(|c| c["id"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        let drops = data["timeBasedDrops"]
            .as_array()
            .map(|drops| drops.iter().map(Drop::from_gql).collect())
            .unwrap_or_default();

        Self {
            id: data["id"].as_str().unwrap_or_default().to_string(),
            name: data["name"].as_str().unwrap_or_default().to_string(),
            game,
            status: CampaignStatus::parse(data["status"].as_str().unwrap_or_default()),
            start_at: parse_rfc3339(&data["startAt"]),
            end_at: parse_rfc3339(&data["endAt"]),
            channels,
            in_inventory: false,
            drops,
        }
    }

    /// Whether `now` falls inside the campaign's date window.
    pub fn window_contains(&self, now: DateTime<Utc>) -> bool {
        match (self.start_at, self.end_at) {
            (Some(start), Some(end)) => start < now && end > now,
            _ => false,
        }
    }

    /// Retain only drops that are inside their window and not yet claimed.
    pub fn clear_claimed_drops(&mut self, now: DateTime<Utc>) {
        self.drops
            .retain(|d| d.window_contains(now) && !d.is_claimed);
    }

    /// Merge inventory progress into matching drops.
    pub fn merge_inventory(&mut self, inventory_drops: &[Value]) {
        for inv in inventory_drops {
            let Some(id) = inv["id"].as_str() else { continue };
            if let Some(drop) = self.drops.iter_mut().find(|d| d.id == id) {
                if let Some(self_data) = inv.get("self").filter(|v| v.is_object()) {
                    drop.update_self(self_data);
                }
            }
        }
    }
}

fn parse_rfc3339(value: &Value) -> Option<DateTime<Utc>> {
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn campaign_json(start: &str, end: &str) -> Value {
        json!({
            "id": "camp-1",
            "name": "Launch Drops",
            "status": "ACTIVE",
            "game": {"id": "g1", "name": "Rust Game"},
            "startAt": start,
            "endAt": end,
            "allow": {"channels": [{"id": "111"}, {"id": "222"}]},
            "timeBasedDrops": [{
                "id": "drop-1",
                "name": "Starter Pack",
                "requiredMinutesWatched": 240,
                "startAt": start,
                "endAt": end,
                "benefitEdges": [{"benefit": {"name": "Starter Pack"}}],
            }],
        })
    }

    #[test]
    fn parses_campaign_and_drops() {
        let c = Campaign::from_gql(&campaign_json(
            "2025-01-01T00:00:00Z",
            "2030-01-01T00:00:00Z",
        ));
        assert_eq!(c.id, "camp-1");
        assert_eq!(c.status, CampaignStatus::Active);
        assert_eq!(c.channels, vec!["111", "222"]);
        assert_eq!(c.game.as_ref().unwrap().id, "g1");
        assert_eq!(c.drops.len(), 1);
        assert_eq!(c.drops[0].benefit, "Starter Pack");
        assert_eq!(c.drops[0].required_minutes, 240);
        assert!(c.window_contains(Utc::now()));
    }

    #[test]
    fn expired_window_is_rejected() {
        let c = Campaign::from_gql(&campaign_json(
            "2020-01-01T00:00:00Z",
            "2020-02-01T00:00:00Z",
        ));
        assert!(!c.window_contains(Utc::now()));
    }

    #[test]
    fn drop_claimability_requires_instance_and_minutes() {
        let mut drop = Drop {
            required_minutes: 120,
            ..Default::default()
        };

        drop.update_self(&json!({"currentMinutesWatched": 130}));
        assert!(!drop.is_claimable, "no instance id yet");

        drop.update_self(&json!({"dropInstanceID": "inst-1"}));
        assert!(drop.is_claimable);
        assert_eq!(drop.percentage, 108);

        drop.update_self(&json!({"isClaimed": true}));
        assert!(!drop.is_claimable, "claimed drops are done");
    }

    #[test]
    fn clear_claimed_drops_prunes_claimed_and_out_of_window() {
        let now = Utc::now();
        let mut c = Campaign::from_gql(&campaign_json(
            "2025-01-01T00:00:00Z",
            "2030-01-01T00:00:00Z",
        ));
        c.drops[0].is_claimed = true;
        c.clear_claimed_drops(now);
        assert!(c.drops.is_empty());
    }

    #[test]
    fn merge_inventory_updates_matching_drop() {
        let mut c = Campaign::from_gql(&campaign_json(
            "2025-01-01T00:00:00Z",
            "2030-01-01T00:00:00Z",
        ));
        c.merge_inventory(&[json!({
            "id": "drop-1",
            "self": {"currentMinutesWatched": 240, "dropInstanceID": "inst-9"},
        })]);
        assert!(c.drops[0].is_claimable);
        assert_eq!(c.drops[0].drop_instance_id.as_deref(), Some("inst-9"));
    }
}
