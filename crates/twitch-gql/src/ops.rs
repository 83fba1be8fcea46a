//! Persisted GraphQL operations.
//!
//! Twitch's first-party clients send persisted queries: an operation name
//! plus the SHA-256 hash of the query text. The hashes below are the ones
//! the TV client ships; they identify the query server-side, no query body
//! is ever transmitted.

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
pub struct GqlOperation {
    #[serde(rename = "operationName")]
    pub operation_name: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<Value>,
    pub extensions: GqlExtensions,
}

#[derive(Debug, Clone, Serialize)]
pub struct GqlExtensions {
    #[serde(rename = "persistedQuery")]
    pub persisted_query: GqlPersistedQuery,
}

#[derive(Debug, Clone, Serialize)]
pub struct GqlPersistedQuery {
    pub version: u32,
    #[serde(rename = "sha256Hash")]
    pub sha256_hash: &'static str,
}

impl GqlOperation {
    pub fn new(operation_name: &'static str, sha256_hash: &'static str) -> Self {
        Self {
            operation_name,
            variables: None,
            extensions: GqlExtensions {
                persisted_query: GqlPersistedQuery {
                    version: 1,
                    sha256_hash,
                },
            },
        }
    }

    pub fn with_variables(mut self, variables: Value) -> Self {
        self.variables = Some(variables);
        self
    }
}

pub fn get_id_from_login() -> GqlOperation {
    GqlOperation::new(
        "GetIDFromLogin",
        "94e82a7b1e3c21e186daa73ee2afc4b8f23bade1fbbff6fe8ac133f50a2f58ca",
    )
}

pub fn video_player_stream_info_overlay_channel() -> GqlOperation {
    GqlOperation::new(
        "VideoPlayerStreamInfoOverlayChannel",
        "a5f2e34d626a9f4f5c0204f910bab2194948a9502089be558bb6e779a9e1b3d2",
    )
}

pub fn channel_points_context() -> GqlOperation {
    GqlOperation::new(
        "ChannelPointsContext",
        "1530a003a7d374b0380b79db0be0534f30ff46e61cffa2bc0e2468a909fbc024",
    )
}

pub fn claim_community_points() -> GqlOperation {
    GqlOperation::new(
        "ClaimCommunityPoints",
        "46aaeebe02c99afdf4fc97c7c0cba964124bf6b0af229395f1f6d1feed05b3d0",
    )
}

pub fn community_moment_callout_claim() -> GqlOperation {
    GqlOperation::new(
        "CommunityMomentCallout_Claim",
        "e2d67415aead910f7f9ceb45a77b750a1e1d9622c936d832328a0689e054db62",
    )
}

pub fn join_raid() -> GqlOperation {
    GqlOperation::new(
        "JoinRaid",
        "c6a332a86d1087fbbb1a8623aa01bd1313d2386e7c63be60fdb2d1901f01a4ae",
    )
}

pub fn playback_access_token() -> GqlOperation {
    GqlOperation::new(
        "PlaybackAccessToken",
        "3093517e37e4f4cb48906155bcd894150aef92617939236d2508f3375ab732ce",
    )
}

pub fn drops_highlight_service_available_drops() -> GqlOperation {
    GqlOperation::new(
        "DropsHighlightService_AvailableDrops",
        "9a62a09bce5b53e26e64a671e530bc599cb6aab1e5ba3cbd5d85966d3940716f",
    )
}

pub fn inventory() -> GqlOperation {
    GqlOperation::new(
        "Inventory",
        "d86775d0ef16a63a33ad52e80eaff963b2d5b72fada7c991504a57496e1d8e4b",
    )
    .with_variables(serde_json::json!({ "fetchRewardCampaigns": true }))
}

pub fn viewer_drops_dashboard() -> GqlOperation {
    GqlOperation::new(
        "ViewerDropsDashboard",
        "5a4da2ab3d5b47c9f9ce864e727b2cb346af1e3ea8b897fe8f704a97ff017619",
    )
    .with_variables(serde_json::json!({ "fetchRewardCampaigns": true }))
}

pub fn drops_page_claim_drop_rewards() -> GqlOperation {
    GqlOperation::new(
        "DropsPage_ClaimDropRewards",
        "a455deea71bdc9015b78eb49f4acfbce8baa7ccbedd28e549bb025bd0f751930",
    )
}

pub fn make_prediction() -> GqlOperation {
    GqlOperation::new(
        "MakePrediction",
        "b44682ecc88358817009f20e69d75081b1e58825bb40aa53d5dbadcc17c881d8",
    )
}

pub fn contribute_community_points_community_goal() -> GqlOperation {
    GqlOperation::new(
        "ContributeCommunityPointsCommunityGoal",
        "5774f0ea5d89587d73021a2e03c3c44777d903840c608754a1be519f51e37bb6",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_persisted_query_envelope() {
        let op = get_id_from_login().with_variables(serde_json::json!({ "login": "foo" }));
        let v = serde_json::to_value(&op).unwrap();

        assert_eq!(v["operationName"], "GetIDFromLogin");
        assert_eq!(v["variables"]["login"], "foo");
        assert_eq!(v["extensions"]["persistedQuery"]["version"], 1);
        assert_eq!(
            v["extensions"]["persistedQuery"]["sha256Hash"],
            "94e82a7b1e3c21e186daa73ee2afc4b8f23bade1fbbff6fe8ac133f50a2f58ca"
        );
    }

    #[test]
    fn variables_are_omitted_when_absent() {
        let v = serde_json::to_value(join_raid()).unwrap();
        assert!(v.get("variables").is_none());
    }

    #[test]
    fn inventory_carries_reward_campaign_flag() {
        let v = serde_json::to_value(inventory()).unwrap();
        assert_eq!(v["variables"]["fetchRewardCampaigns"], true);
    }
}
