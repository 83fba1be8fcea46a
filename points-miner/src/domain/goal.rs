//! Community goals.

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalStatus {
    Started,
    Ended,
    Unknown,
}

impl GoalStatus {
    fn parse(s: &str) -> Self {
        match s {
            "STARTED" => Self::Started,
            "ENDED" => Self::Ended,
            _ => Self::Unknown,
        }
    }
}

/// A channel-scoped fundraising target denominated in points.
#[derive(Debug, Clone)]
pub struct CommunityGoal {
    pub goal_id: String,
    pub title: String,
    pub description: String,
    pub status: GoalStatus,
    pub points_contributed: u64,
    pub goal_amount: u64,
    pub per_stream_user_max: u64,
    pub in_stock: bool,
}

impl CommunityGoal {
    pub fn amount_left(&self) -> u64 {
        self.goal_amount.saturating_sub(self.points_contributed)
    }

    /// Whether the goal currently accepts contributions.
    pub fn accepts_contributions(&self) -> bool {
        self.status == GoalStatus::Started && self.in_stock
    }

    /// Decode from the GQL channel-points context (camelCase keys).
    pub fn from_gql(data: &Value) -> Self {
        Self {
            goal_id: data["id"].as_str().unwrap_or_default().to_string(),
            title: data["title"].as_str().unwrap_or_default().to_string(),
            description: data["description"].as_str().unwrap_or_default().to_string(),
            status: GoalStatus::parse(data["status"].as_str().unwrap_or_default()),
            points_contributed: data["pointsContributed"].as_u64().unwrap_or(0),
            goal_amount: data["goalAmount"].as_u64().unwrap_or(0),
            per_stream_user_max: data["perStreamUserMaximumContribution"].as_u64().unwrap_or(0),
            in_stock: data["isInStock"].as_bool().unwrap_or(false),
        }
    }

    /// Decode from a pubsub community-goal event (snake_case keys).
    pub fn from_pubsub(data: &Value) -> Self {
        Self {
            goal_id: data["id"].as_str().unwrap_or_default().to_string(),
            title: data["title"].as_str().unwrap_or_default().to_string(),
            description: data["description"].as_str().unwrap_or_default().to_string(),
            status: GoalStatus::parse(data["status"].as_str().unwrap_or_default()),
            points_contributed: data["points_contributed"].as_u64().unwrap_or(0),
            goal_amount: data["goal_amount"].as_u64().unwrap_or(0),
            per_stream_user_max: data["per_stream_user_maximum_contribution"]
                .as_u64()
                .unwrap_or(0),
            in_stock: data["is_in_stock"].as_bool().unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_both_wire_shapes() {
        let gql = CommunityGoal::from_gql(&json!({
            "id": "goal-1", "title": "New emote", "status": "STARTED",
            "pointsContributed": 1500, "goalAmount": 10000,
            "perStreamUserMaximumContribution": 2000, "isInStock": true,
        }));
        let ps = CommunityGoal::from_pubsub(&json!({
            "id": "goal-1", "title": "New emote", "status": "STARTED",
            "points_contributed": 1500, "goal_amount": 10000,
            "per_stream_user_maximum_contribution": 2000, "is_in_stock": true,
        }));

        assert_eq!(gql.amount_left(), 8500);
        assert_eq!(ps.amount_left(), 8500);
        assert!(gql.accepts_contributions());
        assert!(ps.accepts_contributions());
    }

    #[test]
    fn ended_or_out_of_stock_goals_reject_contributions() {
        let mut goal = CommunityGoal::from_pubsub(&json!({
            "id": "g", "status": "ENDED", "goal_amount": 100, "is_in_stock": true,
        }));
        assert!(!goal.accepts_contributions());

        goal.status = GoalStatus::Started;
        goal.in_stock = false;
        assert!(!goal.accepts_contributions());
    }

    #[test]
    fn amount_left_never_underflows() {
        let goal = CommunityGoal::from_pubsub(&json!({
            "id": "g", "status": "STARTED",
            "points_contributed": 500, "goal_amount": 100,
        }));
        assert_eq!(goal.amount_left(), 0);
    }
}
