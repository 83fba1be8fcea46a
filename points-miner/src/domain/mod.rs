//! Domain model: the broadcaster state graph and its value types.
//!
//! Everything mutable that is shared between tasks lives here, behind each
//! streamer's synchronized surface. The rest of the application only ever
//! goes through the accessor methods.

pub mod bet;
pub mod campaign;
pub mod goal;
pub mod prediction;
pub mod stream;
pub mod streamer;

pub use bet::{Bet, BetSettings, Strategy};
pub use campaign::{Campaign, Drop};
pub use goal::CommunityGoal;
pub use prediction::{EventPrediction, PredictionStatus, ResultKind};
pub use stream::Stream;
pub use streamer::{ChatPresence, HistoryEntry, Streamer, StreamerSettings};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A game/category reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub display_name: String,
}

impl Game {
    pub fn from_gql(data: &Value) -> Self {
        Self {
            id: data["id"].as_str().unwrap_or_default().to_string(),
            name: data["name"].as_str().unwrap_or_default().to_string(),
            display_name: data["displayName"].as_str().unwrap_or_default().to_string(),
        }
    }

    /// A game only counts when both id and name are present.
    pub fn is_valid(&self) -> bool {
        !self.id.is_empty() && !self.name.is_empty()
    }
}

/// A stream tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub id: String,
    pub localized_name: String,
}

/// A pending raid on a broadcaster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raid {
    pub raid_id: String,
    pub target_login: String,
}
