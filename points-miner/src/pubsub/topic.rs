//! PubSub topic names.

use std::fmt;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopicKind {
    CommunityPointsUser,
    PredictionsUser,
    VideoPlaybackById,
    Raid,
    PredictionsChannel,
    CommunityMomentsChannel,
    CommunityPointsChannel,
}

impl TopicKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CommunityPointsUser => "community-points-user-v1",
            Self::PredictionsUser => "predictions-user-v1",
            Self::VideoPlaybackById => "video-playback-by-id",
            Self::Raid => "raid",
            Self::PredictionsChannel => "predictions-channel-v1",
            Self::CommunityMomentsChannel => "community-moments-channel-v1",
            Self::CommunityPointsChannel => "community-points-channel-v1",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "community-points-user-v1" => Some(Self::CommunityPointsUser),
            "predictions-user-v1" => Some(Self::PredictionsUser),
            "video-playback-by-id" => Some(Self::VideoPlaybackById),
            "raid" => Some(Self::Raid),
            "predictions-channel-v1" => Some(Self::PredictionsChannel),
            "community-moments-channel-v1" => Some(Self::CommunityMomentsChannel),
            "community-points-channel-v1" => Some(Self::CommunityPointsChannel),
            _ => None,
        }
    }

    /// User-scoped topics carry the OAuth token on LISTEN.
    pub fn is_user_scoped(&self) -> bool {
        matches!(self, Self::CommunityPointsUser | Self::PredictionsUser)
    }
}

impl fmt::Display for TopicKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A (kind, scope-id) pair; the scope is the user's own id for user-scoped
/// topics, a channel id otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic {
    pub kind: TopicKind,
    pub scope_id: String,
}

impl Topic {
    pub fn new(kind: TopicKind, scope_id: impl Into<String>) -> Self {
        Self {
            kind,
            scope_id: scope_id.into(),
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        let (kind, scope_id) = s
            .rsplit_once('.')
            .ok_or_else(|| Error::pubsub(format!("invalid topic format: {s}")))?;
        let kind = TopicKind::parse(kind)
            .ok_or_else(|| Error::pubsub(format!("unknown topic kind: {kind}")))?;
        if scope_id.is_empty() {
            return Err(Error::pubsub(format!("empty topic scope: {s}")));
        }
        Ok(Self::new(kind, scope_id))
    }

    pub fn is_user_scoped(&self) -> bool {
        self.kind.is_user_scoped()
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.kind, self.scope_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_and_parse_round_trip() {
        let kinds = [
            TopicKind::CommunityPointsUser,
            TopicKind::PredictionsUser,
            TopicKind::VideoPlaybackById,
            TopicKind::Raid,
            TopicKind::PredictionsChannel,
            TopicKind::CommunityMomentsChannel,
            TopicKind::CommunityPointsChannel,
        ];
        for kind in kinds {
            let topic = Topic::new(kind, "12345");
            let parsed = Topic::parse(&topic.to_string()).unwrap();
            assert_eq!(parsed, topic);
        }
    }

    #[test]
    fn parse_rejects_malformed_topics() {
        assert!(Topic::parse("no-dot-here").is_err());
        assert!(Topic::parse("unknown-kind.123").is_err());
        assert!(Topic::parse("raid.").is_err());
    }

    #[test]
    fn only_user_topics_are_user_scoped() {
        assert!(Topic::new(TopicKind::CommunityPointsUser, "1").is_user_scoped());
        assert!(Topic::new(TopicKind::PredictionsUser, "1").is_user_scoped());
        assert!(!Topic::new(TopicKind::Raid, "1").is_user_scoped());
        assert!(!Topic::new(TopicKind::VideoPlaybackById, "1").is_user_scoped());
    }
}
