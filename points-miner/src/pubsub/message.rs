//! PubSub wire frames and event parsing.
//!
//! Frames are small JSON envelopes keyed on `type`. A MESSAGE frame carries
//! the topic string and a stringified inner JSON document; that document is
//! decoded here, at the boundary, into a typed `PubSubEvent` so nothing
//! downstream ever walks untyped maps for routing.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

use super::topic::Topic;

/// One frame on the socket, in either direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsFrame {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<FrameData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topics: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl WsFrame {
    pub fn ping() -> Self {
        Self {
            kind: "PING".into(),
            nonce: None,
            data: None,
            error: None,
        }
    }

    /// A LISTEN or UNLISTEN frame for one topic. The OAuth token rides
    /// along only for user-scoped topics.
    pub fn listen(kind: &str, topic: &Topic, nonce: String, auth_token: &str) -> Self {
        Self {
            kind: kind.into(),
            nonce: Some(nonce),
            data: Some(FrameData {
                topics: Some(vec![topic.to_string()]),
                auth_token: topic
                    .is_user_scoped()
                    .then(|| auth_token.to_string()),
                ..FrameData::default()
            }),
            error: None,
        }
    }
}

/// A parsed inbound event, ready for dispatch.
#[derive(Debug, Clone)]
pub struct PubSubEvent {
    pub topic: Topic,
    pub event_type: String,
    /// The inner `data` object, when present.
    pub data: Option<Value>,
    /// The full inner document (some topics put payload at the top level).
    pub message: Value,
    /// Best-effort channel id for routing.
    pub channel_id: String,
    pub timestamp: DateTime<Utc>,
}

impl PubSubEvent {
    /// Composite key used for adjacent-duplicate collapsing.
    pub fn dedup_key(&self) -> String {
        format!("{}.{}.{}", self.event_type, self.topic, self.channel_id)
    }
}

/// Decode a MESSAGE frame's payload into a typed event.
pub fn parse_event(data: &FrameData) -> Result<PubSubEvent> {
    let topic_str = data
        .topic
        .as_deref()
        .ok_or_else(|| Error::pubsub("MESSAGE frame without topic"))?;
    let topic = Topic::parse(topic_str)?;

    let raw = data
        .message
        .as_deref()
        .ok_or_else(|| Error::pubsub("MESSAGE frame without message body"))?;
    let message: Value = serde_json::from_str(raw)?;

    let event_type = message["type"].as_str().unwrap_or_default().to_string();
    let data_obj = message.get("data").filter(|v| v.is_object()).cloned();

    let channel_id = data_obj
        .as_ref()
        .and_then(extract_channel_id)
        .unwrap_or_else(|| topic.scope_id.clone());

    let timestamp = extract_timestamp(&message, data_obj.as_ref());

    Ok(PubSubEvent {
        topic,
        event_type,
        data: data_obj,
        message,
        channel_id,
        timestamp,
    })
}

/// Channel id extraction, in the order the payloads actually nest it.
fn extract_channel_id(data: &Value) -> Option<String> {
    for path in [
        &data["prediction"]["channel_id"],
        &data["claim"]["channel_id"],
        &data["channel_id"],
        &data["balance"]["channel_id"],
    ] {
        if let Some(id) = path.as_str() {
            return Some(id.to_string());
        }
    }
    None
}

fn extract_timestamp(message: &Value, data: Option<&Value>) -> DateTime<Utc> {
    if let Some(ts) = data.and_then(|d| d["timestamp"].as_str()) {
        if let Ok(t) = DateTime::parse_from_rfc3339(ts) {
            return t.with_timezone(&Utc);
        }
    }
    if let Some(secs) = message["server_time"].as_f64() {
        if let Some(t) = Utc.timestamp_opt(secs as i64, 0).single() {
            return t;
        }
    }
    Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pubsub::topic::TopicKind;
    use serde_json::json;

    fn frame_data(topic: &str, message: Value) -> FrameData {
        FrameData {
            topic: Some(topic.to_string()),
            message: Some(message.to_string()),
            ..FrameData::default()
        }
    }

    #[test]
    fn listen_frame_carries_token_only_for_user_topics() {
        let user = Topic::new(TopicKind::CommunityPointsUser, "42");
        let frame = WsFrame::listen("LISTEN", &user, "a".repeat(30), "secret");
        let v = serde_json::to_value(&frame).unwrap();
        assert_eq!(v["type"], "LISTEN");
        assert_eq!(v["data"]["topics"][0], "community-points-user-v1.42");
        assert_eq!(v["data"]["auth_token"], "secret");
        assert_eq!(v["nonce"].as_str().unwrap().len(), 30);

        let channel = Topic::new(TopicKind::VideoPlaybackById, "42");
        let frame = WsFrame::listen("LISTEN", &channel, "b".repeat(30), "secret");
        let v = serde_json::to_value(&frame).unwrap();
        assert!(v["data"].get("auth_token").is_none());
    }

    #[test]
    fn ping_frame_is_bare() {
        let v = serde_json::to_value(WsFrame::ping()).unwrap();
        assert_eq!(v, json!({"type": "PING"}));
    }

    #[test]
    fn parses_message_with_balance_channel_id() {
        let data = frame_data(
            "community-points-user-v1.999",
            json!({
                "type": "points-earned",
                "data": {
                    "balance": {"balance": 1250, "channel_id": "777"},
                    "point_gain": {"total_points": 250, "reason_code": "WATCH"},
                },
            }),
        );
        let event = parse_event(&data).unwrap();
        assert_eq!(event.event_type, "points-earned");
        assert_eq!(event.topic.kind, TopicKind::CommunityPointsUser);
        assert_eq!(event.channel_id, "777", "balance channel id wins over topic scope");
    }

    #[test]
    fn claim_channel_id_beats_topic_scope() {
        let data = frame_data(
            "community-points-user-v1.999",
            json!({
                "type": "claim-available",
                "data": {"claim": {"id": "c1", "channel_id": "555"}},
            }),
        );
        assert_eq!(parse_event(&data).unwrap().channel_id, "555");
    }

    #[test]
    fn falls_back_to_topic_scope_for_routing() {
        let data = frame_data(
            "video-playback-by-id.31337",
            json!({"type": "viewcount", "viewers": 100}),
        );
        let event = parse_event(&data).unwrap();
        assert_eq!(event.channel_id, "31337");
        assert!(event.data.is_none());
    }

    #[test]
    fn dedup_key_combines_type_topic_and_channel() {
        let data = frame_data(
            "raid.123",
            json!({"type": "raid_update_v2", "raid": {"id": "r"}}),
        );
        let event = parse_event(&data).unwrap();
        assert_eq!(event.dedup_key(), "raid_update_v2.raid.123.123");
    }

    #[test]
    fn malformed_inner_json_is_an_error() {
        let data = FrameData {
            topic: Some("raid.1".into()),
            message: Some("{not json".into()),
            ..FrameData::default()
        };
        assert!(parse_event(&data).is_err());
    }

    #[test]
    fn response_frame_error_field_round_trips() {
        let raw = r#"{"type":"RESPONSE","error":"ERR_BADAUTH","nonce":"abc"}"#;
        let frame: WsFrame = serde_json::from_str(raw).unwrap();
        assert_eq!(frame.kind, "RESPONSE");
        assert_eq!(frame.error.as_deref(), Some("ERR_BADAUTH"));
    }
}
