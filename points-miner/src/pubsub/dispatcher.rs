//! Event dispatcher.
//!
//! A single consumer task drains the shared channel fed by every session,
//! routes each event to its broadcaster by channel id (events for unknown
//! broadcasters are dropped) and applies the handler for the
//! (topic-kind, event-type) pair. The prediction map lives here and is
//! touched by nothing else; deferred bets re-enter through the same
//! channel as `BetTimer` messages so the map never needs a lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::analytics::AnalyticsSink;
use crate::api::TwitchApi;
use crate::domain::prediction::{EventPrediction, PredictionStatus, ResultKind};
use crate::domain::streamer::REASON_WATCH_STREAK;
use crate::domain::{Raid, Streamer};

use super::message::PubSubEvent;
use super::topic::TopicKind;

/// Called on confirmed online/offline transitions with (login, online).
pub type StatusCallback = Arc<dyn Fn(&str, bool) + Send + Sync>;

/// Input to the dispatcher task.
#[derive(Debug)]
pub enum DispatcherMsg {
    Event(PubSubEvent),
    /// A deferred bet timer fired for this prediction event.
    BetTimer { event_id: String },
}

pub struct Dispatcher {
    api: Arc<dyn TwitchApi>,
    analytics: Arc<dyn AnalyticsSink>,
    streamers: HashMap<String, Arc<Streamer>>,
    predictions: HashMap<String, EventPrediction>,
    tx: mpsc::Sender<DispatcherMsg>,
    cancel: CancellationToken,
    status_callback: Option<StatusCallback>,
}

impl Dispatcher {
    pub fn new(
        api: Arc<dyn TwitchApi>,
        analytics: Arc<dyn AnalyticsSink>,
        streamers: &[Arc<Streamer>],
        tx: mpsc::Sender<DispatcherMsg>,
        cancel: CancellationToken,
    ) -> Self {
        let streamers = streamers
            .iter()
            .map(|s| (s.channel_id().to_string(), s.clone()))
            .collect();
        Self {
            api,
            analytics,
            streamers,
            predictions: HashMap::new(),
            tx,
            cancel,
            status_callback: None,
        }
    }

    pub fn with_status_callback(mut self, callback: StatusCallback) -> Self {
        self.status_callback = Some(callback);
        self
    }

    /// Run until cancellation or until every sender is gone.
    pub async fn run(mut self, mut rx: mpsc::Receiver<DispatcherMsg>) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                msg = rx.recv() => match msg {
                    Some(msg) => self.handle(msg).await,
                    None => return,
                },
            }
        }
    }

    pub(crate) async fn handle(&mut self, msg: DispatcherMsg) {
        match msg {
            DispatcherMsg::Event(event) => self.dispatch(event).await,
            DispatcherMsg::BetTimer { event_id } => self.fire_bet(&event_id).await,
        }
    }

    pub(crate) async fn dispatch(&mut self, event: PubSubEvent) {
        let Some(streamer) = self.streamers.get(&event.channel_id).cloned() else {
            debug!(channel_id = %event.channel_id, "event for unknown broadcaster dropped");
            return;
        };

        match event.topic.kind {
            TopicKind::CommunityPointsUser => self.on_points_user(&event, &streamer).await,
            TopicKind::VideoPlaybackById => self.on_video_playback(&event, &streamer).await,
            TopicKind::Raid => self.on_raid(&event, &streamer).await,
            TopicKind::CommunityMomentsChannel => self.on_moment(&event, &streamer).await,
            TopicKind::PredictionsChannel => self.on_prediction_channel(&event, &streamer).await,
            TopicKind::PredictionsUser => self.on_prediction_user(&event, &streamer).await,
            TopicKind::CommunityPointsChannel => self.on_points_channel(&event, &streamer).await,
        }
    }

    // ---- community-points-user-v1 -------------------------------------

    async fn on_points_user(&self, event: &PubSubEvent, streamer: &Arc<Streamer>) {
        let Some(data) = event.data.as_ref() else { return };

        match event.event_type.as_str() {
            "points-earned" | "points-spent" => {
                if let Some(balance) = data["balance"]["balance"].as_u64() {
                    streamer.set_points(balance);
                }

                if event.event_type == "points-earned" {
                    let gain = &data["point_gain"];
                    let earned = gain["total_points"].as_i64().unwrap_or(0);
                    let reason = gain["reason_code"].as_str().unwrap_or_default();
                    info!(
                        streamer = streamer.login(),
                        points = earned,
                        reason,
                        "points earned"
                    );
                    streamer.update_history(reason, earned);

                    self.analytics
                        .record_points(streamer.login(), streamer.points(), reason)
                        .await;
                    if reason == REASON_WATCH_STREAK {
                        self.analytics
                            .record_annotation(
                                streamer.login(),
                                REASON_WATCH_STREAK,
                                &format!("+{earned} - Watch Streak"),
                            )
                            .await;
                    }
                } else {
                    self.analytics
                        .record_points(streamer.login(), streamer.points(), "Spent")
                        .await;
                }
            }

            "claim-available" => {
                let Some(claim_id) = data["claim"]["id"].as_str() else { return };
                if let Err(e) = self
                    .api
                    .claim_bonus(streamer.channel_id(), claim_id)
                    .await
                {
                    error!(streamer = streamer.login(), error = %e, "bonus claim failed");
                }
            }

            _ => {}
        }
    }

    // ---- video-playback-by-id -----------------------------------------

    async fn on_video_playback(&self, event: &PubSubEvent, streamer: &Arc<Streamer>) {
        match event.event_type.as_str() {
            "stream-up" => streamer.mark_stream_up(),
            "stream-down" => {
                if streamer.is_online() {
                    streamer.set_offline();
                    info!(streamer = streamer.login(), "streamer went offline");
                    self.notify_status(streamer.login(), false);
                }
            }
            "viewcount" => {
                let was_online = streamer.is_online();
                if streamer.stream_up_settled() {
                    self.api.check_streamer_online(streamer).await;
                    if !was_online && streamer.is_online() {
                        self.notify_status(streamer.login(), true);
                    }
                }
            }
            _ => {}
        }
    }

    fn notify_status(&self, login: &str, online: bool) {
        if let Some(callback) = &self.status_callback {
            callback(login, online);
        }
    }

    // ---- raid ---------------------------------------------------------

    async fn on_raid(&self, event: &PubSubEvent, streamer: &Arc<Streamer>) {
        if event.event_type != "raid_update_v2" || !streamer.settings().follow_raid {
            return;
        }

        let raid = &event.message["raid"];
        let (Some(raid_id), Some(target)) = (raid["id"].as_str(), raid["target_login"].as_str())
        else {
            return;
        };

        let raid = Raid {
            raid_id: raid_id.to_string(),
            target_login: target.to_string(),
        };
        if !streamer.register_raid(raid) {
            return;
        }

        info!(from = streamer.login(), to = target, "joining raid");
        if let Err(e) = self.api.join_raid(raid_id).await {
            error!(streamer = streamer.login(), error = %e, "raid join failed");
        }
    }

    // ---- community-moments-channel-v1 ---------------------------------

    async fn on_moment(&self, event: &PubSubEvent, streamer: &Arc<Streamer>) {
        if event.event_type != "active" || !streamer.settings().claim_moments {
            return;
        }
        let Some(moment_id) = event.data.as_ref().and_then(|d| d["moment_id"].as_str()) else {
            return;
        };

        info!(streamer = streamer.login(), "claiming moment");
        if let Err(e) = self.api.claim_moment(moment_id).await {
            error!(streamer = streamer.login(), error = %e, "moment claim failed");
        }
    }

    // ---- predictions-channel-v1 ---------------------------------------

    async fn on_prediction_channel(&mut self, event: &PubSubEvent, streamer: &Arc<Streamer>) {
        if !streamer.settings().make_predictions {
            return;
        }
        let Some(event_data) = event.data.as_ref().map(|d| &d["event"]).filter(|v| v.is_object())
        else {
            return;
        };

        let event_id = event_data["id"].as_str().unwrap_or_default().to_string();
        let status = event_data["status"].as_str().unwrap_or_default();

        match event.event_type.as_str() {
            "event-created" => {
                self.enroll_prediction(streamer, event_data, event_id, status)
                    .await;
            }
            "event-updated" => {
                let Some(prediction) = self.predictions.get_mut(&event_id) else {
                    return;
                };
                if let Some(new_status) = PredictionStatus::parse(status) {
                    prediction.status = new_status;
                }

                if prediction.status == PredictionStatus::Canceled {
                    debug!(event = %prediction.title, "prediction canceled, dropping");
                    self.predictions.remove(&event_id);
                    return;
                }

                if !prediction.bet_placed && prediction.bet.decision.is_none() {
                    if let Some(outcomes) = event_data["outcomes"].as_array() {
                        prediction.bet.update_outcomes(outcomes);
                    }
                }
            }
            _ => {}
        }
    }

    /// Enrolment per the new-prediction preconditions; schedules the
    /// one-shot deferred bet on success.
    async fn enroll_prediction(
        &mut self,
        streamer: &Arc<Streamer>,
        event_data: &Value,
        event_id: String,
        status: &str,
    ) {
        if event_id.is_empty()
            || self.predictions.contains_key(&event_id)
            || status != "ACTIVE"
        {
            return;
        }
        if !streamer.is_online() {
            return;
        }

        let settings = streamer.bet_settings();
        if settings.minimum_points > 0 && streamer.points() <= settings.minimum_points {
            info!(
                streamer = streamer.login(),
                points = streamer.points(),
                minimum = settings.minimum_points,
                "not enough points for prediction"
            );
            return;
        }

        let title = event_data["title"].as_str().unwrap_or_default().to_string();
        let created_at = event_data["created_at"]
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);
        let raw_window = event_data["prediction_window_seconds"].as_f64().unwrap_or(0.0);
        let outcomes = event_data["outcomes"].as_array().cloned().unwrap_or_default();

        let adjusted = settings.adjusted_window(raw_window);
        let prediction = EventPrediction::new(
            event_id.clone(),
            streamer.channel_id().to_string(),
            streamer.login().to_string(),
            title,
            created_at,
            adjusted,
            PredictionStatus::Active,
            &outcomes,
            settings,
        );

        let closing_in = prediction.closing_in(Utc::now());
        if closing_in <= 0.0 {
            return;
        }

        info!(
            streamer = streamer.login(),
            event = %prediction.title,
            place_in_secs = closing_in,
            "prediction event scheduled"
        );
        self.predictions.insert(event_id.clone(), prediction);

        let tx = self.tx.clone();
        let cancel = self.cancel.child_token();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(Duration::from_secs_f64(closing_in)) => {
                    let _ = tx.send(DispatcherMsg::BetTimer { event_id }).await;
                }
            }
        });
    }

    /// Place the bet for a tracked prediction, iff it is still ACTIVE.
    async fn fire_bet(&mut self, event_id: &str) {
        let Some(prediction) = self.predictions.get_mut(event_id) else {
            return;
        };
        if prediction.status != PredictionStatus::Active {
            debug!(event = %prediction.title, "prediction left ACTIVE before bet");
            return;
        }
        let Some(streamer) = self.streamers.get(&prediction.channel_id) else {
            return;
        };

        // Re-derive the statistics from the latest totals before deciding.
        prediction.bet.update_outcomes(&[]);

        let balance = streamer.points();
        let Some(decision) = prediction.bet.calculate(balance) else {
            warn!(event = %prediction.title, "no viable outcome to bet on");
            return;
        };

        if decision.amount < 10 {
            info!(
                event = %prediction.title,
                amount = decision.amount,
                "bet amount too low"
            );
            return;
        }

        let (skip, compared) = prediction.bet.skip(decision.choice);
        if skip {
            info!(
                event = %prediction.title,
                compared_value = compared,
                "bet filtered out"
            );
            return;
        }

        info!(
            event = %prediction.title,
            choice = decision.choice,
            amount = decision.amount,
            "placing prediction bet"
        );
        match self
            .api
            .place_prediction(event_id, &decision.outcome_id, decision.amount)
            .await
        {
            Ok(()) => prediction.bet_placed = true,
            Err(e) => error!(event = %prediction.title, error = %e, "prediction failed"),
        }
    }

    // ---- predictions-user-v1 ------------------------------------------

    async fn on_prediction_user(&mut self, event: &PubSubEvent, streamer: &Arc<Streamer>) {
        let Some(prediction_data) = event
            .data
            .as_ref()
            .map(|d| &d["prediction"])
            .filter(|v| v.is_object())
        else {
            return;
        };
        let Some(event_id) = prediction_data["event_id"].as_str() else { return };
        let Some(prediction) = self.predictions.get_mut(event_id) else { return };

        match event.event_type.as_str() {
            "prediction-made" => {
                prediction.bet_confirmed = true;
                info!(event = %prediction.title, "prediction confirmed");
                self.analytics
                    .record_annotation(streamer.login(), "PREDICTION_MADE", "Prediction placed")
                    .await;
            }

            "prediction-result" => {
                if !prediction.bet_confirmed {
                    return;
                }
                let result = &prediction_data["result"];
                if !result.is_object() {
                    return;
                }

                let settlement = prediction.settle(result);
                let kind = prediction
                    .result
                    .as_ref()
                    .map(|r| r.kind)
                    .unwrap_or(ResultKind::Lose);
                info!(
                    event = %prediction.title,
                    result = kind.as_str(),
                    gained = settlement.gained,
                    "prediction result"
                );

                streamer.update_history("PREDICTION", settlement.gained);
                match kind {
                    ResultKind::Refund => {
                        streamer.update_history_with("REFUND", -settlement.placed, -1);
                    }
                    ResultKind::Win => {
                        streamer.update_history_with("PREDICTION", -settlement.won, -1);
                    }
                    ResultKind::Lose => {}
                }

                self.analytics
                    .record_annotation(
                        streamer.login(),
                        kind.as_str(),
                        &format!("Prediction {}", kind.as_str()),
                    )
                    .await;

                self.predictions.remove(event_id);
            }

            _ => {}
        }
    }

    // ---- community-points-channel-v1 ----------------------------------

    async fn on_points_channel(&self, event: &PubSubEvent, streamer: &Arc<Streamer>) {
        if !streamer.settings().community_goals {
            return;
        }
        let Some(goal_data) = event
            .data
            .as_ref()
            .map(|d| &d["community_goal"])
            .filter(|v| v.is_object())
        else {
            return;
        };

        match event.event_type.as_str() {
            "community-goal-created" | "community-goal-updated" => {
                let goal = crate::domain::CommunityGoal::from_pubsub(goal_data);
                streamer.upsert_goal(goal);
                self.contribute_to_goals(streamer).await;
            }
            "community-goal-deleted" => {
                if let Some(goal_id) = goal_data["id"].as_str() {
                    streamer.remove_goal(goal_id);
                }
            }
            _ => {}
        }
    }

    async fn contribute_to_goals(&self, streamer: &Arc<Streamer>) {
        for goal in streamer.goals() {
            if !goal.accepts_contributions() {
                continue;
            }
            let amount = goal.amount_left().min(streamer.points());
            if amount == 0 {
                continue;
            }

            info!(
                streamer = streamer.login(),
                goal = %goal.title,
                amount,
                "contributing to community goal"
            );
            match self
                .api
                .contribute_goal(streamer.channel_id(), &goal.goal_id, amount)
                .await
            {
                Ok(()) => streamer.set_points(streamer.points().saturating_sub(amount)),
                Err(e) => {
                    error!(streamer = streamer.login(), error = %e, "goal contribution failed")
                }
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn tracked_predictions(&self) -> usize {
        self.predictions.len()
    }
}
