//! Websocket pool with topic bin-packing.
//!
//! Topics are packed onto sessions first-fit-on-last: a new topic goes to
//! the most recent session while it has room, otherwise a new session is
//! opened. Sessions are never split and topics never move between them;
//! the 50-topic bound is Twitch's documented per-connection limit.

use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::RateLimits;
use crate::error::{Error, Result};

use super::dispatcher::DispatcherMsg;
use super::session::{spawn_session, SessionConfig, SessionHandle};
use super::topic::Topic;

/// Twitch's per-connection topic limit; never exceeded.
pub const MAX_TOPICS_PER_CONNECTION: usize = 50;

/// Where a new topic landed.
#[derive(Debug, PartialEq, Eq)]
pub enum Placement {
    /// Already subscribed somewhere; nothing to send.
    Duplicate,
    /// Appended to an existing session.
    Existing(usize),
    /// A new session must be opened at this index.
    NewSession(usize),
}

/// Pure bookkeeping of which topic lives on which session.
///
/// Split out from the pool so the packing rules are testable without any
/// transport.
#[derive(Debug, Default)]
pub struct TopicLedger {
    sessions: Vec<Vec<Topic>>,
}

impl TopicLedger {
    pub fn place(&mut self, topic: Topic) -> Placement {
        if self.sessions.iter().any(|s| s.contains(&topic)) {
            return Placement::Duplicate;
        }

        match self.sessions.last_mut() {
            Some(last) if last.len() < MAX_TOPICS_PER_CONNECTION => {
                last.push(topic);
                Placement::Existing(self.sessions.len() - 1)
            }
            _ => {
                self.sessions.push(vec![topic]);
                Placement::NewSession(self.sessions.len() - 1)
            }
        }
    }

    /// Remove a topic; returns the session index it was removed from.
    pub fn remove(&mut self, topic: &Topic) -> Option<usize> {
        for (idx, session) in self.sessions.iter_mut().enumerate() {
            if let Some(pos) = session.iter().position(|t| t == topic) {
                session.remove(pos);
                return Some(idx);
            }
        }
        None
    }

    pub fn total_topics(&self) -> usize {
        self.sessions.iter().map(Vec::len).sum()
    }

    pub fn session_sizes(&self) -> Vec<usize> {
        self.sessions.iter().map(Vec::len).collect()
    }
}

struct PoolInner {
    ledger: TopicLedger,
    sessions: Vec<SessionHandle>,
}

/// The connection pool (C3).
///
/// `subscribe` is fire-and-forget: once it returns, the topic is durably
/// recorded and will be re-LISTENed across every reconnect for the life of
/// the pool.
pub struct PubSubPool {
    auth_token: String,
    ping_interval_secs: u64,
    reconnect_delay: Duration,
    events_tx: mpsc::Sender<DispatcherMsg>,
    fatal_tx: mpsc::Sender<Error>,
    cancel: CancellationToken,
    inner: Mutex<PoolInner>,
}

impl PubSubPool {
    pub fn new(
        auth_token: impl Into<String>,
        limits: &RateLimits,
        events_tx: mpsc::Sender<DispatcherMsg>,
        fatal_tx: mpsc::Sender<Error>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            auth_token: auth_token.into(),
            ping_interval_secs: limits.websocket_ping_interval,
            reconnect_delay: Duration::from_secs(limits.reconnect_delay),
            events_tx,
            fatal_tx,
            cancel,
            inner: Mutex::new(PoolInner {
                ledger: TopicLedger::default(),
                sessions: Vec::new(),
            }),
        }
    }

    /// Subscribe a topic, opening a new session when the last one is full.
    pub async fn subscribe(&self, topic: Topic) -> Result<()> {
        let mut inner = self.inner.lock().await;

        match inner.ledger.place(topic.clone()) {
            Placement::Duplicate => Ok(()),
            Placement::Existing(idx) => {
                inner.sessions[idx].listen(topic).await;
                Ok(())
            }
            Placement::NewSession(idx) => {
                info!(session = idx, "opening pubsub session");
                let handle = spawn_session(
                    SessionConfig {
                        index: idx,
                        auth_token: self.auth_token.clone(),
                        ping_interval_secs: self.ping_interval_secs,
                        reconnect_delay: self.reconnect_delay,
                    },
                    self.events_tx.clone(),
                    self.fatal_tx.clone(),
                    self.cancel.child_token(),
                );
                handle.listen(topic).await;
                inner.sessions.push(handle);
                Ok(())
            }
        }
    }

    /// Drop a topic from whichever session carries it.
    pub async fn unsubscribe(&self, topic: &Topic) {
        let mut inner = self.inner.lock().await;
        if let Some(idx) = inner.ledger.remove(topic) {
            inner.sessions[idx].unlisten(topic.clone()).await;
        }
    }

    pub async fn topic_count(&self) -> usize {
        self.inner.lock().await.ledger.total_topics()
    }

    pub async fn session_sizes(&self) -> Vec<usize> {
        self.inner.lock().await.ledger.session_sizes()
    }

    /// Signal every session to stop and return. Idempotent.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pubsub::topic::TopicKind;

    fn topic(n: usize) -> Topic {
        Topic::new(TopicKind::VideoPlaybackById, n.to_string())
    }

    #[test]
    fn fifty_one_topics_pack_into_two_sessions() {
        let mut ledger = TopicLedger::default();
        for n in 0..51 {
            let placement = ledger.place(topic(n));
            assert_ne!(placement, Placement::Duplicate);
        }
        assert_eq!(ledger.session_sizes(), vec![50, 1]);
        assert_eq!(ledger.total_topics(), 51);
    }

    #[test]
    fn sessions_never_exceed_the_topic_limit() {
        let mut ledger = TopicLedger::default();
        for n in 0..137 {
            ledger.place(topic(n));
        }
        for size in ledger.session_sizes() {
            assert!(size <= MAX_TOPICS_PER_CONNECTION);
        }
        assert_eq!(ledger.session_sizes(), vec![50, 50, 37]);
    }

    #[test]
    fn first_topic_opens_a_session() {
        let mut ledger = TopicLedger::default();
        assert_eq!(ledger.place(topic(0)), Placement::NewSession(0));
        assert_eq!(ledger.place(topic(1)), Placement::Existing(0));
    }

    #[test]
    fn duplicate_subscription_is_suppressed() {
        let mut ledger = TopicLedger::default();
        assert_eq!(ledger.place(topic(7)), Placement::NewSession(0));
        assert_eq!(ledger.place(topic(7)), Placement::Duplicate);
        assert_eq!(ledger.total_topics(), 1);
    }

    #[test]
    fn duplicates_are_detected_across_sessions() {
        let mut ledger = TopicLedger::default();
        for n in 0..50 {
            ledger.place(topic(n));
        }
        ledger.place(topic(50));
        // Topic 3 lives in the first (now full) session.
        assert_eq!(ledger.place(topic(3)), Placement::Duplicate);
    }

    #[test]
    fn total_tracks_subscribes_minus_unsubscribes() {
        let mut ledger = TopicLedger::default();
        for n in 0..10 {
            ledger.place(topic(n));
        }
        assert_eq!(ledger.total_topics(), 10);

        assert_eq!(ledger.remove(&topic(3)), Some(0));
        assert_eq!(ledger.remove(&topic(3)), None, "second remove is a no-op");
        assert_eq!(ledger.total_topics(), 9);
    }
}
