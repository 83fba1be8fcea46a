//! One persistent PubSub websocket session.
//!
//! Each session is a single spawned task that owns the socket and drives
//! everything through one `select!` loop: inbound frames, the jittered
//! heartbeat, listen/unlisten commands from the pool, and shutdown. On any
//! read failure, a requested RECONNECT, or a missed-PONG watchdog trip the
//! task tears the transport down, waits out the reconnect delay, dials
//! again and replays its topic list.

use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use rand::Rng;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use twitch_gql::{random_hex, PUBSUB_URL};

use crate::error::Error;

use super::dispatcher::DispatcherMsg;
use super::message::{parse_event, WsFrame};
use super::topic::Topic;

/// A session reconnects when no PONG arrived for this long.
const PONG_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// How often the PONG watchdog looks at the clock.
const PONG_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Websocket handshake timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Adjacent duplicate deliveries within this window are collapsed.
const DEDUP_WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub(crate) enum SessionCommand {
    Listen(Topic),
    Unlisten(Topic),
}

/// Collapses immediately adjacent duplicate deliveries.
///
/// Twitch occasionally double-delivers the same event across redundant
/// edges within a second; only the first copy passes.
#[derive(Debug, Default)]
struct DedupWindow {
    last: Option<(String, Instant)>,
}

impl DedupWindow {
    fn admit(&mut self, key: String) -> bool {
        if let Some((last_key, at)) = &self.last {
            if *last_key == key && at.elapsed() < DEDUP_WINDOW {
                return false;
            }
        }
        self.last = Some((key, Instant::now()));
        true
    }
}

/// Pool-side handle to a running session task.
#[derive(Clone)]
pub(crate) struct SessionHandle {
    cmd_tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    pub(crate) async fn listen(&self, topic: Topic) {
        let _ = self.cmd_tx.send(SessionCommand::Listen(topic)).await;
    }

    pub(crate) async fn unlisten(&self, topic: Topic) {
        let _ = self.cmd_tx.send(SessionCommand::Unlisten(topic)).await;
    }
}

pub(crate) struct SessionConfig {
    pub index: usize,
    pub auth_token: String,
    pub ping_interval_secs: u64,
    pub reconnect_delay: Duration,
}

/// Spawn the session task and return its handle.
pub(crate) fn spawn_session(
    cfg: SessionConfig,
    events_tx: mpsc::Sender<DispatcherMsg>,
    fatal_tx: mpsc::Sender<Error>,
    cancel: CancellationToken,
) -> SessionHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    tokio::spawn(run_session(cfg, cmd_rx, events_tx, fatal_tx, cancel));
    SessionHandle { cmd_tx }
}

async fn run_session(
    cfg: SessionConfig,
    mut cmd_rx: mpsc::Receiver<SessionCommand>,
    events_tx: mpsc::Sender<DispatcherMsg>,
    fatal_tx: mpsc::Sender<Error>,
    cancel: CancellationToken,
) {
    let mut topics: Vec<Topic> = Vec::new();
    let mut first_attempt = true;

    loop {
        if cancel.is_cancelled() {
            return;
        }

        if !first_attempt {
            info!(
                session = cfg.index,
                delay_secs = cfg.reconnect_delay.as_secs(),
                "reconnecting websocket after delay"
            );
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(cfg.reconnect_delay) => {}
            }
        }
        first_attempt = false;

        let connect = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(PUBSUB_URL));
        let mut ws = match connect.await {
            Ok(Ok((ws, _resp))) => ws,
            Ok(Err(e)) => {
                error!(session = cfg.index, error = %e, "websocket connect failed");
                continue;
            }
            Err(_) => {
                error!(session = cfg.index, "websocket handshake timed out");
                continue;
            }
        };
        info!(session = cfg.index, "websocket connected");

        // Replay every durably recorded topic on the fresh transport.
        for topic in &topics {
            if let Err(e) = send_frame(
                &mut ws,
                &WsFrame::listen("LISTEN", topic, random_hex(15), &cfg.auth_token),
            )
            .await
            {
                error!(session = cfg.index, error = %e, "topic replay failed");
            }
        }

        let mut last_pong = Instant::now();
        let mut dedup = DedupWindow::default();
        let mut ping_at = tokio::time::Instant::now() + jittered_ping(cfg.ping_interval_secs);
        let mut watchdog = tokio::time::interval(PONG_CHECK_INTERVAL);
        watchdog.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = ws.close(None).await;
                    return;
                }

                _ = tokio::time::sleep_until(ping_at) => {
                    if let Err(e) = send_frame(&mut ws, &WsFrame::ping()).await {
                        error!(session = cfg.index, error = %e, "ping failed");
                        break;
                    }
                    ping_at = tokio::time::Instant::now() + jittered_ping(cfg.ping_interval_secs);
                }

                _ = watchdog.tick() => {
                    if last_pong.elapsed() > PONG_TIMEOUT {
                        warn!(session = cfg.index, "no PONG for 5 minutes, reconnecting");
                        break;
                    }
                }

                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(SessionCommand::Listen(topic)) => {
                            if !topics.contains(&topic) {
                                topics.push(topic.clone());
                            }
                            let frame = WsFrame::listen(
                                "LISTEN", &topic, random_hex(15), &cfg.auth_token,
                            );
                            if let Err(e) = send_frame(&mut ws, &frame).await {
                                error!(session = cfg.index, error = %e, "listen failed");
                                break;
                            }
                            debug!(session = cfg.index, topic = %topic, "listening");
                        }
                        Some(SessionCommand::Unlisten(topic)) => {
                            topics.retain(|t| t != &topic);
                            let frame = WsFrame::listen(
                                "UNLISTEN", &topic, random_hex(15), &cfg.auth_token,
                            );
                            if let Err(e) = send_frame(&mut ws, &frame).await {
                                error!(session = cfg.index, error = %e, "unlisten failed");
                                break;
                            }
                        }
                        None => {
                            // Pool dropped: shut the session down.
                            let _ = ws.close(None).await;
                            return;
                        }
                    }
                }

                frame = ws.next() => {
                    match frame {
                        Some(Ok(Message::Text(txt))) => {
                            let parsed: WsFrame = match serde_json::from_str(txt.as_str()) {
                                Ok(f) => f,
                                Err(e) => {
                                    error!(session = cfg.index, error = %e, "unparseable frame");
                                    continue;
                                }
                            };
                            match parsed.kind.as_str() {
                                "PONG" => last_pong = Instant::now(),
                                "MESSAGE" => {
                                    let Some(data) = parsed.data.as_ref() else { continue };
                                    let event = match parse_event(data) {
                                        Ok(e) => e,
                                        Err(e) => {
                                            error!(session = cfg.index, error = %e, "bad pubsub message");
                                            continue;
                                        }
                                    };

                                    if !dedup.admit(event.dedup_key()) {
                                        continue;
                                    }

                                    if events_tx.send(DispatcherMsg::Event(event)).await.is_err() {
                                        // Dispatcher is gone; nothing left to do.
                                        let _ = ws.close(None).await;
                                        return;
                                    }
                                }
                                "RESPONSE" => {
                                    if let Some(err) = parsed.error.filter(|e| !e.is_empty()) {
                                        error!(session = cfg.index, error = %err, "listen rejected");
                                        if err == "ERR_BADAUTH" {
                                            let _ = fatal_tx
                                                .send(Error::auth("pubsub rejected credentials (ERR_BADAUTH)"))
                                                .await;
                                            break;
                                        }
                                    }
                                }
                                "RECONNECT" => {
                                    info!(session = cfg.index, "server requested reconnect");
                                    break;
                                }
                                other => {
                                    debug!(session = cfg.index, kind = other, "ignored frame");
                                }
                            }
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            let _ = ws.send(Message::Pong(payload)).await;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            warn!(session = cfg.index, "websocket closed by peer");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            error!(session = cfg.index, error = %e, "websocket read error");
                            break;
                        }
                    }
                }
            }
        }

        // Fell out of the read loop: tear down and go around for a reconnect.
        let _ = ws.close(None).await;
    }
}

async fn send_frame<S>(ws: &mut S, frame: &WsFrame) -> Result<(), Error>
where
    S: SinkExt<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let json = serde_json::to_string(frame)?;
    ws.send(Message::Text(json.into()))
        .await
        .map_err(|e| Error::pubsub(format!("websocket send failed: {e}")))
}

fn jittered_ping(base_secs: u64) -> Duration {
    let jitter: f64 = rand::rng().random_range(-2.5..=2.5);
    Duration::from_secs_f64((base_secs as f64 + jitter).max(1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_jitter_stays_within_band() {
        for _ in 0..200 {
            let d = jittered_ping(27);
            assert!(d >= Duration::from_secs_f64(24.5));
            assert!(d <= Duration::from_secs_f64(29.5));
        }
    }

    #[test]
    fn ping_jitter_never_goes_below_one_second() {
        let d = jittered_ping(1);
        assert!(d >= Duration::from_secs(1));
    }

    #[test]
    fn adjacent_duplicates_are_collapsed() {
        let mut dedup = DedupWindow::default();
        assert!(dedup.admit("points-earned.community-points-user-v1.1.1".into()));
        assert!(!dedup.admit("points-earned.community-points-user-v1.1.1".into()));
    }

    #[test]
    fn different_keys_pass_through() {
        let mut dedup = DedupWindow::default();
        assert!(dedup.admit("a".into()));
        assert!(dedup.admit("b".into()));
        // Only *immediately adjacent* repeats collapse; a different event
        // in between resets the window.
        assert!(dedup.admit("a".into()));
    }
}
