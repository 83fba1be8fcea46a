//! Supervisor: wires every component together and owns the shutdown path.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use twitch_gql::{random_hex, TwitchClient};

use crate::analytics::{AnalyticsSink, NoopSink, SqliteAnalytics};
use crate::api::{ApiHandle, TwitchApi};
use crate::auth::TwitchAuth;
use crate::config::Config;
use crate::domain::Streamer;
use crate::drops::DropsTracker;
use crate::error::{Error, Result};
use crate::pubsub::{Dispatcher, DispatcherMsg, PubSubPool, Topic, TopicKind};
use crate::streamer as status;
use crate::watcher::MinuteWatcher;

/// Run the miner until SIGINT or a fatal auth error.
pub async fn run(config: Config) -> Result<()> {
    info!("initializing twitch channel points miner");

    let device_id = random_hex(16);
    let mut auth = TwitchAuth::new(&config.username, &device_id);
    auth.login().await?;

    let client = Arc::new(TwitchClient::new(auth.token(), &device_id));
    client.update_client_version().await;

    let user_id = match client.get_channel_id(auth.username()).await {
        Ok(id) => id,
        Err(e) => {
            if e.is_fatal_auth() {
                auth.invalidate();
            }
            return Err(Error::auth(format!("failed to resolve own user id: {e}")));
        }
    };
    auth.set_user_id(&user_id);
    if let Err(e) = auth.save() {
        warn!(error = %e, "failed to save auth");
    }
    info!(username = %auth.username(), user_id = %user_id, "authentication successful");

    let streamers = load_streamers(&client, &config).await?;

    let analytics: Arc<dyn AnalyticsSink> = if config.enable_analytics {
        Arc::new(SqliteAnalytics::open(&config.analytics.db_dir, &config.username).await?)
    } else {
        Arc::new(NoopSink)
    };

    let cancel = CancellationToken::new();
    let (msg_tx, msg_rx) = mpsc::channel::<DispatcherMsg>(1024);
    let (fatal_tx, mut fatal_rx) = mpsc::channel::<Error>(4);

    let pool = PubSubPool::new(
        auth.token(),
        &config.rate_limits,
        msg_tx.clone(),
        fatal_tx.clone(),
        cancel.child_token(),
    );
    subscribe_topics(&pool, &user_id, &streamers).await?;

    let api = Arc::new(ApiHandle::new(client.clone(), &user_id));

    let dispatcher = Dispatcher::new(
        api.clone(),
        analytics.clone(),
        &streamers,
        msg_tx.clone(),
        cancel.child_token(),
    )
    .with_status_callback(Arc::new(|login, online| {
        if online {
            info!(streamer = login, "broadcaster went live");
        } else {
            info!(streamer = login, "broadcaster stopped streaming");
        }
    }));
    let dispatcher_handle = tokio::spawn(dispatcher.run(msg_rx));

    // Initial online sweep before the periodic pollers take over.
    for streamer in &streamers {
        api.check_streamer_online(streamer).await;
    }

    let watcher = MinuteWatcher::new(
        api.clone(),
        streamers.clone(),
        config.priority.clone(),
        config.rate_limits.clone(),
        cancel.child_token(),
    );
    let watcher_handle = tokio::spawn(watcher.run());

    let drops = DropsTracker::new(
        api.clone() as Arc<dyn TwitchApi>,
        streamers.clone(),
        config.rate_limits.campaign_sync_interval,
        cancel.child_token(),
    );
    let drops_handle = tokio::spawn(drops.run());

    let poll_handle = tokio::spawn(status_poll_loop(
        api.clone(),
        streamers.clone(),
        Duration::from_secs(config.rate_limits.stream_check_interval),
        cancel.child_token(),
    ));

    info!(streamers = streamers.len(), "mining started");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
        }
        Some(e) = fatal_rx.recv() => {
            error!(error = %e, "fatal error, shutting down");
            if e.is_fatal_auth() {
                auth.invalidate();
            }
        }
    }

    cancel.cancel();
    pool.close();
    for handle in [watcher_handle, drops_handle, poll_handle, dispatcher_handle] {
        let _ = handle.await;
    }

    print_session_report(&streamers);
    Ok(())
}

/// Resolve and seed every configured broadcaster. Unknown logins are
/// skipped; an empty result aborts startup.
async fn load_streamers(client: &Arc<TwitchClient>, config: &Config) -> Result<Vec<Arc<Streamer>>> {
    info!(count = config.streamers.len(), "loading streamers");

    let mut streamers = Vec::with_capacity(config.streamers.len());
    for entry in &config.streamers {
        let settings = entry
            .settings
            .clone()
            .unwrap_or_else(|| config.streamer_settings.clone());
        let login = entry.username.to_lowercase();

        let channel_id = match client.get_channel_id(&login).await {
            Ok(id) => id,
            Err(e) if e.is_fatal_auth() => return Err(e.into()),
            Err(e) => {
                warn!(streamer = %login, error = %e, "streamer not found, skipping");
                continue;
            }
        };

        let streamer = Arc::new(Streamer::new(login, channel_id, settings));
        if let Err(e) = status::load_points_context(client, &streamer).await {
            warn!(streamer = streamer.login(), error = %e, "failed to load channel points");
        }

        info!(
            streamer = streamer.login(),
            channel_id = streamer.channel_id(),
            points = streamer.points(),
            "loaded streamer"
        );
        streamers.push(streamer);

        tokio::time::sleep(Duration::from_secs_f64(config.rate_limits.request_delay)).await;
    }

    if streamers.is_empty() {
        return Err(Error::NoStreamers);
    }
    Ok(streamers)
}

/// Subscribe the user topics plus each broadcaster's topics, gated on its
/// settings.
async fn subscribe_topics(
    pool: &PubSubPool,
    user_id: &str,
    streamers: &[Arc<Streamer>],
) -> Result<()> {
    info!("subscribing to pubsub topics");

    pool.subscribe(Topic::new(TopicKind::CommunityPointsUser, user_id))
        .await?;
    pool.subscribe(Topic::new(TopicKind::PredictionsUser, user_id))
        .await?;

    for streamer in streamers {
        let settings = streamer.settings();
        let channel_id = streamer.channel_id();

        pool.subscribe(Topic::new(TopicKind::VideoPlaybackById, channel_id))
            .await?;
        if settings.follow_raid {
            pool.subscribe(Topic::new(TopicKind::Raid, channel_id)).await?;
        }
        if settings.make_predictions {
            pool.subscribe(Topic::new(TopicKind::PredictionsChannel, channel_id))
                .await?;
        }
        if settings.claim_moments {
            pool.subscribe(Topic::new(TopicKind::CommunityMomentsChannel, channel_id))
                .await?;
        }
        if settings.community_goals {
            pool.subscribe(Topic::new(TopicKind::CommunityPointsChannel, channel_id))
                .await?;
        }
    }

    Ok(())
}

async fn status_poll_loop(
    api: Arc<ApiHandle>,
    streamers: Vec<Arc<Streamer>>,
    interval: Duration,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }
        for streamer in &streamers {
            if cancel.is_cancelled() {
                return;
            }
            api.check_streamer_online(streamer).await;
        }
    }
}

/// Final per-streamer summary, printed on every shutdown path.
fn print_session_report(streamers: &[Arc<Streamer>]) {
    info!("=== session report ===");
    for streamer in streamers {
        info!(
            streamer = streamer.login(),
            points = streamer.points(),
            "streamer stats"
        );
        for (reason, entry) in streamer.history_snapshot() {
            if entry.counter != 0 || entry.amount != 0 {
                info!(
                    streamer = streamer.login(),
                    reason = %reason,
                    count = entry.counter,
                    amount = entry.amount,
                    "history"
                );
            }
        }
    }
}
