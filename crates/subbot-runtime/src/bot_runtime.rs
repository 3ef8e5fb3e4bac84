//! Coordinator: resume cursor, worker pool, stream, heartbeat and shutdown.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use subbot_reddit::{CommentApi, RedditApiClient};
use subbot_sse::{CancellationToken, EventStream};
use subbot_store::{CacheStore, CacheStoreError, DedupStore, ReplyArchive};
use tokio::sync::mpsc;

use crate::{
    spawn_event_workers, start_bot_heartbeat, BotRuntimeConfig, CommentPolicy, EventWorker,
    QueueDepthProbe, RuntimeCounters, RuntimeCountersSnapshot,
};

/// What a finished run observed.
#[derive(Debug, Clone)]
pub struct BotRunSummary {
    pub stream_url: String,
    pub counters: RuntimeCountersSnapshot,
    pub stream_errors: Vec<String>,
}

/// Authenticates one API client per worker, then runs until the stream
/// ends or `cancel` fires.
pub async fn run_substitute_bot(
    config: BotRuntimeConfig,
    store: Arc<dyn CacheStore>,
    cancel: CancellationToken,
) -> Result<BotRunSummary> {
    config.validate()?;

    let api_config = config.api_config();
    let mut apis: Vec<Arc<dyn CommentApi>> = Vec::with_capacity(config.worker_count);
    for index in 0..config.worker_count {
        let client = RedditApiClient::connect(&api_config)
            .await
            .with_context(|| format!("failed to initialize api client for worker {index}"))?;
        apis.push(Arc::new(client));
    }

    run_with_comment_apis(config, store, apis, cancel).await
}

/// Runs the bot with caller-provided API clients, one per worker.
pub async fn run_with_comment_apis(
    config: BotRuntimeConfig,
    store: Arc<dyn CacheStore>,
    apis: Vec<Arc<dyn CommentApi>>,
    cancel: CancellationToken,
) -> Result<BotRunSummary> {
    config.validate()?;
    if apis.is_empty() {
        anyhow::bail!("at least one api client is required");
    }

    let dedup = DedupStore::new(
        Arc::clone(&store),
        config.high_water_mark_ttl,
        config.processed_ttl,
    );
    let archive = ReplyArchive::new(Arc::clone(&store));

    let high_water_mark = match dedup.high_water_mark().await {
        Ok(mark) => Some(mark),
        Err(CacheStoreError::NotFound(_)) => None,
        Err(error) => {
            tracing::warn!(
                error = %error,
                "failed to read max comment id; starting from live feed"
            );
            None
        }
    };
    let stream_url = config.resume_stream_url(high_water_mark);

    let counters = Arc::new(RuntimeCounters::new());
    let (queue_tx, queue_rx) = mpsc::channel(config.queue_capacity);
    let workers = apis
        .into_iter()
        .enumerate()
        .map(|(index, api)| {
            EventWorker::new(
                index,
                &config.comment_event_tag,
                CommentPolicy::new(api, archive.clone(), config.policy_config()),
                dedup.clone(),
                Arc::clone(&counters),
            )
        })
        .collect::<Vec<_>>();
    let worker_handles = spawn_event_workers(workers, queue_rx);

    let mut heartbeat = start_bot_heartbeat(
        config.heartbeat_interval,
        Arc::clone(&counters),
        QueueDepthProbe::new(&queue_tx),
    )?;

    let http = reqwest::Client::builder()
        .connect_timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
        .build()
        .context("failed to create stream http client")?;

    tracing::info!(url = %stream_url, "using stream url");
    let stream = EventStream::start(&http, &stream_url, queue_tx, cancel.clone()).await;
    let mut stream = match stream {
        Ok(stream) => stream,
        Err(error) => {
            join_workers(worker_handles).await;
            heartbeat.shutdown().await;
            return Err(error).context("stream initialization failed");
        }
    };

    let mut stream_errors = Vec::new();
    tokio::select! {
        _ = cancel.cancelled() => {
            tracing::info!("shutdown requested");
        }
        error = stream.next_error() => {
            if let Some(error) = error {
                tracing::warn!(error = %error, "received error from stream");
                stream_errors.push(error.to_string());
            }
        }
    }

    cancel.cancel();
    for error in stream.finish().await {
        tracing::warn!(error = %error, "received error from stream");
        stream_errors.push(error.to_string());
    }
    join_workers(worker_handles).await;
    heartbeat.shutdown().await;

    let counters = counters.snapshot();
    tracing::info!(
        processed = counters.events_received,
        replies = counters.replies_posted,
        "bot stopped"
    );
    Ok(BotRunSummary {
        stream_url,
        counters,
        stream_errors,
    })
}

async fn join_workers(handles: Vec<tokio::task::JoinHandle<()>>) {
    for handle in handles {
        if let Err(error) = handle.await {
            tracing::warn!(error = %error, "worker task did not exit cleanly");
        }
    }
}
