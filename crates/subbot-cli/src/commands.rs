use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use subbot_runtime::run_substitute_bot;
use subbot_sse::CancellationToken;
use subbot_store::{CacheStore, InMemoryCacheStore, ReplyArchive, SqliteCacheStore};

use crate::cli_args::{Cli, CliCommand};

pub(crate) async fn run_cli(cli: Cli) -> Result<()> {
    let store = open_store(cli.store_path.as_deref())?;
    match cli.command() {
        CliCommand::Run => run_bot(&cli, store).await,
        CliCommand::Replies { count } => {
            let mut out = Vec::new();
            write_replies(store, count, &mut out).await?;
            std::io::stdout()
                .write_all(&out)
                .context("failed to write replies to stdout")
        }
    }
}

fn open_store(path: Option<&Path>) -> Result<Arc<dyn CacheStore>> {
    match path {
        Some(path) => {
            let store = SqliteCacheStore::new(path)
                .with_context(|| format!("failed to open store at {}", path.display()))?;
            Ok(Arc::new(store))
        }
        None => {
            tracing::info!("no store path configured; using in-memory store");
            Ok(Arc::new(InMemoryCacheStore::new()))
        }
    }
}

async fn run_bot(cli: &Cli, store: Arc<dyn CacheStore>) -> Result<()> {
    let config = cli.runtime_config();
    config.validate().context("invalid bot configuration")?;

    let cancel = CancellationToken::new();
    let signals = tokio::spawn(cancel_on_shutdown_signal(cancel.clone()));
    let result = run_substitute_bot(config, store, cancel).await;
    signals.abort();

    let summary = result?;
    tracing::info!(
        url = %summary.stream_url,
        processed = summary.counters.events_received,
        replies = summary.counters.replies_posted,
        stream_errors = summary.stream_errors.len(),
        "run finished"
    );
    Ok(())
}

async fn cancel_on_shutdown_signal(cancel: CancellationToken) {
    wait_for_shutdown_signal().await;
    tracing::info!("received shutdown signal");
    cancel.cancel();
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(error) => {
            tracing::warn!(error = %error, "failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(stream) => stream,
        Err(error) => {
            tracing::warn!(error = %error, "failed to install SIGHUP handler");
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
        _ = hangup.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

async fn write_replies(
    store: Arc<dyn CacheStore>,
    count: usize,
    out: &mut impl Write,
) -> Result<()> {
    let replies = ReplyArchive::new(store)
        .fetch(count)
        .await
        .context("failed to read reply archive")?;
    for reply in replies {
        let mut line = serde_json::to_value(&reply)?;
        line["created_date"] = serde_json::Value::String(reply.created_date());
        writeln!(out, "{}", serde_json::to_string(&line)?)?;
    }
    Ok(())
}
