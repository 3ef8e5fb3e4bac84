use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use subbot_sse::SseEvent;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::RuntimeCounters;

/// Reports how many events are waiting in the queue without keeping it open.
#[derive(Debug, Clone)]
pub struct QueueDepthProbe {
    sender: mpsc::WeakSender<SseEvent>,
}

impl QueueDepthProbe {
    pub fn new(sender: &mpsc::Sender<SseEvent>) -> Self {
        Self {
            sender: sender.downgrade(),
        }
    }

    /// Returns the buffered event count, or 0 once the producer is gone.
    pub fn depth(&self) -> usize {
        self.sender
            .upgrade()
            .map(|sender| sender.max_capacity().saturating_sub(sender.capacity()))
            .unwrap_or(0)
    }
}

pub struct BotHeartbeatHandle {
    ticks: Arc<AtomicU64>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl BotHeartbeatHandle {
    pub fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    pub async fn shutdown(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

/// Logs processed totals and queue depth every `interval` until shut down.
pub fn start_bot_heartbeat(
    interval: Duration,
    counters: Arc<RuntimeCounters>,
    queue: QueueDepthProbe,
) -> Result<BotHeartbeatHandle> {
    if interval.is_zero() {
        bail!("heartbeat interval must be greater than zero");
    }

    let ticks = Arc::new(AtomicU64::new(0));
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(run_heartbeat_loop(
        interval,
        counters,
        queue,
        Arc::clone(&ticks),
        shutdown_rx,
    ));
    Ok(BotHeartbeatHandle {
        ticks,
        shutdown_tx: Some(shutdown_tx),
        task: Some(task),
    })
}

async fn run_heartbeat_loop(
    interval: Duration,
    counters: Arc<RuntimeCounters>,
    queue: QueueDepthProbe,
    ticks: Arc<AtomicU64>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let start = tokio::time::Instant::now() + interval;
    let mut interval = tokio::time::interval_at(start, interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                ticks.fetch_add(1, Ordering::Relaxed);
                tracing::info!(
                    processed = counters.events_received(),
                    queue_length = queue.depth(),
                    "heartbeat"
                );
            }
            _ = &mut shutdown_rx => {
                tracing::debug!(ticks = ticks.load(Ordering::Relaxed), "heartbeat stopped");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use subbot_sse::SseEvent;
    use tokio::sync::mpsc;

    use super::{start_bot_heartbeat, QueueDepthProbe};
    use crate::RuntimeCounters;

    #[tokio::test]
    async fn unit_queue_depth_tracks_buffered_events_and_closed_queue() {
        let (tx, mut rx) = mpsc::channel::<SseEvent>(4);
        let probe = QueueDepthProbe::new(&tx);
        assert_eq!(probe.depth(), 0);

        tx.send(SseEvent::default()).await.expect("send");
        tx.send(SseEvent::default()).await.expect("send");
        assert_eq!(probe.depth(), 2);

        rx.recv().await.expect("recv");
        assert_eq!(probe.depth(), 1);

        drop(tx);
        assert_eq!(probe.depth(), 0);
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn functional_heartbeat_ticks_each_interval_until_shutdown() {
        let (tx, _rx) = mpsc::channel::<SseEvent>(4);
        let mut heartbeat = start_bot_heartbeat(
            Duration::from_secs(60),
            Arc::new(RuntimeCounters::new()),
            QueueDepthProbe::new(&tx),
        )
        .expect("start heartbeat");
        assert!(heartbeat.is_running());

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(heartbeat.tick_count(), 0);
        tokio::time::sleep(Duration::from_secs(122)).await;
        assert_eq!(heartbeat.tick_count(), 3);

        heartbeat.shutdown().await;
        assert!(!heartbeat.is_running());
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(heartbeat.tick_count(), 3);
    }

    #[tokio::test]
    async fn regression_zero_interval_is_rejected() {
        let (tx, _rx) = mpsc::channel::<SseEvent>(1);
        let result = start_bot_heartbeat(
            Duration::ZERO,
            Arc::new(RuntimeCounters::new()),
            QueueDepthProbe::new(&tx),
        );
        assert!(result.is_err());
    }
}
