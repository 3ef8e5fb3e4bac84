//! Worker pool draining the shared event queue.

use std::sync::Arc;

use subbot_reddit::Comment;
use subbot_sse::SseEvent;
use subbot_store::DedupStore;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::{CommentPolicy, RuntimeCounters};

type SharedEventQueue = Arc<Mutex<mpsc::Receiver<SseEvent>>>;

/// One queue consumer with its own API client and store handles.
#[derive(Clone)]
pub struct EventWorker {
    index: usize,
    comment_event_tag: Arc<str>,
    policy: Arc<CommentPolicy>,
    dedup: DedupStore,
    counters: Arc<RuntimeCounters>,
}

impl EventWorker {
    pub fn new(
        index: usize,
        comment_event_tag: &str,
        policy: CommentPolicy,
        dedup: DedupStore,
        counters: Arc<RuntimeCounters>,
    ) -> Self {
        Self {
            index,
            comment_event_tag: Arc::from(comment_event_tag),
            policy: Arc::new(policy),
            dedup,
            counters,
        }
    }

    /// Consumes events until the queue is closed and drained.
    ///
    /// Each event runs in its own task; a panic while handling one is
    /// logged and counted and the worker moves on.
    async fn run(self, queue: SharedEventQueue) {
        tracing::info!(worker = self.index, "worker started");
        loop {
            let next = {
                let mut queue = queue.lock().await;
                queue.recv().await
            };
            let Some(event) = next else {
                break;
            };

            if event.event_type != *self.comment_event_tag {
                self.counters.record_event_ignored();
                continue;
            }
            self.counters.record_event_received();

            let event_id = event.id.clone();
            let worker = self.clone();
            let task = tokio::spawn(async move { worker.handle_event(event).await });
            if let Err(error) = task.await {
                self.counters.record_worker_panic();
                tracing::error!(
                    worker = self.index,
                    event_id = %event_id,
                    error = %error,
                    "event handler did not complete"
                );
            }
        }
        tracing::info!(worker = self.index, "worker stopped");
    }

    async fn handle_event(&self, event: SseEvent) {
        self.record_dedup(&event.id).await;
        if !event.id.is_empty() {
            match self.dedup.mark_processed(&event.id).await {
                Ok(true) => {}
                Ok(false) => {
                    self.counters.record_duplicate_event();
                    tracing::debug!(
                        worker = self.index,
                        event_id = %event.id,
                        "skipping processed event"
                    );
                    return;
                }
                Err(error) => {
                    tracing::warn!(
                        worker = self.index,
                        event_id = %event.id,
                        error = %error,
                        "failed to mark event processed"
                    );
                }
            }
        }

        let comment = match Comment::from_feed_payload(&event.payload) {
            Ok(comment) => comment,
            Err(error) => {
                self.counters.record_decode_failure();
                tracing::warn!(
                    worker = self.index,
                    event_id = %event.id,
                    error = %error,
                    "failed to decode comment payload"
                );
                return;
            }
        };

        let outcome = self.policy.process_comment(&comment).await;
        tracing::debug!(
            worker = self.index,
            comment = %comment.name,
            outcome = ?outcome,
            "comment processed"
        );
        self.counters.record_outcome(&outcome);
    }

    async fn record_dedup(&self, event_id: &str) {
        let id = match event_id.parse::<i64>() {
            Ok(id) => id,
            Err(_) => {
                tracing::debug!(
                    worker = self.index,
                    event_id = event_id,
                    "event id is not numeric"
                );
                return;
            }
        };
        if let Err(error) = self.dedup.record_high_water_mark(id).await {
            tracing::warn!(
                worker = self.index,
                event_id = event_id,
                error = %error,
                "failed to store max comment event id"
            );
        }
    }
}

/// Spawns one task per worker, all sharing `queue`.
pub fn spawn_event_workers(
    workers: Vec<EventWorker>,
    queue: mpsc::Receiver<SseEvent>,
) -> Vec<JoinHandle<()>> {
    let queue: SharedEventQueue = Arc::new(Mutex::new(queue));
    workers
        .into_iter()
        .map(|worker| tokio::spawn(worker.run(Arc::clone(&queue))))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use subbot_sse::SseEvent;
    use subbot_store::{DedupStore, InMemoryCacheStore, ReplyArchive};
    use tokio::sync::mpsc;

    use super::{spawn_event_workers, EventWorker};
    use crate::comment_policy::tests::{comment, policy_config, ScriptedCommentApi};
    use crate::{CommentPolicy, RuntimeCounters};

    fn comment_event(id: &str, name: &str, body: &str, parent: &str) -> SseEvent {
        let payload = comment_payload(name, body, parent);
        SseEvent {
            event_type: "rc".to_string(),
            id: id.to_string(),
            payload: payload.into_bytes(),
        }
    }

    fn comment_payload(name: &str, body: &str, parent: &str) -> String {
        format!(
            r#"{{"author":"alice","author_fullname":"t2_alice","body":"{body}","body_html":"","created_utc":1546300800,"id":"{id}","name":"{name}","parent_id":"{parent}","permalink":"/r/test/{id}"}}"#,
            id = name.trim_start_matches("t1_"),
        )
    }

    struct Harness {
        api: Arc<ScriptedCommentApi>,
        dedup: DedupStore,
        archive: ReplyArchive,
        counters: Arc<RuntimeCounters>,
    }

    fn harness(api: ScriptedCommentApi) -> Harness {
        let store = Arc::new(InMemoryCacheStore::new());
        Harness {
            api: Arc::new(api),
            dedup: DedupStore::new(
                store.clone(),
                Duration::from_secs(900),
                Duration::from_secs(300),
            ),
            archive: ReplyArchive::new(store),
            counters: Arc::new(RuntimeCounters::new()),
        }
    }

    async fn run_events(harness: &Harness, worker_count: usize, events: Vec<SseEvent>) {
        let (tx, rx) = mpsc::channel(16);
        let workers = (0..worker_count)
            .map(|index| {
                EventWorker::new(
                    index,
                    "rc",
                    CommentPolicy::new(
                        harness.api.clone(),
                        harness.archive.clone(),
                        policy_config(),
                    ),
                    harness.dedup.clone(),
                    Arc::clone(&harness.counters),
                )
            })
            .collect();
        let handles = spawn_event_workers(workers, rx);
        for event in events {
            tx.send(event).await.expect("queue open");
        }
        drop(tx);
        for handle in handles {
            handle.await.expect("worker join");
        }
    }

    fn parents() -> ScriptedCommentApi {
        ScriptedCommentApi::with_parents(vec![comment(
            "t1_parent",
            "bob",
            "I have a cat",
            "t3_post",
        )])
    }

    #[tokio::test]
    async fn functional_workers_reply_record_mark_and_ignore_other_tags() {
        let harness = harness(parents());
        let mut other = comment_event("100", "t1_x", "s/cat/dog/", "t1_parent");
        other.event_type = "keepalive".to_string();

        run_events(
            &harness,
            2,
            vec![
                comment_event("41", "t1_r1", "s/cat/dog/", "t1_parent"),
                other,
                comment_event("40", "t1_r2", "hello", "t1_parent"),
            ],
        )
        .await;

        let snapshot = harness.counters.snapshot();
        assert_eq!(snapshot.events_received, 2);
        assert_eq!(snapshot.events_ignored, 1);
        assert_eq!(snapshot.replies_posted, 1);
        assert_eq!(snapshot.comments_skipped, 1);
        assert_eq!(harness.dedup.high_water_mark().await.expect("mark"), 41);
        assert!(harness.dedup.is_processed("41").await.expect("marker"));
        assert!(!harness.dedup.is_processed("100").await.expect("marker"));
        assert_eq!(harness.archive.fetch(10).await.expect("fetch").len(), 1);
    }

    #[tokio::test]
    async fn functional_redelivered_event_is_processed_once() {
        let harness = harness(parents());
        run_events(
            &harness,
            1,
            vec![
                comment_event("7", "t1_r1", "s/cat/dog/", "t1_parent"),
                comment_event("7", "t1_r1", "s/cat/dog/", "t1_parent"),
            ],
        )
        .await;

        assert_eq!(harness.api.posts.lock().await.len(), 1);
        assert_eq!(harness.counters.snapshot().duplicate_events, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn regression_redelivery_across_workers_posts_once() {
        let harness = harness(parents());
        let events = (0..8)
            .map(|_| comment_event("9", "t1_r1", "s/cat/dog/", "t1_parent"))
            .collect();
        run_events(&harness, 4, events).await;

        assert_eq!(harness.api.posts.lock().await.len(), 1);
        let snapshot = harness.counters.snapshot();
        assert_eq!(snapshot.duplicate_events, 7);
        assert_eq!(snapshot.replies_posted, 1);
    }

    #[tokio::test]
    async fn regression_undecodable_payload_is_counted_and_skipped() {
        let harness = harness(parents());
        let broken = SseEvent {
            event_type: "rc".to_string(),
            id: "5".to_string(),
            payload: b"{not json".to_vec(),
        };
        run_events(
            &harness,
            1,
            vec![
                broken,
                comment_event("6", "t1_r1", "s/cat/dog/", "t1_parent"),
            ],
        )
        .await;

        let snapshot = harness.counters.snapshot();
        assert_eq!(snapshot.decode_failures, 1);
        assert_eq!(snapshot.replies_posted, 1);
        assert_eq!(harness.dedup.high_water_mark().await.expect("mark"), 6);
    }

    #[tokio::test]
    async fn regression_panicking_event_does_not_stop_worker() {
        let api = ScriptedCommentApi {
            panic_on_parent: Some("t1_boom".to_string()),
            ..parents()
        };
        let harness = harness(api);
        run_events(
            &harness,
            1,
            vec![
                comment_event("1", "t1_r1", "s/cat/dog/", "t1_boom"),
                comment_event("2", "t1_r2", "s/cat/dog/", "t1_parent"),
            ],
        )
        .await;

        let snapshot = harness.counters.snapshot();
        assert_eq!(snapshot.worker_panics, 1);
        assert_eq!(snapshot.replies_posted, 1);
        assert_eq!(harness.api.posts.lock().await.len(), 1);
    }
}
