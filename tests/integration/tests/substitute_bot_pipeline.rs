use std::sync::Arc;
use std::time::Duration;

use httpmock::prelude::*;
use serde_json::{json, Value};
use subbot_reddit::Credentials;
use subbot_runtime::{run_substitute_bot, BotRuntimeConfig};
use subbot_sse::CancellationToken;
use subbot_store::{CacheStore, DedupStore, ReplyArchive, SqliteCacheStore};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

fn comment_json(name: &str, author: &str, body: &str, parent: &str) -> Value {
    json!({
        "author": author,
        "author_fullname": format!("t2_{author}"),
        "body": body,
        "body_html": "",
        "created_utc": 1_546_300_800.0,
        "id": name.trim_start_matches("t1_"),
        "name": name,
        "parent_id": parent,
        "permalink": format!("/r/test/comments/{}", name.trim_start_matches("t1_")),
    })
}

fn frame(id: u64, name: &str, body: &str, parent: &str) -> String {
    format!(
        "id: {id}\nevent: rc\ndata: {}\n\n",
        comment_json(name, "alice", body, parent)
    )
}

fn bot_config(server: &MockServer, stream_url: String) -> BotRuntimeConfig {
    BotRuntimeConfig {
        credentials: Credentials {
            username: "sub-bot".to_string(),
            password: "pw".to_string(),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            user_agent: "substitute-bot-integration".to_string(),
        },
        stream_url,
        api_base: server.base_url(),
        auth_base: server.base_url(),
        worker_count: 2,
        queue_capacity: 16,
        ..BotRuntimeConfig::default()
    }
}

struct ApiMocks<'a> {
    token: httpmock::Mock<'a>,
    info: httpmock::Mock<'a>,
    comment: httpmock::Mock<'a>,
}

fn mock_api(server: &MockServer) -> ApiMocks<'_> {
    let token = server.mock(|when, then| {
        when.method(POST)
            .path("/api/v1/access_token")
            .body_includes("grant_type=password");
        then.status(200)
            .json_body(json!({"access_token": "granted", "token_type": "bearer"}));
    });
    let info = server.mock(|when, then| {
        when.method(GET)
            .path("/api/info")
            .query_param("id", "t1_parent")
            .header("authorization", "Bearer granted");
        then.status(200).json_body(json!({
            "data": {"children": [
                {"kind": "t1", "data": comment_json("t1_parent", "bob", "I have a cat", "t3_post")}
            ]}
        }));
    });
    let comment = server.mock(|when, then| {
        when.method(POST)
            .path("/api/comment")
            .header("authorization", "Bearer granted")
            .body_includes("thing_id=t1_request")
            .body_includes("text=I+have+a+**dog**%0A%0A%5E%5EThis+%5E%5Ewas+%5E%5Eposted");
        then.status(200).json_body(json!({
            "json": {"errors": [], "data": {"things": [
                {"kind": "t1", "data": comment_json("t1_reply", "sub-bot", "I have a **dog**", "t1_request")}
            ]}}
        }));
    });
    ApiMocks {
        token,
        info,
        comment,
    }
}

fn dedup(store: &Arc<dyn CacheStore>) -> DedupStore {
    DedupStore::new(
        Arc::clone(store),
        Duration::from_secs(900),
        Duration::from_secs(300),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn integration_feed_to_reply_pipeline_posts_archives_and_resumes() {
    let temp = tempfile::tempdir().expect("create tempdir");
    let store: Arc<dyn CacheStore> =
        Arc::new(SqliteCacheStore::new(temp.path().join("bot.sqlite")).expect("store"));

    let server = MockServer::start();
    let api = mock_api(&server);
    let body = format!(
        "{}{}{}",
        frame(500, "t1_request", "s/cat/dog/", "t1_parent"),
        frame(501, "t1_chatter", "nice cat", "t1_parent"),
        "id: 502\nevent: keepalive\ndata: {}\n\n",
    );
    let first_stream = server.mock(|when, then| {
        when.method(GET).path("/stream").query_param("type", "comments");
        then.status(200)
            .header("content-type", "text/event-stream")
            .body(body);
    });

    let summary = run_substitute_bot(
        bot_config(&server, server.url("/stream?type=comments")),
        Arc::clone(&store),
        CancellationToken::new(),
    )
    .await
    .expect("first run");

    first_stream.assert_calls(1);
    api.token.assert_calls(2);
    api.info.assert_calls(1);
    api.comment.assert_calls(1);
    assert_eq!(summary.counters.events_received, 2);
    assert_eq!(summary.counters.events_ignored, 1);
    assert_eq!(summary.counters.replies_posted, 1);
    assert!(!summary.stream_url.contains("comment_start_id"));

    let archived = ReplyArchive::new(Arc::clone(&store))
        .fetch(10)
        .await
        .expect("fetch archive");
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].name, "t1_reply");
    assert_eq!(archived[0].requester, "alice");
    assert_eq!(archived[0].author_fullname, "t2_sub-bot");
    assert!(archived[0].body.starts_with("I have a **dog**"));
    assert_eq!(dedup(&store).high_water_mark().await.expect("mark"), 501);

    let resumed_server = MockServer::start();
    let resumed_api = mock_api(&resumed_server);
    let resumed_stream = resumed_server.mock(|when, then| {
        when.method(GET)
            .path("/stream")
            .query_param("comment_start_id", "502");
        then.status(200).body("");
    });
    let resumed = run_substitute_bot(
        bot_config(&resumed_server, resumed_server.url("/stream?type=comments")),
        Arc::clone(&store),
        CancellationToken::new(),
    )
    .await
    .expect("resumed run");
    resumed_stream.assert_calls(1);
    resumed_api.comment.assert_calls(0);
    assert!(resumed.stream_url.ends_with("&comment_start_id=502"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn integration_cancellation_stops_open_stream_and_drains_workers() {
    let temp = tempfile::tempdir().expect("create tempdir");
    let store: Arc<dyn CacheStore> =
        Arc::new(SqliteCacheStore::new(temp.path().join("bot.sqlite")).expect("store"));

    let server = MockServer::start();
    let api = mock_api(&server);

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let feed_addr = listener.local_addr().expect("addr");
    let (release_tx, release_rx) = oneshot::channel::<()>();
    let feed = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let mut request = [0_u8; 2048];
        let _ = socket.read(&mut request).await;
        let head = "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\nconnection: close\r\n\r\n";
        let frame = frame(900, "t1_request", "s/cat/dog/", "t1_parent");
        socket
            .write_all(format!("{head}{frame}").as_bytes())
            .await
            .expect("write");
        socket.flush().await.expect("flush");
        let _ = release_rx.await;
    });

    let cancel = CancellationToken::new();
    let run = tokio::spawn(run_substitute_bot(
        bot_config(&server, format!("http://{feed_addr}/stream")),
        Arc::clone(&store),
        cancel.clone(),
    ));

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while api.comment.calls() == 0 {
        assert!(
            tokio::time::Instant::now() < deadline,
            "reply was not posted in time"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    cancel.cancel();
    let summary = tokio::time::timeout(Duration::from_secs(10), run)
        .await
        .expect("run should stop after cancel")
        .expect("join")
        .expect("run result");
    assert_eq!(summary.counters.replies_posted, 1);
    assert_eq!(summary.stream_errors.len(), 1);
    assert!(summary.stream_errors[0].contains("cancelled"));

    let _ = release_tx.send(());
    let _ = feed.await;
}
