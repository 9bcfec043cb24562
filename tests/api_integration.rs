//! Integration tests for the admin REST API.
//!
//! Each test spins up an Axum server on a random port backed by an
//! in-memory store and stub collaborators, then drives it with reqwest.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;

use site_digest::api;
use site_digest::channels::DeliverySink;
use site_digest::config::EngineConfig;
use site_digest::engine::SchedulerService;
use site_digest::error::{ChannelError, FetchError, LlmError};
use site_digest::fetch::ContentFetcher;
use site_digest::llm::{Inference, Summarizer};
use site_digest::store::LibSqlTaskStore;

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct StubFetcher {
    calls: AtomicUsize,
}

#[async_trait]
impl ContentFetcher for StubFetcher {
    async fn fetch(
        &self,
        _url: &str,
        _include: &[String],
        _exclude: &[String],
    ) -> Result<String, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok("hello".to_string())
    }
}

struct StubSummarizer;

#[async_trait]
impl Summarizer for StubSummarizer {
    fn name(&self) -> &str {
        "stub"
    }

    async fn infer(
        &self,
        _prompt: &str,
        _content: &str,
        _structured: bool,
    ) -> Result<Inference, LlmError> {
        Ok(Inference::Text("world".to_string()))
    }
}

#[derive(Default)]
struct RecordingSink {
    sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl DeliverySink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, destination: &str, text: &str) -> Result<(), ChannelError> {
        self.sent
            .lock()
            .unwrap()
            .push((destination.to_string(), text.to_string()));
        Ok(())
    }
}

struct TestServer {
    base: String,
    fetcher: Arc<StubFetcher>,
    sink: Arc<RecordingSink>,
    service: Arc<SchedulerService>,
}

/// Start an Axum server on a random port.
async fn start_server() -> TestServer {
    let store = Arc::new(LibSqlTaskStore::new_memory().await.unwrap());
    let fetcher = Arc::new(StubFetcher::default());
    let sink = Arc::new(RecordingSink::default());
    let service = Arc::new(SchedulerService::new(
        store,
        fetcher.clone(),
        Arc::new(StubSummarizer),
        sink.clone(),
        EngineConfig::default(),
    ));
    service.start().await.unwrap();

    let app = api::routes(Arc::clone(&service));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestServer {
        base: format!("http://127.0.0.1:{port}"),
        fetcher,
        sink,
        service,
    }
}

fn task_body(name: &str, schedule: &str) -> Value {
    json!({
        "name": name,
        "url": "https://example.com/news",
        "tag_selectors": "article, !.ads",
        "schedule": schedule,
        "prompt": "Summarize: {content}",
        "destination": "12345"
    })
}

#[tokio::test]
async fn health_check() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;
        let resp = reqwest::get(format!("{}/health", server.base)).await.unwrap();
        assert_eq!(resp.status(), 200);
        let json: Value = resp.json().await.unwrap();
        assert_eq!(json["status"], "ok");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn task_crud_round() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{}/api/tasks", server.base))
            .json(&task_body("News", "0 9 * * *"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 201);
        let created: Value = resp.json().await.unwrap();
        let id = created["id"].as_i64().unwrap();
        assert_eq!(created["alert_if_true"], "no");

        let listed: Value = reqwest::get(format!("{}/api/tasks", server.base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(listed.as_array().unwrap().len(), 1);

        let resp = client
            .put(format!("{}/api/tasks/{id}", server.base))
            .json(&task_body("News (edited)", "*/15 * * * *"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let fetched: Value = reqwest::get(format!("{}/api/tasks/{id}", server.base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(fetched["name"], "News (edited)");

        let resp = client
            .delete(format!("{}/api/tasks/{id}", server.base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 204);
        let resp = reqwest::get(format!("{}/api/tasks/{id}", server.base))
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn invalid_task_returns_field_errors() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{}/api/tasks", server.base))
            .json(&json!({
                "name": "Broken",
                "url": "ftp://example.com",
                "tag_selectors": "body",
                "schedule": "every day",
                "prompt": "no placeholder",
                "destination": "1"
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 422);
        let json: Value = resp.json().await.unwrap();
        let fields: Vec<&str> = json["fields"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["field"].as_str().unwrap())
            .collect();
        assert!(fields.contains(&"url"));
        assert!(fields.contains(&"schedule"));
        assert!(fields.contains(&"prompt"));
        assert!(server.service.list_tasks().await.unwrap().is_empty());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn key_value_task_definition() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{}/api/destinations/777/tasks", server.base))
            .body(
                "name=Morning digest\n\
                 url=https://example.com\n\
                 tags=main\n\
                 raw_schedule=daily 07:30\n\
                 prompt=Summarize: {content}\n",
            )
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 201);
        let created: Value = resp.json().await.unwrap();
        assert_eq!(created["destination"], "777");
        assert_eq!(created["schedule"], "30 7 * * *");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn manual_run_delivers_result() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;
        let client = reqwest::Client::new();

        let created: Value = client
            .post(format!("{}/api/tasks", server.base))
            .json(&task_body("News", "0 9 * * *"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let id = created["id"].as_i64().unwrap();

        let resp = client
            .post(format!("{}/api/tasks/{id}/run", server.base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let json: Value = resp.json().await.unwrap();
        assert_eq!(json["result"], "Task \"News\" result:\nworld");

        let sent = server.sink.sent.lock().unwrap().clone();
        assert_eq!(
            sent,
            vec![("12345".to_string(), "Task \"News\" result:\nworld".to_string())]
        );
        assert_eq!(server.fetcher.calls.load(Ordering::SeqCst), 1);

        let resp = client
            .post(format!("{}/api/tasks/999/run", server.base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn status_reports_armed_schedules() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;
        let client = reqwest::Client::new();

        for name in ["a", "b"] {
            client
                .post(format!("{}/api/tasks", server.base))
                .json(&task_body(name, "0 9 * * *"))
                .send()
                .await
                .unwrap();
        }

        let status: Value = reqwest::get(format!("{}/api/status", server.base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status["running"], 0);
        assert_eq!(status["max_running"], 3);
        let schedules = status["schedules"].as_array().unwrap();
        assert_eq!(schedules.len(), 1);
        assert_eq!(schedules[0]["expression"], "0 9 * * *");
        assert_eq!(schedules[0]["tasks"][1][1], 300);
    })
    .await
    .expect("test timed out");
}
