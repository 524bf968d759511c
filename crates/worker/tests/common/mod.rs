//! Shared fixtures for worker integration tests.
//!
//! A [`Harness`] wires a [`Worker`] to in-memory collaborators, a static
//! page fetcher and a local webhook receiver subscribed to every event of
//! [`SESSION`].

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::io::{Cursor, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use serde_json::{json, Value};
use specforge_core::error::CoreError;
use specforge_core::events::EventKind;
use specforge_core::job::{Job, JobPayload};
use specforge_core::memory::{MemorySchemaStore, MemorySubscriptionStore};
use specforge_core::openapi::document_title;
use specforge_core::store::{CodeGenerator, WebhookSubscription};
use specforge_core::types::JobId;
use specforge_crawler::testing::StaticFetcher;
use specforge_events::WebhookNotifier;
use specforge_queue::{JobQueue, MemoryJobQueue, NewJob};
use specforge_worker::{JobContext, Worker, WorkerConfig};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

pub const SESSION: &str = "session-1";

// ---------------------------------------------------------------------------
// Webhook receiver
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Hook {
    pub event: String,
    pub body: Value,
}

pub type Inbox = Arc<Mutex<Vec<Hook>>>;

async fn capture(State(inbox): State<Inbox>, headers: HeaderMap, body: Bytes) -> StatusCode {
    let event = headers
        .get("x-webhook-event")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let body = serde_json::from_slice(&body).unwrap_or(Value::Null);
    inbox.lock().unwrap().push(Hook { event, body });
    StatusCode::OK
}

async fn start_receiver() -> (String, Inbox) {
    let inbox: Inbox = Arc::default();
    let app = Router::new()
        .route("/hook", post(capture))
        .with_state(inbox.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/hook"), inbox)
}

// ---------------------------------------------------------------------------
// Code generator
// ---------------------------------------------------------------------------

/// Returns a zip with `index.ts` and `README.md`. Fails for documents
/// carrying `"x-fail": true`.
#[derive(Default)]
pub struct FakeGenerator {
    pub languages: Mutex<Vec<String>>,
}

#[async_trait]
impl CodeGenerator for FakeGenerator {
    async fn generate(&self, spec: &Value, language: &str, _options: &Value) -> Result<Vec<u8>, CoreError> {
        self.languages.lock().unwrap().push(language.to_string());
        if spec.get("x-fail").and_then(Value::as_bool) == Some(true) {
            return Err(CoreError::Generation("generator exploded".into()));
        }
        let title = document_title(spec).unwrap_or("untitled");
        let index = format!("// {title} ({language})");
        Ok(zip_of(&[("index.ts", index.as_str()), ("README.md", "generated")]))
    }
}

pub fn zip_of(files: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in files {
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(body.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub worker: Worker,
    pub queue: Arc<MemoryJobQueue>,
    pub schemas: Arc<MemorySchemaStore>,
    pub generator: Arc<FakeGenerator>,
    pub fetcher: Arc<StaticFetcher>,
    pub inbox: Inbox,
    pub download_dir: TempDir,
}

pub fn test_config(download_dir: &TempDir) -> WorkerConfig {
    WorkerConfig {
        concurrency: 2,
        poll_interval: Duration::from_millis(10),
        cancel_check_interval: Duration::from_millis(20),
        download_dir: download_dir.path().to_path_buf(),
        ..WorkerConfig::default()
    }
}

pub async fn harness(fetcher: StaticFetcher) -> Harness {
    harness_with(fetcher, |_| {}).await
}

/// Like [`harness`], with `configure` applied to the worker configuration.
pub async fn harness_with(
    fetcher: StaticFetcher,
    configure: impl FnOnce(&mut WorkerConfig),
) -> Harness {
    let (hook_url, inbox) = start_receiver().await;
    let subscriptions = Arc::new(MemorySubscriptionStore::new());
    subscriptions.add(WebhookSubscription {
        id: uuid::Uuid::new_v4(),
        session_id: SESSION.into(),
        url: hook_url,
        secret: Some("test-secret".into()),
        active: true,
        events: EventKind::ALL.into_iter().collect::<BTreeSet<_>>(),
    });

    let download_dir = TempDir::new().unwrap();
    let mut config = test_config(&download_dir);
    configure(&mut config);
    let queue = Arc::new(MemoryJobQueue::new().with_lease(config.job_lease));
    let schemas = Arc::new(MemorySchemaStore::new());
    let generator = Arc::new(FakeGenerator::default());
    let fetcher = Arc::new(fetcher);

    let ctx = JobContext {
        queue: queue.clone(),
        schemas: schemas.clone(),
        generator: generator.clone(),
        notifier: Arc::new(WebhookNotifier::new(subscriptions)),
        fetchers: Arc::new(fetcher.clone()),
        config,
    };

    Harness {
        worker: Worker::new(ctx),
        queue,
        schemas,
        generator,
        fetcher,
        inbox,
        download_dir,
    }
}

impl Harness {
    pub async fn enqueue(&self, payload: JobPayload) -> JobId {
        self.queue
            .enqueue(NewJob::new(payload, SESSION).user_id("user-1"))
            .await
            .unwrap()
    }

    /// Dequeue and run exactly one job.
    pub async fn run_one(&self) -> JobId {
        self.worker
            .process_next()
            .await
            .unwrap()
            .expect("a job should be waiting")
    }

    pub async fn job(&self, id: JobId) -> Job {
        self.queue.get_by_id(id).await.unwrap().expect("job should exist")
    }

    pub fn hooks(&self) -> Vec<Hook> {
        self.inbox.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<String> {
        self.hooks().into_iter().map(|h| h.event).collect()
    }
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

pub fn openapi(title: &str) -> Value {
    json!({
        "openapi": "3.0.0",
        "info": {"title": title, "version": "1.0.0"},
        "paths": {}
    })
}

pub const PETS_YAML: &str = "openapi: 3.0.0\ninfo:\n  title: Pets\n  version: '1.0.0'\npaths: {}\n";
