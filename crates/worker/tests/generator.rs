//! HTTP code generator client against a local stub service.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use common::{openapi, zip_of};
use serde_json::{json, Value};
use specforge_core::error::CoreError;
use specforge_core::store::CodeGenerator;
use specforge_worker::archive::read_entries;
use specforge_worker::generator::HttpCodeGenerator;

type Requests = Arc<Mutex<Vec<Value>>>;

async fn generate(State(requests): State<Requests>, Json(body): Json<Value>) -> (StatusCode, Vec<u8>) {
    let failing = body["language"] == "cobol";
    requests.lock().unwrap().push(body);
    if failing {
        return (StatusCode::UNPROCESSABLE_ENTITY, b"unsupported language".to_vec());
    }
    (StatusCode::OK, zip_of(&[("index.ts", "export {}")]))
}

async fn start_service() -> (String, Requests) {
    let requests: Requests = Arc::default();
    let app = Router::new()
        .route("/generate", post(generate))
        .with_state(requests.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/generate"), requests)
}

#[tokio::test]
async fn posts_spec_and_returns_archive_bytes() {
    let (endpoint, requests) = start_service().await;
    let generator = HttpCodeGenerator::new(&endpoint, Duration::from_secs(5));

    let bytes = generator
        .generate(&openapi("Pets"), "typescript", &json!({"client": true}))
        .await
        .unwrap();

    let entries = read_entries(&bytes).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "index.ts");
    let sent = requests.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["language"], "typescript");
    assert_eq!(sent[0]["spec"]["info"]["title"], "Pets");
    assert_eq!(sent[0]["options"]["client"], true);
}

#[tokio::test]
async fn non_success_status_is_a_generation_error() {
    let (endpoint, _) = start_service().await;
    let generator = HttpCodeGenerator::new(&endpoint, Duration::from_secs(5));

    let err = generator
        .generate(&openapi("Pets"), "cobol", &json!({}))
        .await
        .unwrap_err();

    match err {
        CoreError::Generation(msg) => {
            assert!(msg.contains("422"), "{msg}");
            assert!(msg.contains("unsupported language"), "{msg}");
        }
        other => panic!("expected generation error, got {other:?}"),
    }
}
