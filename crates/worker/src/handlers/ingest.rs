//! Upload and paste ingestion.

use std::io::ErrorKind;
use std::path::Path;

use serde_json::{json, Value};
use specforge_core::job::{Job, PastePayload, UploadPayload};
use specforge_core::openapi::{document_title, parse_openapi_document, UNPARSEABLE};
use specforge_core::store::{NewSchema, SchemaKind};

use crate::context::JobContext;
use crate::error::JobError;

/// Format hint used when parsing pasted text.
const PASTE_NAME: &str = "paste.json";

pub async fn upload(
    ctx: &JobContext,
    job: &Job,
    payload: &UploadPayload,
) -> Result<Option<Value>, JobError> {
    ctx.report_progress(job, 10).await;

    let content = match tokio::fs::read_to_string(&payload.file_path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Err(JobError::FileNotFound),
        Err(e) if e.kind() == ErrorKind::InvalidData => {
            remove_upload(&payload.file_path).await;
            return Err(JobError::Validation(UNPARSEABLE.into()));
        }
        Err(e) => return Err(e.into()),
    };
    ctx.report_progress(job, 30).await;

    let doc = match parse_openapi_document(&content, format_hint(payload)) {
        Ok(doc) => doc,
        Err(e) => {
            remove_upload(&payload.file_path).await;
            return Err(e.into());
        }
    };
    ctx.report_progress(job, 60).await;

    let result = store(ctx, job, SchemaKind::Upload, &doc).await?;
    remove_upload(&payload.file_path).await;
    Ok(Some(result))
}

pub async fn paste(
    ctx: &JobContext,
    job: &Job,
    payload: &PastePayload,
) -> Result<Option<Value>, JobError> {
    if payload.content.trim().is_empty() {
        return Err(JobError::Validation("No content provided for paste".into()));
    }
    ctx.report_progress(job, 30).await;

    let doc = parse_openapi_document(&payload.content, PASTE_NAME)?;
    ctx.report_progress(job, 60).await;

    store(ctx, job, SchemaKind::Paste, &doc).await.map(Some)
}

/// Persist `doc` and announce it with `schema.created`.
async fn store(
    ctx: &JobContext,
    job: &Job,
    kind: SchemaKind,
    doc: &Value,
) -> Result<Value, JobError> {
    let schema_id = ctx
        .schemas
        .persist(NewSchema {
            session_id: job.session_id.clone(),
            user_id: job.user_id.clone(),
            kind,
            content: doc.to_string(),
            url: None,
        })
        .await?;
    let title = document_title(doc);
    tracing::info!(job_id = %job.id, schema_id = %schema_id, kind = %kind, title, "Schema stored");

    ctx.notifier
        .on_schema_created(&job.session_id, schema_id, title)
        .await;
    Ok(json!({"schemaId": schema_id, "title": title}))
}

/// The uploaded file's own name carries the extension when the stored
/// path does not.
fn format_hint(payload: &UploadPayload) -> &str {
    if Path::new(&payload.original_name).extension().is_some() {
        &payload.original_name
    } else {
        &payload.file_path
    }
}

async fn remove_upload(path: &str) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != ErrorKind::NotFound {
            tracing::warn!(path, error = %e, "Failed to remove uploaded file");
        }
    }
}
