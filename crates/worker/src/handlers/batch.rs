//! Batch code generation into one downloadable archive.
//!
//! Items are processed in order. A failing item never fails the batch: it
//! is recorded as an error marker in the archive and counted in the result.

use serde_json::{json, Value};
use specforge_core::error::CoreError;
use specforge_core::job::{BatchGeneratePayload, Job};
use specforge_core::openapi::{document_title, parse_document};
use specforge_core::types::SchemaId;

use crate::archive::{read_entries, ArchiveEntry, BatchArchive};
use crate::context::JobContext;
use crate::error::JobError;

/// Generated output for one schema.
struct Generated {
    title: Option<String>,
    entries: Vec<ArchiveEntry>,
}

pub async fn generate(
    ctx: &JobContext,
    job: &Job,
    payload: &BatchGeneratePayload,
) -> Result<Option<Value>, JobError> {
    if payload.schema_ids.is_empty() {
        return Err(JobError::Validation("schemaIds array is required".into()));
    }

    let language = payload
        .language
        .as_deref()
        .filter(|l| !l.is_empty())
        .unwrap_or(&ctx.config.default_language);
    let options = payload.options.clone().unwrap_or_else(|| json!({}));
    let total = payload.schema_ids.len();

    let mut archive = BatchArchive::new();
    let mut generated = 0usize;
    let mut failed = 0usize;

    for (index, &schema_id) in payload.schema_ids.iter().enumerate() {
        let outcome = match generate_one(ctx, schema_id, language, &options).await {
            Ok(item) => {
                let folder = archive.claim_folder(item.title.as_deref(), schema_id);
                archive.add_entries(&folder, &item.entries).map_err(JobError::from)
            }
            Err(e) => Err(e),
        };
        match outcome {
            Ok(()) => generated += 1,
            Err(e) => {
                tracing::warn!(job_id = %job.id, schema_id = %schema_id, error = %e, "Batch item failed");
                if let Err(marker) = archive.add_error(schema_id, &e.to_string()) {
                    tracing::warn!(
                        job_id = %job.id,
                        schema_id = %schema_id,
                        error = %marker,
                        "Could not write error marker",
                    );
                }
                failed += 1;
            }
        }
        let progress = ((index + 1) * 100 / total) as u8;
        ctx.report_progress(job, progress).await;
    }

    let bytes = archive.finish()?;
    let file_name = format!(
        "batch-{}-{}.zip",
        chrono::Utc::now().timestamp_millis(),
        uuid::Uuid::new_v4()
    );
    tokio::fs::create_dir_all(&ctx.config.download_dir).await?;
    tokio::fs::write(ctx.config.download_dir.join(&file_name), bytes).await?;
    tracing::info!(job_id = %job.id, file_name = %file_name, generated, failed, "Batch archive written");

    Ok(Some(json!({
        "fileName": file_name,
        "downloadUrl": format!("/api/downloads/{file_name}"),
        "generated": generated,
        "failed": failed,
    })))
}

/// Load, parse and generate one schema. Any error here fails only this item.
async fn generate_one(
    ctx: &JobContext,
    schema_id: SchemaId,
    language: &str,
    options: &Value,
) -> Result<Generated, JobError> {
    let schema = ctx
        .schemas
        .find(schema_id)
        .await?
        .ok_or_else(|| CoreError::NotFound {
            entity: "Schema",
            id: schema_id.to_string(),
        })?;
    let spec = parse_document(&schema.content, "schema.json")?;
    let title = document_title(&spec).map(str::to_string);

    let bytes = ctx.generator.generate(&spec, language, options).await?;
    let entries = read_entries(&bytes)?;
    if entries.is_empty() {
        return Err(CoreError::Generation("generator returned an empty archive".into()).into());
    }
    Ok(Generated { title, entries })
}
