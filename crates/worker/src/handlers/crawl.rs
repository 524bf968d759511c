//! Crawl jobs: discover spec documents from a seed URL, then store them.
//!
//! Progress runs 10 → 90 across the crawl itself and 90 → 100 while the
//! discovered documents are fetched and stored. A cancelled crawl saves a
//! checkpoint on the job; the next attempt resumes from it.

use serde_json::{json, Value};
use specforge_core::job::{CrawlPayload, Job};
use specforge_core::openapi::{is_openapi_document, parse_document};
use specforge_core::store::{NewSchema, SchemaKind};
use specforge_core::types::SchemaId;
use specforge_crawler::{CrawlError, CrawlOptions, CrawlProgress, CrawlerEngine, PageFetcher};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::context::{report_progress, JobContext};
use crate::error::JobError;

const CRAWL_START: u8 = 10;
const CRAWL_SPAN: usize = 80;
const CRAWL_DONE: u8 = 90;
const STORE_SPAN: usize = 10;

/// Map crawl progress onto the 10..=90 band.
pub fn crawl_percent(processed: usize, total: usize) -> u8 {
    let done = processed.min(total);
    let span = done * CRAWL_SPAN / total.max(1);
    CRAWL_START + span as u8
}

/// Map storing progress onto the 90..=100 band.
pub fn store_percent(stored: usize, total: usize) -> u8 {
    let done = stored.min(total);
    let span = done * STORE_SPAN / total.max(1);
    CRAWL_DONE + span as u8
}

pub async fn crawl(
    ctx: &JobContext,
    job: &Job,
    payload: &CrawlPayload,
    cancel: &CancellationToken,
) -> Result<Option<Value>, JobError> {
    ctx.report_progress(job, CRAWL_START).await;

    let options = CrawlOptions::from(&payload.options);
    let fetcher = ctx.fetchers.build(&options)?;
    let depth = payload.depth.min(ctx.config.max_crawl_depth);
    let mut engine =
        CrawlerEngine::new(fetcher.clone(), cancel.clone()).with_rate_limit(options.rate_limit);

    // Engine callbacks are synchronous. Forward the latest percentage to the
    // queue from a separate task so a slow write never stalls the crawl.
    let (tx, mut rx) = watch::channel(CRAWL_START);
    let forwarder = {
        let queue = ctx.queue.clone();
        let claim = job.claim();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let progress = *rx.borrow_and_update();
                report_progress(queue.as_ref(), claim, progress).await;
            }
        })
    };
    let on_progress = move |p: &CrawlProgress| {
        tx.send_if_modified(|current| {
            let next = crawl_percent(p.processed, p.total);
            let changed = next > *current;
            if changed {
                *current = next;
            }
            changed
        });
    };

    let outcome = match job.checkpoint.clone() {
        Some(checkpoint) => {
            tracing::info!(job_id = %job.id, "Resuming crawl from checkpoint");
            engine
                .resume_from_checkpoint(checkpoint, depth, &on_progress)
                .await
        }
        None => engine.crawl(&payload.url, depth, &on_progress).await,
    };
    drop(on_progress);
    let _ = forwarder.await;

    let spec_urls = match outcome {
        Ok(urls) => urls,
        Err(CrawlError::Cancelled) => {
            let checkpoint = engine.checkpoint();
            match ctx.queue.save_checkpoint(job.claim(), &checkpoint).await {
                Ok(()) => tracing::info!(
                    job_id = %job.id,
                    visited = checkpoint.visited.len(),
                    pending = checkpoint.pending.len(),
                    "Crawl checkpoint saved",
                ),
                Err(e) => tracing::error!(job_id = %job.id, error = %e, "Failed to save crawl checkpoint"),
            }
            return Err(JobError::Cancelled);
        }
        Err(e @ CrawlError::InvalidSeed { .. }) => return Err(JobError::Validation(e.to_string())),
    };

    ctx.report_progress(job, CRAWL_DONE).await;
    tracing::info!(job_id = %job.id, found = spec_urls.len(), "Crawl finished, storing documents");

    let mut schema_ids = Vec::new();
    for (index, url) in spec_urls.iter().enumerate() {
        match store_document(ctx, job, fetcher.as_ref(), url).await {
            Ok(Some(id)) => schema_ids.push(id),
            Ok(None) => tracing::debug!(job_id = %job.id, url = %url, "Discovered URL is not a spec document"),
            Err(e) => tracing::warn!(job_id = %job.id, url = %url, error = %e, "Failed to store discovered document"),
        }
        ctx.report_progress(job, store_percent(index + 1, spec_urls.len())).await;
    }

    Ok(Some(json!({
        "discovered": spec_urls.len(),
        "persisted": schema_ids.len(),
        "schemaIds": schema_ids,
    })))
}

/// Fetch `url` again and store it when it is a spec document.
async fn store_document(
    ctx: &JobContext,
    job: &Job,
    fetcher: &dyn PageFetcher,
    url: &str,
) -> Result<Option<SchemaId>, JobError> {
    let parsed = Url::parse(url).map_err(|e| JobError::Validation(format!("Invalid URL {url}: {e}")))?;
    let page = fetcher.fetch(&parsed).await?;
    let doc = match parse_document(&page.body, page.url.path()) {
        Ok(doc) if is_openapi_document(&doc) => doc,
        _ => return Ok(None),
    };

    let id = ctx
        .schemas
        .persist(NewSchema {
            session_id: job.session_id.clone(),
            user_id: job.user_id.clone(),
            kind: SchemaKind::Crawl,
            content: doc.to_string(),
            url: Some(url.to_string()),
        })
        .await?;
    Ok(Some(id))
}
