//! Batch orchestration: draft → validate → resolve → attach → publish → sync.
//!
//! Each run drives a bounded batch of documents through the pipeline with
//! per-item failure isolation: one item's failure never aborts its
//! siblings. Items share no mutable state except the redirect registry,
//! which is mutated only by the single writer task in [`crate::redirect`].

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Semaphore, mpsc};
use tracing::{info, instrument, warn};

use draftline_media::{ImageClient, attach_media};
use draftline_publisher::{CmsClient, PublishOutcome, publish_document};
use draftline_rules::RuleRegistry;
use draftline_shared::{AppConfig, Document, DraftlineError, Result, Severity, Violation};
use draftline_storage::Storage;
use draftline_taxonomy::{Taxonomy, TaxonomyEntry, resolve_links};

use crate::backlog;
use crate::generation::{GenerationClient, GenerationRequest};
use crate::redirect::{self, PublishedEvent};

/// Run kind recorded for the idempotent batch trigger.
const RUN_KIND_BATCH: &str = "batch";

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Everything a batch run needs. Built once at startup; the taxonomy and
/// rule registry are immutable for the run's duration.
pub struct BatchContext {
    pub config: AppConfig,
    pub registry: RuleRegistry,
    pub taxonomy: Taxonomy,
    pub storage: Arc<Storage>,
    pub cms: CmsClient,
    pub images: Option<ImageClient>,
    pub generator: GenerationClient,
}

// ---------------------------------------------------------------------------
// Per-item and per-run reporting
// ---------------------------------------------------------------------------

/// Terminal state of one batch item. Every item lands in exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Created or updated on the CMS.
    Published,
    /// Content hash unchanged; no remote call. A success, not an error.
    Noop,
    /// Blocking violations survived every regeneration attempt.
    FailedValidation,
    /// Transient failures exhausted their retries.
    FailedTransient,
    /// Item-level configuration problem (e.g. slug absent from taxonomy).
    FailedConfig,
    /// The CMS rejected the item outright (auth or field validation).
    FailedPublish,
}

/// Terminal report for one item.
#[derive(Debug, Clone, Serialize)]
pub struct ItemReport {
    pub slug: String,
    pub status: ItemStatus,
    /// Failure detail or violation messages for manual review.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub detail: Vec<String>,
    /// Non-blocking warnings recorded along the way.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<Violation>,
}

/// Per-run summary: every item's terminal state, no ambiguity.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub period_key: String,
    pub published: usize,
    pub noop: usize,
    pub failed_validation: usize,
    pub failed_transient: usize,
    pub failed_config: usize,
    pub failed_publish: usize,
    pub items: Vec<ItemReport>,
}

impl RunSummary {
    fn from_items(period_key: String, items: Vec<ItemReport>) -> Self {
        let count = |status: ItemStatus| items.iter().filter(|i| i.status == status).count();
        Self {
            period_key,
            published: count(ItemStatus::Published),
            noop: count(ItemStatus::Noop),
            failed_validation: count(ItemStatus::FailedValidation),
            failed_transient: count(ItemStatus::FailedTransient),
            failed_config: count(ItemStatus::FailedConfig),
            failed_publish: count(ItemStatus::FailedPublish),
            items,
        }
    }
}

// ---------------------------------------------------------------------------
// Work items
// ---------------------------------------------------------------------------

/// One unit of work: a staged draft or a topic to generate.
enum WorkItem {
    /// Pre-written draft from the backlog. Trusted, never regenerated.
    Backlog(Document),
    /// Unpublished taxonomy entry to brief the generation service with.
    Topic(TaxonomyEntry),
}

impl WorkItem {
    fn label(&self) -> String {
        match self {
            Self::Backlog(doc) => doc.frontmatter.slug.clone(),
            Self::Topic(entry) => entry.slug.clone(),
        }
    }
}

/// Pick unpublished taxonomy entries, preferring pillars with the fewest
/// published posts, preserving taxonomy order within a pillar.
fn select_topics(
    taxonomy: &Taxonomy,
    published: &HashSet<String>,
    pillar_counts: &std::collections::HashMap<String, i64>,
    exclude: &HashSet<String>,
    n: usize,
) -> Vec<TaxonomyEntry> {
    let mut candidates: Vec<(i64, usize, &TaxonomyEntry)> = taxonomy
        .entries()
        .iter()
        .enumerate()
        .filter(|(_, e)| !published.contains(&e.slug) && !exclude.contains(&e.slug))
        .map(|(i, e)| (pillar_counts.get(&e.pillar).copied().unwrap_or(0), i, e))
        .collect();

    candidates.sort_by_key(|(count, i, _)| (*count, *i));
    candidates.into_iter().take(n).map(|(_, _, e)| e.clone()).collect()
}

// ---------------------------------------------------------------------------
// Batch run
// ---------------------------------------------------------------------------

/// Run one content batch.
///
/// Returns `None` when this period's batch already ran; the trigger is
/// re-entrant-safe. Only configuration-load failures are batch-fatal;
/// everything else is isolated per item.
#[instrument(skip_all)]
pub async fn run_batch(
    ctx: Arc<BatchContext>,
    now: DateTime<Utc>,
) -> Result<Option<RunSummary>> {
    let period_key = now.format("%Y-%m-%d").to_string();

    let Some(run_id) = ctx
        .storage
        .try_begin_run(RUN_KIND_BATCH, &period_key)
        .await?
    else {
        info!(%period_key, "batch already ran this period, skipping");
        return Ok(None);
    };

    // Seed placeholder redirects; retired entries are never resurrected.
    let seed = redirect::load_redirect_seed(Path::new(&ctx.config.site.redirects_path))?;
    ctx.storage.seed_redirects(&seed).await?;

    let published = ctx.storage.published_slugs().await?;
    let pillar_counts = ctx.storage.pillar_counts().await?;

    // Backlog drafts first, then generated topics to fill the batch.
    let batch_size = ctx.config.batch.size as usize;
    let mut items: Vec<WorkItem> = Vec::new();

    if !ctx.config.site.backlog_dir.is_empty() {
        let queue = backlog::ingestion_queue(
            Path::new(&ctx.config.site.backlog_dir),
            &ctx.config.batch.folder_priority,
            &published,
        )?;
        items.extend(
            queue
                .into_iter()
                .take(batch_size)
                .map(|d| WorkItem::Backlog(d.document)),
        );
    }

    if items.len() < batch_size {
        let staged: HashSet<String> = items.iter().map(|i| i.label()).collect();
        let topics = select_topics(
            &ctx.taxonomy,
            &published,
            &pillar_counts,
            &staged,
            batch_size - items.len(),
        );
        items.extend(topics.into_iter().map(WorkItem::Topic));
    }

    info!(
        %period_key,
        items = items.len(),
        concurrency = ctx.config.batch.concurrency,
        "starting batch"
    );

    // Single writer for the redirect registry; workers only send events.
    let (event_tx, writer) = redirect::spawn_redirect_writer(ctx.storage.clone());

    let semaphore = Arc::new(Semaphore::new(ctx.config.batch.concurrency.max(1) as usize));
    let mut handles = Vec::new();

    for item in items {
        let ctx = ctx.clone();
        let tx = event_tx.clone();
        let sem = semaphore.clone();
        let label = item.label();

        handles.push((
            label,
            tokio::spawn(async move {
                let _permit = sem.acquire().await.expect("semaphore closed");
                process_item(&ctx, item, &tx).await
            }),
        ));
    }
    drop(event_tx);

    let mut reports = Vec::new();
    for (label, handle) in handles {
        match handle.await {
            Ok(report) => reports.push(report),
            Err(e) => {
                warn!(slug = %label, error = %e, "item task failed");
                reports.push(ItemReport {
                    slug: label,
                    status: ItemStatus::FailedTransient,
                    detail: vec![format!("task failed: {e}")],
                    warnings: Vec::new(),
                });
            }
        }
    }

    // All events are queued by now; wait for the writer to drain them so
    // the summary reflects the final redirect state.
    writer
        .await
        .map_err(|e| DraftlineError::Storage(format!("redirect writer: {e}")))?;

    let summary = RunSummary::from_items(period_key, reports);
    let summary_json = serde_json::to_string(&summary)
        .map_err(|e| DraftlineError::Storage(format!("summary serialization: {e}")))?;
    ctx.storage.finish_run(&run_id, &summary_json).await?;

    info!(
        published = summary.published,
        noop = summary.noop,
        failed_validation = summary.failed_validation,
        failed_transient = summary.failed_transient,
        failed_config = summary.failed_config,
        failed_publish = summary.failed_publish,
        "batch complete"
    );
    Ok(Some(summary))
}

// ---------------------------------------------------------------------------
// Per-item pipeline
// ---------------------------------------------------------------------------

/// Classify a pipeline error into the item's terminal state.
fn classify(e: &DraftlineError) -> ItemStatus {
    match e {
        DraftlineError::Config { .. } => ItemStatus::FailedConfig,
        DraftlineError::Auth(_) | DraftlineError::FieldRejected(_) => ItemStatus::FailedPublish,
        DraftlineError::Validation { .. } | DraftlineError::LinkResolution { .. } => {
            ItemStatus::FailedValidation
        }
        _ => ItemStatus::FailedTransient,
    }
}

fn failure(slug: String, e: &DraftlineError, warnings: Vec<Violation>) -> ItemReport {
    ItemReport {
        slug,
        status: classify(e),
        detail: vec![e.to_string()],
        warnings,
    }
}

/// Drive one item through validate → resolve → attach → publish.
#[instrument(skip_all, fields(slug = %item.label()))]
async fn process_item(
    ctx: &BatchContext,
    item: WorkItem,
    events: &mpsc::Sender<PublishedEvent>,
) -> ItemReport {
    let label = item.label();

    // Obtain the initial draft. Backlog drafts are trusted as-is; topics
    // go to the generation service and may be regenerated on failure.
    let (mut doc, regenerable, request) = match item {
        WorkItem::Backlog(doc) => (doc, false, None),
        WorkItem::Topic(entry) => {
            let request = briefing_for(&entry);
            match ctx.generator.generate(&request).await {
                Ok(doc) => (doc, true, Some(request)),
                Err(e) => return failure(label, &e, Vec::new()),
            }
        }
    };

    let max_attempts = if regenerable {
        ctx.config.generation.max_regenerations
    } else {
        0
    };
    let mut attempt: u32 = 0;
    let mut warnings: Vec<Violation>;

    // Validate and resolve, regenerating on blocking failures up to the
    // bound. Link resolution failures count as validation failures here.
    let resolved_body = loop {
        let report = ctx.registry.validate(&doc);
        warnings = report
            .violations
            .iter()
            .filter(|v| v.severity == Severity::Warning)
            .cloned()
            .collect();

        let feedback = if report.has_blocking() {
            report.blocking_messages()
        } else {
            match resolve_links(&doc, &ctx.taxonomy) {
                Ok(resolved) => {
                    warnings.extend(resolved.warnings);
                    break resolved.body;
                }
                Err(e @ DraftlineError::LinkResolution { .. }) => vec![e.to_string()],
                Err(e) => return failure(doc.frontmatter.slug.clone(), &e, warnings),
            }
        };

        if attempt >= max_attempts {
            warn!(
                slug = %doc.frontmatter.slug,
                attempts = attempt,
                blocking = feedback.len(),
                "validation failed after all attempts"
            );
            return ItemReport {
                slug: doc.frontmatter.slug.clone(),
                status: ItemStatus::FailedValidation,
                detail: feedback,
                warnings,
            };
        }

        attempt += 1;
        let mut request = request.clone().expect("only generated items regenerate");
        request.feedback = feedback;
        info!(slug = %doc.frontmatter.slug, attempt, "regenerating after blocking violations");
        doc = match ctx.generator.generate(&request).await {
            Ok(doc) => doc,
            Err(e) => return failure(label, &e, warnings),
        };
    };

    // Media attachment is best-effort and never blocks publish.
    let attachment = attach_media(ctx.images.as_ref(), &doc).await;
    warnings.extend(attachment.warnings.clone());
    let featured = attachment.featured.map(|a| a.url);

    // Publish the enriched document; the hash covers the resolved body.
    let enriched = Document {
        frontmatter: doc.frontmatter.clone(),
        body: resolved_body,
    };

    match publish_document(&ctx.cms, &ctx.storage, &enriched, featured).await {
        Ok(outcome) => {
            if outcome.is_published_transition() {
                let event = PublishedEvent {
                    slug: enriched.frontmatter.slug.clone(),
                };
                if let Err(e) = events.send(event).await {
                    warn!(error = %e, "redirect writer unavailable");
                }
            }
            let status = match outcome {
                PublishOutcome::Noop { .. } => ItemStatus::Noop,
                _ => ItemStatus::Published,
            };
            ItemReport {
                slug: enriched.frontmatter.slug.clone(),
                status,
                detail: Vec::new(),
                warnings,
            }
        }
        Err(e) => failure(enriched.frontmatter.slug.clone(), &e, warnings),
    }
}

/// Build the generation briefing for a taxonomy entry.
fn briefing_for(entry: &TaxonomyEntry) -> GenerationRequest {
    let focus = entry
        .keywords
        .first()
        .cloned()
        .unwrap_or_else(|| entry.title.to_lowercase());
    GenerationRequest {
        topic: if entry.title.is_empty() {
            entry.slug.clone()
        } else {
            entry.title.clone()
        },
        focus_keyword: focus,
        secondary_keywords: entry.keywords.iter().skip(1).cloned().collect(),
        taxonomy_context: serde_json::json!({
            "pillar": entry.pillar,
            "cluster": entry.cluster,
            "function": entry.function,
            "keywords": entry.keywords,
        }),
        feedback: Vec::new(),
    }
}
