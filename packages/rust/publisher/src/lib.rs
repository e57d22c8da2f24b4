//! Idempotent publishing.
//!
//! The publisher owns the publish-record table: one record per slug, keyed
//! by content hash. Publishing the same content twice performs exactly one
//! remote mutation; a changed hash updates the remote post in place under
//! its original identifier.

mod client;

pub use client::{CmsClient, PostPayload, RemotePost, SeoMeta};

use chrono::Utc;
use tracing::{info, instrument};

use draftline_shared::{Document, PublishRecord, PublishStatus, Result};
use draftline_storage::Storage;

/// Terminal result of one publish call.
#[derive(Debug, Clone)]
pub enum PublishOutcome {
    /// First publish of this slug.
    Created(RemotePost),
    /// Content changed; the remote post was updated in place.
    Updated(RemotePost),
    /// Content hash unchanged; no remote call was made. Not an error.
    Noop { remote_id: i64 },
}

impl PublishOutcome {
    pub fn remote_id(&self) -> i64 {
        match self {
            Self::Created(post) | Self::Updated(post) => post.id,
            Self::Noop { remote_id } => *remote_id,
        }
    }

    /// Whether this outcome transitioned the slug to PUBLISHED (and so
    /// must be announced to the redirect synchronizer).
    pub fn is_published_transition(&self) -> bool {
        matches!(self, Self::Created(_) | Self::Updated(_))
    }
}

/// Build the CMS payload for a validated, enriched document.
pub fn build_payload(doc: &Document, resolved_body: &str, featured_image: Option<String>) -> PostPayload {
    let fm = &doc.frontmatter;
    PostPayload {
        title: fm.title.clone(),
        slug: fm.slug.clone(),
        content: resolved_body.to_string(),
        category: if fm.category.is_empty() {
            fm.pillar.clone()
        } else {
            fm.category.clone()
        },
        tags: fm.tags.clone(),
        schema_types: fm.schema_types.clone(),
        featured_image,
        seo: SeoMeta {
            title: fm.seo_title.clone(),
            description: fm.meta_description.clone(),
            focus_keyword: fm.focus_keyword.clone(),
        },
    }
}

/// Publish a document idempotently.
///
/// `doc` must already carry the resolved body (the hash covers exactly what
/// is sent to the CMS). On a fatal failure with no prior record the slug is
/// recorded FAILED; a prior record is always left untouched so a published
/// slug never regresses.
#[instrument(skip_all, fields(slug = %doc.frontmatter.slug))]
pub async fn publish_document(
    cms: &CmsClient,
    storage: &Storage,
    doc: &Document,
    featured_image: Option<String>,
) -> Result<PublishOutcome> {
    let slug = doc.frontmatter.slug.as_str();
    let hash = doc.content_hash()?;
    let payload = build_payload(doc, &doc.body, featured_image);
    let existing = storage.get_publish_record(slug).await?;

    match existing {
        Some(record)
            if record.status == PublishStatus::Published && record.content_hash == hash =>
        {
            info!(slug, remote_id = record.remote_id, "content unchanged, idempotent no-op");
            Ok(PublishOutcome::Noop {
                remote_id: record.remote_id,
            })
        }

        Some(record) if record.status == PublishStatus::Published => {
            // Changed content: update in place, preserving the remote id.
            let post = cms
                .update_post(record.remote_id, &payload)
                .await
                .inspect_err(|e| {
                    // A published record is never regressed by a failed update.
                    tracing::warn!(slug, error = %e, "update failed, prior record untouched");
                })?;

            record_publish(storage, doc, post.id, &hash).await?;
            info!(slug, remote_id = post.id, "remote post updated");
            Ok(PublishOutcome::Updated(post))
        }

        prior => {
            // No record, or an earlier attempt that never reached PUBLISHED.
            match cms.create_post(&payload).await {
                Ok(post) => {
                    record_publish(storage, doc, post.id, &hash).await?;
                    info!(slug, remote_id = post.id, "remote post created");
                    Ok(PublishOutcome::Created(post))
                }
                Err(e) => {
                    if !e.is_transient() && prior.is_none() {
                        let failed = PublishRecord {
                            slug: slug.to_string(),
                            remote_id: 0,
                            content_hash: hash,
                            status: PublishStatus::Failed,
                            last_published_at: Utc::now(),
                        };
                        storage
                            .upsert_publish_record(&failed, &doc.frontmatter.pillar)
                            .await?;
                    }
                    Err(e)
                }
            }
        }
    }
}

async fn record_publish(
    storage: &Storage,
    doc: &Document,
    remote_id: i64,
    hash: &str,
) -> Result<()> {
    let record = PublishRecord {
        slug: doc.frontmatter.slug.clone(),
        remote_id,
        content_hash: hash.to_string(),
        status: PublishStatus::Published,
        last_published_at: Utc::now(),
    };
    storage
        .upsert_publish_record(&record, &doc.frontmatter.pillar)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use draftline_shared::{CmsConfig, DraftlineError};
    use uuid::Uuid;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("dl_pub_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn cms_for(server: &MockServer) -> CmsClient {
        let config = CmsConfig {
            base_url: server.uri(),
            username: "engine".into(),
            timeout_secs: 5,
            max_retries: 2,
            backoff_ms: 1,
            ..CmsConfig::default()
        };
        CmsClient::from_config(&config, "app-password").expect("client")
    }

    fn doc(body: &str) -> Document {
        let raw = format!(
            "---\ntitle: Quota Design\nslug: quota-design\nfocus_keyword: sales quota\npillar: strategy\n---\n{body}"
        );
        Document::parse(&raw).expect("parse")
    }

    fn remote_post_json(id: i64) -> serde_json::Value {
        serde_json::json!({"id": id, "link": format!("https://cms.example.com/?p={id}")})
    }

    #[tokio::test]
    async fn first_publish_creates_remote_post() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/posts"))
            .respond_with(ResponseTemplate::new(201).set_body_json(remote_post_json(41)))
            .expect(1)
            .mount(&server)
            .await;

        let storage = test_storage().await;
        let outcome = publish_document(&cms_for(&server), &storage, &doc("# Quota Design\n"), None)
            .await
            .expect("publish");

        assert!(matches!(outcome, PublishOutcome::Created(_)));
        let record = storage
            .get_publish_record("quota-design")
            .await
            .unwrap()
            .expect("record");
        assert_eq!(record.status, PublishStatus::Published);
        assert_eq!(record.remote_id, 41);
    }

    #[tokio::test]
    async fn same_hash_twice_makes_exactly_one_remote_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/posts"))
            .respond_with(ResponseTemplate::new(201).set_body_json(remote_post_json(41)))
            .expect(1) // a second remote call fails verification
            .mount(&server)
            .await;

        let storage = test_storage().await;
        let cms = cms_for(&server);
        let document = doc("# Quota Design\n");

        let first = publish_document(&cms, &storage, &document, None).await.unwrap();
        assert!(first.is_published_transition());

        let second = publish_document(&cms, &storage, &document, None).await.unwrap();
        assert!(matches!(second, PublishOutcome::Noop { remote_id: 41 }));

        // Both reads observe PUBLISHED.
        let record = storage.get_publish_record("quota-design").await.unwrap().unwrap();
        assert_eq!(record.status, PublishStatus::Published);
    }

    #[tokio::test]
    async fn changed_hash_updates_in_place() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/posts"))
            .respond_with(ResponseTemplate::new(201).set_body_json(remote_post_json(41)))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/posts/41"))
            .respond_with(ResponseTemplate::new(200).set_body_json(remote_post_json(41)))
            .expect(1)
            .mount(&server)
            .await;

        let storage = test_storage().await;
        let cms = cms_for(&server);

        publish_document(&cms, &storage, &doc("# Quota Design\n"), None)
            .await
            .unwrap();
        let outcome = publish_document(&cms, &storage, &doc("# Quota Design\n\nRevised.\n"), None)
            .await
            .unwrap();

        assert!(matches!(outcome, PublishOutcome::Updated(_)));
        let record = storage.get_publish_record("quota-design").await.unwrap().unwrap();
        assert_eq!(record.remote_id, 41);
        assert_eq!(
            record.content_hash,
            doc("# Quota Design\n\nRevised.\n").content_hash().unwrap()
        );
    }

    #[tokio::test]
    async fn auth_failure_is_fatal_and_records_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/posts"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1) // fatal: never retried
            .mount(&server)
            .await;

        let storage = test_storage().await;
        let err = publish_document(&cms_for(&server), &storage, &doc("# Q\n"), None)
            .await
            .unwrap_err();

        assert!(matches!(err, DraftlineError::Auth(_)));
        let record = storage.get_publish_record("quota-design").await.unwrap().unwrap();
        assert_eq!(record.status, PublishStatus::Failed);
    }

    #[tokio::test]
    async fn field_rejection_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/posts"))
            .respond_with(ResponseTemplate::new(422).set_body_string("slug already in use"))
            .expect(1)
            .mount(&server)
            .await;

        let storage = test_storage().await;
        let err = publish_document(&cms_for(&server), &storage, &doc("# Q\n"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DraftlineError::FieldRejected(_)));
    }

    #[tokio::test]
    async fn transient_failures_retry_then_succeed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/posts"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/posts"))
            .respond_with(ResponseTemplate::new(201).set_body_json(remote_post_json(7)))
            .mount(&server)
            .await;

        let storage = test_storage().await;
        let outcome = publish_document(&cms_for(&server), &storage, &doc("# Q\n"), None)
            .await
            .expect("retries exhaust the 503s");
        assert!(matches!(outcome, PublishOutcome::Created(_)));
    }

    #[tokio::test]
    async fn transient_exhaustion_surfaces_transient_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/posts"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let storage = test_storage().await;
        let err = publish_document(&cms_for(&server), &storage, &doc("# Q\n"), None)
            .await
            .unwrap_err();
        assert!(err.is_transient());
        // Transient exhaustion does not write a FAILED record.
        assert!(storage.get_publish_record("quota-design").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_update_leaves_published_record_untouched() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/posts"))
            .respond_with(ResponseTemplate::new(201).set_body_json(remote_post_json(41)))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/posts/41"))
            .respond_with(ResponseTemplate::new(422).set_body_string("bad field"))
            .mount(&server)
            .await;

        let storage = test_storage().await;
        let cms = cms_for(&server);

        publish_document(&cms, &storage, &doc("# Original\n"), None).await.unwrap();
        let original_hash = doc("# Original\n").content_hash().unwrap();

        let err = publish_document(&cms, &storage, &doc("# Changed\n"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DraftlineError::FieldRejected(_)));

        let record = storage.get_publish_record("quota-design").await.unwrap().unwrap();
        assert_eq!(record.status, PublishStatus::Published);
        assert_eq!(record.content_hash, original_hash);
    }
}
