//! Image asset attachment.
//!
//! For each alt-text specification in a document's frontmatter the attacher
//! requests an asset reference from the image service. Asset production is
//! best-effort: a failed request is recorded as a WARNING and the document
//! proceeds to publish without that asset. Alt-text length bounds are a
//! Validator rule, enforced whether or not the asset is produced.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use draftline_shared::{
    Document, DraftlineError, ImageConfig, Result, Severity, Violation,
};

/// User-Agent string for image service requests.
const USER_AGENT: &str = concat!("Draftline/", env!("CARGO_PKG_VERSION"));

/// An alt-text specification: one image slot to fill.
#[derive(Debug, Clone, Serialize)]
pub struct AltTextSpec {
    /// Slot name: `featured` or `inline-N`.
    pub slot: String,
    pub alt_text: String,
}

/// A produced asset reference returned by the image service.
#[derive(Debug, Clone, Deserialize)]
pub struct AssetRef {
    pub asset_id: String,
    pub url: String,
}

/// Result of attaching media to one document.
#[derive(Debug, Clone, Default)]
pub struct MediaAttachment {
    /// Featured image, if its slot was declared and produced.
    pub featured: Option<AssetRef>,
    /// In-body assets in slot order (missing slots are skipped).
    pub inline: Vec<AssetRef>,
    /// One warning per failed slot.
    pub warnings: Vec<Violation>,
}

/// HTTP client for the image service.
pub struct ImageClient {
    client: reqwest::Client,
    endpoint: String,
}

impl ImageClient {
    /// Build a client from config. Returns `None` when no endpoint is
    /// configured, in which case media attachment is skipped entirely.
    pub fn from_config(config: &ImageConfig) -> Result<Option<Self>> {
        if config.endpoint.is_empty() {
            return Ok(None);
        }

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DraftlineError::Transient(format!("client build: {e}")))?;

        Ok(Some(Self {
            client,
            endpoint: config.endpoint.clone(),
        }))
    }

    /// Request one asset from the image service.
    pub async fn request_asset(&self, spec: &AltTextSpec) -> Result<AssetRef> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(spec)
            .send()
            .await
            .map_err(|e| DraftlineError::Transient(format!("image service: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DraftlineError::Transient(format!(
                "image service returned HTTP {status} for slot '{}'",
                spec.slot
            )));
        }

        response
            .json::<AssetRef>()
            .await
            .map_err(|e| DraftlineError::parse(format!("image service response: {e}")))
    }
}

/// Alt-text specs declared by a document, featured slot first.
pub fn alt_specs(doc: &Document) -> Vec<AltTextSpec> {
    let mut specs = Vec::new();
    if !doc.frontmatter.featured_alt.is_empty() {
        specs.push(AltTextSpec {
            slot: "featured".into(),
            alt_text: doc.frontmatter.featured_alt.clone(),
        });
    }
    for (i, alt) in doc.frontmatter.inline_alts.iter().enumerate() {
        specs.push(AltTextSpec {
            slot: format!("inline-{i}"),
            alt_text: alt.clone(),
        });
    }
    specs
}

/// Attach assets for every declared slot. Never fails the item: each failed
/// slot produces a WARNING and the rest proceed.
#[instrument(skip_all, fields(slug = %doc.frontmatter.slug))]
pub async fn attach_media(client: Option<&ImageClient>, doc: &Document) -> MediaAttachment {
    let mut attachment = MediaAttachment::default();
    let specs = alt_specs(doc);

    if specs.is_empty() {
        return attachment;
    }

    let Some(client) = client else {
        debug!("image service not configured, skipping media attachment");
        return attachment;
    };

    for spec in specs {
        match client.request_asset(&spec).await {
            Ok(asset) => {
                debug!(slot = %spec.slot, asset_id = %asset.asset_id, "asset attached");
                if spec.slot == "featured" {
                    attachment.featured = Some(asset);
                } else {
                    attachment.inline.push(asset);
                }
            }
            Err(e) => {
                warn!(slot = %spec.slot, error = %e, "asset request failed, publishing without it");
                attachment.warnings.push(Violation::new(
                    "media/asset-unavailable",
                    Severity::Warning,
                    format!("slot '{}' skipped: {e}", spec.slot),
                ));
            }
        }
    }

    attachment
}

#[cfg(test)]
mod tests {
    use super::*;
    use draftline_shared::Document;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn doc_with_alts() -> Document {
        let featured = "f".repeat(90);
        let inline = "i".repeat(90);
        let raw = format!(
            "---\ntitle: T\nslug: t\nfocus_keyword: kw\nfeatured_alt: \"{featured}\"\ninline_alts:\n  - \"{inline}\"\n---\n# T\n"
        );
        Document::parse(&raw).expect("parse")
    }

    fn client_for(server: &MockServer) -> ImageClient {
        let config = ImageConfig {
            endpoint: format!("{}/assets", server.uri()),
            timeout_secs: 5,
        };
        ImageClient::from_config(&config).unwrap().unwrap()
    }

    #[test]
    fn no_endpoint_disables_client() {
        let config = ImageConfig::default();
        assert!(ImageClient::from_config(&config).unwrap().is_none());
    }

    #[test]
    fn specs_in_slot_order() {
        let specs = alt_specs(&doc_with_alts());
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].slot, "featured");
        assert_eq!(specs[1].slot, "inline-0");
    }

    #[tokio::test]
    async fn attaches_featured_and_inline_assets() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({"slot": "featured"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"asset_id": "a-1", "url": "https://img.example.com/a-1.webp"}),
            ))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"asset_id": "a-2", "url": "https://img.example.com/a-2.webp"}),
            ))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let attachment = attach_media(Some(&client), &doc_with_alts()).await;

        assert_eq!(attachment.featured.as_ref().unwrap().asset_id, "a-1");
        assert_eq!(attachment.inline.len(), 1);
        assert!(attachment.warnings.is_empty());
    }

    #[tokio::test]
    async fn failed_slot_is_a_warning_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let attachment = attach_media(Some(&client), &doc_with_alts()).await;

        assert!(attachment.featured.is_none());
        assert!(attachment.inline.is_empty());
        assert_eq!(attachment.warnings.len(), 2);
        assert_eq!(attachment.warnings[0].rule, "media/asset-unavailable");
        assert_eq!(attachment.warnings[0].severity, Severity::Warning);
    }

    #[tokio::test]
    async fn no_declared_slots_is_a_noop() {
        let doc = Document::parse("---\ntitle: T\nslug: t\n---\n# T\n").unwrap();
        let attachment = attach_media(None, &doc).await;
        assert!(attachment.featured.is_none());
        assert!(attachment.warnings.is_empty());
    }
}
