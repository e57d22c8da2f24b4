//! Generation service client.
//!
//! The generation service is a black box: it takes a topic briefing and
//! returns a raw draft (frontmatter + body) or fails. Regeneration requests
//! carry the blocking violation messages as feedback so the service can fix
//! what the validator rejected.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use draftline_shared::{Document, DraftlineError, GenerationConfig, Result};

/// User-Agent string for generation requests.
const USER_AGENT: &str = concat!("Draftline/", env!("CARGO_PKG_VERSION"));

/// A topic briefing sent to the generation service.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    pub topic: String,
    pub focus_keyword: String,
    pub secondary_keywords: Vec<String>,
    /// The document's taxonomy position (pillar, cluster, function,
    /// keywords) for the service to weave into the draft.
    pub taxonomy_context: serde_json::Value,
    /// Blocking violation messages from the previous attempt, empty on the
    /// first request.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub feedback: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    #[serde(default)]
    document: String,
}

/// HTTP client for the generation service.
pub struct GenerationClient {
    client: reqwest::Client,
    endpoint: String,
}

impl GenerationClient {
    pub fn from_config(config: &GenerationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DraftlineError::Transient(format!("client build: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }

    /// Request one draft. Malformed or empty output is a generation error,
    /// not a parse error: the service failed its contract.
    #[instrument(skip_all, fields(topic = %request.topic, feedback = request.feedback.len()))]
    pub async fn generate(&self, request: &GenerationRequest) -> Result<Document> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| DraftlineError::Transient(format!("generation service: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DraftlineError::Generation(format!(
                "generation service returned HTTP {status}"
            )));
        }

        let body: GenerationResponse = response
            .json()
            .await
            .map_err(|e| DraftlineError::Generation(format!("malformed response: {e}")))?;

        if body.document.trim().is_empty() {
            return Err(DraftlineError::Generation("empty document".into()));
        }

        let doc = Document::parse(&body.document)
            .map_err(|e| DraftlineError::Generation(format!("unparsable draft: {e}")))?;

        debug!(
            slug = %doc.frontmatter.slug,
            words = doc.body.split_whitespace().count(),
            "draft received"
        );
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> GenerationClient {
        let config = GenerationConfig {
            endpoint: format!("{}/generate", server.uri()),
            timeout_secs: 5,
            max_regenerations: 3,
        };
        GenerationClient::from_config(&config).unwrap()
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            topic: "Quota Design".into(),
            focus_keyword: "sales quota".into(),
            secondary_keywords: vec!["quota planning".into()],
            taxonomy_context: serde_json::json!({"pillar": "strategy"}),
            feedback: vec![],
        }
    }

    #[tokio::test]
    async fn parses_returned_draft() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "document": "---\ntitle: T\nslug: t\n---\n# T\n\nBody."
            })))
            .mount(&server)
            .await;

        let doc = client_for(&server).generate(&request()).await.expect("generate");
        assert_eq!(doc.frontmatter.slug, "t");
    }

    #[tokio::test]
    async fn empty_document_is_a_generation_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"document": ""})),
            )
            .mount(&server)
            .await;

        let err = client_for(&server).generate(&request()).await.unwrap_err();
        assert!(matches!(err, DraftlineError::Generation(_)));
    }

    #[tokio::test]
    async fn feedback_is_forwarded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(
                serde_json::json!({"feedback": ["content/tldr-bullets: TL;DR must contain exactly 4 bullets"]}),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "document": "---\ntitle: T\nslug: t\n---\n# T\n"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut req = request();
        req.feedback = vec!["content/tldr-bullets: TL;DR must contain exactly 4 bullets".into()];
        client_for(&server).generate(&req).await.expect("generate");
    }
}
