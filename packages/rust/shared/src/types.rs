//! Core domain types for the Draftline pipeline.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{DraftlineError, Result};

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// A draft document: typed frontmatter plus a markdown body.
///
/// Documents are transient: created when a draft is pulled from the backlog
/// or the generation service, discarded after publish or failure.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Structured metadata from the `---`-delimited YAML frontmatter block.
    pub frontmatter: Frontmatter,
    /// Markdown body following the frontmatter.
    pub body: String,
}

/// Frontmatter fields recognized by the pipeline. Unknown fields are kept
/// in `extra` so they round-trip into the content hash.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frontmatter {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub focus_keyword: String,
    /// Declared variants of the focus keyword, counted toward density.
    #[serde(default)]
    pub keyword_variants: Vec<String>,
    #[serde(default)]
    pub secondary_keywords: Vec<String>,
    #[serde(default)]
    pub pillar: String,
    #[serde(default)]
    pub function: String,
    #[serde(default)]
    pub seo_title: String,
    #[serde(default)]
    pub meta_description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Structured-data type names passed through to the CMS (e.g. "Article").
    #[serde(default)]
    pub schema_types: Vec<String>,
    /// Alt text for the featured image slot.
    #[serde(default)]
    pub featured_alt: String,
    /// Alt text for in-body image slots, in order of appearance.
    #[serde(default)]
    pub inline_alts: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl Document {
    /// Parse a raw draft: an optional `---`-delimited YAML frontmatter block
    /// followed by the markdown body.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim_start();
        if let Some(rest) = trimmed.strip_prefix("---") {
            if let Some(end) = rest.find("\n---") {
                let yaml_text = &rest[..end];
                let body = rest[end + 4..].trim_start_matches('\n');
                let frontmatter: Frontmatter = if yaml_text.trim().is_empty() {
                    Frontmatter::default()
                } else {
                    serde_yaml::from_str(yaml_text)
                        .map_err(|e| DraftlineError::parse(format!("frontmatter: {e}")))?
                };
                return Ok(Self {
                    frontmatter,
                    body: body.trim_end().to_string(),
                });
            }
            return Err(DraftlineError::parse("unterminated frontmatter block"));
        }

        Ok(Self {
            frontmatter: Frontmatter::default(),
            body: trimmed.trim_end().to_string(),
        })
    }

    /// SHA-256 hash over the canonical form of the document.
    ///
    /// The canonical form is the JSON serialization of the frontmatter
    /// (keys sorted) joined with the trimmed body, so two documents with
    /// the same content always hash identically.
    pub fn content_hash(&self) -> Result<String> {
        let fm = serde_json::to_string(&self.frontmatter)
            .map_err(|e| DraftlineError::parse(format!("canonicalize frontmatter: {e}")))?;

        let mut hasher = Sha256::new();
        hasher.update(fm.as_bytes());
        hasher.update(b"\n---\n");
        hasher.update(self.body.trim().as_bytes());
        Ok(format!("{:x}", hasher.finalize()))
    }
}

// ---------------------------------------------------------------------------
// Validation report
// ---------------------------------------------------------------------------

/// Severity of a rule violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Error,
    Warning,
}

/// A single rule violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// Identifier of the violated rule (e.g. `heading/level-skip`).
    pub rule: String,
    pub severity: Severity,
    pub message: String,
}

impl Violation {
    pub fn new(rule: impl Into<String>, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            severity,
            message: message.into(),
        }
    }
}

/// Ordered list of violations for one document. A pure function of the
/// document: validating the same input twice yields an identical report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    /// Whether any ERROR-severity violation blocks publishing.
    pub fn has_blocking(&self) -> bool {
        self.violations
            .iter()
            .any(|v| v.severity == Severity::Error)
    }

    /// Messages of blocking violations, for regeneration feedback.
    pub fn blocking_messages(&self) -> Vec<String> {
        self.violations
            .iter()
            .filter(|v| v.severity == Severity::Error)
            .map(|v| format!("{}: {}", v.rule, v.message))
            .collect()
    }

    pub fn push(&mut self, violation: Violation) {
        self.violations.push(violation);
    }
}

// ---------------------------------------------------------------------------
// Publish records
// ---------------------------------------------------------------------------

/// Publish state of a slug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PublishStatus {
    Pending,
    Published,
    Failed,
}

impl PublishStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Published => "PUBLISHED",
            Self::Failed => "FAILED",
        }
    }
}

impl std::str::FromStr for PublishStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "PUBLISHED" => Ok(Self::Published),
            "FAILED" => Ok(Self::Failed),
            other => Err(format!("unknown publish status '{other}'")),
        }
    }
}

/// One record per slug, owned exclusively by the publisher. Updated in
/// place on republish, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishRecord {
    pub slug: String,
    /// Remote post identifier, stable across revisions once assigned.
    pub remote_id: i64,
    /// Content hash of the last successfully published revision.
    pub content_hash: String,
    pub status: PublishStatus,
    pub last_published_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Redirect entries
// ---------------------------------------------------------------------------

/// A placeholder redirect, retired (deactivated) once the real page is live.
/// Deactivation happens exactly once and is never reversed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedirectEntry {
    pub source_path: String,
    pub target_path: String,
    pub active: bool,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Engagement candidates
// ---------------------------------------------------------------------------

/// A scored, deduplicated forum thread flagged for possible human action.
/// The monitor only emits candidates; posting is an external concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagementCandidate {
    pub thread_id: String,
    pub forum: String,
    pub title: String,
    pub url: String,
    pub score: i64,
    pub discovered_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const DRAFT: &str = "---\ntitle: Quota Design\nslug: quota-design\nfocus_keyword: sales quota\ntags:\n  - quota\n---\n# Quota Design\n\nBody text here.\n";

    #[test]
    fn parse_frontmatter_and_body() {
        let doc = Document::parse(DRAFT).expect("parse");
        assert_eq!(doc.frontmatter.title, "Quota Design");
        assert_eq!(doc.frontmatter.slug, "quota-design");
        assert_eq!(doc.frontmatter.tags, vec!["quota"]);
        assert!(doc.body.starts_with("# Quota Design"));
        assert!(doc.body.ends_with("Body text here."));
    }

    #[test]
    fn parse_without_frontmatter() {
        let doc = Document::parse("# Just a body\n\nText.").expect("parse");
        assert!(doc.frontmatter.title.is_empty());
        assert_eq!(doc.body, "# Just a body\n\nText.");
    }

    #[test]
    fn parse_unterminated_frontmatter_fails() {
        let err = Document::parse("---\ntitle: Broken\n").unwrap_err();
        assert!(err.to_string().contains("unterminated"));
    }

    #[test]
    fn unknown_frontmatter_fields_are_kept() {
        let raw = "---\ntitle: T\ncustom_field: 42\n---\nBody";
        let doc = Document::parse(raw).expect("parse");
        assert!(doc.frontmatter.extra.contains_key("custom_field"));
    }

    #[test]
    fn content_hash_is_stable() {
        let a = Document::parse(DRAFT).expect("parse");
        let b = Document::parse(DRAFT).expect("parse");
        assert_eq!(a.content_hash().unwrap(), b.content_hash().unwrap());
    }

    #[test]
    fn content_hash_changes_with_body() {
        let a = Document::parse(DRAFT).expect("parse");
        let mut b = a.clone();
        b.body.push_str("\n\nAn extra paragraph.");
        assert_ne!(a.content_hash().unwrap(), b.content_hash().unwrap());
    }

    #[test]
    fn report_blocking_detection() {
        let mut report = ValidationReport::default();
        report.push(Violation::new("seo/meta-description-length", Severity::Warning, "short"));
        assert!(!report.has_blocking());

        report.push(Violation::new("heading/h1-missing", Severity::Error, "no H1"));
        assert!(report.has_blocking());
        assert_eq!(report.blocking_messages().len(), 1);
    }

    #[test]
    fn publish_status_roundtrip() {
        for status in [PublishStatus::Pending, PublishStatus::Published, PublishStatus::Failed] {
            let parsed: PublishStatus = status.as_str().parse().expect("parse status");
            assert_eq!(parsed, status);
        }
        assert!("published".parse::<PublishStatus>().is_err());
    }
}
