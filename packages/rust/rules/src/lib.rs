//! Declarative structural/SEO rule registry and the validation engine.
//!
//! Rules are data: `{id, severity, message, predicate}`. The engine applies
//! every registered rule through one uniform loop, so adding a rule never
//! touches the engine. Validation is a pure function of the document:
//! identical input always yields an identical [`ValidationReport`].

mod facts;

pub use facts::{DocumentFacts, Heading};

use tracing::debug;

use draftline_shared::{Document, Severity, ValidationReport, Violation};

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

/// Minimum acceptable body length.
pub const MIN_WORD_COUNT: usize = 1200;
/// Soft ceiling on body length.
pub const MAX_WORD_COUNT: usize = 2000;
/// Keyword density bounds, inclusive.
pub const DENSITY_MIN: f64 = 0.008;
pub const DENSITY_MAX: f64 = 0.015;
/// Documents shorter than this are exempt from the density rule.
pub const DENSITY_EXEMPT_BELOW: usize = 600;
/// Alt text length bounds, inclusive.
pub const ALT_TEXT_MIN: usize = 80;
pub const ALT_TEXT_MAX: usize = 125;
/// The TL;DR block must contain exactly this many bullets.
pub const TLDR_BULLETS: usize = 4;
/// Minimum FAQ entries.
pub const FAQ_MIN: usize = 5;
/// Expect roughly one statistic per this many words.
pub const WORDS_PER_STAT: usize = 175;

// ---------------------------------------------------------------------------
// Rule & registry
// ---------------------------------------------------------------------------

/// A single declarative rule. The predicate returns `true` when the
/// document passes.
pub struct Rule {
    pub id: &'static str,
    pub severity: Severity,
    pub message: &'static str,
    pub predicate: fn(&DocumentFacts) -> bool,
}

/// The rule registry: an ordered list of rules evaluated uniformly.
pub struct RuleRegistry {
    rules: Vec<Rule>,
}

impl RuleRegistry {
    /// The standard editorial rule set.
    pub fn standard() -> Self {
        Self {
            rules: vec![
                Rule {
                    id: "frontmatter/title-missing",
                    severity: Severity::Error,
                    message: "frontmatter is missing a title",
                    predicate: |f| !f.frontmatter.title.trim().is_empty(),
                },
                Rule {
                    id: "frontmatter/slug-missing",
                    severity: Severity::Error,
                    message: "frontmatter is missing a slug",
                    predicate: |f| !f.frontmatter.slug.trim().is_empty(),
                },
                Rule {
                    id: "frontmatter/focus-keyword-missing",
                    severity: Severity::Error,
                    message: "frontmatter is missing a focus keyword",
                    predicate: |f| !f.frontmatter.focus_keyword.trim().is_empty(),
                },
                Rule {
                    id: "heading/h1-missing",
                    severity: Severity::Error,
                    message: "document has no top-level heading",
                    predicate: |f| f.headings.iter().any(|h| h.level == 1),
                },
                Rule {
                    id: "heading/h1-multiple",
                    severity: Severity::Error,
                    message: "document has more than one top-level heading",
                    predicate: |f| f.headings.iter().filter(|h| h.level == 1).count() <= 1,
                },
                Rule {
                    id: "heading/level-skip",
                    severity: Severity::Error,
                    message: "heading level jumps by more than one from its predecessor",
                    predicate: |f| {
                        f.headings
                            .windows(2)
                            .all(|w| w[1].level <= w[0].level + 1)
                    },
                },
                Rule {
                    id: "heading/duplicate-text",
                    severity: Severity::Error,
                    message: "two headings share identical text",
                    predicate: |f| {
                        let mut seen = std::collections::HashSet::new();
                        f.headings
                            .iter()
                            .all(|h| seen.insert(h.text.to_lowercase()))
                    },
                },
                Rule {
                    id: "seo/keyword-density",
                    severity: Severity::Error,
                    message: "focus keyword density outside 0.8%-1.5%",
                    predicate: |f| {
                        f.word_count < DENSITY_EXEMPT_BELOW
                            || (DENSITY_MIN..=DENSITY_MAX).contains(&f.keyword_density)
                    },
                },
                Rule {
                    id: "content/word-count-min",
                    severity: Severity::Error,
                    message: "body is shorter than 1200 words",
                    predicate: |f| f.word_count >= MIN_WORD_COUNT,
                },
                Rule {
                    id: "content/word-count-max",
                    severity: Severity::Warning,
                    message: "body is longer than 2000 words",
                    predicate: |f| f.word_count <= MAX_WORD_COUNT,
                },
                Rule {
                    id: "content/tldr-bullets",
                    severity: Severity::Error,
                    message: "TL;DR must contain exactly 4 bullets",
                    predicate: |f| f.tldr_bullets == TLDR_BULLETS,
                },
                Rule {
                    id: "content/faq-minimum",
                    severity: Severity::Error,
                    message: "FAQ section needs at least 5 entries",
                    predicate: |f| f.faq_count >= FAQ_MIN,
                },
                Rule {
                    id: "content/key-takeaway-missing",
                    severity: Severity::Error,
                    message: "Key Takeaway section is missing",
                    predicate: |f| f.has_key_takeaway,
                },
                Rule {
                    id: "content/key-takeaway-length",
                    severity: Severity::Warning,
                    message: "Key Takeaway outside the 40-60 word target",
                    predicate: |f| {
                        !f.has_key_takeaway || (40..=60).contains(&f.key_takeaway_words)
                    },
                },
                Rule {
                    id: "content/comparison-table-missing",
                    severity: Severity::Warning,
                    message: "no comparison table found",
                    predicate: |f| f.has_comparison_table,
                },
                Rule {
                    id: "content/stat-density",
                    severity: Severity::Warning,
                    message: "fewer statistics than one per 175 words",
                    predicate: |f| f.stat_count >= f.word_count / WORDS_PER_STAT,
                },
                Rule {
                    id: "media/alt-text-length",
                    severity: Severity::Error,
                    message: "alt text outside the 80-125 character bounds",
                    predicate: |f| {
                        let featured = &f.frontmatter.featured_alt;
                        let in_bounds = |alt: &str| {
                            (ALT_TEXT_MIN..=ALT_TEXT_MAX).contains(&alt.chars().count())
                        };
                        (featured.is_empty() || in_bounds(featured))
                            && f.frontmatter.inline_alts.iter().all(|a| in_bounds(a))
                    },
                },
                Rule {
                    id: "seo/meta-description-missing",
                    severity: Severity::Warning,
                    message: "frontmatter has no meta description",
                    predicate: |f| !f.frontmatter.meta_description.trim().is_empty(),
                },
                Rule {
                    id: "seo/meta-description-length",
                    severity: Severity::Warning,
                    message: "meta description outside the 140-170 character target",
                    predicate: |f| {
                        let len = f.frontmatter.meta_description.chars().count();
                        len == 0 || (140..=170).contains(&len)
                    },
                },
                Rule {
                    id: "seo/seo-title-length",
                    severity: Severity::Warning,
                    message: "SEO title outside the 30-65 character target",
                    predicate: |f| {
                        let len = f.frontmatter.seo_title.chars().count();
                        len == 0 || (30..=65).contains(&len)
                    },
                },
                Rule {
                    id: "seo/keyword-placement",
                    severity: Severity::Warning,
                    message: "focus keyword missing from the lead, an H2, or the meta description",
                    predicate: |f| {
                        f.frontmatter.focus_keyword.is_empty()
                            || (f.keyword_in_lead && f.keyword_in_h2 && f.keyword_in_meta)
                    },
                },
            ],
        }
    }

    /// Number of registered rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Evaluate every rule against precomputed facts.
    pub fn evaluate(&self, facts: &DocumentFacts) -> ValidationReport {
        let mut report = ValidationReport::default();
        for rule in &self.rules {
            if !(rule.predicate)(facts) {
                report.push(Violation::new(rule.id, rule.severity, rule.message));
            }
        }

        debug!(
            violations = report.violations.len(),
            blocking = report.has_blocking(),
            "rules evaluated"
        );
        report
    }

    /// Parse facts from a document and evaluate the registry.
    pub fn validate(&self, doc: &Document) -> ValidationReport {
        let facts = DocumentFacts::from_document(doc);
        self.evaluate(&facts)
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use draftline_shared::Document;

    /// Body of `words` total words where the two-word focus phrase
    /// "sales quota" appears `hits` times.
    fn density_body(words: usize, hits: usize) -> String {
        let mut out = String::from("# Density Probe\n\n");
        let mut remaining = words - 2; // heading words count too
        for _ in 0..hits {
            out.push_str("sales quota ");
            remaining -= 2;
        }
        for i in 0..remaining {
            out.push_str(&format!("word{i} "));
        }
        out
    }

    fn density_doc(words: usize, hits: usize) -> Document {
        let raw = format!(
            "---\ntitle: Density Probe\nslug: density-probe\nfocus_keyword: sales quota\n---\n{}",
            density_body(words, hits)
        );
        Document::parse(&raw).expect("parse")
    }

    fn violation_ids(report: &draftline_shared::ValidationReport) -> Vec<String> {
        report.violations.iter().map(|v| v.rule.clone()).collect()
    }

    #[test]
    fn validator_is_deterministic() {
        let registry = RuleRegistry::standard();
        let doc = density_doc(1500, 15);
        let a = registry.validate(&doc);
        let b = registry.validate(&doc);
        assert_eq!(a, b);
    }

    #[test]
    fn density_one_percent_passes() {
        let registry = RuleRegistry::standard();
        let report = registry.validate(&density_doc(1500, 15));
        assert!(!violation_ids(&report).contains(&"seo/keyword-density".to_string()));
    }

    #[test]
    fn density_below_floor_fails() {
        let registry = RuleRegistry::standard();
        let report = registry.validate(&density_doc(1500, 5));
        assert!(violation_ids(&report).contains(&"seo/keyword-density".to_string()));
    }

    #[test]
    fn density_above_ceiling_fails() {
        let registry = RuleRegistry::standard();
        let report = registry.validate(&density_doc(1500, 30));
        assert!(violation_ids(&report).contains(&"seo/keyword-density".to_string()));
    }

    #[test]
    fn short_documents_exempt_from_density() {
        let registry = RuleRegistry::standard();
        // 400 words, zero keyword hits: density would fail were it not exempt.
        let report = registry.validate(&density_doc(400, 0));
        assert!(!violation_ids(&report).contains(&"seo/keyword-density".to_string()));
    }

    fn heading_doc(body: &str) -> Document {
        let raw = format!("---\ntitle: T\nslug: t\nfocus_keyword: kw\n---\n{body}");
        Document::parse(&raw).expect("parse")
    }

    #[test]
    fn heading_hierarchy_passes() {
        let registry = RuleRegistry::standard();
        let report = registry.validate(&heading_doc("# A\n\n## B\n\n### C\n\n## D\n"));
        let ids = violation_ids(&report);
        assert!(!ids.iter().any(|id| id.starts_with("heading/")));
    }

    #[test]
    fn heading_level_skip_fails() {
        let registry = RuleRegistry::standard();
        let report = registry.validate(&heading_doc("# A\n\n### C\n"));
        assert!(violation_ids(&report).contains(&"heading/level-skip".to_string()));
    }

    #[test]
    fn two_h1_headings_fail() {
        let registry = RuleRegistry::standard();
        let report = registry.validate(&heading_doc("# A\n\n# B\n"));
        assert!(violation_ids(&report).contains(&"heading/h1-multiple".to_string()));
    }

    #[test]
    fn duplicate_heading_text_fails() {
        let registry = RuleRegistry::standard();
        let report = registry.validate(&heading_doc("# A\n\n## The Data\n\n## The Data\n"));
        assert!(violation_ids(&report).contains(&"heading/duplicate-text".to_string()));
    }

    #[test]
    fn missing_h1_fails() {
        let registry = RuleRegistry::standard();
        let report = registry.validate(&heading_doc("## Only Sections\n"));
        assert!(violation_ids(&report).contains(&"heading/h1-missing".to_string()));
    }

    #[test]
    fn alt_text_bounds_enforced() {
        let registry = RuleRegistry::standard();

        let short_alt = "too short";
        let good_alt = "a".repeat(100);
        let raw = format!(
            "---\ntitle: T\nslug: t\nfocus_keyword: kw\nfeatured_alt: \"{good_alt}\"\ninline_alts:\n  - \"{short_alt}\"\n---\n# T\n"
        );
        let report = registry.validate(&Document::parse(&raw).unwrap());
        assert!(violation_ids(&report).contains(&"media/alt-text-length".to_string()));

        let raw_ok = format!(
            "---\ntitle: T\nslug: t\nfocus_keyword: kw\nfeatured_alt: \"{good_alt}\"\n---\n# T\n"
        );
        let report = registry.validate(&Document::parse(&raw_ok).unwrap());
        assert!(!violation_ids(&report).contains(&"media/alt-text-length".to_string()));
    }

    #[test]
    fn missing_required_fields_block() {
        let registry = RuleRegistry::standard();
        let report = registry.validate(&Document::parse("# Bare\n\nNothing else.").unwrap());
        assert!(report.has_blocking());
        let ids = violation_ids(&report);
        assert!(ids.contains(&"frontmatter/title-missing".to_string()));
        assert!(ids.contains(&"frontmatter/slug-missing".to_string()));
        assert!(ids.contains(&"frontmatter/focus-keyword-missing".to_string()));
    }

    #[test]
    fn warnings_do_not_block() {
        let registry = RuleRegistry::standard();
        // 1500 words, valid density, single H1: remaining failures are the
        // content-structure errors; drop to warnings by satisfying them.
        let mut body = String::from("# Probe\n\n## TL;DR\n\n- a\n- b\n- c\n- d\n\n## Key Takeaway\n\n");
        body.push_str(&"take away word ".repeat(15));
        body.push_str("\n\n## FAQ\n\n**Q1?**\nA.\n\n**Q2?**\nA.\n\n**Q3?**\nA.\n\n**Q4?**\nA.\n\n**Q5?**\nA.\n\n## Detail\n\n");
        for _ in 0..14 {
            body.push_str("sales quota ");
        }
        let filler_needed = 1500usize.saturating_sub(body.split_whitespace().count());
        for i in 0..filler_needed {
            body.push_str(&format!("w{i} "));
        }

        let raw = format!(
            "---\ntitle: Probe\nslug: probe\nfocus_keyword: sales quota\n---\n{body}"
        );
        let report = registry.validate(&Document::parse(&raw).unwrap());
        assert!(
            !report.has_blocking(),
            "unexpected blocking violations: {:?}",
            report.violations
        );
        // Still records non-blocking warnings (comparison table, stats...).
        assert!(!report.violations.is_empty());
    }
}
