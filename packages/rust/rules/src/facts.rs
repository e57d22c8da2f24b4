//! Deterministic fact extraction from a document.
//!
//! [`DocumentFacts`] is computed once per document and handed to every rule
//! predicate. All extraction is pure: no clock, no I/O, no randomness.

use std::sync::LazyLock;

use regex::Regex;

use draftline_shared::{Document, Frontmatter};

/// A heading in body order. Headings inside code fences are excluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    pub level: u8,
    pub text: String,
}

/// Everything the rule predicates look at, precomputed.
#[derive(Debug, Clone)]
pub struct DocumentFacts {
    pub frontmatter: Frontmatter,
    pub body: String,
    pub headings: Vec<Heading>,
    pub word_count: usize,
    /// Occurrences of the focus keyword and its declared variants,
    /// case-insensitive.
    pub focus_occurrences: usize,
    /// `focus_occurrences / word_count`, 0.0 for an empty body.
    pub keyword_density: f64,
    /// Numeric statistics in the body (percentages, dollar amounts,
    /// thousands-separated figures, multipliers).
    pub stat_count: usize,
    pub tldr_bullets: usize,
    pub faq_count: usize,
    pub has_key_takeaway: bool,
    pub key_takeaway_words: usize,
    pub has_comparison_table: bool,
    /// Whether the focus keyword appears in the first 100 body words.
    pub keyword_in_lead: bool,
    /// Whether the focus keyword appears in at least one H2.
    pub keyword_in_h2: bool,
    /// Whether the focus keyword appears in the meta description.
    pub keyword_in_meta: bool,
}

static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.+?)\s*$").expect("valid regex"));

static STAT_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\d+%",                // percentages
        r"\$[\d,.]+[MBK]?",     // dollar amounts
        r"\d{1,3}(?:,\d{3})+",  // thousands-separated figures
        r"\d+x\b",              // multipliers
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

static TABLE_SEPARATOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\|[-:| ]+\|\s*$").expect("valid regex"));

impl DocumentFacts {
    /// Extract facts from a document.
    pub fn from_document(doc: &Document) -> Self {
        let body = doc.body.as_str();
        let headings = extract_headings(body);
        let word_count = body.split_whitespace().count();

        let focus = doc.frontmatter.focus_keyword.to_lowercase();
        let body_lower = body.to_lowercase();

        let mut focus_occurrences = 0;
        if !focus.is_empty() {
            focus_occurrences += count_occurrences(&body_lower, &focus);
            for variant in &doc.frontmatter.keyword_variants {
                let v = variant.to_lowercase();
                if !v.is_empty() {
                    focus_occurrences += count_occurrences(&body_lower, &v);
                }
            }
        }

        let keyword_density = if word_count > 0 {
            focus_occurrences as f64 / word_count as f64
        } else {
            0.0
        };

        let stat_count = STAT_RES.iter().map(|re| re.find_iter(body).count()).sum();

        let tldr_bullets = section_lines(body, &headings, is_tldr_heading)
            .iter()
            .filter(|l| {
                let t = l.trim_start();
                t.starts_with("- ") || t.starts_with("* ")
            })
            .count();

        let faq_count = count_faq_entries(body, &headings);

        let takeaway_lines = section_lines(body, &headings, is_takeaway_heading);
        let has_key_takeaway = headings.iter().any(|h| is_takeaway_heading(&h.text));
        let key_takeaway_words = takeaway_lines
            .iter()
            .map(|l| l.split_whitespace().count())
            .sum();

        let has_comparison_table = TABLE_SEPARATOR_RE.is_match(body);

        let lead: String = body_lower
            .split_whitespace()
            .take(100)
            .collect::<Vec<_>>()
            .join(" ");
        let keyword_in_lead = !focus.is_empty() && lead.contains(&focus);
        let keyword_in_h2 = !focus.is_empty()
            && headings
                .iter()
                .any(|h| h.level == 2 && h.text.to_lowercase().contains(&focus));
        let keyword_in_meta = !focus.is_empty()
            && doc
                .frontmatter
                .meta_description
                .to_lowercase()
                .contains(&focus);

        Self {
            frontmatter: doc.frontmatter.clone(),
            body: doc.body.clone(),
            headings,
            word_count,
            focus_occurrences,
            keyword_density,
            stat_count,
            tldr_bullets,
            faq_count,
            has_key_takeaway,
            key_takeaway_words,
            has_comparison_table,
            keyword_in_lead,
            keyword_in_h2,
            keyword_in_meta,
        }
    }
}

/// Extract headings in order, skipping fenced code blocks.
fn extract_headings(body: &str) -> Vec<Heading> {
    let mut headings = Vec::new();
    let mut in_code_block = false;

    for line in body.lines() {
        if line.trim_start().starts_with("```") {
            in_code_block = !in_code_block;
            continue;
        }
        if in_code_block {
            continue;
        }
        if let Some(caps) = HEADING_RE.captures(line) {
            headings.push(Heading {
                level: caps[1].len() as u8,
                text: caps[2].to_string(),
            });
        }
    }

    headings
}

/// Count non-overlapping occurrences of `needle` in `haystack`.
fn count_occurrences(haystack: &str, needle: &str) -> usize {
    haystack.match_indices(needle).count()
}

fn is_tldr_heading(text: &str) -> bool {
    let t = text.to_lowercase();
    t.contains("tl;dr") || t.contains("tldr")
}

fn is_takeaway_heading(text: &str) -> bool {
    text.to_lowercase().contains("key takeaway")
}

fn is_faq_heading(text: &str) -> bool {
    let t = text.to_lowercase();
    t.contains("faq") || t.contains("frequently asked")
}

/// Non-empty, non-heading lines of the first section whose heading matches.
fn section_lines(body: &str, headings: &[Heading], matches: fn(&str) -> bool) -> Vec<String> {
    let Some(target) = headings.iter().find(|h| matches(&h.text)) else {
        return Vec::new();
    };

    let mut lines = Vec::new();
    let mut in_section = false;
    let mut in_code_block = false;

    for line in body.lines() {
        if line.trim_start().starts_with("```") {
            in_code_block = !in_code_block;
        }
        if !in_code_block {
            if let Some(caps) = HEADING_RE.captures(line) {
                if in_section {
                    break;
                }
                in_section =
                    caps[1].len() as u8 == target.level && &caps[2] == target.text.as_str();
                continue;
            }
        }
        if in_section && !line.trim().is_empty() {
            lines.push(line.to_string());
        }
    }

    lines
}

/// Count question entries in the FAQ section: bold-line questions
/// (`**...?**`) or sub-headings one level below the FAQ heading.
fn count_faq_entries(body: &str, headings: &[Heading]) -> usize {
    let Some(faq) = headings.iter().find(|h| is_faq_heading(&h.text)) else {
        return 0;
    };

    let bold_questions = section_lines(body, headings, is_faq_heading)
        .iter()
        .filter(|l| {
            let t = l.trim();
            t.starts_with("**") && t.ends_with("**") && t.len() > 4
        })
        .count();

    if bold_questions > 0 {
        return bold_questions;
    }

    // Fallback: sub-headings between the FAQ heading and the next heading
    // at the FAQ level or above.
    let mut count = 0;
    let mut in_section = false;
    for h in headings {
        if in_section {
            if h.level <= faq.level {
                break;
            }
            count += 1;
        } else if h.level == faq.level && h.text == faq.text {
            in_section = true;
        }
    }
    count
}
