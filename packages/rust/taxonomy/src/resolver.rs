//! Internal link resolution.
//!
//! Draft bodies carry placeholder macros of the form `[[anchor -> role]]`
//! where the role is `pillar`, `sibling`, `cross-pillar`, or an explicit
//! site path. Resolution substitutes each macro with a concrete markdown
//! link drawn from the taxonomy and then checks that every required role is
//! represented at least once.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use draftline_shared::{Document, DraftlineError, Result, Severity, Violation};

use crate::Taxonomy;

static MACRO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\[([^\[\]]+?)\s*->\s*([^\[\]]+?)\]\]").expect("valid regex")
});

/// Outcome of link resolution: the substituted body plus any non-blocking
/// warnings (e.g. a sibling falling back to the pillar page).
#[derive(Debug, Clone)]
pub struct ResolvedLinks {
    pub body: String,
    pub warnings: Vec<Violation>,
}

/// Resolve every link macro in the document body.
///
/// Fails with a `LinkResolution` error when a role cannot be resolved or a
/// required role is absent after substitution. A slug missing from the
/// taxonomy entirely is a `Config` error: the item is misconfigured, not
/// malformed.
pub fn resolve_links(doc: &Document, taxonomy: &Taxonomy) -> Result<ResolvedLinks> {
    let slug = doc.frontmatter.slug.as_str();
    let entry = taxonomy.get(slug).ok_or_else(|| {
        DraftlineError::config(format!("slug '{slug}' has no taxonomy entry"))
    })?;

    let mut body = String::with_capacity(doc.body.len());
    let mut warnings = Vec::new();
    let mut pillar_links = 0usize;
    let mut sibling_links = 0usize;
    let mut cross_links = 0usize;
    let mut last_end = 0usize;

    for caps in MACRO_RE.captures_iter(&doc.body) {
        let whole = caps.get(0).expect("match");
        let anchor = caps[1].trim();
        let role = caps[2].trim();

        body.push_str(&doc.body[last_end..whole.start()]);
        last_end = whole.end();

        let target = match role {
            "pillar" => {
                pillar_links += 1;
                entry.pillar_path()
            }
            "sibling" => match taxonomy.sibling_of(entry) {
                Some(sibling) => {
                    sibling_links += 1;
                    sibling.page_path()
                }
                None => {
                    // Single-member cluster: fall back to the pillar page
                    // rather than failing the whole item.
                    warn!(slug, cluster = %entry.cluster, "no sibling in cluster, linking pillar");
                    warnings.push(Violation::new(
                        "links/sibling-fallback",
                        Severity::Warning,
                        format!(
                            "cluster '{}' has a single member, sibling link falls back to the pillar page",
                            entry.cluster
                        ),
                    ));
                    sibling_links += 1;
                    entry.pillar_path()
                }
            },
            "cross-pillar" => match taxonomy.cross_pillar_of(entry) {
                Some(cross) => {
                    cross_links += 1;
                    cross.page_path()
                }
                None => {
                    return Err(DraftlineError::link(format!(
                        "no entry outside pillar '{}' to satisfy a cross-pillar link",
                        entry.pillar
                    )));
                }
            },
            explicit if explicit.starts_with('/') => explicit.to_string(),
            other => {
                return Err(DraftlineError::link(format!(
                    "unknown link role '{other}' for anchor '{anchor}'"
                )));
            }
        };

        body.push_str(&format!("[{anchor}]({target})"));
    }
    body.push_str(&doc.body[last_end..]);

    if pillar_links == 0 || sibling_links == 0 || cross_links == 0 {
        return Err(DraftlineError::link(format!(
            "required link roles missing after resolution (pillar: {pillar_links}, sibling: {sibling_links}, cross-pillar: {cross_links})"
        )));
    }

    debug!(
        slug,
        pillar_links, sibling_links, cross_links,
        warnings = warnings.len(),
        "links resolved"
    );

    Ok(ResolvedLinks { body, warnings })
}
