//! Static content taxonomy: pillar → cluster → slug, with keyword sets.
//!
//! The taxonomy table is externally maintained TOML, loaded once at process
//! start and immutable for the run. It feeds the link resolver (this crate)
//! and the forum monitor's keyword scoring.

mod resolver;

pub use resolver::{ResolvedLinks, resolve_links};

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use draftline_shared::{DraftlineError, Result};

/// One taxonomy row: a slug positioned in the pillar/cluster/function
/// hierarchy with its keyword set.
#[derive(Debug, Clone, Deserialize)]
pub struct TaxonomyEntry {
    pub slug: String,
    #[serde(default)]
    pub title: String,
    pub pillar: String,
    pub cluster: String,
    #[serde(default)]
    pub function: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl TaxonomyEntry {
    /// Site path of the pillar landing page.
    pub fn pillar_path(&self) -> String {
        format!("/{}/", self.pillar)
    }

    /// Site path of this entry's own page.
    pub fn page_path(&self) -> String {
        format!("/{}/{}/{}/", self.pillar, self.cluster, self.slug)
    }
}

/// TOML file shape: a list of `[[entry]]` tables.
#[derive(Debug, Deserialize)]
struct TaxonomyFile {
    #[serde(default)]
    entry: Vec<TaxonomyEntry>,
}

/// The loaded taxonomy table, indexed by slug. Read-only after load.
#[derive(Debug, Clone)]
pub struct Taxonomy {
    entries: Vec<TaxonomyEntry>,
    by_slug: HashMap<String, usize>,
}

impl Taxonomy {
    /// Build a taxonomy from entries (order is preserved and used for
    /// deterministic sibling/cross-pillar selection).
    pub fn new(entries: Vec<TaxonomyEntry>) -> Self {
        let by_slug = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.slug.clone(), i))
            .collect();
        Self { entries, by_slug }
    }

    /// Load the taxonomy table from a TOML file. A missing or unparsable
    /// table is batch-fatal.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DraftlineError::config(format!("taxonomy table {}: {e}", path.display()))
        })?;
        let file: TaxonomyFile = toml::from_str(&content).map_err(|e| {
            DraftlineError::config(format!("taxonomy table {}: {e}", path.display()))
        })?;

        info!(entries = file.entry.len(), path = %path.display(), "taxonomy loaded");
        Ok(Self::new(file.entry))
    }

    pub fn entries(&self) -> &[TaxonomyEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an entry by slug.
    pub fn get(&self, slug: &str) -> Option<&TaxonomyEntry> {
        self.by_slug.get(slug).map(|&i| &self.entries[i])
    }

    /// First entry in the same pillar+cluster with a different slug,
    /// in taxonomy order.
    pub fn sibling_of(&self, entry: &TaxonomyEntry) -> Option<&TaxonomyEntry> {
        self.entries.iter().find(|e| {
            e.pillar == entry.pillar && e.cluster == entry.cluster && e.slug != entry.slug
        })
    }

    /// First entry from a different pillar, in taxonomy order.
    pub fn cross_pillar_of(&self, entry: &TaxonomyEntry) -> Option<&TaxonomyEntry> {
        self.entries.iter().find(|e| e.pillar != entry.pillar)
    }

    /// Lowercased keyword set across every entry, for forum scoring.
    pub fn keyword_set(&self) -> Vec<String> {
        let mut keywords: Vec<String> = self
            .entries
            .iter()
            .flat_map(|e| e.keywords.iter())
            .map(|k| k.to_lowercase())
            .collect();
        keywords.sort();
        keywords.dedup();
        keywords
    }
}

#[cfg(test)]
pub(crate) fn sample_taxonomy() -> Taxonomy {
    let toml_str = r#"
[[entry]]
slug = "quota-design"
title = "Quota Design"
pillar = "strategy"
cluster = "planning"
function = "Revenue Planning"
keywords = ["sales quota", "quota planning"]

[[entry]]
slug = "territory-carving"
title = "Territory Carving"
pillar = "strategy"
cluster = "planning"
keywords = ["territory design"]

[[entry]]
slug = "pipeline-reviews"
title = "Pipeline Reviews"
pillar = "process"
cluster = "cadence"
keywords = ["pipeline review"]

[[entry]]
slug = "lonely-cluster-page"
title = "Lonely"
pillar = "people"
cluster = "solo"
keywords = ["coaching"]
"#;
    let file: TaxonomyFile = toml::from_str(toml_str).expect("parse sample taxonomy");
    Taxonomy::new(file.entry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_slug() {
        let tax = sample_taxonomy();
        let entry = tax.get("quota-design").expect("entry");
        assert_eq!(entry.pillar, "strategy");
        assert_eq!(entry.page_path(), "/strategy/planning/quota-design/");
        assert_eq!(entry.pillar_path(), "/strategy/");
        assert!(tax.get("nope").is_none());
    }

    #[test]
    fn sibling_excludes_self() {
        let tax = sample_taxonomy();
        let entry = tax.get("quota-design").unwrap();
        let sibling = tax.sibling_of(entry).expect("sibling");
        assert_eq!(sibling.slug, "territory-carving");
    }

    #[test]
    fn single_member_cluster_has_no_sibling() {
        let tax = sample_taxonomy();
        let entry = tax.get("lonely-cluster-page").unwrap();
        assert!(tax.sibling_of(entry).is_none());
    }

    #[test]
    fn cross_pillar_picks_other_pillar() {
        let tax = sample_taxonomy();
        let entry = tax.get("quota-design").unwrap();
        let cross = tax.cross_pillar_of(entry).expect("cross");
        assert_ne!(cross.pillar, "strategy");
    }

    #[test]
    fn keyword_set_is_sorted_and_deduped() {
        let tax = sample_taxonomy();
        let kws = tax.keyword_set();
        assert!(kws.contains(&"sales quota".to_string()));
        let mut sorted = kws.clone();
        sorted.sort();
        assert_eq!(kws, sorted);
    }
}
