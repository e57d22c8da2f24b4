//! Pre-written draft backlog.
//!
//! Editors can stage finished drafts as markdown files under the backlog
//! directory. Each batch run drains the backlog first, ordered by folder
//! priority and then filename, before asking the generation service for new
//! drafts. Files whose slug already has a PUBLISHED record are skipped.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use draftline_shared::{Document, DraftlineError, Result};

/// A backlog draft ready for the pipeline.
#[derive(Debug, Clone)]
pub struct BacklogDraft {
    pub path: PathBuf,
    pub document: Document,
}

/// Scan the backlog directory for unpublished drafts, in publish order.
///
/// Unparsable files are skipped with a warning rather than failing the run.
pub fn ingestion_queue(
    dir: &Path,
    folder_priority: &[String],
    published_slugs: &HashSet<String>,
) -> Result<Vec<BacklogDraft>> {
    if !dir.is_dir() {
        warn!(dir = %dir.display(), "backlog directory not found");
        return Ok(Vec::new());
    }

    let mut files = collect_markdown_files(dir)?;
    files.sort_by_key(|path| {
        let parent = path
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let priority = folder_priority
            .iter()
            .position(|f| *f == parent)
            .unwrap_or(usize::MAX);
        (priority, parent, path.file_name().map(|n| n.to_owned()))
    });

    let mut queue = Vec::new();
    for path in files {
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable draft, skipping");
                continue;
            }
        };

        let mut document = match Document::parse(&raw) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unparsable draft, skipping");
                continue;
            }
        };

        // Drafts without an explicit slug take one from the filename.
        if document.frontmatter.slug.is_empty() {
            document.frontmatter.slug = slug_from_stem(&path);
        }

        if published_slugs.contains(&document.frontmatter.slug) {
            debug!(
                slug = %document.frontmatter.slug,
                path = %path.display(),
                "already published, skipping"
            );
            continue;
        }

        queue.push(BacklogDraft { path, document });
    }

    info!(
        dir = %dir.display(),
        queued = queue.len(),
        "backlog scanned"
    );
    Ok(queue)
}

/// Recursively collect `.md` files under a directory.
fn collect_markdown_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let entries = std::fs::read_dir(dir).map_err(|e| DraftlineError::io(dir, e))?;

    for entry in entries {
        let entry = entry.map_err(|e| DraftlineError::io(dir, e))?;
        let path = entry.path();
        if path.is_dir() {
            files.extend(collect_markdown_files(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "md") {
            files.push(path);
        }
    }
    Ok(files)
}

/// Derive a path-safe slug from a file stem.
fn slug_from_stem(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    let mut slug = String::with_capacity(stem.len());
    let mut last_dash = true;
    for c in stem.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    slug.trim_end_matches('-').to_string()
}
