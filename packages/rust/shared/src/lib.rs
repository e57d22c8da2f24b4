//! Shared types, error model, and configuration for Draftline.
//!
//! This crate is the foundation depended on by all other Draftline crates.
//! It provides:
//! - [`DraftlineError`] — the unified error type
//! - Domain types ([`Document`], [`ValidationReport`], [`PublishRecord`],
//!   [`RedirectEntry`], [`EngagementCandidate`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BatchConfig, CmsConfig, ForumEntry, GenerationConfig, ImageConfig, MonitorConfig,
    SiteConfig, config_dir, config_file_path, init_config, load_config, load_config_from,
    validate_cms_credentials,
};
pub use error::{DraftlineError, Result};
pub use types::{
    Document, EngagementCandidate, Frontmatter, PublishRecord, PublishStatus, RedirectEntry,
    Severity, ValidationReport, Violation,
};
