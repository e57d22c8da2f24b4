//! Pipeline orchestration for Draftline.
//!
//! Wires the leaf crates together: the batch pipeline (validate → resolve →
//! attach → publish → redirect sync), the generation service client, the
//! draft backlog, and the redirect registry's single writer.

pub mod backlog;
pub mod generation;
pub mod pipeline;
pub mod redirect;

pub use generation::{GenerationClient, GenerationRequest};
pub use pipeline::{BatchContext, ItemReport, ItemStatus, RunSummary, run_batch};
pub use redirect::{PublishedEvent, load_redirect_seed, spawn_redirect_writer};
