//! Redirect registry synchronization.
//!
//! Placeholder redirects are seeded from a static TOML map at startup.
//! When a slug reaches PUBLISHED the orchestrator sends an event to the
//! single writer task owned here, which retires the matching redirect.
//! Serializing every mutation through one writer avoids lost updates when
//! multiple items publish concurrently; the serving layer may keep honoring
//! a retired redirect until its next reload, which is accepted.

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use draftline_shared::{DraftlineError, Result};
use draftline_storage::Storage;

/// Announcement that a slug transitioned to PUBLISHED.
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub slug: String,
}

/// TOML file shape: a list of `[[redirect]]` tables.
#[derive(Debug, Deserialize)]
struct RedirectFile {
    #[serde(default)]
    redirect: Vec<RedirectSeed>,
}

#[derive(Debug, Deserialize)]
struct RedirectSeed {
    source_path: String,
    target_path: String,
}

/// Load the static redirect map. A missing file means no placeholder
/// redirects were deployed, which is fine.
pub fn load_redirect_seed(path: &Path) -> Result<Vec<(String, String)>> {
    if !path.exists() {
        warn!(path = %path.display(), "redirect map not found, registry starts empty");
        return Ok(Vec::new());
    }

    let content = std::fs::read_to_string(path).map_err(|e| DraftlineError::io(path, e))?;
    let file: RedirectFile = toml::from_str(&content).map_err(|e| {
        DraftlineError::config(format!("redirect map {}: {e}", path.display()))
    })?;

    Ok(file
        .redirect
        .into_iter()
        .map(|r| (r.source_path, r.target_path))
        .collect())
}

/// Spawn the single redirect writer.
///
/// The returned sender fans in PUBLISHED events from every batch worker;
/// dropping the last sender ends the task. Await the handle before
/// finalizing a run so every deactivation has landed.
pub fn spawn_redirect_writer(
    storage: Arc<Storage>,
) -> (mpsc::Sender<PublishedEvent>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<PublishedEvent>(64);

    let handle = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match storage.deactivate_redirects_for_slug(&event.slug).await {
                Ok(0) => {
                    // No placeholder for this slug; nothing to retire.
                }
                Ok(n) => {
                    info!(slug = %event.slug, retired = n, "redirect retired");
                }
                Err(e) => {
                    error!(slug = %event.slug, error = %e, "redirect update failed");
                }
            }
        }
    });

    (tx, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    async fn test_storage() -> Arc<Storage> {
        let tmp = std::env::temp_dir().join(format!("dl_redir_test_{}.db", Uuid::now_v7()));
        Arc::new(Storage::open(&tmp).await.expect("open test db"))
    }

    #[test]
    fn seed_file_parses() {
        let dir = std::env::temp_dir().join(format!("dl_seed_{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("redirects.toml");
        std::fs::write(
            &path,
            r#"
[[redirect]]
source_path = "/strategy/planning/quota-design/"
target_path = "/strategy/"
"#,
        )
        .unwrap();

        let seed = load_redirect_seed(&path).expect("load");
        assert_eq!(seed.len(), 1);
        assert_eq!(seed[0].0, "/strategy/planning/quota-design/");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_seed_file_is_empty() {
        let path = std::env::temp_dir().join("dl_no_such_redirects.toml");
        assert!(load_redirect_seed(&path).unwrap().is_empty());
    }

    #[tokio::test]
    async fn writer_retires_redirects_serially() {
        let storage = test_storage().await;
        storage
            .seed_redirects(&[
                ("/strategy/planning/quota-design/".to_string(), "/strategy/".to_string()),
                ("/people/hiring/comp-plans/".to_string(), "/people/".to_string()),
            ])
            .await
            .unwrap();

        let (tx, handle) = spawn_redirect_writer(storage.clone());
        tx.send(PublishedEvent { slug: "quota-design".into() }).await.unwrap();
        tx.send(PublishedEvent { slug: "comp-plans".into() }).await.unwrap();
        // Unknown slug: no placeholder, writer keeps going.
        tx.send(PublishedEvent { slug: "no-redirect".into() }).await.unwrap();
        drop(tx);
        handle.await.unwrap();

        let redirects = storage.list_redirects().await.unwrap();
        assert!(redirects.iter().all(|r| !r.active));
    }
}
