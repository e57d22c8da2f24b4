//! libSQL storage layer for pipeline state.
//!
//! The [`Storage`] struct wraps a local libSQL database holding publish
//! records, the redirect registry, the engagement ledger/candidate queue,
//! and run history. The batch pipeline and the forum monitor are the only
//! writers; redirect mutations additionally funnel through a single writer
//! task in `draftline-core`.

mod migrations;

use std::collections::{HashMap, HashSet};
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use libsql::{Connection, Database, params};
use uuid::Uuid;

use draftline_shared::{
    DraftlineError, EngagementCandidate, PublishRecord, PublishStatus, RedirectEntry, Result,
};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl Storage {
    /// Open or create a database at `path` and apply pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DraftlineError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DraftlineError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| DraftlineError::Storage(e.to_string()))?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    DraftlineError::Storage(format!(
                        "migration v{} failed: {e}",
                        migration.version
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Publish records
    // -----------------------------------------------------------------------

    /// Get the publish record for a slug.
    pub async fn get_publish_record(&self, slug: &str) -> Result<Option<PublishRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT slug, remote_id, content_hash, status, last_published_at
                 FROM publish_records WHERE slug = ?1",
                params![slug],
            )
            .await
            .map_err(|e| DraftlineError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_publish_record(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DraftlineError::Storage(e.to_string())),
        }
    }

    /// Insert or update the record for a slug. `pillar` feeds the
    /// pillar-balance topic selection; it never changes once set.
    pub async fn upsert_publish_record(
        &self,
        record: &PublishRecord,
        pillar: &str,
    ) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO publish_records (slug, remote_id, content_hash, status, pillar, last_published_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(slug) DO UPDATE SET
                   remote_id = excluded.remote_id,
                   content_hash = excluded.content_hash,
                   status = excluded.status,
                   last_published_at = excluded.last_published_at",
                params![
                    record.slug.as_str(),
                    record.remote_id,
                    record.content_hash.as_str(),
                    record.status.as_str(),
                    pillar,
                    record.last_published_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DraftlineError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Slugs with a PUBLISHED record.
    pub async fn published_slugs(&self) -> Result<HashSet<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT slug FROM publish_records WHERE status = 'PUBLISHED'",
                params![],
            )
            .await
            .map_err(|e| DraftlineError::Storage(e.to_string()))?;

        let mut slugs = HashSet::new();
        while let Ok(Some(row)) = rows.next().await {
            slugs.insert(
                row.get::<String>(0)
                    .map_err(|e| DraftlineError::Storage(e.to_string()))?,
            );
        }
        Ok(slugs)
    }

    /// Count of PUBLISHED records per pillar, for balance tracking.
    pub async fn pillar_counts(&self) -> Result<HashMap<String, i64>> {
        let mut rows = self
            .conn
            .query(
                "SELECT pillar, COUNT(*) FROM publish_records
                 WHERE status = 'PUBLISHED' AND pillar IS NOT NULL
                 GROUP BY pillar",
                params![],
            )
            .await
            .map_err(|e| DraftlineError::Storage(e.to_string()))?;

        let mut counts = HashMap::new();
        while let Ok(Some(row)) = rows.next().await {
            let pillar: String = row
                .get(0)
                .map_err(|e| DraftlineError::Storage(e.to_string()))?;
            let count: i64 = row
                .get(1)
                .map_err(|e| DraftlineError::Storage(e.to_string()))?;
            counts.insert(pillar, count);
        }
        Ok(counts)
    }

    // -----------------------------------------------------------------------
    // Redirect registry
    // -----------------------------------------------------------------------

    /// Seed the redirect registry from the static map. Existing rows are
    /// left untouched so a retired redirect is never resurrected.
    pub async fn seed_redirects(&self, entries: &[(String, String)]) -> Result<usize> {
        let now = Utc::now().to_rfc3339();
        let mut inserted = 0usize;
        for (source, target) in entries {
            let affected = self
                .conn
                .execute(
                    "INSERT OR IGNORE INTO redirect_entries (source_path, target_path, active, updated_at)
                     VALUES (?1, ?2, 1, ?3)",
                    params![source.as_str(), target.as_str(), now.as_str()],
                )
                .await
                .map_err(|e| DraftlineError::Storage(e.to_string()))?;
            inserted += affected as usize;
        }
        Ok(inserted)
    }

    /// Get a redirect entry by source path.
    pub async fn get_redirect(&self, source_path: &str) -> Result<Option<RedirectEntry>> {
        let mut rows = self
            .conn
            .query(
                "SELECT source_path, target_path, active, updated_at
                 FROM redirect_entries WHERE source_path = ?1",
                params![source_path],
            )
            .await
            .map_err(|e| DraftlineError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_redirect(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DraftlineError::Storage(e.to_string())),
        }
    }

    /// Deactivate the redirect(s) whose source path serves the given slug.
    /// Idempotent: already-inactive rows are not rewritten. Returns the
    /// number of rows deactivated.
    pub async fn deactivate_redirects_for_slug(&self, slug: &str) -> Result<usize> {
        let pattern = format!("%/{slug}/");
        let now = Utc::now().to_rfc3339();
        let affected = self
            .conn
            .execute(
                "UPDATE redirect_entries SET active = 0, updated_at = ?1
                 WHERE active = 1 AND source_path LIKE ?2",
                params![now.as_str(), pattern.as_str()],
            )
            .await
            .map_err(|e| DraftlineError::Storage(e.to_string()))?;
        Ok(affected as usize)
    }

    /// All redirect entries, active first.
    pub async fn list_redirects(&self) -> Result<Vec<RedirectEntry>> {
        let mut rows = self
            .conn
            .query(
                "SELECT source_path, target_path, active, updated_at
                 FROM redirect_entries ORDER BY active DESC, source_path",
                params![],
            )
            .await
            .map_err(|e| DraftlineError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_redirect(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Engagement ledger & candidates
    // -----------------------------------------------------------------------

    /// Drop ledger entries older than the TTL; expired threads become
    /// eligible for re-emission.
    pub async fn purge_expired_ledger(&self, now: DateTime<Utc>, ttl_days: u32) -> Result<usize> {
        let cutoff = (now - Duration::days(ttl_days as i64)).to_rfc3339();
        let affected = self
            .conn
            .execute(
                "DELETE FROM engagement_ledger WHERE recorded_at < ?1",
                params![cutoff.as_str()],
            )
            .await
            .map_err(|e| DraftlineError::Storage(e.to_string()))?;
        Ok(affected as usize)
    }

    /// Thread ids currently held in the ledger (within TTL).
    pub async fn ledgered_thread_ids(
        &self,
        now: DateTime<Utc>,
        ttl_days: u32,
    ) -> Result<HashSet<String>> {
        let cutoff = (now - Duration::days(ttl_days as i64)).to_rfc3339();
        let mut rows = self
            .conn
            .query(
                "SELECT thread_id FROM engagement_ledger WHERE recorded_at >= ?1",
                params![cutoff.as_str()],
            )
            .await
            .map_err(|e| DraftlineError::Storage(e.to_string()))?;

        let mut ids = HashSet::new();
        while let Ok(Some(row)) = rows.next().await {
            ids.insert(
                row.get::<String>(0)
                    .map_err(|e| DraftlineError::Storage(e.to_string()))?,
            );
        }
        Ok(ids)
    }

    /// Record a thread into the ledger. Returns false when another run got
    /// there first; the caller must not emit the candidate in that case.
    pub async fn try_record_thread(
        &self,
        thread_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let affected = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO engagement_ledger (thread_id, recorded_at) VALUES (?1, ?2)",
                params![thread_id, now.to_rfc3339()],
            )
            .await
            .map_err(|e| DraftlineError::Storage(e.to_string()))?;
        Ok(affected > 0)
    }

    /// Append an emitted candidate to the outbound queue.
    pub async fn insert_candidate(&self, candidate: &EngagementCandidate) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO engagement_candidates
                 (thread_id, forum, title, url, score, discovered_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    candidate.thread_id.as_str(),
                    candidate.forum.as_str(),
                    candidate.title.as_str(),
                    candidate.url.as_str(),
                    candidate.score,
                    candidate.discovered_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DraftlineError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Most recent candidates, newest first.
    pub async fn list_candidates(&self, limit: u32) -> Result<Vec<EngagementCandidate>> {
        let mut rows = self
            .conn
            .query(
                "SELECT thread_id, forum, title, url, score, discovered_at
                 FROM engagement_candidates ORDER BY discovered_at DESC LIMIT ?1",
                params![limit as i64],
            )
            .await
            .map_err(|e| DraftlineError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(EngagementCandidate {
                thread_id: row
                    .get::<String>(0)
                    .map_err(|e| DraftlineError::Storage(e.to_string()))?,
                forum: row
                    .get::<String>(1)
                    .map_err(|e| DraftlineError::Storage(e.to_string()))?,
                title: row
                    .get::<String>(2)
                    .map_err(|e| DraftlineError::Storage(e.to_string()))?,
                url: row
                    .get::<String>(3)
                    .map_err(|e| DraftlineError::Storage(e.to_string()))?,
                score: row
                    .get::<i64>(4)
                    .map_err(|e| DraftlineError::Storage(e.to_string()))?,
                discovered_at: parse_timestamp(&row, 5)?,
            });
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Run history (idempotent trigger)
    // -----------------------------------------------------------------------

    /// Claim a run for `(kind, period_key)`. Returns the run id, or `None`
    /// when the period has already been claimed (the trigger is re-entrant).
    pub async fn try_begin_run(&self, kind: &str, period_key: &str) -> Result<Option<String>> {
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        let affected = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO runs (id, kind, period_key, started_at) VALUES (?1, ?2, ?3, ?4)",
                params![id.as_str(), kind, period_key, now.as_str()],
            )
            .await
            .map_err(|e| DraftlineError::Storage(e.to_string()))?;

        Ok((affected > 0).then_some(id))
    }

    /// Mark a run finished with its summary.
    pub async fn finish_run(&self, run_id: &str, summary_json: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE runs SET finished_at = ?1, summary_json = ?2 WHERE id = ?3",
                params![now.as_str(), summary_json, run_id],
            )
            .await
            .map_err(|e| DraftlineError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Summary JSON of the latest finished run of a kind.
    pub async fn last_run_summary(&self, kind: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT summary_json FROM runs
                 WHERE kind = ?1 AND summary_json IS NOT NULL
                 ORDER BY started_at DESC LIMIT 1",
                params![kind],
            )
            .await
            .map_err(|e| DraftlineError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(row.get::<String>(0).ok()),
            Ok(None) => Ok(None),
            Err(e) => Err(DraftlineError::Storage(e.to_string())),
        }
    }
}

/// Convert a database row to a [`PublishRecord`].
fn row_to_publish_record(row: &libsql::Row) -> Result<PublishRecord> {
    let status_str: String = row
        .get(3)
        .map_err(|e| DraftlineError::Storage(e.to_string()))?;
    Ok(PublishRecord {
        slug: row
            .get::<String>(0)
            .map_err(|e| DraftlineError::Storage(e.to_string()))?,
        remote_id: row
            .get::<i64>(1)
            .map_err(|e| DraftlineError::Storage(e.to_string()))?,
        content_hash: row
            .get::<String>(2)
            .map_err(|e| DraftlineError::Storage(e.to_string()))?,
        status: status_str
            .parse()
            .map_err(|e: String| DraftlineError::Storage(e))?,
        last_published_at: parse_timestamp(row, 4)?,
    })
}

/// Convert a database row to a [`RedirectEntry`].
fn row_to_redirect(row: &libsql::Row) -> Result<RedirectEntry> {
    Ok(RedirectEntry {
        source_path: row
            .get::<String>(0)
            .map_err(|e| DraftlineError::Storage(e.to_string()))?,
        target_path: row
            .get::<String>(1)
            .map_err(|e| DraftlineError::Storage(e.to_string()))?,
        active: row
            .get::<i64>(2)
            .map_err(|e| DraftlineError::Storage(e.to_string()))?
            != 0,
        updated_at: parse_timestamp(row, 3)?,
    })
}

fn parse_timestamp(row: &libsql::Row, idx: i32) -> Result<DateTime<Utc>> {
    let s: String = row
        .get(idx)
        .map_err(|e| DraftlineError::Storage(e.to_string()))?;
    chrono::DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DraftlineError::Storage(format!("invalid date: {e}")))
}
