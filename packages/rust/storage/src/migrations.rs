//! SQL migration definitions for the Draftline database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed within a transaction.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: publish_records, redirect_entries, engagement ledger/candidates, runs",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per slug; the slug key guarantees at most one PUBLISHED
-- record per slug. Rows are updated in place, never deleted.
CREATE TABLE IF NOT EXISTS publish_records (
    slug              TEXT PRIMARY KEY,
    remote_id         INTEGER NOT NULL,
    content_hash      TEXT NOT NULL,
    status            TEXT NOT NULL,
    pillar            TEXT,
    last_published_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_publish_records_status ON publish_records(status);

-- Placeholder redirects, seeded from the static map at startup and
-- deactivated (once, permanently) as pages go live.
CREATE TABLE IF NOT EXISTS redirect_entries (
    source_path TEXT PRIMARY KEY,
    target_path TEXT NOT NULL,
    active      INTEGER NOT NULL DEFAULT 1,
    updated_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_redirect_entries_active ON redirect_entries(active);

-- Emission ledger: a thread_id present here (within TTL) is never
-- re-emitted. The primary key is the optimistic-concurrency point for
-- overlapping monitor runs.
CREATE TABLE IF NOT EXISTS engagement_ledger (
    thread_id   TEXT PRIMARY KEY,
    recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_ledger_recorded_at ON engagement_ledger(recorded_at);

-- Emitted candidates, consumed by the external action queue.
CREATE TABLE IF NOT EXISTS engagement_candidates (
    thread_id     TEXT PRIMARY KEY,
    forum         TEXT NOT NULL,
    title         TEXT NOT NULL,
    url           TEXT NOT NULL,
    score         INTEGER NOT NULL,
    discovered_at TEXT NOT NULL
);

-- Run history. The (kind, period_key) uniqueness backs the idempotent
-- trigger: a period that already ran is skipped.
CREATE TABLE IF NOT EXISTS runs (
    id           TEXT PRIMARY KEY,
    kind         TEXT NOT NULL,
    period_key   TEXT NOT NULL,
    started_at   TEXT NOT NULL,
    finished_at  TEXT,
    summary_json TEXT,
    UNIQUE(kind, period_key)
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
