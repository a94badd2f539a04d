//! SQL migration definitions for the Artemis database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed as one batch.

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
        description: "Initial schema: frontier, harvests, harvest_jobs",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Discovered URLs awaiting or past harvest. Rows are never deleted.
CREATE TABLE IF NOT EXISTS frontier (
    url            TEXT PRIMARY KEY,
    priority_score INTEGER NOT NULL DEFAULT 1 CHECK (priority_score >= 0),
    status         TEXT NOT NULL DEFAULT 'pending',
    source_origin  TEXT NOT NULL,
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_frontier_claim ON frontier(status, priority_score DESC, created_at);
CREATE INDEX IF NOT EXISTS idx_frontier_origin ON frontier(source_origin, status);

-- One run of the harvester over a claimed frontier entry
CREATE TABLE IF NOT EXISTS harvest_jobs (
    id          TEXT PRIMARY KEY,
    url         TEXT NOT NULL,
    started_at  TEXT NOT NULL,
    finished_at TEXT,
    stats_json  TEXT
);

CREATE INDEX IF NOT EXISTS idx_harvest_jobs_url ON harvest_jobs(url);

-- Harvest log: latest projection of each harvested page
CREATE TABLE IF NOT EXISTS harvests (
    url          TEXT PRIMARY KEY,
    title        TEXT NOT NULL,
    description  TEXT NOT NULL,
    emails_json  TEXT NOT NULL,
    flaws_json   TEXT NOT NULL,
    enrichment   TEXT,
    depth        INTEGER NOT NULL,
    captured_at  TEXT NOT NULL,
    job_id       TEXT,
    status       TEXT NOT NULL DEFAULT 'complete',
    updated_at   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_harvests_job ON harvests(job_id);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
