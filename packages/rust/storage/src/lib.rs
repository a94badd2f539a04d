//! libSQL storage layer for the frontier and the harvest log.
//!
//! The [`Storage`] struct wraps a local libSQL database and implements
//! [`FrontierStore`] and [`HarvestLog`]. [`MemoryStore`] implements the same
//! traits without a database.
//!
//! **Access rules:**
//! - One read-write handle per process via [`Storage::open`]; writes are
//!   serialized through an internal lock so transactions never interleave
//!   on the shared connection.
//! - Inspection tools open via [`Storage::open_readonly`].

mod memory;
mod migrations;
mod store;

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database, Transaction, params};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use artemis_shared::{
    ArtemisError, FrontierEntry, FrontierStatus, HarvestedPage, NewFrontierEntry, PRIORITY_MAX,
    Result,
};

pub use memory::MemoryStore;
pub use store::{FrontierStore, HarvestLog, PivotOutcome};

const FRONTIER_COLUMNS: &str =
    "url, priority_score, status, source_origin, created_at, updated_at";

const INSERT_FRONTIER_SQL: &str = "INSERT INTO frontier (url, priority_score, status, source_origin, created_at, updated_at)
     VALUES (?1, ?2, 'pending', ?3, ?4, ?4)
     ON CONFLICT(url) DO NOTHING";

const PROMOTE_SIBLING_SQL: &str = "UPDATE frontier SET priority_score = ?1, status = 'queued', updated_at = ?2
     WHERE url = (
         SELECT url FROM frontier
         WHERE status = 'pending' AND source_origin = ?3 AND url != ?4
         ORDER BY priority_score DESC, created_at
         LIMIT 1
     )
     RETURNING url";

const UPSERT_HARVEST_SQL: &str = "INSERT INTO harvests (url, title, description, emails_json, flaws_json, enrichment,
                           depth, captured_at, job_id, status, updated_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'complete', ?10)
     ON CONFLICT(url) DO UPDATE SET
       title = excluded.title,
       description = excluded.description,
       emails_json = excluded.emails_json,
       flaws_json = excluded.flaws_json,
       enrichment = excluded.enrichment,
       depth = excluded.depth,
       captured_at = excluded.captured_at,
       job_id = excluded.job_id,
       updated_at = excluded.updated_at";

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
    write_lock: Mutex<()>,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ArtemisError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;

        let conn = db.connect().map_err(db_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
            write_lock: Mutex::new(()),
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open a database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;

        let conn = db.connect().map_err(db_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
            write_lock: Mutex::new(()),
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    ArtemisError::Storage(format!("migration v{} failed: {e}", migration.version))
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

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(ArtemisError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Frontier operations
// ---------------------------------------------------------------------------

#[async_trait]
impl FrontierStore for Storage {
    async fn insert_if_absent(&self, entry: &NewFrontierEntry) -> Result<bool> {
        self.check_writable()?;
        let _guard = self.write_lock.lock().await;
        let now = Utc::now().to_rfc3339();
        let changed = self
            .conn
            .execute(
                INSERT_FRONTIER_SQL,
                params![
                    entry.url.as_str(),
                    i64::from(entry.priority_score),
                    entry.source_origin.as_str(),
                    now.as_str()
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(changed > 0)
    }

    #[instrument(skip_all, fields(rows = entries.len()))]
    async fn insert_batch(&self, entries: &[NewFrontierEntry]) -> Result<usize> {
        self.check_writable()?;
        if entries.is_empty() {
            return Ok(0);
        }
        let _guard = self.write_lock.lock().await;
        let now = Utc::now().to_rfc3339();

        let tx = self.conn.transaction().await.map_err(db_err)?;
        let result = insert_batch_in(&tx, entries, &now).await;
        let inserted = settle_tx(tx, result).await?;

        debug!(inserted, "frontier batch committed");
        Ok(inserted)
    }

    async fn claim_next(&self, limit: usize) -> Result<Vec<FrontierEntry>> {
        self.check_writable()?;
        let _guard = self.write_lock.lock().await;
        let now = Utc::now().to_rfc3339();

        let tx = self.conn.transaction().await.map_err(db_err)?;
        let result = claim_in(&tx, limit, &now).await;
        settle_tx(tx, result).await
    }

    async fn set_status(&self, url: &str, status: FrontierStatus) -> Result<()> {
        self.check_writable()?;
        let _guard = self.write_lock.lock().await;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE frontier SET status = ?1, updated_at = ?2 WHERE url = ?3",
                params![status.as_str(), now.as_str(), url],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn promote_sibling(
        &self,
        source_origin: &str,
        exclude_url: &str,
    ) -> Result<Option<String>> {
        self.check_writable()?;
        let _guard = self.write_lock.lock().await;
        let now = Utc::now().to_rfc3339();
        promote_in(&self.conn, source_origin, exclude_url, &now).await
    }

    #[instrument(skip(self))]
    async fn pivot(&self, dead_url: &str) -> Result<PivotOutcome> {
        self.check_writable()?;
        let _guard = self.write_lock.lock().await;
        let now = Utc::now().to_rfc3339();

        let tx = self.conn.transaction().await.map_err(db_err)?;
        let result = pivot_in(&tx, dead_url, &now).await;
        settle_tx(tx, result).await
    }

    async fn get_entry(&self, url: &str) -> Result<Option<FrontierEntry>> {
        let sql = format!("SELECT {FRONTIER_COLUMNS} FROM frontier WHERE url = ?1");
        let mut rows = self.conn.query(&sql, params![url]).await.map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(row_to_entry(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_entries(
        &self,
        status: Option<FrontierStatus>,
        limit: usize,
    ) -> Result<Vec<FrontierEntry>> {
        let mut rows = match status {
            Some(status) => {
                let sql = format!(
                    "SELECT {FRONTIER_COLUMNS} FROM frontier WHERE status = ?1
                     ORDER BY priority_score DESC, created_at LIMIT ?2"
                );
                self.conn
                    .query(&sql, params![status.as_str(), limit as i64])
                    .await
            }
            None => {
                let sql = format!(
                    "SELECT {FRONTIER_COLUMNS} FROM frontier
                     ORDER BY priority_score DESC, created_at LIMIT ?1"
                );
                self.conn.query(&sql, params![limit as i64]).await
            }
        }
        .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_entry(&row)?);
        }
        Ok(results)
    }
}

// ---------------------------------------------------------------------------
// Transaction bodies
// ---------------------------------------------------------------------------

/// Commit on `Ok`, roll back on `Err`.
async fn settle_tx<T>(tx: Transaction, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            tx.commit().await.map_err(db_err)?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                warn!(error = %rollback, "rollback failed");
            }
            Err(e)
        }
    }
}

async fn insert_batch_in(
    conn: &Connection,
    entries: &[NewFrontierEntry],
    now: &str,
) -> Result<usize> {
    let mut inserted = 0usize;
    for entry in entries {
        let changed = conn
            .execute(
                INSERT_FRONTIER_SQL,
                params![
                    entry.url.as_str(),
                    i64::from(entry.priority_score),
                    entry.source_origin.as_str(),
                    now
                ],
            )
            .await
            .map_err(db_err)?;
        inserted += changed as usize;
    }
    Ok(inserted)
}

/// Pick claimable rows in claim order, then flip each one to `scanning`.
/// The returned entries keep the claim order.
async fn claim_in(conn: &Connection, limit: usize, now: &str) -> Result<Vec<FrontierEntry>> {
    let mut urls = Vec::new();
    {
        let mut rows = conn
            .query(
                "SELECT url FROM frontier
                 WHERE status IN ('queued', 'pending')
                 ORDER BY CASE status WHEN 'queued' THEN 0 ELSE 1 END,
                          priority_score DESC, created_at
                 LIMIT ?1",
                params![limit as i64],
            )
            .await
            .map_err(db_err)?;
        while let Some(row) = rows.next().await.map_err(db_err)? {
            urls.push(row.get::<String>(0).map_err(db_err)?);
        }
    }

    let sql = format!(
        "UPDATE frontier SET status = 'scanning', updated_at = ?1
         WHERE url = ?2 AND status IN ('queued', 'pending')
         RETURNING {FRONTIER_COLUMNS}"
    );
    let mut claimed = Vec::with_capacity(urls.len());
    for url in &urls {
        let mut rows = conn
            .query(&sql, params![now, url.as_str()])
            .await
            .map_err(db_err)?;
        if let Some(row) = rows.next().await.map_err(db_err)? {
            claimed.push(row_to_entry(&row)?);
        }
    }
    Ok(claimed)
}

async fn promote_in(
    conn: &Connection,
    source_origin: &str,
    exclude_url: &str,
    now: &str,
) -> Result<Option<String>> {
    let mut rows = conn
        .query(
            PROMOTE_SIBLING_SQL,
            params![i64::from(PRIORITY_MAX), now, source_origin, exclude_url],
        )
        .await
        .map_err(db_err)?;

    match rows.next().await.map_err(db_err)? {
        Some(row) => Ok(Some(row.get::<String>(0).map_err(db_err)?)),
        None => Ok(None),
    }
}

async fn pivot_in(conn: &Connection, dead_url: &str, now: &str) -> Result<PivotOutcome> {
    let current = {
        let mut rows = conn
            .query(
                "SELECT status, source_origin FROM frontier WHERE url = ?1",
                params![dead_url],
            )
            .await
            .map_err(db_err)?;
        match rows.next().await.map_err(db_err)? {
            Some(row) => {
                let status: String = row.get(0).map_err(db_err)?;
                let origin: String = row.get(1).map_err(db_err)?;
                Some((status, origin))
            }
            None => None,
        }
    };

    let Some((status, source_origin)) = current else {
        return Ok(PivotOutcome::UnknownEntry);
    };
    if status == FrontierStatus::DeadEnd.as_str() {
        return Ok(PivotOutcome::AlreadyDead);
    }

    conn.execute(
        "UPDATE frontier SET status = 'dead-end', updated_at = ?1 WHERE url = ?2",
        params![now, dead_url],
    )
    .await
    .map_err(db_err)?;

    Ok(match promote_in(conn, &source_origin, dead_url, now).await? {
        Some(url) => PivotOutcome::Promoted(url),
        None => PivotOutcome::NoSibling,
    })
}

async fn ingest_in(
    conn: &Connection,
    pages: &[HarvestedPage],
    job_id: Option<&str>,
    now: &str,
) -> Result<usize> {
    let mut processed = 0usize;
    for page in pages {
        let emails_json = serde_json::to_string(&page.emails)
            .map_err(|e| ArtemisError::Storage(format!("encode {}: {e}", page.url)))?;
        let flaws_json = serde_json::to_string(&page.structural_flaws)
            .map_err(|e| ArtemisError::Storage(format!("encode {}: {e}", page.url)))?;

        conn.execute(
            UPSERT_HARVEST_SQL,
            params![
                page.url.as_str(),
                page.title.as_str(),
                page.description.as_str(),
                emails_json,
                flaws_json,
                page.enrichment.as_deref(),
                i64::from(page.depth),
                page.captured_at.to_rfc3339(),
                job_id,
                now
            ],
        )
        .await
        .map_err(|e| ArtemisError::Storage(format!("ingest rolled back at {}: {e}", page.url)))?;
        processed += 1;
    }
    Ok(processed)
}

// ---------------------------------------------------------------------------
// Harvest log operations
// ---------------------------------------------------------------------------

#[async_trait]
impl HarvestLog for Storage {
    #[instrument(skip_all, fields(pages = pages.len(), job_id = job_id.unwrap_or("-")))]
    async fn ingest(&self, pages: &[HarvestedPage], job_id: Option<&str>) -> Result<usize> {
        self.check_writable()?;
        if pages.is_empty() {
            return Ok(0);
        }
        let _guard = self.write_lock.lock().await;
        let now = Utc::now().to_rfc3339();

        let tx = self.conn.transaction().await.map_err(db_err)?;
        let result = ingest_in(&tx, pages, job_id, &now).await;
        let processed = settle_tx(tx, result).await?;

        info!(processed, "harvest batch ingested");
        Ok(processed)
    }

    async fn get_harvest(&self, url: &str) -> Result<Option<HarvestedPage>> {
        let mut rows = self
            .conn
            .query(
                "SELECT url, title, description, emails_json, flaws_json, enrichment, depth, captured_at
                 FROM harvests WHERE url = ?1",
                params![url],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(row_to_harvest(&row)?)),
            None => Ok(None),
        }
    }

    async fn count_harvests(&self) -> Result<usize> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM harvests", params![])
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(db_err)? as usize),
            None => Ok(0),
        }
    }

    async fn begin_job(&self, url: &str) -> Result<String> {
        self.check_writable()?;
        let _guard = self.write_lock.lock().await;
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO harvest_jobs (id, url, started_at) VALUES (?1, ?2, ?3)",
                params![id.as_str(), url, now.as_str()],
            )
            .await
            .map_err(db_err)?;
        Ok(id)
    }

    async fn finish_job(&self, job_id: &str, stats_json: &str) -> Result<()> {
        self.check_writable()?;
        let _guard = self.write_lock.lock().await;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE harvest_jobs SET finished_at = ?1, stats_json = ?2 WHERE id = ?3",
                params![now.as_str(), stats_json, job_id],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn db_err(e: libsql::Error) -> ArtemisError {
    ArtemisError::Storage(e.to_string())
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ArtemisError::Storage(format!("invalid date '{s}': {e}")))
}

/// Convert a database row to a [`FrontierEntry`].
fn row_to_entry(row: &libsql::Row) -> Result<FrontierEntry> {
    let status: String = row.get(2).map_err(db_err)?;
    Ok(FrontierEntry {
        url: row.get::<String>(0).map_err(db_err)?,
        priority_score: row.get::<i64>(1).map_err(db_err)?.max(0) as u32,
        status: status.parse().map_err(ArtemisError::Storage)?,
        source_origin: row.get::<String>(3).map_err(db_err)?,
        created_at: parse_timestamp(&row.get::<String>(4).map_err(db_err)?)?,
        updated_at: parse_timestamp(&row.get::<String>(5).map_err(db_err)?)?,
    })
}

/// Convert a database row to a [`HarvestedPage`].
fn row_to_harvest(row: &libsql::Row) -> Result<HarvestedPage> {
    let emails_json: String = row.get(3).map_err(db_err)?;
    let flaws_json: String = row.get(4).map_err(db_err)?;
    Ok(HarvestedPage {
        url: row.get::<String>(0).map_err(db_err)?,
        title: row.get::<String>(1).map_err(db_err)?,
        description: row.get::<String>(2).map_err(db_err)?,
        emails: serde_json::from_str(&emails_json)
            .map_err(|e| ArtemisError::Storage(format!("invalid emails_json: {e}")))?,
        structural_flaws: serde_json::from_str(&flaws_json)
            .map_err(|e| ArtemisError::Storage(format!("invalid flaws_json: {e}")))?,
        enrichment: row.get::<String>(5).ok(),
        depth: row.get::<i64>(6).map_err(db_err)?.max(0) as u32,
        captured_at: parse_timestamp(&row.get::<String>(7).map_err(db_err)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("artemis_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn candidate(url: &str, score: u32, origin: &str) -> NewFrontierEntry {
        NewFrontierEntry {
            url: url.into(),
            priority_score: score,
            source_origin: origin.into(),
        }
    }

    fn page(url: &str, title: &str) -> HarvestedPage {
        HarvestedPage {
            url: url.into(),
            title: title.into(),
            description: String::new(),
            emails: vec!["hello@example.com".into()],
            structural_flaws: vec!["missing-viewport".into()],
            enrichment: None,
            depth: 0,
            captured_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("artemis_test_{}.db", Uuid::now_v7()));
        let _s1 = Storage::open(&tmp).await.expect("first open");
        drop(_s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn duplicate_insert_is_noop() {
        let storage = test_storage().await;
        let entry = candidate("https://example.com/a", 3, "https://example.com/");

        assert!(storage.insert_if_absent(&entry).await.unwrap());
        assert!(!storage.insert_if_absent(&entry).await.unwrap());

        let all = storage.list_entries(None, 10).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, FrontierStatus::Pending);
        assert_eq!(all[0].priority_score, 3);
    }

    #[tokio::test]
    async fn batch_insert_counts_only_new_rows() {
        let storage = test_storage().await;
        let origin = "https://example.com/";
        storage
            .insert_if_absent(&candidate("https://example.com/a", 1, origin))
            .await
            .unwrap();

        let inserted = storage
            .insert_batch(&[
                candidate("https://example.com/a", 1, origin),
                candidate("https://example.com/b", 5, origin),
                candidate("https://example.com/c", 8, origin),
            ])
            .await
            .unwrap();
        assert_eq!(inserted, 2);
        assert_eq!(storage.list_entries(None, 10).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn claim_marks_scanning_and_never_double_claims() {
        let storage = test_storage().await;
        let origin = "https://example.com/";
        storage
            .insert_batch(&[
                candidate("https://example.com/low", 1, origin),
                candidate("https://example.com/high", 10, origin),
                candidate("https://example.com/mid", 5, origin),
            ])
            .await
            .unwrap();

        let first = storage.claim_next(2).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].url, "https://example.com/high");
        assert!(first.iter().all(|e| e.status == FrontierStatus::Scanning));

        let second = storage.claim_next(5).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].url, "https://example.com/low");

        assert!(storage.claim_next(5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn queued_entries_are_claimed_first() {
        let storage = test_storage().await;
        let origin = "https://example.com/";
        storage
            .insert_batch(&[
                candidate("https://example.com/top", 9, origin),
                candidate("https://example.com/low", 1, origin),
            ])
            .await
            .unwrap();
        storage
            .set_status("https://example.com/low", FrontierStatus::Queued)
            .await
            .unwrap();

        let claimed = storage.claim_next(1).await.unwrap();
        assert_eq!(claimed[0].url, "https://example.com/low");
    }

    #[tokio::test]
    async fn claim_orders_queued_before_priority_within_one_batch() {
        let storage = test_storage().await;
        let origin = "https://example.com/";
        storage
            .insert_batch(&[
                candidate("https://example.com/high", 10, origin),
                candidate("https://example.com/mid", 5, origin),
                candidate("https://example.com/low", 1, origin),
            ])
            .await
            .unwrap();
        storage
            .set_status("https://example.com/low", FrontierStatus::Queued)
            .await
            .unwrap();

        let claimed: Vec<String> = storage
            .claim_next(3)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.url)
            .collect();
        assert_eq!(
            claimed,
            vec![
                "https://example.com/low",
                "https://example.com/high",
                "https://example.com/mid",
            ]
        );
    }

    #[tokio::test]
    async fn concurrent_claims_never_share_an_entry() {
        let storage = std::sync::Arc::new(test_storage().await);
        let origin = "https://example.com/";
        let batch: Vec<_> = (0..20)
            .map(|i| candidate(&format!("https://example.com/{i}"), i, origin))
            .collect();
        storage.insert_batch(&batch).await.unwrap();

        let a = tokio::spawn({
            let storage = storage.clone();
            async move { storage.claim_next(15).await.unwrap() }
        });
        let b = tokio::spawn({
            let storage = storage.clone();
            async move { storage.claim_next(15).await.unwrap() }
        });
        let (a, b) = (a.await.unwrap(), b.await.unwrap());

        let mut urls: Vec<String> = a.into_iter().chain(b).map(|e| e.url).collect();
        assert_eq!(urls.len(), 20);
        urls.sort();
        urls.dedup();
        assert_eq!(urls.len(), 20);
    }

    #[tokio::test]
    async fn promote_sibling_picks_best_pending_same_origin() {
        let storage = test_storage().await;
        let origin = "https://seed.example.com/";
        storage
            .insert_batch(&[
                candidate("https://seed.example.com/excluded", 9, origin),
                candidate("https://seed.example.com/best", 7, origin),
                candidate("https://seed.example.com/weak", 2, origin),
                candidate("https://other.example.com/top", 10, "https://other.example.com/"),
            ])
            .await
            .unwrap();

        let promoted = storage
            .promote_sibling(origin, "https://seed.example.com/excluded")
            .await
            .unwrap();
        assert_eq!(promoted.as_deref(), Some("https://seed.example.com/best"));

        let best = storage
            .get_entry("https://seed.example.com/best")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(best.status, FrontierStatus::Queued);
        assert_eq!(best.priority_score, PRIORITY_MAX);

        let excluded = storage
            .get_entry("https://seed.example.com/excluded")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(excluded.status, FrontierStatus::Pending);
    }

    #[tokio::test]
    async fn promote_sibling_without_candidates_is_none() {
        let storage = test_storage().await;
        let origin = "https://seed.example.com/";
        storage
            .insert_if_absent(&candidate("https://seed.example.com/only", 3, origin))
            .await
            .unwrap();

        let promoted = storage
            .promote_sibling(origin, "https://seed.example.com/only")
            .await
            .unwrap();
        assert!(promoted.is_none());
        assert!(
            storage
                .promote_sibling("https://unknown.example.com/", "https://x.example.com/")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn ingest_failure_rolls_back_whole_batch() {
        let storage = test_storage().await;
        storage
            .conn
            .execute_batch(
                "CREATE TRIGGER reject_marker BEFORE INSERT ON harvests
                 WHEN NEW.url = 'https://bad.example/'
                 BEGIN SELECT RAISE(ABORT, 'marker row'); END;",
            )
            .await
            .unwrap();

        let result = storage
            .ingest(
                &[
                    page("https://good.example/", "Good"),
                    page("https://bad.example/", "Bad"),
                    page("https://late.example/", "Late"),
                ],
                None,
            )
            .await;
        let err = result.unwrap_err();
        assert!(err.to_string().contains("https://bad.example/"));
        assert_eq!(storage.count_harvests().await.unwrap(), 0);

        // The connection is usable again after the rollback.
        let n = storage
            .ingest(&[page("https://good.example/", "Good")], None)
            .await
            .unwrap();
        assert_eq!(n, 1);
    }

    #[tokio::test]
    async fn pivot_promotes_one_sibling() {
        let storage = test_storage().await;
        let origin = "https://seed.example.com/";
        storage
            .insert_batch(&[
                candidate("https://seed.example.com/dead", 5, origin),
                candidate("https://seed.example.com/sib", 2, origin),
                candidate("https://other.example.com/x", 9, "https://other.example.com/"),
            ])
            .await
            .unwrap();
        storage
            .set_status("https://seed.example.com/dead", FrontierStatus::Error)
            .await
            .unwrap();

        let outcome = storage.pivot("https://seed.example.com/dead").await.unwrap();
        assert_eq!(
            outcome,
            PivotOutcome::Promoted("https://seed.example.com/sib".into())
        );

        let dead = storage
            .get_entry("https://seed.example.com/dead")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(dead.status, FrontierStatus::DeadEnd);

        let sib = storage
            .get_entry("https://seed.example.com/sib")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sib.status, FrontierStatus::Queued);
        assert_eq!(sib.priority_score, PRIORITY_MAX);

        let other = storage
            .get_entry("https://other.example.com/x")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(other.status, FrontierStatus::Pending);
    }

    #[tokio::test]
    async fn pivot_is_idempotent_and_handles_missing() {
        let storage = test_storage().await;
        let origin = "https://seed.example.com/";
        storage
            .insert_batch(&[
                candidate("https://seed.example.com/dead", 5, origin),
                candidate("https://seed.example.com/s1", 2, origin),
                candidate("https://seed.example.com/s2", 2, origin),
            ])
            .await
            .unwrap();

        let first = storage.pivot("https://seed.example.com/dead").await.unwrap();
        assert!(first.promoted().is_some());

        let second = storage.pivot("https://seed.example.com/dead").await.unwrap();
        assert_eq!(second, PivotOutcome::AlreadyDead);

        let queued = storage
            .list_entries(Some(FrontierStatus::Queued), 10)
            .await
            .unwrap();
        assert_eq!(queued.len(), 1);

        let missing = storage.pivot("https://nowhere.example.com/").await.unwrap();
        assert_eq!(missing, PivotOutcome::UnknownEntry);
    }

    #[tokio::test]
    async fn pivot_without_sibling() {
        let storage = test_storage().await;
        storage
            .insert_if_absent(&candidate("https://lonely.example.com/", 1, "https://lonely.example.com/"))
            .await
            .unwrap();
        let outcome = storage.pivot("https://lonely.example.com/").await.unwrap();
        assert_eq!(outcome, PivotOutcome::NoSibling);
    }

    #[tokio::test]
    async fn ingest_upserts_latest_write() {
        let storage = test_storage().await;
        let job = storage.begin_job("https://example.com/").await.unwrap();

        let n = storage
            .ingest(
                &[page("https://example.com/", "Home"), page("https://example.com/a", "A")],
                Some(&job),
            )
            .await
            .unwrap();
        assert_eq!(n, 2);

        let n = storage
            .ingest(&[page("https://example.com/", "Home v2")], Some(&job))
            .await
            .unwrap();
        assert_eq!(n, 1);

        assert_eq!(storage.count_harvests().await.unwrap(), 2);
        let home = storage.get_harvest("https://example.com/").await.unwrap().unwrap();
        assert_eq!(home.title, "Home v2");
        assert_eq!(home.emails, vec!["hello@example.com".to_string()]);
        assert_eq!(home.structural_flaws, vec!["missing-viewport".to_string()]);

        storage
            .finish_job(&job, r#"{"pages": 2}"#)
            .await
            .expect("finish job");
    }

    #[tokio::test]
    async fn ingest_empty_batch_is_zero() {
        let storage = test_storage().await;
        assert_eq!(storage.ingest(&[], None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = std::env::temp_dir().join(format!("artemis_test_{}.db", Uuid::now_v7()));
        let rw = Storage::open(&tmp).await.unwrap();
        rw.insert_if_absent(&candidate("https://example.com/", 1, "https://example.com/"))
            .await
            .unwrap();
        drop(rw);

        let ro = Storage::open_readonly(&tmp).await.unwrap();
        assert_eq!(ro.list_entries(None, 10).await.unwrap().len(), 1);

        let result = ro
            .insert_if_absent(&candidate("https://example.com/b", 1, "https://example.com/"))
            .await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("read-only"));
    }
}
