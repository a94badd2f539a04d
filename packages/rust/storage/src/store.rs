//! Store traits injected into every component that persists state.
//!
//! [`crate::Storage`] implements them over libSQL; [`crate::MemoryStore`]
//! implements them in memory for tests and dry runs.

use async_trait::async_trait;

use artemis_shared::{FrontierEntry, FrontierStatus, HarvestedPage, NewFrontierEntry, Result};

/// Result of an atomic pivot on a failing frontier entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PivotOutcome {
    /// Entry marked `dead-end`; this sibling was queued at maximum priority.
    Promoted(String),
    /// Entry marked `dead-end`; no pending sibling shares its origin.
    NoSibling,
    /// Entry was already `dead-end`. Nothing changed.
    AlreadyDead,
    /// No entry with that URL exists. Nothing changed.
    UnknownEntry,
}

impl PivotOutcome {
    /// The promoted URL, if any.
    pub fn promoted(&self) -> Option<&str> {
        match self {
            Self::Promoted(url) => Some(url),
            _ => None,
        }
    }
}

/// Durable table of discovered URLs.
#[async_trait]
pub trait FrontierStore: Send + Sync {
    /// Insert one row. A URL that already exists is a no-op (returns `false`).
    async fn insert_if_absent(&self, entry: &NewFrontierEntry) -> Result<bool>;

    /// Insert many rows in one transaction with conflict-is-no-op semantics.
    /// Returns the number of rows actually inserted. Any error rolls back
    /// the whole batch.
    async fn insert_batch(&self, entries: &[NewFrontierEntry]) -> Result<usize>;

    /// Atomically claim up to `limit` claimable rows (queued first, then
    /// pending; highest priority, then oldest) and mark them `scanning`.
    async fn claim_next(&self, limit: usize) -> Result<Vec<FrontierEntry>>;

    /// Overwrite the status of one row.
    async fn set_status(&self, url: &str, status: FrontierStatus) -> Result<()>;

    /// Pick one `pending` row sharing `source_origin` (never `exclude_url`),
    /// force its priority to the maximum and mark it `queued`.
    async fn promote_sibling(&self, source_origin: &str, exclude_url: &str)
    -> Result<Option<String>>;

    /// In one transaction: mark `dead_url` as `dead-end` and promote a sibling.
    /// Re-invoking on a `dead-end` entry changes nothing.
    async fn pivot(&self, dead_url: &str) -> Result<PivotOutcome>;

    async fn get_entry(&self, url: &str) -> Result<Option<FrontierEntry>>;

    /// List rows, optionally filtered by status, highest priority first.
    async fn list_entries(
        &self,
        status: Option<FrontierStatus>,
        limit: usize,
    ) -> Result<Vec<FrontierEntry>>;
}

/// Persistent log of harvested pages and harvest jobs.
#[async_trait]
pub trait HarvestLog: Send + Sync {
    /// Upsert every page (keyed by URL, latest write wins) in one
    /// transaction. Returns the row count only on commit.
    async fn ingest(&self, pages: &[HarvestedPage], job_id: Option<&str>) -> Result<usize>;

    async fn get_harvest(&self, url: &str) -> Result<Option<HarvestedPage>>;

    async fn count_harvests(&self) -> Result<usize>;

    /// Open a job row for a harvest of `url`. Returns the job ID.
    async fn begin_job(&self, url: &str) -> Result<String>;

    /// Close a job row with its final stats.
    async fn finish_job(&self, job_id: &str, stats_json: &str) -> Result<()>;
}
