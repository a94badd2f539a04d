//! In-memory store for tests and dry runs.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use artemis_shared::{
    FrontierEntry, FrontierStatus, HarvestedPage, NewFrontierEntry, PRIORITY_MAX, Result,
};

use crate::store::{FrontierStore, HarvestLog, PivotOutcome};

#[derive(Default)]
struct Inner {
    frontier: HashMap<String, FrontierEntry>,
    harvests: HashMap<String, HarvestedPage>,
    jobs: HashMap<String, Option<String>>,
}

/// Frontier and harvest log held behind a single async mutex.
///
/// Every operation takes the lock for its full duration, so each one is
/// atomic with respect to the others.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stats JSON recorded by [`HarvestLog::finish_job`], if the job finished.
    pub async fn job_stats(&self, job_id: &str) -> Option<String> {
        self.inner.lock().await.jobs.get(job_id).cloned().flatten()
    }
}

fn claim_order(a: &FrontierEntry, b: &FrontierEntry) -> std::cmp::Ordering {
    let rank = |s: FrontierStatus| if s == FrontierStatus::Queued { 0 } else { 1 };
    rank(a.status)
        .cmp(&rank(b.status))
        .then_with(|| b.priority_score.cmp(&a.priority_score))
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.url.cmp(&b.url))
}

fn insert_in(inner: &mut Inner, entry: &NewFrontierEntry) -> bool {
    if inner.frontier.contains_key(&entry.url) {
        return false;
    }
    let now = Utc::now();
    inner.frontier.insert(
        entry.url.clone(),
        FrontierEntry {
            url: entry.url.clone(),
            priority_score: entry.priority_score,
            status: FrontierStatus::Pending,
            source_origin: entry.source_origin.clone(),
            created_at: now,
            updated_at: now,
        },
    );
    true
}

fn promote_in(inner: &mut Inner, source_origin: &str, exclude_url: &str) -> Option<String> {
    let mut siblings: Vec<&FrontierEntry> = inner
        .frontier
        .values()
        .filter(|e| {
            e.status == FrontierStatus::Pending
                && e.source_origin == source_origin
                && e.url != exclude_url
        })
        .collect();
    siblings.sort_by(|a, b| claim_order(a, b));
    let url = siblings.first()?.url.clone();

    let entry = inner.frontier.get_mut(&url)?;
    entry.priority_score = PRIORITY_MAX;
    entry.status = FrontierStatus::Queued;
    entry.updated_at = Utc::now();
    Some(url)
}

#[async_trait]
impl FrontierStore for MemoryStore {
    async fn insert_if_absent(&self, entry: &NewFrontierEntry) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        Ok(insert_in(&mut inner, entry))
    }

    async fn insert_batch(&self, entries: &[NewFrontierEntry]) -> Result<usize> {
        let mut inner = self.inner.lock().await;
        let mut inserted = 0;
        for entry in entries {
            if insert_in(&mut inner, entry) {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn claim_next(&self, limit: usize) -> Result<Vec<FrontierEntry>> {
        let mut inner = self.inner.lock().await;
        let mut candidates: Vec<FrontierEntry> = inner
            .frontier
            .values()
            .filter(|e| e.status.is_claimable())
            .cloned()
            .collect();
        candidates.sort_by(claim_order);
        candidates.truncate(limit);

        let now = Utc::now();
        for claimed in &mut candidates {
            claimed.status = FrontierStatus::Scanning;
            claimed.updated_at = now;
            inner.frontier.insert(claimed.url.clone(), claimed.clone());
        }
        Ok(candidates)
    }

    async fn set_status(&self, url: &str, status: FrontierStatus) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if let Some(entry) = inner.frontier.get_mut(url) {
            entry.status = status;
            entry.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn promote_sibling(
        &self,
        source_origin: &str,
        exclude_url: &str,
    ) -> Result<Option<String>> {
        let mut inner = self.inner.lock().await;
        Ok(promote_in(&mut inner, source_origin, exclude_url))
    }

    async fn pivot(&self, dead_url: &str) -> Result<PivotOutcome> {
        let mut inner = self.inner.lock().await;
        let Some(entry) = inner.frontier.get_mut(dead_url) else {
            return Ok(PivotOutcome::UnknownEntry);
        };
        if entry.status == FrontierStatus::DeadEnd {
            return Ok(PivotOutcome::AlreadyDead);
        }
        entry.status = FrontierStatus::DeadEnd;
        entry.updated_at = Utc::now();
        let origin = entry.source_origin.clone();

        Ok(match promote_in(&mut inner, &origin, dead_url) {
            Some(url) => PivotOutcome::Promoted(url),
            None => PivotOutcome::NoSibling,
        })
    }

    async fn get_entry(&self, url: &str) -> Result<Option<FrontierEntry>> {
        Ok(self.inner.lock().await.frontier.get(url).cloned())
    }

    async fn list_entries(
        &self,
        status: Option<FrontierStatus>,
        limit: usize,
    ) -> Result<Vec<FrontierEntry>> {
        let inner = self.inner.lock().await;
        let mut entries: Vec<FrontierEntry> = inner
            .frontier
            .values()
            .filter(|e| status.is_none_or(|s| e.status == s))
            .cloned()
            .collect();
        entries.sort_by(|a, b| {
            b.priority_score
                .cmp(&a.priority_score)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        entries.truncate(limit);
        Ok(entries)
    }
}

#[async_trait]
impl HarvestLog for MemoryStore {
    async fn ingest(&self, pages: &[HarvestedPage], _job_id: Option<&str>) -> Result<usize> {
        let mut inner = self.inner.lock().await;
        for page in pages {
            inner.harvests.insert(page.url.clone(), page.clone());
        }
        Ok(pages.len())
    }

    async fn get_harvest(&self, url: &str) -> Result<Option<HarvestedPage>> {
        Ok(self.inner.lock().await.harvests.get(url).cloned())
    }

    async fn count_harvests(&self) -> Result<usize> {
        Ok(self.inner.lock().await.harvests.len())
    }

    async fn begin_job(&self, _url: &str) -> Result<String> {
        let id = Uuid::now_v7().to_string();
        self.inner.lock().await.jobs.insert(id.clone(), None);
        Ok(id)
    }

    async fn finish_job(&self, job_id: &str, stats_json: &str) -> Result<()> {
        self.inner
            .lock()
            .await
            .jobs
            .insert(job_id.to_string(), Some(stats_json.to_string()));
        Ok(())
    }
}
