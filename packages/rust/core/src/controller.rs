//! Draining controller: claim frontier entries and run each through the
//! harvest → ingest → evaluate flow under the watchdog.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};

use artemis_crawler::{HarvestReport, Harvester, StopReason};
use artemis_shared::{ArtemisError, DrainConfig, FrontierEntry, FrontierStatus, Result};
use artemis_storage::{FrontierStore, HarvestLog};

use crate::evaluation::{Evaluator, Notifier};
use crate::watchdog::{Monitored, Watchdog};

/// What happened to one claimed entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "outcome")]
pub enum EntryOutcome {
    Archived { nurture_score: f64, notified: bool },
    Rejected { reason: String },
    Errored { error: String },
    Escalated { new_target: Option<String> },
}

/// Totals for one or more drain cycles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub claimed: usize,
    pub archived: usize,
    pub rejected: usize,
    pub errored: usize,
    pub escalated: usize,
}

impl DrainReport {
    pub fn merge(&mut self, other: &DrainReport) {
        self.claimed += other.claimed;
        self.archived += other.archived;
        self.rejected += other.rejected;
        self.errored += other.errored;
        self.escalated += other.escalated;
    }

    fn record(&mut self, outcome: &EntryOutcome) {
        match outcome {
            EntryOutcome::Archived { .. } => self.archived += 1,
            EntryOutcome::Rejected { .. } => self.rejected += 1,
            EntryOutcome::Errored { .. } => self.errored += 1,
            EntryOutcome::Escalated { .. } => self.escalated += 1,
        }
    }
}

/// Progress callback for drain cycles.
pub trait DrainProgress: Send + Sync {
    /// Called after claiming, before any entry runs.
    fn cycle_started(&self, claimed: usize);
    fn entry_started(&self, url: &str);
    fn entry_finished(&self, url: &str, outcome: &EntryOutcome);
    fn cycle_finished(&self, report: &DrainReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl DrainProgress for SilentProgress {
    fn cycle_started(&self, _claimed: usize) {}
    fn entry_started(&self, _url: &str) {}
    fn entry_finished(&self, _url: &str, _outcome: &EntryOutcome) {}
    fn cycle_finished(&self, _report: &DrainReport) {}
}

pub struct DrainController {
    frontier: Arc<dyn FrontierStore>,
    log: Arc<dyn HarvestLog>,
    harvester: Arc<Harvester>,
    watchdog: Arc<Watchdog>,
    evaluator: Arc<dyn Evaluator>,
    notifier: Arc<dyn Notifier>,
    config: DrainConfig,
    progress: Arc<dyn DrainProgress>,
}

impl DrainController {
    pub fn new(
        frontier: Arc<dyn FrontierStore>,
        log: Arc<dyn HarvestLog>,
        harvester: Arc<Harvester>,
        watchdog: Arc<Watchdog>,
        evaluator: Arc<dyn Evaluator>,
        notifier: Arc<dyn Notifier>,
        config: DrainConfig,
    ) -> Self {
        Self {
            frontier,
            log,
            harvester,
            watchdog,
            evaluator,
            notifier,
            config,
            progress: Arc::new(SilentProgress),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn DrainProgress>) -> Self {
        self.progress = progress;
        self
    }

    /// Claim up to `batch_limit` entries and settle all of them.
    ///
    /// At most `concurrency` entries run at once. A failing entry is marked
    /// `error` and never aborts its siblings; only the claim itself can
    /// fail the cycle.
    #[instrument(skip_all)]
    pub async fn drain_once(self: &Arc<Self>) -> Result<DrainReport> {
        let claimed = self.frontier.claim_next(self.config.batch_limit).await?;
        let mut report = DrainReport {
            claimed: claimed.len(),
            ..DrainReport::default()
        };
        self.progress.cycle_started(claimed.len());
        if claimed.is_empty() {
            self.progress.cycle_finished(&report);
            return Ok(report);
        }

        let permits = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut tasks = JoinSet::new();
        for entry in claimed {
            let this = Arc::clone(self);
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                this.progress.entry_started(&entry.url);
                let outcome = this.settle(&entry).await;
                this.progress.entry_finished(&entry.url, &outcome);
                outcome
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => report.record(&outcome),
                Err(e) => {
                    warn!(error = %e, "drain task aborted");
                    report.errored += 1;
                }
            }
        }

        info!(
            claimed = report.claimed,
            archived = report.archived,
            rejected = report.rejected,
            errored = report.errored,
            escalated = report.escalated,
            "drain cycle completed"
        );
        self.progress.cycle_finished(&report);
        Ok(report)
    }

    /// Run drain cycles until `max_cycles` is reached, sleeping
    /// `poll_interval` whenever the frontier is empty. Unbounded when
    /// `max_cycles` is `None`; callers cancel by dropping the future.
    pub async fn watch(self: &Arc<Self>, max_cycles: Option<usize>) -> Result<DrainReport> {
        let mut total = DrainReport::default();
        let mut cycles = 0;
        loop {
            let report = self.drain_once().await?;
            total.merge(&report);
            cycles += 1;
            if max_cycles.is_some_and(|max| cycles >= max) {
                return Ok(total);
            }
            if report.claimed == 0 {
                tokio::time::sleep(self.config.poll_interval).await;
            }
        }
    }

    /// Process one entry, turning any failure into an `error` status.
    async fn settle(&self, entry: &FrontierEntry) -> EntryOutcome {
        match self.process(entry).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(url = %entry.url, error = %e, "entry failed");
                if let Err(status_err) = self
                    .frontier
                    .set_status(&entry.url, FrontierStatus::Error)
                    .await
                {
                    warn!(url = %entry.url, error = %status_err, "could not mark entry as error");
                }
                EntryOutcome::Errored {
                    error: e.to_string(),
                }
            }
        }
    }

    #[instrument(skip_all, fields(url = %entry.url))]
    async fn process(&self, entry: &FrontierEntry) -> Result<EntryOutcome> {
        let job_id = self.log.begin_job(&entry.url).await?;
        let context = format!("harvesting {}", entry.url);
        let harvester = &self.harvester;
        let url = entry.url.as_str();

        let monitored = self
            .watchdog
            .monitor(|| harvest_once(harvester, url), &context, url)
            .await?;

        let report = match monitored {
            Monitored::Completed(report) => report,
            Monitored::Escalated(escalation) => {
                let stats = serde_json::json!({
                    "escalated": true,
                    "attempts": escalation.attempts,
                    "last_error": escalation.last_error,
                    "new_target": escalation.new_target,
                });
                self.log.finish_job(&job_id, &stats.to_string()).await?;
                return Ok(EntryOutcome::Escalated {
                    new_target: escalation.new_target,
                });
            }
        };

        let stats_json = serde_json::json!({ "stats": report.stats }).to_string();

        if report.pages.is_empty() {
            let reason = report
                .reason
                .map(|r| r.to_string())
                .unwrap_or_else(|| "no pages".into());
            info!(%reason, "nothing harvested, rejecting");
            self.frontier
                .set_status(&entry.url, FrontierStatus::Rejected)
                .await?;
            self.log.finish_job(&job_id, &stats_json).await?;
            return Ok(EntryOutcome::Rejected { reason });
        }

        self.log.ingest(&report.pages, Some(&job_id)).await?;
        self.log.finish_job(&job_id, &stats_json).await?;

        let evaluation = self.evaluator.evaluate(entry, &report.pages).await?;
        if !evaluation.approved {
            self.frontier
                .set_status(&entry.url, FrontierStatus::Rejected)
                .await?;
            return Ok(EntryOutcome::Rejected {
                reason: format!("not approved (score {:.1})", evaluation.nurture_score),
            });
        }

        self.frontier
            .set_status(&entry.url, FrontierStatus::Archived)
            .await?;

        let nurture_score = evaluation.nurture_score;
        let notified = evaluation.should_notify();
        if notified {
            // Fire and forget; the entry is already archived.
            let notifier = Arc::clone(&self.notifier);
            let entry = entry.clone();
            tokio::spawn(async move {
                if let Err(e) = notifier.notify(&entry, &evaluation).await {
                    warn!(url = %entry.url, error = %e, "notification failed");
                }
            });
        }

        Ok(EntryOutcome::Archived {
            nurture_score,
            notified,
        })
    }
}

/// One watched attempt: a harvest whose root fetch failed is an error so
/// the watchdog counts it.
async fn harvest_once(harvester: &Harvester, url: &str) -> Result<HarvestReport> {
    let report = harvester.harvest(url).await?;
    if report.pages.is_empty() {
        if let Some(StopReason::Failed(message)) = &report.reason {
            return Err(ArtemisError::Network(message.clone()));
        }
    }
    Ok(report)
}
