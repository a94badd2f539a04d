//! Depth-bounded, robots-compliant recursive harvester.
//!
//! One call tree walks pages depth-first and strictly sequentially. Every
//! page is fetched, extracted and snapshotted before its children are
//! visited.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use url::Url;
use uuid::Uuid;

use artemis_shared::{ArtemisError, HarvestConfig, HarvestStats, HarvestedPage, Result};

use crate::advisor::{Advisor, ENRICHMENT_PLACEHOLDER, enrichment_prompt};
use crate::extract::extract_page;
use crate::fetch::{FetchedBody, build_client, fetch_page};
use crate::robots::RobotsCache;
use crate::urls::{normalize_url, origin_key, sanitize_host};

type VisitFuture<'a> = Pin<Box<dyn Future<Output = Visit> + Send + 'a>>;

/// Why a visit produced no page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "kind", content = "detail")]
pub enum StopReason {
    MaxDepth,
    PageCap,
    Duplicate,
    RobotsDisallowed,
    NonHtml,
    /// Every fetch attempt failed; carries the last error message.
    Failed(String),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MaxDepth => f.write_str("max depth"),
            Self::PageCap => f.write_str("page cap"),
            Self::Duplicate => f.write_str("duplicate"),
            Self::RobotsDisallowed => f.write_str("robots disallowed"),
            Self::NonHtml => f.write_str("non-HTML response"),
            Self::Failed(message) => f.write_str(message),
        }
    }
}

/// Result of one top-level harvest.
#[derive(Debug, Clone)]
pub struct HarvestReport {
    /// Root page first, then sub-harvests in pre-order.
    pub pages: Vec<HarvestedPage>,
    pub stats: HarvestStats,
    /// Set when the root itself produced no page.
    pub reason: Option<StopReason>,
}

/// Accumulator shared by reference across one call tree.
///
/// Single-writer: never share one between independently scheduled trees.
#[derive(Debug, Default)]
pub struct CrawlState {
    visited: HashSet<String>,
    pages_per_origin: HashMap<String, usize>,
    pub stats: HarvestStats,
}

impl CrawlState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the normalized form of `url` was already entered.
    pub fn is_visited(&self, url: &Url) -> bool {
        self.visited.contains(&normalize_url(url))
    }

    fn pages_for(&self, origin: &str) -> usize {
        self.pages_per_origin.get(origin).copied().unwrap_or(0)
    }
}

struct Visit {
    pages: Vec<HarvestedPage>,
    reason: Option<StopReason>,
}

impl Visit {
    fn stopped(reason: StopReason) -> Self {
        Self {
            pages: Vec::new(),
            reason: Some(reason),
        }
    }
}

/// Recursive page harvester.
pub struct Harvester {
    client: Client,
    config: HarvestConfig,
    advisor: Arc<dyn Advisor>,
    robots: Arc<RobotsCache>,
    enrich: bool,
}

impl Harvester {
    pub fn new(config: HarvestConfig, advisor: Arc<dyn Advisor>) -> Result<Self> {
        let client = build_client(&config.user_agent, config.request_timeout)?;
        let robots = Arc::new(RobotsCache::new(client.clone(), config.robots_timeout));
        Ok(Self {
            client,
            config,
            advisor,
            robots,
            enrich: true,
        })
    }

    /// Share a robots cache with other components.
    pub fn with_robots(mut self, robots: Arc<RobotsCache>) -> Self {
        self.robots = robots;
        self
    }

    /// Turn enrichment on or off. Off leaves `enrichment` unset.
    pub fn with_enrichment(mut self, enabled: bool) -> Self {
        self.enrich = enabled;
        self
    }

    pub fn robots(&self) -> Arc<RobotsCache> {
        self.robots.clone()
    }

    /// Harvest from `url` with a fresh [`CrawlState`].
    ///
    /// Only a malformed URL is an error; page-level failures are reported
    /// through `stats.errors` and `reason`.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn harvest(&self, url: &str) -> Result<HarvestReport> {
        let start = Url::parse(url).map_err(|e| ArtemisError::invalid_seed(url, e.to_string()))?;
        if !matches!(start.scheme(), "http" | "https") {
            return Err(ArtemisError::invalid_seed(url, "unsupported scheme"));
        }

        let mut state = CrawlState::new();
        let (pages, reason) = self.harvest_with(start, &mut state).await;

        info!(
            pages = state.stats.pages,
            emails = state.stats.emails,
            flaws = state.stats.flaws,
            errors = state.stats.errors,
            "harvest completed"
        );

        Ok(HarvestReport {
            pages,
            stats: state.stats,
            reason,
        })
    }

    /// Harvest from `start` at depth 0 into a caller-owned state.
    pub async fn harvest_with(
        &self,
        start: Url,
        state: &mut CrawlState,
    ) -> (Vec<HarvestedPage>, Option<StopReason>) {
        let visit = self.visit(start, 0, state).await;
        (visit.pages, visit.reason)
    }

    fn visit<'a>(&'a self, url: Url, depth: u32, state: &'a mut CrawlState) -> VisitFuture<'a> {
        Box::pin(async move {
            if depth > self.config.max_depth {
                return Visit::stopped(StopReason::MaxDepth);
            }

            let origin = origin_key(&url);
            if state.pages_for(&origin) >= self.config.max_pages_per_domain {
                return Visit::stopped(StopReason::PageCap);
            }

            let mut target = url;
            target.set_fragment(None);
            target.set_query(None);
            if !state.visited.insert(target.to_string()) {
                return Visit::stopped(StopReason::Duplicate);
            }

            if !self.robots.is_allowed(&target, &self.config.user_agent).await {
                info!(url = %target, "blocked by robots.txt");
                return Visit::stopped(StopReason::RobotsDisallowed);
            }

            debug!(url = %target, depth, "harvesting");
            let html = match self.fetch_with_retry(&target).await {
                Ok(FetchedBody::Html(body)) => body,
                Ok(FetchedBody::NonHtml { content_type }) => {
                    debug!(url = %target, %content_type, "skipping non-HTML");
                    return Visit::stopped(StopReason::NonHtml);
                }
                Err(e) => {
                    state.stats.errors += 1;
                    warn!(url = %target, error = %e, "harvest failed after retries");
                    return Visit::stopped(StopReason::Failed(e.to_string()));
                }
            };

            let extract = extract_page(&html, &target);
            state.stats.emails += extract.emails.len();
            state.stats.flaws += extract.flaws.len();

            let mut page = HarvestedPage {
                url: target.to_string(),
                title: extract.title,
                description: extract.description,
                emails: extract.emails,
                structural_flaws: extract.flaws,
                enrichment: None,
                depth,
                captured_at: Utc::now(),
            };

            if self.enrich && (depth == 0 || !page.structural_flaws.is_empty()) {
                page.enrichment = Some(self.enrich_page(&page).await);
            }

            state.stats.pages += 1;
            *state.pages_per_origin.entry(origin).or_default() += 1;

            if let Some(dir) = &self.config.snapshot_dir {
                write_snapshot(dir, &target, &page).await;
            }

            let mut queued = HashSet::new();
            let children: Vec<Url> = extract
                .links
                .into_iter()
                .filter(|link| link.host_str() == target.host_str())
                .filter(|link| {
                    let key = normalize_url(link);
                    !state.visited.contains(&key) && queued.insert(key)
                })
                .take(self.config.max_links_per_page)
                .collect();

            let mut pages = vec![page];
            for child in children {
                let sub = self.visit(child, depth + 1, state).await;
                pages.extend(sub.pages);
            }

            Visit {
                pages,
                reason: None,
            }
        })
    }

    /// Politeness delay before every attempt, linear backoff between them.
    /// A robots.txt Crawl-delay longer than the configured delay replaces it.
    async fn fetch_with_retry(&self, url: &Url) -> Result<FetchedBody> {
        let policy = self.config.retry;
        let crawl_delay = self
            .robots
            .policy_for(url)
            .await
            .crawl_delay(&self.config.user_agent)
            .unwrap_or_default();
        let spacing = self.config.polite_delay.max(crawl_delay);
        let mut attempt = 0;

        loop {
            attempt += 1;
            if !spacing.is_zero() {
                tokio::time::sleep(spacing).await;
            }

            match fetch_page(&self.client, url, self.config.request_timeout).await {
                Ok(body) => return Ok(body),
                Err(e) if attempt < policy.max_attempts => {
                    warn!(%url, attempt, error = %e, "fetch attempt failed");
                    tokio::time::sleep(policy.delay_after(attempt)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Ask the advisor about a page. Failure degrades to the placeholder.
    async fn enrich_page(&self, page: &HarvestedPage) -> String {
        let prompt = enrichment_prompt(&page.title, &page.description, &page.structural_flaws);
        match self.advisor.advise(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!(url = %page.url, error = %e, "enrichment failed");
                ENRICHMENT_PLACEHOLDER.to_string()
            }
        }
    }
}

/// Write `page` as pretty JSON under `<dir>/<host>/`. Failures are logged.
async fn write_snapshot(dir: &Path, url: &Url, page: &HarvestedPage) {
    let host = sanitize_host(url.host_str().unwrap_or("unknown"));
    let host_dir = dir.join(&host);
    let file = host_dir.join(format!(
        "page_{}_{}.json",
        Utc::now().timestamp_millis(),
        Uuid::now_v7()
    ));

    let json = match serde_json::to_string_pretty(page) {
        Ok(json) => json,
        Err(e) => {
            warn!(url = %url, error = %e, "snapshot serialization failed");
            return;
        }
    };

    if let Err(e) = tokio::fs::create_dir_all(&host_dir).await {
        warn!(path = %host_dir.display(), error = %e, "snapshot directory not writable");
        return;
    }
    match tokio::fs::write(&file, json).await {
        Ok(()) => debug!(path = %file.display(), "snapshot saved"),
        Err(e) => warn!(path = %file.display(), error = %e, "snapshot write failed"),
    }
}
