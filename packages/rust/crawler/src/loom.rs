//! Seed expansion ("Loom"): fetch one page, score its links and store
//! them in the frontier.

use std::collections::HashSet;
use std::sync::Arc;

use reqwest::Client;
use serde::Serialize;
use tracing::{info, instrument, warn};
use url::Url;

use artemis_shared::{ArtemisError, LoomConfig, NewFrontierEntry, Result};
use artemis_storage::FrontierStore;

use crate::extract::extract_page;
use crate::fetch::{FetchedBody, build_client, fetch_page};
use crate::priority::PriorityRules;
use crate::robots::RobotsCache;
use crate::urls::{normalize_url, validate_seed};

/// Counts returned by [`Loom::sow`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SowReport {
    /// Candidates that survived filtering and the cap.
    pub harvested: usize,
    /// Rows actually inserted.
    pub stored: usize,
    /// Rows that failed individually during the fallback path.
    pub errors: usize,
}

/// Expands seeds into frontier entries.
pub struct Loom {
    client: Client,
    config: LoomConfig,
    rules: PriorityRules,
    store: Arc<dyn FrontierStore>,
    robots: Arc<RobotsCache>,
}

impl Loom {
    pub fn new(config: LoomConfig, rules: PriorityRules, store: Arc<dyn FrontierStore>) -> Result<Self> {
        let client = build_client(&config.user_agent, config.request_timeout)?;
        let robots = Arc::new(RobotsCache::new(client.clone(), config.request_timeout));
        Ok(Self {
            client,
            config,
            rules,
            store,
            robots,
        })
    }

    /// Share a robots cache with other components.
    pub fn with_robots(mut self, robots: Arc<RobotsCache>) -> Self {
        self.robots = robots;
        self
    }

    /// Fetch `seed`, extract its links and batch-insert them as `pending`.
    ///
    /// Errors only for seed-level failures: malformed seed, robots block,
    /// fetch failure. A non-HTML seed yields an empty report.
    #[instrument(skip_all, fields(seed = %seed))]
    pub async fn sow(&self, seed: &str) -> Result<SowReport> {
        let seed_url = validate_seed(seed)?;

        if !self.robots.is_allowed(&seed_url, &self.config.user_agent).await {
            return Err(ArtemisError::RobotsDisallowed(seed_url.to_string()));
        }

        let html = match fetch_page(&self.client, &seed_url, self.config.request_timeout).await? {
            FetchedBody::Html(body) => body,
            FetchedBody::NonHtml { content_type } => {
                info!(%content_type, "seed is not HTML, nothing to sow");
                return Ok(SowReport::default());
            }
        };

        let candidates = collect_candidates(&html, &seed_url, self.config.max_links_per_seed);
        let harvested = candidates.len();
        let entries = self.score_candidates(&candidates, &normalize_url(&seed_url));

        let (stored, errors) = self.store_entries(&entries).await;

        info!(harvested, stored, errors, "sow complete");
        Ok(SowReport {
            harvested,
            stored,
            errors,
        })
    }

    /// Normalize, dedupe again after normalization, and score.
    fn score_candidates(&self, candidates: &[Url], source_origin: &str) -> Vec<NewFrontierEntry> {
        let mut seen = HashSet::new();
        candidates
            .iter()
            .map(normalize_url)
            .filter(|url| seen.insert(url.clone()))
            .map(|url| NewFrontierEntry {
                priority_score: self.rules.score(&url),
                url,
                source_origin: source_origin.to_string(),
            })
            .collect()
    }

    /// One transaction first; on failure, row by row counting failures.
    async fn store_entries(&self, entries: &[NewFrontierEntry]) -> (usize, usize) {
        match self.store.insert_batch(entries).await {
            Ok(stored) => (stored, 0),
            Err(e) => {
                warn!(error = %e, "batch insert failed, falling back to single inserts");
                let mut stored = 0;
                let mut errors = 0;
                for entry in entries {
                    match self.store.insert_if_absent(entry).await {
                        Ok(true) => stored += 1,
                        Ok(false) => {}
                        Err(e) => {
                            warn!(url = %entry.url, error = %e, "single insert failed");
                            errors += 1;
                        }
                    }
                }
                (stored, errors)
            }
        }
    }
}

/// Links from `html` resolved against `seed`, filtered, deduplicated and
/// capped at `max` in encounter order.
pub fn collect_candidates(html: &str, seed: &Url, max: usize) -> Vec<Url> {
    let mut links = extract_page(html, seed).links;
    links.truncate(max);
    links
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use artemis_shared::{FrontierEntry, FrontierStatus};
    use artemis_storage::{MemoryStore, PivotOutcome};

    fn config() -> LoomConfig {
        LoomConfig {
            request_timeout: Duration::from_secs(5),
            max_links_per_seed: 150,
            user_agent: "Artemis-Harvester/test".into(),
        }
    }

    fn loom_with(store: Arc<dyn FrontierStore>) -> Loom {
        Loom::new(config(), PriorityRules::default(), store).unwrap()
    }

    #[test]
    fn cap_keeps_first_150_of_200() {
        let seed = Url::parse("https://seed.example.com/").unwrap();
        let anchors: String = (0..200)
            .map(|i| format!(r#"<a href="/item/{i}">Item {i}</a>"#))
            .collect();
        let html = format!("<html><body>{anchors}</body></html>");

        let candidates = collect_candidates(&html, &seed, 150);
        assert_eq!(candidates.len(), 150);
        assert_eq!(candidates[0].as_str(), "https://seed.example.com/item/0");
        assert_eq!(candidates[149].as_str(), "https://seed.example.com/item/149");
    }

    #[tokio::test]
    async fn rejects_invalid_seed_before_io() {
        let store = Arc::new(MemoryStore::new());
        let loom = loom_with(store);
        let err = loom.sow("ftp://example.com/").await.unwrap_err();
        assert!(matches!(err, ArtemisError::InvalidSeedUrl { .. }));
    }

    #[tokio::test]
    async fn sow_stores_scored_candidates() {
        let server = MockServer::start().await;
        let page = r##"<html><body>
            <a href="/research/paper">Paper</a>
            <a href="/blog/post?utm=1">Post</a>
            <a href="/blog/post?utm=2">Post again</a>
            <a href="/about#team">About</a>
            <a href="mailto:hi@example.com">Mail</a>
            <a href="/logo.png">Logo</a>
        </body></html>"##;

        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(page, "text/html"))
            .mount(&server)
            .await;

        let store = Arc::new(MemoryStore::new());
        let loom = loom_with(store.clone());

        let report = loom.sow(&server.uri()).await.unwrap();
        // Two distinct blog URLs before normalization collapse them
        assert_eq!(report.harvested, 4);
        assert_eq!(report.stored, 3);
        assert_eq!(report.errors, 0);

        let entries = store.list_entries(None, 10).await.unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].url, format!("{}/research/paper", server.uri()));
        assert_eq!(entries[0].priority_score, 10);
        assert!(entries.iter().all(|e| e.status == FrontierStatus::Pending));
        assert!(entries.iter().all(|e| e.source_origin == format!("{}/", server.uri())));

        // Second sow is a no-op for existing rows
        let again = loom.sow(&server.uri()).await.unwrap();
        assert_eq!(again.stored, 0);
    }

    #[tokio::test]
    async fn robots_block_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /\n"))
            .mount(&server)
            .await;

        let loom = loom_with(Arc::new(MemoryStore::new()));
        let err = loom.sow(&server.uri()).await.unwrap_err();
        assert!(matches!(err, ArtemisError::RobotsDisallowed(_)));
    }

    #[tokio::test]
    async fn non_html_seed_is_clean_skip() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("{}", "application/json"))
            .mount(&server)
            .await;

        let loom = loom_with(Arc::new(MemoryStore::new()));
        let report = loom.sow(&format!("{}/feed", server.uri())).await.unwrap();
        assert_eq!(report, SowReport::default());
    }

    #[tokio::test]
    async fn seed_fetch_failure_propagates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let loom = loom_with(Arc::new(MemoryStore::new()));
        let err = loom.sow(&server.uri()).await.unwrap_err();
        assert!(err.is_retryable());
    }

    /// Store whose batch insert always fails and whose single insert fails
    /// for URLs containing "bad".
    struct FlakyStore {
        inner: MemoryStore,
    }

    #[async_trait]
    impl FrontierStore for FlakyStore {
        async fn insert_if_absent(&self, entry: &NewFrontierEntry) -> Result<bool> {
            if entry.url.contains("bad") {
                return Err(ArtemisError::Storage("constraint failed".into()));
            }
            self.inner.insert_if_absent(entry).await
        }
        async fn insert_batch(&self, _entries: &[NewFrontierEntry]) -> Result<usize> {
            Err(ArtemisError::Storage("database is locked".into()))
        }
        async fn claim_next(&self, limit: usize) -> Result<Vec<FrontierEntry>> {
            self.inner.claim_next(limit).await
        }
        async fn set_status(&self, url: &str, status: FrontierStatus) -> Result<()> {
            self.inner.set_status(url, status).await
        }
        async fn promote_sibling(&self, origin: &str, exclude: &str) -> Result<Option<String>> {
            self.inner.promote_sibling(origin, exclude).await
        }
        async fn pivot(&self, dead_url: &str) -> Result<PivotOutcome> {
            self.inner.pivot(dead_url).await
        }
        async fn get_entry(&self, url: &str) -> Result<Option<FrontierEntry>> {
            self.inner.get_entry(url).await
        }
        async fn list_entries(
            &self,
            status: Option<FrontierStatus>,
            limit: usize,
        ) -> Result<Vec<FrontierEntry>> {
            self.inner.list_entries(status, limit).await
        }
    }

    #[tokio::test]
    async fn batch_failure_falls_back_to_single_inserts() {
        let server = MockServer::start().await;
        let page = r#"<html><body>
            <a href="/good-1">1</a><a href="/bad">x</a><a href="/good-2">2</a>
        </body></html>"#;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(page, "text/html"))
            .mount(&server)
            .await;

        let store = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
        });
        let loom = loom_with(store.clone());

        let report = loom.sow(&server.uri()).await.unwrap();
        assert_eq!(report.harvested, 3);
        assert_eq!(report.stored, 2);
        assert_eq!(report.errors, 1);
    }

    #[tokio::test]
    async fn shared_robots_cache_fetches_once_for_loom_and_harvester() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private\n"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(r#"<html><body><a href="/a">A</a></body></html>"#, "text/html"),
            )
            .mount(&server)
            .await;

        let robots = Arc::new(RobotsCache::new(Client::new(), Duration::from_secs(2)));
        let loom = loom_with(Arc::new(MemoryStore::new())).with_robots(robots.clone());
        let harvester = crate::harvester::Harvester::new(
            artemis_shared::HarvestConfig {
                max_depth: 0,
                max_pages_per_domain: 50,
                max_links_per_page: 10,
                request_timeout: Duration::from_secs(5),
                robots_timeout: Duration::from_secs(2),
                polite_delay: Duration::ZERO,
                retry: artemis_shared::RetryPolicy::new(1, Duration::ZERO),
                user_agent: "Artemis-Harvester/test".into(),
                snapshot_dir: None,
            },
            Arc::new(crate::advisor::DisabledAdvisor),
        )
        .unwrap()
        .with_robots(robots);

        assert_eq!(loom.sow(&server.uri()).await.unwrap().stored, 1);
        let report = harvester.harvest(&server.uri()).await.unwrap();
        assert_eq!(report.pages.len(), 1);
    }
}
