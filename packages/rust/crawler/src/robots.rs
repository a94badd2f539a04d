//! robots.txt policies and a per-origin policy cache.
//!
//! Allow/Disallow matching goes through the `robotstxt` matcher, which
//! handles `*` and `$` patterns and longest-match precedence. Crawl-delay
//! is read here since the matcher ignores it.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use reqwest::Client;
use robotstxt::DefaultMatcher;
use tracing::{debug, warn};
use url::Url;

use crate::urls::origin_key;

/// One origin's robots.txt.
#[derive(Debug, Clone, Default)]
pub struct RobotsTxt {
    body: String,
    groups: Vec<AgentGroup>,
}

/// Crawl-delay shared by one or more `User-agent` lines.
#[derive(Debug, Clone, Default)]
struct AgentGroup {
    /// Lowercased agent tokens.
    agents: Vec<String>,
    crawl_delay: Option<f64>,
}

/// Product token of a user agent string: `Artemis-Harvester/0.1` gives
/// `Artemis-Harvester`.
fn product_token(user_agent: &str) -> &str {
    let end = user_agent
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
        .unwrap_or(user_agent.len());
    &user_agent[..end]
}

impl RobotsTxt {
    /// A policy that allows everything.
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Keep the body for matching and collect Crawl-delay per group.
    pub fn parse(content: &str) -> Self {
        let mut groups = Vec::new();
        let mut current: Option<AgentGroup> = None;
        // Consecutive User-agent lines share one group
        let mut collecting_agents = false;

        for line in content.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            let Some((directive, value)) = line.split_once(':') else {
                continue;
            };
            let directive = directive.trim().to_ascii_lowercase();
            let value = value.trim();

            match directive.as_str() {
                "user-agent" => {
                    if !collecting_agents {
                        if let Some(group) = current.take() {
                            groups.push(group);
                        }
                        current = Some(AgentGroup::default());
                    }
                    if let Some(group) = current.as_mut() {
                        let agent = if value.starts_with('*') {
                            "*".to_string()
                        } else {
                            product_token(value).to_ascii_lowercase()
                        };
                        group.agents.push(agent);
                    }
                    collecting_agents = true;
                }
                "crawl-delay" => {
                    collecting_agents = false;
                    let Some(group) = current.as_mut() else {
                        continue;
                    };
                    if let Ok(delay) = value.parse::<f64>() {
                        if delay.is_finite() && delay >= 0.0 {
                            group.crawl_delay = Some(delay);
                        }
                    }
                }
                _ => collecting_agents = false,
            }
        }

        if let Some(group) = current {
            groups.push(group);
        }
        Self {
            body: content.to_string(),
            groups,
        }
    }

    /// The group naming the agent's product token, else `*`.
    fn group_for(&self, user_agent: &str) -> Option<&AgentGroup> {
        let token = product_token(user_agent).to_ascii_lowercase();
        self.groups
            .iter()
            .find(|g| !token.is_empty() && g.agents.iter().any(|a| *a == token))
            .or_else(|| self.groups.iter().find(|g| g.agents.iter().any(|a| a == "*")))
    }

    /// Whether `user_agent` may fetch `target`, a URL or an absolute path.
    pub fn is_allowed(&self, user_agent: &str, target: &str) -> bool {
        if self.body.trim().is_empty() {
            return true;
        }
        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.body, product_token(user_agent), target)
    }

    /// Crawl delay declared for the agent's group.
    pub fn crawl_delay(&self, user_agent: &str) -> Option<Duration> {
        self.group_for(user_agent)
            .and_then(|g| g.crawl_delay)
            .map(Duration::from_secs_f64)
    }
}

/// Shared per-origin robots policy cache, keyed by origin, kept for the
/// life of the process.
///
/// Lookups and inserts are synchronized; the fetch itself is not, so two
/// tasks meeting a new origin at once may both fetch robots.txt.
pub struct RobotsCache {
    client: Client,
    timeout: Duration,
    policies: RwLock<HashMap<String, Arc<RobotsTxt>>>,
}

impl RobotsCache {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self {
            client,
            timeout,
            policies: RwLock::new(HashMap::new()),
        }
    }

    /// Cached policy for the origin of `url`, fetching it on first use.
    pub async fn policy_for(&self, url: &Url) -> Arc<RobotsTxt> {
        let origin = origin_key(url);

        if let Some(policy) = self.cached(&origin) {
            return policy;
        }

        let policy = Arc::new(self.fetch(&origin).await);
        if let Ok(mut map) = self.policies.write() {
            map.entry(origin).or_insert_with(|| policy.clone());
        }
        policy
    }

    /// Whether `user_agent` may fetch `url`.
    pub async fn is_allowed(&self, url: &Url, user_agent: &str) -> bool {
        self.policy_for(url).await.is_allowed(user_agent, url.as_str())
    }

    fn cached(&self, origin: &str) -> Option<Arc<RobotsTxt>> {
        self.policies.read().ok()?.get(origin).cloned()
    }

    /// Fetch `{origin}/robots.txt`. Any failure yields allow-all.
    async fn fetch(&self, origin: &str) -> RobotsTxt {
        let robots_url = format!("{origin}/robots.txt");

        let response = self
            .client
            .get(&robots_url)
            .timeout(self.timeout)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => match resp.text().await {
                Ok(body) => {
                    debug!(%origin, "robots.txt loaded");
                    RobotsTxt::parse(&body)
                }
                Err(e) => {
                    warn!(%origin, error = %e, "robots.txt body unreadable, allowing all");
                    RobotsTxt::allow_all()
                }
            },
            Ok(resp) => {
                debug!(%origin, status = %resp.status(), "no robots.txt, allowing all");
                RobotsTxt::allow_all()
            }
            Err(e) => {
                warn!(%origin, error = %e, "robots.txt fetch failed, allowing all");
                RobotsTxt::allow_all()
            }
        }
    }
}
