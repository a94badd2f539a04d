//! Evaluation and notification collaborators used by the drain controller.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;

use artemis_shared::{ArtemisError, CouncilConfig, FrontierEntry, HarvestedPage, Result};

/// Contact value the evaluator uses when it found nothing.
pub const CONTACT_PLACEHOLDER: &str = "No direct contact data harvested.";

/// Minimum nurture score that triggers a notification.
pub const NOTIFY_THRESHOLD: f64 = 8.0;

/// Verdict returned by the evaluation collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub approved: bool,
    /// Suitability rating in `0..=10`.
    pub nurture_score: f64,
    #[serde(default)]
    pub optimization_steps: Vec<String>,
    #[serde(default)]
    pub invention_idea: Option<String>,
    #[serde(default)]
    pub blueprint_code: Option<String>,
    #[serde(default)]
    pub contact_info: Option<String>,
}

impl Evaluation {
    /// High score and a real contact.
    pub fn should_notify(&self) -> bool {
        self.nurture_score >= NOTIFY_THRESHOLD
            && self
                .contact_info
                .as_deref()
                .map(str::trim)
                .is_some_and(|c| !c.is_empty() && c != CONTACT_PLACEHOLDER)
    }
}

/// Decides whether a harvested entry is worth archiving.
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(&self, entry: &FrontierEntry, pages: &[HarvestedPage]) -> Result<Evaluation>;
}

/// Receives high-value entries. Failures never affect the entry.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, entry: &FrontierEntry, evaluation: &Evaluation) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct EvaluateRequest<'a> {
    url: &'a str,
    priority_score: u32,
    source_origin: &'a str,
    pages: Vec<PageSummary<'a>>,
}

#[derive(Debug, Serialize)]
struct PageSummary<'a> {
    url: &'a str,
    title: &'a str,
    description: &'a str,
    emails: &'a [String],
    structural_flaws: &'a [String],
}

/// HTTP evaluator posting the entry and page summaries to the council.
pub struct CouncilEvaluator {
    client: Client,
    endpoint: String,
}

impl CouncilEvaluator {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ArtemisError::Evaluation(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn from_config(config: &CouncilConfig) -> Result<Self> {
        Self::new(
            config.evaluate_endpoint.clone(),
            Duration::from_millis(config.timeout_ms),
        )
    }
}

#[async_trait]
impl Evaluator for CouncilEvaluator {
    async fn evaluate(&self, entry: &FrontierEntry, pages: &[HarvestedPage]) -> Result<Evaluation> {
        let request = EvaluateRequest {
            url: &entry.url,
            priority_score: entry.priority_score,
            source_origin: &entry.source_origin,
            pages: pages
                .iter()
                .map(|p| PageSummary {
                    url: &p.url,
                    title: &p.title,
                    description: &p.description,
                    emails: &p.emails,
                    structural_flaws: &p.structural_flaws,
                })
                .collect(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| ArtemisError::Evaluation(format!("evaluate request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ArtemisError::Evaluation(format!(
                "evaluate endpoint returned {status}: {body}"
            )));
        }

        let mut evaluation: Evaluation = response
            .json()
            .await
            .map_err(|e| ArtemisError::Evaluation(format!("invalid evaluation: {e}")))?;

        if !evaluation.nurture_score.is_finite() {
            return Err(ArtemisError::Evaluation("nurture score is not a number".into()));
        }
        evaluation.nurture_score = evaluation.nurture_score.clamp(0.0, 10.0);
        Ok(evaluation)
    }
}

/// Notifier that only logs.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, entry: &FrontierEntry, evaluation: &Evaluation) -> Result<()> {
        info!(
            url = %entry.url,
            nurture_score = evaluation.nurture_score,
            contact = evaluation.contact_info.as_deref().unwrap_or(""),
            "high nurture score, notification issued"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use artemis_shared::FrontierStatus;
    use chrono::Utc;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn entry() -> FrontierEntry {
        FrontierEntry {
            url: "https://a.example/".into(),
            priority_score: 5,
            status: FrontierStatus::Scanning,
            source_origin: "https://seed.example/".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn evaluation(score: f64, contact: Option<&str>) -> Evaluation {
        Evaluation {
            approved: true,
            nurture_score: score,
            optimization_steps: vec![],
            invention_idea: None,
            blueprint_code: None,
            contact_info: contact.map(String::from),
        }
    }

    #[test]
    fn notification_rule() {
        assert!(evaluation(8.0, Some("hello@a.example")).should_notify());
        assert!(!evaluation(7.9, Some("hello@a.example")).should_notify());
        assert!(!evaluation(9.0, None).should_notify());
        assert!(!evaluation(9.0, Some("  ")).should_notify());
        assert!(!evaluation(10.0, Some(CONTACT_PLACEHOLDER)).should_notify());
    }

    #[tokio::test]
    async fn council_evaluator_parses_and_clamps() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/evaluate"))
            .and(body_partial_json(serde_json::json!({"url": "https://a.example/"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "approved": true,
                "nurture_score": 12,
                "contact_info": "hello@a.example"
            })))
            .mount(&server)
            .await;

        let evaluator =
            CouncilEvaluator::new(format!("{}/api/evaluate", server.uri()), Duration::from_secs(2))
                .unwrap();
        let result = evaluator.evaluate(&entry(), &[]).await.unwrap();
        assert!(result.approved);
        assert_eq!(result.nurture_score, 10.0);
        assert!(result.optimization_steps.is_empty());
        assert!(result.should_notify());
    }

    #[tokio::test]
    async fn council_failure_is_evaluation_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let evaluator = CouncilEvaluator::new(server.uri(), Duration::from_secs(2)).unwrap();
        let err = evaluator.evaluate(&entry(), &[]).await.unwrap_err();
        assert!(matches!(err, ArtemisError::Evaluation(_)));
        assert!(err.to_string().contains("502"));
    }
}
