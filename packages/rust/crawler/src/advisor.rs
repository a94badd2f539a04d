//! Advisory collaborator used for page enrichment.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use artemis_shared::{ArtemisError, CouncilConfig, Result};

/// Enrichment text when the collaborator fails or is disabled.
pub const ENRICHMENT_PLACEHOLDER: &str = "Council offline - basic harvest only";

/// Enrichment text when the collaborator answers with nothing.
pub const EMPTY_VERDICT: &str = "No inspiration available";

/// External advisor that turns page context into advisory text.
#[async_trait]
pub trait Advisor: Send + Sync {
    async fn advise(&self, prompt: &str) -> Result<String>;
}

/// Build the enrichment prompt for a page.
pub fn enrichment_prompt(title: &str, description: &str, flaws: &[String]) -> String {
    format!(
        "Suggest constructive optimization ideas for this site. \
         Focus on growth, accessibility and ethical design, in under 300 words. \
         Context: {title} | {description} | Flaws: {}",
        flaws.join(", ")
    )
}

#[derive(Debug, Serialize)]
struct AdviseRequest<'a> {
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct AdviseResponse {
    #[serde(default)]
    verdict: Option<String>,
}

/// HTTP advisor posting `{prompt}` to the council endpoint.
pub struct CouncilAdvisor {
    client: Client,
    endpoint: String,
}

impl CouncilAdvisor {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ArtemisError::Enrichment(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn from_config(config: &CouncilConfig) -> Result<Self> {
        Self::new(
            config.advise_endpoint.clone(),
            Duration::from_millis(config.timeout_ms),
        )
    }
}

#[async_trait]
impl Advisor for CouncilAdvisor {
    async fn advise(&self, prompt: &str) -> Result<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&AdviseRequest { prompt })
            .send()
            .await
            .map_err(|e| ArtemisError::Enrichment(format!("advise request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ArtemisError::Enrichment(format!(
                "advise endpoint returned {}",
                response.status()
            )));
        }

        let body: AdviseResponse = response
            .json()
            .await
            .map_err(|e| ArtemisError::Enrichment(format!("invalid advise response: {e}")))?;

        let verdict = body
            .verdict
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        debug!(has_verdict = verdict.is_some(), "advice received");

        Ok(verdict.unwrap_or_else(|| EMPTY_VERDICT.to_string()))
    }
}

/// Advisor used when the council is disabled.
pub struct DisabledAdvisor;

#[async_trait]
impl Advisor for DisabledAdvisor {
    async fn advise(&self, _prompt: &str) -> Result<String> {
        Ok(ENRICHMENT_PLACEHOLDER.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn council_returns_verdict() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/transmit"))
            .and(body_partial_json(serde_json::json!({"prompt": "hello"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"verdict": "  Add alt text.  "})),
            )
            .mount(&server)
            .await;

        let advisor =
            CouncilAdvisor::new(format!("{}/api/transmit", server.uri()), Duration::from_secs(2))
                .unwrap();
        assert_eq!(advisor.advise("hello").await.unwrap(), "Add alt text.");
    }

    #[tokio::test]
    async fn empty_verdict_maps_to_fallback_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let advisor = CouncilAdvisor::new(server.uri(), Duration::from_secs(2)).unwrap();
        assert_eq!(advisor.advise("x").await.unwrap(), EMPTY_VERDICT);
    }

    #[tokio::test]
    async fn server_error_is_enrichment_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let advisor = CouncilAdvisor::new(server.uri(), Duration::from_secs(2)).unwrap();
        let err = advisor.advise("x").await.unwrap_err();
        assert!(matches!(err, ArtemisError::Enrichment(_)));
    }

    #[test]
    fn prompt_includes_context() {
        let prompt = enrichment_prompt("Home", "Welcome", &["missing-viewport".into()]);
        assert!(prompt.contains("Home | Welcome | Flaws: missing-viewport"));
    }
}
