//! HTTP client construction and single-page fetching.

use std::time::Duration;

use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;
use url::Url;

use artemis_shared::{ArtemisError, Result};

/// Body of a successful fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchedBody {
    Html(String),
    /// Any other content type. Callers treat it as a clean skip.
    NonHtml { content_type: String },
}

/// Build a client declaring `user_agent`, following at most 5 redirects.
pub fn build_client(user_agent: &str, timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(user_agent)
        .redirect(reqwest::redirect::Policy::limited(5))
        .timeout(timeout)
        .build()
        .map_err(|e| ArtemisError::Network(format!("failed to build HTTP client: {e}")))
}

/// GET `url` once. Non-success statuses are `Network` errors; timeouts
/// are `FetchTimeout`.
pub async fn fetch_page(client: &Client, url: &Url, timeout: Duration) -> Result<FetchedBody> {
    debug!(%url, "fetching page");

    let response = client
        .get(url.as_str())
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| classify(url, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(ArtemisError::Network(format!("{url}: HTTP {status}")));
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();

    if !is_html(&content_type) {
        return Ok(FetchedBody::NonHtml { content_type });
    }

    let body = response.text().await.map_err(|e| classify(url, e))?;
    Ok(FetchedBody::Html(body))
}

fn is_html(content_type: &str) -> bool {
    content_type.contains("text/html") || content_type.contains("application/xhtml+xml")
}

fn classify(url: &Url, e: reqwest::Error) -> ArtemisError {
    if e.is_timeout() {
        ArtemisError::FetchTimeout(format!("{url}: {e}"))
    } else {
        ArtemisError::Network(format!("{url}: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> Client {
        build_client("Artemis-Harvester/test", Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn html_and_non_html() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw("<html></html>", "text/html; charset=utf-8"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/data"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("{}", "application/json"))
            .mount(&server)
            .await;

        let page = Url::parse(&format!("{}/page", server.uri())).unwrap();
        let data = Url::parse(&format!("{}/data", server.uri())).unwrap();

        assert_eq!(
            fetch_page(&client(), &page, Duration::from_secs(2)).await.unwrap(),
            FetchedBody::Html("<html></html>".into())
        );
        assert!(matches!(
            fetch_page(&client(), &data, Duration::from_secs(2)).await.unwrap(),
            FetchedBody::NonHtml { .. }
        ));
    }

    #[tokio::test]
    async fn error_status_is_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/gone", server.uri())).unwrap();
        let err = fetch_page(&client(), &url, Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, ArtemisError::Network(_)));
        assert!(err.to_string().contains("404"));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn slow_response_is_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("<html></html>", "text/html")
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/slow", server.uri())).unwrap();
        let err = fetch_page(&client(), &url, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, ArtemisError::FetchTimeout(_)));
    }
}
