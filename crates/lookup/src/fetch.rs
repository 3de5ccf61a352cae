//! HTTP fetch gateway — `GET {url}?q={query}` against the search service.

use async_trait::async_trait;
use leadline_core::error::FetchError;
use leadline_core::lookup::FetchGateway;
use std::time::Duration;
use tracing::debug;

pub struct HttpFetchGateway {
    url: String,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl HttpFetchGateway {
    pub fn new(url: impl Into<String>, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            url: url.into(),
            timeout_secs,
            client,
        }
    }

    pub fn from_config(config: &leadline_config::FetchConfig) -> Self {
        Self::new(&config.url, config.timeout_secs)
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl FetchGateway for HttpFetchGateway {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(&self, query: &str) -> Result<String, FetchError> {
        debug!(url = %self.url, query = %query, "Fetching lookup data");

        let response = self
            .client
            .get(&self.url)
            .query(&[("q", query)])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout(self.timeout_secs)
                } else {
                    FetchError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status_code: status.as_u16(),
                message: body,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        debug!(bytes = body.len(), "Lookup data received");
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::routing::get;
    use std::collections::HashMap;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn sends_query_parameter() {
        let app = Router::new().route(
            "/search/smart",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                format!(r#"[{{"q":"{}"}}]"#, params.get("q").cloned().unwrap_or_default())
            }),
        );
        let base = serve(app).await;

        let gateway = HttpFetchGateway::new(format!("{base}/search/smart"), 5);
        let body = gateway.fetch("Bondi 2026").await.unwrap();
        assert_eq!(body, r#"[{"q":"Bondi 2026"}]"#);
    }

    #[tokio::test]
    async fn non_success_status_is_error() {
        let app = Router::new().route(
            "/search/smart",
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "down") }),
        );
        let base = serve(app).await;

        let gateway = HttpFetchGateway::new(format!("{base}/search/smart"), 5);
        match gateway.fetch("Bondi").await {
            Err(FetchError::Status { status_code, message }) => {
                assert_eq!(status_code, 503);
                assert_eq!(message, "down");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_service_is_network_error() {
        // Port 9 (discard) is closed on test hosts
        let gateway = HttpFetchGateway::new("http://127.0.0.1:9/search", 2);
        let err = gateway.fetch("Bondi").await.unwrap_err();
        assert!(matches!(err, FetchError::Network(_) | FetchError::Timeout(_)));
    }
}
