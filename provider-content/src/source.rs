//! HTTP implementation of the remote content source.

use async_trait::async_trait;
use bridge_traits::content::{ContentMetadata, ContentPayload, RemoteContentSource, SourceError};
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::error::{ProviderError, Result};
use crate::types::{ApiErrorBody, IndexResponse};

/// Longest error body echoed into an error message.
const MAX_ERROR_BODY: usize = 256;

/// Content API client.
///
/// Issues exactly one request per call: retry, backoff and timeouts across
/// attempts belong to the fetch orchestrator.
///
/// # Example
///
/// ```ignore
/// use provider_content::HttpContentSource;
///
/// let source = HttpContentSource::new(http_client, "https://content.example.com/v1")?
///     .with_api_key(key);
/// let index = source.fetch_index().await?;
/// ```
pub struct HttpContentSource {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
    api_key: Option<String>,
    request_timeout: Option<Duration>,
}

impl HttpContentSource {
    pub fn new(http_client: Arc<dyn HttpClient>, base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into();
        let trimmed = base_url.trim().trim_end_matches('/');
        if !(trimmed.starts_with("http://") || trimmed.starts_with("https://"))
            || trimmed.len() <= "https://".len()
        {
            return Err(ProviderError::InvalidBaseUrl(base_url));
        }
        Ok(Self {
            http_client,
            base_url: trimmed.to_string(),
            api_key: None,
            request_timeout: None,
        })
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Per-request deadline handed to the HTTP bridge.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    fn content_url(&self, key: &str) -> String {
        format!("{}/content/{}", self.base_url, urlencoding::encode(key))
    }

    fn index_url(&self) -> String {
        format!("{}/index", self.base_url)
    }

    fn request(&self, url: String) -> HttpRequest {
        let mut request =
            HttpRequest::new(HttpMethod::Get, url).header("Accept", "application/json");
        if let Some(key) = &self.api_key {
            request = request.bearer_token(key.clone());
        }
        if let Some(timeout) = self.request_timeout {
            request = request.timeout(timeout);
        }
        request
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String) -> Result<T> {
        let response = self.http_client.execute(self.request(url)).await?;
        let response = check_status(response)?;
        serde_json::from_slice(&response.body).map_err(|e| ProviderError::ParseError(e.to_string()))
    }

    #[instrument(skip(self))]
    async fn content(&self, key: &str) -> Result<ContentPayload> {
        let payload: ContentPayload = self.get_json(self.content_url(key)).await?;
        debug!(key, version = payload.version, "Fetched content");
        Ok(payload)
    }

    #[instrument(skip(self))]
    async fn index(&self) -> Result<Vec<ContentMetadata>> {
        let index: IndexResponse = self.get_json(self.index_url()).await?;
        let items = index.into_items();
        debug!(entries = items.len(), "Fetched content index");
        Ok(items)
    }
}

impl std::fmt::Debug for HttpContentSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpContentSource")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

fn check_status(response: HttpResponse) -> Result<HttpResponse> {
    if response.is_success() {
        return Ok(response);
    }

    let status = response.status;
    if status == 429 {
        let retry_after = response
            .header("Retry-After")
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        warn!(?retry_after, "Content API rate limited");
        return Err(ProviderError::RateLimited { retry_after });
    }

    let message = error_message(&response);
    warn!(status, %message, "Content API request failed");
    Err(ProviderError::ApiError {
        status_code: status,
        message,
    })
}

fn error_message(response: &HttpResponse) -> String {
    if let Ok(body) = serde_json::from_slice::<ApiErrorBody>(&response.body) {
        return body.message;
    }
    let text = String::from_utf8_lossy(&response.body);
    let text = text.trim();
    if text.is_empty() {
        return format!("HTTP {}", response.status);
    }
    text.chars().take(MAX_ERROR_BODY).collect()
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl RemoteContentSource for HttpContentSource {
    async fn fetch_content(&self, key: &str) -> std::result::Result<ContentPayload, SourceError> {
        self.content(key).await.map_err(SourceError::from)
    }

    async fn fetch_index(&self) -> std::result::Result<Vec<ContentMetadata>, SourceError> {
        self.index().await.map_err(SourceError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::BridgeError;
    use bytes::Bytes;
    use mockall::mock;
    use mockall::predicate::function;
    use std::collections::HashMap;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> bridge_traits::error::Result<HttpResponse>;
        }
    }

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        }
    }

    fn source(client: MockHttpClient) -> HttpContentSource {
        HttpContentSource::new(Arc::new(client), "https://content.example.com/v1/")
            .unwrap()
            .with_api_key("secret-key")
    }

    #[tokio::test]
    async fn test_fetch_content_builds_request() {
        let mut client = MockHttpClient::new();
        client
            .expect_execute()
            .with(function(|req: &HttpRequest| {
                req.url == "https://content.example.com/v1/content/python%20basics"
                    && req.method == HttpMethod::Get
                    && req.headers.get("Authorization").map(String::as_str)
                        == Some("Bearer secret-key")
            }))
            .times(1)
            .returning(|_| {
                Ok(response(
                    200,
                    r#"{"key":"python basics","category":"python","version":4,"body":{"units":["a"]}}"#,
                ))
            });

        let payload = source(client).fetch_content("python basics").await.unwrap();
        assert_eq!(payload.version, 4);
        assert_eq!(payload.category, "python");
    }

    #[tokio::test]
    async fn test_fetch_index() {
        let mut client = MockHttpClient::new();
        client
            .expect_execute()
            .with(function(|req: &HttpRequest| {
                req.url == "https://content.example.com/v1/index"
            }))
            .returning(|_| {
                Ok(response(
                    200,
                    r#"{"items":[{"key":"go-basics","category":"go","version":2,"title":"Go"}]}"#,
                ))
            });

        let index = source(client).fetch_index().await.unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index[0].key, "go-basics");
    }

    #[tokio::test]
    async fn test_rate_limit_carries_retry_after() {
        let mut client = MockHttpClient::new();
        client.expect_execute().returning(|_| {
            let mut resp = response(429, "");
            resp.headers.insert("retry-after".into(), "7".into());
            Ok(resp)
        });

        let err = source(client).fetch_content("go-basics").await.unwrap_err();
        assert_eq!(
            err,
            SourceError::RateLimited {
                retry_after: Some(Duration::from_secs(7))
            }
        );
    }

    #[tokio::test]
    async fn test_client_error_is_permanent() {
        let mut client = MockHttpClient::new();
        client
            .expect_execute()
            .returning(|_| Ok(response(404, r#"{"message":"no such content"}"#)));

        let err = source(client).fetch_content("nope").await.unwrap_err();
        assert!(!err.is_transient());
        assert!(err.to_string().contains("no such content"));
    }

    #[tokio::test]
    async fn test_server_error_and_bad_body_are_transient() {
        let mut client = MockHttpClient::new();
        client
            .expect_execute()
            .times(1)
            .returning(|_| Ok(response(503, "maintenance")));
        let err = source(client).fetch_content("go-basics").await.unwrap_err();
        assert!(matches!(err, SourceError::ServerError { status: 503, .. }));

        let mut client = MockHttpClient::new();
        client
            .expect_execute()
            .returning(|_| Ok(response(200, "<html>")));
        let err = source(client).fetch_content("go-basics").await.unwrap_err();
        assert!(err.is_transient());
        assert!(!err.is_network());
    }

    #[tokio::test]
    async fn test_transport_failures_map_to_network() {
        let mut client = MockHttpClient::new();
        client
            .expect_execute()
            .returning(|_| Err(BridgeError::Unreachable("connection refused".into())));

        let err = source(client).fetch_index().await.unwrap_err();
        assert!(err.is_network());
    }

    #[test]
    fn test_base_url_validation_and_redaction() {
        assert!(HttpContentSource::new(Arc::new(MockHttpClient::new()), "ftp://x").is_err());
        assert!(HttpContentSource::new(Arc::new(MockHttpClient::new()), "https://").is_err());

        let printed = format!("{:?}", source(MockHttpClient::new()));
        assert!(printed.contains("<redacted>"));
        assert!(!printed.contains("secret-key"));
    }
}
