//! `HttpClient` backed by reqwest

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy},
};
use reqwest::{redirect::Policy, Client};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

const DEFAULT_USER_AGENT: &str = concat!("strm-helper/", env!("CARGO_PKG_VERSION"));

/// Pooled reqwest client.
///
/// Redirects are not followed: download endpoints answer with the signed URL
/// and the caller decides what to do with it. `5xx` responses and transport
/// errors are retried according to the [`RetryPolicy`]; a `429` is returned
/// at once as `RateLimited`.
pub struct ReqwestHttpClient {
    client: Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .redirect(Policy::none())
            .user_agent(DEFAULT_USER_AGENT)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client");
                Client::new()
            });

        Self { client }
    }

    fn build_request(&self, request: HttpRequest) -> reqwest::RequestBuilder {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
        };
        let mut req = self.client.request(method, &request.url);

        for (key, value) in request.headers {
            req = req.header(key, value);
        }
        if let Some(body) = request.body {
            req = req.body(body);
        }
        if let Some(timeout) = request.timeout {
            req = req.timeout(timeout);
        }

        req
    }

    /// One round-trip. `Ok(None)` means a retryable server error.
    async fn attempt(&self, request: &HttpRequest) -> Result<Option<HttpResponse>> {
        let target = loggable_url(&request.url);
        let response = self
            .build_request(request.clone())
            .send()
            .await
            .map_err(|e| {
                let e = e.without_url();
                if e.is_timeout() {
                    BridgeError::OperationFailed(format!("Request to {} timed out", target))
                } else if e.is_connect() {
                    BridgeError::OperationFailed(format!("Connection to {} failed: {}", target, e))
                } else {
                    BridgeError::OperationFailed(format!("Request to {} failed: {}", target, e))
                }
            })?;

        let status = response.status().as_u16();
        if status == 429 {
            return Err(BridgeError::RateLimited(format!("HTTP 429 from {}", target)));
        }
        if status >= 500 {
            warn!(status, url = %target, "Server error");
            return Ok(None);
        }

        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.to_string(), s.to_string())))
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| BridgeError::OperationFailed(e.without_url().to_string()))?;

        Ok(Some(HttpResponse {
            status,
            headers,
            body,
        }))
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.execute_with_retry(request, RetryPolicy::default()).await
    }

    async fn execute_with_retry(
        &self,
        request: HttpRequest,
        policy: RetryPolicy,
    ) -> Result<HttpResponse> {
        let attempts = policy.max_attempts.max(1);
        let target = loggable_url(&request.url);
        let mut last_error = None;

        for attempt in 1..=attempts {
            debug!(attempt, attempts, url = %target, "HTTP request");

            match self.attempt(&request).await {
                Ok(Some(response)) => return Ok(response),
                Ok(None) => {
                    last_error = Some(BridgeError::OperationFailed(format!(
                        "Server error from {}",
                        target
                    )))
                }
                Err(BridgeError::RateLimited(message)) => {
                    return Err(BridgeError::RateLimited(message))
                }
                Err(e) => {
                    warn!(error = %e, attempt, "HTTP request failed");
                    last_error = Some(e);
                }
            }

            if attempt < attempts {
                sleep(policy.delay_after(attempt)).await;
            }
        }

        Err(last_error.unwrap_or_else(|| {
            BridgeError::OperationFailed("All retry attempts exhausted".to_string())
        }))
    }
}
/// Scheme, host and path only; query strings carry API keys and share codes
fn loggable_url(url: &str) -> String {
    match reqwest::Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_query(None);
            parsed.set_fragment(None);
            // fails only for URLs that cannot carry credentials
            let _ = parsed.set_username("");
            let _ = parsed.set_password(None);
            parsed.to_string()
        }
        Err(_) => url.split(['?', '#']).next().unwrap_or_default().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_request_carries_cookie_and_form() {
        let client = ReqwestHttpClient::new();
        let request = HttpRequest::new(HttpMethod::Post, "http://localhost/app/chrome/downurl")
            .cookie("UID=1")
            .form(&[("data", "x")]);

        let built = client.build_request(request).build().unwrap();
        assert_eq!(built.method(), reqwest::Method::POST);
        assert_eq!(built.headers().get("Cookie").unwrap(), "UID=1");
        assert_eq!(built.body().and_then(|b| b.as_bytes()), Some(&b"data=x"[..]));
    }

    #[test]
    fn test_loggable_url_drops_secrets() {
        assert_eq!(
            loggable_url("http://emby:8096/Library/Media/Updated?api_key=s3cr3t"),
            "http://emby:8096/Library/Media/Updated"
        );
        assert_eq!(
            loggable_url("https://u:p@webapi.115.com/share/downurl?receive_code=ab12#x"),
            "https://webapi.115.com/share/downurl"
        );
        assert_eq!(loggable_url("not a url?api_key=s3cr3t"), "not a url");
    }

    #[tokio::test]
    async fn test_connection_failure_is_operation_failed() {
        let client = ReqwestHttpClient::with_timeout(Duration::from_secs(1));
        let request =
            HttpRequest::new(HttpMethod::Get, "http://127.0.0.1:9/unreachable?api_key=s3cr3t");

        let result = client.execute_with_retry(request, RetryPolicy::none()).await;
        match result {
            Err(BridgeError::OperationFailed(message)) => {
                assert!(!message.contains("s3cr3t"), "{}", message)
            }
            other => panic!("expected OperationFailed, got {:?}", other),
        }
    }
}
