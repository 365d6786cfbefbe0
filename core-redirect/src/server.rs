//! # Redirect Endpoint
//!
//! `GET /redirect_url` for media players.
//!
//! - Success: `302 Found` with `Location`, a `Content-Disposition` carrying the
//!   percent-encoded file name, and a small JSON body.
//! - Failure: `200 OK` with a plain-text explanation. Players treat any
//!   non-redirect as a failed playback. With `strict_status` the same text is
//!   sent with 400, 404 or 502 instead.
//! - When an API token is configured, a missing or wrong `apikey` gets `401`
//!   regardless of `strict_status`.

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use core_runtime::config::{StrmConfig, REDIRECT_PATH};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::error::RedirectError;
use crate::resolver::{RedirectQuery, RedirectResolver, RedirectTarget};

/// Shared state of the redirect router
#[derive(Clone)]
pub struct RedirectState {
    resolver: Arc<RedirectResolver>,
    api_token: Option<String>,
    strict_status: bool,
}

impl RedirectState {
    pub fn new(resolver: Arc<RedirectResolver>) -> Self {
        Self {
            resolver,
            api_token: None,
            strict_status: false,
        }
    }

    pub fn from_config(resolver: Arc<RedirectResolver>, config: &StrmConfig) -> Self {
        Self::new(resolver)
            .with_api_token(config.api_token.clone())
            .with_strict_status(config.redirect_strict_status)
    }

    /// Require `apikey` to match; `None` or a blank token disables the check
    pub fn with_api_token(mut self, token: Option<String>) -> Self {
        self.api_token = token.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn with_strict_status(mut self, strict: bool) -> Self {
        self.strict_status = strict;
        self
    }

    fn authorized(&self, query: &RedirectQuery) -> bool {
        match &self.api_token {
            Some(token) => query.apikey.as_deref() == Some(token.as_str()),
            None => true,
        }
    }
}

/// Router serving the redirect endpoint
pub fn router(state: RedirectState) -> Router {
    Router::new()
        .route(REDIRECT_PATH, get(redirect_url))
        .with_state(state)
}

/// Serve `router` on `listener` until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, router: Router, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let address = listener.local_addr()?;
    info!("Redirect server listening on http://{}", address);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Redirect server stopped");
    Ok(())
}

#[derive(Serialize)]
struct RedirectBody<'a> {
    status: &'static str,
    url: &'a str,
}

async fn redirect_url(
    State(state): State<RedirectState>,
    Query(query): Query<RedirectQuery>,
    headers: HeaderMap,
) -> Response {
    if !state.authorized(&query) {
        warn!("Rejected redirect request with invalid apikey");
        return error_response(&RedirectError::Unauthorized, state.strict_status);
    }

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok());

    match state.resolver.resolve_query(&query, user_agent).await {
        Ok(target) => redirect_response(&target).unwrap_or_else(|message| {
            warn!("{}", message);
            text_response(status_for_upstream(state.strict_status), message)
        }),
        Err(e) => {
            warn!("Redirect failed: {}", e);
            error_response(&e, state.strict_status)
        }
    }
}

fn redirect_response(target: &RedirectTarget) -> Result<Response, String> {
    let body = serde_json::to_string(&RedirectBody {
        status: "redirecting",
        url: &target.url,
    })
    .map_err(|e| format!("Cannot encode redirect body: {}", e))?;

    let disposition = format!(
        "attachment; filename=\"{}\"",
        urlencoding::encode(&target.file_name)
    );

    Response::builder()
        .status(StatusCode::FOUND)
        .header(header::LOCATION, target.url.as_str())
        .header(header::CONTENT_DISPOSITION, disposition)
        .header(header::CONTENT_TYPE, "application/json; charset=utf-8")
        .body(Body::from(body))
        .map_err(|e| format!("Cannot redirect to {}: {}", target.url, e))
}

fn status_for_upstream(strict: bool) -> StatusCode {
    if strict {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::OK
    }
}

fn error_response(error: &RedirectError, strict: bool) -> Response {
    let status = match error {
        RedirectError::Unauthorized => StatusCode::UNAUTHORIZED,
        _ if !strict => StatusCode::OK,
        RedirectError::Remote(_) => StatusCode::BAD_GATEWAY,
        RedirectError::NotFoundInShare { .. } => StatusCode::NOT_FOUND,
        _ => StatusCode::BAD_REQUEST,
    };
    text_response(status, error.to_string())
}

fn text_response(status: StatusCode, message: String) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        message,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeDrive;
    use axum::http::Request;
    use bridge_traits::time::ManualClock;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;
    use tower::ServiceExt;

    fn app(drive: Arc<FakeDrive>, token: Option<&str>, strict: bool) -> Router {
        let clock = Arc::new(ManualClock::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap()));
        let resolver = Arc::new(RedirectResolver::new(
            drive,
            clock,
            Duration::from_secs(120),
            16,
        ));
        router(
            RedirectState::new(resolver)
                .with_api_token(token.map(str::to_string))
                .with_strict_status(strict),
        )
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, HeaderMap, String) {
        let response = app
            .oneshot(
                Request::builder()
                    .uri(uri)
                    .header(header::USER_AGENT, "Infuse/7")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, headers, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_private_redirect() {
        let drive = Arc::new(FakeDrive {
            file_name: Some("Movie 1.mkv".to_string()),
            ..Default::default()
        });

        let (status, headers, body) = get(
            app(drive.clone(), Some("secret"), false),
            "/redirect_url?apikey=secret&pickcode=abcdefghijklmno12",
        )
        .await;

        assert_eq!(status, StatusCode::FOUND);
        assert_eq!(
            headers[header::LOCATION],
            "https://cdn.example/abcdefghijklmno12"
        );
        assert_eq!(
            headers[header::CONTENT_DISPOSITION],
            "attachment; filename=\"Movie%201.mkv\""
        );
        assert_eq!(
            headers[header::CONTENT_TYPE],
            "application/json; charset=utf-8"
        );
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "redirecting");
        assert_eq!(json["url"], "https://cdn.example/abcdefghijklmno12");
        assert_eq!(
            drive.calls(),
            vec!["download:abcdefghijklmno12:-:Infuse/7"]
        );
    }

    #[tokio::test]
    async fn test_bad_pickcode_is_plain_text_200() {
        let drive = Arc::new(FakeDrive::default());

        let (status, headers, body) = get(
            app(drive.clone(), None, false),
            "/redirect_url?pickcode=abcdefghijklmno1&file_name=a.mkv",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "text/plain; charset=utf-8");
        assert_eq!(body, "Bad pickcode: abcdefghijklmno1 a.mkv");
        assert!(drive.calls().is_empty());
    }

    #[tokio::test]
    async fn test_strict_status_codes() {
        let drive = Arc::new(FakeDrive {
            fail_downloads: std::sync::Mutex::new(1),
            ..Default::default()
        });

        let (status, _, _) = get(
            app(drive.clone(), None, true),
            "/redirect_url?pickcode=abc",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _, body) = get(
            app(drive, None, true),
            "/redirect_url?pickcode=abcdefghijklmno12",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body.contains("expired"));
    }

    #[tokio::test]
    async fn test_apikey_is_checked() {
        let drive = Arc::new(FakeDrive::default());

        let (status, _, body) = get(
            app(drive.clone(), Some("secret"), false),
            "/redirect_url?apikey=wrong&pickcode=abcdefghijklmno12",
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, "Invalid apikey");

        let (status, _, _) = get(
            app(drive.clone(), Some("secret"), false),
            "/redirect_url?pickcode=abcdefghijklmno12",
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(drive.calls().is_empty());
    }

    #[tokio::test]
    async fn test_share_name_search_without_match() {
        let drive = Arc::new(FakeDrive {
            receive_code: Some("zz99".to_string()),
            ..Default::default()
        });

        let (status, headers, body) = get(
            app(drive, None, false),
            "/redirect_url?share_code=abc&file_name=movie.mkv",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(headers.get(header::LOCATION).is_none());
        assert_eq!(body, "movie.mkv not found in share abc");
    }
}
