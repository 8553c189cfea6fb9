// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the messaging provider REST API.
//!
//! Provides [`ProviderClient`] which handles request construction, bearer
//! authentication, client-side rate limiting and status-code classification.
//! The client never retries on its own: a send that may have reached the
//! provider is handed back to the caller as a failure.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use courier_core::types::{ActivityPage, OutboundMessage, SendReceipt};
use courier_core::CourierError;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::rate_limit::TokenBucket;
use crate::types::ApiErrorResponse;

/// HTTP client for provider API communication.
pub struct ProviderClient {
    client: reqwest::Client,
    base_url: String,
    page_size: u32,
    timeout: Duration,
    limiter: TokenBucket,
}

impl std::fmt::Debug for ProviderClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderClient")
            .field("base_url", &self.base_url)
            .field("page_size", &self.page_size)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ProviderClient {
    /// Creates a new client.
    ///
    /// # Arguments
    /// * `base_url` - API root, e.g. `https://api.example.com/v1`
    /// * `api_key` - sent as `Authorization: Bearer <key>`
    /// * `timeout` - upper bound on every request
    /// * `requests_per_second`, `burst` - token bucket parameters
    /// * `page_size` - `limit` requested per activity feed page
    pub fn new(
        base_url: &str,
        api_key: &str,
        timeout: Duration,
        requests_per_second: u32,
        burst: u32,
        page_size: u32,
    ) -> Result<Self, CourierError> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|e| CourierError::Config(format!("invalid API key header value: {e}")))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| CourierError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                retryable: false,
                source: Some(Box::new(e)),
            })?;

        let base_url = base_url.trim_end_matches('/').to_string();
        Url::parse(&base_url)
            .map_err(|e| CourierError::Config(format!("invalid provider base_url `{base_url}`: {e}")))?;

        Ok(Self {
            client,
            base_url,
            page_size: page_size.max(1),
            timeout,
            limiter: TokenBucket::new(requests_per_second, burst),
        })
    }

    /// Overrides the base URL (for testing with wiremock).
    #[cfg(test)]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url, CourierError> {
        Url::parse(&format!("{}/{path}", self.base_url))
            .map_err(|e| CourierError::Internal(format!("failed to build provider URL: {e}")))
    }

    /// Submits one message. Returns the provider's receipt.
    pub async fn send_message(&self, message: &OutboundMessage) -> Result<SendReceipt, CourierError> {
        let url = self.endpoint("messages")?;
        self.limiter.acquire().await;

        let response = self
            .client
            .post(url)
            .json(message)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        debug!(status = %status, to = %message.to, "send response received");
        self.read_json(response).await
    }

    /// Fetches one page of the activity feed.
    ///
    /// Pages are requested oldest first (`order=asc`); reconciliation relies on
    /// that order to checkpoint after each page.
    pub async fn list_activities(
        &self,
        since: DateTime<Utc>,
        cursor: Option<&str>,
    ) -> Result<ActivityPage, CourierError> {
        let mut url = self.endpoint("activities")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("since", &since.to_rfc3339_opts(SecondsFormat::Secs, true));
            query.append_pair("order", "asc");
            if let Some(cursor) = cursor {
                query.append_pair("cursor", cursor);
            }
            query.append_pair("limit", &self.page_size.to_string());
        }
        self.limiter.acquire().await;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        debug!(status = %status, cursor = cursor.unwrap_or(""), "activity page received");
        self.read_json(response).await
    }

    async fn read_json<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, CourierError> {
        let status = response.status();
        let body = response.text().await.map_err(|e| self.request_error(e))?;

        if status.is_success() {
            return serde_json::from_str(&body).map_err(|e| CourierError::Provider {
                message: format!("failed to parse provider response: {e}"),
                retryable: false,
                source: Some(Box::new(e)),
            });
        }

        let detail = match serde_json::from_str::<ApiErrorResponse>(&body) {
            Ok(api_err) => api_err.summary(),
            Err(_) => body,
        };
        let retryable = is_transient_error(status);
        if retryable {
            warn!(status = %status, detail = %detail, "transient provider error");
        }
        Err(CourierError::Provider {
            message: format!("provider returned {status}: {detail}"),
            retryable,
            source: None,
        })
    }

    /// Network failures never prove the request was rejected, so they are
    /// all transient. A timeout keeps its own variant.
    fn request_error(&self, e: reqwest::Error) -> CourierError {
        if e.is_timeout() {
            return CourierError::Timeout {
                duration: self.timeout,
            };
        }
        CourierError::Provider {
            message: format!("HTTP request failed: {e}"),
            retryable: true,
            source: Some(Box::new(e)),
        }
    }
}

/// Returns true for throttling and server-side failures.
fn is_transient_error(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::types::{ActivityKind, ActivityStatus};
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> ProviderClient {
        ProviderClient::new(
            "https://unused.example/v1",
            "test-key",
            Duration::from_secs(5),
            100,
            100,
            2,
        )
        .unwrap()
        .with_base_url(server.uri())
    }

    fn message() -> OutboundMessage {
        OutboundMessage {
            from: "+15550002222".into(),
            to: "+15550001111".into(),
            body: "hello".into(),
            media_urls: vec![],
        }
    }

    #[test]
    fn transient_status_codes() {
        assert!(is_transient_error(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_transient_error(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_transient_error(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_transient_error(StatusCode::BAD_REQUEST));
        assert!(!is_transient_error(StatusCode::UNAUTHORIZED));
        assert!(!is_transient_error(StatusCode::UNPROCESSABLE_ENTITY));
    }

    #[test]
    fn rejects_unparseable_base_url() {
        let err = ProviderClient::new("not a url", "k", Duration::from_secs(1), 1, 1, 1).unwrap_err();
        assert!(matches!(err, CourierError::Config(_)));
    }

    #[tokio::test]
    async fn send_posts_json_with_bearer_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_json(serde_json::json!({
                "from": "+15550002222",
                "to": "+15550001111",
                "body": "hello",
                "media_urls": []
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "id": "msg_out_1",
                "status": "queued",
                "created_at": "2026-03-01T10:00:00Z"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let receipt = client(&server).send_message(&message()).await.unwrap();
        assert_eq!(receipt.external_id, "msg_out_1");
        assert_eq!(receipt.status, ActivityStatus::Queued);
    }

    #[tokio::test]
    async fn throttling_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server).send_message(&message()).await.unwrap_err();
        assert!(err.is_transient(), "got {err:?}");
    }

    #[tokio::test]
    async fn client_errors_are_permanent_and_carry_api_detail() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": {"code": "invalid_number", "message": "destination is not reachable"}
            })))
            .mount(&server)
            .await;

        let err = client(&server).send_message(&message()).await.unwrap_err();
        match err {
            CourierError::Provider {
                message, retryable, ..
            } => {
                assert!(!retryable);
                assert!(message.contains("invalid_number"), "{message}");
            }
            other => panic!("expected provider error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_response_is_a_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let client = ProviderClient::new(
            "https://unused.example",
            "k",
            Duration::from_millis(200),
            100,
            100,
            10,
        )
        .unwrap()
        .with_base_url(server.uri());
        let err = client.send_message(&message()).await.unwrap_err();
        assert!(matches!(err, CourierError::Timeout { .. }), "got {err:?}");
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn list_activities_passes_cursor_and_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/activities"))
            .and(query_param("since", "2026-03-01T00:00:00Z"))
            .and(query_param("cursor", "c2"))
            .and(query_param("limit", "2"))
            .and(query_param("order", "asc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{
                    "id": "call_1", "direction": "inbound", "kind": "call",
                    "from": "+15550001111", "to": "+15550002222",
                    "status": "completed", "created_at": "2026-03-01T09:00:00Z"
                }],
                "next_cursor": null
            })))
            .expect(1)
            .mount(&server)
            .await;

        let since = "2026-03-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let page = client(&server)
            .list_activities(since, Some("c2"))
            .await
            .unwrap();
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].kind, ActivityKind::Call);
        assert!(page.next_cursor.is_none());
    }

    #[tokio::test]
    async fn feed_server_error_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/activities"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client(&server)
            .list_activities(Utc::now(), None)
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }
}
