// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use courier_core::types::{Campaign, RetryEntry, StatusCounts};
use courier_core::CourierError;
use courier_engine::{IngestOutcome, ReconciliationStats};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::server::GatewayState;

const DEFAULT_DEAD_LETTER_LIMIT: u32 = 50;
const MAX_DEAD_LETTER_LIMIT: u32 = 500;

/// Response body for `POST /webhooks/provider`.
#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookResponse {
    /// `processed`, `duplicate` or `queued`.
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
}

/// Response body for `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct DeadLetterQuery {
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct DeadLetterResponse {
    pub entries: Vec<RetryEntry>,
}

/// Campaign state after an administrative transition.
#[derive(Debug, Serialize)]
pub struct CampaignResponse {
    pub id: String,
    pub name: String,
    pub status: String,
    pub last_dispatch_pointer: i64,
}

impl From<Campaign> for CampaignResponse {
    fn from(c: Campaign) -> Self {
        Self {
            id: c.id,
            name: c.name,
            status: c.status.to_string(),
            last_dispatch_pointer: c.last_dispatch_pointer,
        }
    }
}

/// Error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Status for an error surfaced by an administrative call.
fn admin_error(e: CourierError) -> Response {
    let status = match &e {
        CourierError::NotFound { .. } => StatusCode::NOT_FOUND,
        CourierError::InvalidTransition { .. } => StatusCode::CONFLICT,
        CourierError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        CourierError::Config(_) => StatusCode::SERVICE_UNAVAILABLE,
        CourierError::Provider { .. } | CourierError::Timeout { .. } | CourierError::Pipeline { .. } => {
            StatusCode::BAD_GATEWAY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!(error = %e, "admin request failed");
    }
    error_response(status, e.to_string())
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

/// POST /webhooks/provider
///
/// Always answers 200 once the event is stored or queued for retry, so the
/// provider does not redeliver what reconciliation will backfill anyway.
pub async fn post_provider_webhook(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Ok(raw) = std::str::from_utf8(&body) else {
        return error_response(StatusCode::BAD_REQUEST, "webhook body is not valid UTF-8");
    };
    let signature = header(&headers, "x-signature");
    let timestamp = header(&headers, "x-timestamp");

    match state.services.ingestor.ingest(raw, signature, timestamp).await {
        Ok(IngestOutcome::Processed { external_id, .. }) => Json(WebhookResponse {
            status: "processed".into(),
            external_id: Some(external_id),
        })
        .into_response(),
        Ok(IngestOutcome::Duplicate { external_id }) => Json(WebhookResponse {
            status: "duplicate".into(),
            external_id: Some(external_id),
        })
        .into_response(),
        Err(CourierError::Transient(_)) => Json(WebhookResponse {
            status: "queued".into(),
            external_id: None,
        })
        .into_response(),
        Err(e @ (CourierError::InvalidSignature | CourierError::StalePayload { .. })) => {
            error_response(StatusCode::UNAUTHORIZED, e.to_string())
        }
        Err(e @ CourierError::MalformedPayload(_)) => {
            error_response(StatusCode::BAD_REQUEST, e.to_string())
        }
        Err(e @ CourierError::Config(_)) => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
        Err(e) => {
            warn!(error = %e, "webhook failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// POST /v1/reconcile
pub async fn post_reconcile(State(state): State<GatewayState>) -> Response {
    let service = &state.services.reconciliation;
    match service.run(service.default_lookback()).await {
        Ok(stats) => Json::<ReconciliationStats>(stats).into_response(),
        Err(e) => admin_error(e),
    }
}

pub async fn post_campaign_activate(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Response {
    campaign_result(state.services.dispatch.activate(&id).await)
}

pub async fn post_campaign_pause(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Response {
    campaign_result(state.services.dispatch.pause(&id).await)
}

pub async fn post_campaign_resume(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Response {
    campaign_result(state.services.dispatch.resume(&id).await)
}

fn campaign_result(result: Result<Campaign, CourierError>) -> Response {
    match result {
        Ok(campaign) => Json(CampaignResponse::from(campaign)).into_response(),
        Err(e) => admin_error(e),
    }
}

/// GET /v1/status
///
/// Counts per status category across campaigns, members, the retry queue,
/// events, opt-outs and health checks.
pub async fn get_status(State(state): State<GatewayState>) -> Response {
    match state.services.adapters.store.status_counts().await {
        Ok(counts) => Json::<StatusCounts>(counts).into_response(),
        Err(e) => admin_error(e),
    }
}

/// GET /v1/dead-letters?limit=N
pub async fn get_dead_letters(
    State(state): State<GatewayState>,
    Query(query): Query<DeadLetterQuery>,
) -> Response {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_DEAD_LETTER_LIMIT)
        .clamp(1, MAX_DEAD_LETTER_LIMIT);
    match state.services.retry_queue.dead_letters(limit).await {
        Ok(entries) => Json(DeadLetterResponse { entries }).into_response(),
        Err(e) => admin_error(e),
    }
}

/// GET /health
pub async fn get_public_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.health.start_time.elapsed().as_secs(),
    })
}

/// GET /metrics
pub async fn get_public_metrics(State(state): State<GatewayState>) -> Response {
    match &state.health.prometheus_render {
        Some(render) => (
            [("content-type", "text/plain; version=0.0.4")],
            render(),
        )
            .into_response(),
        None => error_response(StatusCode::NOT_FOUND, "metrics are disabled"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_response_omits_missing_id() {
        let json = serde_json::to_string(&WebhookResponse {
            status: "queued".into(),
            external_id: None,
        })
        .unwrap();
        assert_eq!(json, r#"{"status":"queued"}"#);
    }

    #[test]
    fn admin_errors_map_to_statuses() {
        let not_found = admin_error(CourierError::NotFound {
            entity: "campaign",
            id: "c1".into(),
        });
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let conflict = admin_error(CourierError::InvalidTransition {
            campaign_id: "c1".into(),
            from: "draft".into(),
            to: "paused".into(),
        });
        assert_eq!(conflict.status(), StatusCode::CONFLICT);

        let upstream = admin_error(CourierError::Provider {
            message: "503".into(),
            retryable: true,
            source: None,
        });
        assert_eq!(upstream.status(), StatusCode::BAD_GATEWAY);
    }
}
