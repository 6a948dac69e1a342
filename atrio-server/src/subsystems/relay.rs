//! Relay orchestration — the server side of POST /relay
//!
//! Resolves the endpoint key (URLs and secrets stay on this side of the
//! wire), invokes the core relay client, and writes one audit row per
//! delivery attempt plus a terminal outcome row. The HTTP caller only ever
//! sees the consolidated result.

use atrio_core::relay::{EndpointResolver, RelayClient, RelayError};
use axum::http::StatusCode;
use serde::Deserialize;
use sqlx::PgPool;

use crate::subsystems::audit;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayRequest {
    pub endpoint_key: String,
    pub payload: serde_json::Value,
    pub idempotency_key: Option<String>,
}

pub async fn handle(
    pool: &PgPool,
    resolver: &dyn EndpointResolver,
    client: &RelayClient,
    caller: &str,
    request: RelayRequest,
) -> (StatusCode, serde_json::Value) {
    let Some(endpoint) = resolver.resolve(&request.endpoint_key).await else {
        return (
            StatusCode::NOT_FOUND,
            serde_json::json!({
                "success": false,
                "status": 0,
                "data": null,
                "error": format!("unknown endpoint key: {}", request.endpoint_key),
            }),
        );
    };

    let (result, attempts) = client
        .call(
            &endpoint,
            &request.payload,
            request.idempotency_key.as_deref(),
        )
        .await;

    for attempt in &attempts {
        audit::record_best_effort(
            pool,
            caller,
            "relay.attempt",
            "relay",
            &endpoint.key,
            serde_json::json!({
                "attempt": attempt.attempt,
                "status": attempt.status,
                "error": attempt.error,
                "url": endpoint.url,
            }),
        )
        .await;
    }

    match result {
        Ok(outcome) => {
            audit::record_best_effort(
                pool,
                caller,
                "relay.delivered",
                "relay",
                &endpoint.key,
                serde_json::json!({"status": outcome.status, "attempts": attempts.len()}),
            )
            .await;
            (
                StatusCode::OK,
                serde_json::json!({
                    "success": true,
                    "status": outcome.status,
                    "data": outcome.data,
                }),
            )
        }
        Err(e) => {
            audit::record_best_effort(
                pool,
                caller,
                "relay.failed",
                "relay",
                &endpoint.key,
                serde_json::json!({"attempts": attempts.len(), "error": e.to_string()}),
            )
            .await;
            let status = match &e {
                RelayError::Destination { .. } | RelayError::RetryExhausted { .. } => {
                    StatusCode::BAD_GATEWAY
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (
                status,
                serde_json::json!({
                    "success": false,
                    "status": terminal_status(&e),
                    "data": null,
                    "error": e.to_string(),
                }),
            )
        }
    }
}

/// Last destination status for the response body; 0 when we never got one.
fn terminal_status(error: &RelayError) -> u16 {
    match error {
        RelayError::Destination { code, .. } => *code,
        _ => 0,
    }
}
