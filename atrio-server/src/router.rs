use std::sync::Arc;
use std::time::Instant;

use atrio_core::ipc::{ControlRequest, ControlResponse};
use atrio_core::relay::{EndpointResolver, RelayClient};
use atrio_core::AtrioConfig;
use atrio_sync::SubscriptionRegistry;
use sqlx::PgPool;

use crate::subsystems::relay::{self, RelayRequest};

/// Everything the control socket can touch. Built once in `main`, shared
/// with the accept loop.
#[derive(Clone)]
pub struct ControlContext {
    pub pool: PgPool,
    pub config: AtrioConfig,
    pub registry: Arc<SubscriptionRegistry>,
    pub relay: Arc<RelayClient>,
    pub resolver: Arc<dyn EndpointResolver>,
    pub started_at: Instant,
}

pub async fn handle_request(request: ControlRequest, ctx: &ControlContext) -> ControlResponse {
    match request {
        ControlRequest::Ping => ControlResponse::pong(),
        ControlRequest::Health => match atrio_core::db::health_check(&ctx.pool).await {
            Ok(pg_ver) => ControlResponse::ok(serde_json::json!({
                "postgresql": pg_ver,
                "status": "healthy"
            })),
            Err(e) => ControlResponse::err(format!("DB Health Check failed: {}", e)),
        },
        ControlRequest::Stats => ControlResponse::ok(serde_json::json!({
            "active_scopes": ctx.registry.active_scopes(),
            "uptime_seconds": ctx.started_at.elapsed().as_secs(),
            "relay_endpoints": ctx.config.relay.endpoints.len(),
        })),
        ControlRequest::RelayTest {
            endpoint_key,
            payload,
        } => {
            let request = RelayRequest {
                endpoint_key,
                payload: payload.unwrap_or_else(|| serde_json::json!({"test": true})),
                idempotency_key: None,
            };
            let (status, body) = relay::handle(
                &ctx.pool,
                ctx.resolver.as_ref(),
                &ctx.relay,
                "control-socket",
                request,
            )
            .await;
            if status.is_success() {
                ControlResponse::ok(body)
            } else {
                ControlResponse::err(
                    body["error"]
                        .as_str()
                        .unwrap_or("relay test failed")
                        .to_string(),
                )
            }
        }
    }
}
