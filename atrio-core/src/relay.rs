//! Webhook relay — signed, retried delivery to external automation endpoints
//!
//! The relay resolves an endpoint key to a destination URL and secret
//! (server-side only — secrets never cross the HTTP boundary), signs the
//! body with a keyed SHA-256 digest plus a timestamp header, and retries
//! transient failures with exponential backoff and jitter up to a fixed
//! attempt ceiling. Every attempt is recorded for the audit trail; the
//! caller sees a single terminal error once retries are exhausted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;

use crate::config::{RelayConfig, RelayEndpointConfig};

pub const SIGNATURE_HEADER: &str = "x-atrio-signature";
pub const TIMESTAMP_HEADER: &str = "x-atrio-timestamp";
pub const IDEMPOTENCY_HEADER: &str = "x-atrio-idempotency-key";

// ============================================================================
// Endpoint resolution
// ============================================================================

/// One resolved relay destination.
#[derive(Debug, Clone)]
pub struct RelayEndpoint {
    pub key: String,
    pub url: String,
    pub secret: String,
}

/// Maps an endpoint key to its destination. Config-backed in production;
/// substitutable in tests.
#[async_trait]
pub trait EndpointResolver: Send + Sync {
    async fn resolve(&self, key: &str) -> Option<RelayEndpoint>;
}

/// Resolver over the `[[relay.endpoints]]` config table.
pub struct StaticResolver {
    endpoints: HashMap<String, RelayEndpoint>,
}

impl StaticResolver {
    pub fn from_config(endpoints: &[RelayEndpointConfig]) -> Self {
        let endpoints = endpoints
            .iter()
            .map(|e| {
                (
                    e.key.clone(),
                    RelayEndpoint {
                        key: e.key.clone(),
                        url: e.url.clone(),
                        secret: e.secret.clone(),
                    },
                )
            })
            .collect();
        Self { endpoints }
    }
}

#[async_trait]
impl EndpointResolver for StaticResolver {
    async fn resolve(&self, key: &str) -> Option<RelayEndpoint> {
        self.endpoints.get(key).cloned()
    }
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unknown relay endpoint: {key}")]
    UnknownEndpoint { key: String },

    #[error("Destination error ({code}): {message}")]
    Destination { code: u16, message: String },

    #[error("All {attempts} relay attempts failed: {last}")]
    RetryExhausted { attempts: usize, last: String },
}

impl RelayError {
    /// Worth another attempt: network-layer failures, timeouts, 5xx, 429.
    /// Other 4xx responses fail fast — the destination understood us and
    /// said no.
    pub fn is_transient(&self) -> bool {
        match self {
            RelayError::Http(_) => true,
            RelayError::Destination { code, .. } => *code >= 500 || *code == 429,
            RelayError::UnknownEndpoint { .. } | RelayError::RetryExhausted { .. } => false,
        }
    }
}

// ============================================================================
// Call results
// ============================================================================

/// One delivery attempt, successful or not. Persisted to the audit log by
/// the caller; never exposed to the UI layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayAttempt {
    pub attempt: usize,
    pub status: Option<u16>,
    pub error: Option<String>,
}

/// Terminal result of a relay call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayOutcome {
    pub success: bool,
    pub status: u16,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub max_attempts: usize,
    pub retry_delay_ms: u64,
    pub timeout_seconds: u64,
}

impl From<&RelayConfig> for RelaySettings {
    fn from(config: &RelayConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            retry_delay_ms: config.retry_delay_ms,
            timeout_seconds: config.timeout_seconds,
        }
    }
}

/// Keyed hash over `secret . timestamp . body`, hex encoded. The receiving
/// automation service recomputes it to verify authenticity and uses the
/// timestamp to reject replays.
pub fn sign_payload(secret: &str, timestamp: i64, body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(b".");
    hasher.update(timestamp.to_string().as_bytes());
    hasher.update(b".");
    hasher.update(body.as_bytes());
    hex::encode(hasher.finalize())
}

// ============================================================================
// RelayClient
// ============================================================================

pub struct RelayClient {
    client: Client,
    settings: RelaySettings,
}

impl RelayClient {
    pub fn new(settings: RelaySettings) -> Result<Self, RelayError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()?;
        Ok(Self { client, settings })
    }

    /// Deliver `payload` to `endpoint`, retrying transient failures.
    ///
    /// Returns the terminal result plus the full attempt trail. The trail is
    /// always populated, success or not, so the caller can audit every wire
    /// interaction.
    pub async fn call(
        &self,
        endpoint: &RelayEndpoint,
        payload: &serde_json::Value,
        idempotency_key: Option<&str>,
    ) -> (Result<RelayOutcome, RelayError>, Vec<RelayAttempt>) {
        let body = payload.to_string();
        let trail = Mutex::new(Vec::new());
        let counter = AtomicUsize::new(0);

        // .take(n) counts retries after the first attempt, so the ceiling is
        // exactly max_attempts total attempts.
        let strategy = ExponentialBackoff::from_millis(self.settings.retry_delay_ms)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.settings.max_attempts.saturating_sub(1));

        let result = RetryIf::spawn(
            strategy,
            || self.attempt_once(endpoint, &body, idempotency_key, &trail, &counter),
            RelayError::is_transient,
        )
        .await;

        let attempts = trail.into_inner().unwrap_or_default();
        match result {
            Ok(outcome) => (Ok(outcome), attempts),
            Err(e) if e.is_transient() => {
                tracing::error!(
                    endpoint = %endpoint.key,
                    attempts = attempts.len(),
                    error = %e,
                    "All relay attempts failed"
                );
                let terminal = RelayError::RetryExhausted {
                    attempts: attempts.len(),
                    last: e.to_string(),
                };
                (Err(terminal), attempts)
            }
            Err(e) => (Err(e), attempts),
        }
    }

    async fn attempt_once(
        &self,
        endpoint: &RelayEndpoint,
        body: &str,
        idempotency_key: Option<&str>,
        trail: &Mutex<Vec<RelayAttempt>>,
        counter: &AtomicUsize,
    ) -> Result<RelayOutcome, RelayError> {
        let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
        let timestamp = chrono::Utc::now().timestamp();
        let signature = sign_payload(&endpoint.secret, timestamp, body);

        let mut request = self
            .client
            .post(&endpoint.url)
            .header("content-type", "application/json")
            .header(TIMESTAMP_HEADER, timestamp.to_string())
            .header(SIGNATURE_HEADER, signature)
            .body(body.to_string());
        if let Some(key) = idempotency_key {
            request = request.header(IDEMPOTENCY_HEADER, key);
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                record(trail, attempt, None, Some(e.to_string()));
                return Err(RelayError::Http(e));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            record(trail, attempt, Some(status.as_u16()), Some(message.clone()));
            return Err(RelayError::Destination {
                code: status.as_u16(),
                message,
            });
        }

        record(trail, attempt, Some(status.as_u16()), None);
        let data = response
            .json::<serde_json::Value>()
            .await
            .unwrap_or(serde_json::Value::Null);
        Ok(RelayOutcome {
            success: true,
            status: status.as_u16(),
            data,
        })
    }
}

fn record(trail: &Mutex<Vec<RelayAttempt>>, attempt: usize, status: Option<u16>, error: Option<String>) {
    if let Ok(mut trail) = trail.lock() {
        trail.push(RelayAttempt {
            attempt,
            status,
            error,
        });
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(max_attempts: usize) -> RelaySettings {
        RelaySettings {
            max_attempts,
            retry_delay_ms: 10,
            timeout_seconds: 5,
        }
    }

    fn endpoint(server: &MockServer) -> RelayEndpoint {
        RelayEndpoint {
            key: "crm-automation".to_string(),
            url: format!("{}/hook", server.uri()),
            secret: "s3cret".to_string(),
        }
    }

    #[test]
    fn test_signature_is_deterministic_and_keyed() {
        let a = sign_payload("s3cret", 1_700_000_000, r#"{"lead":"l1"}"#);
        let b = sign_payload("s3cret", 1_700_000_000, r#"{"lead":"l1"}"#);
        let other_key = sign_payload("other", 1_700_000_000, r#"{"lead":"l1"}"#);
        let other_ts = sign_payload("s3cret", 1_700_000_001, r#"{"lead":"l1"}"#);
        assert_eq!(a, b);
        assert_ne!(a, other_key);
        assert_ne!(a, other_ts);
        assert_eq!(a.len(), 64, "hex-encoded sha256");
    }

    #[test]
    fn test_backoff_delays_are_non_decreasing() {
        let delays: Vec<Duration> = ExponentialBackoff::from_millis(100)
            .max_delay(Duration::from_secs(10))
            .take(5)
            .collect();
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_successful_call_sends_signature_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header_exists(SIGNATURE_HEADER))
            .and(header_exists(TIMESTAMP_HEADER))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "received": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = RelayClient::new(settings(3)).unwrap();
        let (result, attempts) = client
            .call(&endpoint(&server), &serde_json::json!({"lead": "l1"}), None)
            .await;

        let outcome = result.expect("relay should succeed");
        assert!(outcome.success);
        assert_eq!(outcome.status, 200);
        assert_eq!(outcome.data["received"], true);
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].status, Some(200));
        assert!(attempts[0].error.is_none());
    }

    #[tokio::test]
    async fn test_idempotency_key_is_forwarded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header_exists(IDEMPOTENCY_HEADER))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let client = RelayClient::new(settings(3)).unwrap();
        let (result, _) = client
            .call(
                &endpoint(&server),
                &serde_json::json!({}),
                Some("msg-42"),
            )
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_always_failing_destination_hits_the_attempt_ceiling() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(4)
            .mount(&server)
            .await;

        let client = RelayClient::new(settings(4)).unwrap();
        let (result, attempts) = client
            .call(&endpoint(&server), &serde_json::json!({}), None)
            .await;

        assert_eq!(attempts.len(), 4, "exactly max_attempts attempts");
        match result {
            Err(RelayError::RetryExhausted { attempts, last }) => {
                assert_eq!(attempts, 4);
                assert!(last.contains("500"), "terminal error keeps the last cause: {}", last);
            }
            other => panic!("Expected RetryExhausted, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_client_error_fails_fast_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422).set_body_string("bad payload"))
            .expect(1)
            .mount(&server)
            .await;

        let client = RelayClient::new(settings(4)).unwrap();
        let (result, attempts) = client
            .call(&endpoint(&server), &serde_json::json!({}), None)
            .await;

        assert_eq!(attempts.len(), 1, "4xx must not be retried");
        assert!(matches!(
            result,
            Err(RelayError::Destination { code: 422, .. })
        ));
    }

    #[tokio::test]
    async fn test_transient_failures_then_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;

        let client = RelayClient::new(settings(4)).unwrap();
        let (result, attempts) = client
            .call(&endpoint(&server), &serde_json::json!({}), None)
            .await;

        assert!(result.is_ok(), "should recover within the ceiling");
        assert_eq!(attempts.len(), 3);
        assert_eq!(attempts[0].status, Some(503));
        assert_eq!(attempts[2].status, Some(200));
    }

    #[tokio::test]
    async fn test_static_resolver_resolves_configured_keys_only() {
        let resolver = StaticResolver::from_config(&[RelayEndpointConfig {
            key: "crm-automation".to_string(),
            url: "https://automation.example/hook".to_string(),
            secret: "s3cret".to_string(),
        }]);
        assert!(resolver.resolve("crm-automation").await.is_some());
        assert!(resolver.resolve("unknown").await.is_none());
    }
}
