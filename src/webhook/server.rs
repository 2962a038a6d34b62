//! Admission Webhook Server
//!
//! This module implements the Kubernetes ValidatingAdmissionWebhook endpoint
//! for NodeMaintenance objects. Every rejection, including one caused by an
//! unreadable or slow cluster, is returned as a denied AdmissionResponse so
//! the API server never persists a request that was not positively checked.
//!
//! The API server appends `?timeout=<duration>` to the webhook URL. Create
//! validations finish within that timeout (or the configured read timeout,
//! whichever is shorter) so the verdict is ours rather than the
//! `failurePolicy`'s.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use axum_server::tls_rustls::RustlsConfig;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use super::error::ValidationError;
use super::validator::MaintenanceValidator;
use crate::crd::NodeMaintenance;
use crate::error::{Error, Result};

/// Path the ValidatingWebhookConfiguration points at
pub const VALIDATE_PATH: &str = "/validate-nodemaintenance";

/// Webhook server state
pub struct WebhookServer {
    validator: MaintenanceValidator,

    /// TLS configuration
    tls_config: Option<TlsConfig>,
}

/// TLS configuration for the webhook server
#[derive(Clone, Debug)]
pub struct TlsConfig {
    pub cert_path: String,
    pub key_path: String,
}

/// Query parameters the API server adds to webhook calls
#[derive(Debug, Default, Deserialize)]
pub struct ValidateParams {
    /// Go duration string such as `10s`
    pub timeout: Option<String>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

impl WebhookServer {
    /// Create a new webhook server
    pub fn new(validator: MaintenanceValidator) -> Self {
        Self {
            validator,
            tls_config: None,
        }
    }

    /// Configure TLS
    pub fn with_tls(mut self, cert_path: String, key_path: String) -> Self {
        self.tls_config = Some(TlsConfig {
            cert_path,
            key_path,
        });
        self
    }

    /// Decide a single admission request
    ///
    /// `request_timeout` is the time the API server waits for the verdict.
    #[instrument(skip(self, req, request_timeout), fields(uid = %req.uid, operation = ?req.operation))]
    pub async fn review(
        &self,
        req: &AdmissionRequest<NodeMaintenance>,
        request_timeout: Option<Duration>,
    ) -> AdmissionResponse {
        let verdict = match req.operation {
            Operation::Create => match req.object.as_ref() {
                Some(candidate) => {
                    self.validator
                        .validate_create_within(candidate, request_timeout)
                        .await
                }
                None => return deny_malformed(req, "CREATE request without object"),
            },
            Operation::Update => match (req.old_object.as_ref(), req.object.as_ref()) {
                (Some(old), Some(candidate)) => self.validator.validate_update(old, candidate),
                _ => return deny_malformed(req, "UPDATE request without object and oldObject"),
            },
            Operation::Delete | Operation::Connect => Ok(()),
        };

        match verdict {
            Ok(()) => {
                info!("Admitted {:?} of NodeMaintenance {}", req.operation, req.name);
                AdmissionResponse::from(req)
            }
            Err(err) => deny(req, &err),
        }
    }

    /// Build the HTTP router
    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route("/healthz", get(health_handler))
            .route("/readyz", get(health_handler))
            .route(VALIDATE_PATH, post(validate_handler))
            .layer(tower_http::trace::TraceLayer::new_for_http())
            .with_state(self)
    }

    /// Start the webhook server
    pub async fn start(self, addr: SocketAddr) -> Result<()> {
        let tls = self.tls_config.clone();
        let app = Arc::new(self).router();

        match tls {
            Some(tls) => {
                // Both ring and aws-lc-rs may be compiled in; pick one explicitly.
                let _ = rustls::crypto::ring::default_provider().install_default();
                let config = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path).await?;

                info!("Starting webhook server on {} (TLS)", addr);
                axum_server::bind_rustls(addr, config)
                    .serve(app.into_make_service())
                    .await
                    .map_err(|e| Error::ServerError(format!("Server error: {e}")))?;
            }
            None => {
                warn!("No TLS certificate configured, serving plain HTTP on {}", addr);
                let listener = tokio::net::TcpListener::bind(addr)
                    .await
                    .map_err(|e| Error::ServerError(format!("Failed to bind to {addr}: {e}")))?;

                axum::serve(listener, app)
                    .await
                    .map_err(|e| Error::ServerError(format!("Server error: {e}")))?;
            }
        }

        Ok(())
    }
}

fn deny(req: &AdmissionRequest<NodeMaintenance>, err: &ValidationError) -> AdmissionResponse {
    if err.is_retryable() {
        warn!("Denying NodeMaintenance {}: {}", req.name, err);
    } else {
        info!("Denying NodeMaintenance {}: {}", req.name, err);
    }
    let mut response = AdmissionResponse::from(req).deny(err.to_string());
    response.result.reason = err.code().to_string();
    response
}

fn deny_malformed(req: &AdmissionRequest<NodeMaintenance>, message: &str) -> AdmissionResponse {
    error!("Malformed admission request {}: {}", req.uid, message);
    AdmissionResponse::from(req).deny(message)
}

/// Parse the duration strings the API server sends (`10s`, `1500ms`, `1m`)
fn parse_request_timeout(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let (digits, unit) = match raw.find(|c: char| !c.is_ascii_digit()) {
        Some(split) => raw.split_at(split),
        None => (raw, "s"),
    };
    let value: u64 = digits.parse().ok()?;
    match unit {
        "ms" => Some(Duration::from_millis(value)),
        "s" => Some(Duration::from_secs(value)),
        "m" => Some(Duration::from_secs(value.checked_mul(60)?)),
        _ => None,
    }
}

// HTTP Handlers

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

#[instrument(skip(state, review))]
async fn validate_handler(
    State(state): State<Arc<WebhookServer>>,
    Query(params): Query<ValidateParams>,
    Json(review): Json<AdmissionReview<NodeMaintenance>>,
) -> impl IntoResponse {
    let request_timeout = params.timeout.as_deref().and_then(|raw| {
        let parsed = parse_request_timeout(raw);
        if parsed.is_none() {
            warn!("Ignoring unparsable webhook timeout {:?}", raw);
        }
        parsed
    });

    let req: AdmissionRequest<NodeMaintenance> = match review.try_into() {
        Ok(req) => req,
        Err(e) => {
            error!("Failed to parse admission request: {}", e);
            return (
                StatusCode::BAD_REQUEST,
                Json(
                    AdmissionResponse::invalid(format!("Invalid admission request: {e}"))
                        .into_review(),
                ),
            );
        }
    };

    let response = state.review(&req, request_timeout).await;
    (StatusCode::OK, Json(response.into_review()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhook::config::{
        GuardConfig, ETCD_QUORUM_PDB_NAME, ETCD_QUORUM_PDB_NAMESPACE, LABEL_ROLE_CONTROL_PLANE,
    };
    use crate::webhook::mock::{
        test_disruption_budget, test_node, InMemoryClusterState, MockResource,
    };
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn server(state: &Arc<InMemoryClusterState>) -> Arc<WebhookServer> {
        let config = GuardConfig {
            read_timeout_ms: 200,
            ..Default::default()
        };
        Arc::new(WebhookServer::new(MaintenanceValidator::new(
            state.clone(),
            &config,
        )))
    }

    fn nm_json(name: &str, node: &str) -> serde_json::Value {
        serde_json::json!({
            "apiVersion": "nodemaintenance.medik8s.io/v1beta1",
            "kind": "NodeMaintenance",
            "metadata": { "name": name },
            "spec": { "nodeName": node, "reason": "test" }
        })
    }

    fn review_json(
        operation: &str,
        object: Option<serde_json::Value>,
        old_object: Option<serde_json::Value>,
    ) -> serde_json::Value {
        serde_json::json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": "705ab4f5-6393-11e8-b7cc-42010a800002",
                "kind": {
                    "group": "nodemaintenance.medik8s.io",
                    "version": "v1beta1",
                    "kind": "NodeMaintenance"
                },
                "resource": {
                    "group": "nodemaintenance.medik8s.io",
                    "version": "v1beta1",
                    "resource": "nodemaintenances"
                },
                "name": "nm",
                "operation": operation,
                "userInfo": { "username": "kubernetes-admin", "groups": ["system:masters"] },
                "object": object,
                "oldObject": old_object,
                "dryRun": false
            }
        })
    }

    async fn post_review(
        server: Arc<WebhookServer>,
        body: String,
    ) -> (StatusCode, serde_json::Value) {
        post_review_to(server, VALIDATE_PATH, body).await
    }

    async fn post_review_to(
        server: Arc<WebhookServer>,
        uri: &str,
        body: String,
    ) -> (StatusCode, serde_json::Value) {
        let response = server
            .router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_create_for_existing_node_admitted() {
        let state = InMemoryClusterState::new();
        state.add_node(test_node("node-exists", &[])).await;

        let body = review_json("CREATE", Some(nm_json("nm", "node-exists")), None);
        let (status, review) = post_review(server(&state), body.to_string()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(review["response"]["allowed"], true);
        assert_eq!(
            review["response"]["uid"],
            "705ab4f5-6393-11e8-b7cc-42010a800002"
        );
    }

    #[tokio::test]
    async fn test_create_for_missing_node_denied() {
        let state = InMemoryClusterState::new();

        let body = review_json("CREATE", Some(nm_json("nm", "node-not-exists")), None);
        let (status, review) = post_review(server(&state), body.to_string()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(review["response"]["allowed"], false);
        let message = review["response"]["status"]["message"].as_str().unwrap();
        assert!(message.contains("no node with name node-not-exists found"));
    }

    #[tokio::test]
    async fn test_quorum_violation_denied_with_reason() {
        let state = InMemoryClusterState::new();
        state
            .add_node(test_node("node-exists", &[(LABEL_ROLE_CONTROL_PLANE, "")]))
            .await;
        state
            .add_disruption_budget(test_disruption_budget(
                ETCD_QUORUM_PDB_NAMESPACE,
                ETCD_QUORUM_PDB_NAME,
                Some(0),
            ))
            .await;

        let body = review_json("CREATE", Some(nm_json("nm", "node-exists")), None);
        let (_, review) = post_review(server(&state), body.to_string()).await;

        assert_eq!(review["response"]["allowed"], false);
        assert_eq!(
            review["response"]["status"]["reason"],
            "ControlPlaneQuorumViolation"
        );
    }

    #[tokio::test]
    async fn test_unreadable_cluster_fails_closed() {
        let state = InMemoryClusterState::new();
        state.add_node(test_node("node-exists", &[])).await;
        state.fail_reads(MockResource::NodeMaintenance).await;

        let body = review_json("CREATE", Some(nm_json("nm", "node-exists")), None);
        let (_, review) = post_review(server(&state), body.to_string()).await;

        assert_eq!(review["response"]["allowed"], false);
        assert_eq!(review["response"]["status"]["reason"], "ReadFailure");
    }

    #[tokio::test]
    async fn test_update_changing_node_denied() {
        let state = InMemoryClusterState::new();

        let body = review_json(
            "UPDATE",
            Some(nm_json("nm", "newNodeName")),
            Some(nm_json("nm", "node-exists")),
        );
        let (_, review) = post_review(server(&state), body.to_string()).await;

        assert_eq!(review["response"]["allowed"], false);
        let message = review["response"]["status"]["message"].as_str().unwrap();
        assert!(message.contains("updating spec.NodeName isn't allowed"));
    }

    #[tokio::test]
    async fn test_update_without_old_object_denied() {
        let state = InMemoryClusterState::new();

        let body = review_json("UPDATE", Some(nm_json("nm", "node-exists")), None);
        let (_, review) = post_review(server(&state), body.to_string()).await;

        assert_eq!(review["response"]["allowed"], false);
    }

    #[tokio::test]
    async fn test_delete_always_admitted() {
        let state = InMemoryClusterState::new();
        state.fail_reads(MockResource::Node).await;

        let body = review_json("DELETE", None, Some(nm_json("nm", "node-exists")));
        let (_, review) = post_review(server(&state), body.to_string()).await;

        assert_eq!(review["response"]["allowed"], true);
        assert_eq!(state.reads(MockResource::Node), 0);
    }

    #[tokio::test]
    async fn test_review_without_request_is_bad_request() {
        let state = InMemoryClusterState::new();

        let body = serde_json::json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview"
        });
        let (status, _) = post_review(server(&state), body.to_string()).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_garbage_body_rejected() {
        let state = InMemoryClusterState::new();

        let (status, _) = post_review(server(&state), "not json".to_string()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health_endpoints() {
        let state = InMemoryClusterState::new();
        for path in ["/healthz", "/readyz"] {
            let response = server(&state)
                .router()
                .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn test_api_server_timeout_bounds_validation() {
        let state = InMemoryClusterState::new();
        state.add_node(test_node("node-exists", &[])).await;
        state.set_read_delay(Some(Duration::from_millis(300))).await;
        let config = GuardConfig {
            read_timeout_ms: 2000,
            ..Default::default()
        };
        let server = Arc::new(WebhookServer::new(MaintenanceValidator::new(
            state.clone(),
            &config,
        )));

        let body = review_json("CREATE", Some(nm_json("nm", "node-exists")), None);
        let (_, review) = post_review(server.clone(), body.to_string()).await;
        assert_eq!(review["response"]["allowed"], true);

        let uri = format!("{VALIDATE_PATH}?timeout=500ms");
        let (status, review) = post_review_to(server, &uri, body.to_string()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(review["response"]["allowed"], false);
        assert_eq!(review["response"]["status"]["reason"], "Inconclusive");
    }

    #[tokio::test]
    async fn test_unparsable_timeout_falls_back_to_config() {
        let state = InMemoryClusterState::new();
        state.add_node(test_node("node-exists", &[])).await;

        let uri = format!("{VALIDATE_PATH}?timeout=soon");
        let body = review_json("CREATE", Some(nm_json("nm", "node-exists")), None);
        let (status, review) = post_review_to(server(&state), &uri, body.to_string()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(review["response"]["allowed"], true);
    }

    #[test]
    fn test_parse_request_timeout() {
        assert_eq!(parse_request_timeout("10s"), Some(Duration::from_secs(10)));
        assert_eq!(parse_request_timeout("1500ms"), Some(Duration::from_millis(1500)));
        assert_eq!(parse_request_timeout("1m"), Some(Duration::from_secs(60)));
        assert_eq!(parse_request_timeout("30"), Some(Duration::from_secs(30)));
        assert_eq!(parse_request_timeout("soon"), None);
        assert_eq!(parse_request_timeout(""), None);
        assert_eq!(parse_request_timeout("5h"), None);
    }
}
