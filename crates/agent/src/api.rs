//! HTTP API for the dashboard, health checks and Prometheus metrics

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use insight_lib::{
    anomaly::{ActivityEntry, AggregatorHandle, FindingQuery},
    health::{ComponentStatus, HealthRegistry},
    models::{EntityRef, Finding, Severity},
    observability::EngineMetrics,
    optimization::Recommendation,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: EngineMetrics,
    pub aggregator: AggregatorHandle,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        metrics: EngineMetrics,
        aggregator: AggregatorHandle,
    ) -> Self {
        Self {
            health_registry,
            metrics,
            aggregator,
        }
    }
}

/// Client error returned as `{ "error": ... }`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct FindingsParams {
    /// `namespace/kind/name` or `kind/name`
    pub entity: Option<String>,
    pub severity: Option<String>,
}

impl FindingsParams {
    fn into_query(self) -> Result<FindingQuery, ApiError> {
        let entity = self
            .entity
            .filter(|e| !e.is_empty())
            .map(|e| e.parse::<EntityRef>())
            .transpose()
            .map_err(|e| ApiError::bad_request(e.to_string()))?;

        let severity = self
            .severity
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<Severity>())
            .transpose()
            .map_err(|e| ApiError::bad_request(e.to_string()))?;

        Ok(FindingQuery { entity, severity })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ActivityParams {
    /// RFC 3339 timestamp, inclusive
    pub since: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FindingsResponse {
    pub count: usize,
    pub findings: Vec<Finding>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ActivityResponse {
    pub count: usize,
    pub entries: Vec<ActivityEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecommendationsResponse {
    pub count: usize,
    pub recommendations: Vec<Recommendation>,
}

/// Active findings, most severe first
async fn findings(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FindingsParams>,
) -> Result<Json<FindingsResponse>, ApiError> {
    let query = params.into_query()?;
    let findings = state.aggregator.findings(&query).await;

    Ok(Json(FindingsResponse {
        count: findings.len(),
        findings,
    }))
}

/// Activity log entries at or after `since`
async fn activity(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ActivityParams>,
) -> Result<Json<ActivityResponse>, ApiError> {
    let since = params
        .since
        .filter(|s| !s.is_empty())
        .map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| ApiError::bad_request(format!("invalid 'since' timestamp '{}': {}", s, e)))
        })
        .transpose()?;

    let entries = state.aggregator.activity(since).await;
    Ok(Json(ActivityResponse {
        count: entries.len(),
        entries,
    }))
}

async fn recommendations(State(state): State<Arc<AppState>>) -> Json<RecommendationsResponse> {
    let recommendations = state.aggregator.recommendations().await;
    Json(RecommendationsResponse {
        count: recommendations.len(),
        recommendations,
    })
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 once the first cycle completed
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/findings", get(findings))
        .route("/api/v1/activity", get(activity))
        .route("/api/v1/recommendations", get(recommendations))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serve the API until the shutdown signal fires
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    Ok(())
}
