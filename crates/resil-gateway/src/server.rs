//! HTTP surface
//!
//! Ingress, state and incident reads, runtime config updates, and the
//! two fault-injection knobs. Every request gets a structured response;
//! errors map onto status codes through the unified error type.

use crate::dispatch::Dispatcher;
use crate::stats::GatewayStats;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use resil_control::Controller;
use resil_core::{Error, EventBatch, FailoverMode, PrimarySite, Result};
use resil_telemetry::{InMemorySink, TelemetrySink};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<RwLock<Controller>>,
    pub dispatcher: Arc<Dispatcher>,
    pub sink: Arc<InMemorySink>,
    pub stats: Arc<GatewayStats>,
}

/// Build the Axum router with all routes
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ingress", post(ingress_handler))
        .route("/state", get(state_handler))
        .route("/health", get(health_handler))
        .route("/incidents", get(incidents_handler))
        .route("/stats", get(stats_handler))
        .route("/config", post(config_handler))
        .route("/faults/inject", post(inject_fault_handler))
        .route("/faults/remove", post(remove_fault_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Serve the gateway HTTP API on `bind_addr`
pub async fn serve(state: AppState, bind_addr: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .map_err(|e| Error::config(format!("failed to bind {}: {}", bind_addr, e)))?;
    info!(%bind_addr, "gateway HTTP server listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
        .map_err(|e| Error::internal(format!("HTTP server failed: {}", e)))?;
    Ok(())
}

fn error_response(err: &Error) -> Response {
    let status =
        StatusCode::from_u16(err.to_http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(json!({
            "error": err.to_string(),
            "kind": err.category(),
        })),
    )
        .into_response()
}

/// Batch ingress endpoint
async fn ingress_handler(State(state): State<AppState>, Json(batch): Json<EventBatch>) -> Response {
    state.stats.increment_requests();
    let request_id = uuid::Uuid::new_v4();
    debug!(%request_id, events = batch.len(), "ingress batch received");

    match state.dispatcher.dispatch(batch).await {
        Ok(reply) => {
            state.stats.increment_responses();
            Json(reply).into_response()
        }
        Err(e) => {
            error!(%request_id, error = %e, "ingress dispatch failed");
            state.stats.increment_errors();
            error_response(&e)
        }
    }
}

/// Controller state read endpoint
async fn state_handler(State(state): State<AppState>) -> impl IntoResponse {
    state.stats.increment_requests();
    let view = state.controller.read().await.state_view();
    state.stats.increment_responses();
    Json(view)
}

/// Liveness endpoint
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.stats.uptime_seconds(),
    }))
}

/// Recent incidents from the bounded in-memory buffer
async fn incidents_handler(State(state): State<AppState>) -> impl IntoResponse {
    state.stats.increment_requests();
    let incidents = state.sink.incidents();
    state.stats.increment_responses();
    Json(json!({ "incidents": incidents }))
}

/// Gateway counters
async fn stats_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "requests_total": state.stats.requests(),
        "responses_total": state.stats.responses(),
        "errors_total": state.stats.errors(),
        "batches_dispatched": state.stats.batches_dispatched(),
        "events_accepted": state.stats.events_accepted(),
        "events_dropped": state.stats.events_dropped(),
        "failovers_total": state.stats.failovers(),
        "uptime_seconds": state.stats.uptime_seconds(),
    }))
}

/// Runtime-mutable configuration: failover mode and primary site
#[derive(Debug, Deserialize)]
struct ConfigUpdate {
    #[serde(default)]
    mode: Option<FailoverMode>,
    #[serde(default)]
    primary: Option<PrimarySite>,
}

async fn config_handler(
    State(state): State<AppState>,
    Json(update): Json<ConfigUpdate>,
) -> impl IntoResponse {
    state.stats.increment_requests();
    let mut controller = state.controller.write().await;
    if let Some(mode) = update.mode {
        controller.set_failover_mode(mode);
    }
    if let Some(primary) = update.primary {
        controller.set_primary(primary);
    }
    state.stats.increment_responses();
    Json(json!({
        "mode": controller.failover_mode(),
        "primary": controller.primary(),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InjectFault {
    virtual_node_id: u32,
    latency_ms: f64,
}

async fn inject_fault_handler(
    State(state): State<AppState>,
    Json(fault): Json<InjectFault>,
) -> Response {
    state.stats.increment_requests();
    let mut controller = state.controller.write().await;
    match controller
        .topology_mut()
        .inject_node_latency_fault(fault.virtual_node_id, fault.latency_ms)
    {
        Ok(links) => {
            state.stats.increment_responses();
            Json(json!({
                "injected": true,
                "nodeId": fault.virtual_node_id,
                "linksAffected": links,
            }))
            .into_response()
        }
        Err(e) => {
            state.stats.increment_errors();
            error_response(&e)
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoveFault {
    virtual_node_id: u32,
}

async fn remove_fault_handler(
    State(state): State<AppState>,
    Json(fault): Json<RemoveFault>,
) -> Response {
    state.stats.increment_requests();
    let mut controller = state.controller.write().await;
    match controller
        .topology_mut()
        .remove_node_latency_fault(fault.virtual_node_id)
    {
        Ok(links) => {
            state.stats.increment_responses();
            Json(json!({
                "removed": true,
                "nodeId": fault.virtual_node_id,
                "linksRestored": links,
            }))
            .into_response()
        }
        Err(e) => {
            state.stats.increment_errors();
            error_response(&e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(Error::invalid_payload("x").to_http_status(), 400);
        assert_eq!(Error::UnknownNode(7).to_http_status(), 404);
        assert_eq!(Error::no_path("x").to_http_status(), 503);
        assert_eq!(Error::forwarding_timeout("x").to_http_status(), 504);
        assert_eq!(Error::internal("x").to_http_status(), 500);
    }

    #[test]
    fn test_fault_payload_shape() {
        let fault: InjectFault =
            serde_json::from_str(r#"{"virtualNodeId": 9, "latencyMs": 40.0}"#).unwrap();
        assert_eq!(fault.virtual_node_id, 9);
        assert_eq!(fault.latency_ms, 40.0);

        let removal: RemoveFault = serde_json::from_str(r#"{"virtualNodeId": 9}"#).unwrap();
        assert_eq!(removal.virtual_node_id, 9);
    }

    #[test]
    fn test_config_update_accepts_partial_payloads() {
        let update: ConfigUpdate = serde_json::from_str(r#"{"mode": "cold"}"#).unwrap();
        assert_eq!(update.mode, Some(FailoverMode::Cold));
        assert!(update.primary.is_none());

        let update: ConfigUpdate = serde_json::from_str(r#"{"primary": "cloud"}"#).unwrap();
        assert_eq!(update.primary, Some(PrimarySite::Cloud));
    }
}
