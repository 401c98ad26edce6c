use std::sync::Arc;

use agentpay_core::payment::PaymentSessionStore;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    store: Arc<PaymentSessionStore>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub sessions: HealthCheck,
    pub tracked_sessions: usize,
    pub checked_at: String,
}

pub fn router(store: Arc<PaymentSessionStore>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { store })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let tracked_sessions = state.store.len();

    let payload = HealthResponse {
        status: "ready",
        service: HealthCheck {
            status: "ready",
            detail: "agentpay callback receiver accepting notifications".to_string(),
        },
        sessions: HealthCheck {
            status: "ready",
            detail: format!("{tracked_sessions} payment session(s) in memory"),
        },
        tracked_sessions,
        checked_at: Utc::now().to_rfc3339(),
    };

    (StatusCode::OK, Json(payload))
}
