use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

use crate::api::AppState;
use crate::store::DocumentStore;

#[derive(Serialize)]
pub struct HealthCheckResponse {
    status: String,
}

pub async fn health_check<S: DocumentStore>(
    State(state): State<AppState<S>>,
) -> (StatusCode, Json<HealthCheckResponse>) {
    let (code, status) = match state.session.ping().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
    };

    let response = HealthCheckResponse {
        status: status.to_string(),
    };
    (code, Json(response))
}
