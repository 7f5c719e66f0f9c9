//! Health handlers for both listeners.

use axum::Json;
use axum::extract::State;

use crate::AppState;
use crate::models::HealthResponse;

fn health(status: &str, service: &str) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: status.to_string(),
        service: service.to_string(),
        version: portgate_core::version().to_string(),
    })
}

/// `GET /health` on the portal: reports `degraded` when the database does
/// not answer.
pub async fn portal_health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_ok = sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(&state.pool)
        .await
        .is_ok();
    health(if db_ok { "healthy" } else { "degraded" }, "portgate-portal")
}

/// `GET /health` on the gateway.
pub async fn gateway_health_handler() -> Json<HealthResponse> {
    health("healthy", "portgate-gateway")
}
