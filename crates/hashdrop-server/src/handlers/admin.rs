use axum::extract::State;
use axum::response::IntoResponse;

use crate::state::AppState;

/// GET /health: unauthenticated liveness probe.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": state.inner.start_time.elapsed().as_secs(),
    }))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::super::test_helpers::*;

    #[tokio::test]
    async fn health_is_public() {
        let (router, _state, _tmp) = setup_app(true).await;
        let resp = get(router, "/health", None).await;
        assert_status(&resp, StatusCode::OK);

        let body: serde_json::Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }
}
