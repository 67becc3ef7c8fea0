use crate::sse::handler::sse_handler;
use crate::AppState;
use axum::{routing::get, Router};

/// Routes contributed by this crate. Merge into the host application's router.
pub fn router(app_state: AppState) -> Router {
    Router::new()
        .route("/events", get(sse_handler))
        .with_state(app_state)
}
