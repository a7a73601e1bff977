use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    middleware,
    response::Response,
    routing::{get, post},
};
use serde::Serialize;

use crate::{
    application::repos::ContentRepo,
    cache::{CacheTrigger, ContentEvent},
};

use super::{
    db_health_response,
    middleware::{log_responses, set_request_context},
};

#[derive(Clone)]
pub struct AdminState {
    pub trigger: CacheTrigger,
    pub store: Arc<dyn ContentRepo>,
}

#[derive(Debug, Serialize)]
struct InvalidationOutcome {
    invalidated: usize,
}

pub fn build_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/_hooks/content", post(content_hook))
        .route("/_health/db", get(admin_health))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

async fn content_hook(
    State(state): State<AdminState>,
    Json(event): Json<ContentEvent>,
) -> Json<InvalidationOutcome> {
    let invalidated = state.trigger.content_changed(event);
    Json(InvalidationOutcome { invalidated })
}

async fn admin_health(State(state): State<AdminState>) -> Response {
    db_health_response(state.store.health_check().await)
}
