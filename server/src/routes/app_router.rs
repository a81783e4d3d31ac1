use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::ServerState;

pub struct AppRouter;

impl AppRouter {
    pub fn create(state: ServerState) -> Router {
        Router::new()
            .route("/", get(|| async { "Mailsense agent" }))
            .route("/healthz", get(|| async { "ok" }))
            .route("/auth/gmail", get(super::auth::handler_auth_gmail))
            .route(
                "/auth/callback",
                get(super::auth::handler_auth_gmail_callback),
            )
            .route(
                "/users/:user_id/process",
                post(super::process::handler_process_inbox),
            )
            .route("/feedback", post(super::feedback::handler_submit_feedback))
            .route("/actions", post(super::actions::handler_enqueue_action))
            .route("/actions/:request_id", get(super::actions::handler_get_action))
            .route("/tasks", get(super::tasks::handler_open_tasks))
            .route(
                "/activities",
                get(super::activities::handler_recent_activities),
            )
            .route("/status", get(super::status::handler_system_status))
            .route("/profile", patch(super::profile::handler_update_profile))
            .route("/ws", get(super::ws::handler_ws))
            .layer(
                // x-request-id is set before tracing so every span carries it,
                // and propagated back on the response.
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id()),
            )
            .layer(CorsLayer::permissive())
            .with_state(state.clone())
            .fallback(handler_404)
    }
}

pub async fn handler_404() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Route does not exist")
}
