mod meetings;
mod users;

use crate::state::AppState;
use crate::ws;
use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(|| async { "OK" }))
        // User directory
        .route("/api/users", post(users::create_user))
        .route("/api/users", get(users::list_users))
        .route("/api/users/{id}", get(users::get_user))
        .route("/api/users/{id}", delete(users::delete_user))
        // Meeting directory
        .route("/api/meetings", post(meetings::create_meeting))
        .route("/api/meetings", get(meetings::list_meetings))
        .route("/api/meetings/{id}", get(meetings::get_meeting))
        .route("/api/meetings/{id}/end", post(meetings::end_meeting))
        // WebSocket signaling endpoint
        .route("/ws", get(ws::handler::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
