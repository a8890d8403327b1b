//! Huddle Server Library
//!
//! This module exposes the server components for testing and embedding.

pub mod api;
pub mod error;
pub mod models;
pub mod services;
pub mod signaling;
pub mod state;
pub mod ws;

/// Create and configure the server application.
///
/// Must be called within a Tokio runtime; this spawns the signaling
/// coordinator task.
pub fn create_app(config: state::Config) -> axum::Router {
    let app_state = state::AppState::new(config);
    api::create_router(app_state)
}
