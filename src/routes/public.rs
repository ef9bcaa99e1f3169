use crate::{AppState, handlers, pages};
use axum::{Router, routing::get};

/// Public Router Module
///
/// Endpoints reachable without a session.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness check for the load balancer.
        .route("/health", get(|| async { "ok" }))
        // GET /
        // The project gallery.
        .route("/", get(pages::gallery))
        // GET /login
        // Starts the hosted sign-in; lands on /manage afterwards.
        .route("/login", get(pages::login))
        // GET|POST /logout
        // Tears the session down and bounces through the provider's logout page.
        .route("/logout", get(pages::logout).post(pages::logout))
        // GET /api/projects
        .route("/api/projects", get(handlers::get_projects))
        // GET /api/session
        // Authentication state projections for scripts and monitors.
        .route("/api/session", get(handlers::get_session))
}
