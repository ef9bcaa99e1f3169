use crate::{AppState, handlers, pages};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Management Router Module
///
/// The management screen. Wrapped by the route guard, so an anonymous visitor
/// is sent to the hosted sign-in and an errored one back to `/`.
pub fn manage_routes() -> Router<AppState> {
    Router::new()
        // GET /manage[?edit={id}] renders, POST /manage adds or updates.
        .route("/manage", get(pages::manage).post(pages::submit_project))
        // GET shows the confirmation prompt, POST deletes.
        .route(
            "/manage/projects/{id}/delete",
            get(pages::confirm_delete).post(pages::delete_project),
        )
}

/// API Write Router Module
///
/// JSON writes. Every handler takes the `AuthUser` extractor, which answers
/// 401 instead of redirecting.
pub fn api_write_routes() -> Router<AppState> {
    Router::new()
        .route("/api/projects", post(handlers::create_project))
        .route(
            "/api/projects/{id}",
            put(handlers::update_project).delete(handlers::delete_project),
        )
}
