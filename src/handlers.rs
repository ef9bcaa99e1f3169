use crate::{
    AppState,
    auth::AuthUser,
    models::{self, Project, ProjectDraft, SessionStatus},
    session::{AuthState, cookies::session_id},
};
use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use uuid::Uuid;

// --- Handlers ---

/// get_projects
///
/// [Public Route] Lists every project, newest first.
#[utoipa::path(
    get,
    path = "/api/projects",
    responses((status = 200, description = "All projects", body = [Project]))
)]
pub async fn get_projects(State(state): State<AppState>) -> Json<Vec<models::Project>> {
    Json(state.repo.list_projects().await)
}

/// create_project
///
/// [Authenticated Route] Inserts a project. The store assigns the id and timestamps.
#[utoipa::path(
    post,
    path = "/api/projects",
    request_body = ProjectDraft,
    responses(
        (status = 201, description = "Created", body = Project),
        (status = 401, description = "Not signed in"),
        (status = 422, description = "A field is missing")
    )
)]
pub async fn create_project(
    _user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<ProjectDraft>,
) -> Result<(StatusCode, Json<models::Project>), StatusCode> {
    if payload.missing_field().is_some() {
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }
    match state.repo.create_project(payload).await {
        Some(project) => Ok((StatusCode::CREATED, Json(project))),
        None => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// update_project
///
/// [Authenticated Route] Replaces the editable fields of a project.
#[utoipa::path(
    put,
    path = "/api/projects/{id}",
    params(("id" = Uuid, Path, description = "Project ID")),
    request_body = ProjectDraft,
    responses(
        (status = 200, description = "Updated", body = Project),
        (status = 404, description = "Not Found"),
        (status = 422, description = "A field is missing")
    )
)]
pub async fn update_project(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ProjectDraft>,
) -> Result<Json<models::Project>, StatusCode> {
    if payload.missing_field().is_some() {
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }
    match state.repo.update_project(id, payload).await {
        Some(project) => Ok(Json(project)),
        None => Err(StatusCode::NOT_FOUND),
    }
}

/// delete_project
///
/// [Authenticated Route] Removes a project.
#[utoipa::path(
    delete,
    path = "/api/projects/{id}",
    params(("id" = Uuid, Path, description = "Project ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_project(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> StatusCode {
    if state.repo.delete_project(id).await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

/// get_session
///
/// [Public Route] The visitor's authentication state, as the route guard sees it.
#[utoipa::path(
    get,
    path = "/api/session",
    responses((status = 200, description = "Session state", body = SessionStatus))
)]
pub async fn get_session(State(state): State<AppState>, headers: HeaderMap) -> Json<SessionStatus> {
    let sid = session_id(&headers);
    let status = match state.sessions.auth_state(sid.as_deref()).await {
        AuthState::Authenticated(profile) => SessionStatus {
            is_authenticated: true,
            is_loading: false,
            error: None,
            email: profile.email,
        },
        AuthState::Loading => SessionStatus {
            is_authenticated: false,
            is_loading: true,
            error: None,
            email: None,
        },
        AuthState::Errored(message) => SessionStatus {
            is_authenticated: false,
            is_loading: false,
            error: Some(message),
            email: None,
        },
        AuthState::Unauthenticated => SessionStatus {
            is_authenticated: false,
            is_loading: false,
            error: None,
            email: None,
        },
    };
    Json(status)
}
