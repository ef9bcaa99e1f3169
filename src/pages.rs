use axum::{
    Form,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    AppState,
    auth::{AuthUser, append_cookie, request_host, sign_in_redirect},
    models::ProjectForm,
    session::{LogoutContext, cookies::session_id},
    views::{self, ManageView},
};

const MANAGE: &str = "/manage";

/// gallery
///
/// Public landing page: every project, newest first, one card each.
pub async fn gallery(State(state): State<AppState>, headers: HeaderMap) -> Html<String> {
    let sid = session_id(&headers);
    let signed_in = state.sessions.is_authenticated(sid.as_deref()).await;
    let projects = state.repo.list_projects().await;
    Html(views::gallery_page(&projects, signed_in))
}

#[derive(Debug, Deserialize)]
pub struct ManageQuery {
    /// Record selected for editing.
    pub edit: Option<Uuid>,
}

/// manage
///
/// Management screen. `?edit={id}` loads that record into the form; an unknown
/// id leaves the form empty.
pub async fn manage(
    _user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<ManageQuery>,
) -> Html<String> {
    let projects = state.repo.list_projects().await;

    let selected = match query.edit {
        Some(id) => state.repo.get_project(id).await,
        None => None,
    };

    let view = ManageView {
        projects: &projects,
        draft: selected.as_ref().map(|p| p.draft()).unwrap_or_default(),
        editing_id: selected.map(|p| p.id),
        notice: None,
    };
    Html(views::manage_page(&view))
}

/// submit_project
///
/// Add or update, depending on whether the form carries an `editing_id`. On
/// success the draft is dropped and the list reloaded (redirect back to the
/// screen). On failure the screen is rendered again with the draft intact.
pub async fn submit_project(
    _user: AuthUser,
    State(state): State<AppState>,
    Form(form): Form<ProjectForm>,
) -> Response {
    let draft = form.draft();

    if let Some(field) = draft.missing_field() {
        let projects = state.repo.list_projects().await;
        let view = ManageView {
            projects: &projects,
            draft,
            editing_id: form.editing_id,
            notice: Some(format!("{field} is required")),
        };
        return (StatusCode::UNPROCESSABLE_ENTITY, Html(views::manage_page(&view))).into_response();
    }

    let saved = match form.editing_id {
        Some(id) => state.repo.update_project(id, draft.clone()).await.is_some(),
        None => state.repo.create_project(draft.clone()).await.is_some(),
    };

    if saved {
        return Redirect::to(MANAGE).into_response();
    }

    tracing::warn!(editing_id = ?form.editing_id, "project was not saved");
    let projects = state.repo.list_projects().await;
    let view = ManageView {
        projects: &projects,
        draft,
        editing_id: form.editing_id,
        notice: None,
    };
    Html(views::manage_page(&view)).into_response()
}

/// confirm_delete
///
/// Confirmation prompt before anything is removed.
pub async fn confirm_delete(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Response {
    match state.repo.get_project(id).await {
        Some(project) => Html(views::confirm_delete_page(&project)).into_response(),
        None => Redirect::to(MANAGE).into_response(),
    }
}

/// delete_project
///
/// Confirmed delete. Whether or not a row went away, the list is reloaded.
pub async fn delete_project(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Redirect {
    if !state.repo.delete_project(id).await {
        tracing::debug!(%id, "delete removed nothing");
    }
    Redirect::to(MANAGE)
}

/// login
///
/// Explicit sign-in entry point; lands on the management screen afterwards.
pub async fn login(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let sid = session_id(&headers);
    if state.sessions.is_authenticated(sid.as_deref()).await {
        return Redirect::to(MANAGE).into_response();
    }
    sign_in_redirect(&state, sid, MANAGE).await
}

/// logout
///
/// Runs the session teardown and hands the browser everything it has to do:
/// expire cookies, optionally clear its own storage, and follow the redirect.
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let sid = session_id(&headers);
    let ctx = LogoutContext {
        host: request_host(&headers, &state.config),
        current_address: headers
            .get(header::REFERER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
    };

    let outcome = state.sessions.logout(sid.as_deref(), &ctx).await;
    if let Some(address) = &outcome.cleaned_address {
        tracing::debug!(%address, "signed out from");
    }

    let mut response = Redirect::to(&outcome.location).into_response();
    let response_headers = response.headers_mut();
    for cookie in &outcome.set_cookies {
        append_cookie(response_headers, cookie);
    }
    if outcome.clear_site_data {
        response_headers.insert(
            "clear-site-data",
            HeaderValue::from_static("\"cookies\", \"storage\""),
        );
    }
    response
}
