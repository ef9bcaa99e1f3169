use axum::{
    extract::{FromRef, FromRequestParts, Query, Request, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, header, request::Parts},
    middleware::Next,
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    AppState,
    config::AppConfig,
    session::{
        AuthState, SessionState,
        cookies::{self, session_id},
        manager::{HOME, local_path},
    },
    views,
};

/// AuthUser
///
/// The signed-in visitor, resolved from the session cookie.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// Subject claim of the id token.
    pub sub: String,
    pub email: Option<String>,
}

/// AuthUser Extractor Implementation
///
/// Usable as an argument of any handler that must only run for a signed-in
/// visitor. Rejects with 401 in every other state (loading, errored, signed out),
/// so API clients never get redirected to the hosted UI.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    SessionState: FromRef<S>,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let sessions = SessionState::from_ref(state);
        let sid = session_id(&parts.headers);

        match sessions.auth_state(sid.as_deref()).await {
            AuthState::Authenticated(profile) => Ok(AuthUser {
                sub: profile.sub,
                email: profile.email,
            }),
            _ => Err(StatusCode::UNAUTHORIZED),
        }
    }
}

/// route_guard
///
/// Gate in front of the management screen.
///
/// - `loading`: spinner placeholder that reloads itself, no redirect.
/// - `errored`: back to `/`, consuming the error so the next visit starts clean.
/// - `unauthenticated`: off to the hosted sign-in page, empty body.
/// - `authenticated`: the wrapped handler runs.
pub async fn route_guard(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let sid = session_id(request.headers());

    match state.sessions.auth_state(sid.as_deref()).await {
        AuthState::Authenticated(_) => next.run(request).await,
        AuthState::Loading => Html(views::spinner_page()).into_response(),
        AuthState::Errored(message) => {
            tracing::warn!(error = %message, "auth error, redirecting home");
            if let Some(sid) = &sid {
                if let Err(e) = state.sessions.clear_error(sid).await {
                    tracing::error!(error = %e, "could not clear auth error");
                }
            }
            Redirect::to(HOME).into_response()
        }
        AuthState::Unauthenticated => {
            // Only GETs can be replayed after the round trip through the provider.
            let return_to = if request.method() == Method::GET {
                request
                    .uri()
                    .path_and_query()
                    .map(|pq| pq.as_str().to_string())
                    .unwrap_or_else(|| request.uri().path().to_string())
            } else {
                request.uri().path().to_string()
            };
            sign_in_redirect(&state, sid, &return_to).await
        }
    }
}

/// sign_in_redirect
///
/// Starts a sign-in for the visitor and redirects to the hosted UI. A visitor
/// without a session cookie gets one minted on this response.
pub async fn sign_in_redirect(state: &AppState, sid: Option<String>, return_to: &str) -> Response {
    let (sid, minted) = match sid {
        Some(sid) => (sid, false),
        None => (Uuid::new_v4().simple().to_string(), true),
    };

    let login_url = match state.sessions.begin_sign_in(&sid, return_to).await {
        Ok(url) => url,
        Err(e) => {
            tracing::error!(error = %e, "could not start sign-in");
            return Redirect::to(HOME).into_response();
        }
    };

    let mut response = Redirect::to(&login_url).into_response();
    if minted {
        append_cookie(
            response.headers_mut(),
            &cookies::session_cookie(&sid, state.config.secure_cookies()),
        );
    }
    response
}

/// Query the provider appends to the redirect URI.
#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// signin_callback
///
/// Runs on every request. When the path is the configured redirect URI's and
/// the provider's parameters are present, the sign-in is completed here and
/// the visitor is sent back to where the attempt started, without the code in
/// the address. Everything else passes through.
pub async fn signin_callback(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if request.uri().path() != state.config.redirect_path() {
        return next.run(request).await;
    }
    let params = match Query::<CallbackParams>::try_from_uri(request.uri()) {
        Ok(Query(params)) => params,
        Err(_) => return next.run(request).await,
    };
    let sid = session_id(request.headers());

    if let Some(error) = params.error {
        let message = match params.error_description {
            Some(description) => format!("{error}: {description}"),
            None => error,
        };
        tracing::warn!(%message, "identity provider returned an error");
        if let Some(sid) = &sid {
            if let Err(e) = state.sessions.record_error(sid, &message).await {
                tracing::error!(error = %e, "could not record sign-in error");
            }
        }
        return Redirect::to(HOME).into_response();
    }

    let (Some(code), Some(auth_state)) = (params.code, params.state) else {
        return next.run(request).await;
    };
    let Some(sid) = sid else {
        tracing::warn!("sign-in callback without a session cookie");
        return Redirect::to(HOME).into_response();
    };

    match state
        .sessions
        .complete_sign_in(&sid, &code, &auth_state)
        .await
    {
        Ok(return_to) => Redirect::to(&local_path(&return_to)).into_response(),
        Err(_) => Redirect::to(HOME).into_response(),
    }
}

/// Landing route for the redirect URI path when it is not `/`. Only reached
/// without callback parameters.
pub async fn callback_landing() -> Redirect {
    Redirect::to(HOME)
}

/// Host the request was addressed to, falling back to the redirect URI's host.
pub fn request_host(headers: &HeaderMap, config: &AppConfig) -> String {
    headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .or_else(|| {
            reqwest::Url::parse(&config.redirect_uri)
                .ok()
                .and_then(|url| url.host_str().map(str::to_string))
        })
        .unwrap_or_else(|| "localhost".to_string())
}

pub fn append_cookie(headers: &mut HeaderMap, cookie: &str) {
    match HeaderValue::from_str(cookie) {
        Ok(value) => {
            headers.append(header::SET_COOKIE, value);
        }
        Err(e) => tracing::warn!(error = %e, cookie, "skipping unrepresentable cookie"),
    }
}
