use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, Response, StatusCode, header},
};
use chrono::{Duration, Utc};
use portfolio_site::{
    AppConfig, AppState, MemoryRepository, MemorySessionStore, MockIdentityProvider,
    OidcSettings, SessionManager, create_router,
    session::{SessionStore, StorageScope, UserProfile, UserRecord, manager::PendingSignIn},
};
use std::sync::Arc;
use tower::ServiceExt;

const PROVIDER_LOGIN: &str = "https://portfolio-test.auth.us-east-1.amazoncognito.com/login?";
const PROVIDER_LOGOUT: &str = "https://portfolio-test.auth.us-east-1.amazoncognito.com/logout?";

struct TestApp {
    router: Router,
    state: AppState,
    store: Arc<MemorySessionStore>,
}

fn spawn_app() -> TestApp {
    let config = AppConfig::default();
    let store = Arc::new(MemorySessionStore::new());
    let state = AppState {
        repo: Arc::new(MemoryRepository::new()),
        sessions: Arc::new(SessionManager::new(
            store.clone(),
            Arc::new(MockIdentityProvider::new()),
            OidcSettings::from_config(&config).unwrap(),
        )),
        config,
    };
    TestApp {
        router: create_router(state.clone()),
        state,
        store,
    }
}

impl TestApp {
    async fn get(&self, uri: &str, sid: Option<&str>) -> Response<Body> {
        self.send("GET", uri, sid, Body::empty()).await
    }

    async fn send(&self, method: &str, uri: &str, sid: Option<&str>, body: Body) -> Response<Body> {
        let mut request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::HOST, "www.example.com");
        if let Some(sid) = sid {
            request = request.header(header::COOKIE, format!("portfolio_session={sid}"));
        }
        self.router
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap()
    }

    async fn sign_in(&self, sid: &str) {
        let login_url = self.state.sessions.begin_sign_in(sid, "/").await.unwrap();
        let state = query_param(&login_url, "state").unwrap();
        self.state
            .sessions
            .complete_sign_in(sid, "code", &state)
            .await
            .unwrap();
    }
}

fn location(response: &Response<Body>) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string()
}

fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}

fn query_param(url: &str, name: &str) -> Option<String> {
    reqwest::Url::parse(url)
        .unwrap()
        .query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

async fn body_text(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

// --- Route guard ---

#[tokio::test]
async fn test_anonymous_visitor_is_sent_to_hosted_sign_in() {
    let app = spawn_app();

    let response = app.get("/manage", None).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with(PROVIDER_LOGIN));
    let cookies = set_cookies(&response);
    assert_eq!(cookies.len(), 1);
    assert!(cookies[0].starts_with("portfolio_session="));
    assert!(body_text(response).await.is_empty());
}

#[tokio::test]
async fn test_sign_in_round_trip_lands_back_on_guarded_page() {
    let app = spawn_app();

    let response = app.get("/manage", None).await;
    let login_url = location(&response);
    let sid = set_cookies(&response)[0]
        .trim_start_matches("portfolio_session=")
        .split(';')
        .next()
        .unwrap()
        .to_string();
    let state = query_param(&login_url, "state").unwrap();

    let callback = app
        .get(&format!("/callback?code=abc&state={state}"), Some(&sid))
        .await;
    assert_eq!(callback.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&callback), "/manage");

    let page = app.get("/manage", Some(&sid)).await;
    assert_eq!(page.status(), StatusCode::OK);
    assert!(body_text(page).await.contains("Add New Project"));
}

#[tokio::test]
async fn test_errored_visitor_goes_home_once() {
    let app = spawn_app();
    app.state
        .sessions
        .record_error("sid-err", "access_denied")
        .await
        .unwrap();

    let response = app.get("/manage", Some("sid-err")).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");

    // The error was consumed; the next visit is a normal anonymous one.
    assert!(app.state.sessions.error(Some("sid-err")).await.is_none());
    let again = app.get("/manage", Some("sid-err")).await;
    assert!(location(&again).starts_with(PROVIDER_LOGIN));
}

#[tokio::test]
async fn test_loading_visitor_sees_spinner() {
    let app = spawn_app();
    let pending = PendingSignIn {
        code_verifier: "v".to_string(),
        nonce: "n".to_string(),
        return_to: "/manage".to_string(),
        created_at: Utc::now(),
        exchange_started_at: Some(Utc::now()),
    };
    app.store
        .set(
            "sid-wait",
            StorageScope::Session,
            "oidc.pending",
            serde_json::to_string(&pending).unwrap(),
        )
        .await
        .unwrap();

    let response = app.get("/manage", Some("sid-wait")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(header::LOCATION).is_none());
    assert!(body_text(response).await.contains(r#"class="spinner""#));
}

#[tokio::test]
async fn test_expired_sign_in_is_sent_back_to_provider() {
    let app = spawn_app();
    let record = UserRecord {
        id_token: "old-id-token".to_string(),
        access_token: "old-access-token".to_string(),
        refresh_token: None,
        expires_at: Utc::now() - Duration::minutes(1),
        profile: UserProfile {
            sub: "mock-subject".to_string(),
            email: Some("owner@example.com".to_string()),
        },
    };
    app.store
        .set(
            "sid-stale",
            StorageScope::Session,
            &app.state.sessions.settings().user_store_key(),
            serde_json::to_string(&record).unwrap(),
        )
        .await
        .unwrap();

    let response = app.get("/manage", Some("sid-stale")).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with(PROVIDER_LOGIN));
}

#[tokio::test]
async fn test_authenticated_visitor_reaches_management_screen() {
    let app = spawn_app();
    app.sign_in("sid-ok").await;

    let response = app.get("/manage", Some("sid-ok")).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("Add New Project"));
    assert!(body.contains("Sign out"));
}

#[tokio::test]
async fn test_provider_error_on_callback_is_recorded() {
    let app = spawn_app();

    let response = app
        .get(
            "/callback?error=access_denied&error_description=User%20cancelled",
            Some("sid-cancel"),
        )
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
    assert_eq!(
        app.state.sessions.error(Some("sid-cancel")).await.as_deref(),
        Some("access_denied: User cancelled")
    );
}

#[tokio::test]
async fn test_callback_path_without_parameters_goes_home() {
    let app = spawn_app();

    let response = app.get("/callback", None).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
}

// --- Sign-out ---

#[tokio::test]
async fn test_logout_expires_cookies_and_bounces_through_provider() {
    let app = spawn_app();
    app.sign_in("sid-out").await;

    let response = app.send("POST", "/logout", Some("sid-out"), Body::empty()).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with(PROVIDER_LOGOUT));
    assert!(response.headers().get("clear-site-data").is_none());

    let cookies = set_cookies(&response);
    // 15 provider cookies for a three-label host, then the session cookie.
    assert_eq!(cookies.len(), 16);
    assert!(cookies.iter().any(|c| c.contains("Domain=.example.com")));
    assert!(!app.state.sessions.is_authenticated(Some("sid-out")).await);

    let page = app.get("/manage", Some("sid-out")).await;
    assert!(location(&page).starts_with(PROVIDER_LOGIN));
}

// --- Public surface ---

#[tokio::test]
async fn test_gallery_is_public() {
    let app = spawn_app();

    let response = app.get("/", None).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("Full Stack Web Developer"));
    assert!(!body.contains("Sign out"));
}

#[tokio::test]
async fn test_login_entry_point() {
    let app = spawn_app();

    let anonymous = app.get("/login", None).await;
    assert!(location(&anonymous).starts_with(PROVIDER_LOGIN));

    app.sign_in("sid-in").await;
    let signed_in = app.get("/login", Some("sid-in")).await;
    assert_eq!(location(&signed_in), "/manage");
}

#[tokio::test]
async fn test_session_endpoint_reports_state() {
    let app = spawn_app();
    app.sign_in("sid-api").await;

    let response = app.get("/api/session", Some("sid-api")).await;
    let status: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();

    assert_eq!(status["is_authenticated"], true);
    assert_eq!(status["is_loading"], false);
    assert_eq!(status["email"], "owner@example.com");
}

#[tokio::test]
async fn test_api_writes_require_session() {
    let app = spawn_app();

    let response = app
        .send(
            "POST",
            "/api/projects",
            None,
            Body::from(r#"{"title":"t","description":"d","url":"u","image_url":"i"}"#),
        )
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_health() {
    let app = spawn_app();
    let response = app.get("/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);
}
