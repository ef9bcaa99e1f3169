use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::collections::HashMap;
use std::mem;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::cookies;
use super::store::{SessionStoreState, StorageScope};
use crate::{
    error::{AuthError, SessionError},
    oidc::{OidcSettings, Pkce, ProviderState, strip_auth_params},
};

/// Prefix shared by every record the provider client writes.
pub const PROVIDER_KEY_PREFIX: &str = "oidc.";
/// Bare id token written by the pre-library login flow.
pub const LEGACY_TOKEN_KEY: &str = "id_token";
/// Message of the last failed sign-in, shown to the guard as `errored`.
pub const AUTH_ERROR_KEY: &str = "auth.error";

/// Where sign-out and every fallback lands.
pub const HOME: &str = "/";

/// An exchange still marked in flight after this long was abandoned. The
/// provider HTTP client gives up after 30 s.
pub const EXCHANGE_TIMEOUT: Duration = Duration::seconds(45);
/// Unredeemed sign-in attempts expire after this long.
pub const PENDING_TTL: Duration = Duration::minutes(10);
/// Open attempts kept per visitor, one per tab that started a sign-in.
pub const MAX_PENDING_SIGN_INS: usize = 3;

/// UserProfile
///
/// Identity claims kept with the user record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub sub: String,
    pub email: Option<String>,
}

/// UserRecord
///
/// What a completed sign-in leaves in the `Session` scope under
/// `OidcSettings::user_store_key`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id_token: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub profile: UserProfile,
}

impl UserRecord {
    pub fn expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

/// PendingSignIn
///
/// One in-flight sign-in attempt, stored under `oidc.{state}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingSignIn {
    pub code_verifier: String,
    pub nonce: String,
    pub return_to: String,
    pub created_at: DateTime<Utc>,
    /// Set when the authorization code starts being redeemed.
    #[serde(default)]
    pub exchange_started_at: Option<DateTime<Utc>>,
}

impl PendingSignIn {
    pub fn exchanging(&self) -> bool {
        self.exchange_started_at.is_some()
    }

    /// An attempt nobody will come back for: an exchange past
    /// `EXCHANGE_TIMEOUT`, or a redirect that never returned within `PENDING_TTL`.
    pub fn stale(&self, now: DateTime<Utc>) -> bool {
        match self.exchange_started_at {
            Some(started) => now - started > EXCHANGE_TIMEOUT,
            None => now - self.created_at > PENDING_TTL,
        }
    }
}

/// AuthState
///
/// The four states the route guard distinguishes.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthState {
    Loading,
    Errored(String),
    Authenticated(UserProfile),
    Unauthenticated,
}

/// LogoutContext
///
/// The parts of the sign-out request the teardown needs.
#[derive(Debug, Clone, Default)]
pub struct LogoutContext {
    /// `Host` header value, port allowed.
    pub host: String,
    /// Address the visitor signed out from (the `Referer`), if known.
    pub current_address: Option<String>,
}

/// LogoutOutcome
///
/// Everything the sign-out response must carry.
#[derive(Debug, Clone)]
pub struct LogoutOutcome {
    /// Redirect target: the provider's logout endpoint, or `/` after a fallback.
    pub location: String,
    /// `current_address` without the authorization-code parameters. Diagnostic
    /// only: it is logged, and the response redirects elsewhere anyway.
    pub cleaned_address: Option<String>,
    /// `Set-Cookie` values, one per expired cookie.
    pub set_cookies: Vec<String>,
    /// Ask the browser to drop its own storage and cookies as well.
    pub clear_site_data: bool,
    pub fell_back: bool,
}

/// SessionManager
///
/// Owns everything a visitor's session is made of: the provider records in
/// visitor storage, the in-memory user cache in front of them, and the
/// provider cookies expired on sign-out.
pub struct SessionManager {
    store: SessionStoreState,
    provider: ProviderState,
    settings: OidcSettings,
    // Parsed user records by session id. Loaded lazily from the store.
    users: RwLock<HashMap<String, UserRecord>>,
}

pub type SessionState = Arc<SessionManager>;

impl SessionManager {
    pub fn new(store: SessionStoreState, provider: ProviderState, settings: OidcSettings) -> Self {
        Self {
            store,
            provider,
            settings,
            users: RwLock::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &OidcSettings {
        &self.settings
    }

    // --- Read-only projections ---

    /// auth_state
    ///
    /// Precedence: a recorded error wins, then an exchange in flight, then an
    /// unexpired user record. Stale attempts count as nothing. A visitor without
    /// a session id is unauthenticated.
    /// Store failures are reported as `Errored` so the guard sends the visitor home.
    pub async fn auth_state(&self, sid: Option<&str>) -> AuthState {
        let Some(sid) = sid else {
            return AuthState::Unauthenticated;
        };
        match self.resolve(sid).await {
            Ok(state) => state,
            Err(e) => {
                tracing::error!(error = %e, "could not read session state");
                AuthState::Errored(e.to_string())
            }
        }
    }

    pub async fn is_authenticated(&self, sid: Option<&str>) -> bool {
        matches!(self.auth_state(sid).await, AuthState::Authenticated(_))
    }

    pub async fn is_loading(&self, sid: Option<&str>) -> bool {
        matches!(self.auth_state(sid).await, AuthState::Loading)
    }

    pub async fn error(&self, sid: Option<&str>) -> Option<String> {
        match self.auth_state(sid).await {
            AuthState::Errored(message) => Some(message),
            _ => None,
        }
    }

    async fn resolve(&self, sid: &str) -> Result<AuthState, SessionError> {
        if let Some(message) = self
            .store
            .get(sid, StorageScope::Session, AUTH_ERROR_KEY)
            .await?
        {
            return Ok(AuthState::Errored(message));
        }

        if self.exchange_in_flight(sid).await? {
            return Ok(AuthState::Loading);
        }

        Ok(match self.user(sid).await? {
            Some(user) if !user.expired() => AuthState::Authenticated(user.profile),
            _ => AuthState::Unauthenticated,
        })
    }

    async fn exchange_in_flight(&self, sid: &str) -> Result<bool, SessionError> {
        let now = Utc::now();
        Ok(self
            .pending_sign_ins(sid)
            .await?
            .iter()
            .any(|(_, pending)| pending.exchanging() && !pending.stale(now)))
    }

    /// Every sign-in attempt recorded for the visitor, keyed by storage key.
    async fn pending_sign_ins(&self, sid: &str) -> Result<Vec<(String, PendingSignIn)>, SessionError> {
        let user_key = self.settings.user_store_key();
        let mut attempts = Vec::new();
        for key in self.store.keys(sid, StorageScope::Session).await? {
            if !key.starts_with(PROVIDER_KEY_PREFIX) || key == user_key {
                continue;
            }
            if let Some(pending) = self.read::<PendingSignIn>(sid, StorageScope::Session, &key).await? {
                attempts.push((key, pending));
            }
        }
        Ok(attempts)
    }

    /// Drops stale attempts, then the oldest waiting ones until a new attempt
    /// fits under `MAX_PENDING_SIGN_INS`. Exchanges in flight are left alone.
    async fn prune_sign_ins(&self, sid: &str) -> Result<(), SessionError> {
        let now = Utc::now();
        let mut waiting = Vec::new();
        for (key, pending) in self.pending_sign_ins(sid).await? {
            if pending.stale(now) {
                tracing::debug!(%key, "dropping abandoned sign-in attempt");
                self.store.remove(sid, StorageScope::Session, &key).await?;
            } else if !pending.exchanging() {
                waiting.push((key, pending.created_at));
            }
        }

        waiting.sort_by(|a, b| b.1.cmp(&a.1));
        for (key, _) in waiting.into_iter().skip(MAX_PENDING_SIGN_INS.saturating_sub(1)) {
            self.store.remove(sid, StorageScope::Session, &key).await?;
        }
        Ok(())
    }

    /// The visitor's user record, from the cache or the store.
    async fn user(&self, sid: &str) -> Result<Option<UserRecord>, SessionError> {
        if let Some(user) = self.users.read().await.get(sid) {
            return Ok(Some(user.clone()));
        }
        let stored: Option<UserRecord> = self
            .read(sid, StorageScope::Session, &self.settings.user_store_key())
            .await?;
        if let Some(user) = &stored {
            self.users
                .write()
                .await
                .insert(sid.to_string(), user.clone());
        }
        Ok(stored)
    }

    // --- Sign-in ---

    /// begin_sign_in
    ///
    /// Records a fresh attempt and returns the hosted-UI address to send the
    /// visitor to. `return_to` must be a local path.
    pub async fn begin_sign_in(&self, sid: &str, return_to: &str) -> Result<String, SessionError> {
        let state = Uuid::new_v4().simple().to_string();
        let nonce = Uuid::new_v4().simple().to_string();
        let pkce = Pkce::generate();

        self.prune_sign_ins(sid).await?;
        let pending = PendingSignIn {
            code_verifier: pkce.verifier.clone(),
            nonce: nonce.clone(),
            return_to: local_path(return_to),
            created_at: Utc::now(),
            exchange_started_at: None,
        };
        self.write(sid, StorageScope::Session, &pending_key(&state), &pending)
            .await?;

        tracing::debug!(return_to = %pending.return_to, "sign-in started");
        Ok(self.settings.login_url(&state, &nonce, &pkce))
    }

    /// complete_sign_in
    ///
    /// Redeems the code the provider sent back. On success the user record is
    /// stored and the path the attempt started from is returned. Any failure is
    /// also recorded as the visitor's auth error.
    pub async fn complete_sign_in(
        &self,
        sid: &str,
        code: &str,
        state: &str,
    ) -> Result<String, AuthError> {
        let result = self.redeem(sid, code, state).await;
        if let Err(e) = &result {
            tracing::warn!(error = %e, "sign-in failed");
            if let Err(store_err) = self.record_error(sid, &e.to_string()).await {
                tracing::error!(error = %store_err, "could not record sign-in error");
            }
        }
        result
    }

    async fn redeem(&self, sid: &str, code: &str, state: &str) -> Result<String, AuthError> {
        let key = pending_key(state);
        let mut pending: PendingSignIn = self
            .read(sid, StorageScope::Session, &key)
            .await?
            .ok_or(AuthError::UnknownState)?;

        pending.exchange_started_at = Some(Utc::now());
        self.write(sid, StorageScope::Session, &key, &pending).await?;

        // The attempt is spent either way, also when this future is dropped
        // mid-exchange (visitor disconnected).
        let mut spent = SpentAttempt {
            store: self.store.clone(),
            sid: sid.to_string(),
            key: key.clone(),
            armed: true,
        };
        let user = self.fetch_user(code, &pending).await;
        spent.armed = false;
        self.store.remove(sid, StorageScope::Session, &key).await?;
        let user = user?;

        self.write(
            sid,
            StorageScope::Session,
            &self.settings.user_store_key(),
            &user,
        )
        .await?;
        self.users.write().await.insert(sid.to_string(), user.clone());

        tracing::info!(sub = %user.profile.sub, "signed in");
        Ok(pending.return_to)
    }

    async fn fetch_user(&self, code: &str, pending: &PendingSignIn) -> Result<UserRecord, AuthError> {
        let tokens = self
            .provider
            .exchange_code(code, &pending.code_verifier)
            .await?;
        let claims = self
            .provider
            .verify_id_token(&tokens.id_token, &pending.nonce)
            .await?;

        Ok(UserRecord {
            id_token: tokens.id_token,
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_at: Utc::now() + Duration::seconds(tokens.expires_in),
            profile: UserProfile {
                sub: claims.sub,
                email: claims.email,
            },
        })
    }

    pub async fn record_error(&self, sid: &str, message: &str) -> Result<(), SessionError> {
        self.store
            .set(sid, StorageScope::Session, AUTH_ERROR_KEY, message.to_string())
            .await
    }

    pub async fn clear_error(&self, sid: &str) -> Result<(), SessionError> {
        self.store
            .remove(sid, StorageScope::Session, AUTH_ERROR_KEY)
            .await
    }

    // --- Sign-out ---

    /// logout
    ///
    /// Best-effort teardown of every session artifact. Never fails: if a step
    /// errors, the fallback wipes both scopes, expires the cookies again and
    /// sends the visitor home instead of to the provider.
    pub async fn logout(&self, sid: Option<&str>, ctx: &LogoutContext) -> LogoutOutcome {
        match self.teardown(sid, ctx).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "logout failed, running fallback cleanup");
                self.fallback(sid, ctx).await
            }
        }
    }

    async fn teardown(
        &self,
        sid: Option<&str>,
        ctx: &LogoutContext,
    ) -> Result<LogoutOutcome, SessionError> {
        let cleaned_address = ctx.current_address.as_deref().map(strip_auth_params);
        let mut id_token_hint = None;

        if let Some(sid) = sid {
            // 1. Drop the cached user so nothing re-initialises from it.
            let cached = self.users.write().await.remove(sid);
            id_token_hint = match cached {
                Some(user) => Some(user.id_token),
                None => self
                    .read::<UserRecord>(sid, StorageScope::Session, &self.settings.user_store_key())
                    .await?
                    .map(|user| user.id_token),
            };

            // 2. Provider records in either scope.
            for scope in StorageScope::ALL {
                for key in self.store.keys(sid, scope).await? {
                    if key.starts_with(PROVIDER_KEY_PREFIX) {
                        self.store.remove(sid, scope, &key).await?;
                    }
                }
            }

            // 3. Legacy token, then the whole session scope.
            self.store
                .remove(sid, StorageScope::Durable, LEGACY_TOKEN_KEY)
                .await?;
            self.store.clear(sid, StorageScope::Session).await?;
        }

        tracing::info!(had_session = sid.is_some(), "signed out");
        Ok(LogoutOutcome {
            location: self.settings.logout_url(id_token_hint.as_deref()),
            cleaned_address,
            set_cookies: expired_cookies(&ctx.host),
            clear_site_data: false,
            fell_back: false,
        })
    }

    async fn fallback(&self, sid: Option<&str>, ctx: &LogoutContext) -> LogoutOutcome {
        if let Some(sid) = sid {
            self.users.write().await.remove(sid);
            for scope in StorageScope::ALL {
                if let Err(e) = self.store.clear(sid, scope).await {
                    tracing::warn!(error = %e, ?scope, "fallback could not clear storage");
                }
            }
        }

        LogoutOutcome {
            location: HOME.to_string(),
            cleaned_address: ctx.current_address.as_deref().map(strip_auth_params),
            set_cookies: expired_cookies(&ctx.host),
            clear_site_data: true,
            fell_back: true,
        }
    }

    // --- Typed storage access ---

    async fn read<T: DeserializeOwned>(
        &self,
        sid: &str,
        scope: StorageScope,
        key: &str,
    ) -> Result<Option<T>, SessionError> {
        match self.store.get(sid, scope, key).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|source| SessionError::Record {
                    key: key.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    async fn write<T: Serialize>(
        &self,
        sid: &str,
        scope: StorageScope,
        key: &str,
        value: &T,
    ) -> Result<(), SessionError> {
        let raw = serde_json::to_string(value).map_err(|source| SessionError::Record {
            key: key.to_string(),
            source,
        })?;
        self.store.set(sid, scope, key, raw).await
    }
}

/// Removes a sign-in attempt whose exchange was dropped before it settled.
struct SpentAttempt {
    store: SessionStoreState,
    sid: String,
    key: String,
    armed: bool,
}

impl Drop for SpentAttempt {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let store = self.store.clone();
        let sid = mem::take(&mut self.sid);
        let key = mem::take(&mut self.key);
        runtime.spawn(async move {
            tracing::warn!(%key, "sign-in exchange abandoned");
            if let Err(e) = store.remove(&sid, StorageScope::Session, &key).await {
                tracing::error!(error = %e, "could not drop abandoned sign-in attempt");
            }
        });
    }
}

fn pending_key(state: &str) -> String {
    format!("{PROVIDER_KEY_PREFIX}{state}")
}

fn expired_cookies(host: &str) -> Vec<String> {
    let mut set_cookies = cookies::sweep(host);
    set_cookies.push(cookies::expire_session_cookie());
    set_cookies
}

/// Keeps redirects on this site: anything that is not a rooted local path becomes `/`.
pub fn local_path(path: &str) -> String {
    if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') {
        path.to_string()
    } else {
        HOME.to_string()
    }
}
