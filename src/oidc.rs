//! Identity provider plumbing: client settings, hosted-UI URLs, PKCE and the
//! authorization-code exchange against a Cognito user pool.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header, jwk::JwkSet};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    error::{AuthError, ConfigError},
};

pub const RESPONSE_TYPE: &str = "code";
pub const SCOPE: &str = "email openid phone";

/// Query parameters the provider appends to the redirect URI.
const AUTH_PARAMS: [&str; 2] = ["code", "state"];

/// OidcSettings
///
/// Client registration for the user pool. Built once from `AppConfig`.
#[derive(Debug, Clone)]
pub struct OidcSettings {
    /// Hosted UI domain serving `/login`, `/logout` and `/oauth2/token`.
    pub domain: Url,
    /// Issuer of the id tokens, `https://cognito-idp.{region}.amazonaws.com/{pool}`.
    pub authority: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub response_type: &'static str,
    pub scope: &'static str,
    /// Tokens are never refreshed in the background; an expired user record
    /// simply means "signed out".
    pub automatic_silent_renew: bool,
    pub post_logout_redirect_uri: String,
}

impl OidcSettings {
    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        let domain = Url::parse(&config.cognito_domain).map_err(|e| ConfigError::InvalidUrl {
            var: "COGNITO_DOMAIN",
            reason: e.to_string(),
        })?;

        Ok(Self {
            domain,
            authority: config.authority(),
            client_id: config.client_id.clone(),
            redirect_uri: config.redirect_uri.clone(),
            response_type: RESPONSE_TYPE,
            scope: SCOPE,
            automatic_silent_renew: false,
            post_logout_redirect_uri: config.logout_uri.clone(),
        })
    }

    /// Storage key of the signed-in user record, `oidc.user:{authority}:{client_id}`.
    pub fn user_store_key(&self) -> String {
        format!("oidc.user:{}:{}", self.authority, self.client_id)
    }

    /// login_url
    ///
    /// Hosted-UI sign-in address. Carries the registration parameters plus the
    /// per-attempt `state`, `nonce` and PKCE challenge.
    pub fn login_url(&self, state: &str, nonce: &str, pkce: &Pkce) -> String {
        let mut url = self.endpoint("/login");
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("response_type", self.response_type)
            .append_pair("scope", self.scope)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("state", state)
            .append_pair("nonce", nonce)
            .append_pair("code_challenge", &pkce.challenge)
            .append_pair("code_challenge_method", "S256");
        url.to_string()
    }

    /// logout_url
    ///
    /// Hosted-UI sign-out address. Cognito reads `logout_uri`; the OIDC name
    /// `post_logout_redirect_uri` is sent alongside it.
    pub fn logout_url(&self, id_token_hint: Option<&str>) -> String {
        let mut url = self.endpoint("/logout");
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.client_id)
                .append_pair("post_logout_redirect_uri", &self.post_logout_redirect_uri)
                .append_pair("logout_uri", &self.post_logout_redirect_uri);
            if let Some(hint) = id_token_hint {
                query.append_pair("id_token_hint", hint);
            }
        }
        url.to_string()
    }

    pub fn token_endpoint(&self) -> String {
        self.endpoint("/oauth2/token").to_string()
    }

    pub fn jwks_uri(&self) -> String {
        format!("{}/.well-known/jwks.json", self.authority)
    }

    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.domain.clone();
        url.set_path(path);
        url.set_query(None);
        url
    }
}

/// Pkce
///
/// Proof key for the code exchange (RFC 7636, S256).
#[derive(Debug, Clone)]
pub struct Pkce {
    pub verifier: String,
    pub challenge: String,
}

impl Pkce {
    pub fn generate() -> Self {
        // 64 hex characters, inside the 43..=128 range the RFC allows.
        let verifier = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
        Self::from_verifier(verifier)
    }

    pub fn from_verifier(verifier: String) -> Self {
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Self {
            verifier,
            challenge,
        }
    }
}

/// strip_auth_params
///
/// Removes `code` and `state` from an address, keeping every other query
/// parameter and the fragment. Relative addresses stay relative. Unparseable
/// input is returned unchanged.
pub fn strip_auth_params(address: &str) -> String {
    let (mut url, relative) = match Url::parse(address) {
        Ok(url) => (url, false),
        Err(_) => match Url::parse("http://relative.invalid/").and_then(|base| base.join(address)) {
            Ok(url) => (url, true),
            Err(_) => return address.to_string(),
        },
    };

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !AUTH_PARAMS.contains(&key.as_ref()))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }

    if !relative {
        return url.to_string();
    }

    let mut out = url.path().to_string();
    if let Some(query) = url.query() {
        out.push('?');
        out.push_str(query);
    }
    if let Some(fragment) = url.fragment() {
        out.push('#');
        out.push_str(fragment);
    }
    out
}

/// Tokens returned by the token endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSet {
    pub id_token: String,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime of the access token, in seconds.
    pub expires_in: i64,
}

/// Verified id-token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdClaims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub nonce: Option<String>,
    pub exp: i64,
}

/// IdentityProvider
///
/// The two network round-trips of a sign-in. Swappable so the session layer can
/// be exercised without a user pool.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Redeems an authorization code at the token endpoint.
    async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<TokenSet, AuthError>;

    /// Checks signature, audience, issuer, expiry and that the token carries `nonce`.
    async fn verify_id_token(&self, id_token: &str, nonce: &str) -> Result<IdClaims, AuthError>;
}

pub type ProviderState = Arc<dyn IdentityProvider>;

/// CognitoProvider
///
/// Talks to the hosted UI token endpoint and validates id tokens against the
/// pool's JWKS, which is fetched lazily and refetched when an unknown `kid` shows up.
pub struct CognitoProvider {
    http: reqwest::Client,
    settings: OidcSettings,
    jwks: RwLock<Option<JwkSet>>,
}

#[derive(Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

impl CognitoProvider {
    pub fn new(settings: OidcSettings) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            settings,
            jwks: RwLock::new(None),
        })
    }

    async fn decoding_key(&self, kid: &str) -> Result<DecodingKey, AuthError> {
        if let Some(jwks) = self.jwks.read().await.as_ref() {
            if let Some(jwk) = jwks.find(kid) {
                return Ok(DecodingKey::from_jwk(jwk)?);
            }
        }

        tracing::debug!(kid, "fetching signing keys");
        let fresh: JwkSet = self
            .http
            .get(self.settings.jwks_uri())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let key = match fresh.find(kid) {
            Some(jwk) => DecodingKey::from_jwk(jwk)?,
            None => return Err(AuthError::InvalidToken(format!("unknown signing key {kid}"))),
        };
        *self.jwks.write().await = Some(fresh);
        Ok(key)
    }
}

#[async_trait]
impl IdentityProvider for CognitoProvider {
    async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<TokenSet, AuthError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", self.settings.client_id.as_str()),
            ("code", code),
            ("redirect_uri", self.settings.redirect_uri.as_str()),
            ("code_verifier", code_verifier),
        ];

        let response = self
            .http
            .post(self.settings.token_endpoint())
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(match serde_json::from_str::<TokenErrorResponse>(&text) {
                Ok(body) => AuthError::Provider {
                    error: body.error,
                    description: body.error_description.unwrap_or_default(),
                },
                Err(_) => AuthError::TokenExchange(format!("status {status}: {text}")),
            });
        }

        response
            .json::<TokenSet>()
            .await
            .map_err(|e| AuthError::TokenExchange(format!("invalid response: {e}")))
    }

    async fn verify_id_token(&self, id_token: &str, nonce: &str) -> Result<IdClaims, AuthError> {
        let header = decode_header(id_token)?;
        let kid = header
            .kid
            .ok_or_else(|| AuthError::InvalidToken("missing kid".into()))?;
        let key = self.decoding_key(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&self.settings.client_id]);
        validation.set_issuer(&[&self.settings.authority]);
        validation.validate_exp = true;

        let claims = decode::<IdClaims>(id_token, &key, &validation)?.claims;
        if claims.nonce.as_deref() != Some(nonce) {
            return Err(AuthError::InvalidToken("nonce mismatch".into()));
        }
        Ok(claims)
    }
}

/// MockIdentityProvider
///
/// Deterministic provider for tests and offline development. Every code is
/// accepted unless a failure is requested.
#[derive(Debug, Clone)]
pub struct MockIdentityProvider {
    pub subject: String,
    pub email: String,
    pub fail_exchange: bool,
    pub fail_verify: bool,
}

impl Default for MockIdentityProvider {
    fn default() -> Self {
        Self {
            subject: "mock-subject".to_string(),
            email: "owner@example.com".to_string(),
            fail_exchange: false,
            fail_verify: false,
        }
    }
}

impl MockIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            fail_exchange: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn exchange_code(&self, code: &str, _code_verifier: &str) -> Result<TokenSet, AuthError> {
        if self.fail_exchange {
            return Err(AuthError::Provider {
                error: "invalid_grant".to_string(),
                description: "Mock provider rejected the code".to_string(),
            });
        }
        Ok(TokenSet {
            id_token: format!("mock-id-token.{code}"),
            access_token: "mock-access-token".to_string(),
            refresh_token: None,
            expires_in: 3600,
        })
    }

    async fn verify_id_token(&self, _id_token: &str, nonce: &str) -> Result<IdClaims, AuthError> {
        if self.fail_verify {
            return Err(AuthError::InvalidToken("Mock provider rejected the token".into()));
        }
        Ok(IdClaims {
            sub: self.subject.clone(),
            email: Some(self.email.clone()),
            nonce: Some(nonce.to_string()),
            exp: Utc::now().timestamp() + 3600,
        })
    }
}
