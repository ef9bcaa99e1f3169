use std::env;

use crate::error::ConfigError;

/// AppConfig
///
/// Holds the application's entire configuration state. Loaded once at startup and
/// shared (immutably) through `AppState` via `FromRef`.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Runtime environment marker. Controls log format, cookie flags and the
    // in-memory repository fallback.
    pub env: Env,
    // Postgres connection string for the hosted `projects` table. Only optional locally.
    pub db_url: Option<String>,
    // Address the HTTP listener binds to.
    pub bind_addr: String,
    // Hosted UI domain of the user pool, e.g. `https://portfolio.auth.us-east-1.amazoncognito.com`.
    pub cognito_domain: String,
    pub client_id: String,
    // User pool identifier, e.g. `us-east-1_AbCdEfGhI`. The authority URL is derived from it.
    pub user_pool_id: String,
    // Where the provider sends the visitor back with `?code=...&state=...`.
    pub redirect_uri: String,
    // Where the provider sends the visitor after its hosted logout page.
    pub logout_uri: String,
}

/// Env
///
/// Runtime context. `Local` gets pretty logs and non-`Secure` cookies,
/// `Production` gets JSON logs and requires a database.
#[derive(Clone, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

impl Default for AppConfig {
    /// Non-panicking configuration for test scaffolding.
    fn default() -> Self {
        Self {
            env: Env::Local,
            db_url: None,
            bind_addr: "127.0.0.1:3000".to_string(),
            cognito_domain: "https://portfolio-test.auth.us-east-1.amazoncognito.com".to_string(),
            client_id: "test-client-id".to_string(),
            user_pool_id: "us-east-1_TestPool".to_string(),
            redirect_uri: "http://localhost:3000/callback".to_string(),
            logout_uri: "http://localhost:3000/".to_string(),
        }
    }
}

impl AppConfig {
    /// from_env
    ///
    /// Reads every setting from the process environment. The identity provider
    /// settings are required in every environment; `DATABASE_URL` is required in
    /// production only.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env = match env::var("APP_ENV").as_deref() {
            Ok("production") => Env::Production,
            _ => Env::Local,
        };

        let db_url = match env {
            Env::Production => Some(required("DATABASE_URL")?),
            Env::Local => env::var("DATABASE_URL").ok(),
        };

        let cognito_domain = required("COGNITO_DOMAIN")?
            .trim_end_matches('/')
            .to_string();
        reqwest::Url::parse(&cognito_domain).map_err(|e| ConfigError::InvalidUrl {
            var: "COGNITO_DOMAIN",
            reason: e.to_string(),
        })?;

        Ok(Self {
            db_url,
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            cognito_domain,
            client_id: required("COGNITO_CLIENT_ID")?,
            user_pool_id: required("COGNITO_USER_POOL_ID")?,
            redirect_uri: required("COGNITO_REDIRECT_URI")?,
            logout_uri: required("COGNITO_LOGOUT_URI")?,
            env,
        })
    }

    /// load
    ///
    /// Startup entry point. A missing variable is a deployment fault, not something
    /// the running service can recover from.
    ///
    /// # Panics
    /// Panics when any required variable is absent.
    pub fn load() -> Self {
        match Self::from_env() {
            Ok(config) => config,
            Err(e) => panic!("FATAL: {e}"),
        }
    }

    /// AWS region of the user pool. Pool ids are `{region}_{suffix}`.
    pub fn region(&self) -> &str {
        match self.user_pool_id.split_once('_') {
            Some((region, _)) if !region.is_empty() => region,
            _ => "us-east-1",
        }
    }

    pub fn authority(&self) -> String {
        format!(
            "https://cognito-idp.{}.amazonaws.com/{}",
            self.region(),
            self.user_pool_id
        )
    }

    /// Path component of the redirect URI. The sign-in callback layer only acts
    /// on requests to this path.
    pub fn redirect_path(&self) -> String {
        reqwest::Url::parse(&self.redirect_uri)
            .map(|url| url.path().to_string())
            .unwrap_or_else(|_| "/callback".to_string())
    }

    pub fn secure_cookies(&self) -> bool {
        self.env == Env::Production
    }
}

fn required(var: &'static str) -> Result<String, ConfigError> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(var)),
    }
}
