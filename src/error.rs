use thiserror::Error;

/// Configuration faults detected at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} is not a valid URL: {reason}")]
    InvalidUrl { var: &'static str, reason: String },
}

/// Failures of the visitor storage backing a session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session store unavailable: {0}")]
    Store(String),

    #[error("malformed session record under {key}: {source}")]
    Record {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors raised while talking to the identity provider or finishing a sign-in.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("network error: {0}")]
    Network(String),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("invalid id token: {0}")]
    InvalidToken(String),

    #[error("no matching state found in storage")]
    UnknownState,

    #[error("identity provider returned {error}: {description}")]
    Provider { error: String, description: String },

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        AuthError::Network(e.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        AuthError::InvalidToken(e.to_string())
    }
}
