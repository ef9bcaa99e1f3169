use axum::http::{HeaderMap, header};

/// Name of the cookie carrying the visitor-storage id.
pub const SESSION_COOKIE: &str = "portfolio_session";

const EXPIRED: &str = "Expires=Thu, 01 Jan 1970 00:00:00 GMT";

/// DomainScope
///
/// Where a provider cookie may have been set. A cookie is only removed by a
/// `Set-Cookie` with the same name, domain and path, so each scope needs its
/// own expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainScope {
    /// Host-only cookie of the current host (no `Domain` attribute).
    ExactHost,
    /// `.{host}`
    DotHost,
    /// `.{parent}` with the top two labels, only for hosts of three or more labels.
    DotParent,
}

/// Cookies left behind by the provider's hosted login and logout pages.
pub const PROVIDER_COOKIE_SWEEP: [(&str, DomainScope); 15] = [
    ("XSRF-TOKEN", DomainScope::ExactHost),
    ("XSRF-TOKEN", DomainScope::DotHost),
    ("XSRF-TOKEN", DomainScope::DotParent),
    ("cognito", DomainScope::ExactHost),
    ("cognito", DomainScope::DotHost),
    ("cognito", DomainScope::DotParent),
    ("csrf-state", DomainScope::ExactHost),
    ("csrf-state", DomainScope::DotHost),
    ("csrf-state", DomainScope::DotParent),
    ("csrf-state-legacy", DomainScope::ExactHost),
    ("csrf-state-legacy", DomainScope::DotHost),
    ("csrf-state-legacy", DomainScope::DotParent),
    ("lang", DomainScope::ExactHost),
    ("lang", DomainScope::DotHost),
    ("lang", DomainScope::DotParent),
];

impl DomainScope {
    /// `DotParent` only exists for hosts with more than two labels.
    pub fn applies_to(self, host: &str) -> bool {
        match self {
            DomainScope::DotParent => host.split('.').count() > 2,
            _ => true,
        }
    }

    /// The `Domain` attribute for this scope; `None` for a host-only cookie.
    pub fn domain_attr(self, host: &str) -> Option<String> {
        match self {
            DomainScope::ExactHost => None,
            DomainScope::DotHost => Some(format!(".{host}")),
            DomainScope::DotParent => {
                let labels: Vec<&str> = host.split('.').collect();
                let parent = labels[labels.len().saturating_sub(2)..].join(".");
                Some(format!(".{parent}"))
            }
        }
    }
}

/// Strips the port from a `Host` header value, including bracketed IPv6 hosts.
pub fn host_without_port(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    host.split(':').next().unwrap_or(host)
}

pub fn expire_cookie(name: &str, domain: Option<&str>) -> String {
    match domain {
        Some(domain) => format!("{name}=; Domain={domain}; Path=/; Max-Age=0; {EXPIRED}"),
        None => format!("{name}=; Path=/; Max-Age=0; {EXPIRED}"),
    }
}

/// sweep
///
/// `Set-Cookie` values expiring every provider cookie for `host`, walking
/// `PROVIDER_COOKIE_SWEEP` in order.
pub fn sweep(host: &str) -> Vec<String> {
    let host = host_without_port(host).trim_end_matches('.');
    PROVIDER_COOKIE_SWEEP
        .iter()
        .filter(|(_, scope)| scope.applies_to(host))
        .map(|&(name, scope)| expire_cookie(name, scope.domain_attr(host).as_deref()))
        .collect()
}

pub fn session_cookie(sid: &str, secure: bool) -> String {
    // Lax so the cookie comes back on the provider's top-level redirect.
    let mut cookie = format!("{SESSION_COOKIE}={sid}; HttpOnly; SameSite=Lax; Path=/");
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn expire_session_cookie() -> String {
    format!("{SESSION_COOKIE}=deleted; HttpOnly; SameSite=Lax; Path=/; Max-Age=0; {EXPIRED}")
}

pub fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

/// The visitor-storage id, when the browser sent one.
pub fn session_id(headers: &HeaderMap) -> Option<String> {
    parse_cookie(headers, SESSION_COOKIE).filter(|sid| !sid.is_empty() && sid != "deleted")
}
