use axum::http::{HeaderMap, HeaderValue, header};
use portfolio_site::session::cookies::{
    DomainScope, PROVIDER_COOKIE_SWEEP, host_without_port, parse_cookie, session_cookie,
    session_id, sweep,
};

fn domains(cookies: &[String], name: &str) -> Vec<Option<String>> {
    cookies
        .iter()
        .filter(|c| c.starts_with(&format!("{name}=;")))
        .map(|c| {
            c.split("; ")
                .find_map(|attr| attr.strip_prefix("Domain="))
                .map(str::to_string)
        })
        .collect()
}

#[test]
fn test_sweep_covers_parent_domain_for_subdomains() {
    let cookies = sweep("www.example.com");

    assert_eq!(cookies.len(), PROVIDER_COOKIE_SWEEP.len());
    assert_eq!(
        domains(&cookies, "cognito"),
        vec![
            None,
            Some(".www.example.com".to_string()),
            Some(".example.com".to_string()),
        ]
    );
    for cookie in &cookies {
        assert!(cookie.contains("Path=/"));
        assert!(cookie.contains("Max-Age=0"));
        assert!(cookie.contains("Expires=Thu, 01 Jan 1970 00:00:00 GMT"));
    }
}

#[test]
fn test_sweep_skips_parent_scope_for_apex_host() {
    let cookies = sweep("example.com:3000");

    assert_eq!(cookies.len(), 10);
    assert_eq!(
        domains(&cookies, "XSRF-TOKEN"),
        vec![None, Some(".example.com".to_string())]
    );
    assert!(cookies.iter().all(|c| !c.contains("Domain=.com")));
}

#[test]
fn test_sweep_names() {
    let cookies = sweep("a.b.example.org");
    for name in ["XSRF-TOKEN", "cognito", "csrf-state", "csrf-state-legacy", "lang"] {
        assert_eq!(domains(&cookies, name).len(), 3, "{name}");
    }
    assert_eq!(
        domains(&cookies, "lang")[2].as_deref(),
        Some(".example.org")
    );
}

#[test]
fn test_domain_scope() {
    assert!(!DomainScope::DotParent.applies_to("localhost"));
    assert!(DomainScope::ExactHost.applies_to("localhost"));
    assert_eq!(DomainScope::ExactHost.domain_attr("localhost"), None);
    assert_eq!(
        DomainScope::DotHost.domain_attr("localhost").as_deref(),
        Some(".localhost")
    );
}

#[test]
fn test_host_without_port() {
    assert_eq!(host_without_port("example.com:8080"), "example.com");
    assert_eq!(host_without_port("example.com"), "example.com");
    assert_eq!(host_without_port("[::1]:3000"), "::1");
}

#[test]
fn test_session_cookie_attributes() {
    let local = session_cookie("abc", false);
    assert!(local.starts_with("portfolio_session=abc;"));
    assert!(local.contains("HttpOnly"));
    assert!(local.contains("SameSite=Lax"));
    assert!(!local.contains("Secure"));

    assert!(session_cookie("abc", true).ends_with("; Secure"));
}

#[test]
fn test_session_id_parsing() {
    let mut headers = HeaderMap::new();
    assert!(session_id(&headers).is_none());

    headers.insert(
        header::COOKIE,
        HeaderValue::from_static("lang=en; portfolio_session=sid-42; cognito=x"),
    );
    assert_eq!(session_id(&headers).as_deref(), Some("sid-42"));
    assert_eq!(parse_cookie(&headers, "lang").as_deref(), Some("en"));

    headers.insert(header::COOKIE, HeaderValue::from_static("portfolio_session=deleted"));
    assert!(session_id(&headers).is_none());
}
