use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::http_server::AppState;

use super::csrf::{self, CookieProvider, CsrfCookie};
use super::page::{self, ErrorCode, FlowOutcome};
use super::provider::{Provider, RegistryError};

/// Query parameters for the authorization-start leg
#[derive(Debug, Deserialize)]
pub struct AuthorizeParams {
    /// Requested provider identifier (raw, unvalidated)
    #[serde(default)]
    provider: Option<String>,

    /// Target domain the CMS runs on, checked against the allow-list
    #[serde(default)]
    site_id: Option<String>,
}

/// Query parameters for the provider callback leg
#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    /// Authorization code returned by the provider
    #[serde(default)]
    code: Option<String>,

    /// State parameter echoed back by the provider
    #[serde(default)]
    state: Option<String>,
}

/// Token endpoint response body. Providers return either an access token or
/// an error string; anything else is malformed.
#[derive(Debug, Deserialize)]
struct ExchangeResponse {
    access_token: Option<String>,
    error: Option<String>,
}

/// Handle GET /auth (and aliases) - start an authorization flow
///
/// Validates the requested provider and target domain, mints a CSRF token,
/// sets it as the flow cookie, and redirects the browser to the provider's
/// authorization endpoint. No network calls on this leg.
pub async fn authorize_handler(
    State(state): State<AppState>,
    Query(params): Query<AuthorizeParams>,
    headers: HeaderMap,
) -> Response {
    let policy = state.cookie_policy();

    let provider = match params.provider.as_deref().and_then(Provider::parse) {
        Some(provider) => provider,
        None => {
            warn!(provider = ?params.provider, "Rejected authorization for unknown provider");
            let raw = params.provider.as_deref().unwrap_or("");
            return page::render(
                &FlowOutcome::failure(
                    "unknown",
                    ErrorCode::UnsupportedBackend,
                    format!("Unsupported provider: {}", raw),
                ),
                policy,
            );
        }
    };

    let site_id = params.site_id.as_deref().unwrap_or("");
    if !site_allowed(&state.config.allowed_domains, site_id) {
        warn!(provider = %provider, site_id = %site_id, "Target domain not in allow-list");
        return page::render(
            &FlowOutcome::failure(
                provider.as_str(),
                ErrorCode::UnsupportedDomain,
                format!("The domain {} is not allowed", site_id),
            ),
            policy,
        );
    }

    let descriptor = match state.registry.resolve(provider) {
        Ok(descriptor) => descriptor,
        Err(e) => {
            warn!(provider = %provider, error = %e, "Provider resolution failed");
            return page::render(
                &FlowOutcome::failure(provider.as_str(), registry_error_code(&e), e.to_string()),
                policy,
            );
        }
    };

    let token = csrf::mint_token();
    let origin = request_origin(&headers, state.config.insecure_cookies);
    let auth_url = descriptor.authorization_url(&token, &origin);

    info!(
        provider = %provider,
        site_id = %site_id,
        "Redirecting to provider authorization endpoint"
    );

    (
        StatusCode::FOUND,
        [
            (header::SET_COOKIE, csrf::issue_header(provider, &token, policy)),
            (header::LOCATION, auth_url.to_string()),
        ],
    )
        .into_response()
}

/// Handle GET /callback (and alias) - finish an authorization flow
///
/// Recovers the pending flow from the CSRF cookie, verifies the returned
/// `state` against the minted token, exchanges the authorization code for an
/// access token (one attempt, no retry), and renders the terminal page. The
/// cookie is cleared on every outcome.
pub async fn callback_handler(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
    headers: HeaderMap,
) -> Response {
    let policy = state.cookie_policy();

    let Some(cookie) = CsrfCookie::from_headers(&headers) else {
        warn!("Callback without a pending flow cookie");
        return page::render(
            &FlowOutcome::failure(
                "unknown",
                ErrorCode::UnsupportedBackend,
                "No authorization flow is in progress",
            ),
            policy,
        );
    };

    let provider = match cookie.provider {
        CookieProvider::Known(provider) => provider,
        CookieProvider::Unknown => {
            warn!("Callback cookie carries an unrecognized provider segment");
            return page::render(
                &FlowOutcome::failure(
                    "unknown",
                    ErrorCode::UnsupportedBackend,
                    "Unsupported provider in pending flow",
                ),
                policy,
            );
        }
    };

    let (Some(code), Some(returned_state)) = (params.code.as_deref(), params.state.as_deref())
    else {
        warn!(provider = %provider, "Callback missing code or state parameter");
        return page::render(
            &FlowOutcome::failure(
                provider.as_str(),
                ErrorCode::AuthCodeRequestFailed,
                "Callback did not include both code and state",
            ),
            policy,
        );
    };

    // A callback is honored only when its state exactly equals the token
    // minted for this browser's pending flow.
    if cookie.token.is_empty() || returned_state != cookie.token {
        warn!(provider = %provider, "State parameter mismatch - possible CSRF attack");
        return page::render(
            &FlowOutcome::failure(
                provider.as_str(),
                ErrorCode::CsrfDetected,
                "State did not match the pending authorization flow",
            ),
            policy,
        );
    }

    let descriptor = match state.registry.resolve(provider) {
        Ok(descriptor) => descriptor,
        Err(e) => {
            warn!(provider = %provider, error = %e, "Provider resolution failed");
            return page::render(
                &FlowOutcome::failure(provider.as_str(), registry_error_code(&e), e.to_string()),
                policy,
            );
        }
    };

    let origin = request_origin(&headers, state.config.insecure_cookies);
    info!(provider = %provider, "Exchanging authorization code for access token");

    let response = match descriptor
        .token_request(&state.http, code, &origin)
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            error!(provider = %provider, error = %e, "Token exchange request did not complete");
            return page::render(
                &FlowOutcome::failure(
                    provider.as_str(),
                    ErrorCode::TokenRequestFailed,
                    format!("Token request to {} failed: {}", provider, e),
                ),
                policy,
            );
        }
    };

    let body: ExchangeResponse = match response.json().await {
        Ok(body) => body,
        Err(e) => {
            error!(provider = %provider, error = %e, "Token response could not be parsed");
            return page::render(
                &FlowOutcome::failure(
                    provider.as_str(),
                    ErrorCode::MalformedResponse,
                    format!("Token response from {} could not be parsed", provider),
                ),
                policy,
            );
        }
    };

    let outcome = match (body.access_token, body.error) {
        (Some(token), _) => {
            info!(provider = %provider, "Token exchange succeeded");
            FlowOutcome::success(provider, token)
        }
        (None, Some(provider_error)) => {
            // Surfaced verbatim, not mapped onto the local taxonomy
            warn!(provider = %provider, error = %provider_error, "Provider reported an exchange error");
            FlowOutcome::provider_error(provider, provider_error)
        }
        (None, None) => {
            error!(provider = %provider, "Token response carried neither access_token nor error");
            FlowOutcome::failure(
                provider.as_str(),
                ErrorCode::MalformedResponse,
                "Token response contained neither access_token nor error",
            )
        }
    };

    page::render(&outcome, policy)
}

fn registry_error_code(error: &RegistryError) -> ErrorCode {
    match error {
        RegistryError::NotImplemented(_) => ErrorCode::UnsupportedBackend,
        RegistryError::MissingCredentials(_) => ErrorCode::MisconfiguredClient,
    }
}

/// Check a target domain against the configured allow-list.
///
/// An empty list allows any domain (fail-open, an explicit policy choice).
fn site_allowed(patterns: &[String], domain: &str) -> bool {
    if patterns.is_empty() {
        return true;
    }
    patterns.iter().any(|pattern| domain_matches(pattern, domain))
}

/// One allow-list entry is a literal string except a single `*`, which
/// stands for one or more characters, anchored at both ends.
fn domain_matches(pattern: &str, domain: &str) -> bool {
    match pattern.split_once('*') {
        None => pattern == domain,
        Some((prefix, suffix)) => {
            domain.len() > prefix.len() + suffix.len()
                && domain.starts_with(prefix)
                && domain.ends_with(suffix)
        }
    }
}

/// Derive this service's own origin from the request, for the callback
/// redirect URI. X-Forwarded-Proto wins when a proxy sets it; otherwise the
/// scheme follows the cookie security mode.
fn request_origin(headers: &HeaderMap, insecure: bool) -> String {
    let default_scheme = if insecure { "http" } else { "https" };
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(default_scheme);
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");

    format!("{}://{}", scheme, host)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_matches_literal() {
        assert!(domain_matches("example.com", "example.com"));
        assert!(!domain_matches("example.com", "www.example.com"));
    }

    #[test]
    fn test_domain_matches_wildcard_one_or_more() {
        assert!(domain_matches("*.example.com", "a.example.com"));
        assert!(domain_matches("*.example.com", "deep.sub.example.com"));
        // `*` must consume at least one character
        assert!(!domain_matches("*.example.com", ".example.com"));
        assert!(!domain_matches("*.example.com", "example.com"));
    }

    #[test]
    fn test_domain_matches_is_anchored() {
        assert!(!domain_matches("*.example.com", "a.example.com.evil.net"));
        assert!(!domain_matches("*.example.com", "evil.com"));
    }

    #[test]
    fn test_bare_wildcard_requires_nonempty_domain() {
        assert!(domain_matches("*", "anything.net"));
        assert!(!domain_matches("*", ""));
    }

    #[test]
    fn test_site_allowed_empty_list_is_fail_open() {
        assert!(site_allowed(&[], "evil.com"));
        assert!(site_allowed(&[], ""));
    }

    #[test]
    fn test_site_allowed_any_entry_suffices() {
        let patterns = vec!["a.example.com".to_string(), "*.example.org".to_string()];
        assert!(site_allowed(&patterns, "a.example.com"));
        assert!(site_allowed(&patterns, "b.example.org"));
        assert!(!site_allowed(&patterns, "b.example.com"));
    }

    #[test]
    fn test_request_origin_from_host_header() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, "relay.example.com".parse().unwrap());

        assert_eq!(
            request_origin(&headers, false),
            "https://relay.example.com"
        );
        assert_eq!(request_origin(&headers, true), "http://relay.example.com");
    }

    #[test]
    fn test_request_origin_forwarded_proto_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, "relay.example.com:8080".parse().unwrap());
        headers.insert("x-forwarded-proto", "https, http".parse().unwrap());

        assert_eq!(
            request_origin(&headers, true),
            "https://relay.example.com:8080"
        );
    }
}
