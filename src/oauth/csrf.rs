use axum::http::{header, HeaderMap};
use rand::Rng;

use super::provider::Provider;

/// Cookie carrying the pending flow's provider and CSRF token
pub const CSRF_COOKIE_NAME: &str = "csrf-token";

/// CSRF cookie max age (10 minutes, one authorization round trip)
const CSRF_COOKIE_MAX_AGE: i64 = 600;

/// Whether issued cookies carry the `Secure` attribute.
///
/// Derived from the insecure-cookie override in configuration; deletion uses
/// the same policy as issuance so the browser matches the cookie.
#[derive(Debug, Clone, Copy)]
pub struct CookiePolicy {
    pub secure: bool,
}

impl CookiePolicy {
    fn attributes(self) -> &'static str {
        if self.secure {
            "HttpOnly; Path=/; SameSite=Lax; Secure"
        } else {
            "HttpOnly; Path=/; SameSite=Lax"
        }
    }
}

/// Provider segment recovered from a CSRF cookie.
///
/// `Unknown` covers both an unrecognized segment and a value with no
/// separator at all; it is reported back to the client as the literal
/// provider identifier `unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CookieProvider {
    Known(Provider),
    Unknown,
}

impl CookieProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            CookieProvider::Known(provider) => provider.as_str(),
            CookieProvider::Unknown => "unknown",
        }
    }
}

/// Decoded CSRF cookie: `<provider>_<32-hex-token>`
#[derive(Debug, Clone)]
pub struct CsrfCookie {
    pub provider: CookieProvider,
    pub token: String,
}

impl CsrfCookie {
    /// Parse a raw cookie value. The provider segment is everything before
    /// the first underscore; the token is the remainder.
    pub fn parse(value: &str) -> Self {
        let (provider_segment, token) = value.split_once('_').unwrap_or((value, ""));
        let provider = match Provider::parse(provider_segment) {
            Some(provider) => CookieProvider::Known(provider),
            None => CookieProvider::Unknown,
        };

        CsrfCookie {
            provider,
            token: token.to_string(),
        }
    }

    /// Recover the CSRF cookie from the request headers, if present.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        extract_cookie(headers, CSRF_COOKIE_NAME).map(|value| Self::parse(&value))
    }
}

/// Mint a new CSRF token: 16 cryptographically random bytes as 32 lowercase
/// hex characters.
pub fn mint_token() -> String {
    let mut rng = rand::thread_rng();
    let token_bytes: [u8; 16] = rng.gen();
    hex::encode(token_bytes)
}

/// Set-Cookie header value issuing the CSRF cookie for one flow.
pub fn issue_header(provider: Provider, token: &str, policy: CookiePolicy) -> String {
    format!(
        "{}={}_{}; {}; Max-Age={}",
        CSRF_COOKIE_NAME,
        provider.as_str(),
        token,
        policy.attributes(),
        CSRF_COOKIE_MAX_AGE
    )
}

/// Set-Cookie header value deleting the CSRF cookie. Sent with every terminal
/// response page, success or failure.
pub fn clear_header(policy: CookiePolicy) -> String {
    format!("{}=; {}; Max-Age=0", CSRF_COOKIE_NAME, policy.attributes())
}

/// Extract a cookie value from request headers
fn extract_cookie(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    headers
        .get(header::COOKIE)?
        .to_str()
        .ok()?
        .split(';')
        .find_map(|cookie| {
            let (name, value) = cookie.trim().split_once('=')?;
            if name == cookie_name {
                Some(value.trim().to_string())
            } else {
                None
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECURE: CookiePolicy = CookiePolicy { secure: true };
    const INSECURE: CookiePolicy = CookiePolicy { secure: false };

    #[test]
    fn test_mint_token_format() {
        let token = mint_token();
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(token, token.to_lowercase());
    }

    #[test]
    fn test_mint_token_uniqueness() {
        assert_ne!(mint_token(), mint_token());
    }

    #[test]
    fn test_issue_and_parse_round_trip() {
        let token = mint_token();
        let header_value = issue_header(Provider::Github, &token, SECURE);

        let cookie_value = header_value
            .strip_prefix("csrf-token=")
            .unwrap()
            .split(';')
            .next()
            .unwrap();
        let parsed = CsrfCookie::parse(cookie_value);

        assert_eq!(parsed.provider, CookieProvider::Known(Provider::Github));
        assert_eq!(parsed.token, token);
    }

    #[test]
    fn test_issue_header_attributes() {
        let header_value = issue_header(Provider::Gitlab, "deadbeef", SECURE);
        assert!(header_value.starts_with("csrf-token=gitlab_deadbeef;"));
        assert!(header_value.contains("HttpOnly"));
        assert!(header_value.contains("Path=/"));
        assert!(header_value.contains("SameSite=Lax"));
        assert!(header_value.contains("Secure"));
        assert!(header_value.contains("Max-Age=600"));
    }

    #[test]
    fn test_insecure_mode_omits_secure() {
        let header_value = issue_header(Provider::Github, "deadbeef", INSECURE);
        assert!(!header_value.contains("Secure"));

        let clear = clear_header(INSECURE);
        assert!(!clear.contains("Secure"));
    }

    #[test]
    fn test_clear_header_deletes_cookie() {
        let clear = clear_header(SECURE);
        assert!(clear.starts_with("csrf-token=;"));
        assert!(clear.contains("Max-Age=0"));
        assert!(clear.contains("Secure"));
    }

    #[test]
    fn test_parse_unknown_provider_segment() {
        let parsed = CsrfCookie::parse("sourcehut_0123456789abcdef0123456789abcdef");
        assert_eq!(parsed.provider, CookieProvider::Unknown);
        assert_eq!(parsed.token, "0123456789abcdef0123456789abcdef");
    }

    #[test]
    fn test_parse_value_without_separator() {
        let parsed = CsrfCookie::parse("garbage");
        assert_eq!(parsed.provider, CookieProvider::Unknown);
        assert_eq!(parsed.token, "");
    }

    #[test]
    fn test_from_headers_picks_csrf_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            "session=abc; csrf-token=github_feedface; other=1"
                .parse()
                .unwrap(),
        );

        let cookie = CsrfCookie::from_headers(&headers).unwrap();
        assert_eq!(cookie.provider, CookieProvider::Known(Provider::Github));
        assert_eq!(cookie.token, "feedface");
    }

    #[test]
    fn test_from_headers_missing_cookie() {
        let headers = HeaderMap::new();
        assert!(CsrfCookie::from_headers(&headers).is_none());
    }
}
