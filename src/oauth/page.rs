use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use super::csrf::{self, CookiePolicy};
use super::provider::Provider;

/// Local error taxonomy surfaced to the opener inside the postMessage
/// payload as `errorCode`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    UnsupportedBackend,
    UnsupportedDomain,
    MisconfiguredClient,
    AuthCodeRequestFailed,
    CsrfDetected,
    TokenRequestFailed,
    MalformedResponse,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::UnsupportedBackend => "UNSUPPORTED_BACKEND",
            ErrorCode::UnsupportedDomain => "UNSUPPORTED_DOMAIN",
            ErrorCode::MisconfiguredClient => "MISCONFIGURED_CLIENT",
            ErrorCode::AuthCodeRequestFailed => "AUTH_CODE_REQUEST_FAILED",
            ErrorCode::CsrfDetected => "CSRF_DETECTED",
            ErrorCode::TokenRequestFailed => "TOKEN_REQUEST_FAILED",
            ErrorCode::MalformedResponse => "MALFORMED_RESPONSE",
        }
    }
}

/// Terminal result of one flow, rendered exactly once into the response page
#[derive(Debug, Clone)]
pub enum FlowOutcome {
    Success {
        provider: Provider,
        token: String,
    },
    Error {
        /// Provider label from the fixed set (`github`/`gitlab`/`bitbucket`)
        /// or the literal `unknown`; never free-form input
        provider: &'static str,
        error: String,
        error_code: String,
    },
}

impl FlowOutcome {
    pub fn success(provider: Provider, token: String) -> Self {
        FlowOutcome::Success { provider, token }
    }

    pub fn failure(
        provider: &'static str,
        code: ErrorCode,
        message: impl Into<String>,
    ) -> Self {
        FlowOutcome::Error {
            provider,
            error: message.into(),
            error_code: code.as_str().to_string(),
        }
    }

    /// A provider-reported token-exchange error, surfaced verbatim rather
    /// than mapped onto the local taxonomy.
    pub fn provider_error(provider: Provider, error: String) -> Self {
        FlowOutcome::Error {
            provider: provider.as_str(),
            error_code: error.clone(),
            error,
        }
    }

    fn provider_label(&self) -> &'static str {
        match self {
            FlowOutcome::Success { provider, .. } => provider.as_str(),
            FlowOutcome::Error { provider, .. } => provider,
        }
    }

    fn status(&self) -> &'static str {
        match self {
            FlowOutcome::Success { .. } => "success",
            FlowOutcome::Error { .. } => "error",
        }
    }

    fn content(&self) -> String {
        match self {
            FlowOutcome::Success { provider, token } => json!({
                "token": token,
                "provider": provider.as_str(),
            })
            .to_string(),
            FlowOutcome::Error {
                provider,
                error,
                error_code,
            } => json!({
                "provider": provider,
                "error": error,
                "errorCode": error_code,
            })
            .to_string(),
        }
    }
}

/// Render the postMessage responder page and delete the CSRF cookie.
///
/// The embedded script performs the opener handshake: it immediately posts
/// `authorizing:<provider>` to the opener with a wildcard origin, then waits
/// for the opener to echo that exact string back. The echo's origin is the
/// trusted destination for the final `authorization:<provider>:<status>:`
/// message, so the popup never has to guess who opened it.
pub fn render(outcome: &FlowOutcome, policy: CookiePolicy) -> Response {
    let provider = outcome.provider_label();
    let handshake = js_string(&format!("authorizing:{}", provider));
    let message = js_string(&format!(
        "authorization:{}:{}:{}",
        provider,
        outcome.status(),
        outcome.content()
    ));

    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Authorizing with {provider}</title></head>
<body>
<p>Authorizing with {provider}...</p>
<script>
(function() {{
  function receiveMessage(e) {{
    if (e.data !== {handshake}) {{
      return;
    }}
    window.opener.postMessage({message}, e.origin);
    window.removeEventListener('message', receiveMessage, false);
  }}
  window.addEventListener('message', receiveMessage, false);
  window.opener.postMessage({handshake}, '*');
}})();
</script>
</body>
</html>
"#
    );

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/html;charset=UTF-8".to_string()),
            (header::SET_COOKIE, csrf::clear_header(policy)),
        ],
        html,
    )
        .into_response()
}

/// Quote a value as a single-quoted JS string literal.
///
/// The payload segment is already JSON-serialized, which escapes double
/// quotes, backslashes, and control characters; what remains is keeping
/// free-form text from breaking out of the single quotes or closing the
/// script element.
fn js_string(raw: &str) -> String {
    let escaped = raw.replace('\'', "\\'").replace("</", "<\\/");
    format!("'{}'", escaped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    const POLICY: CookiePolicy = CookiePolicy { secure: true };

    async fn render_to_string(outcome: &FlowOutcome) -> (Response, String) {
        let response = render(outcome, POLICY);
        let (parts, body) = response.into_parts();
        let bytes = to_bytes(body, usize::MAX).await.unwrap();
        let html = String::from_utf8(bytes.to_vec()).unwrap();
        (Response::from_parts(parts, axum::body::Body::empty()), html)
    }

    #[tokio::test]
    async fn test_success_page_embeds_token_and_handshake() {
        let outcome = FlowOutcome::success(Provider::Github, "XYZ".to_string());
        let (response, html) = render_to_string(&outcome).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/html;charset=UTF-8"
        );
        assert!(html.contains("'authorizing:github'"));
        assert!(html.contains("authorization:github:success:"));
        assert!(html.contains(r#"token":"XYZ""#));
        assert!(!html.contains(r#""error""#));
    }

    #[tokio::test]
    async fn test_error_page_embeds_code_and_message() {
        let outcome = FlowOutcome::failure(
            "unknown",
            ErrorCode::UnsupportedBackend,
            "Provider sourcehut is not supported",
        );
        let (_, html) = render_to_string(&outcome).await;

        assert!(html.contains("authorization:unknown:error:"));
        assert!(html.contains(r#"errorCode":"UNSUPPORTED_BACKEND""#));
        assert!(html.contains("Provider sourcehut is not supported"));
    }

    #[tokio::test]
    async fn test_every_render_clears_the_cookie() {
        let outcome = FlowOutcome::success(Provider::Gitlab, "tok".to_string());
        let (response, _) = render_to_string(&outcome).await;

        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(set_cookie.starts_with("csrf-token=;"));
        assert!(set_cookie.contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn test_provider_error_passes_through_verbatim() {
        let outcome =
            FlowOutcome::provider_error(Provider::Github, "bad_verification_code".to_string());
        let (_, html) = render_to_string(&outcome).await;

        assert!(html.contains(r#"error":"bad_verification_code""#));
        assert!(html.contains(r#"errorCode":"bad_verification_code""#));
    }

    #[tokio::test]
    async fn test_free_form_error_text_cannot_break_the_script() {
        let outcome = FlowOutcome::failure(
            "github",
            ErrorCode::TokenRequestFailed,
            "quote ' and tag </script> in error text",
        );
        let (_, html) = render_to_string(&outcome).await;

        // The closing sequence must not appear unescaped inside the literal
        assert!(!html.contains("tag </script> in"));
        assert!(html.contains(r"quote \' and"));
        assert!(html.contains(r"<\/script>"));
    }
}
