use std::time::Duration;

use thiserror::Error;
use url::Url;

const DEFAULT_GITHUB_HOSTNAME: &str = "github.com";
const DEFAULT_GITLAB_HOSTNAME: &str = "gitlab.com";
const DEFAULT_BITBUCKET_HOSTNAME: &str = "bitbucket.com";

/// Default timeout for the outbound token-exchange call, in seconds.
const DEFAULT_TOKEN_TIMEOUT_SECS: u64 = 10;

const DEFAULT_PORT: u16 = 3000;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{client_id_var} and {client_secret_var} must be set together")]
    PartialCredentials {
        client_id_var: &'static str,
        client_secret_var: &'static str,
    },

    #[error("Invalid provider origin in {var}: {source}")]
    InvalidOrigin {
        var: &'static str,
        source: url::ParseError,
    },

    #[error("Invalid value for {var}: {reason}")]
    InvalidValue { var: &'static str, reason: String },
}

/// OAuth client credentials for one provider.
#[derive(Debug, Clone)]
pub struct ProviderCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Process configuration for the relay.
///
/// Loaded once at startup from environment variables; the handlers only ever
/// see this typed value, never raw environment text.
#[derive(Debug, Clone)]
pub struct Config {
    /// GitHub OAuth app credentials (GitHub flows unusable when absent)
    pub github: Option<ProviderCredentials>,

    /// GitLab OAuth app credentials
    pub gitlab: Option<ProviderCredentials>,

    /// Bitbucket OAuth app credentials (recognized but the flow is not
    /// implemented; kept so configuration round-trips)
    pub bitbucket: Option<ProviderCredentials>,

    /// Origin of the GitHub instance, default `https://github.com`
    pub github_origin: Url,

    /// Origin of the GitLab instance, default `https://gitlab.com`
    pub gitlab_origin: Url,

    /// Origin of the Bitbucket instance, default `https://bitbucket.com`
    pub bitbucket_origin: Url,

    /// Domain allow-list patterns for `site_id` (one `*` wildcard per
    /// entry). Empty means any domain is allowed.
    pub allowed_domains: Vec<String>,

    /// When true, cookies are issued without `Secure` and derived request
    /// origins default to `http` (local development)
    pub insecure_cookies: bool,

    /// Timeout applied to the outbound token-exchange call
    pub token_timeout: Duration,

    /// Listen port
    pub port: u16,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Recognized variables: `GITHUB_CLIENT_ID`/`GITHUB_CLIENT_SECRET` (and
    /// the `GITLAB_`/`BITBUCKET_` equivalents), `GITHUB_HOSTNAME`/
    /// `GITLAB_HOSTNAME`/`BITBUCKET_HOSTNAME`, `ALLOWED_DOMAINS`,
    /// `INSECURE_COOKIES`, `TOKEN_TIMEOUT_SECS`, `PORT`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let github = Self::credentials_from_env("GITHUB_CLIENT_ID", "GITHUB_CLIENT_SECRET")?;
        let gitlab = Self::credentials_from_env("GITLAB_CLIENT_ID", "GITLAB_CLIENT_SECRET")?;
        let bitbucket =
            Self::credentials_from_env("BITBUCKET_CLIENT_ID", "BITBUCKET_CLIENT_SECRET")?;

        let github_origin = Self::origin_from_env("GITHUB_HOSTNAME", DEFAULT_GITHUB_HOSTNAME)?;
        let gitlab_origin = Self::origin_from_env("GITLAB_HOSTNAME", DEFAULT_GITLAB_HOSTNAME)?;
        let bitbucket_origin =
            Self::origin_from_env("BITBUCKET_HOSTNAME", DEFAULT_BITBUCKET_HOSTNAME)?;

        let allowed_domains = std::env::var("ALLOWED_DOMAINS")
            .map(|raw| Self::parse_domain_list(&raw))
            .unwrap_or_default();

        let insecure_cookies = std::env::var("INSECURE_COOKIES")
            .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let token_timeout_secs = match std::env::var("TOKEN_TIMEOUT_SECS") {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .map_err(|e| ConfigError::InvalidValue {
                    var: "TOKEN_TIMEOUT_SECS",
                    reason: e.to_string(),
                })?,
            Err(_) => DEFAULT_TOKEN_TIMEOUT_SECS,
        };

        let port = match std::env::var("PORT") {
            Ok(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|e| ConfigError::InvalidValue {
                    var: "PORT",
                    reason: e.to_string(),
                })?,
            Err(_) => DEFAULT_PORT,
        };

        Ok(Config {
            github,
            gitlab,
            bitbucket,
            github_origin,
            gitlab_origin,
            bitbucket_origin,
            allowed_domains,
            insecure_cookies,
            token_timeout: Duration::from_secs(token_timeout_secs),
            port,
        })
    }

    /// Read a client id/secret pair. Both present -> credentials, both
    /// absent -> None, only one of the two -> load error.
    fn credentials_from_env(
        id_var: &'static str,
        secret_var: &'static str,
    ) -> Result<Option<ProviderCredentials>, ConfigError> {
        let client_id = std::env::var(id_var).ok().filter(|v| !v.is_empty());
        let client_secret = std::env::var(secret_var).ok().filter(|v| !v.is_empty());

        match (client_id, client_secret) {
            (Some(client_id), Some(client_secret)) => Ok(Some(ProviderCredentials {
                client_id,
                client_secret,
            })),
            (None, None) => Ok(None),
            _ => Err(ConfigError::PartialCredentials {
                client_id_var: id_var,
                client_secret_var: secret_var,
            }),
        }
    }

    /// Resolve a provider origin override. A bare hostname becomes
    /// `https://<hostname>`; a value containing `://` is parsed as a full
    /// origin URL (lets development point at an http mock).
    fn origin_from_env(var: &'static str, default_hostname: &str) -> Result<Url, ConfigError> {
        let raw = std::env::var(var).unwrap_or_else(|_| default_hostname.to_string());
        Self::parse_origin(&raw).map_err(|source| ConfigError::InvalidOrigin { var, source })
    }

    fn parse_origin(raw: &str) -> Result<Url, url::ParseError> {
        let raw = raw.trim();
        if raw.contains("://") {
            Url::parse(raw)
        } else {
            Url::parse(&format!("https://{}", raw))
        }
    }

    fn parse_domain_list(raw: &str) -> Vec<String> {
        raw.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(str::to_string)
            .collect()
    }
}
