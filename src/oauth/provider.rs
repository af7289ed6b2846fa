use std::fmt;

use reqwest::header::ACCEPT;
use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::config::{Config, ProviderCredentials};

/// Scopes requested on the authorization leg
const GITHUB_SCOPE: &str = "repo,user";
const GITLAB_SCOPE: &str = "api";

const GITHUB_AUTHORIZE_PATH: &str = "/login/oauth/authorize";
const GITHUB_TOKEN_PATH: &str = "/login/oauth/access_token";
const GITLAB_AUTHORIZE_PATH: &str = "/oauth/authorize";
const GITLAB_TOKEN_PATH: &str = "/oauth/token";
const BITBUCKET_AUTHORIZE_PATH: &str = "/site/oauth2/authorize";
const BITBUCKET_TOKEN_PATH: &str = "/site/oauth2/access_token";

/// The closed set of Git hosting providers the relay knows about.
///
/// Bitbucket is recognized (its identifier round-trips through the CSRF
/// cookie) but its OAuth dance is not implemented; the registry refuses to
/// resolve it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Github,
    Gitlab,
    Bitbucket,
}

impl Provider {
    /// Parse a provider identifier from a query parameter or cookie segment.
    pub fn parse(s: &str) -> Option<Provider> {
        match s {
            "github" => Some(Provider::Github),
            "gitlab" => Some(Provider::Gitlab),
            "bitbucket" => Some(Provider::Bitbucket),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Github => "github",
            Provider::Gitlab => "gitlab",
            Provider::Bitbucket => "bitbucket",
        }
    }

    fn authorize_path(self) -> &'static str {
        match self {
            Provider::Github => GITHUB_AUTHORIZE_PATH,
            Provider::Gitlab => GITLAB_AUTHORIZE_PATH,
            Provider::Bitbucket => BITBUCKET_AUTHORIZE_PATH,
        }
    }

    fn token_path(self) -> &'static str {
        match self {
            Provider::Github => GITHUB_TOKEN_PATH,
            Provider::Gitlab => GITLAB_TOKEN_PATH,
            Provider::Bitbucket => BITBUCKET_TOKEN_PATH,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from resolving a provider against the registry
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Provider {0} is not yet supported")]
    NotImplemented(Provider),

    #[error("No OAuth client credentials configured for {0}")]
    MissingCredentials(Provider),
}

/// Static description of one usable provider: endpoint URLs, scope, and the
/// OAuth client credentials. Immutable for the process lifetime.
#[derive(Debug, Clone)]
pub struct ProviderDescriptor {
    provider: Provider,
    authorize_endpoint: Url,
    token_endpoint: Url,
    client_id: String,
    client_secret: String,
}

impl ProviderDescriptor {
    fn new(
        provider: Provider,
        origin: &Url,
        credentials: &ProviderCredentials,
    ) -> Result<Self, url::ParseError> {
        Ok(ProviderDescriptor {
            provider,
            authorize_endpoint: origin.join(provider.authorize_path())?,
            token_endpoint: origin.join(provider.token_path())?,
            client_id: credentials.client_id.clone(),
            client_secret: credentials.client_secret.clone(),
        })
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    /// Build the authorization URL the browser is redirected to.
    ///
    /// GitHub only takes a client id, scope, and state on this leg; GitLab
    /// additionally requires `response_type=code` and an explicit
    /// `redirect_uri` pointing back at this service's callback route.
    pub fn authorization_url(&self, state: &str, callback_origin: &str) -> Url {
        let mut url = self.authorize_endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("client_id", &self.client_id);
            match self.provider {
                Provider::Github => {
                    query.append_pair("scope", GITHUB_SCOPE);
                }
                Provider::Gitlab | Provider::Bitbucket => {
                    query.append_pair(
                        "redirect_uri",
                        &format!("{}/callback", callback_origin),
                    );
                    query.append_pair("response_type", "code");
                    query.append_pair("scope", GITLAB_SCOPE);
                }
            }
            query.append_pair("state", state);
        }
        url
    }

    /// Build the server-to-server token-exchange request.
    ///
    /// Both providers take a JSON body and are asked for a JSON response;
    /// GitLab requires `grant_type=authorization_code` plus the same
    /// `redirect_uri` used on the authorization leg, GitHub requires neither.
    pub fn token_request(
        &self,
        http: &reqwest::Client,
        code: &str,
        callback_origin: &str,
    ) -> reqwest::RequestBuilder {
        let request = http
            .post(self.token_endpoint.clone())
            .header(ACCEPT, "application/json");

        match self.provider {
            Provider::Github => {
                #[derive(Serialize)]
                struct ExchangeBody<'a> {
                    client_id: &'a str,
                    client_secret: &'a str,
                    code: &'a str,
                }

                request.json(&ExchangeBody {
                    client_id: &self.client_id,
                    client_secret: &self.client_secret,
                    code,
                })
            }
            Provider::Gitlab | Provider::Bitbucket => {
                #[derive(Serialize)]
                struct ExchangeBody<'a> {
                    client_id: &'a str,
                    client_secret: &'a str,
                    code: &'a str,
                    grant_type: &'a str,
                    redirect_uri: String,
                }

                request.json(&ExchangeBody {
                    client_id: &self.client_id,
                    client_secret: &self.client_secret,
                    code,
                    grant_type: "authorization_code",
                    redirect_uri: format!("{}/callback", callback_origin),
                })
            }
        }
    }
}

/// Registry of provider descriptors built once from configuration.
///
/// Resolution failures are split in two: a recognized-but-unimplemented
/// provider (bitbucket) and a provider whose client credentials are absent
/// from configuration. The unimplemented check comes first so bitbucket's
/// outcome never depends on what credentials happen to be configured.
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    github: Option<ProviderDescriptor>,
    gitlab: Option<ProviderDescriptor>,
}

impl ProviderRegistry {
    pub fn new(config: &Config) -> Result<Self, url::ParseError> {
        let github = config
            .github
            .as_ref()
            .map(|creds| ProviderDescriptor::new(Provider::Github, &config.github_origin, creds))
            .transpose()?;
        let gitlab = config
            .gitlab
            .as_ref()
            .map(|creds| ProviderDescriptor::new(Provider::Gitlab, &config.gitlab_origin, creds))
            .transpose()?;

        Ok(ProviderRegistry { github, gitlab })
    }

    pub fn resolve(&self, provider: Provider) -> Result<&ProviderDescriptor, RegistryError> {
        let entry = match provider {
            Provider::Bitbucket => return Err(RegistryError::NotImplemented(provider)),
            Provider::Github => self.github.as_ref(),
            Provider::Gitlab => self.gitlab.as_ref(),
        };

        entry.ok_or(RegistryError::MissingCredentials(provider))
    }
}
