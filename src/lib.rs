pub mod config;
pub mod http_server;
pub mod oauth;

pub use config::{Config, ConfigError, ProviderCredentials};
pub use http_server::{create_app, run_server, AppState, ServerError};
pub use oauth::{ErrorCode, FlowOutcome, Provider, ProviderRegistry};
