//! The authorization/callback core: provider registry, CSRF cookie codec,
//! postMessage response page, and the two flow handlers.

pub mod csrf;
pub mod endpoints;
pub mod page;
pub mod provider;

pub use csrf::{CookiePolicy, CookieProvider, CsrfCookie};
pub use endpoints::{authorize_handler, callback_handler};
pub use page::{ErrorCode, FlowOutcome};
pub use provider::{Provider, ProviderDescriptor, ProviderRegistry, RegistryError};
