//! Authenticated pass-through to hosted completion providers.

pub mod auth;
pub mod http;
pub mod providers;
pub mod proxy_backend;
pub mod relay;
pub mod transform;

pub use auth::{PROXY_AUTH_HEADER, authorize};
pub use http::{ProxyState, router};
pub use providers::{ApiKeyHeaderAuth, AuthStrategy, ProviderConfig, ProviderRegistry};
pub use proxy_backend::ProxyBackend;
pub use relay::{RelayMode, relay};
pub use transform::{InboundRequest, OutboundRequest, transform};
