pub mod config;
mod error;
pub mod gateway;
mod logging;

pub use config::{Credentials, Env, ProxyConfig, UpstreamSettings, parse_dotenv};
pub use error::{ConfigError, ProxyError};
pub use gateway::{ProviderRegistry, ProxyState, router};
pub use logging::init_tracing;
