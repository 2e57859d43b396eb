use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use llm_relay::config::{DEFAULT_MAX_BODY_BYTES, DEFAULT_PORT};
use llm_relay::{ConfigError, Env, ProviderRegistry, ProxyConfig, UpstreamSettings};

#[derive(Parser, Debug)]
#[command(name = "llm-relay", version)]
#[command(about = "Authenticated reverse proxy in front of hosted LLM completion APIs")]
pub(crate) struct Cli {
    #[arg(long, env = "PROXY_HOST", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub host: IpAddr,

    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Extra `KEY=VALUE` file consulted before the process environment.
    #[arg(long, env = "PROXY_DOTENV")]
    pub dotenv: Option<PathBuf>,

    #[arg(long, env = "PROXY_MAX_BODY_BYTES", default_value_t = DEFAULT_MAX_BODY_BYTES)]
    pub max_body_bytes: usize,

    #[arg(long, env = "PROXY_UPSTREAM_TIMEOUT_SECS", default_value_t = 720)]
    pub upstream_timeout_secs: u64,

    #[arg(long, env = "PROXY_CONNECT_TIMEOUT_SECS", default_value_t = 10)]
    pub connect_timeout_secs: u64,

    #[arg(long, env = "PROXY_POOL_IDLE_TIMEOUT_SECS", default_value_t = 90)]
    pub pool_idle_timeout_secs: u64,

    #[arg(long, env = "PROXY_POOL_MAX_IDLE_PER_HOST", default_value_t = 100)]
    pub pool_max_idle_per_host: usize,

    /// Override a provider's base address, e.g. `openai=http://127.0.0.1:9000`.
    #[arg(long = "upstream", value_name = "NAME=BASE_URL")]
    pub upstreams: Vec<String>,

    #[arg(long, env = "PROXY_JSON_LOGS")]
    pub json_logs: bool,
}

impl Cli {
    pub fn listen(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn upstream_settings(&self) -> UpstreamSettings {
        UpstreamSettings {
            timeout: Duration::from_secs(self.upstream_timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            pool_idle_timeout: Duration::from_secs(self.pool_idle_timeout_secs),
            pool_max_idle_per_host: self.pool_max_idle_per_host,
        }
    }

    pub fn env(&self) -> Result<Env, ConfigError> {
        let env = Env::process();
        match &self.dotenv {
            Some(path) => env.with_dotenv_file(path),
            None => Ok(env),
        }
    }

    pub fn registry(&self) -> Result<ProviderRegistry, ConfigError> {
        self.upstreams
            .iter()
            .try_fold(ProviderRegistry::builtin(), |registry, spec| {
                registry.with_override_spec(spec)
            })
    }

    pub fn proxy_config(
        &self,
        env: &Env,
        registry: &ProviderRegistry,
    ) -> Result<ProxyConfig, ConfigError> {
        Ok(ProxyConfig::from_env(env, registry)?
            .with_listen(self.listen())
            .with_max_body_bytes(self.max_body_bytes)
            .with_upstream(self.upstream_settings())
            .with_json_logs(self.json_logs))
    }
}
