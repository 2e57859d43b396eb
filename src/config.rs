use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;
use crate::gateway::providers::ProviderRegistry;

pub const PROXY_AUTH_TOKEN_KEY: &str = "PROXY_AUTH_TOKEN";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_MAX_BODY_BYTES: usize = 100 * 1024 * 1024;

/// Key lookup over an optional dotenv map layered on top of the process
/// environment. Blank values are treated as absent.
#[derive(Clone, Default)]
pub struct Env {
    pub dotenv: BTreeMap<String, String>,
    process: bool,
}

impl std::fmt::Debug for Env {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<&str> = self.dotenv.keys().map(|key| key.as_str()).collect();
        f.debug_struct("Env")
            .field("dotenv_keys", &keys)
            .field("process", &self.process)
            .finish()
    }
}

impl Env {
    pub fn process() -> Self {
        Self {
            dotenv: BTreeMap::new(),
            process: true,
        }
    }

    /// No process-environment fallback.
    pub fn isolated(dotenv: BTreeMap<String, String>) -> Self {
        Self {
            dotenv,
            process: false,
        }
    }

    pub fn with_dotenv_file(mut self, path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Dotenv {
            path: path.display().to_string(),
            source,
        })?;
        self.dotenv.extend(parse_dotenv(&contents));
        Ok(self)
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let value = match self.dotenv.get(key) {
            Some(value) => Some(value.clone()),
            None if self.process => std::env::var(key).ok(),
            None => None,
        };
        value.filter(|value| !value.trim().is_empty())
    }
}

pub fn parse_dotenv(contents: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::<String, String>::new();

    for raw_line in contents.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let line = line.strip_prefix("export ").unwrap_or(line).trim();
        let Some((raw_key, raw_value)) = line.split_once('=') else {
            continue;
        };
        let key = raw_key.trim();
        if key.is_empty() {
            continue;
        }

        let raw_value = raw_value.trim();
        let value = raw_value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .or_else(|| raw_value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
            .unwrap_or(raw_value);

        if value.trim().is_empty() {
            continue;
        }

        out.insert(key.to_string(), value.to_string());
    }

    out
}

/// Provider credentials keyed by their configuration key. Only configured
/// keys are present.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    values: BTreeMap<String, String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<&str> = self.values.keys().map(|key| key.as_str()).collect();
        f.debug_struct("Credentials").field("keys", &keys).finish()
    }
}

impl Credentials {
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }
}

/// Settings of the single pooled client shared by every upstream call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpstreamSettings {
    /// Ceiling on a whole call, body included.
    pub timeout: Duration,
    /// TCP connect plus TLS handshake.
    pub connect_timeout: Duration,
    pub pool_idle_timeout: Duration,
    pub pool_max_idle_per_host: usize,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(720),
            connect_timeout: Duration::from_secs(10),
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 100,
        }
    }
}

#[derive(Clone)]
pub struct ProxyConfig {
    shared_secret: String,
    pub credentials: Credentials,
    pub listen: SocketAddr,
    pub max_body_bytes: usize,
    pub upstream: UpstreamSettings,
    pub json_logs: bool,
}

impl std::fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("shared_secret", &"<redacted>")
            .field("credentials", &self.credentials)
            .field("listen", &self.listen)
            .field("max_body_bytes", &self.max_body_bytes)
            .field("upstream", &self.upstream)
            .field("json_logs", &self.json_logs)
            .finish()
    }
}

impl ProxyConfig {
    pub fn new(shared_secret: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            shared_secret: shared_secret.into(),
            credentials,
            listen: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            upstream: UpstreamSettings::default(),
            json_logs: false,
        }
    }

    /// Read the shared secret and every registered provider's credential.
    /// A missing secret is fatal; a missing credential only disables that
    /// provider.
    pub fn from_env(env: &Env, registry: &ProviderRegistry) -> Result<Self, ConfigError> {
        let shared_secret = env
            .get(PROXY_AUTH_TOKEN_KEY)
            .ok_or(ConfigError::MissingSecret {
                key: PROXY_AUTH_TOKEN_KEY,
            })?;

        let mut credentials = Credentials::default();
        for provider in registry.iter() {
            if let Some(value) = env.get(provider.credential_key) {
                credentials.insert(provider.credential_key, value);
            }
        }

        Ok(Self::new(shared_secret, credentials))
    }

    pub fn with_listen(mut self, listen: SocketAddr) -> Self {
        self.listen = listen;
        self
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes.max(1);
        self
    }

    pub fn with_upstream(mut self, upstream: UpstreamSettings) -> Self {
        self.upstream = upstream;
        self
    }

    pub fn with_json_logs(mut self, json_logs: bool) -> Self {
        self.json_logs = json_logs;
        self
    }

    pub fn shared_secret(&self) -> &str {
        &self.shared_secret
    }
}
