//! Static URL-prefix → upstream provider mapping.

use crate::error::ConfigError;

/// Header-based credential injection used by the Anthropic Messages API.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ApiKeyHeaderAuth {
    /// Header carrying the raw key.
    pub key_header: &'static str,
    /// Protocol-version header, always set to `version`.
    pub version_header: &'static str,
    pub version: &'static str,
    /// Copied from the inbound request only when the client supplied it.
    pub passthrough_header: &'static str,
}

pub const ANTHROPIC_AUTH: ApiKeyHeaderAuth = ApiKeyHeaderAuth {
    key_header: "x-api-key",
    version_header: "anthropic-version",
    version: "2023-06-01",
    passthrough_header: "anthropic-beta",
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthStrategy {
    /// `Authorization: Bearer <key>`.
    Bearer,
    ApiKeyHeader(ApiKeyHeaderAuth),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderConfig {
    pub name: &'static str,
    pub base_url: String,
    /// Configuration key holding the provider credential, e.g. `OPENAI_API_KEY`.
    pub credential_key: &'static str,
    pub auth: AuthStrategy,
}

#[derive(Clone, Debug)]
pub struct ProviderRegistry {
    providers: Vec<ProviderConfig>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ProviderRegistry {
    pub fn builtin() -> Self {
        let provider = |name, base_url: &str, credential_key, auth| ProviderConfig {
            name,
            base_url: base_url.to_string(),
            credential_key,
            auth,
        };
        Self {
            providers: vec![
                provider(
                    "openai",
                    "https://api.openai.com",
                    "OPENAI_API_KEY",
                    AuthStrategy::Bearer,
                ),
                provider(
                    "nebius",
                    "https://api.studio.nebius.ai",
                    "NEBIUS_API_KEY",
                    AuthStrategy::Bearer,
                ),
                provider(
                    "deepseek",
                    "https://api.deepseek.com",
                    "DEEPSEEK_API_KEY",
                    AuthStrategy::Bearer,
                ),
                provider(
                    "anthropic",
                    "https://api.anthropic.com",
                    "ANTHROPIC_API_KEY",
                    AuthStrategy::ApiKeyHeader(ANTHROPIC_AUTH),
                ),
            ],
        }
    }

    /// Exact, case-sensitive prefix match.
    pub fn resolve(&self, prefix: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|provider| provider.name == prefix)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProviderConfig> {
        self.providers.iter()
    }

    /// Point a registered provider at a different base address.
    pub fn with_base_url(
        mut self,
        name: &str,
        base_url: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let base_url = base_url.into();
        let base_url = base_url.trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(ConfigError::InvalidUpstream {
                spec: format!("{name}="),
                reason: "base url must not be empty".to_string(),
            });
        }
        let Some(provider) = self.providers.iter_mut().find(|p| p.name == name) else {
            return Err(ConfigError::InvalidUpstream {
                spec: format!("{name}={base_url}"),
                reason: format!("unknown provider `{name}`"),
            });
        };
        provider.base_url = base_url;
        Ok(self)
    }

    /// Apply a `NAME=BASE_URL` override.
    pub fn with_override_spec(self, spec: &str) -> Result<Self, ConfigError> {
        let Some((name, base_url)) = spec.split_once('=') else {
            return Err(ConfigError::InvalidUpstream {
                spec: spec.to_string(),
                reason: "expected NAME=BASE_URL".to_string(),
            });
        };
        self.with_base_url(name.trim(), base_url.trim())
    }
}
