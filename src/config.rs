//! Configuration management for Turnstile.

use axum::http::HeaderName;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{Result, TurnstileError};
use crate::ratelimit::{PolicyConfig, PolicySet};

/// Prefix for environment overrides, e.g. `TURNSTILE__SERVER__HTTP_ADDR`.
const ENV_PREFIX: &str = "TURNSTILE";

/// Main configuration for the Turnstile service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Named policies
    #[serde(default)]
    pub policies: HashMap<String, PolicyConfig>,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Header carrying the client address, set by the trusted proxy
    #[serde(default = "default_client_header")]
    pub client_header: String,

    /// Interval between sweeps of stale windows, in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// How long a window is kept after it ends, in milliseconds
    #[serde(default = "default_stale_grace")]
    pub stale_grace_ms: u64,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            client_header: default_client_header(),
            sweep_interval_secs: default_sweep_interval(),
            stale_grace_ms: default_stale_grace(),
        }
    }
}

fn default_client_header() -> String {
    "x-forwarded-for".to_string()
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_stale_grace() -> u64 {
    60_000
}

impl RateLimitingConfig {
    /// Parsed client header name.
    pub fn client_header_name(&self) -> Result<HeaderName> {
        HeaderName::from_bytes(self.client_header.to_ascii_lowercase().as_bytes()).map_err(|e| {
            TurnstileError::Config(format!(
                "Invalid client header '{}': {}",
                self.client_header, e
            ))
        })
    }

    /// Interval between sweeps.
    pub fn sweep_interval(&self) -> Result<Duration> {
        if self.sweep_interval_secs == 0 {
            return Err(TurnstileError::Config(
                "sweep_interval_secs must be greater than zero".to_string(),
            ));
        }
        Ok(Duration::from_secs(self.sweep_interval_secs))
    }
}

/// Settings that may be overridden from the environment.
///
/// Policies are not overridable: environment keys are case-folded, which
/// would rename them.
#[derive(Debug, Default, Deserialize)]
struct EnvOverrides {
    #[serde(default)]
    server: ServerOverrides,
    #[serde(default)]
    rate_limiting: RateLimitingOverrides,
}

#[derive(Debug, Default, Deserialize)]
struct ServerOverrides {
    http_addr: Option<SocketAddr>,
}

#[derive(Debug, Default, Deserialize)]
struct RateLimitingOverrides {
    client_header: Option<String>,
    sweep_interval_secs: Option<u64>,
    stale_grace_ms: Option<u64>,
}

impl EnvOverrides {
    fn apply(self, config: &mut TurnstileConfig) {
        if let Some(addr) = self.server.http_addr {
            config.server.http_addr = addr;
        }
        let rate_limiting = &mut config.rate_limiting;
        if let Some(header) = self.rate_limiting.client_header {
            rate_limiting.client_header = header;
        }
        if let Some(secs) = self.rate_limiting.sweep_interval_secs {
            rate_limiting.sweep_interval_secs = secs;
        }
        if let Some(ms) = self.rate_limiting.stale_grace_ms {
            rate_limiting.stale_grace_ms = ms;
        }
    }
}

impl TurnstileConfig {
    /// Load configuration from an optional YAML file, then apply
    /// `TURNSTILE__SECTION__FIELD` environment overrides.
    pub fn load(path: Option<&str>) -> Result<Self> {
        Self::load_with_env(
            path,
            ::config::Environment::with_prefix(ENV_PREFIX).separator("__"),
        )
    }

    fn load_with_env(path: Option<&str>, environment: ::config::Environment) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        let overrides: EnvOverrides = ::config::Config::builder()
            .add_source(environment)
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| TurnstileError::Config(format!("Invalid environment override: {}", e)))?;
        overrides.apply(&mut config);

        Ok(config)
    }

    /// Load configuration from a YAML file path, without environment overrides.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| TurnstileError::Config(e.to_string()))
    }

    /// Validated policies.
    pub fn policy_set(&self) -> Result<PolicySet> {
        PolicySet::from_configs(&self.policies)
    }

    /// Check every setting that can only be validated after parsing.
    pub fn validate(&self) -> Result<()> {
        self.rate_limiting.client_header_name()?;
        self.rate_limiting.sweep_interval()?;
        self.policy_set()?;
        Ok(())
    }
}
