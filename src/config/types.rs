//! Configuration Types
//!
//! All configuration structures with sensible defaults.
//! Supports global (platform config dir) and project (.trialsift/) level configuration.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::constants::{auth, network, rate_limit, retry, truncation};
use crate::types::{Result, SiftError};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// Model API settings
    pub api: ApiConfig,

    /// Outbound call ceiling
    pub rate_limit: RateLimitConfig,

    /// Retry and backoff settings
    pub retry: RetryConfig,

    /// Prompt input settings
    pub extraction: ExtractionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            api: ApiConfig::default(),
            rate_limit: RateLimitConfig::default(),
            retry: RetryConfig::default(),
            extraction: ExtractionConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    /// Returns `SiftError::Config` on validation failure.
    pub fn validate(&self) -> Result<()> {
        let endpoint = Url::parse(&self.api.endpoint).map_err(|e| {
            SiftError::Config(format!("Invalid API endpoint '{}': {}", self.api.endpoint, e))
        })?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(SiftError::Config(format!(
                "API endpoint must use http or https, got '{}'",
                endpoint.scheme()
            )));
        }

        if self.api.model.trim().is_empty() {
            return Err(SiftError::Config("API model must not be empty".to_string()));
        }

        if !(0.0..=1.0).contains(&self.api.temperature) {
            return Err(SiftError::Config(format!(
                "API temperature must be between 0.0 and 1.0, got {}",
                self.api.temperature
            )));
        }

        if !(0.0..=1.0).contains(&self.api.top_p) {
            return Err(SiftError::Config(format!(
                "API top_p must be between 0.0 and 1.0, got {}",
                self.api.top_p
            )));
        }

        if self.api.timeout_secs == 0 {
            return Err(SiftError::Config(
                "API timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.api.max_tokens == 0 {
            return Err(SiftError::Config(
                "API max_tokens must be greater than 0".to_string(),
            ));
        }

        if self.api.token_ttl_secs <= auth::REFRESH_MARGIN_SECS as u64 {
            return Err(SiftError::Config(format!(
                "API token_ttl_secs must be greater than {}",
                auth::REFRESH_MARGIN_SECS
            )));
        }

        if self.rate_limit.max_requests == 0 || self.rate_limit.window_ms == 0 {
            return Err(SiftError::Config(
                "Rate limit max_requests and window_ms must be greater than 0".to_string(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(SiftError::Config(
                "Retry max_attempts must be at least 1".to_string(),
            ));
        }

        if self.extraction.max_input_tokens == 0 {
            return Err(SiftError::Config(
                "Extraction max_input_tokens must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

// =============================================================================
// API Configuration
// =============================================================================

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Chat completions endpoint
    pub endpoint: String,

    /// Model name
    pub model: String,

    /// Sampling temperature (low keeps extraction deterministic)
    pub temperature: f32,

    /// Nucleus sampling cutoff
    pub top_p: f32,

    /// Completion token limit
    pub max_tokens: u32,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Bearer token lifetime in seconds
    pub token_ttl_secs: u64,

    /// Credential `<key_id>.<secret>`; never written back to disk
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: network::DEFAULT_ENDPOINT.to_string(),
            model: network::DEFAULT_MODEL.to_string(),
            temperature: 0.1,
            top_p: 0.7,
            max_tokens: network::DEFAULT_MAX_TOKENS,
            timeout_secs: network::DEFAULT_TIMEOUT_SECS,
            token_ttl_secs: auth::TOKEN_TTL_SECS,
            api_key: None,
        }
    }
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("top_p", &self.top_p)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .field("token_ttl_secs", &self.token_ttl_secs)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

// =============================================================================
// Rate Limit / Retry / Extraction
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Maximum calls starting within one window
    pub max_requests: usize,

    /// Window length in milliseconds
    pub window_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: rate_limit::MAX_REQUESTS_PER_WINDOW,
            window_ms: rate_limit::WINDOW_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per request, first try included
    pub max_attempts: u32,

    /// Backoff base in milliseconds
    pub base_delay_ms: u64,

    /// Exclusive upper bound of jitter in milliseconds
    pub max_jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: retry::MAX_ATTEMPTS,
            base_delay_ms: retry::BASE_DELAY_MS,
            max_jitter_ms: retry::MAX_JITTER_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Input token budget; longer documents are truncated
    pub max_input_tokens: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_input_tokens: truncation::DEFAULT_MAX_INPUT_TOKENS,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
