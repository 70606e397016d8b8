//! Global Constants
//!
//! Centralized constants for configuration and tuning.
//! All magic numbers should be defined here with documentation.

/// Sliding-window rate limiter constants
pub mod rate_limit {
    /// Maximum calls allowed to begin in any trailing window
    pub const MAX_REQUESTS_PER_WINDOW: usize = 60;

    /// Trailing window length (milliseconds)
    pub const WINDOW_MS: u64 = 60_000;
}

/// Retry and backoff constants
pub mod retry {
    /// Total attempts per logical request (first try included)
    pub const MAX_ATTEMPTS: u32 = 3;

    /// Base delay for exponential backoff (milliseconds)
    pub const BASE_DELAY_MS: u64 = 1_000;

    /// Upper bound (exclusive) of random jitter added to each delay (milliseconds)
    pub const MAX_JITTER_MS: u64 = 500;

    /// Backoff exponent is capped here so delays cannot overflow
    pub const MAX_BACKOFF_EXPONENT: u32 = 16;
}

/// Prompt input truncation constants
pub mod truncation {
    /// Characters counted as one token by the budget heuristic
    pub const CHARS_PER_TOKEN: usize = 2;

    /// Default input token budget per request
    pub const DEFAULT_MAX_INPUT_TOKENS: usize = 30_000;
}

/// Response repair constants
pub mod repair {
    /// Maximum characters of raw response kept in parse-failure diagnostics
    pub const EXCERPT_CHARS: usize = 200;
}

/// Bearer token constants
pub mod auth {
    /// Separator between key id and secret in the configured credential
    pub const CREDENTIAL_SEPARATOR: char = '.';

    /// Default token lifetime (seconds)
    pub const TOKEN_TTL_SECS: u64 = 3_600;

    /// Tokens closer than this to expiry are re-signed (seconds)
    pub const REFRESH_MARGIN_SECS: i64 = 30;
}

/// HTTP/Network constants
pub mod network {
    /// Default model endpoint
    pub const DEFAULT_ENDPOINT: &str = "https://open.bigmodel.cn/api/paas/v4/chat/completions";

    /// Default model name
    pub const DEFAULT_MODEL: &str = "glm-4-plus";

    /// Default per-request timeout (seconds)
    pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

    /// Connection timeout (seconds)
    pub const CONNECTION_TIMEOUT_SECS: u64 = 30;

    /// Default completion token limit
    pub const DEFAULT_MAX_TOKENS: u32 = 4_096;
}
