//! Unified Error Type System
//!
//! Centralized error types for the gateway boundary and the application shell.
//!
//! ## Gateway Taxonomy
//!
//! - **NotInitialized**: No usable credential configured (fatal, fix config)
//! - **AuthFailed**: HTTP 401/403 (fatal, never retried)
//! - **BadRequest**: HTTP 400 (caller-side defect, never retried)
//! - **RequestFailed**: Network-class failure after retries, or a non-retryable status
//! - **ParseFailed**: Model output was not valid or repairable JSON
//!
//! Every variant carries a short user-facing message and a technical message,
//! plus a severity that decides whether the consumer blocks or merely warns.

use serde::Serialize;
use thiserror::Error;

use super::utils::excerpt;
use crate::constants::repair as repair_constants;

// =============================================================================
// Error Categories
// =============================================================================

/// Error categories for routing and display decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Missing or malformed configuration
    Config,
    /// Credentials rejected by the endpoint
    Auth,
    /// Request rejected as malformed - a client-side defect
    Domain,
    /// Connectivity or server-side failure
    Network,
    /// Model output could not be turned into structured data
    Parse,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config => write!(f, "CONFIG"),
            Self::Auth => write!(f, "AUTH"),
            Self::Domain => write!(f, "DOMAIN"),
            Self::Network => write!(f, "NETWORK"),
            Self::Parse => write!(f, "PARSE"),
        }
    }
}

/// How loudly a consumer should surface an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Consumer may continue; the individual request failed
    Warning,
    /// Consumer must stop and have the user fix something first
    Critical,
}

impl Severity {
    pub fn blocks_further_action(&self) -> bool {
        matches!(self, Self::Critical)
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Warning => write!(f, "warning"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

// =============================================================================
// Failure Causes
// =============================================================================

/// Specific cause behind a `RequestFailed` error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "status", rename_all = "snake_case")]
pub enum FailureCause {
    /// Peer reset the connection (ECONNRESET)
    ConnectionReset,
    /// Request or connect deadline elapsed (ETIMEDOUT)
    Timeout,
    /// Host name could not be resolved (ENOTFOUND)
    Dns,
    /// Connection could not be established (ECONNREFUSED and similar)
    Connect,
    /// Endpoint answered with a 5xx status
    ServerError(u16),
    /// Endpoint answered with a status outside the retry policy
    HttpStatus(u16),
    /// Response envelope could not be decoded
    InvalidResponse,
}

impl FailureCause {
    /// Network-class causes are retried; everything else fails immediately
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectionReset | Self::Timeout | Self::Dns | Self::Connect | Self::ServerError(_)
        )
    }

    /// Short machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConnectionReset => "ECONNRESET",
            Self::Timeout => "ETIMEDOUT",
            Self::Dns => "ENOTFOUND",
            Self::Connect => "ECONNREFUSED",
            Self::ServerError(_) => "HTTP_5XX",
            Self::HttpStatus(_) => "HTTP_STATUS",
            Self::InvalidResponse => "INVALID_RESPONSE",
        }
    }

    /// User-facing message tailored to the cause
    pub fn user_message(&self) -> String {
        match self {
            Self::ConnectionReset => {
                "The connection to the AI service was reset. Check your network and try again."
                    .to_string()
            }
            Self::Timeout => {
                "The AI service did not respond in time. The document may be too long, or the service is busy."
                    .to_string()
            }
            Self::Dns => {
                "The AI service address could not be resolved. Check your internet connection or DNS settings."
                    .to_string()
            }
            Self::Connect => {
                "Could not connect to the AI service. Check your network or proxy settings.".to_string()
            }
            Self::ServerError(status) => format!(
                "The AI service is temporarily unavailable (HTTP {}). Please try again later.",
                status
            ),
            Self::HttpStatus(status) => {
                format!("The AI service rejected the request (HTTP {}).", status)
            }
            Self::InvalidResponse => {
                "The AI service returned an unexpected response.".to_string()
            }
        }
    }
}

impl std::fmt::Display for FailureCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ServerError(status) | Self::HttpStatus(status) => {
                write!(f, "{} {}", self.code(), status)
            }
            _ => write!(f, "{}", self.code()),
        }
    }
}

// =============================================================================
// Gateway Error
// =============================================================================

/// Boundary error of the AI gateway. Nothing else escapes `Gateway::extract`.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Gateway not initialized: {reason}")]
    NotInitialized { reason: String },

    #[error("Authentication failed (HTTP {status}): {message}")]
    AuthFailed { status: u16, message: String },

    #[error("Bad request (HTTP 400): {message}")]
    BadRequest { message: String },

    #[error("Request failed after {attempts} attempt(s) [{cause}]: {message}")]
    RequestFailed {
        cause: FailureCause,
        attempts: u32,
        message: String,
    },

    #[error("Failed to parse model response: {message} (excerpt: {excerpt})")]
    ParseFailed { message: String, excerpt: String },
}

impl GatewayError {
    pub fn not_initialized(reason: impl Into<String>) -> Self {
        Self::NotInitialized {
            reason: reason.into(),
        }
    }

    pub fn request_failed(cause: FailureCause, message: impl Into<String>) -> Self {
        Self::RequestFailed {
            cause,
            attempts: 1,
            message: message.into(),
        }
    }

    /// Create a parse failure carrying a bounded excerpt of the raw response
    pub fn parse_failed(message: impl Into<String>, raw: &str) -> Self {
        Self::ParseFailed {
            message: message.into(),
            excerpt: excerpt(raw, repair_constants::EXCERPT_CHARS),
        }
    }

    /// Record how many transport attempts led to this error
    pub fn with_attempts(self, attempts: u32) -> Self {
        match self {
            Self::RequestFailed { cause, message, .. } => Self::RequestFailed {
                cause,
                attempts,
                message,
            },
            other => other,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotInitialized { .. } => ErrorCategory::Config,
            Self::AuthFailed { .. } => ErrorCategory::Auth,
            Self::BadRequest { .. } => ErrorCategory::Domain,
            Self::RequestFailed { .. } => ErrorCategory::Network,
            Self::ParseFailed { .. } => ErrorCategory::Parse,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::NotInitialized { .. } | Self::AuthFailed { .. } | Self::BadRequest { .. } => {
                Severity::Critical
            }
            Self::RequestFailed { .. } | Self::ParseFailed { .. } => Severity::Warning,
        }
    }

    /// Stable code for consumers and logs
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotInitialized { .. } => "NOT_INITIALIZED",
            Self::AuthFailed { .. } => "AUTH_FAILED",
            Self::BadRequest { .. } => "BAD_REQUEST",
            Self::RequestFailed { .. } => "REQUEST_FAILED",
            Self::ParseFailed { .. } => "PARSE_FAILED",
        }
    }

    /// Short message suitable for showing to the reviewer
    pub fn user_message(&self) -> String {
        match self {
            Self::NotInitialized { .. } => {
                "No valid AI service key is configured. Add your API key in the settings.".to_string()
            }
            Self::AuthFailed { .. } => {
                "The AI service rejected your API key. Check that it is correct and still active."
                    .to_string()
            }
            Self::BadRequest { .. } => {
                "The request was rejected as invalid. The document may be too large to process."
                    .to_string()
            }
            Self::RequestFailed { cause, .. } => cause.user_message(),
            Self::ParseFailed { .. } => {
                "The AI response could not be understood. Please try the extraction again.".to_string()
            }
        }
    }

    pub fn to_info(&self) -> ErrorInfo {
        ErrorInfo {
            code: self.code().to_string(),
            category: self.category(),
            severity: self.severity(),
            user_message: self.user_message(),
            technical_message: self.to_string(),
        }
    }
}

/// Serializable error description handed to consumers
#[derive(Debug, Clone, Serialize)]
pub struct ErrorInfo {
    pub code: String,
    pub category: ErrorCategory,
    pub severity: Severity,
    pub user_message: String,
    pub technical_message: String,
}

// =============================================================================
// Error Classifier
// =============================================================================

/// Retry decision for a single failed transport attempt
#[derive(Debug, Clone)]
pub enum Disposition {
    /// Transient failure, eligible for another attempt
    Retryable { cause: FailureCause, message: String },
    /// Final failure, surfaced as-is
    Fatal(GatewayError),
}

impl Disposition {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable { .. })
    }

    /// Convert into the error surfaced once no further attempts are made
    pub fn into_error(self, attempts: u32) -> GatewayError {
        match self {
            Self::Retryable { cause, message } => {
                GatewayError::request_failed(cause, message).with_attempts(attempts)
            }
            Self::Fatal(err) => err.with_attempts(attempts),
        }
    }
}

/// Error classifier for retry decisions
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classify an HTTP status returned by the endpoint
    pub fn classify_http_status(status: u16, body: &str) -> Disposition {
        let message = excerpt(body, repair_constants::EXCERPT_CHARS);
        match status {
            401 | 403 => Disposition::Fatal(GatewayError::AuthFailed { status, message }),
            400 => Disposition::Fatal(GatewayError::BadRequest { message }),
            500..=599 => Disposition::Retryable {
                cause: FailureCause::ServerError(status),
                message,
            },
            _ => Disposition::Fatal(GatewayError::request_failed(
                FailureCause::HttpStatus(status),
                message,
            )),
        }
    }

    /// Classify a connection-level failure
    pub fn classify_network(cause: FailureCause, message: impl Into<String>) -> Disposition {
        let message = message.into();
        if cause.is_transient() {
            Disposition::Retryable { cause, message }
        } else {
            Disposition::Fatal(GatewayError::request_failed(cause, message))
        }
    }

    /// Infer a network cause from an error message chain.
    ///
    /// Used when the underlying client does not expose a typed cause.
    pub fn cause_from_message(message: &str) -> Option<FailureCause> {
        let lower = message.to_lowercase();

        if lower.contains("connection reset") || lower.contains("econnreset") {
            return Some(FailureCause::ConnectionReset);
        }

        if lower.contains("timed out") || lower.contains("timeout") || lower.contains("etimedout")
        {
            return Some(FailureCause::Timeout);
        }

        if lower.contains("dns error")
            || lower.contains("failed to lookup address")
            || lower.contains("name or service not known")
            || lower.contains("enotfound")
        {
            return Some(FailureCause::Dns);
        }

        if lower.contains("connection refused")
            || lower.contains("econnrefused")
            || lower.contains("error trying to connect")
            || lower.contains("network is unreachable")
        {
            return Some(FailureCause::Connect);
        }

        None
    }
}

// =============================================================================
// Application Error
// =============================================================================

#[derive(Debug, Error)]
pub enum SiftError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

pub type Result<T> = std::result::Result<T, SiftError>;

/// Result type of every gateway operation
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

// =============================================================================
// Tests
// =============================================================================
