//! TrialSift - AI Gateway Client for Clinical-Trial Extraction
//!
//! Turns unstructured clinical-trial text (protocols, visit records,
//! medication logs) into typed records by calling a hosted large-language-model
//! API.
//!
//! ## Core Features
//!
//! - **Sliding-window rate limiting**: process-wide ceiling on API calls
//! - **Retry with backoff**: exponential delay plus jitter for transient failures
//! - **JSON repair**: recovers fenced, chatty or truncated model output
//! - **Typed extraction**: six prompt kinds mapped onto review-flagged records
//!
//! ## Quick Start
//!
//! ```ignore
//! use trialsift::{ConfigLoader, Gateway};
//!
//! let config = ConfigLoader::load()?;
//! let gateway = Gateway::from_config(&config)?;
//! let criteria = gateway.extract_criteria(&protocol_text).await?;
//! ```
//!
//! ## Modules
//!
//! - [`ai`]: authentication, transport, rate limiting, retry, repair
//! - [`extraction`]: request and record types, model output transformation
//! - [`config`]: layered configuration
//! - [`cli`]: command implementations for the `trialsift` binary

pub mod ai;
pub mod cli;
pub mod config;
pub mod constants;
pub mod extraction;
pub mod types;

// Configuration
pub use config::{Config, ConfigLoader};

// Error Types
pub use types::error::{
    ErrorCategory, ErrorInfo, FailureCause, GatewayError, GatewayResult, Result, Severity,
    SiftError,
};

// Gateway
pub use ai::{
    Credential, Gateway, GatewayConfig, HttpTransport, MetricsSummary, PromptKind, RetryPolicy,
    SlidingWindowLimiter, Transport,
};

// Extraction
pub use extraction::{Extraction, ExtractionOutcome, ExtractionRequest, ReviewStatus};
