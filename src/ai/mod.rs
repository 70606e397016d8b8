//! AI Integration Layer
//!
//! Gateway to the hosted model API: prompt rendering, authenticated transport,
//! rate limiting, retries, response repair, and usage metrics.

pub mod auth;
pub mod gateway;
pub mod metrics;
pub mod prompt;
pub mod rate_limit;
pub mod retry;
pub mod transport;
pub mod validation;

pub use auth::{Credential, TokenProvider};
pub use gateway::{Gateway, GatewayConfig};
pub use metrics::{GatewayMetrics, MetricsSummary};
pub use prompt::{PromptKind, RenderedPrompt, render_prompt, truncate_to_token_budget};
pub use rate_limit::{RateLimitWindow, SlidingWindowLimiter};
pub use retry::{RetryPolicy, RetryState};
pub use transport::{ChatMessage, ChatRequest, ChatResponse, HttpTransport, Transport, TransportError};
pub use validation::{ProcessedResponse, extract_json_block, parse_model_json, repair_json};
