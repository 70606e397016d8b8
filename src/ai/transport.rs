//! Model Transport
//!
//! The gateway talks to the model endpoint only through the [`Transport`]
//! trait, so tests can substitute scripted transports.
//!
//! [`HttpTransport`] posts an OpenAI-style chat completion body with a bearer
//! token and maps every failure onto a [`TransportError`]:
//! - non-2xx answers keep their status and body
//! - connection-level failures carry a [`FailureCause`]
//! - undecodable envelopes become `Decode`

use std::error::Error as StdError;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::constants::{network, repair};
use crate::types::{
    Disposition, ErrorClassifier, FailureCause, GatewayError, GatewayResult, excerpt,
};

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: ResponseMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
}

impl ChatResponse {
    /// Response with a single choice holding `content`
    pub fn with_content(content: impl Into<String>) -> Self {
        Self {
            choices: vec![Choice {
                message: ResponseMessage {
                    content: Some(content.into()),
                },
            }],
            usage: None,
        }
    }

    /// Content of the first choice
    pub fn content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
    }
}

// =============================================================================
// Transport Trait
// =============================================================================

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("{cause}: {message}")]
    Network { cause: FailureCause, message: String },

    #[error("Invalid response envelope: {0}")]
    Decode(String),
}

impl TransportError {
    /// Retry decision for this failure
    pub fn classify(self) -> Disposition {
        match self {
            Self::Status { status, body } => ErrorClassifier::classify_http_status(status, &body),
            Self::Network { cause, message } => ErrorClassifier::classify_network(cause, message),
            Self::Decode(message) => Disposition::Fatal(GatewayError::request_failed(
                FailureCause::InvalidResponse,
                message,
            )),
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one chat completion request authorized with `bearer`
    async fn send(
        &self,
        request: &ChatRequest,
        bearer: &str,
    ) -> Result<ChatResponse, TransportError>;

    fn name(&self) -> &str;
}

// =============================================================================
// HTTP Transport
// =============================================================================

/// reqwest-backed transport with a fixed per-request timeout
#[derive(Debug, Clone)]
pub struct HttpTransport {
    endpoint: Url,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(endpoint: &str, timeout: Duration) -> GatewayResult<Self> {
        let endpoint = Url::parse(endpoint).map_err(|e| {
            GatewayError::not_initialized(format!("Invalid endpoint '{}': {}", endpoint, e))
        })?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(network::CONNECTION_TIMEOUT_SECS).min(timeout))
            .build()
            .map_err(|e| {
                GatewayError::not_initialized(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { endpoint, client })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        request: &ChatRequest,
        bearer: &str,
    ) -> Result<ChatResponse, TransportError> {
        debug!(endpoint = %self.endpoint, model = %request.model, "Sending chat request");

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(bearer)
            .json(request)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        let body = response.text().await.map_err(map_reqwest_error)?;

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            TransportError::Decode(format!("{} (body: {})", e, excerpt(&body, repair::EXCERPT_CHARS)))
        })
    }

    fn name(&self) -> &str {
        "http"
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    let message = error_chain_message(&err);

    let cause = if err.is_timeout() {
        FailureCause::Timeout
    } else if let Some(cause) = network_cause(&err) {
        cause
    } else if err.is_connect() {
        FailureCause::Connect
    } else if err.is_request() || err.is_body() {
        // Connection dropped mid-exchange
        FailureCause::ConnectionReset
    } else if err.is_decode() {
        return TransportError::Decode(message);
    } else {
        FailureCause::InvalidResponse
    };

    TransportError::Network { cause, message }
}

/// Walk the source chain looking for a recognizable network cause
pub fn network_cause(err: &(dyn StdError + 'static)) -> Option<FailureCause> {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);

    while let Some(e) = current {
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            match io_err.kind() {
                io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => {
                    return Some(FailureCause::ConnectionReset);
                }
                io::ErrorKind::TimedOut => return Some(FailureCause::Timeout),
                io::ErrorKind::ConnectionRefused => return Some(FailureCause::Connect),
                _ => {}
            }
        }
        current = e.source();
    }

    ErrorClassifier::cause_from_message(&error_chain_message(err))
}

fn error_chain_message(err: &(dyn StdError + 'static)) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(e) = source {
        parts.push(e.to_string());
        source = e.source();
    }
    parts.join(": ")
}
