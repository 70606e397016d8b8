//! AI Gateway Client
//!
//! Turns an [`ExtractionRequest`] into typed records, hiding transient
//! network and model flakiness from the caller.
//!
//! ## Flow
//!
//! 1. Refuse early with `NotInitialized` when no valid credential exists
//! 2. Render the prompt (fixed substitution, truncated to the token budget)
//! 3. For each attempt: wait for the rate limiter, sign a bearer token, send
//! 4. Classify failures; retry transient ones with exponential backoff
//! 5. Parse the content, repairing truncated JSON when needed
//! 6. Transform into the kind-specific typed shape
//!
//! The gateway holds no globals. Share it as `Arc<Gateway>`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{Instrument, debug, info, info_span, warn};

use super::auth::{Credential, TokenProvider};
use super::metrics::{GatewayMetrics, MetricsSummary};
use super::prompt::{PromptKind, render_prompt};
use super::rate_limit::SlidingWindowLimiter;
use super::retry::RetryPolicy;
use super::transport::{ChatMessage, ChatRequest, HttpTransport, Transport};
use super::validation::ProcessedResponse;
use crate::config::{Config, RateLimitConfig};
use crate::constants::{auth, network, truncation};
use crate::extraction::{
    Criterion, Extraction, ExtractionRequest, Medication, SubjectNumber, SubjectVisitDate,
    SubjectVisitItem, Visit, transform,
};
use crate::types::{Disposition, FailureCause, GatewayError, GatewayResult, RequestId};

// =============================================================================
// Configuration
// =============================================================================

/// Runtime settings of one gateway
#[derive(Clone)]
pub struct GatewayConfig {
    /// Credential `<key_id>.<secret>`
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub token_ttl: Duration,
    pub max_input_tokens: usize,
    pub rate_limit: RateLimitConfig,
    pub retry: RetryPolicy,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: network::DEFAULT_MODEL.to_string(),
            temperature: 0.1,
            top_p: 0.7,
            max_tokens: network::DEFAULT_MAX_TOKENS,
            token_ttl: Duration::from_secs(auth::TOKEN_TTL_SECS),
            max_input_tokens: truncation::DEFAULT_MAX_INPUT_TOKENS,
            rate_limit: RateLimitConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl From<&Config> for GatewayConfig {
    fn from(config: &Config) -> Self {
        Self {
            api_key: config.api.api_key.clone(),
            model: config.api.model.clone(),
            temperature: config.api.temperature,
            top_p: config.api.top_p,
            max_tokens: config.api.max_tokens,
            token_ttl: Duration::from_secs(config.api.token_ttl_secs),
            max_input_tokens: config.extraction.max_input_tokens,
            rate_limit: config.rate_limit.clone(),
            retry: RetryPolicy::from_config(&config.retry),
        }
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("top_p", &self.top_p)
            .field("max_tokens", &self.max_tokens)
            .field("token_ttl", &self.token_ttl)
            .field("max_input_tokens", &self.max_input_tokens)
            .field("rate_limit", &self.rate_limit)
            .field("retry", &self.retry)
            .finish()
    }
}

// =============================================================================
// Gateway
// =============================================================================

pub struct Gateway {
    config: GatewayConfig,
    /// Token source, or the reason no credential is usable
    tokens: Result<TokenProvider, GatewayError>,
    transport: Arc<dyn Transport>,
    limiter: SlidingWindowLimiter,
    metrics: GatewayMetrics,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("config", &self.config)
            .field("transport", &self.transport.name())
            .field("ready", &self.is_ready())
            .finish()
    }
}

impl Gateway {
    /// Create a gateway over `transport`.
    ///
    /// An invalid credential does not fail construction; every extraction then
    /// reports `NotInitialized` without touching the network.
    pub fn new(config: GatewayConfig, transport: Arc<dyn Transport>) -> Self {
        let tokens = match config.api_key.as_deref() {
            Some(raw) => Credential::parse(raw),
            None => Err(GatewayError::not_initialized("API key is not configured")),
        }
        .map(|credential| TokenProvider::new(credential, config.token_ttl));

        match &tokens {
            Ok(provider) => info!(
                key_id = provider.credential().key_id(),
                model = %config.model,
                transport = transport.name(),
                "Gateway initialized"
            ),
            Err(err) => warn!("Gateway has no usable credential: {}", err),
        }

        Self {
            limiter: SlidingWindowLimiter::from_config(&config.rate_limit),
            config,
            tokens,
            transport,
            metrics: GatewayMetrics::new(),
        }
    }

    /// Build a gateway with the HTTP transport described by `config`
    pub fn from_config(config: &Config) -> GatewayResult<Self> {
        let transport = HttpTransport::new(
            &config.api.endpoint,
            Duration::from_secs(config.api.timeout_secs),
        )?;
        Ok(Self::new(GatewayConfig::from(config), Arc::new(transport)))
    }

    /// Whether a valid credential is configured
    pub fn is_ready(&self) -> bool {
        self.tokens.is_ok()
    }

    /// Forget all recorded call timestamps
    pub async fn reset_rate_limit(&self) {
        self.limiter.reset().await;
    }

    pub fn metrics(&self) -> MetricsSummary {
        self.metrics.summary()
    }

    /// Run one extraction end to end
    pub async fn extract(&self, request: &ExtractionRequest) -> GatewayResult<Extraction> {
        let request_id = RequestId::generate();
        let span = info_span!(
            "extract",
            request_id = %request_id,
            kind = %request.prompt_kind,
            input_chars = request.raw_text.chars().count()
        );

        async {
            self.metrics.record_request();
            let started = Instant::now();

            let result = self.run_extraction(request).await;
            match &result {
                Ok(extraction) => info!(
                    records = extraction.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Extraction complete"
                ),
                Err(err) => {
                    self.metrics.record_failure();
                    warn!(
                        code = err.code(),
                        category = %err.category(),
                        severity = %err.severity(),
                        "Extraction failed: {}",
                        err
                    );
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run_extraction(&self, request: &ExtractionRequest) -> GatewayResult<Extraction> {
        let tokens = self.tokens.as_ref().map_err(Clone::clone)?;

        let prompt = render_prompt(
            request.prompt_kind,
            &request.raw_text,
            &request.params,
            self.config.max_input_tokens,
        );
        if prompt.truncated {
            debug!(max_input_tokens = self.config.max_input_tokens, "Prompt input truncated");
        }

        let chat = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage::system(prompt.system), ChatMessage::user(prompt.user)],
            temperature: self.config.temperature,
            top_p: self.config.top_p,
            max_tokens: self.config.max_tokens,
        };

        let content = self
            .config
            .retry
            .run(|attempt| self.attempt(tokens, &chat, attempt))
            .await?;

        let processed = ProcessedResponse::from_raw(&content)?;
        if processed.was_repaired {
            self.metrics.record_repair();
        }

        transform(request.prompt_kind, &processed.value)
    }

    /// One rate-limited transport call
    async fn attempt(
        &self,
        tokens: &TokenProvider,
        chat: &ChatRequest,
        attempt: u32,
    ) -> Result<String, Disposition> {
        let waited = self.limiter.acquire().await;
        self.metrics.record_rate_limit_wait(waited);

        let bearer = tokens.bearer().map_err(Disposition::Fatal)?;

        self.metrics.record_attempt(attempt);
        let started = Instant::now();
        debug!(attempt = attempt + 1, "Sending request");

        let response = self.transport.send(chat, &bearer).await.map_err(|err| {
            debug!(attempt = attempt + 1, error = %err, "Transport call failed");
            err.classify()
        })?;

        self.metrics.record_response(response.usage, started.elapsed());

        response.content().map(str::to_owned).ok_or_else(|| {
            Disposition::Fatal(GatewayError::request_failed(
                FailureCause::InvalidResponse,
                "Response contained no message content",
            ))
        })
    }

    // =========================================================================
    // Typed Conveniences
    // =========================================================================

    /// Inclusion and exclusion criteria from protocol text
    pub async fn extract_criteria(&self, protocol_text: &str) -> GatewayResult<Vec<Criterion>> {
        let request = ExtractionRequest::new(PromptKind::Criteria, protocol_text);
        match self.extract(&request).await? {
            Extraction::Criteria(items) => Ok(items),
            other => Err(kind_mismatch(PromptKind::Criteria, &other)),
        }
    }

    /// Visit schedule from protocol text
    pub async fn extract_visit_schedule(&self, protocol_text: &str) -> GatewayResult<Vec<Visit>> {
        let request = ExtractionRequest::new(PromptKind::VisitSchedule, protocol_text);
        match self.extract(&request).await? {
            Extraction::VisitSchedule(items) => Ok(items),
            other => Err(kind_mismatch(PromptKind::VisitSchedule, &other)),
        }
    }

    /// Medications recorded for a subject
    pub async fn extract_medications(
        &self,
        record_text: &str,
        subject: Option<&str>,
    ) -> GatewayResult<Vec<Medication>> {
        let request = subject_request(PromptKind::Medications, record_text, subject, &[]);
        match self.extract(&request).await? {
            Extraction::Medications(items) => Ok(items),
            other => Err(kind_mismatch(PromptKind::Medications, &other)),
        }
    }

    /// Subject number written in a medical record
    pub async fn extract_subject_number(&self, record_text: &str) -> GatewayResult<SubjectNumber> {
        let request = ExtractionRequest::new(PromptKind::SubjectNumber, record_text);
        match self.extract(&request).await? {
            Extraction::SubjectNumber(number) => Ok(number),
            other => Err(kind_mismatch(PromptKind::SubjectNumber, &other)),
        }
    }

    /// Date of each expected visit for a subject
    pub async fn extract_subject_visit_dates(
        &self,
        record_text: &str,
        subject: Option<&str>,
        visits: &[String],
    ) -> GatewayResult<Vec<SubjectVisitDate>> {
        let request = subject_request(PromptKind::SubjectVisitDates, record_text, subject, visits);
        match self.extract(&request).await? {
            Extraction::SubjectVisitDates(items) => Ok(items),
            other => Err(kind_mismatch(PromptKind::SubjectVisitDates, &other)),
        }
    }

    /// Items performed at each expected visit for a subject
    pub async fn extract_subject_visit_items(
        &self,
        record_text: &str,
        subject: Option<&str>,
        visits: &[String],
    ) -> GatewayResult<Vec<SubjectVisitItem>> {
        let request = subject_request(PromptKind::SubjectVisitItems, record_text, subject, visits);
        match self.extract(&request).await? {
            Extraction::SubjectVisitItems(items) => Ok(items),
            other => Err(kind_mismatch(PromptKind::SubjectVisitItems, &other)),
        }
    }
}

fn subject_request(
    kind: PromptKind,
    text: &str,
    subject: Option<&str>,
    visits: &[String],
) -> ExtractionRequest {
    let mut request = ExtractionRequest::new(kind, text);
    if let Some(subject) = subject {
        request = request.with_param("subject", subject);
    }
    if !visits.is_empty() {
        request = request.with_param("visits", visits.join(", "));
    }
    request
}

fn kind_mismatch(expected: PromptKind, got: &Extraction) -> GatewayError {
    GatewayError::parse_failed(
        format!("Expected {} records, got {}", expected, got.kind()),
        "",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::transport::{ChatResponse, TransportError, Usage};
    use crate::extraction::ReviewStatus;
    use crate::types::Severity;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant as TokioInstant;

    type Scripted = Result<ChatResponse, TransportError>;

    /// Replays scripted results; the last one repeats once the script runs out
    struct MockTransport {
        script: Mutex<VecDeque<Scripted>>,
        fallback: Scripted,
        calls: AtomicU32,
        call_times: Mutex<Vec<TokioInstant>>,
        last_request: Mutex<Option<ChatRequest>>,
        last_bearer: Mutex<Option<String>>,
    }

    impl MockTransport {
        fn new(script: Vec<Scripted>) -> Arc<Self> {
            let fallback = script
                .last()
                .cloned()
                .unwrap_or_else(|| Ok(ChatResponse::with_content("{}")));
            Arc::new(Self {
                script: Mutex::new(script.into()),
                fallback,
                calls: AtomicU32::new(0),
                call_times: Mutex::new(Vec::new()),
                last_request: Mutex::new(None),
                last_bearer: Mutex::new(None),
            })
        }

        fn replying(content: &str) -> Arc<Self> {
            Self::new(vec![Ok(ChatResponse::with_content(content))])
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(
            &self,
            request: &ChatRequest,
            bearer: &str,
        ) -> Result<ChatResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.call_times.lock().unwrap().push(TokioInstant::now());
            *self.last_request.lock().unwrap() = Some(request.clone());
            *self.last_bearer.lock().unwrap() = Some(bearer.to_string());

            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or_else(|| self.fallback.clone())
        }

        fn name(&self) -> &str {
            "mock"
        }
    }

    fn reset() -> Scripted {
        Err(TransportError::Network {
            cause: FailureCause::ConnectionReset,
            message: "read ECONNRESET".to_string(),
        })
    }

    fn status(code: u16) -> Scripted {
        Err(TransportError::Status {
            status: code,
            body: "rejected".to_string(),
        })
    }

    fn config() -> GatewayConfig {
        GatewayConfig {
            api_key: Some("key.secret".to_string()),
            ..GatewayConfig::default()
        }
    }

    fn gateway(transport: &Arc<MockTransport>) -> Gateway {
        Gateway::new(config(), Arc::clone(transport) as Arc<dyn Transport>)
    }

    const MEDS: &str = r#"{"medications": [{"name": "Metformin", "dose": "500", "unit": "mg", "start_date": "2023-01-15"}]}"#;

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_then_success() {
        let transport = MockTransport::new(vec![
            reset(),
            reset(),
            Ok(ChatResponse::with_content(MEDS)),
        ]);
        let gateway = gateway(&transport);

        let meds = gateway
            .extract_medications("Metformin 500 mg since 2023-01-15", Some("01-003"))
            .await
            .unwrap();

        assert_eq!(transport.calls(), 3);
        assert_eq!(meds.len(), 1);
        assert_eq!(meds[0].name, "Metformin");
        assert_eq!(meds[0].review, ReviewStatus::AiPending);

        let summary = gateway.metrics();
        assert_eq!(summary.attempts, 3);
        assert_eq!(summary.retries, 2);
        assert_eq!(summary.failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_between_attempts() {
        let transport = MockTransport::new(vec![reset()]);
        let gateway = gateway(&transport);

        let err = gateway
            .extract(&ExtractionRequest::new(PromptKind::Criteria, "protocol"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            GatewayError::RequestFailed {
                cause: FailureCause::ConnectionReset,
                attempts: 3,
                ..
            }
        ));
        assert_eq!(err.severity(), Severity::Warning);

        let times = transport.call_times.lock().unwrap();
        assert_eq!(times.len(), 3);
        for k in 0..2 {
            let gap = times[k + 1].duration_since(times[k]);
            assert!(gap >= Duration::from_millis(1000 << k), "gap {k}: {gap:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unauthorized_is_not_retried() {
        let transport = MockTransport::new(vec![status(401)]);
        let gateway = gateway(&transport);

        let err = gateway.extract_subject_number("record").await.unwrap_err();
        assert!(matches!(err, GatewayError::AuthFailed { status: 401, .. }));
        assert_eq!(err.severity(), Severity::Critical);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bad_request_is_not_retried() {
        let transport = MockTransport::new(vec![status(400)]);
        let gateway = gateway(&transport);

        let err = gateway.extract_visit_schedule("protocol").await.unwrap_err();
        assert!(matches!(err, GatewayError::BadRequest { .. }));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_errors_are_retried() {
        let transport = MockTransport::new(vec![
            status(503),
            Ok(ChatResponse::with_content(r#"{"subject_number": "S-17"}"#)),
        ]);
        let gateway = gateway(&transport);

        let number = gateway.extract_subject_number("record").await.unwrap();
        assert_eq!(number.value.as_deref(), Some("S-17"));
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_separator_never_calls_transport() {
        let transport = MockTransport::replying("{}");
        let gateway = Gateway::new(
            GatewayConfig {
                api_key: Some("nodotinthiskey".to_string()),
                ..GatewayConfig::default()
            },
            Arc::clone(&transport) as Arc<dyn Transport>,
        );

        assert!(!gateway.is_ready());
        let err = gateway.extract_criteria("protocol").await.unwrap_err();
        assert!(matches!(err, GatewayError::NotInitialized { .. }));
        assert_eq!(transport.calls(), 0);
        assert_eq!(gateway.metrics().failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_key_is_not_initialized() {
        let transport = MockTransport::replying("{}");
        let gateway = Gateway::new(
            GatewayConfig::default(),
            Arc::clone(&transport) as Arc<dyn Transport>,
        );

        let err = gateway.extract_subject_number("record").await.unwrap_err();
        assert_eq!(err.code(), "NOT_INITIALIZED");
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_truncated_response_is_repaired() {
        let transport = MockTransport::replying(
            "```json\n{\"visits\": [{\"name\": \"Screening\", \"day\": \"-28\"}, {\"name\": \"Day 1\", \"proc",
        );
        let gateway = gateway(&transport);

        let visits = gateway.extract_visit_schedule("protocol").await.unwrap();
        assert_eq!(visits.len(), 2);
        assert_eq!(visits[1].name, "Day 1");
        assert_eq!(gateway.metrics().repaired_responses, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unparseable_response_is_parse_failure() {
        let transport = MockTransport::replying("I could not find any criteria.");
        let gateway = gateway(&transport);

        let err = gateway.extract_criteria("protocol").await.unwrap_err();
        assert!(matches!(err, GatewayError::ParseFailed { .. }));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_choices_is_request_failure() {
        let transport = MockTransport::new(vec![Ok(ChatResponse::default())]);
        let gateway = gateway(&transport);

        let err = gateway.extract_criteria("protocol").await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::RequestFailed {
                cause: FailureCause::InvalidResponse,
                ..
            }
        ));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_carries_prompt_and_bearer() {
        let transport = MockTransport::replying(r#"{"visit_dates": []}"#);
        let gateway = gateway(&transport);

        gateway
            .extract_subject_visit_dates(
                "Visit 2 performed",
                Some("01-003"),
                &["V1".to_string(), "V2".to_string()],
            )
            .await
            .unwrap();

        let request = transport.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(request.model, network::DEFAULT_MODEL);
        assert_eq!(request.messages.len(), 2);
        assert!(request.messages[1].content.contains("01-003"));
        assert!(request.messages[1].content.contains("V1, V2"));

        let bearer = transport.last_bearer.lock().unwrap().clone().unwrap();
        assert_eq!(bearer.split('.').count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_applies_across_requests() {
        let transport = MockTransport::replying(r#"{"subject_number": "1"}"#);
        let gateway = Gateway::new(
            GatewayConfig {
                rate_limit: RateLimitConfig {
                    max_requests: 2,
                    window_ms: 10_000,
                },
                ..config()
            },
            Arc::clone(&transport) as Arc<dyn Transport>,
        );

        let started = TokioInstant::now();
        for _ in 0..3 {
            gateway.extract_subject_number("record").await.unwrap();
        }

        assert!(started.elapsed() >= Duration::from_secs(10));
        let summary = gateway.metrics();
        assert_eq!(summary.rate_limit_waits, 1);

        gateway.reset_rate_limit().await;
        let before = TokioInstant::now();
        gateway.extract_subject_number("record").await.unwrap();
        gateway.extract_subject_number("record").await.unwrap();
        assert_eq!(before.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_usage_is_recorded() {
        let mut response = ChatResponse::with_content(r#"{"subject_number": null}"#);
        response.usage = Some(Usage {
            prompt_tokens: 120,
            completion_tokens: 8,
        });
        let transport = MockTransport::new(vec![Ok(response)]);
        let gateway = gateway(&transport);

        gateway.extract_subject_number("record").await.unwrap();
        let summary = gateway.metrics();
        assert_eq!(summary.input_tokens, 120);
        assert_eq!(summary.output_tokens, 8);
    }

    #[test]
    fn test_config_debug_redacts_key() {
        let debug = format!("{:?}", config());
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn test_gateway_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Gateway>();
    }
}
