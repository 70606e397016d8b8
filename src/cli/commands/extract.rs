//! Extract Command
//!
//! Run one extraction kind over one or more plain-text inputs.
//!
//! Usage:
//!   trialsift extract <kind> [FILES...] [--subject S] [--visit V]... [-o out.json]
//!
//! Without files (or with `-`) the text is read from stdin. Several files are
//! extracted concurrently; a failed file is reported and skipped.

use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::runtime::Runtime;
use tracing::debug;

use crate::ai::{Gateway, PromptKind};
use crate::cli::ui::Output;
use crate::config::ConfigLoader;
use crate::extraction::{Extraction, ExtractionOutcome, ExtractionRequest};
use crate::types::{GatewayError, Result, SiftError};

const STDIN_SOURCE: &str = "-";

/// Options of one `extract` invocation
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub kind: PromptKind,
    pub inputs: Vec<PathBuf>,
    pub subject: Option<String>,
    pub visits: Vec<String>,
    pub model: Option<String>,
    pub output: Option<PathBuf>,
    pub concurrency: usize,
}

/// Result for one input, as written to the JSON report
#[derive(Debug, Serialize)]
pub struct SourceOutcome {
    pub source: String,
    #[serde(flatten)]
    pub outcome: ExtractionOutcome<Extraction>,
}

/// Run the extraction; returns whether every input succeeded
pub fn run(options: ExtractOptions, out: &Output) -> Result<bool> {
    let mut config = ConfigLoader::load()?;
    if let Some(model) = &options.model {
        config.api.model = model.clone();
    }

    let gateway = Arc::new(Gateway::from_config(&config)?);
    if !gateway.is_ready() {
        let err = GatewayError::not_initialized("API key is missing or malformed");
        out.error(&err.user_message());
        out.info("Set TRIALSIFT_API_KEY to <key_id>.<secret>");
        return Err(err.into());
    }

    let sources = read_sources(&options.inputs)?;
    let requests: Vec<(String, ExtractionRequest)> = sources
        .into_iter()
        .map(|(source, text)| (source, build_request(&options, text)))
        .collect();

    out.info(&format!(
        "Extracting {} from {} input(s)",
        options.kind,
        requests.len()
    ));

    let rt = Runtime::new()?;
    let results = rt.block_on(extract_all(
        Arc::clone(&gateway),
        requests,
        options.concurrency.max(1),
    ));

    let mut failures = 0;
    for result in &results {
        match &result.outcome {
            ExtractionOutcome::Ok { data } => {
                out.success(&format!("{}: {} record(s)", result.source, data.len()))
            }
            ExtractionOutcome::Error { error } => {
                failures += 1;
                out.warning(&format!("{}: {}", result.source, error.user_message));
            }
        }
    }

    let report = serde_json::to_string_pretty(&results)?;
    match &options.output {
        Some(path) => {
            fs::write(path, report)?;
            out.info(&format!("Wrote {}", path.display()));
        }
        None => println!("{}", report),
    }

    let summary = gateway.metrics();
    debug!("Gateway metrics:\n{}", summary.display());

    if failures > 0 {
        out.warning(&format!(
            "{} of {} input(s) failed",
            failures,
            results.len()
        ));
    }
    Ok(failures == 0)
}

/// Extract every request with bounded concurrency, keeping input order
pub async fn extract_all(
    gateway: Arc<Gateway>,
    requests: Vec<(String, ExtractionRequest)>,
    concurrency: usize,
) -> Vec<SourceOutcome> {
    stream::iter(requests)
        .map(|(source, request)| {
            let gateway = Arc::clone(&gateway);
            async move {
                let outcome = gateway.extract(&request).await.into();
                SourceOutcome { source, outcome }
            }
        })
        .buffered(concurrency)
        .collect()
        .await
}

fn build_request(options: &ExtractOptions, text: String) -> ExtractionRequest {
    let mut request = ExtractionRequest::new(options.kind, text);
    if let Some(subject) = &options.subject {
        request = request.with_param("subject", subject.clone());
    }
    if !options.visits.is_empty() {
        request = request.with_param("visits", options.visits.join(", "));
    }
    request
}

fn read_sources(inputs: &[PathBuf]) -> Result<Vec<(String, String)>> {
    if inputs.is_empty() {
        return Ok(vec![(STDIN_SOURCE.to_string(), read_stdin()?)]);
    }

    inputs
        .iter()
        .map(|path| {
            if path.as_os_str() == STDIN_SOURCE {
                return Ok((STDIN_SOURCE.to_string(), read_stdin()?));
            }
            let text = fs::read_to_string(path).map_err(|e| {
                SiftError::Config(format!("Cannot read {}: {}", path.display(), e))
            })?;
            Ok((path.display().to_string(), text))
        })
        .collect()
}

fn read_stdin() -> Result<String> {
    let mut text = String::new();
    io::stdin().read_to_string(&mut text)?;
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::transport::{ChatRequest, ChatResponse, Transport, TransportError};
    use crate::ai::GatewayConfig;
    use async_trait::async_trait;
    use tempfile::TempDir;

    /// Answers by document: "broken" fails with 400, anything else succeeds
    struct ByContent;

    #[async_trait]
    impl Transport for ByContent {
        async fn send(
            &self,
            request: &ChatRequest,
            _bearer: &str,
        ) -> std::result::Result<ChatResponse, TransportError> {
            if request.messages[1].content.contains("broken") {
                return Err(TransportError::Status {
                    status: 400,
                    body: "bad".to_string(),
                });
            }
            Ok(ChatResponse::with_content(r#"{"subject_number": "01-003"}"#))
        }

        fn name(&self) -> &str {
            "by-content"
        }
    }

    #[tokio::test]
    async fn test_failed_input_is_skipped_and_order_kept() {
        let gateway = Arc::new(Gateway::new(
            GatewayConfig {
                api_key: Some("key.secret".to_string()),
                ..GatewayConfig::default()
            },
            Arc::new(ByContent),
        ));

        let requests = ["a.txt", "broken.txt", "c.txt"]
            .iter()
            .map(|name| {
                let text = name.trim_end_matches(".txt").to_string();
                (
                    name.to_string(),
                    ExtractionRequest::new(PromptKind::SubjectNumber, text),
                )
            })
            .collect();

        let results = extract_all(gateway, requests, 2).await;
        let sources: Vec<&str> = results.iter().map(|r| r.source.as_str()).collect();
        assert_eq!(sources, vec!["a.txt", "broken.txt", "c.txt"]);

        assert!(matches!(results[0].outcome, ExtractionOutcome::Ok { .. }));
        assert!(matches!(results[1].outcome, ExtractionOutcome::Error { .. }));
        assert!(matches!(results[2].outcome, ExtractionOutcome::Ok { .. }));

        let json = serde_json::to_value(&results).unwrap();
        assert_eq!(json[1]["status"], "error");
        assert_eq!(json[1]["error"]["code"], "BAD_REQUEST");
        assert_eq!(json[0]["data"]["kind"], "subject_number");
    }

    #[test]
    fn test_build_request_params() {
        let options = ExtractOptions {
            kind: PromptKind::SubjectVisitItems,
            inputs: Vec::new(),
            subject: Some("01-003".to_string()),
            visits: vec!["V1".to_string(), "V2".to_string()],
            model: None,
            output: None,
            concurrency: 4,
        };
        let request = build_request(&options, "text".to_string());
        assert_eq!(request.params["subject"], "01-003");
        assert_eq!(request.params["visits"], "V1, V2");
    }

    #[test]
    fn test_read_sources_from_files() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("record.txt");
        fs::write(&path, "Subject 01-003").unwrap();

        let sources = read_sources(std::slice::from_ref(&path)).unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].1, "Subject 01-003");

        let missing = temp_dir.path().join("missing.txt");
        assert!(read_sources(&[missing]).is_err());
    }
}
