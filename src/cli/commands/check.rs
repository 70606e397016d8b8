//! Check Command
//!
//! Validate configuration and credentials, optionally with one live request.
//!
//! Usage:
//!   trialsift check [--live]

use tokio::runtime::Runtime;

use crate::ai::{Credential, Gateway};
use crate::cli::ui::Output;
use crate::config::{API_KEY_ENV, ConfigLoader};
use crate::types::Result;

/// Sample record used by `--live`
const LIVE_PROBE_TEXT: &str = "Subject No.: 001-0001\nVisit 1 completed.";

/// Returns whether the gateway is usable
pub fn run(live: bool, out: &Output) -> Result<bool> {
    out.section("Configuration");
    let config = ConfigLoader::load()?;
    out.success("Configuration is valid");
    out.field("Endpoint", &config.api.endpoint);
    out.field("Model", &config.api.model);
    out.field(
        "Rate limit",
        &format!(
            "{} calls / {} ms",
            config.rate_limit.max_requests, config.rate_limit.window_ms
        ),
    );
    out.field(
        "Retries",
        &format!(
            "{} attempts, base {} ms",
            config.retry.max_attempts, config.retry.base_delay_ms
        ),
    );

    out.section("Credential");
    let credential = match config.api.api_key.as_deref().map(Credential::parse) {
        Some(Ok(credential)) => credential,
        Some(Err(err)) => {
            out.error(&err.to_string());
            return Ok(false);
        }
        None => {
            out.error(&format!("No API key configured (set {})", API_KEY_ENV));
            return Ok(false);
        }
    };
    out.success(&format!("API key id: {}", credential.key_id()));

    if !live {
        return Ok(true);
    }

    out.section("Live request");
    let gateway = Gateway::from_config(&config)?;
    let rt = Runtime::new()?;

    match rt.block_on(gateway.extract_subject_number(LIVE_PROBE_TEXT)) {
        Ok(number) => {
            out.success(&format!(
                "Endpoint answered (subject number: {})",
                number.value.as_deref().unwrap_or("none")
            ));
            Ok(true)
        }
        Err(err) => {
            out.error(&err.user_message());
            out.field("Details", &err.to_string());
            Ok(!err.severity().blocks_further_action())
        }
    }
}
