//! Provider interaction: the extraction capability and the retrying adapter.
//!
//! [`ExtractionProvider`] is the only seam with network I/O. The production
//! implementation, [`EdgequakeProvider`], wraps an `edgequake-llm` provider;
//! tests plug in scripted fakes. All prompt text lives in [`crate::prompts`].
//!
//! ## Retry Strategy
//!
//! Transport errors (timeouts, 5xx, 429) are retried up to `max_retries`
//! times with a fixed `retry_delay_ms` between attempts. A rejected request
//! (400, 413, 422) is not retried and the chunk is skipped. Refused
//! credentials (401, 403, invalid key) stop the whole run.

use crate::config::HarvestConfig;
use crate::error::{ChunkError, HarvestError, ProviderError};
use crate::model::ExtractionRecord;
use crate::pipeline::salvage;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, warn};

/// One extraction request: instruction, chunk text and optional attachments.
#[derive(Clone)]
pub struct ProviderRequest {
    pub instruction: String,
    pub message: String,
    /// A PDF slice or page renders. Empty for text-only requests.
    pub attachments: Vec<ImageData>,
}

impl fmt::Debug for ProviderRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRequest")
            .field("instruction", &self.instruction.len())
            .field("message", &self.message.len())
            .field("attachments", &self.attachments.len())
            .finish()
    }
}

/// External AI capability: prompt (plus optional payload) in, raw text out.
#[async_trait]
pub trait ExtractionProvider: Send + Sync {
    async fn invoke(&self, request: &ProviderRequest) -> Result<String, ProviderError>;

    /// Name used in logs.
    fn name(&self) -> &str {
        "provider"
    }
}

// ── edgequake-llm adapter ────────────────────────────────────────────────

/// [`ExtractionProvider`] backed by an `edgequake-llm` provider.
pub struct EdgequakeProvider {
    inner: Arc<dyn LLMProvider>,
    name: String,
    options: CompletionOptions,
    timeout: Duration,
}

impl EdgequakeProvider {
    pub fn new(inner: Arc<dyn LLMProvider>, name: impl Into<String>, config: &HarvestConfig) -> Self {
        Self {
            inner,
            name: name.into(),
            options: build_options(config),
            timeout: config.api_timeout(),
        }
    }

    /// Create the named provider through `ProviderFactory`, which reads the
    /// provider's API key from the environment.
    pub fn from_name(
        name: &str,
        model: Option<&str>,
        config: &HarvestConfig,
    ) -> Result<Self, HarvestError> {
        let model = model.unwrap_or_else(|| default_model(name));
        let inner = ProviderFactory::create_llm_provider(name, model).map_err(|e| {
            HarvestError::ProviderNotConfigured {
                provider: name.to_string(),
                hint: format!("{e}"),
            }
        })?;
        Ok(Self::new(inner, format!("{name}/{model}"), config))
    }

    /// Auto-detect a provider from the environment.
    pub fn from_env(config: &HarvestConfig) -> Result<Self, HarvestError> {
        let (inner, _embedding) =
            ProviderFactory::from_env().map_err(|e| HarvestError::ProviderNotConfigured {
                provider: "auto".to_string(),
                hint: format!(
                    "No LLM provider could be auto-detected from environment.\n\
                    Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or add a [[providers]] entry.\n\
                    Error: {e}"
                ),
            })?;
        Ok(Self::new(inner, "auto", config))
    }
}

/// Model used when a provider entry names none.
pub fn default_model(provider: &str) -> &'static str {
    match provider.to_ascii_lowercase().as_str() {
        "anthropic" => "claude-sonnet-4-20250514",
        "gemini" | "google" => "gemini-2.5-flash",
        "mistral" => "mistral-medium-latest",
        _ => "gpt-4.1-mini",
    }
}

fn build_options(config: &HarvestConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

#[async_trait]
impl ExtractionProvider for EdgequakeProvider {
    async fn invoke(&self, request: &ProviderRequest) -> Result<String, ProviderError> {
        let messages = vec![
            ChatMessage::system(request.instruction.as_str()),
            ChatMessage::user_with_images(request.message.as_str(), request.attachments.clone()),
        ];

        let started = Instant::now();
        match tokio::time::timeout(self.timeout, self.inner.chat(&messages, Some(&self.options)))
            .await
        {
            Err(_) => Err(ProviderError::Transport(format!(
                "no response within {}s",
                self.timeout.as_secs()
            ))),
            Ok(Err(e)) => Err(classify(&e.to_string())),
            Ok(Ok(response)) => {
                debug!(
                    "{}: {} input tokens, {} output tokens, {:?}",
                    self.name,
                    response.prompt_tokens,
                    response.completion_tokens,
                    started.elapsed()
                );
                Ok(response.content)
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// Status codes only count next to "HTTP" or "status", never as bare numbers.
static RE_UNAUTHORIZED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:HTTP|status(?:[ _]?code)?)\D{0,3}(?:401|403)\b|unauthori[sz]ed|forbidden|invalid[ _-]?api[ _-]?key|authentication|permission denied",
    )
    .unwrap()
});

static RE_REJECTED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:HTTP|status(?:[ _]?code)?)\D{0,3}(?:400|413|422)\b|bad request|payload too large|unprocessable entity",
    )
    .unwrap()
});

/// Classify a provider error message. Anything not clearly a refusal is transient.
pub fn classify(message: &str) -> ProviderError {
    if RE_UNAUTHORIZED.is_match(message) {
        ProviderError::Unauthorized(message.to_string())
    } else if RE_REJECTED.is_match(message) {
        ProviderError::Rejected(message.to_string())
    } else {
        ProviderError::Transport(message.to_string())
    }
}

// ── Retrying adapter ─────────────────────────────────────────────────────

/// Result of extracting one chunk. Never an `Err`: failures are data.
#[derive(Debug, Clone)]
pub struct ChunkOutcome {
    /// Empty on any failure.
    pub record: ExtractionRecord,
    pub error: Option<ChunkError>,
    /// Provider calls made for this chunk (≥ 1).
    pub attempts: u32,
    pub salvaged: bool,
}

/// Send one chunk to the provider and parse the answer.
///
/// Chunk-level failures come back inside the `ChunkOutcome` so a single bad
/// chunk doesn't abort the document; callers check `outcome.error`. The only
/// `Err` is refused credentials ([`HarvestError::ProviderNotConfigured`]),
/// which no later chunk or file would get past either.
pub async fn extract_chunk(
    provider: &dyn ExtractionProvider,
    chunk_index: usize,
    request: &ProviderRequest,
    config: &HarvestConfig,
) -> Result<ChunkOutcome, HarvestError> {
    let mut last_err = String::from("unknown error");
    let mut attempts = 0;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            warn!(
                "Chunk {}: retry {}/{} after {}ms",
                chunk_index, attempt, config.max_retries, config.retry_delay_ms
            );
            sleep(config.retry_delay()).await;
        }
        attempts = attempt + 1;

        match provider.invoke(request).await {
            Ok(raw) => return Ok(parse_outcome(chunk_index, &raw, attempts)),
            Err(ProviderError::Unauthorized(msg)) => {
                return Err(HarvestError::ProviderNotConfigured {
                    provider: provider.name().to_string(),
                    hint: format!("The provider refused the credentials: {msg}\nCheck the API key and model access."),
                });
            }
            Err(ProviderError::Rejected(msg)) => {
                warn!("Chunk {}: {} rejected the request: {}", chunk_index, provider.name(), msg);
                return Ok(failed_outcome(
                    ChunkError::Rejected {
                        chunk: chunk_index,
                        detail: msg,
                    },
                    attempts,
                ));
            }
            Err(ProviderError::Transport(msg)) => {
                warn!("Chunk {}: attempt {} failed: {}", chunk_index, attempts, msg);
                last_err = msg;
            }
        }
    }

    Ok(failed_outcome(
        ChunkError::TransportFailure {
            chunk: chunk_index,
            attempts,
            detail: last_err,
        },
        attempts,
    ))
}

fn failed_outcome(error: ChunkError, attempts: u32) -> ChunkOutcome {
    ChunkOutcome {
        record: ExtractionRecord::empty(),
        error: Some(error),
        attempts,
        salvaged: false,
    }
}

fn parse_outcome(chunk_index: usize, raw: &str, attempts: u32) -> ChunkOutcome {
    match salvage::parse_response(raw) {
        Ok(parsed) => {
            if parsed.salvaged {
                debug!(
                    "Chunk {}: response salvaged ({} malformed entries dropped)",
                    chunk_index, parsed.dropped
                );
            }
            ChunkOutcome {
                record: parsed.record,
                error: None,
                attempts,
                salvaged: parsed.salvaged,
            }
        }
        Err(detail) => {
            warn!("Chunk {}: unparseable response: {}", chunk_index, detail);
            failed_outcome(
                ChunkError::ParseFailure {
                    chunk: chunk_index,
                    detail,
                },
                attempts,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct Scripted {
        replies: Mutex<VecDeque<Result<String, ProviderError>>>,
        calls: Mutex<u32>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<String, ProviderError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl ExtractionProvider for Scripted {
        async fn invoke(&self, _request: &ProviderRequest) -> Result<String, ProviderError> {
            *self.calls.lock().unwrap() += 1;
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ProviderError::Transport("script exhausted".into())))
        }
    }

    fn request() -> ProviderRequest {
        ProviderRequest {
            instruction: "extract".into(),
            message: "--- page 1 ---\nOwsianka".into(),
            attachments: Vec::new(),
        }
    }

    fn fast_config(retries: u32) -> HarvestConfig {
        HarvestConfig::builder()
            .max_retries(retries)
            .retry_delay_ms(0)
            .build()
            .unwrap()
    }

    #[test]
    fn build_options_defaults() {
        let opts = build_options(&HarvestConfig::default());
        assert_eq!(opts.temperature, Some(0.1));
        assert_eq!(opts.max_tokens, Some(8192));
    }

    #[test]
    fn classification() {
        assert!(matches!(classify("HTTP 401 Unauthorized"), ProviderError::Unauthorized(_)));
        assert!(matches!(classify("status: 403"), ProviderError::Unauthorized(_)));
        assert!(matches!(classify("invalid_api_key"), ProviderError::Unauthorized(_)));
        assert!(matches!(classify("HTTP 400 Bad Request"), ProviderError::Rejected(_)));
        assert!(matches!(classify("status code 413"), ProviderError::Rejected(_)));
        assert!(matches!(classify("HTTP 503 Service Unavailable"), ProviderError::Transport(_)));
        assert!(matches!(classify("429 rate limit exceeded"), ProviderError::Transport(_)));
        assert!(matches!(classify("context of 4000 tokens"), ProviderError::Transport(_)));
    }

    #[test]
    fn bare_numbers_are_not_status_codes() {
        assert!(matches!(
            classify("connection reset after 400 ms"),
            ProviderError::Transport(_)
        ));
        assert!(matches!(
            classify("read 401 bytes before EOF"),
            ProviderError::Transport(_)
        ));
        assert!(matches!(classify("timed out after 403s"), ProviderError::Transport(_)));
    }

    #[tokio::test]
    async fn transient_error_then_success() {
        let p = Scripted::new(vec![
            Err(ProviderError::Transport("503".into())),
            Ok(r#"{"recipes":[{"name":"Owsianka"}]}"#.into()),
        ]);
        let out = extract_chunk(&p, 0, &request(), &fast_config(3)).await.unwrap();
        assert!(out.error.is_none());
        assert_eq!(out.attempts, 2);
        assert_eq!(out.record.recipes.len(), 1);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let p = Scripted::new(vec![]);
        let out = extract_chunk(&p, 4, &request(), &fast_config(2)).await.unwrap();
        assert_eq!(p.calls(), 3);
        assert!(out.record.is_empty());
        assert_eq!(
            out.error,
            Some(ChunkError::TransportFailure {
                chunk: 4,
                attempts: 3,
                detail: "script exhausted".into(),
            })
        );
    }

    #[tokio::test]
    async fn rejected_is_not_retried() {
        let p = Scripted::new(vec![Err(ProviderError::Rejected("HTTP 400".into()))]);
        let out = extract_chunk(&p, 2, &request(), &fast_config(5)).await.unwrap();
        assert_eq!(p.calls(), 1);
        assert_eq!(out.attempts, 1);
        assert!(out.record.is_empty());
        assert!(matches!(out.error, Some(ChunkError::Rejected { chunk: 2, .. })));
    }

    #[tokio::test]
    async fn refused_credentials_stop_immediately() {
        let p = Scripted::new(vec![Err(ProviderError::Unauthorized("HTTP 401".into()))]);
        let err = extract_chunk(&p, 0, &request(), &fast_config(5)).await.unwrap_err();
        assert_eq!(p.calls(), 1);
        assert!(matches!(err, HarvestError::ProviderNotConfigured { .. }));
        assert!(err.is_run_fatal());
    }

    #[tokio::test]
    async fn garbage_is_a_parse_failure_without_retry() {
        let p = Scripted::new(vec![Ok("Sorry, I can't help with that.".into())]);
        let out = extract_chunk(&p, 1, &request(), &fast_config(3)).await.unwrap();
        assert_eq!(p.calls(), 1);
        assert!(out.record.is_empty());
        assert!(matches!(out.error, Some(ChunkError::ParseFailure { chunk: 1, .. })));
    }

    #[tokio::test]
    async fn fenced_response_is_salvaged() {
        let p = Scripted::new(vec![Ok(
            "```json\n{\"recipes\":[{\"name\":\"Zupa\"}]}\n```".into(),
        )]);
        let out = extract_chunk(&p, 0, &request(), &fast_config(0)).await.unwrap();
        assert!(out.error.is_none());
        assert!(out.salvaged);
    }
}
