//! Generation backend abstraction and implementations.
//!
//! The router asks a [`GenerationBackend`] for fresh solutions whenever
//! retrieval is not trustworthy. Two implementations:
//! - **[`DisabledBackend`]**: always unavailable; the router then serves
//!   the static fallback table.
//! - **[`AnthropicBackend`]**: calls the Anthropic Messages API with retry
//!   and backoff, and parses the JSON array embedded in the reply.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff doubles from the configured base (1s by default), capped at 2^5
//!
//! Backends never see the caller's timeout; the router wraps every call in
//! its own deadline.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use remedy_core::{Error, GeneratedSolution, Result};

use crate::config::GenerationConfig;

/// Upper bound on solutions returned by one `generate` call.
pub const MAX_GENERATED: usize = 10;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Trait for generation backends.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Short identifier used in health output (`<name>_api_valid`).
    fn name(&self) -> &str;

    /// Produces at most [`MAX_GENERATED`] candidate solutions for `error_text`.
    ///
    /// An empty vector is a valid answer. Transport failures surface as
    /// [`Error::BackendUnavailable`], unparseable replies as
    /// [`Error::MalformedCollaboratorResponse`].
    async fn generate(&self, error_text: &str) -> Result<Vec<GeneratedSolution>>;

    /// Cheap liveness probe for `/health`.
    async fn validate(&self) -> bool;
}

// ============ Disabled Backend ============

/// Used when `generation.provider = "disabled"`.
pub struct DisabledBackend;

#[async_trait]
impl GenerationBackend for DisabledBackend {
    fn name(&self) -> &str {
        "claude"
    }

    async fn generate(&self, _error_text: &str) -> Result<Vec<GeneratedSolution>> {
        Err(Error::BackendUnavailable(
            "generation is disabled (generation.provider = \"disabled\")".to_string(),
        ))
    }

    async fn validate(&self) -> bool {
        false
    }
}

// ============ Anthropic Backend ============

/// Generation backend using the Anthropic Messages API.
///
/// Requires `ANTHROPIC_API_KEY` in the environment (see [`AnthropicBackend::new`]).
pub struct AnthropicBackend {
    client: reqwest::Client,
    api_key: String,
    api_url: String,
    model: String,
    max_tokens: u32,
    max_retries: u32,
    backoff: Duration,
}

impl AnthropicBackend {
    /// Create a backend from configuration, reading the key from the
    /// environment.
    pub fn new(config: &GenerationConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| anyhow::anyhow!("ANTHROPIC_API_KEY environment variable not set"))?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &GenerationConfig, api_key: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            api_url: config.api_url.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            backoff: Duration::from_secs(1),
        })
    }

    /// Overrides the base retry delay.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    fn request(&self, body: &Value) -> reqwest::RequestBuilder {
        self.client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(body)
    }

    /// POST `body` with retry/backoff and return the decoded reply.
    async fn send_with_retry(&self, body: &Value) -> Result<Value> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.backoff * (1u32 << (attempt - 1).min(5));
                debug!(attempt, ?delay, "retrying generation request");
                tokio::time::sleep(delay).await;
            }

            match self.request(body).send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response.json::<Value>().await.map_err(|e| {
                            Error::MalformedCollaboratorResponse(format!(
                                "response body is not JSON: {}",
                                e
                            ))
                        });
                    }

                    // Rate limited or server error, retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(Error::BackendUnavailable(format!(
                            "Anthropic API error {}: {}",
                            status, body_text
                        )));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    return Err(Error::BackendUnavailable(format!(
                        "Anthropic API error {}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    last_err = Some(Error::BackendUnavailable(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            Error::BackendUnavailable("generation failed after retries".to_string())
        }))
    }
}

fn build_prompt(error_text: &str) -> String {
    format!(
        "You are a DevOps expert. Analyze this error and provide up to {max} specific solutions.\n\n\
         Error: {error}\n\n\
         For each solution, provide:\n\
         1. A clear description of the problem\n\
         2. Step-by-step solution\n\
         3. A confidence rating (0.0-1.0)\n\n\
         Format as JSON array with fields: description, solution_text, confidence",
        max = MAX_GENERATED,
        error = error_text
    )
}

#[async_trait]
impl GenerationBackend for AnthropicBackend {
    fn name(&self) -> &str {
        "claude"
    }

    async fn generate(&self, error_text: &str) -> Result<Vec<GeneratedSolution>> {
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": [{ "role": "user", "content": build_prompt(error_text) }],
        });

        let reply = self.send_with_retry(&body).await?;
        let text = reply_text(&reply)?;
        let solutions = parse_solutions(text)?;
        debug!(count = solutions.len(), "generated solutions");
        Ok(solutions)
    }

    async fn validate(&self) -> bool {
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": 10,
            "messages": [{ "role": "user", "content": "Hi" }],
        });
        match self.request(&body).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                warn!(error = %e, "generation backend health probe failed");
                false
            }
        }
    }
}

/// Returns the first text block of a Messages API reply.
fn reply_text(reply: &Value) -> Result<&str> {
    reply
        .get("content")
        .and_then(|c| c.as_array())
        .and_then(|blocks| {
            blocks
                .iter()
                .find(|b| b.get("type").and_then(|t| t.as_str()).unwrap_or("text") == "text")
        })
        .and_then(|b| b.get("text"))
        .and_then(|t| t.as_str())
        .ok_or_else(|| {
            Error::MalformedCollaboratorResponse("reply has no text content block".to_string())
        })
}

/// Extracts the JSON array between the first `[` and the last `]` of
/// `text` and converts it to solutions.
///
/// Items without a usable `solution_text` are dropped. Missing or
/// out-of-range confidences become 0.5 or are clamped to `[0.0, 1.0]`.
pub fn parse_solutions(text: &str) -> Result<Vec<GeneratedSolution>> {
    let (start, end) = match (text.find('['), text.rfind(']')) {
        (Some(s), Some(e)) if s < e => (s, e),
        _ => {
            return Err(Error::MalformedCollaboratorResponse(
                "no JSON array in generated text".to_string(),
            ))
        }
    };

    let items: Vec<Value> = serde_json::from_str(&text[start..=end]).map_err(|e| {
        Error::MalformedCollaboratorResponse(format!("generated JSON is invalid: {}", e))
    })?;

    Ok(items
        .iter()
        .filter_map(|item| {
            let solution_text = item.get("solution_text")?.as_str()?.trim();
            if solution_text.is_empty() {
                return None;
            }
            let description = item
                .get("description")
                .and_then(|d| d.as_str())
                .unwrap_or("")
                .trim()
                .to_string();
            let confidence = item
                .get("confidence")
                .and_then(|c| c.as_f64())
                .filter(|c| c.is_finite())
                .unwrap_or(0.5)
                .clamp(0.0, 1.0);
            Some(GeneratedSolution {
                description,
                solution_text: solution_text.to_string(),
                confidence,
            })
        })
        .take(MAX_GENERATED)
        .collect())
}

/// Create a generation backend from configuration.
///
/// # Errors
///
/// Returns an error for unknown provider names or when the provider
/// cannot be initialized (e.g. the API key is missing).
pub fn create_backend(config: &GenerationConfig) -> anyhow::Result<Arc<dyn GenerationBackend>> {
    create_backend_with_key(config, std::env::var("ANTHROPIC_API_KEY").ok())
}

/// Like [`create_backend`] with an explicit API key. A missing or blank key
/// for `anthropic` degrades to [`DisabledBackend`] so the service still
/// starts and serves fallback solutions.
pub fn create_backend_with_key(
    config: &GenerationConfig,
    api_key: Option<String>,
) -> anyhow::Result<Arc<dyn GenerationBackend>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledBackend)),
        "anthropic" => match api_key.filter(|k| !k.trim().is_empty()) {
            Some(key) => Ok(Arc::new(AnthropicBackend::with_api_key(config, key)?)),
            None => {
                warn!("ANTHROPIC_API_KEY is not set; generation disabled, serving fallback solutions");
                Ok(Arc::new(DisabledBackend))
            }
        },
        other => anyhow::bail!("Unknown generation provider: {}", other),
    }
}
