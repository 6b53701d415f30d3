//! TOML configuration.
//!
//! Every section is optional and falls back to defaults, so an empty file
//! (or no file at all, via [`Config::default`]) gives an in-memory store,
//! disabled generation, and the GitHub inspector on `127.0.0.1:8000`.
//! Secrets are never read from the file: `ANTHROPIC_API_KEY` and
//! `GITHUB_TOKEN` come from the environment.

use anyhow::{bail, Context, Result};
use remedy_core::Thresholds;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub relevance: RelevanceConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Sqlite,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("./data/remedy.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct RelevanceConfig {
    #[serde(default = "default_high_sim")]
    pub high_sim_threshold: f64,
    #[serde(default = "default_high_overlap")]
    pub high_overlap_threshold: f64,
    #[serde(default = "default_low_sim")]
    pub low_sim_threshold: f64,
    #[serde(default = "default_low_overlap")]
    pub low_overlap_threshold: f64,
    #[serde(default = "default_min_term_len")]
    pub min_term_len: usize,
    #[serde(default)]
    pub extra_stopwords: Vec<String>,
    #[serde(default = "default_max_matches")]
    pub max_matches: usize,
    #[serde(default)]
    pub min_record_confidence: f64,
}

impl Default for RelevanceConfig {
    fn default() -> Self {
        Self {
            high_sim_threshold: default_high_sim(),
            high_overlap_threshold: default_high_overlap(),
            low_sim_threshold: default_low_sim(),
            low_overlap_threshold: default_low_overlap(),
            min_term_len: default_min_term_len(),
            extra_stopwords: Vec::new(),
            max_matches: default_max_matches(),
            min_record_confidence: 0.0,
        }
    }
}

impl RelevanceConfig {
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            high_sim_threshold: self.high_sim_threshold,
            high_overlap_threshold: self.high_overlap_threshold,
            low_sim_threshold: self.low_sim_threshold,
            low_overlap_threshold: self.low_overlap_threshold,
        }
    }
}

fn default_high_sim() -> f64 {
    Thresholds::default().high_sim_threshold
}
fn default_high_overlap() -> f64 {
    Thresholds::default().high_overlap_threshold
}
fn default_low_sim() -> f64 {
    Thresholds::default().low_sim_threshold
}
fn default_low_overlap() -> f64 {
    Thresholds::default().low_overlap_threshold
}
fn default_min_term_len() -> usize {
    remedy_core::text::DEFAULT_MIN_TERM_LEN
}
fn default_max_matches() -> usize {
    remedy_core::relevance::DEFAULT_MAX_MATCHES
}

#[derive(Debug, Deserialize, Clone)]
pub struct RouterConfig {
    #[serde(default = "default_generation_timeout")]
    pub generation_timeout_secs: u64,
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,
    #[serde(default = "default_true")]
    pub escalate_low_confidence: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            generation_timeout_secs: default_generation_timeout(),
            batch_concurrency: default_batch_concurrency(),
            escalate_low_confidence: true,
        }
    }
}

fn default_generation_timeout() -> u64 {
    30
}
fn default_batch_concurrency() -> usize {
    4
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_anthropic_url")]
    pub api_url: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: default_model(),
            api_url: default_anthropic_url(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

impl GenerationConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_disabled() -> String {
    "disabled".to_string()
}
fn default_model() -> String {
    "claude-3-5-sonnet-latest".to_string()
}
fn default_anthropic_url() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}
fn default_max_tokens() -> u32 {
    2000
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_github")]
    pub provider: String,
    #[serde(default = "default_github_url")]
    pub api_url: String,
    #[serde(default = "default_max_runs")]
    pub max_runs: u32,
    #[serde(default = "default_pipeline_timeout")]
    pub timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            provider: default_github(),
            api_url: default_github_url(),
            max_runs: default_max_runs(),
            timeout_secs: default_pipeline_timeout(),
        }
    }
}

fn default_github() -> String {
    "github".to_string()
}
fn default_github_url() -> String {
    "https://api.github.com".to_string()
}
fn default_max_runs() -> u32 {
    5
}
fn default_pipeline_timeout() -> u64 {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Checks cross-field constraints that serde cannot express.
pub fn validate(config: &Config) -> Result<()> {
    // Validate relevance
    if let Err(e) = config.relevance.thresholds().validate() {
        bail!("relevance: {}", e);
    }
    if config.relevance.max_matches == 0 {
        bail!("relevance.max_matches must be >= 1");
    }
    if config.relevance.min_term_len == 0 {
        bail!("relevance.min_term_len must be >= 1");
    }
    if !(0.0..=1.0).contains(&config.relevance.min_record_confidence) {
        bail!("relevance.min_record_confidence must be in [0.0, 1.0]");
    }

    // Validate router
    if config.router.generation_timeout_secs == 0 {
        bail!("router.generation_timeout_secs must be >= 1");
    }
    if config.router.batch_concurrency == 0 {
        bail!("router.batch_concurrency must be >= 1");
    }

    match config.generation.provider.as_str() {
        "disabled" | "anthropic" => {}
        other => bail!(
            "Unknown generation provider: '{}'. Must be disabled or anthropic.",
            other
        ),
    }
    if config.generation.is_enabled() && config.generation.model.trim().is_empty() {
        bail!(
            "generation.model must be specified when provider is '{}'",
            config.generation.provider
        );
    }

    match config.pipeline.provider.as_str() {
        "disabled" | "github" => {}
        other => bail!(
            "Unknown pipeline provider: '{}'. Must be disabled or github.",
            other
        ),
    }
    if config.pipeline.max_runs == 0 {
        bail!("pipeline.max_runs must be >= 1");
    }

    Ok(())
}
