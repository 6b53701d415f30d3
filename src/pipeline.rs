//! Pipeline inspection: listing failed CI runs for a repository.
//!
//! [`PipelineInspector::list_failures`] never returns an error. Rate
//! limiting, auth failures, and transport errors are reported through
//! [`FailureListing::error`] alongside whatever failures were collected,
//! so callers can still answer with a partial (or empty) result.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use remedy_core::{Error, PipelineFailure, Result};

use crate::config::PipelineConfig;

/// Splits a repository URL into `(owner, repo)`.
///
/// Accepts `https://host/owner/repo`, an optional trailing `.git` or
/// extra path segments, and the scheme-less form `host/owner/repo`.
pub fn parse_repo_url(input: &str) -> Result<(String, String)> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Error::invalid("repository URL must not be empty"));
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let invalid = || Error::invalid(format!("invalid repository URL: {:?}", input));

    let url = Url::parse(&candidate).map_err(|_| invalid())?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid());
    }
    let host = url.host_str().ok_or_else(invalid)?;
    if !host.contains('.') {
        return Err(invalid());
    }

    let mut segments = url
        .path_segments()
        .ok_or_else(invalid)?
        .filter(|s| !s.is_empty());
    let owner = segments.next().ok_or_else(invalid)?;
    let repo = segments.next().ok_or_else(invalid)?;
    let repo = repo.strip_suffix(".git").unwrap_or(repo);

    let valid = |s: &str| {
        !s.is_empty()
            && s
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    };
    if !valid(owner) || !valid(repo) {
        return Err(invalid());
    }

    Ok((owner.to_string(), repo.to_string()))
}

/// Result of [`PipelineInspector::list_failures`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct FailureListing {
    pub failures: Vec<PipelineFailure>,
    /// Set when the listing is incomplete or empty because of a failure.
    pub error: Option<String>,
}

impl FailureListing {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            failures: Vec::new(),
            error: Some(message.into()),
        }
    }
}

#[async_trait]
pub trait PipelineInspector: Send + Sync {
    fn name(&self) -> &str;

    async fn list_failures(&self, owner: &str, repo: &str) -> FailureListing;
}

// ============ Disabled Inspector ============

pub struct DisabledInspector;

#[async_trait]
impl PipelineInspector for DisabledInspector {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn list_failures(&self, _owner: &str, _repo: &str) -> FailureListing {
        FailureListing::failed("pipeline inspection is disabled")
    }
}

// ============ GitHub Actions Inspector ============

#[derive(Debug, Deserialize)]
struct RunsPage {
    #[serde(default)]
    workflow_runs: Vec<WorkflowRun>,
}

#[derive(Debug, Deserialize)]
struct WorkflowRun {
    id: u64,
    name: Option<String>,
    display_title: Option<String>,
    conclusion: Option<String>,
    created_at: Option<DateTime<Utc>>,
    html_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JobsPage {
    #[serde(default)]
    jobs: Vec<Job>,
}

#[derive(Debug, Deserialize)]
struct Job {
    name: String,
    conclusion: Option<String>,
    #[serde(default)]
    steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
struct Step {
    name: String,
    conclusion: Option<String>,
}

fn is_failure(conclusion: &Option<String>) -> bool {
    matches!(
        conclusion.as_deref(),
        Some("failure") | Some("timed_out") | Some("startup_failure")
    )
}

/// Lists failed workflow runs through the GitHub REST API.
///
/// `GITHUB_TOKEN` is optional; unauthenticated requests work for public
/// repositories under a much lower rate limit.
pub struct GitHubInspector {
    client: reqwest::Client,
    api_url: String,
    token: Option<String>,
    max_runs: u32,
}

impl GitHubInspector {
    pub fn new(config: &PipelineConfig) -> anyhow::Result<Self> {
        let token = std::env::var("GITHUB_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty());
        Self::with_token(config, token)
    }

    pub fn with_token(config: &PipelineConfig, token: Option<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("remedy/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token,
            max_runs: config.max_runs,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let mut req = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| Error::BackendUnavailable(e.to_string()))?;

        let status = resp.status();
        if status.as_u16() == 403 || status.as_u16() == 429 || status.as_u16() == 401 {
            return Err(Error::BackendUnavailable(
                "rate limited or unauthorized".to_string(),
            ));
        }
        if status.as_u16() == 404 {
            return Err(Error::BackendUnavailable(
                "repository not found".to_string(),
            ));
        }
        if !status.is_success() {
            return Err(Error::BackendUnavailable(format!(
                "GitHub API error {}",
                status
            )));
        }

        resp.json::<T>()
            .await
            .map_err(|e| Error::MalformedCollaboratorResponse(e.to_string()))
    }

    /// Failed steps of one run, one line per step.
    async fn failed_steps(&self, owner: &str, repo: &str, run_id: u64) -> Result<String> {
        let url = format!(
            "{}/repos/{}/{}/actions/runs/{}/jobs",
            self.api_url, owner, repo, run_id
        );
        let page: JobsPage = self.get_json(&url).await?;

        let mut lines = Vec::new();
        for job in page.jobs.iter().filter(|j| is_failure(&j.conclusion)) {
            let steps: Vec<&Step> = job.steps.iter().filter(|s| is_failure(&s.conclusion)).collect();
            if steps.is_empty() {
                lines.push(format!("Error: job '{}' failed", job.name));
            }
            for step in steps {
                lines.push(format!(
                    "Error: job '{}' failed at step '{}'",
                    job.name, step.name
                ));
            }
        }
        Ok(lines.join("\n"))
    }

    async fn fetch(&self, owner: &str, repo: &str) -> Result<FailureListing> {
        let url = format!(
            "{}/repos/{}/{}/actions/runs?status=failure&per_page={}",
            self.api_url, owner, repo, self.max_runs
        );
        let page: RunsPage = self.get_json(&url).await?;
        debug!(owner, repo, runs = page.workflow_runs.len(), "fetched failed runs");

        let mut listing = FailureListing::default();
        for run in page.workflow_runs.into_iter().take(self.max_runs as usize) {
            let workflow_name = run.name.clone().unwrap_or_else(|| "workflow".to_string());
            let title = run.display_title.as_deref().unwrap_or(&workflow_name);
            let failure_reason = format!(
                "{} failed ({}): {}",
                workflow_name,
                run.conclusion.as_deref().unwrap_or("failure"),
                title
            );

            let logs = match self.failed_steps(owner, repo, run.id).await {
                Ok(logs) => logs,
                Err(e) => {
                    warn!(run_id = run.id, error = %e, "could not list jobs for run");
                    if listing.error.is_none() {
                        listing.error = Some(e.to_string());
                    }
                    String::new()
                }
            };

            listing.failures.push(PipelineFailure {
                workflow_name,
                run_id: run.id.to_string(),
                failure_reason,
                logs,
                created_at: run.created_at,
                html_url: run.html_url,
            });
        }
        Ok(listing)
    }
}

#[async_trait]
impl PipelineInspector for GitHubInspector {
    fn name(&self) -> &str {
        "github"
    }

    async fn list_failures(&self, owner: &str, repo: &str) -> FailureListing {
        match self.fetch(owner, repo).await {
            Ok(listing) => listing,
            Err(e) => {
                warn!(owner, repo, error = %e, "pipeline inspection failed");
                let message = match e {
                    Error::BackendUnavailable(m) | Error::MalformedCollaboratorResponse(m) => m,
                    other => other.to_string(),
                };
                FailureListing::failed(message)
            }
        }
    }
}

/// Create a pipeline inspector from configuration.
pub fn create_inspector(config: &PipelineConfig) -> anyhow::Result<Arc<dyn PipelineInspector>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledInspector)),
        "github" => Ok(Arc::new(GitHubInspector::new(config)?)),
        other => anyhow::bail!("Unknown pipeline provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_https_url() {
        assert_eq!(
            parse_repo_url("https://github.com/rust-lang/cargo").unwrap(),
            ("rust-lang".to_string(), "cargo".to_string())
        );
    }

    #[test]
    fn test_parse_strips_git_suffix_and_extra_segments() {
        assert_eq!(
            parse_repo_url("https://github.com/owner/repo.git").unwrap().1,
            "repo"
        );
        assert_eq!(
            parse_repo_url("https://github.com/owner/repo/actions/runs/1").unwrap(),
            ("owner".to_string(), "repo".to_string())
        );
    }

    #[test]
    fn test_parse_scheme_less() {
        assert_eq!(
            parse_repo_url("github.com/owner/repo").unwrap(),
            ("owner".to_string(), "repo".to_string())
        );
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in [
            "",
            "not-a-url",
            "https://github.com",
            "https://github.com/owner",
            "ftp://github.com/owner/repo",
            "https://github.com/ow ner/repo",
        ] {
            let err = parse_repo_url(bad).unwrap_err();
            assert!(matches!(err, Error::InvalidInput(_)), "{:?}", bad);
        }
    }

    #[test]
    fn test_failure_conclusions() {
        assert!(is_failure(&Some("failure".to_string())));
        assert!(is_failure(&Some("timed_out".to_string())));
        assert!(!is_failure(&Some("success".to_string())));
        assert!(!is_failure(&None));
    }

    #[tokio::test]
    async fn test_disabled_inspector_flags_error() {
        let listing = DisabledInspector.list_failures("o", "r").await;
        assert!(listing.failures.is_empty());
        assert!(listing.error.is_some());
    }
}
