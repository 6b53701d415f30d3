//! HTTP collaborators against mock servers: the Anthropic generation
//! backend and the GitHub Actions inspector.

use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use remedy::config::{GenerationConfig, PipelineConfig};
use remedy::generation::{AnthropicBackend, GenerationBackend};
use remedy::pipeline::{GitHubInspector, PipelineInspector};
use remedy_core::Error;

fn generation_config(server: &MockServer, max_retries: u32) -> GenerationConfig {
    GenerationConfig {
        provider: "anthropic".to_string(),
        api_url: format!("{}/v1/messages", server.uri()),
        max_retries,
        timeout_secs: 5,
        ..GenerationConfig::default()
    }
}

fn backend(server: &MockServer, max_retries: u32) -> AnthropicBackend {
    AnthropicBackend::with_api_key(&generation_config(server, max_retries), "test-key")
        .unwrap()
        .with_backoff(Duration::from_millis(10))
}

fn messages_reply(text: &str) -> serde_json::Value {
    json!({
        "id": "msg_1",
        "type": "message",
        "role": "assistant",
        "content": [{ "type": "text", "text": text }]
    })
}

#[tokio::test]
async fn test_anthropic_parses_solutions() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "test-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(messages_reply(
            "Here are the fixes:\n[{\"description\": \"Heap too small\", \
             \"solution_text\": \"Raise -Xmx\", \"confidence\": 0.85}]",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let sols = backend(&server, 0)
        .generate("java.lang.OutOfMemoryError: Java heap space")
        .await
        .unwrap();
    assert_eq!(sols.len(), 1);
    assert_eq!(sols[0].solution_text, "Raise -Xmx");
}

#[tokio::test]
async fn test_anthropic_retries_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(messages_reply("[{\"solution_text\": \"retry worked\"}]")),
        )
        .mount(&server)
        .await;

    let sols = backend(&server, 2).generate("error").await.unwrap();
    assert_eq!(sols[0].solution_text, "retry worked");
    assert_eq!(sols[0].confidence, 0.5);
}

#[tokio::test]
async fn test_anthropic_does_not_retry_client_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let err = backend(&server, 3).generate("error").await.unwrap_err();
    assert!(matches!(err, Error::BackendUnavailable(_)), "{:?}", err);
}

#[tokio::test]
async fn test_anthropic_prose_reply_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(messages_reply("I am not sure.")),
        )
        .mount(&server)
        .await;

    let err = backend(&server, 0).generate("error").await.unwrap_err();
    assert!(matches!(err, Error::MalformedCollaboratorResponse(_)));
}

#[tokio::test]
async fn test_anthropic_validate() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(messages_reply("Hi")))
        .mount(&server)
        .await;
    assert!(backend(&server, 0).validate().await);

    let down = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&down)
        .await;
    assert!(!backend(&down, 0).validate().await);
}

fn inspector(server: &MockServer, token: Option<&str>) -> GitHubInspector {
    let config = PipelineConfig {
        api_url: server.uri(),
        max_runs: 2,
        timeout_secs: 5,
        ..PipelineConfig::default()
    };
    GitHubInspector::with_token(&config, token.map(str::to_string)).unwrap()
}

#[tokio::test]
async fn test_github_lists_failed_runs_with_failed_steps() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widget/actions/runs"))
        .and(query_param("status", "failure"))
        .and(query_param("per_page", "2"))
        .and(header("authorization", "Bearer gh-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total_count": 1,
            "workflow_runs": [{
                "id": 42,
                "name": "CI",
                "display_title": "Bump deps",
                "conclusion": "failure",
                "created_at": "2024-05-01T10:00:00Z",
                "html_url": "https://github.com/acme/widget/actions/runs/42"
            }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widget/actions/runs/42/jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jobs": [{
                "name": "test",
                "conclusion": "failure",
                "steps": [
                    { "name": "checkout", "conclusion": "success" },
                    { "name": "npm test", "conclusion": "failure" }
                ]
            }, {
                "name": "lint",
                "conclusion": "success",
                "steps": []
            }]
        })))
        .mount(&server)
        .await;

    let listing = inspector(&server, Some("gh-token"))
        .list_failures("acme", "widget")
        .await;
    assert!(listing.error.is_none(), "{:?}", listing.error);
    assert_eq!(listing.failures.len(), 1);

    let f = &listing.failures[0];
    assert_eq!(f.workflow_name, "CI");
    assert_eq!(f.run_id, "42");
    assert!(f.failure_reason.contains("Bump deps"));
    assert_eq!(f.logs, "Error: job 'test' failed at step 'npm test'");
    assert!(f.created_at.is_some());
    assert!(f.error_text().contains("npm test"));
}

#[tokio::test]
async fn test_github_rate_limit_is_flagged_not_thrown() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widget/actions/runs"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "message": "API rate limit exceeded"
        })))
        .mount(&server)
        .await;

    let listing = inspector(&server, None).list_failures("acme", "widget").await;
    assert!(listing.failures.is_empty());
    assert_eq!(listing.error.as_deref(), Some("rate limited or unauthorized"));
}

#[tokio::test]
async fn test_github_jobs_failure_keeps_the_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widget/actions/runs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "workflow_runs": [{ "id": 7, "name": "Deploy", "conclusion": "failure" }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widget/actions/runs/7/jobs"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let listing = inspector(&server, None).list_failures("acme", "widget").await;
    assert_eq!(listing.failures.len(), 1);
    assert_eq!(listing.failures[0].logs, "");
    assert!(listing.error.is_some());
}
