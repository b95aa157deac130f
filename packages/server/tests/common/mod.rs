// Common test utilities

pub mod harness;

pub use harness::*;

use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use server_core::domains::parsing::Structurer;
use server_core::kernel::jobs::{Job, JobOrchestrator, OrchestratorConfig};
use server_core::kernel::{MockSchemaFetcher, TestDependencies};
use tower::ServiceExt;
use uuid::Uuid;

pub const SCHEMA_ENDPOINT: &str = "https://schemas.example.com/event";

/// Event schema used across tests: `title` is required.
pub fn event_schema() -> Value {
    json!({
        "type": "object",
        "required": ["title"],
        "properties": {
            "title": {"type": "string"},
            "date": {"type": "string"}
        }
    })
}

pub fn event_schemas() -> MockSchemaFetcher {
    MockSchemaFetcher::new().with_schema(SCHEMA_ENDPOINT, event_schema(), "Extract the event.")
}

/// `n` characters of page text.
pub fn page_text(n: usize) -> String {
    "lorem ipsum ".repeat(n / 12 + 1).chars().take(n).collect()
}

/// Orchestrator over mocks. DNS resolution is off so example hosts pass
/// the SSRF guard offline.
pub fn orchestrator(deps: &TestDependencies) -> JobOrchestrator {
    orchestrator_with(deps, OrchestratorConfig::default())
}

pub fn orchestrator_with(deps: &TestDependencies, config: OrchestratorConfig) -> JobOrchestrator {
    let server_deps = deps.into_server_deps();
    JobOrchestrator::new(&server_deps, Structurer::new(server_deps.ai.clone())).with_config(
        OrchestratorConfig {
            resolve_dns: false,
            ..config
        },
    )
}

/// Poll until the job reaches a terminal state.
pub async fn wait_for_terminal(orchestrator: &JobOrchestrator, job_id: Uuid) -> Job {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let job = orchestrator
            .get_status(job_id)
            .await
            .expect("job should be readable");
        if job.status.is_terminal() {
            return job;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {} stuck in {}",
            job_id,
            job.status
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub async fn send(app: Router, method: Method, uri: &str, body: Option<Value>) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    app.oneshot(builder.body(body).unwrap()).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
