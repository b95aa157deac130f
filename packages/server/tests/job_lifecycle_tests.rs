//! End-to-end job lifecycle over mocked collaborators.

mod common;

use std::time::Duration;

use chrono::Utc;
use common::*;
use extraction::testing::MockExtractor;
use extraction::{ExtractionMethod, ScrapeError};
use serde_json::json;
use server_core::kernel::jobs::{
    ErrorCode, Job, JobOptions, JobStatus, JobStore, JobsError, NewJob, OrchestratorConfig,
    SubmitRequest,
};
use server_core::kernel::{MockAI, MockSchemaFetcher, TestDependencies};

fn submit_request(url: &str) -> SubmitRequest {
    SubmitRequest {
        url: url.to_string(),
        schema_endpoint: SCHEMA_ENDPOINT.to_string(),
        client_id: "client-1".to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn static_page_completes_with_dom() {
    let deps = TestDependencies::new()
        .with_dom(MockExtractor::dom().with_text(page_text(2000)))
        .with_ai(MockAI::new().with_response(r#"{"title": "Spring Fair", "date": "2024-05-01"}"#))
        .with_schemas(event_schemas());
    let orchestrator = orchestrator(&deps);

    let submission = orchestrator
        .submit(submit_request("https://example.com/events/1"))
        .await
        .unwrap();
    let job = wait_for_terminal(&orchestrator, submission.job_id).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.method, Some(ExtractionMethod::Dom));
    assert_eq!(job.structured_data.unwrap()["title"], "Spring Fair");
    assert_eq!(job.raw_content.unwrap().chars().count(), 2000);
    assert!(job.completed_at.is_some());
    assert_eq!(deps.headless.call_count(), 0);
}

#[tokio::test]
async fn thin_page_falls_back_to_headless() {
    let deps = TestDependencies::new()
        .with_dom(MockExtractor::dom().with_text(page_text(40)))
        .with_headless(MockExtractor::headless().with_text(page_text(1500)))
        .with_ai(MockAI::new().with_response(r#"{"title": "Rendered"}"#))
        .with_schemas(event_schemas());
    let orchestrator = orchestrator(&deps);

    let submission = orchestrator
        .submit(submit_request("https://spa.example.com"))
        .await
        .unwrap();
    let job = wait_for_terminal(&orchestrator, submission.job_id).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.method, Some(ExtractionMethod::Headless));
    assert_eq!(deps.dom.call_count(), 1);
    assert_eq!(deps.headless.call_count(), 1);
}

#[tokio::test]
async fn non_http_url_is_rejected_without_a_job() {
    let deps = TestDependencies::new();
    let orchestrator = orchestrator(&deps);

    let err = orchestrator
        .submit(submit_request("ftp://example.com"))
        .await
        .unwrap_err();

    assert!(matches!(err, JobsError::InvalidInput { field: "url", .. }));
    assert!(deps.store.is_empty().await);
    assert_eq!(deps.dom.call_count(), 0);
}

#[tokio::test]
async fn unreachable_schema_endpoint_fails_job() {
    let deps = TestDependencies::new()
        .with_dom(MockExtractor::dom().with_text(page_text(500)))
        .with_schemas(MockSchemaFetcher::new());
    let orchestrator = orchestrator(&deps);

    let submission = orchestrator
        .submit(submit_request("https://example.com"))
        .await
        .unwrap();
    let job = wait_for_terminal(&orchestrator, submission.job_id).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.unwrap().code, ErrorCode::SchemaFetchFailed);
    assert_eq!(deps.ai.call_count(), 0);
    // Extraction output is kept for diagnostics
    assert_eq!(job.method, Some(ExtractionMethod::Dom));
}

#[tokio::test]
async fn malformed_model_output_twice_fails_validation() {
    let deps = TestDependencies::new()
        .with_dom(MockExtractor::dom().with_text(page_text(500)))
        .with_ai(
            MockAI::new()
                .with_response("Sure! Here is the data: {title:")
                .with_response("still not json"),
        )
        .with_schemas(event_schemas());
    let orchestrator = orchestrator(&deps);

    let submission = orchestrator
        .submit(submit_request("https://example.com"))
        .await
        .unwrap();
    let job = wait_for_terminal(&orchestrator, submission.job_id).await;

    assert_eq!(job.status, JobStatus::Failed);
    let error = job.error.unwrap();
    assert_eq!(error.code, ErrorCode::SchemaValidationFailed);
    assert_eq!(error.details.unwrap()["last_output"], "still not json");
    assert_eq!(deps.ai.call_count(), 2);
    assert!(job.structured_data.is_none());
}

#[tokio::test]
async fn corrective_reprompt_recovers_missing_field() {
    let deps = TestDependencies::new()
        .with_dom(MockExtractor::dom().with_text(page_text(500)))
        .with_ai(
            MockAI::new()
                .with_response(r#"{"date": "2024-05-01"}"#)
                .with_response(r#"{"title": "Fixed", "date": "2024-05-01"}"#),
        )
        .with_schemas(event_schemas());
    let orchestrator = orchestrator(&deps);

    let submission = orchestrator
        .submit(submit_request("https://example.com"))
        .await
        .unwrap();
    let job = wait_for_terminal(&orchestrator, submission.job_id).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.structured_data.unwrap()["title"], "Fixed");
}

#[tokio::test]
async fn job_older_than_ttl_is_not_found() {
    let deps = TestDependencies::new();
    let orchestrator = orchestrator(&deps);

    let old = Job::new_at(
        NewJob {
            client_id: "client-1".into(),
            url: "https://example.com".into(),
            schema_endpoint: SCHEMA_ENDPOINT.into(),
            ..Default::default()
        },
        Utc::now() - chrono::Duration::hours(25),
        chrono::Duration::hours(24),
    );
    deps.store.create(&old).await.unwrap();

    // Not swept yet, but no longer readable
    assert!(deps.store.get(old.id).await.unwrap().is_some());
    let err = orchestrator.get_status(old.id).await.unwrap_err();
    assert!(matches!(err, JobsError::NotFound(id) if id == old.id));
}

#[tokio::test]
async fn expiry_is_fixed_at_creation() {
    let deps = TestDependencies::new()
        .with_dom(MockExtractor::dom().with_text(page_text(500)))
        .with_ai(MockAI::new().with_response(r#"{"title": "x"}"#))
        .with_schemas(event_schemas());
    let orchestrator = orchestrator(&deps);

    let submission = orchestrator
        .submit(submit_request("https://example.com"))
        .await
        .unwrap();
    let job = wait_for_terminal(&orchestrator, submission.job_id).await;
    let polled = orchestrator.get_status(job.id).await.unwrap();

    assert_eq!(job.expires_at - job.created_at, chrono::Duration::hours(24));
    assert_eq!(polled.expires_at, job.expires_at);
    assert_eq!(
        submission.estimated_completion - job.created_at,
        chrono::Duration::seconds(30)
    );
}

#[tokio::test]
async fn polled_status_never_regresses() {
    let deps = TestDependencies::new()
        .with_dom(
            MockExtractor::dom()
                .with_text(page_text(500))
                .with_delay(Duration::from_millis(150)),
        )
        .with_ai(
            MockAI::new()
                .with_response(r#"{"title": "x"}"#)
                .with_delay(Duration::from_millis(150)),
        )
        .with_schemas(event_schemas());
    let orchestrator = orchestrator(&deps);

    let submission = orchestrator
        .submit(submit_request("https://example.com"))
        .await
        .unwrap();

    let mut seen = Vec::new();
    loop {
        let job = orchestrator.get_status(submission.job_id).await.unwrap();
        seen.push(job.status);
        if job.status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert!(seen.windows(2).all(|w| w[0].rank() <= w[1].rank()), "{:?}", seen);
    assert!(seen.contains(&JobStatus::Scraping));
    assert!(seen.contains(&JobStatus::Parsing));
    assert_eq!(seen.last(), Some(&JobStatus::Completed));
}

#[tokio::test]
async fn cancel_stops_job_before_structuring() {
    let deps = TestDependencies::new()
        .with_dom(
            MockExtractor::dom()
                .with_text(page_text(500))
                .with_delay(Duration::from_millis(200)),
        )
        .with_ai(MockAI::new().with_response(r#"{"title": "x"}"#))
        .with_schemas(event_schemas());
    let orchestrator = orchestrator(&deps);

    let submission = orchestrator
        .submit(submit_request("https://example.com"))
        .await
        .unwrap();
    let snapshot = orchestrator.cancel(submission.job_id).await.unwrap();
    assert!(snapshot.cancel_requested);

    let job = wait_for_terminal(&orchestrator, submission.job_id).await;
    assert_eq!(job.status, JobStatus::Canceled);
    assert_eq!(deps.ai.call_count(), 0);
    assert!(job.structured_data.is_none());
}

#[tokio::test]
async fn cancel_after_completion_is_a_noop() {
    let deps = TestDependencies::new()
        .with_dom(MockExtractor::dom().with_text(page_text(500)))
        .with_ai(MockAI::new().with_response(r#"{"title": "x"}"#))
        .with_schemas(event_schemas());
    let orchestrator = orchestrator(&deps);

    let submission = orchestrator
        .submit(submit_request("https://example.com"))
        .await
        .unwrap();
    wait_for_terminal(&orchestrator, submission.job_id).await;

    let job = orchestrator.cancel(submission.job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert!(!job.cancel_requested);
}

#[tokio::test]
async fn job_exceeding_its_deadline_times_out() {
    let deps = TestDependencies::new()
        .with_dom(
            MockExtractor::dom()
                .with_text(page_text(500))
                .with_delay(Duration::from_secs(5)),
        )
        .with_schemas(event_schemas());
    let orchestrator = orchestrator(&deps);

    let mut request = submit_request("https://slow.example.com");
    request.options = JobOptions {
        timeout_secs: Some(1),
        force_headless: false,
    };
    let submission = orchestrator.submit(request).await.unwrap();
    let job = wait_for_terminal(&orchestrator, submission.job_id).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.unwrap().code, ErrorCode::Timeout);
    assert_eq!(orchestrator.active_jobs(), 0);
}

#[tokio::test]
async fn job_deleted_while_scraping_ends_its_worker_quietly() {
    let deps = TestDependencies::new()
        .with_dom(
            MockExtractor::dom()
                .with_text(page_text(2000))
                .with_delay(Duration::from_millis(300)),
        )
        .with_ai(MockAI::new().with_response(r#"{"title": "Gone"}"#))
        .with_schemas(event_schemas());
    let orchestrator = orchestrator(&deps);

    let submission = orchestrator
        .submit(submit_request("https://example.com/swept"))
        .await
        .unwrap();
    let job_id = submission.job_id;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while deps.dom.call_count() == 0 {
        assert!(tokio::time::Instant::now() < deadline, "scrape never started");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(deps.store.delete(job_id).await.unwrap());

    while orchestrator.active_jobs() > 0 {
        assert!(tokio::time::Instant::now() < deadline, "worker never exited");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert!(deps.store.get(job_id).await.unwrap().is_none());
    assert!(deps.store.is_empty().await);
    assert!(matches!(
        orchestrator.get_status(job_id).await,
        Err(JobsError::NotFound(id)) if id == job_id
    ));
    assert_eq!(deps.ai.call_count(), 0);
}

#[tokio::test]
async fn scrape_failure_on_both_paths_reports_scrape_failed() {
    let deps = TestDependencies::new()
        .with_dom(MockExtractor::dom().with_error(ScrapeError::Status {
            url: "https://example.com".into(),
            status: 503,
        }))
        .with_headless(
            MockExtractor::headless()
                .with_error(ScrapeError::ResourceExhausted { waited_ms: 5000 }),
        )
        .with_schemas(event_schemas());
    let orchestrator = orchestrator(&deps);

    let submission = orchestrator
        .submit(submit_request("https://example.com"))
        .await
        .unwrap();
    let job = wait_for_terminal(&orchestrator, submission.job_id).await;

    let error = job.error.unwrap();
    assert_eq!(error.code, ErrorCode::ScrapeFailed);
    let details = error.details.unwrap();
    assert_eq!(details["reason"], "resource_exhausted");
    assert_eq!(details["http_status"], 503);
    assert!(job.method.is_none());
}

#[tokio::test]
async fn force_headless_skips_static_fetch() {
    let deps = TestDependencies::new()
        .with_dom(MockExtractor::dom().with_text(page_text(500)))
        .with_headless(MockExtractor::headless().with_text(page_text(500)))
        .with_ai(MockAI::new().with_response(r#"{"title": "x"}"#))
        .with_schemas(event_schemas());
    let orchestrator = orchestrator(&deps);

    let mut request = submit_request("https://example.com");
    request.options.force_headless = true;
    let submission = orchestrator.submit(request).await.unwrap();
    let job = wait_for_terminal(&orchestrator, submission.job_id).await;

    assert_eq!(job.method, Some(ExtractionMethod::Headless));
    assert_eq!(deps.dom.call_count(), 0);
}

#[tokio::test]
async fn metadata_is_echoed_on_completion() {
    let deps = TestDependencies::new()
        .with_dom(MockExtractor::dom().with_text(page_text(500)))
        .with_ai(MockAI::new().with_response(r#"{"title": "x"}"#))
        .with_schemas(event_schemas());
    let orchestrator = orchestrator(&deps);

    let mut request = submit_request("https://example.com");
    request
        .metadata
        .insert("crm_id".into(), json!("lead-42"));
    let submission = orchestrator.submit(request).await.unwrap();
    let job = wait_for_terminal(&orchestrator, submission.job_id).await;

    assert_eq!(job.metadata["crm_id"], "lead-42");
}

#[tokio::test]
async fn concurrent_jobs_are_independent() {
    let deps = TestDependencies::new()
        .with_dom(MockExtractor::dom().with_text(page_text(500)))
        .with_ai(MockAI::new().with_fallback(r#"{"title": "x"}"#))
        .with_schemas(event_schemas());
    let orchestrator = orchestrator(&deps);

    let mut ids = Vec::new();
    for i in 0..8 {
        let submission = orchestrator
            .submit(submit_request(&format!("https://example.com/{}", i)))
            .await
            .unwrap();
        ids.push(submission.job_id);
    }

    for id in ids {
        let job = wait_for_terminal(&orchestrator, id).await;
        assert_eq!(job.status, JobStatus::Completed);
    }
    assert_eq!(deps.dom.call_count(), 8);
}

#[tokio::test]
async fn orphaned_jobs_are_failed_on_recovery() {
    let deps = TestDependencies::new();
    let orchestrator = orchestrator_with(&deps, OrchestratorConfig::default());

    let orphan = Job::new(
        NewJob {
            client_id: "client-1".into(),
            url: "https://example.com".into(),
            schema_endpoint: SCHEMA_ENDPOINT.into(),
            ..Default::default()
        },
        chrono::Duration::hours(24),
    );
    deps.store.create(&orphan).await.unwrap();

    assert_eq!(orchestrator.recover_orphaned().await.unwrap(), 1);
    let job = orchestrator.get_status(orphan.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.unwrap().message, "worker lost on restart");
}
