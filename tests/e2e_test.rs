//! End-to-end tests for complete notification workflows.
//!
//! Exercises payload assembly, request building, retry with backoff and the
//! published dispatch events, both on a scripted transport and over real HTTP
//! against a mock receiver.

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use bridge_testing::{
    http::assertions, DispatchHarness, MockServer, RecordingEventHandler, ScriptedResponse,
    TestClock,
};
use serde_json::json;
use vetted_bridge::{
    delivery::{ClientConfig, WEBHOOK_SECRET_HEADER},
    events::AbandonReason,
    notify::{EndpointAuth, NotificationEndpoints},
    AuditionSubmission, BackoffPolicy, DeliveryOutcome, NewProject, Notifier,
    RetryingDispatcher,
};

/// The documented exhaustion scenario: five 500s with a budget of five.
///
/// Five attempts are made and the only time spent waiting is the backoff
/// between them: 1s + 2s + 4s + 8s, with nothing after the last attempt.
#[tokio::test]
async fn exhaustion_scenario_spends_fifteen_seconds_of_backoff() -> Result<()> {
    let harness = DispatchHarness::new([
        ScriptedResponse::status(500),
        ScriptedResponse::status(500),
        ScriptedResponse::status(500),
        ScriptedResponse::status(500),
        ScriptedResponse::status(500),
    ]);
    let request = harness.request(&json!({"submission_id": "abc-123", "project_id": "proj-1"}));

    let outcome = harness.dispatcher.send(&request).await;

    assert!(matches!(outcome, DeliveryOutcome::Exhausted { attempts: 5, .. }));
    assert_eq!(harness.transport.call_count(), 5);
    assert_eq!(harness.clock.elapsed(), Duration::from_millis(15_000));
    assert_eq!(harness.clock.sleeps(), vec![
        Duration::from_millis(1_000),
        Duration::from_millis(2_000),
        Duration::from_millis(4_000),
        Duration::from_millis(8_000),
    ]);

    assert_eq!(harness.events.count("webhook.attempt_failed"), 5);
    let abandoned =
        harness.events.abandoned().ok_or_else(|| anyhow::anyhow!("missing abandon event"))?;
    assert_eq!(abandoned.reason, AbandonReason::Exhausted);
    assert_eq!(abandoned.status_code, Some(500));
    Ok(())
}

/// A notification travelling over HTTP: outage, recovery, delivery.
#[tokio::test]
async fn submission_reaches_receiver_after_transient_outage() -> Result<()> {
    let server = MockServer::start().await;
    server
        .mock_sequence("/functions/v1/receive-audition-submission")
        .respond_with(502, "Bad Gateway")
        .respond_with(503, "Service Unavailable")
        .respond_with_json(200, &json!({"status": "stored", "candidate_id": "cand-9"}))
        .build()
        .await;

    let clock = TestClock::new();
    let events = RecordingEventHandler::new();
    let dispatcher = RetryingDispatcher::http(
        ClientConfig { timeout: Duration::from_secs(5), ..ClientConfig::default() },
        BackoffPolicy::default(),
        Arc::new(clock.clone()),
    )?
    .with_event_handler(Arc::new(events.clone()));

    let endpoints = NotificationEndpoints {
        audition_submission: Some(
            server.endpoint_url("/functions/v1/receive-audition-submission").parse()?,
        ),
        auth: EndpointAuth {
            webhook_secret: Some("shared-secret".to_string()),
            service_token: None,
        },
        ..Default::default()
    };
    let notifier = Notifier::new(dispatcher, endpoints, "https://audition.vetted.test");

    let outcome = notifier
        .notify_audition_submission(
            AuditionSubmission::new("abc-123", "proj-1", "lee@example.com", "Lee")
                .with_resume_url("https://storage.test/resumes/lee.pdf"),
        )
        .await?;

    assert_eq!(outcome, DeliveryOutcome::Success {
        status_code: 200,
        body: json!({"status": "stored", "candidate_id": "cand-9"}),
        attempts: 3,
    });
    assert_eq!(clock.total_slept(), Duration::from_secs(3));
    assert_eq!(events.names(), vec![
        "webhook.attempt_failed",
        "webhook.attempt_failed",
        "webhook.delivered",
    ]);

    let received = server.received_requests().await;
    assert_eq!(received.len(), 3);
    let expected_body = json!({
        "submission_id": "abc-123",
        "project_id": "proj-1",
        "email": "lee@example.com",
        "name": "Lee",
        "resume_url": "https://storage.test/resumes/lee.pdf",
        "profile": {},
        "answers": [],
    });
    for request in &received {
        assertions::assert_json_body(request, &expected_body);
        assertions::assert_header_present(request, WEBHOOK_SECRET_HEADER, "shared-secret");
        assert!(request.header("authorization").is_none());
    }
    Ok(())
}

/// A receiver that rejects the payload gets exactly one request.
#[tokio::test]
async fn rejected_project_notification_is_not_retried_over_http() -> Result<()> {
    let server = MockServer::start().await;
    server.mock_always("/hooks/project", 422, r#"{"error":"recruiter_email missing"}"#).await;

    let clock = TestClock::new();
    let dispatcher = RetryingDispatcher::http(
        ClientConfig::default(),
        BackoffPolicy::default(),
        Arc::new(clock.clone()),
    )?;
    let endpoints = NotificationEndpoints {
        new_project: Some(server.endpoint_url("/hooks/project").parse()?),
        ..Default::default()
    };
    let notifier = Notifier::new(dispatcher, endpoints, "https://audition.vetted.test");

    let outcome = notifier
        .notify_new_project(&NewProject {
            project_id: "proj-1".to_string(),
            project_title: "Voice Data".to_string(),
            recruiter_email: String::new(),
            recruiter_name: "Rita".to_string(),
        })
        .await?;

    match outcome {
        DeliveryOutcome::PermanentFailure { status_code, body, attempts, .. } => {
            assert_eq!(status_code, Some(422));
            assert_eq!(body.as_deref(), Some(r#"{"error":"recruiter_email missing"}"#));
            assert_eq!(attempts, 1);
        },
        other => panic!("expected permanent failure, got {other:?}"),
    }
    server.assert_request_count(1).await;
    assert!(clock.sleeps().is_empty());
    Ok(())
}
