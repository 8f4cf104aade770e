//! Integration tests for the event notifier over a scripted endpoint.

use anyhow::Result;
use bridge_core::AbandonReason;
use bridge_delivery::{DeliveryOutcome, WEBHOOK_SECRET_HEADER};
use bridge_notify::{
    AuditionAnswer, AuditionSubmission, CandidateProfile, EndpointAuth, NewProject,
    NotificationEndpoints, NotificationKind, Notifier, NotifyError, EVENT_HEADER,
};
use bridge_testing::{DispatchHarness, RecordedCall, ScriptedResponse};
use chrono::{TimeZone, Utc};
use reqwest::Url;
use serde_json::json;

const AUDITION_BASE_URL: &str = "https://audition.vetted.test";

fn endpoints() -> Result<NotificationEndpoints> {
    Ok(NotificationEndpoints {
        opportunity_created: Some(Url::parse("https://vetted.test/hooks/opportunity")?),
        audition_submission: Some(Url::parse("https://vetted.test/hooks/submission")?),
        new_project: Some(Url::parse("https://vetted.test/hooks/project")?),
        auth: EndpointAuth {
            webhook_secret: Some("s3cret".to_string()),
            service_token: Some("svc-token".to_string()),
        },
    })
}

fn notifier(harness: &DispatchHarness) -> Result<Notifier> {
    Ok(Notifier::new(harness.dispatcher.clone(), endpoints()?, AUDITION_BASE_URL))
}

fn header<'a>(call: &'a RecordedCall, name: &str) -> Option<&'a str> {
    call.headers.get(name).and_then(|value| value.to_str().ok())
}

#[tokio::test]
async fn opportunity_created_is_posted_with_credentials() -> Result<()> {
    let harness = DispatchHarness::new([ScriptedResponse::ok()]);
    let notifier = notifier(&harness)?;
    let created_at = Utc.with_ymd_and_hms(2024, 6, 3, 9, 30, 0).single().unwrap_or_default();

    let event = notifier.opportunity("proj-1", "opp-42", created_at);
    let outcome = notifier.notify_opportunity_created(&event).await?;

    assert!(outcome.is_success());
    let calls = harness.transport.calls();
    assert_eq!(calls.len(), 1);
    let call = &calls[0];
    assert_eq!(call.url, "https://vetted.test/hooks/opportunity");
    assert_eq!(
        call.json(),
        json!({
            "project_id": "proj-1",
            "opportunity_id": "opp-42",
            "audition_url": "https://audition.vetted.test/audition/opp-42",
            "created_at": "2024-06-03T09:30:00Z",
        })
    );
    assert_eq!(header(call, WEBHOOK_SECRET_HEADER), Some("s3cret"));
    assert_eq!(header(call, "authorization"), Some("Bearer svc-token"));
    assert_eq!(header(call, "content-type"), Some("application/json"));
    assert_eq!(header(call, EVENT_HEADER), Some("opportunity.created"));
    Ok(())
}

#[tokio::test]
async fn submission_payload_is_normalized_before_sending() -> Result<()> {
    let harness = DispatchHarness::new([ScriptedResponse::status(201)]);
    let notifier = notifier(&harness)?;

    let submission = AuditionSubmission::new("abc-123", "proj-1", "sam@example.com", "")
        .with_profile(CandidateProfile {
            location: Some("Lisbon".to_string()),
            skills: vec!["sql".to_string()],
            ..Default::default()
        })
        .with_answers(vec![
            AuditionAnswer {
                question_id: "q-2".to_string(),
                position: 2,
                question_text: "Why this role?".to_string(),
                recording_url: Some("https://storage.test/a2.webm".to_string()),
                transcript: None,
            },
            AuditionAnswer {
                question_id: "q-1".to_string(),
                position: 1,
                question_text: "Introduce yourself".to_string(),
                recording_url: None,
                transcript: Some("Hi".to_string()),
            },
        ]);

    let outcome = notifier.notify_audition_submission(submission).await?;

    assert_eq!(outcome, DeliveryOutcome::Success {
        status_code: 201,
        body: serde_json::Value::Null,
        attempts: 1,
    });
    let body = harness.transport.calls()[0].json();
    assert_eq!(body["name"], "sam");
    assert!(body.get("resume_url").is_none());
    assert_eq!(body["profile"], json!({"location": "Lisbon", "skills": ["sql"]}));
    assert_eq!(body["answers"][0]["question_id"], "q-1");
    assert_eq!(body["answers"][1]["recording_url"], "https://storage.test/a2.webm");
    Ok(())
}

#[tokio::test]
async fn submission_exhausts_after_five_server_errors() -> Result<()> {
    let harness = DispatchHarness::new([ScriptedResponse::status(500)]);
    let notifier = notifier(&harness)?;

    let outcome = notifier
        .notify_audition_submission(AuditionSubmission::new(
            "abc-123",
            "proj-1",
            "sam@example.com",
            "Sam",
        ))
        .await?;

    assert!(matches!(outcome, DeliveryOutcome::Exhausted { attempts: 5, .. }));
    assert_eq!(harness.transport.call_count(), 5);
    assert_eq!(harness.clock.total_slept().as_millis(), 15_000);
    assert_eq!(
        harness.events.abandoned().map(|event| event.reason),
        Some(AbandonReason::Exhausted)
    );
    Ok(())
}

#[tokio::test]
async fn rejected_new_project_is_returned_not_retried() -> Result<()> {
    let harness = DispatchHarness::new([ScriptedResponse::text(401, "bad secret")]);
    let notifier = notifier(&harness)?;

    let outcome = notifier
        .notify_new_project(&NewProject {
            project_id: "proj-1".to_string(),
            project_title: "Data Labeling".to_string(),
            recruiter_email: "rita@example.com".to_string(),
            recruiter_name: "Rita".to_string(),
        })
        .await?;

    assert!(matches!(outcome, DeliveryOutcome::PermanentFailure { status_code: Some(401), .. }));
    assert_eq!(harness.transport.call_count(), 1);
    assert_eq!(harness.transport.calls()[0].url, "https://vetted.test/hooks/project");
    Ok(())
}

#[tokio::test]
async fn missing_endpoint_is_an_error() -> Result<()> {
    let harness = DispatchHarness::new([ScriptedResponse::ok()]);
    let notifier = Notifier::new(
        harness.dispatcher.clone(),
        NotificationEndpoints::default(),
        AUDITION_BASE_URL,
    );

    let result = notifier
        .notify_new_project(&NewProject {
            project_id: "proj-1".to_string(),
            project_title: "t".to_string(),
            recruiter_email: "r@example.com".to_string(),
            recruiter_name: "R".to_string(),
        })
        .await;

    assert_eq!(result, Err(NotifyError::EndpointNotConfigured(NotificationKind::NewProject)));
    assert_eq!(harness.transport.call_count(), 0);
    Ok(())
}

#[tokio::test]
async fn shutdown_cancels_pending_notifications() -> Result<()> {
    let harness = DispatchHarness::new([ScriptedResponse::status(503)]);
    let notifier = notifier(&harness)?;
    notifier.shutdown();

    let created_at = Utc::now();
    let outcome =
        notifier.notify_opportunity_created(&notifier.opportunity("p", "o", created_at)).await?;

    assert_eq!(outcome, DeliveryOutcome::Cancelled { attempts: 0 });
    assert_eq!(harness.transport.call_count(), 0);
    Ok(())
}
