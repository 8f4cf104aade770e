//! Property-based tests for backoff and response classification.
//!
//! Covers the invariants callers rely on: delays never shrink, never exceed
//! the cap, and every status lands in exactly one outcome class.

use std::time::Duration;

use bridge_delivery::{AttemptOutcome, BackoffPolicy, DeliveryError, DeliveryOutcome};
use bridge_testing::{strategies, DispatchHarness, ScriptedResponse};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn delays_are_monotonic_and_capped(policy in strategies::backoff_policy(), attempt in 1_u32..64) {
        let current = policy.delay(attempt);
        let next = policy.delay(attempt + 1);

        prop_assert!(current <= next, "delay shrank: {current:?} then {next:?}");
        prop_assert!(next <= policy.max_delay);
        prop_assert!(current >= policy.base_delay.min(policy.max_delay));
    }

    #[test]
    fn default_delay_matches_closed_form(attempt in 1_u32..40) {
        let policy = BackoffPolicy::default();
        let expected_ms = 2_u64.saturating_pow(attempt - 1).saturating_mul(1_000).min(60_000);

        prop_assert_eq!(policy.delay(attempt), Duration::from_millis(expected_ms));
    }

    #[test]
    fn jittered_delay_never_exceeds_cap(attempt in 1_u32..32, jitter in 0.0_f64..=0.2) {
        let policy = BackoffPolicy { jitter_factor: jitter, ..BackoffPolicy::default() };
        prop_assert!(policy.next_delay(attempt) <= policy.max_delay);
    }

    #[test]
    fn schedule_has_one_delay_per_retry(policy in strategies::backoff_policy()) {
        let schedule = policy.schedule();
        prop_assert_eq!(schedule.len() as u32, policy.max_attempts - 1);
        prop_assert_eq!(policy.total_backoff(), schedule.iter().sum::<Duration>());
    }

    #[test]
    fn success_statuses_classify_as_success(status in strategies::success_status()) {
        prop_assert_eq!(AttemptOutcome::from_status(status), AttemptOutcome::Success);
    }

    #[test]
    fn server_errors_are_retryable(status in strategies::server_error_status()) {
        prop_assert_eq!(AttemptOutcome::from_status(status), AttemptOutcome::RetryableFailure);
        prop_assert!(DeliveryError::from_status(status, "").is_retryable());
    }

    #[test]
    fn client_errors_are_permanent(status in strategies::client_error_status()) {
        prop_assert_eq!(AttemptOutcome::from_status(status), AttemptOutcome::PermanentFailure);
        prop_assert!(!DeliveryError::from_status(status, "").is_retryable());
    }

    #[test]
    fn retryable_failures_use_the_whole_budget(
        failures in prop::collection::vec(strategies::retryable_response(), 1..6),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| TestCaseError::fail(e.to_string()))?;

        let harness = DispatchHarness::new(failures.clone());
        let request = harness.request(&serde_json::json!({"retry": true}));
        let outcome = runtime.block_on(harness.dispatcher.send(&request));

        prop_assert!(
            matches!(outcome, DeliveryOutcome::Exhausted { attempts: 5, .. }),
            "expected exhaustion after 5 attempts, got {:?}",
            outcome
        );
        prop_assert_eq!(harness.transport.call_count(), 5);
        prop_assert_eq!(harness.clock.total_slept(), Duration::from_millis(15_000));
    }

    #[test]
    fn success_after_failures_counts_every_attempt(failures in 0_usize..5) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| TestCaseError::fail(e.to_string()))?;

        let script = std::iter::repeat(ScriptedResponse::status(500))
            .take(failures)
            .chain([ScriptedResponse::ok()]);
        let harness = DispatchHarness::new(script);
        let request = harness.request(&serde_json::json!({}));
        let outcome = runtime.block_on(harness.dispatcher.send(&request));

        prop_assert!(outcome.is_success());
        prop_assert_eq!(outcome.attempts() as usize, failures + 1);
        prop_assert_eq!(harness.clock.sleeps().len(), failures);
    }
}
