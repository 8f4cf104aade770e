//! Proptest strategies for delivery inputs.

use std::time::Duration;

use bridge_delivery::{BackoffPolicy, BackoffStrategy};
use proptest::prelude::{prop, prop_oneof, Just, Strategy};

use crate::transport::ScriptedResponse;

/// Any 2xx status.
pub fn success_status() -> impl Strategy<Value = u16> {
    200_u16..300
}

/// Any 4xx status.
pub fn client_error_status() -> impl Strategy<Value = u16> {
    400_u16..500
}

/// Any server failure status, including non-standard codes past 599.
pub fn server_error_status() -> impl Strategy<Value = u16> {
    500_u16..1000
}

/// A failure another attempt might fix: 5xx, network error or timeout.
pub fn retryable_response() -> impl Strategy<Value = ScriptedResponse> {
    prop_oneof![
        3 => server_error_status().prop_map(ScriptedResponse::status),
        1 => Just(ScriptedResponse::connection_refused()),
        1 => Just(ScriptedResponse::Timeout),
    ]
}

/// Any valid un-jittered policy.
pub fn backoff_policy() -> impl Strategy<Value = BackoffPolicy> {
    (
        1_u32..=10,
        1_u64..=5_000,
        1_u64..=120,
        prop::sample::select(vec![
            BackoffStrategy::Fixed,
            BackoffStrategy::Exponential,
            BackoffStrategy::Linear,
        ]),
    )
        .prop_map(|(max_attempts, base_ms, cap_factor, strategy)| BackoffPolicy {
            max_attempts,
            base_delay: Duration::from_millis(base_ms),
            max_delay: Duration::from_millis(base_ms * cap_factor),
            jitter_factor: 0.0,
            strategy,
        })
}
