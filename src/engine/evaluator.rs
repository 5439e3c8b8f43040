//! The counter engine: one atomic round trip per request.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error};

use crate::limits::keys::{Identity, LimitKeyGenerator};
use crate::limits::model::{LimitGroup, Limits, RateLimitResult, Scope};

use super::store::{CounterStore, ProcedureArgs, WindowSpec};

/// Evaluates a combined limit set against the counter store.
///
/// The engine holds no locks and performs no client-side synchronization;
/// mutual exclusion between concurrent evaluations of one identity is the
/// store's contract. Store faults never propagate: an evaluation that cannot
/// reach the store, times out, or gets back an undecodable result is logged
/// and granted access (fail-open), indistinguishable from "no limit
/// configured" to the caller.
pub struct CounterEngine {
    store: Arc<dyn CounterStore>,
    keys: LimitKeyGenerator,
    timeout: Duration,
}

impl CounterEngine {
    /// Create an engine over the given store.
    pub fn new(store: Arc<dyn CounterStore>, keys: LimitKeyGenerator, timeout: Duration) -> Self {
        Self {
            store,
            keys,
            timeout,
        }
    }

    /// Check and increment every window in `limits` for `identity`.
    ///
    /// Returns one usage entry per window, request scope first, each scope in
    /// group order. With no windows at all the store is not contacted and
    /// access is granted outright.
    pub async fn evaluate(
        &self,
        identity: &Identity,
        limits: &Limits,
        now: i64,
        correlation_id: &str,
    ) -> RateLimitResult {
        let (keys, windows) = self.collect_windows(identity, limits);

        if windows.is_empty() {
            debug!(
                operation = %identity.operation,
                "No limit windows to evaluate, allowing"
            );
            return RateLimitResult::default();
        }

        let args = ProcedureArgs {
            windows,
            stamp: now,
            correlation_id: correlation_id.to_string(),
        };

        match tokio::time::timeout(self.timeout, self.store.execute(&keys, &args)).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                error!(
                    operation = %identity.operation,
                    correlation_id = %correlation_id,
                    error = %e,
                    "Counter store evaluation failed, failing open"
                );
                RateLimitResult::default()
            }
            Err(_) => {
                error!(
                    operation = %identity.operation,
                    correlation_id = %correlation_id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Counter store evaluation timed out, failing open"
                );
                RateLimitResult::default()
            }
        }
    }

    fn collect_windows(
        &self,
        identity: &Identity,
        limits: &Limits,
    ) -> (Vec<String>, Vec<WindowSpec>) {
        let mut keys = Vec::with_capacity(limits.window_count());
        let mut windows = Vec::with_capacity(limits.window_count());

        let mut push = |group: &LimitGroup, scope: Scope| {
            for window in &group.windows {
                keys.push(self.keys.counter_key(identity, scope, window.seconds));
                windows.push(WindowSpec {
                    limit: window.limit,
                    seconds: window.seconds,
                    scope,
                });
            }
        };

        if let Some(group) = &limits.request {
            push(group, Scope::Request);
        }
        // User-scope counters need a caller id to key on
        if identity.caller.is_some() {
            if let Some(group) = &limits.user {
                push(group, Scope::User);
            }
        }

        (keys, windows)
    }
}
