//! In-process counter store.
//!
//! Backs a single process: a mutex held across the whole multi-window update
//! provides the same atomicity the shared store gives via server-side
//! scripting. Expiry is judged against the supplied evaluation timestamp, so
//! tests can drive window rollover with a simulated clock.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::Result;
use crate::limits::model::{RateLimitResult, WindowUsage};

use super::store::{CounterStore, ProcedureArgs};

#[derive(Debug, Clone, Copy)]
struct CounterEntry {
    count: u64,
    expires_at: i64,
}

/// A counter store holding all state in process memory.
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    counters: Mutex<HashMap<String, CounterEntry>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a counter, if it exists and has not expired.
    ///
    /// Primarily useful for tests and diagnostics.
    pub fn current(&self, key: &str, now: i64) -> Option<u64> {
        let counters = self.counters.lock();
        counters
            .get(key)
            .filter(|entry| now < entry.expires_at)
            .map(|entry| entry.count)
    }

    /// Drop all counters.
    pub fn clear(&self) {
        self.counters.lock().clear();
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn execute(&self, keys: &[String], args: &ProcedureArgs) -> Result<RateLimitResult> {
        // One lock across every window makes the whole update atomic.
        let mut counters = self.counters.lock();

        let mut access = true;
        let mut results = Vec::with_capacity(args.windows.len());

        for (key, window) in keys.iter().zip(&args.windows) {
            let entry = counters
                .entry(key.clone())
                .and_modify(|entry| {
                    if args.stamp >= entry.expires_at {
                        entry.count = 0;
                        entry.expires_at = args.stamp + window.seconds as i64;
                    }
                })
                .or_insert(CounterEntry {
                    count: 0,
                    expires_at: args.stamp + window.seconds as i64,
                });

            entry.count += 1;
            if entry.count > window.limit {
                access = false;
            }

            results.push(WindowUsage {
                limit: window.limit,
                seconds: window.seconds,
                current: entry.count,
                scope: window.scope,
            });
        }

        Ok(RateLimitResult { access, results })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::model::Scope;
    use super::super::store::WindowSpec;

    fn args(windows: Vec<WindowSpec>, stamp: i64) -> ProcedureArgs {
        ProcedureArgs {
            windows,
            stamp,
            correlation_id: "test".to_string(),
        }
    }

    fn window(limit: u64, seconds: u64) -> WindowSpec {
        WindowSpec {
            limit,
            seconds,
            scope: Scope::Request,
        }
    }

    #[tokio::test]
    async fn test_counts_and_verdict_sequence() {
        let store = MemoryCounterStore::new();
        let keys = vec!["ss/cnt/checkout/60".to_string()];

        for (expected_current, expected_access) in [(1u64, true), (2, true), (3, false)] {
            let result = store
                .execute(&keys, &args(vec![window(2, 60)], 100))
                .await
                .unwrap();

            assert_eq!(result.results[0].current, expected_current);
            assert_eq!(result.access, expected_access);
        }
    }

    #[tokio::test]
    async fn test_counter_resets_after_window_elapses() {
        let store = MemoryCounterStore::new();
        let keys = vec!["ss/cnt/checkout/60".to_string()];

        for _ in 0..3 {
            store
                .execute(&keys, &args(vec![window(2, 60)], 100))
                .await
                .unwrap();
        }

        // Advance past the 60 second window
        let result = store
            .execute(&keys, &args(vec![window(2, 60)], 161))
            .await
            .unwrap();

        assert_eq!(result.results[0].current, 1);
        assert!(result.access);
    }

    #[tokio::test]
    async fn test_multiple_windows_evaluated_in_order() {
        let store = MemoryCounterStore::new();
        let keys = vec![
            "ss/cnt/ping/60".to_string(),
            "ss/cnt/ping/3600".to_string(),
            "ss/cnt/usr/u-42/86400".to_string(),
        ];
        let windows = vec![
            window(10, 60),
            window(30, 3600),
            WindowSpec {
                limit: 100,
                seconds: 86400,
                scope: Scope::User,
            },
        ];

        let result = store.execute(&keys, &args(windows, 100)).await.unwrap();

        assert!(result.access);
        assert_eq!(result.results.len(), 3);
        assert_eq!(result.results[0].seconds, 60);
        assert_eq!(result.results[1].seconds, 3600);
        assert_eq!(result.results[2].scope, Scope::User);
        assert!(result.results.iter().all(|r| r.current == 1));
    }

    #[tokio::test]
    async fn test_one_window_over_denies_overall() {
        let store = MemoryCounterStore::new();
        let keys = vec![
            "ss/cnt/op/60".to_string(),
            "ss/cnt/op/3600".to_string(),
        ];
        let windows = vec![window(1, 60), window(10, 3600)];

        store
            .execute(&keys, &args(windows.clone(), 100))
            .await
            .unwrap();
        let result = store.execute(&keys, &args(windows, 101)).await.unwrap();

        assert!(!result.access);
        assert_eq!(result.results[0].current, 2);
        assert_eq!(result.results[1].current, 2);
    }

    #[tokio::test]
    async fn test_concurrent_evaluations_lose_no_updates() {
        use futures::future::join_all;
        use std::sync::Arc;

        let store = Arc::new(MemoryCounterStore::new());
        let keys = vec!["ss/cnt/checkout/60".to_string()];
        let bound = 5u64;
        let total = 20usize;

        let evaluations = (0..total).map(|_| {
            let store = Arc::clone(&store);
            let keys = keys.clone();
            tokio::spawn(async move {
                store
                    .execute(&keys, &args(vec![window(bound, 60)], 100))
                    .await
                    .unwrap()
            })
        });

        let results: Vec<RateLimitResult> = join_all(evaluations)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        let allowed = results.iter().filter(|r| r.access).count();
        assert_eq!(allowed, bound as usize);
        assert_eq!(store.current(&keys[0], 100), Some(total as u64));
    }
}
