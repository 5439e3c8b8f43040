//! Counter store boundary.
//!
//! The store executes the check-and-increment procedure for a whole request
//! as one indivisible unit: no concurrent evaluation for the same identity
//! can observe or mutate a partial state. How exclusivity is achieved is the
//! implementation's business (server-side scripting for Redis, a process-wide
//! lock for the in-memory backend).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::limits::model::{RateLimitResult, Scope};

/// One window to evaluate, paired positionally with a counter key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSpec {
    /// Maximum requests allowed within the window
    pub limit: u64,

    /// Window length in seconds; also the expiry set when the counter is
    /// first created
    pub seconds: u64,

    /// Dimension the window belongs to, echoed back in the usage result
    pub scope: Scope,
}

/// Arguments handed to the atomic procedure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcedureArgs {
    /// Windows to evaluate, in result order. `keys[i]` is the counter key
    /// for `windows[i]`.
    pub windows: Vec<WindowSpec>,

    /// Evaluation timestamp, seconds since the Unix epoch
    pub stamp: i64,

    /// Correlation id of the request being evaluated, for store-side tracing
    pub correlation_id: String,
}

/// A store capable of executing the atomic check-and-increment procedure.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Execute the procedure for all windows at once.
    ///
    /// `keys` holds one fully-built counter key per entry in `args.windows`,
    /// in the same order. Implementations must increment every counter,
    /// set the window-length expiry on newly created counters, and report
    /// usage entries in the supplied order.
    async fn execute(&self, keys: &[String], args: &ProcedureArgs) -> Result<RateLimitResult>;
}
