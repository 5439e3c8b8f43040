//! Assembly of rate limit results into response headers and decisions.

use serde::{Deserialize, Serialize};

use crate::config::ResponseConfig;
use crate::limits::model::{RateLimitResult, Scope, WindowUsage};

/// Header carrying request-scope usage.
pub const RATE_LIMIT_REQUEST_HEADER: &str = "x-ratelimit-request";
/// Header carrying user-scope usage.
pub const RATE_LIMIT_USER_HEADER: &str = "x-ratelimit-user";

/// Usage of a single window as serialized into a response header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitStatus {
    /// The configured bound
    pub limit: u64,

    /// Counter value after this request
    pub current: u64,

    /// Window length in seconds
    pub seconds: u64,
}

impl From<&WindowUsage> for RateLimitStatus {
    fn from(usage: &WindowUsage) -> Self {
        Self {
            limit: usage.limit,
            current: usage.current,
            seconds: usage.seconds,
        }
    }
}

/// One response header: a name and the JSON-serialized usage list for one
/// scope. The value round-trips through [`RateLimitStatus`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitHeader {
    pub name: String,
    pub value: String,
}

/// Build one header per scope present in `results`.
///
/// Scope grouping preserves window order within each scope. Scopes with no
/// usage produce no header.
pub fn headers_for(results: &[WindowUsage]) -> Vec<RateLimitHeader> {
    let mut headers = Vec::with_capacity(2);

    for (scope, name) in [
        (Scope::Request, RATE_LIMIT_REQUEST_HEADER),
        (Scope::User, RATE_LIMIT_USER_HEADER),
    ] {
        let statuses: Vec<RateLimitStatus> = results
            .iter()
            .filter(|usage| usage.scope == scope)
            .map(RateLimitStatus::from)
            .collect();

        if statuses.is_empty() {
            continue;
        }

        headers.push(RateLimitHeader {
            name: name.to_string(),
            // Serializing a vec of plain integers cannot fail
            value: serde_json::to_string(&statuses).expect("serializing rate limit statuses"),
        });
    }

    headers
}

/// The response override for a rejected request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// Status code to return, e.g. 429
    pub status_code: u16,

    /// Human-readable description of the rejection
    pub description: String,
}

/// Build the rejection decision for a verdict, or `None` when the request
/// should proceed.
pub fn decision_for(result: &RateLimitResult, response: &ResponseConfig) -> Option<Decision> {
    if result.access {
        None
    } else {
        Some(Decision {
            status_code: response.status_code,
            description: response.description.clone(),
        })
    }
}
